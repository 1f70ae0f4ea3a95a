//! Immutable token ⇄ id mapping with named special-token accessors.

use indexmap::IndexMap;
use std::fs;
use std::path::Path;

use crate::constants::vocab::{CLS_TOKEN, PAD_TOKEN, SEP_TOKEN, UNK_TOKEN};
use crate::errors::MlmError;
use crate::types::TokenId;

/// Vocabulary where a token's id is its insertion position.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    tokens: IndexMap<String, TokenId>,
    cls_id: TokenId,
    sep_id: TokenId,
    unk_id: TokenId,
    pad_id: Option<TokenId>,
}

impl Vocabulary {
    /// Build from tokens in id order.
    ///
    /// Fails on duplicate tokens or when `[CLS]`, `[SEP]` or `[UNK]` is absent.
    /// Without `[UNK]`, out-of-vocabulary pieces would collide with padding.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, MlmError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = IndexMap::new();
        for token in tokens {
            let token = token.into();
            let id = map.len() as TokenId;
            if map.contains_key(&token) {
                return Err(MlmError::Configuration(format!(
                    "vocabulary token '{token}' appears more than once"
                )));
            }
            map.insert(token, id);
        }
        let lookup = |name: &str| map.get(name).copied();
        let cls_id = lookup(CLS_TOKEN).ok_or_else(|| {
            MlmError::Configuration(format!("vocabulary is missing {CLS_TOKEN}"))
        })?;
        let sep_id = lookup(SEP_TOKEN).ok_or_else(|| {
            MlmError::Configuration(format!("vocabulary is missing {SEP_TOKEN}"))
        })?;
        let unk_id = lookup(UNK_TOKEN).ok_or_else(|| {
            MlmError::Configuration(format!("vocabulary is missing {UNK_TOKEN}"))
        })?;
        let pad_id = lookup(PAD_TOKEN);
        Ok(Self {
            tokens: map,
            cls_id,
            sep_id,
            unk_id,
            pad_id,
        })
    }

    /// Load a BERT-style `vocab.txt` (one token per line, id = line number).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MlmError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_tokens(raw.lines().map(|line| line.trim_end_matches('\r').to_string()))
    }

    /// Sequence start marker id.
    pub fn cls_id(&self) -> TokenId {
        self.cls_id
    }

    /// Separator marker id.
    pub fn sep_id(&self) -> TokenId {
        self.sep_id
    }

    /// Unknown-token id.
    pub fn unk_id(&self) -> TokenId {
        self.unk_id
    }

    /// Padding-token id, if the vocabulary defines one.
    pub fn pad_id(&self) -> Option<TokenId> {
        self.pad_id
    }

    /// Id of an exact token string.
    pub fn id_of(&self, token: &str) -> Option<TokenId> {
        self.tokens.get(token).copied()
    }

    /// Whether `token` is in the vocabulary.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    /// Token string for `id`.
    pub fn token_of(&self, id: TokenId) -> Option<&str> {
        self.tokens
            .get_index(id as usize)
            .map(|(token, _)| token.as_str())
    }

    /// Map tokens to ids; unknown tokens map to `[UNK]`.
    pub fn ids_for<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<TokenId> {
        tokens
            .iter()
            .map(|token| self.id_of(token.as_ref()).unwrap_or(self.unk_id))
            .collect()
    }

    /// Vocabulary size.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
