use rand::Rng;
use std::sync::Arc;

use crate::config::MaskingConfig;
use crate::errors::MlmError;
use crate::segment::WordSegmenter;
use crate::tokenizer::Tokenizer;
use crate::types::{MaskFlag, TokenId};

/// Token ids and parallel mask flags for one text unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitEncoding {
    /// Sub-token ids in text order.
    pub token_ids: Vec<TokenId>,
    /// `1` where the owning word was selected for masking.
    pub mask_ids: Vec<MaskFlag>,
}

impl UnitEncoding {
    /// Build from parallel sequences. Fails when the lengths differ.
    pub fn new(token_ids: Vec<TokenId>, mask_ids: Vec<MaskFlag>) -> Result<Self, MlmError> {
        if token_ids.len() != mask_ids.len() {
            return Err(MlmError::SchemaViolation {
                field: "mask_ids",
                expected: token_ids.len(),
                actual: mask_ids.len(),
            });
        }
        Ok(Self {
            token_ids,
            mask_ids,
        })
    }

    /// Number of sub-tokens.
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    /// True when the unit produced no sub-tokens.
    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }

    /// Keep at most `max_len` leading positions of both sequences.
    pub fn truncate(&mut self, max_len: usize) {
        self.token_ids.truncate(max_len);
        self.mask_ids.truncate(max_len);
    }

    /// Number of positions flagged as mask candidates.
    pub fn masked_count(&self) -> usize {
        self.mask_ids.iter().filter(|flag| **flag != 0).count()
    }
}

/// Whole-word mask decision plus sub-token expansion for one text unit.
#[derive(Clone)]
pub struct WordMasker {
    tokenizer: Arc<dyn Tokenizer>,
    segmenter: Arc<dyn WordSegmenter>,
    mask_rate: f64,
}

impl WordMasker {
    /// Build a masker; fails when the mask rate is outside `[0, 1]`.
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        segmenter: Arc<dyn WordSegmenter>,
        config: MaskingConfig,
    ) -> Result<Self, MlmError> {
        let config = config.validated()?;
        Ok(Self {
            tokenizer,
            segmenter,
            mask_rate: config.mask_rate,
        })
    }

    /// Tokenizer used for every word.
    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Per-word mask probability.
    pub fn mask_rate(&self) -> f64 {
        self.mask_rate
    }

    /// Segment `text`, draw one mask decision per word, and expand each word
    /// into its sub-token ids with the decision repeated per sub-token.
    ///
    /// Exactly one draw is consumed per word, including words that tokenize
    /// to nothing. No special tokens are inserted.
    pub fn encode_unit<R: Rng>(
        &self,
        text: &str,
        rng: &mut R,
    ) -> Result<UnitEncoding, MlmError> {
        let words = self.segmenter.segment(text)?;
        let mut encoding = UnitEncoding::default();
        for word in &words {
            let draw: f64 = rng.random();
            let flag: MaskFlag = if draw <= self.mask_rate { 1 } else { 0 };
            let sub_tokens = self.tokenizer.tokenize(word)?;
            let ids = self.tokenizer.ids_for(&sub_tokens);
            encoding.mask_ids.extend(std::iter::repeat_n(flag, ids.len()));
            encoding.token_ids.extend(ids);
        }
        Ok(encoding)
    }
}
