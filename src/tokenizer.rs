//! Sub-word tokenizer interface and the built-in WordPiece implementation.
//!
//! The masker only needs three things from a tokenizer: split one word into
//! sub-token strings (no boundary markers), map those strings to ids, and
//! expose the vocabulary for the CLS/SEP ids.

use std::sync::Arc;

use crate::constants::vocab::{CONTINUATION_PREFIX, MAX_WORD_CHARS, UNK_TOKEN};
use crate::errors::MlmError;
use crate::types::{SubToken, TokenId};
use crate::vocab::Vocabulary;

/// Tokenizer collaborator used by the masker.
pub trait Tokenizer: Send + Sync {
    /// Split `word` into sub-token strings without CLS/SEP markers.
    fn tokenize(&self, word: &str) -> Result<Vec<SubToken>, MlmError>;
    /// Map sub-token strings to vocabulary ids.
    fn ids_for(&self, tokens: &[SubToken]) -> Vec<TokenId> {
        self.vocab().ids_for(tokens)
    }
    /// Vocabulary backing this tokenizer.
    fn vocab(&self) -> &Vocabulary;
}

/// BERT-style tokenizer: basic pre-tokenization followed by greedy
/// longest-match-first WordPiece.
///
/// Pre-tokenization splits on whitespace, isolates punctuation and CJK
/// ideographs, drops control characters, and optionally lowercases.
#[derive(Clone, Debug)]
pub struct WordPieceTokenizer {
    vocab: Arc<Vocabulary>,
    lowercase: bool,
    max_word_chars: usize,
}

impl WordPieceTokenizer {
    /// Lowercasing tokenizer over `vocab`.
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self {
            vocab,
            lowercase: true,
            max_word_chars: MAX_WORD_CHARS,
        }
    }

    /// Configure lowercasing (on by default, matching uncased vocabularies).
    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    fn basic_pieces(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if ch == '\u{0}' || ch == '\u{FFFD}' || (ch.is_control() && !ch.is_whitespace()) {
                continue;
            }
            if ch.is_whitespace() {
                flush(&mut current, &mut pieces);
            } else if is_punctuation(ch) || is_cjk(ch) {
                flush(&mut current, &mut pieces);
                pieces.push(ch.to_string());
            } else if self.lowercase {
                current.extend(ch.to_lowercase());
            } else {
                current.push(ch);
            }
        }
        flush(&mut current, &mut pieces);
        pieces
    }

    fn word_pieces(&self, piece: &str, out: &mut Vec<SubToken>) {
        let chars: Vec<char> = piece.chars().collect();
        if chars.len() > self.max_word_chars {
            out.push(UNK_TOKEN.to_string());
            return;
        }
        let mut sub_tokens = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut found = None;
            while start < end {
                let substr: String = chars[start..end].iter().collect();
                let candidate = if start == 0 {
                    substr
                } else {
                    format!("{CONTINUATION_PREFIX}{substr}")
                };
                if self.vocab.contains(&candidate) {
                    found = Some(candidate);
                    break;
                }
                end -= 1;
            }
            match found {
                Some(token) => {
                    sub_tokens.push(token);
                    start = end;
                }
                None => {
                    // A piece with any unmatched span becomes a single unknown token.
                    out.push(UNK_TOKEN.to_string());
                    return;
                }
            }
        }
        out.extend(sub_tokens);
    }
}

impl Tokenizer for WordPieceTokenizer {
    fn tokenize(&self, word: &str) -> Result<Vec<SubToken>, MlmError> {
        let mut out = Vec::new();
        for piece in self.basic_pieces(word) {
            self.word_pieces(&piece, &mut out);
        }
        Ok(out)
    }

    fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }
}

fn flush(current: &mut String, pieces: &mut Vec<String>) {
    if !current.is_empty() {
        pieces.push(std::mem::take(current));
    }
}

fn is_punctuation(ch: char) -> bool {
    ch.is_ascii_punctuation()
        || matches!(
            ch,
            '\u{2000}'..='\u{206F}' | '\u{3000}'..='\u{303F}' | '\u{FF00}'..='\u{FF0F}'
                | '\u{FF1A}'..='\u{FF20}' | '\u{FF3B}'..='\u{FF40}' | '\u{FF5B}'..='\u{FF65}'
        ) && !ch.is_whitespace()
}

pub(crate) fn is_cjk(ch: char) -> bool {
    matches!(
        ch,
        '\u{4E00}'..='\u{9FFF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{20000}'..='\u{2A6DF}'
            | '\u{2A700}'..='\u{2B73F}'
            | '\u{2B740}'..='\u{2B81F}'
            | '\u{2B820}'..='\u{2CEAF}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{2F800}'..='\u{2FA1F}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> WordPieceTokenizer {
        let vocab = Vocabulary::from_tokens([
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "play", "##ing", "##er", "un", "##known", "中",
            "国", ",", "hello",
        ])
        .unwrap();
        WordPieceTokenizer::new(Arc::new(vocab))
    }

    #[test]
    fn splits_words_into_continuation_pieces() {
        let tok = tokenizer();
        assert_eq!(tok.tokenize("playing").unwrap(), vec!["play", "##ing"]);
        assert_eq!(tok.tokenize("Player").unwrap(), vec!["play", "##er"]);
        assert_eq!(tok.tokenize("unknown").unwrap(), vec!["un", "##known"]);
    }

    #[test]
    fn isolates_cjk_and_punctuation() {
        let tok = tokenizer();
        assert_eq!(tok.tokenize("中国,hello").unwrap(), vec!["中", "国", ",", "hello"]);
    }

    #[test]
    fn unmatched_pieces_become_unknown() {
        let tok = tokenizer();
        assert_eq!(tok.tokenize("playx").unwrap(), vec!["[UNK]"]);
        let ids = tok.ids_for(&tok.tokenize("playing zzz").unwrap());
        assert_eq!(ids, vec![4, 5, 1]);
    }

    #[test]
    fn whitespace_only_word_yields_nothing() {
        let tok = tokenizer();
        assert!(tok.tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn cased_mode_keeps_capitals() {
        let tok = tokenizer().with_lowercase(false);
        assert_eq!(tok.tokenize("Play").unwrap(), vec!["[UNK]"]);
    }
}
