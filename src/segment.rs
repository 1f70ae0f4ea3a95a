//! Word segmentation capability.
//!
//! Whole-word masking draws one decision per segmented word, so the segmenter
//! decides what a "word" is. Any strategy can be plugged in behind
//! [`WordSegmenter`]; closures are wrapped with [`FnSegmenter`].

use crate::errors::MlmError;
use crate::tokenizer::is_cjk;
use crate::types::Word;

/// Splits a text unit into an ordered list of words.
pub trait WordSegmenter: Send + Sync {
    /// Words of `text` in order; empty words are never returned.
    fn segment(&self, text: &str) -> Result<Vec<Word>, MlmError>;
}

/// Splits on Unicode whitespace.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceSegmenter;

impl WordSegmenter for WhitespaceSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<Word>, MlmError> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }
}

/// Treats every CJK ideograph as its own word and splits everything else on
/// whitespace. Gives character-level whole-word masking for Chinese text
/// without a dictionary.
#[derive(Clone, Copy, Debug, Default)]
pub struct CjkCharSegmenter;

impl WordSegmenter for CjkCharSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<Word>, MlmError> {
        let mut words = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if ch.is_whitespace() {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            } else if is_cjk(ch) {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                words.push(ch.to_string());
            } else {
                current.push(ch);
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
        Ok(words)
    }
}

/// Adapter turning a closure into a [`WordSegmenter`].
pub struct FnSegmenter<F> {
    segment_fn: F,
}

impl<F> FnSegmenter<F>
where
    F: Fn(&str) -> Result<Vec<Word>, MlmError> + Send + Sync,
{
    /// Wrap a segmentation closure.
    pub fn new(segment_fn: F) -> Self {
        Self { segment_fn }
    }
}

impl<F> WordSegmenter for FnSegmenter<F>
where
    F: Fn(&str) -> Result<Vec<Word>, MlmError> + Send + Sync,
{
    fn segment(&self, text: &str) -> Result<Vec<Word>, MlmError> {
        (self.segment_fn)(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_segmenter_drops_empty_words() {
        let words = WhitespaceSegmenter.segment("  the  quick\tfox\n").unwrap();
        assert_eq!(words, vec!["the", "quick", "fox"]);
    }

    #[test]
    fn cjk_segmenter_isolates_ideographs() {
        let words = CjkCharSegmenter.segment("我爱 rust语言").unwrap();
        assert_eq!(words, vec!["我", "爱", "rust", "语", "言"]);
    }

    #[test]
    fn fn_segmenter_forwards_errors() {
        let segmenter = FnSegmenter::new(|text: &str| {
            if text.contains('!') {
                Err(MlmError::Segmentation {
                    reason: "bang".to_string(),
                })
            } else {
                Ok(vec![text.to_string()])
            }
        });
        assert_eq!(segmenter.segment("whole").unwrap(), vec!["whole"]);
        assert!(matches!(
            segmenter.segment("bad!"),
            Err(MlmError::Segmentation { reason }) if reason == "bang"
        ));
    }
}
