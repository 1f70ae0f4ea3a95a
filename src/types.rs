/// Sub-token id from the vocabulary.
/// Example: `101` for `[CLS]` in a BERT vocabulary.
pub type TokenId = u32;
/// Per-position mask indicator (`0` = keep, `1` = mask candidate).
pub type MaskFlag = u8;
/// Sub-token string produced by the tokenizer.
/// Examples: `play`, `##ing`, `中`
pub type SubToken = String;
/// Word produced by a segmenter before sub-word tokenization.
/// Examples: `playing`, `中国`
pub type Word = String;
/// Text unit (typically one sentence) inside a paragraph.
/// Example: `The quick brown fox jumps over the lazy dog.`
pub type TextUnit = String;
/// Ordered text units that are packed together.
pub type Paragraph = Vec<TextUnit>;
/// Serialized record bytes written to a sink.
pub type RecordBytes = Vec<u8>;
/// Human-readable corpus location used in diagnostics.
/// Examples: `corpus.jsonl:17`, `docs/intro.txt`
pub type CorpusLocation = String;
