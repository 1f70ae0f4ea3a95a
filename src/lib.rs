#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Command-line runners behind the bundled binaries.
pub mod apps;
/// Record encoding and decoding.
pub mod codec;
/// Masking, packing, pipeline, and reader configuration.
pub mod config;
/// Centralized defaults, special tokens, and store layout constants.
pub mod constants;
/// JSON-lines and text-directory corpus readers.
pub mod corpus;
mod hash;
/// Whole-word mask decisions and sub-token expansion.
pub mod masker;
/// Token totals and run reports.
pub mod metrics;
/// Greedy packing of units into fixed-length windows.
pub mod packer;
/// Concurrent corpus-to-sink driver.
pub mod pipeline;
/// Shuffled, batched record reading.
pub mod reader;
mod rng;
/// Word segmentation capability.
pub mod segment;
/// Record sinks, including the file-backed record store.
pub mod sink;
/// Sub-word tokenizer interface and WordPiece implementation.
pub mod tokenizer;
/// Input transports used by corpus readers.
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Text normalization and sentence splitting.
pub mod utils;
/// Vocabulary with named special-token accessors.
pub mod vocab;

mod errors;

pub use codec::RecordCodec;
pub use config::{MaskingConfig, PackingConfig, PipelineConfig, ReaderConfig, TailPolicy};
pub use corpus::{JsonLinesCorpus, TextDirCorpus};
pub use errors::MlmError;
pub use masker::{UnitEncoding, WordMasker};
pub use metrics::{ExampleStats, RunReport};
pub use packer::{PackedExample, Packer};
pub use pipeline::{ParagraphOutput, PipelineDriver};
pub use reader::{MlmBatch, RecordReader, ShuffledBatches};
pub use rng::DeterministicRng;
pub use segment::{CjkCharSegmenter, FnSegmenter, WhitespaceSegmenter, WordSegmenter};
pub use sink::{MemorySink, RecordSink, StoreRecordSink};
pub use tokenizer::{Tokenizer, WordPieceTokenizer};
pub use types::{
    CorpusLocation, MaskFlag, Paragraph, RecordBytes, SubToken, TextUnit, TokenId, Word,
};
pub use vocab::Vocabulary;
