/// Defaults applied by configuration types.
pub mod defaults {
    /// Fraction of words flagged as mask candidates.
    pub const MASK_RATE: f64 = 0.15;
    /// Window length (tokens per packed example, markers and padding included).
    pub const CAPACITY: usize = 512;
    /// Number of concurrent paragraph workers.
    pub const WORKER_COUNT: usize = 8;
    /// Maximum number of paragraphs waiting in the work queue.
    pub const QUEUE_BOUND: usize = 2000;
    /// RNG seed that controls mask decisions and reader shuffling.
    pub const SEED: u64 = 42;
    /// Shuffle buffer multiplier applied to the batch size by the reader.
    pub const SHUFFLE_BUFFER_FACTOR: usize = 1000;
    /// Smallest window that can hold CLS, one token, and SEP.
    pub const MIN_CAPACITY: usize = 3;
}

/// Special-token names and WordPiece conventions.
pub mod vocab {
    /// Sequence start marker.
    pub const CLS_TOKEN: &str = "[CLS]";
    /// Sequence/segment separator marker.
    pub const SEP_TOKEN: &str = "[SEP]";
    /// Unknown-token fallback.
    pub const UNK_TOKEN: &str = "[UNK]";
    /// Padding token.
    pub const PAD_TOKEN: &str = "[PAD]";
    /// Prefix marking non-initial WordPiece pieces.
    pub const CONTINUATION_PREFIX: &str = "##";
    /// Words longer than this (in chars) map to a single unknown token.
    pub const MAX_WORD_CHARS: usize = 100;
    /// Value written to both sequences at padded positions.
    pub const PAD_VALUE: u32 = 0;
}

/// Constants used by record encoding and the record store layout.
pub mod records {
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for encoded example records.
    pub const RECORD_VERSION: u8 = 1;
    /// Version tag for record-store metadata compatibility checks.
    pub const STORE_VERSION: u8 = 1;
    /// Key used for record-store metadata.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key prefix for example records (followed by a little-endian u64 sequence number).
    pub const RECORD_KEY_PREFIX: &[u8] = b"record:";
    /// Default filename used when a directory is given as the store path.
    pub const DEFAULT_STORE_FILENAME: &str = "mlm_records.bin";
    /// Number of keys fetched per `batch_read` call by the reader.
    ///
    /// This only controls datastore fetch granularity; it does not cap the
    /// training `batch_size`.
    pub const READ_BATCH: usize = 256;
}

/// Constants used by the pipeline driver.
pub mod pipeline {
    /// Log message used when a paragraph is dropped.
    pub const DROPPED_PARAGRAPH_MSG: &str = "dropping paragraph";
    /// Offset mixed into per-paragraph seed derivation.
    pub const PARAGRAPH_SEED_OFFSET: u64 = 0x3A5C_11ED;
}
