//! Read path for record stores: sequential iteration and the repeating,
//! shuffled, batched stream consumed by training.

use rand::Rng;
use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::DataStoreReader;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use crate::codec::RecordCodec;
use crate::config::ReaderConfig;
use crate::constants::records::READ_BATCH;
use crate::errors::MlmError;
use crate::packer::PackedExample;
use crate::rng::DeterministicRng;
use crate::sink::{coerce_store_path, map_store_err, read_store_meta, record_key};

/// One training batch; rows are widened to `u32` for direct tensor loading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MlmBatch {
    /// `[batch][capacity]` token ids.
    pub token_ids: Vec<Vec<u32>>,
    /// `[batch][capacity]` mask candidate flags.
    pub mask_ids: Vec<Vec<u32>>,
}

impl MlmBatch {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }

    fn push(&mut self, example: PackedExample) {
        let (token_ids, mask_ids) = example.into_parts();
        self.token_ids.push(token_ids);
        self.mask_ids.push(mask_ids.into_iter().map(u32::from).collect());
    }
}

struct OpenStore {
    store: DataStore,
    path: PathBuf,
    record_count: u64,
}

/// Reader over one or more closed record stores of the same capacity.
pub struct RecordReader {
    stores: Vec<OpenStore>,
    codec: RecordCodec,
}

impl fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<&PathBuf> = self.stores.iter().map(|store| &store.path).collect();
        f.debug_struct("RecordReader")
            .field("paths", &paths)
            .field("capacity", &self.codec.capacity())
            .finish()
    }
}

impl RecordReader {
    /// Open every store in `paths`, requiring each to carry metadata with the
    /// given `capacity`.
    pub fn open<I, P>(paths: I, capacity: usize) -> Result<Self, MlmError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut stores = Vec::new();
        for path in paths {
            let path = coerce_store_path(path.into());
            if !path.is_file() {
                return Err(MlmError::Configuration(format!(
                    "record store not found: {}",
                    path.display()
                )));
            }
            let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
            let meta = read_store_meta(&store)?.ok_or_else(|| {
                MlmError::CorruptRecord(format!(
                    "record store {} has no metadata (was the sink closed?)",
                    path.display()
                ))
            })?;
            if meta.capacity != capacity as u64 {
                return Err(MlmError::SchemaViolation {
                    field: "capacity",
                    expected: capacity,
                    actual: meta.capacity as usize,
                });
            }
            debug!(
                path = %path.display(),
                records = meta.record_count,
                "opened record store for reading"
            );
            stores.push(OpenStore {
                store,
                path,
                record_count: meta.record_count,
            });
        }
        Ok(Self {
            stores,
            codec: RecordCodec::new(capacity),
        })
    }

    /// Capacity shared by every opened store.
    pub fn capacity(&self) -> usize {
        self.codec.capacity()
    }

    /// Total records across all stores.
    pub fn record_count(&self) -> u64 {
        self.stores.iter().map(|store| store.record_count).sum()
    }

    /// Read `count` records starting at `start` from the store at `store_idx`.
    fn read_chunk(
        &self,
        store_idx: usize,
        start: u64,
        count: u64,
    ) -> Result<Vec<PackedExample>, MlmError> {
        let open = &self.stores[store_idx];
        let keys: Vec<Vec<u8>> = (start..start + count).map(record_key).collect();
        let key_refs: Vec<&[u8]> = keys.iter().map(|key| key.as_slice()).collect();
        let entries = open.store.batch_read(&key_refs).map_err(map_store_err)?;
        let mut examples = Vec::with_capacity(entries.len());
        for (offset, entry) in entries.into_iter().enumerate() {
            let entry = entry.ok_or_else(|| {
                MlmError::CorruptRecord(format!(
                    "record store {} missing record {}",
                    open.path.display(),
                    start + offset as u64
                ))
            })?;
            examples.push(self.codec.decode(entry.as_ref())?);
        }
        Ok(examples)
    }

    /// Iterate every record once, in store order then key order.
    pub fn iter(&self) -> RecordIter<'_> {
        RecordIter {
            cursor: Cursor::new(self, false),
            pending: VecDeque::new(),
        }
    }

    /// Decode every record into memory.
    pub fn read_all(&self) -> Result<Vec<PackedExample>, MlmError> {
        self.iter().collect()
    }

    /// Endless shuffled batch stream: repeat, shuffle within
    /// `config.shuffle_buffer`, then group into `config.batch_size` rows.
    pub fn shuffled_batches(&self, config: ReaderConfig) -> Result<ShuffledBatches<'_>, MlmError> {
        let config = config.validated()?;
        Ok(ShuffledBatches {
            source: RecordIter {
                cursor: Cursor::new(self, true),
                pending: VecDeque::new(),
            },
            buffer: Vec::with_capacity(config.shuffle_buffer),
            rng: DeterministicRng::new(config.seed),
            batch_size: config.batch_size,
            shuffle_buffer: config.shuffle_buffer,
            failed: false,
        })
    }
}

struct Cursor<'a> {
    reader: &'a RecordReader,
    store_idx: usize,
    offset: u64,
    repeat: bool,
}

impl<'a> Cursor<'a> {
    fn new(reader: &'a RecordReader, repeat: bool) -> Self {
        Self {
            reader,
            store_idx: 0,
            offset: 0,
            repeat,
        }
    }

    /// Next chunk of decoded records, or `None` when exhausted.
    fn next_chunk(&mut self) -> Option<Result<Vec<PackedExample>, MlmError>> {
        if self.reader.record_count() == 0 {
            return None;
        }
        loop {
            if self.store_idx >= self.reader.stores.len() {
                if !self.repeat {
                    return None;
                }
                self.store_idx = 0;
            }
            let total = self.reader.stores[self.store_idx].record_count;
            if self.offset >= total {
                self.store_idx += 1;
                self.offset = 0;
                continue;
            }
            let count = (total - self.offset).min(READ_BATCH as u64);
            let chunk = self.reader.read_chunk(self.store_idx, self.offset, count);
            self.offset += count;
            return Some(chunk);
        }
    }
}

/// Single pass over all records.
pub struct RecordIter<'a> {
    cursor: Cursor<'a>,
    pending: VecDeque<PackedExample>,
}

impl Iterator for RecordIter<'_> {
    type Item = Result<PackedExample, MlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pending.is_empty() {
            match self.cursor.next_chunk()? {
                Ok(chunk) => self.pending.extend(chunk),
                Err(err) => return Some(Err(err)),
            }
        }
        self.pending.pop_front().map(Ok)
    }
}

/// Repeating shuffled batch stream returned by
/// [`RecordReader::shuffled_batches`].
///
/// Yields `None` only when the stores hold no records, or after an error has
/// been returned.
pub struct ShuffledBatches<'a> {
    source: RecordIter<'a>,
    buffer: Vec<PackedExample>,
    rng: DeterministicRng,
    batch_size: usize,
    shuffle_buffer: usize,
    failed: bool,
}

impl ShuffledBatches<'_> {
    fn fill_buffer(&mut self) -> Result<(), MlmError> {
        while self.buffer.len() < self.shuffle_buffer {
            match self.source.next() {
                Some(example) => self.buffer.push(example?),
                None => break,
            }
        }
        Ok(())
    }

    fn next_example(&mut self) -> Result<Option<PackedExample>, MlmError> {
        self.fill_buffer()?;
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let idx = self.rng.random_range(0..self.buffer.len());
        Ok(Some(self.buffer.swap_remove(idx)))
    }
}

impl Iterator for ShuffledBatches<'_> {
    type Item = Result<MlmBatch, MlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut batch = MlmBatch::default();
        while batch.len() < self.batch_size {
            match self.next_example() {
                Ok(Some(example)) => batch.push(example),
                Ok(None) => break,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}
