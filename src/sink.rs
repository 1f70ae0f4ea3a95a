use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::codec::{decode_bitcode_payload, encode_bitcode_payload};
use crate::constants::records::{
    DEFAULT_STORE_FILENAME, META_KEY, RECORD_KEY_PREFIX, STORE_VERSION,
};
use crate::errors::MlmError;
use crate::types::RecordBytes;

/// Destination for encoded example records.
///
/// `append` receives every record produced from one paragraph; implementations
/// must write the batch as a unit with respect to other appends.
pub trait RecordSink: Send + Sync {
    /// Append an ordered batch of records.
    fn append(&self, records: &[RecordBytes]) -> Result<(), MlmError>;
    /// Flush and finalize. Appends after `close` fail.
    fn close(&self) -> Result<(), MlmError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
/// Versioned metadata header stored in record stores.
pub(crate) struct StoreMeta {
    pub(crate) version: u8,
    pub(crate) capacity: u64,
    pub(crate) record_count: u64,
}

pub(crate) fn encode_store_meta(meta: &StoreMeta) -> Vec<u8> {
    encode_bitcode_payload(&bitcode::encode(meta))
}

pub(crate) fn decode_store_meta(bytes: &[u8]) -> Result<StoreMeta, MlmError> {
    let raw = decode_bitcode_payload(bytes)?;
    bitcode::decode(raw).map_err(|err| {
        MlmError::CorruptRecord(format!("failed to decode record store metadata: {err}"))
    })
}

/// Read and version-check the metadata entry, if the store has one.
pub(crate) fn read_store_meta(store: &DataStore) -> Result<Option<StoreMeta>, MlmError> {
    let Some(entry) = store.read(META_KEY).map_err(map_store_err)? else {
        return Ok(None);
    };
    let meta = decode_store_meta(entry.as_ref())?;
    if meta.version != STORE_VERSION {
        return Err(MlmError::CorruptRecord(format!(
            "record store version mismatch (expected {}, found {})",
            STORE_VERSION, meta.version
        )));
    }
    Ok(Some(meta))
}

pub(crate) fn record_key(index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECORD_KEY_PREFIX.len() + 8);
    key.extend_from_slice(RECORD_KEY_PREFIX);
    key.extend_from_slice(&index.to_le_bytes());
    key
}

/// Count the contiguous records of a store whose metadata was never written
/// (the writing run did not reach `close`).
fn recover_record_count(store: &DataStore, path: &Path) -> Result<u64, MlmError> {
    let mut count = 0u64;
    while store
        .read(&record_key(count))
        .map_err(map_store_err)?
        .is_some()
    {
        count += 1;
    }
    if count > 0 {
        warn!(
            path = %path.display(),
            recovered = count,
            "record store has no metadata; continuing after existing records"
        );
    }
    Ok(count)
}

pub(crate) fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_STORE_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), MlmError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub(crate) fn map_store_err(err: io::Error) -> MlmError {
    MlmError::Sink(err.to_string())
}

/// Append-only record store backed by a single `simd-r-drive` file.
///
/// Records are keyed by a contiguous sequence number; the metadata entry
/// (version, capacity, record count) is rewritten on every `close`. Reopening
/// an existing store continues after its recorded count.
pub struct StoreRecordSink {
    store: DataStore,
    path: PathBuf,
    capacity: usize,
    next_index: Mutex<u64>,
    closed: AtomicBool,
}

impl fmt::Debug for StoreRecordSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRecordSink")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl StoreRecordSink {
    /// Open (or create) a record store at `path`.
    ///
    /// A directory path resolves to `DEFAULT_STORE_FILENAME` inside it. A store
    /// left without metadata by an interrupted run resumes after its last
    /// contiguous record, so existing records are never overwritten.
    pub fn open<P: Into<PathBuf>>(path: P, capacity: usize) -> Result<Self, MlmError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        let next_index = match read_store_meta(&store)? {
            Some(meta) => {
                if meta.capacity != capacity as u64 {
                    return Err(MlmError::SchemaViolation {
                        field: "capacity",
                        expected: capacity,
                        actual: meta.capacity as usize,
                    });
                }
                meta.record_count
            }
            None => recover_record_count(&store, &path)?,
        };
        debug!(path = %path.display(), capacity, next_index, "opened record store");
        Ok(Self {
            store,
            path,
            capacity,
            next_index: Mutex::new(next_index),
            closed: AtomicBool::new(false),
        })
    }

    /// Resolved store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capacity recorded in the store metadata.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records written so far (including those from earlier sessions).
    pub fn record_count(&self) -> u64 {
        *self.next_index.lock().expect("record index poisoned")
    }
}

impl RecordSink for StoreRecordSink {
    fn append(&self, records: &[RecordBytes]) -> Result<(), MlmError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MlmError::Sink(format!(
                "append to closed record store {}",
                self.path.display()
            )));
        }
        if records.is_empty() {
            return Ok(());
        }
        let mut next_index = self.next_index.lock().expect("record index poisoned");
        let keys: Vec<Vec<u8>> = (0..records.len() as u64)
            .map(|offset| record_key(*next_index + offset))
            .collect();
        let entry_refs: Vec<(&[u8], &[u8])> = keys
            .iter()
            .zip(records.iter())
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
            .collect();
        self.store
            .batch_write(&entry_refs)
            .map_err(map_store_err)?;
        *next_index += records.len() as u64;
        Ok(())
    }

    fn close(&self) -> Result<(), MlmError> {
        let record_count = *self.next_index.lock().expect("record index poisoned");
        let meta = StoreMeta {
            version: STORE_VERSION,
            capacity: self.capacity as u64,
            record_count,
        };
        self.store
            .write(META_KEY, encode_store_meta(&meta).as_slice())
            .map_err(map_store_err)?;
        self.closed.store(true, Ordering::Release);
        debug!(path = %self.path.display(), record_count, "closed record store");
        Ok(())
    }
}

/// In-memory sink that keeps every appended record in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<RecordBytes>>,
    appends: Mutex<Vec<usize>>,
    closed: AtomicBool,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records appended so far.
    pub fn records(&self) -> Vec<RecordBytes> {
        self.records.lock().expect("memory sink poisoned").clone()
    }

    /// Size of each `append` call, in call order.
    pub fn append_sizes(&self) -> Vec<usize> {
        self.appends.lock().expect("memory sink poisoned").clone()
    }

    /// Number of records appended.
    pub fn len(&self) -> usize {
        self.records.lock().expect("memory sink poisoned").len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl RecordSink for MemorySink {
    fn append(&self, records: &[RecordBytes]) -> Result<(), MlmError> {
        if self.is_closed() {
            return Err(MlmError::Sink("append to closed memory sink".into()));
        }
        let mut stored = self.records.lock().expect("memory sink poisoned");
        stored.extend_from_slice(records);
        self.appends
            .lock()
            .expect("memory sink poisoned")
            .push(records.len());
        Ok(())
    }

    fn close(&self) -> Result<(), MlmError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_sink_assigns_contiguous_keys_and_writes_meta_on_close() {
        let dir = tempdir().unwrap();
        let sink = StoreRecordSink::open(dir.path().join("records.bin"), 4).unwrap();
        sink.append(&[vec![1], vec![2]]).unwrap();
        sink.append(&[]).unwrap();
        sink.append(&[vec![3]]).unwrap();
        assert_eq!(sink.record_count(), 3);
        sink.close().unwrap();

        let third = sink.store.read(&record_key(2)).unwrap().unwrap();
        let third: &[u8] = third.as_ref();
        assert_eq!(third, &[3u8]);
        let meta = read_store_meta(&sink.store).unwrap().unwrap();
        assert_eq!(
            meta,
            StoreMeta {
                version: STORE_VERSION,
                capacity: 4,
                record_count: 3
            }
        );
    }

    #[test]
    fn store_sink_rejects_appends_after_close() {
        let dir = tempdir().unwrap();
        let sink = StoreRecordSink::open(dir.path().join("records.bin"), 4).unwrap();
        sink.close().unwrap();
        assert!(matches!(sink.append(&[vec![1]]), Err(MlmError::Sink(_))));
    }

    #[test]
    fn reopened_store_continues_numbering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.bin");
        {
            let sink = StoreRecordSink::open(&path, 4).unwrap();
            sink.append(&[vec![1], vec![2]]).unwrap();
            sink.close().unwrap();
        }
        let sink = StoreRecordSink::open(&path, 4).unwrap();
        assert_eq!(sink.record_count(), 2);
        sink.append(&[vec![3]]).unwrap();
        assert_eq!(sink.record_count(), 3);
    }

    #[test]
    fn reopening_unclosed_store_keeps_existing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.bin");
        {
            let sink = StoreRecordSink::open(&path, 4).unwrap();
            sink.append(&[vec![1], vec![2]]).unwrap();
        }
        let sink = StoreRecordSink::open(&path, 4).unwrap();
        assert_eq!(sink.record_count(), 2);
        sink.append(&[vec![3]]).unwrap();
        sink.close().unwrap();

        let first = sink.store.read(&record_key(0)).unwrap().unwrap();
        let first: &[u8] = first.as_ref();
        assert_eq!(first, &[1u8]);
        let third = sink.store.read(&record_key(2)).unwrap().unwrap();
        let third: &[u8] = third.as_ref();
        assert_eq!(third, &[3u8]);
        assert_eq!(read_store_meta(&sink.store).unwrap().unwrap().record_count, 3);
    }

    #[test]
    fn reopening_with_other_capacity_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.bin");
        {
            let sink = StoreRecordSink::open(&path, 4).unwrap();
            sink.close().unwrap();
        }
        let err = StoreRecordSink::open(&path, 8).unwrap_err();
        assert!(matches!(
            err,
            MlmError::SchemaViolation {
                field: "capacity",
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn directory_path_resolves_to_default_filename() {
        let dir = tempdir().unwrap();
        let sink = StoreRecordSink::open(dir.path(), 4).unwrap();
        assert_eq!(sink.path(), dir.path().join(DEFAULT_STORE_FILENAME));
    }

    #[test]
    fn memory_sink_tracks_batches() {
        let sink = MemorySink::new();
        sink.append(&[vec![1], vec![2]]).unwrap();
        sink.append(&[vec![3]]).unwrap();
        assert_eq!(sink.records(), vec![vec![1], vec![2], vec![3]]);
        assert_eq!(sink.append_sizes(), vec![2, 1]);
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(sink.append(&[vec![4]]).is_err());
    }
}
