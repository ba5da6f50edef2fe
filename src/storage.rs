//! Durable key-value storage for models, rounds and the audit log
//!
//! The ledger and registry talk to a [`KvStore`]; production uses RocksDB,
//! tests can use [`MemoryStorage`] to exercise failure paths.

use crate::config::{CompressionType, StorageConfig};
use crate::errors::{RgsResult, StorageError};
use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A single mutation inside a [`StorageBatch`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Group of mutations applied atomically
#[derive(Clone, Debug, Default)]
pub struct StorageBatch {
    ops: Vec<BatchOp>,
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete(key.into()));
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Storage interface used by the registry and ledgers
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> RgsResult<Option<Vec<u8>>>;

    /// Apply every op in the batch or none of them. Returns only after the
    /// batch is durable.
    fn write(&self, batch: StorageBatch) -> RgsResult<()>;

    /// Key-ordered scan of entries whose key starts with `prefix`
    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> RgsResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Like [`KvStore::scan_prefix`], starting from the largest key
    fn scan_prefix_rev(&self, prefix: &[u8], limit: usize) -> RgsResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Smallest key greater than every key starting with `prefix`, `None` when
/// the prefix is all `0xff`
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let end = prefix.iter().rposition(|b| *b != 0xff)?;
    let mut upper = prefix[..=end].to_vec();
    upper[end] += 1;
    Some(upper)
}

/// RocksDB-backed storage
#[derive(Clone)]
pub struct RocksStorage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl RocksStorage {
    /// Open with default tuning at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> RgsResult<Self> {
        let config = StorageConfig {
            data_directory: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        };
        Self::open_with_config(&config)
    }

    pub fn open_with_config(config: &StorageConfig) -> RgsResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number as i32);
        opts.set_compression_type(match config.compression_type {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        std::fs::create_dir_all(&config.data_directory)
            .map_err(|e| StorageError::OpenFailed(format!("{}: {}", config.data_directory, e)))?;
        let db = DB::open(&opts, &config.data_directory)
            .map_err(|e| StorageError::OpenFailed(format!("{}: {}", config.data_directory, e)))?;

        tracing::info!(
            path = %config.data_directory,
            sync_writes = config.sync_writes,
            "opened round store"
        );

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.sync_writes,
        })
    }
}

impl KvStore for RocksStorage {
    fn get(&self, key: &[u8]) -> RgsResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()).into())
    }

    fn write(&self, batch: StorageBatch) -> RgsResult<()> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => rocks_batch.put(key, value),
                BatchOp::Delete(key) => rocks_batch.delete(key),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db
            .write_opt(rocks_batch, &write_opts)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> RgsResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    fn scan_prefix_rev(&self, prefix: &[u8], limit: usize) -> RgsResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let upper = prefix_upper_bound(prefix);
        let mode = match &upper {
            Some(upper) => IteratorMode::From(upper.as_slice(), Direction::Reverse),
            None => IteratorMode::End,
        };

        let mut rows = Vec::new();
        for item in self.db.iterator(mode) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            // A reverse seek lands on the bound itself when it exists
            if upper.as_deref().is_some_and(|upper| &*key >= upper) {
                continue;
            }
            if !key.starts_with(prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }
}

/// In-process storage with switchable write failures
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every subsequent write fails without touching the entries
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStorage {
    fn get(&self, key: &[u8]) -> RgsResult<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::ReadFailed("memory store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, batch: StorageBatch) -> RgsResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("injected write failure".to_string()).into());
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::WriteFailed("memory store poisoned".to_string()))?;
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> RgsResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::ReadFailed("memory store poisoned".to_string()))?;
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_prefix_rev(&self, prefix: &[u8], limit: usize) -> RgsResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::ReadFailed("memory store poisoned".to_string()))?;
        let range = match prefix_upper_bound(prefix) {
            Some(upper) => entries.range(prefix.to_vec()..upper),
            None => entries.range(prefix.to_vec()..),
        };
        Ok(range
            .rev()
            .filter(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store(store: &dyn KvStore) {
        let mut batch = StorageBatch::new();
        batch.put("round:a", "1").put("round:b", "2").put("other:c", "3");
        store.write(batch).unwrap();

        assert_eq!(store.get(b"round:a").unwrap(), Some(b"1".to_vec()));

        let rows = store.scan_prefix(b"round:", 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"round:a".to_vec());

        let mut batch = StorageBatch::new();
        batch.delete("round:a").put("round:d", "4");
        store.write(batch).unwrap();

        assert_eq!(store.get(b"round:a").unwrap(), None);
        let keys: Vec<_> = store
            .scan_prefix(b"round:", 10)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"round:b".to_vec(), b"round:d".to_vec()]);
        assert_eq!(store.scan_prefix(b"round:", 1).unwrap().len(), 1);

        // Neighbours on both sides of the prefix stay out of a reverse scan
        let mut batch = StorageBatch::new();
        batch.put("round;", "x").put("round", "y");
        store.write(batch).unwrap();
        let newest: Vec<_> = store
            .scan_prefix_rev(b"round:", 10)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(newest, vec![b"round:d".to_vec(), b"round:b".to_vec()]);
        assert_eq!(store.scan_prefix_rev(b"round:", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound(b"round:"), Some(b"round;".to_vec()));
        assert_eq!(prefix_upper_bound(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
    }

    #[test]
    fn test_rocks_storage_batch_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStorage::open(dir.path()).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_memory_storage_batch_and_scan() {
        exercise_store(&MemoryStorage::new());
    }

    #[test]
    fn test_memory_storage_injected_failure_leaves_entries_untouched() {
        let store = MemoryStorage::new();
        store.fail_writes(true);

        let mut batch = StorageBatch::new();
        batch.put("k", "v");
        assert!(store.write(batch).is_err());
        assert!(store.is_empty());

        store.fail_writes(false);
        let mut batch = StorageBatch::new();
        batch.put("k", "v");
        store.write(batch).unwrap();
        assert_eq!(store.len(), 1);
    }
}
