//! RocksDB-backed record store.
//!
//! Column families:
//! - `boards` — one `RemoteBoardModel` per board id
//! - `tokens` — one library `TokenData` per token id
//! - `meta`   — small bookkeeping records (`active.db`, `all_boards.db`)
//!
//! Values are LZ4-compressed JSON with the uncompressed size prepended.

use std::path::{Path, PathBuf};

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};

use super::backend::{Family, RecordBackend, RecordWrite, StoreError};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tabletop_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create config for testing (small caches).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

pub struct RocksBackend {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksBackend {
    /// Open the store, creating the database and column families if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Family::ALL
            .iter()
            .map(|family| ColumnFamilyDescriptor::new(family.name(), Self::cf_options(*family, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;
        log::info!("Opened record store at {}", config.path.display());

        Ok(Self { db, config })
    }

    fn cf_options(family: Family, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match family {
            // Values are already LZ4 framed
            Family::Boards | Family::Tokens => {
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(4);
            }
            Family::Meta => {
                opts.set_max_write_buffer_number(2);
            }
        }

        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, family: Family) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db.cf_handle(family.name()).ok_or_else(|| {
            StoreError::DatabaseError(format!("Column family '{}' not found", family.name()))
        })
    }
}

impl RecordBackend for RocksBackend {
    fn get(&self, family: Family, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(family)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(compressed) => lz4_flex::decompress_size_prepended(&compressed)
                .map(Some)
                .map_err(|e| StoreError::CompressionError(e.to_string())),
            None => Ok(None),
        }
    }

    fn write(&self, writes: Vec<RecordWrite>) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        for write in &writes {
            let cf = self.cf(write.family)?;
            match &write.value {
                Some(value) => {
                    batch.put_cf(cf, write.key.as_bytes(), lz4_flex::compress_prepend_size(value))
                }
                None => batch.delete_cf(cf, write.key.as_bytes()),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        log::trace!("Wrote batch of {} records", writes.len());
        Ok(())
    }

    fn keys(&self, family: Family) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(family)?;
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::DeserializationError(format!("Invalid key: {e}")))?;
            keys.push(key);
        }
        Ok(keys)
    }

    fn flush(&self) -> Result<(), StoreError> {
        for family in Family::ALL {
            self.db.flush_cf(self.cf(family)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &tempfile::TempDir) -> RocksBackend {
        RocksBackend::open(StoreConfig::for_testing(dir.path())).unwrap()
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert!(store.path().exists());
    }

    #[test]
    fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let value = br#"{"id":"b1","name":"Crypt","padding":"aaaaaaaaaaaaaaaaaaaaaaaa"}"#.to_vec();

        store.put(Family::Boards, "b1", value.clone()).unwrap();
        assert_eq!(store.get(Family::Boards, "b1").unwrap(), Some(value));
        assert_eq!(store.get(Family::Tokens, "b1").unwrap(), None);
    }

    #[test]
    fn test_batch_write_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store
            .write(vec![
                RecordWrite::put(Family::Tokens, "t2", b"two".to_vec()),
                RecordWrite::put(Family::Tokens, "t1", b"one".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.keys(Family::Tokens).unwrap(), vec!["t1", "t2"]);

        store.delete(Family::Tokens, "t1").unwrap();
        assert_eq!(store.keys(Family::Tokens).unwrap(), vec!["t2"]);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(&dir);
            store.put(Family::Meta, "active.db", b"\"b1\"".to_vec()).unwrap();
            store.flush().unwrap();
        }

        let store = open(&dir);
        assert_eq!(
            store.get(Family::Meta, "active.db").unwrap(),
            Some(b"\"b1\"".to_vec())
        );
    }

    #[test]
    fn test_corrupt_value_is_compression_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let cf = store.cf(Family::Boards).unwrap();
        store.db.put_cf(cf, b"broken", [10, 0, 0, 0, 0xff]).unwrap();

        assert!(matches!(
            store.get(Family::Boards, "broken"),
            Err(StoreError::CompressionError(_))
        ));
    }
}
