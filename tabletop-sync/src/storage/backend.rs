//! Keyed record backends.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Record families. Each maps to one RocksDB column family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Boards,
    Tokens,
    Meta,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Boards, Family::Tokens, Family::Meta];

    pub fn name(&self) -> &'static str {
        match self {
            Family::Boards => "boards",
            Family::Tokens => "tokens",
            Family::Meta => "meta",
        }
    }
}

/// One write in an atomic batch. `None` deletes the key.
#[derive(Debug, Clone)]
pub struct RecordWrite {
    pub family: Family,
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl RecordWrite {
    pub fn put(family: Family, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            family,
            key: key.into(),
            value: Some(value),
        }
    }

    pub fn delete(family: Family, key: impl Into<String>) -> Self {
        Self {
            family,
            key: key.into(),
            value: None,
        }
    }
}

/// Storage errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backend internal error
    DatabaseError(String),
    /// No record under this key
    NotFound(String),
    /// A record already exists under this key
    AlreadyExists(String),
    /// The stored record failed validation and could not be repaired
    InvalidRecord(String),
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Compression error
    CompressionError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::NotFound(key) => write!(f, "Record not found: {key}"),
            StoreError::AlreadyExists(key) => write!(f, "Record already exists: {key}"),
            StoreError::InvalidRecord(e) => write!(f, "Invalid record: {e}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Synchronous key/value storage for serialized records.
pub trait RecordBackend: Send + Sync {
    fn get(&self, family: Family, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Apply every write, or none of them.
    fn write(&self, writes: Vec<RecordWrite>) -> Result<(), StoreError>;

    /// All keys in `family`, in key order.
    fn keys(&self, family: Family) -> Result<Vec<String>, StoreError>;

    /// Make previous writes durable.
    fn flush(&self) -> Result<(), StoreError>;

    fn put(&self, family: Family, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.write(vec![RecordWrite::put(family, key, value)])
    }

    fn delete(&self, family: Family, key: &str) -> Result<(), StoreError> {
        self.write(vec![RecordWrite::delete(family, key)])
    }

    fn contains(&self, family: Family, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(family, key)?.is_some())
    }
}

/// Non-durable backend for tests and throwaway servers.
#[derive(Default)]
pub struct MemoryBackend {
    families: Mutex<HashMap<Family, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Family, BTreeMap<String, Vec<u8>>>>, StoreError>
    {
        self.families
            .lock()
            .map_err(|_| StoreError::DatabaseError("memory backend lock poisoned".into()))
    }
}

impl RecordBackend for MemoryBackend {
    fn get(&self, family: Family, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .lock()?
            .get(&family)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn write(&self, writes: Vec<RecordWrite>) -> Result<(), StoreError> {
        let mut families = self.lock()?;
        for write in writes {
            let records = families.entry(write.family).or_default();
            match write.value {
                Some(value) => {
                    records.insert(write.key, value);
                }
                None => {
                    records.remove(&write.key);
                }
            }
        }
        Ok(())
    }

    fn keys(&self, family: Family) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()?
            .get(&family)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
