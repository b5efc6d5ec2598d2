//! Write-back cache of typed records over a [`RecordBackend`].
//!
//! Records load on first access. A loaded record that fails validation is
//! corrected once and checked again; a record that is still invalid is
//! reported as [`StoreError::InvalidRecord`]. Changes stay in memory until
//! [`StorageCache::flush_dirty`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tabletop_core::{RemoteBoardModel, TokenData, ValidationError};

use super::backend::{Family, RecordBackend, RecordWrite, StoreError};

/// A value that can live in a [`StorageCache`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Used in log lines.
    const TYPE_NAME: &'static str;
    const FAMILY: Family;

    fn validate(&self) -> Result<(), ValidationError>;

    /// Repair what can be repaired in a legacy record.
    fn correct(&mut self);
}

impl Record for RemoteBoardModel {
    const TYPE_NAME: &'static str = "board";
    const FAMILY: Family = Family::Boards;

    fn validate(&self) -> Result<(), ValidationError> {
        RemoteBoardModel::validate(self)
    }

    fn correct(&mut self) {
        self.fill_defaults();
    }
}

impl Record for TokenData {
    const TYPE_NAME: &'static str = "token";
    const FAMILY: Family = Family::Tokens;

    fn validate(&self) -> Result<(), ValidationError> {
        TokenData::validate(self)
    }

    fn correct(&mut self) {
        self.fill_defaults();
    }
}

struct Entry<T> {
    value: T,
    dirty: bool,
}

pub struct StorageCache<T: Record> {
    backend: Arc<dyn RecordBackend>,
    entries: HashMap<String, Entry<T>>,
}

impl<T: Record> StorageCache<T> {
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self {
            backend,
            entries: HashMap::new(),
        }
    }

    /// The record under `key`, loading it if needed.
    pub fn get(&mut self, key: &str) -> Result<T, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            return Ok(entry.value.clone());
        }

        let bytes = self
            .backend
            .get(T::FAMILY, key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let mut value: T = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::DeserializationError(format!("{} {key}: {e}", T::TYPE_NAME)))?;

        let mut dirty = false;
        if let Err(e) = value.validate() {
            log::warn!("Stored {} {key} is invalid ({e}), correcting", T::TYPE_NAME);
            value.correct();
            value.validate().map_err(|e| {
                log::error!("Stored {} {key} could not be corrected: {e}", T::TYPE_NAME);
                StoreError::InvalidRecord(format!("{} {key}: {e}", T::TYPE_NAME))
            })?;
            dirty = true;
        }

        log::debug!("Loaded {} {key}", T::TYPE_NAME);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                dirty,
            },
        );
        Ok(value)
    }

    /// Add a record that must not exist yet.
    pub fn add_new(&mut self, key: &str, value: T) -> Result<(), StoreError> {
        if self.entries.contains_key(key) || self.backend.contains(T::FAMILY, key)? {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        self.entries
            .insert(key.to_string(), Entry { value, dirty: true });
        Ok(())
    }

    /// Replace the record under `key`, adding it if there is none.
    pub fn update(&mut self, key: &str, value: T) -> Result<(), StoreError> {
        match self.get(key) {
            Ok(_)
            | Err(StoreError::InvalidRecord(_))
            | Err(StoreError::DeserializationError(_)) => {
                self.entries
                    .insert(key.to_string(), Entry { value, dirty: true });
                Ok(())
            }
            Err(StoreError::NotFound(_)) => self.add_new(key, value),
            Err(e) => Err(e),
        }
    }

    /// Every key, stored or cached.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: BTreeSet<String> = self.backend.keys(T::FAMILY)?.into_iter().collect();
        keys.extend(self.entries.keys().cloned());
        Ok(keys.into_iter().collect())
    }

    pub fn dirty_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.dirty).count()
    }

    /// Write every dirty record in one batch. Returns how many were saved.
    ///
    /// A record that fails to serialize is logged and stays dirty.
    pub fn flush_dirty(&mut self) -> Result<usize, StoreError> {
        let mut writes = Vec::new();
        for (key, entry) in self.entries.iter().filter(|(_, entry)| entry.dirty) {
            match serde_json::to_vec(&entry.value) {
                Ok(bytes) => writes.push(RecordWrite::put(T::FAMILY, key.clone(), bytes)),
                Err(e) => log::error!("Failed to serialize {} {key}: {e}", T::TYPE_NAME),
            }
        }
        if writes.is_empty() {
            return Ok(0);
        }

        let saved: Vec<String> = writes.iter().map(|write| write.key.clone()).collect();
        self.backend.write(writes)?;
        for key in &saved {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.dirty = false;
            }
        }
        log::debug!("Flushed {} {} records", saved.len(), T::TYPE_NAME);
        Ok(saved.len())
    }
}
