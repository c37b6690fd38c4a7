#![warn(missing_docs)]
//! # screen-veil-storage
//!
//! ## Purpose
//! Persists mask-rule selectors per page origin.
//!
//! ## Responsibilities
//! - Derive the storage key for a page origin ([`OriginKey`]).
//! - Load the selector set, failing soft on malformed records.
//! - Overwrite or delete the whole record on every mutation.
//! - Abstract the backing store behind [`KeyValueStore`] so the browser's
//!   local storage and a JSON file are interchangeable.
//!
//! ## Data flow
//! Bootstrap -> [`SelectorPersistence::load`] -> masking engine; every rule
//! toggle -> [`SelectorPersistence::save`]; "clear all" ->
//! [`SelectorPersistence::clear`].
//!
//! ## Ownership and lifetimes
//! Stores are shared through `Rc<dyn KeyValueStore>` because the durable
//! record outlives any single injection on the page.
//!
//! ## Error model
//! Backend failures surface as [`StorageError`] on writes. Reads never fail:
//! unreadable or malformed records load as an empty set and are logged.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, warn};
use thiserror::Error;
use url::Url;

/// Prefix of every mask-rule storage key.
pub const MASK_KEY_PREFIX: &str = "masks_";

/// Durable string key-value store.
pub trait KeyValueStore {
    /// Reads one value.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes one value, replacing any previous one.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes one value; deleting a missing key succeeds.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store. Clones share the same map, like one page's
/// local storage seen from two injections.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of one raw value.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object file (`{ "key": "value", ... }`).
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store at `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(StorageError::Codec),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(error) => Err(StorageError::Io(error)),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let encoded = serde_json::to_string_pretty(entries).map_err(StorageError::Codec)?;
        fs::write(&self.path, encoded).map_err(StorageError::Io)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Storage key scoping mask rules to one origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginKey(String);

impl OriginKey {
    /// Derives `masks_<host>` (plus `:<port>` for non-default ports).
    ///
    /// Pages without a host (`file:`, `about:`) fall back to the serialized
    /// origin so they still get a stable, non-shared key.
    pub fn from_url(url: &Url) -> Self {
        let scope = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => url.origin().ascii_serialization(),
        };
        Self(format!("{MASK_KEY_PREFIX}{scope}"))
    }

    /// Key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Loads and saves the selector set of one origin.
#[derive(Clone)]
pub struct SelectorPersistence {
    store: Rc<dyn KeyValueStore>,
}

impl SelectorPersistence {
    /// Wraps a store.
    pub fn new(store: Rc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the selector set; never fails.
    ///
    /// Backend errors, malformed JSON, and non-string entries all yield an
    /// empty set with a warning.
    pub fn load(&self, key: &OriginKey) -> BTreeSet<String> {
        let raw = match self.store.get(key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeSet::new(),
            Err(error) => {
                warn!("mask storage read failed for {}: {error}", key.as_str());
                return BTreeSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(selectors) => {
                let set: BTreeSet<String> = selectors.into_iter().collect();
                debug!("loaded {} mask rules for {}", set.len(), key.as_str());
                set
            }
            Err(error) => {
                warn!("ignoring malformed mask record for {}: {error}", key.as_str());
                BTreeSet::new()
            }
        }
    }

    /// Overwrites the record with `selectors` as a JSON array.
    ///
    /// # Errors
    /// Returns [`StorageError`] when encoding or the backend write fails.
    pub fn save(&self, key: &OriginKey, selectors: &BTreeSet<String>) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(&selectors.iter().collect::<Vec<_>>())
            .map_err(StorageError::Codec)?;
        self.store.set(key.as_str(), &encoded)
    }

    /// Deletes the record.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the backend write fails.
    pub fn clear(&self, key: &OriginKey) -> Result<(), StorageError> {
        self.store.remove(key.as_str())
    }
}

/// Storage error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding/decoding failure.
    #[error("storage codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
