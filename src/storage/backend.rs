//! Key-value storage backends.
//!
//! The consensus core only ever touches the in-memory chain state; these
//! backends persist committed snapshots between restarts. `InMemoryStore` is
//! for tests, `BinaryStore` writes a compact bincode file.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Storage key bytes
pub type StorageKey = Vec<u8>;

/// Storage value bytes
pub type StorageValue = Vec<u8>;

/// Trait for storage backends
pub trait StorageBackend: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>>;

    /// Set a value for a key
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key, returning whether it existed
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// List all keys with a given prefix, in key order
    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>>;

    /// Flush pending writes to durable storage
    fn flush(&self) -> Result<()>;
}

fn lock_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Storage(format!("lock poisoned: {}", e))
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Ephemeral in-memory backend for tests
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<BTreeMap<StorageKey, StorageValue>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for InMemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        let data = self.data.read().map_err(lock_err)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(lock_err)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut data = self.data.write().map_err(lock_err)?;
        Ok(data.remove(key).is_some())
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        let data = self.data.read().map_err(lock_err)?;
        Ok(data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINARY FILE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// File-backed store holding the whole map as one bincode blob
#[derive(Debug)]
pub struct BinaryStore {
    path: PathBuf,
    cache: RwLock<BTreeMap<StorageKey, StorageValue>>,
    dirty: RwLock<bool>,
}

impl BinaryStore {
    /// Open (or create) a store rooted at the given directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| Error::Storage(format!("create storage dir: {}", e)))?;
        }

        let store = Self {
            path: dir.join("state.bin"),
            cache: RwLock::new(BTreeMap::new()),
            dirty: RwLock::new(false),
        };
        store.load_from_disk()?;
        Ok(store)
    }

    fn load_from_disk(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut file =
            File::open(&self.path).map_err(|e| Error::Storage(format!("open state file: {}", e)))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| Error::Storage(format!("read state file: {}", e)))?;

        let loaded: BTreeMap<StorageKey, StorageValue> = bincode::deserialize(&bytes)
            .map_err(|e| Error::Storage(format!("decode state file: {}", e)))?;

        let mut cache = self.cache.write().map_err(lock_err)?;
        *cache = loaded;
        Ok(())
    }

    fn save_to_disk(&self) -> Result<()> {
        let cache = self.cache.read().map_err(lock_err)?;
        let bytes = bincode::serialize(&*cache)
            .map_err(|e| Error::Storage(format!("encode state file: {}", e)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::Storage(format!("open state file for write: {}", e)))?;
        file.write_all(&bytes)
            .map_err(|e| Error::Storage(format!("write state file: {}", e)))?;

        *self.dirty.write().map_err(lock_err)? = false;
        Ok(())
    }
}

impl StorageBackend for BinaryStore {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        let cache = self.cache.read().map_err(lock_err)?;
        Ok(cache.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut cache = self.cache.write().map_err(lock_err)?;
        cache.insert(key.to_vec(), value.to_vec());
        *self.dirty.write().map_err(lock_err)? = true;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut cache = self.cache.write().map_err(lock_err)?;
        let existed = cache.remove(key).is_some();
        if existed {
            *self.dirty.write().map_err(lock_err)? = true;
        }
        Ok(existed)
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        let cache = self.cache.read().map_err(lock_err)?;
        Ok(cache
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn flush(&self) -> Result<()> {
        let dirty = *self.dirty.read().map_err(lock_err)?;
        if dirty {
            self.save_to_disk()?;
        }
        Ok(())
    }
}

impl Drop for BinaryStore {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPED WRAPPER
// ═══════════════════════════════════════════════════════════════════════════════

/// Type-safe bincode wrapper around a backend
pub struct TypedStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> TypedStore<B> {
    /// Wrap a backend
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get a typed value
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.backend.get(key)? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)
                    .map_err(|e| Error::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Set a typed value
    pub fn set<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let bytes =
            bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.backend.set(key, &bytes)
    }

    /// Delete a value
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.backend.delete(key)
    }

    /// List keys with prefix
    pub fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        self.backend.list_prefix(prefix)
    }

    /// Flush pending writes
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY PREFIXES
// ═══════════════════════════════════════════════════════════════════════════════

/// Key prefixes for the persisted entity families
pub mod prefixes {
    /// CDP records
    pub const CDP: &[u8] = b"cdp:";
    /// Ledger accounts
    pub const ACCOUNT: &[u8] = b"acct:";
    /// Everything else (params, feeds, orders, receipts)
    pub const META: &[u8] = b"meta:";
}

/// Concatenate a prefix and a key
pub fn make_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(prefix.len() + key.len());
    result.extend_from_slice(prefix);
    result.extend_from_slice(key);
    result
}
