//! Byte-oriented key/value storage backing [`super::Versioned`].
//!
//! Grounded on `examples/original_source/tic/state/kv.py` (`KVStore`/
//! `Memory`). The Python `Memory` store pickles values when `as_bytes` is
//! set; this crate's two storage modes (`Json`/`Postcard`) play the same
//! role, using `serde` rather than `pickle`.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::freeze::StoredValue;

/// Which wire format [`MemoryKv`] serializes [`StoredValue`]s with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Human-readable, used for debugging and `view()` rendering paths.
    Json,
    /// Compact binary, the default for production storage.
    Postcard,
}

/// A byte/object map. Frozen values go in as [`StoredValue`]; the store is
/// responsible only for serialization and persistence, never for
/// freeze/rehydrate semantics.
pub trait KvStore: std::fmt::Debug {
    fn get(&self, key: &str) -> Option<StoredValue>;
    fn set(&mut self, key: &str, value: StoredValue);
    fn get_many(&self, keys: &[&str]) -> HashMap<String, StoredValue>;
    fn set_many(&mut self, entries: Vec<(String, StoredValue)>);
    fn contains(&self, key: &str) -> bool;
}

/// An in-memory [`KvStore`], round-tripping every value through its
/// configured [`StorageMode`] so storage-layer bugs (non-serializable
/// frozen values) surface in tests the same way they would against a real
/// backing store.
#[derive(Debug)]
pub struct MemoryKv {
    mode: StorageMode,
    memory: HashMap<String, Vec<u8>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new(mode: StorageMode) -> Self {
        Self { mode, memory: HashMap::new() }
    }

    /// Convenience constructor for the shared handle [`super::Versioned`]
    /// expects, so callers don't have to spell out `Rc<RefCell<_>>`.
    #[must_use]
    pub fn handle(mode: StorageMode) -> Rc<RefCell<dyn KvStore>> {
        Rc::new(RefCell::new(Self::new(mode)))
    }

    fn encode(&self, value: &StoredValue) -> Vec<u8> {
        match self.mode {
            StorageMode::Json => serde_json::to_vec(value).expect("StoredValue always serializes"),
            StorageMode::Postcard => postcard::to_allocvec(value).expect("StoredValue always serializes"),
        }
    }

    fn decode(&self, bytes: &[u8]) -> StoredValue {
        match self.mode {
            StorageMode::Json => serde_json::from_slice(bytes).expect("stored bytes match StoredValue"),
            StorageMode::Postcard => postcard::from_bytes(bytes).expect("stored bytes match StoredValue"),
        }
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Option<StoredValue> {
        self.memory.get(key).map(|bytes| self.decode(bytes))
    }

    fn set(&mut self, key: &str, value: StoredValue) {
        let bytes = self.encode(&value);
        self.memory.insert(key.to_string(), bytes);
    }

    fn get_many(&self, keys: &[&str]) -> HashMap<String, StoredValue> {
        keys.iter()
            .filter_map(|k| self.memory.get(*k).map(|bytes| ((*k).to_string(), self.decode(bytes))))
            .collect()
    }

    fn set_many(&mut self, entries: Vec<(String, StoredValue)>) {
        for (key, value) in entries {
            self.set(&key, value);
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.memory.contains_key(key)
    }
}
