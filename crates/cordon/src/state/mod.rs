//! State abstractions the evaluator reads and writes through.
//!
//! Grounded on `examples/original_source/tic/state/core.py`'s `State` ABC.
//! Python's `base_store` property (walk wrapper layers down to the ultimate
//! backing store) has no callers left once `Namespaced`/`Scoped` are
//! expressed over a shared handle, so it is not carried over literally —
//! callers hold the handle to the layer they actually want.

mod closure;
mod ephemeral;
mod kv;
mod namespaced;
mod scoped;
mod versioned;

pub use closure::Closure;
pub use ephemeral::Ephemeral;
pub use kv::{KvStore, MemoryKv, StorageMode};
pub use namespaced::Namespaced;
pub use scoped::Scoped;
pub use versioned::Versioned;

use std::{cell::RefCell, fmt, rc::Rc};

use crate::value::Value;

/// A readable/writable name-to-value store. Implemented by every state
/// layer (`Ephemeral`, `Scoped`, `Versioned`, `Namespaced`, `Closure`).
pub trait ScopeState: fmt::Debug {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value);
    /// Returns `true` if a value was present and removed.
    fn remove(&mut self, key: &str) -> bool;
    fn keys(&self) -> Vec<String>;
    fn contains(&self, key: &str) -> bool;
}

/// Shared handle to a state layer. `Rc<RefCell<_>>` rather than a bare
/// reference because a closure captured inside a function value must be
/// able to outlive the statement that created it and keep observing writes
/// made through any other handle to the same layer (late binding).
pub type StateHandle = Rc<RefCell<dyn ScopeState>>;

pub fn items(state: &dyn ScopeState) -> Vec<(String, Value)> {
    state.keys().into_iter().filter_map(|k| state.get(&k).map(|v| (k, v))).collect()
}
