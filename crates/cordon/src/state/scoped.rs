//! A local scope that falls back to a parent for reads; all writes stay
//! local. Used for function-call frames and comprehension bodies so their
//! temporaries never leak into the enclosing scope.
//!
//! Grounded on `examples/original_source/tic/state/scoped.py`.

use crate::state::{Ephemeral, ScopeState, StateHandle};

#[derive(Debug)]
pub struct Scoped {
    local: Ephemeral,
    parent: StateHandle,
}

impl Scoped {
    #[must_use]
    pub fn new(parent: StateHandle) -> Self {
        Self { local: Ephemeral::new(), parent }
    }
}

impl ScopeState for Scoped {
    fn get(&self, key: &str) -> Option<crate::value::Value> {
        if self.local.contains(key) {
            return self.local.get(key);
        }
        self.parent.borrow().get(key)
    }

    fn set(&mut self, key: &str, value: crate::value::Value) {
        self.local.set(key, value);
    }

    fn remove(&mut self, _key: &str) -> bool {
        false
    }

    fn keys(&self) -> Vec<String> {
        self.local.keys()
    }

    fn contains(&self, key: &str) -> bool {
        self.local.contains(key) || self.parent.borrow().contains(key)
    }
}
