//! A state wrapper that prefixes every key with `namespace/`, giving a
//! sub-agent or sub-task its own slice of a shared store.
//!
//! Grounded on `examples/original_source/tic/state/namespaced.py`.

use crate::state::{ScopeState, StateHandle};

#[derive(Debug)]
pub struct Namespaced {
    inner: StateHandle,
    namespace: String,
}

impl Namespaced {
    pub fn new(inner: StateHandle, namespace: impl Into<String>) -> Result<Self, crate::error::TicError> {
        let namespace = namespace.into();
        if namespace.contains('/') {
            return Err(crate::error::TicError::value_error("Namespace names cannot contain '/'"));
        }
        Ok(Self { inner, namespace })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}/{key}", self.namespace)
    }

    /// Strips the namespace prefix from a fully-qualified key, returning
    /// `None` if the key does not belong to this namespace.
    fn local_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        let (ns, local) = key.rsplit_once('/')?;
        if ns == self.namespace { Some(local) } else { None }
    }
}

impl ScopeState for Namespaced {
    fn get(&self, key: &str) -> Option<crate::value::Value> {
        self.inner.borrow().get(&self.prefixed(key))
    }

    fn set(&mut self, key: &str, value: crate::value::Value) {
        self.inner.borrow_mut().set(&self.prefixed(key), value);
    }

    fn remove(&mut self, key: &str) -> bool {
        self.inner.borrow_mut().remove(&self.prefixed(key))
    }

    fn keys(&self) -> Vec<String> {
        self.inner
            .borrow()
            .keys()
            .iter()
            .filter_map(|k| self.local_name(k).map(str::to_string))
            .collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.inner.borrow().contains(&self.prefixed(key))
    }
}
