//! The mutable overlay every [`super::Versioned`] and [`super::Scoped`]
//! writes through. Grounded on the `Ephemeral` class referenced throughout
//! `examples/original_source/tic/state/{versioned,scoped,closure}.py`
//! (its own source file was not part of the retrieved index, so this
//! reconstructs it from its callers: an insertion-ordered name→value map).

use indexmap::IndexMap;

use crate::{state::ScopeState, value::Value};

#[derive(Debug, Default, Clone)]
pub struct Ephemeral {
    values: IndexMap<String, Value>,
}

impl Ephemeral {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl ScopeState for Ephemeral {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> bool {
        self.values.shift_remove(key).is_some()
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}
