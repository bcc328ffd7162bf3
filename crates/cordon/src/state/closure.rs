//! A function's captured environment: either a live, read-only view into
//! the state the function was defined in (preserving late-binding
//! semantics), or a frozen snapshot taken at `snapshot()` time.
//!
//! Grounded on `examples/original_source/tic/state/closure.py`
//! (`LiveClosureState`) and the freeze-time conversion in
//! `examples/original_source/tic/eval/freezing.py::_freeze_user_function`.

use indexmap::IndexSet;

use crate::state::{Ephemeral, ScopeState, StateHandle};

#[derive(Debug)]
pub enum Closure {
    /// A read-only live view into `source`, restricted to `vars`. Reads are
    /// dispatched to `source` at call time, so later writes to a captured
    /// name are visible to the closure.
    Live { source: StateHandle, vars: IndexSet<String> },
    /// A static snapshot taken when the defining state was committed.
    /// Independent of any live state from that point on.
    Frozen(Ephemeral),
}

impl Closure {
    #[must_use]
    pub fn live(source: StateHandle, vars: IndexSet<String>) -> Self {
        Self::Live { source, vars }
    }

    /// The free-variable names this closure exposes, in analyzer order.
    #[must_use]
    pub fn var_names(&self) -> Vec<String> {
        match self {
            Self::Live { vars, .. } => vars.iter().cloned().collect(),
            Self::Frozen(ephemeral) => ephemeral.keys(),
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }
}

impl ScopeState for Closure {
    fn get(&self, key: &str) -> Option<crate::value::Value> {
        match self {
            Self::Live { source, vars } => {
                if !vars.contains(key) {
                    return None;
                }
                source.borrow().get(key)
            }
            Self::Frozen(ephemeral) => ephemeral.get(key),
        }
    }

    fn set(&mut self, _key: &str, _value: crate::value::Value) {
        // Closures are read-only; the evaluator never routes an assignment
        // target here, so this is unreachable in practice.
    }

    fn remove(&mut self, _key: &str) -> bool {
        false
    }

    fn keys(&self) -> Vec<String> {
        self.var_names()
    }

    fn contains(&self, key: &str) -> bool {
        match self {
            Self::Live { vars, .. } => vars.contains(key),
            Self::Frozen(ephemeral) => ephemeral.contains(key),
        }
    }
}
