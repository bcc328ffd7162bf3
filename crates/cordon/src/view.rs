//! The minimal context-rendering shim from SPEC_FULL §6: `view(state, focus,
//! ...)`. The broader LLM-prompt assembly pipeline that layers on top of
//! this (token budgeting against a real tokenizer, model-specific
//! formatting) is explicitly out of scope; `model`/`max_tokens` are accepted
//! so a caller's signature doesn't have to change when that pipeline is
//! added, but neither is consulted yet.
//!
//! Grounded on `examples/original_source/tic/state/versioned.py`'s
//! `diffs`/`history` read paths, which this composes rather than
//! reimplementing.

use indexmap::IndexMap;

use crate::{error::EvalError, state::Versioned, value::Value, value::ValueKey};

/// Which slice of a [`Versioned`] state `view()` renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Focus {
    /// The keys and values written by the most recent `snapshot()`.
    Recent,
    /// The full live key/value set, excluding `__`-prefixed internal keys.
    Full,
    /// The `__stdout__` list accumulated by `print()`-like builtins.
    Stdout,
}

/// Renders `state` for `focus`. Refuses with an [`EvalError`] if `state` has
/// writes sitting in its ephemeral overlay that haven't been snapshotted —
/// `"recent"` reads committed diffs, so an uncommitted state would otherwise
/// silently render stale or empty output.
pub fn view(state: &Versioned, focus: Focus, model: Option<&str>, max_tokens: Option<usize>) -> Result<Value, EvalError> {
    if state.has_uncommitted_writes() {
        return Err(EvalError::new("view() called on a state with uncommitted writes; call snapshot() first"));
    }
    if model.is_some() || max_tokens.is_some() {
        tracing::debug!(?model, ?max_tokens, "view() token-budget parameters are accepted but not yet applied");
    }

    let rendered = match focus {
        Focus::Recent => mapping_of(state.diffs(None)),
        Focus::Full => mapping_of(full_live_keys(state)),
        Focus::Stdout => state.get("__stdout__").unwrap_or_else(|| Value::list(Vec::new())),
    };
    Ok(rendered)
}

fn full_live_keys(state: &Versioned) -> IndexMap<String, Value> {
    crate::state::items(state)
        .into_iter()
        .filter(|(key, _)| !key.starts_with("__"))
        .collect()
}

fn mapping_of(entries: IndexMap<String, Value>) -> Value {
    let mut out = IndexMap::new();
    for (key, value) in entries {
        out.insert(ValueKey::Str(std::rc::Rc::new(key)), value);
    }
    Value::mapping(out)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::state::{MemoryKv, ScopeState, StorageMode};

    fn new_store() -> Rc<RefCell<Versioned>> {
        Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)))
    }

    #[test]
    fn recent_focus_renders_last_snapshot_diff() {
        let state = new_store();
        state.borrow_mut().set("a", Value::Int(1));
        Versioned::snapshot(&state);
        state.borrow_mut().set("x", Value::Int(1));
        state.borrow_mut().set("y", Value::Int(2));
        Versioned::snapshot(&state);

        let rendered = view(&state.borrow(), Focus::Recent, None, None).unwrap();
        let Value::Mapping(m) = rendered else { panic!("expected mapping") };
        let entries: Vec<_> = m.borrow().iter().map(|(k, v)| (k.clone().into_value(), v.clone())).collect();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0].0, Value::Str(s) if s.as_str() == "x"));
        assert!(matches!(&entries[1].0, Value::Str(s) if s.as_str() == "y"));
    }

    #[test]
    fn stdout_focus_reads_dunder_stdout() {
        let state = new_store();
        state.borrow_mut().set("__stdout__", Value::list(vec![Value::str("hi")]));
        Versioned::snapshot(&state);
        let rendered = view(&state.borrow(), Focus::Stdout, None, None).unwrap();
        assert!(matches!(rendered, Value::List(l) if l.borrow().len() == 1));
    }

    #[test]
    fn refuses_on_uncommitted_writes() {
        let state = new_store();
        state.borrow_mut().set("a", Value::Int(1));
        assert!(view(&state.borrow(), Focus::Full, None, None).is_err());
    }
}
