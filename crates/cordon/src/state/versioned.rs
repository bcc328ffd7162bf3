//! Versioned state: an ephemeral overlay plus an immutable commit chain
//! over a [`KvStore`].
//!
//! Grounded closely on `examples/original_source/tic/state/versioned.py` —
//! this is the system's most precisely specified behavior, so the Rust
//! port follows its control flow statement-for-statement rather than
//! reshaping it.

use std::{cell::RefCell, collections::HashSet, rc::Rc};

use indexmap::IndexMap;
use rand::RngCore;

use crate::{
    agent::Agent,
    freeze::{freeze_value, rehydrate_value, StoredValue},
    state::{kv::KvStore, Ephemeral, ScopeState},
    value::Value,
};

fn parent_commit_key(id: &str) -> String {
    format!("__parent_commit__{id}")
}

fn commit_keyset_key(id: &str) -> String {
    format!("__commit_keyset__{id}")
}

fn new_commit_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// An ephemeral overlay and commit chain sharing one backing [`KvStore`].
pub struct Versioned {
    ephemeral: Ephemeral,
    removed: HashSet<String>,
    store: Rc<RefCell<dyn KvStore>>,
    current_commit: Option<String>,
    commit_keys: IndexMap<String, String>,
    rehydration_agent: Option<std::rc::Rc<Agent>>,
}

impl std::fmt::Debug for Versioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Versioned")
            .field("current_commit", &self.current_commit)
            .field("commit_keys", &self.commit_keys)
            .finish_non_exhaustive()
    }
}

impl Versioned {
    pub fn new(store: Rc<RefCell<dyn KvStore>>, commit_hash: Option<String>) -> Self {
        let commit_keys = match &commit_hash {
            Some(hash) => match store.borrow().get(&commit_keyset_key(hash)) {
                Some(StoredValue::CommitKeys(map)) => map,
                _ => IndexMap::new(),
            },
            None => IndexMap::new(),
        };
        Self {
            ephemeral: Ephemeral::new(),
            removed: HashSet::new(),
            store,
            current_commit: commit_hash,
            commit_keys,
            rehydration_agent: None,
        }
    }

    #[must_use]
    pub fn current_commit(&self) -> Option<&str> {
        self.current_commit.as_deref()
    }

    /// `true` if writes have accumulated in the ephemeral overlay since the
    /// last `snapshot()`. `view()` refuses to render a state with
    /// uncommitted writes, since `"recent"` focus reads committed diffs.
    #[must_use]
    pub fn has_uncommitted_writes(&self) -> bool {
        !self.ephemeral.is_empty()
    }

    fn versioned_key(&self, key: &str, commit_hash: &str) -> String {
        format!("{commit_hash}:{key}")
    }

    /// `history([h])` — walks the parent chain starting at `h` (or the
    /// current commit), most recent first.
    pub fn history(&self, from: Option<&str>) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = from.map(str::to_string).or_else(|| self.current_commit.clone());
        while let Some(hash) = current {
            current = match self.store.borrow().get(&parent_commit_key(&hash)) {
                Some(StoredValue::Str(parent)) => Some(parent),
                _ => None,
            };
            out.push(hash);
        }
        out
    }

    /// `snapshot()` — if nothing was written since the last commit, this is
    /// a no-op returning the unchanged current commit.
    ///
    /// Takes the state's own `Rc<RefCell<_>>` rather than `&mut self`: a
    /// value sitting in the ephemeral overlay (e.g. a just-defined closure)
    /// may hold a [`crate::state::StateHandle`] pointing back at this same
    /// cell, and freezing it reads through that handle. Collecting the
    /// ephemeral values and freezing them before taking the commit's
    /// `borrow_mut` keeps that read from racing the write it's nested
    /// inside of.
    pub fn snapshot(this: &Rc<RefCell<Self>>) -> Option<String> {
        let ephemeral_items: Vec<(String, Value)> = {
            let state = this.borrow();
            if state.ephemeral.is_empty() {
                return state.current_commit.clone();
            }
            state.ephemeral.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let new_hash = new_commit_id();

        let diff_keys: Vec<Value> =
            ephemeral_items.iter().map(|(k, _)| k.clone()).filter(|k| !k.starts_with("__")).map(Value::str).collect();

        let mut frozen_writes: Vec<(String, StoredValue)> =
            ephemeral_items.into_iter().map(|(key, value)| (key, freeze_value(&value))).collect();
        frozen_writes.push(("__diff_keys__".to_string(), freeze_value(&Value::tuple(diff_keys))));

        let mut state = this.borrow_mut();
        let mut new_commit_keys = IndexMap::new();
        for (key, versioned_key) in &state.commit_keys {
            if state.removed.contains(key) {
                continue;
            }
            new_commit_keys.insert(key.clone(), versioned_key.clone());
        }

        let mut writes = Vec::new();
        for (key, frozen) in frozen_writes {
            let versioned_key = state.versioned_key(&key, &new_hash);
            writes.push((versioned_key.clone(), frozen));
            new_commit_keys.insert(key, versioned_key);
        }
        writes.push((commit_keyset_key(&new_hash), StoredValue::CommitKeys(new_commit_keys.clone())));
        writes.push((
            parent_commit_key(&new_hash),
            match &state.current_commit {
                Some(parent) => StoredValue::Str(parent.clone()),
                None => StoredValue::None,
            },
        ));

        state.store.borrow_mut().set_many(writes);
        state.commit_keys = new_commit_keys;
        state.current_commit = Some(new_hash.clone());
        state.removed.clear();
        state.ephemeral = Ephemeral::new();

        Some(new_hash)
    }

    /// `checkout(h)` — returns a fresh `Versioned` pinned at `h`, or `None`
    /// if `h` is not in this store's history. If `agent` is provided,
    /// values loaded from storage are rehydrated against it.
    pub fn checkout(&self, commit_hash: &str, agent: Option<std::rc::Rc<Agent>>) -> Option<Self> {
        if !self.history(None).iter().any(|h| h == commit_hash) {
            return None;
        }
        let mut new_state = Self {
            ephemeral: Ephemeral::new(),
            removed: HashSet::new(),
            store: self.store.clone(),
            current_commit: Some(commit_hash.to_string()),
            commit_keys: IndexMap::new(),
            rehydration_agent: None,
        };
        new_state.commit_keys = match new_state.store.borrow().get(&commit_keyset_key(commit_hash)) {
            Some(StoredValue::CommitKeys(map)) => map,
            _ => IndexMap::new(),
        };
        if let Some(agent) = agent {
            new_state.rehydration_agent = Some(agent);
        }
        Some(new_state)
    }

    /// `diffs([h])` — the ordered key/value set written by the snapshot
    /// that produced `h` (or the current commit).
    pub fn diffs(&self, commit_hash: Option<&str>) -> IndexMap<String, Value> {
        let Some(target) = commit_hash.map(str::to_string).or_else(|| self.current_commit.clone()) else {
            return IndexMap::new();
        };
        let Some(commit_state) = self.checkout(&target, None) else {
            return IndexMap::new();
        };
        let diff_keys = match commit_state.get("__diff_keys__") {
            Some(Value::Tuple(items)) => items.iter().filter_map(|v| match v {
                Value::Str(s) => Some(s.to_string()),
                _ => None,
            }).collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        let mut out = IndexMap::new();
        for key in diff_keys {
            if let Some(value) = commit_state.get(&key) {
                out.insert(key, value);
            }
        }
        out
    }
}

impl ScopeState for Versioned {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.ephemeral.get(key) {
            return Some(value);
        }
        if self.removed.contains(key) {
            return None;
        }
        let versioned_key = self.commit_keys.get(key)?;
        let stored = self.store.borrow().get(versioned_key)?;
        let value = rehydrate_value(stored, self.rehydration_agent.as_deref());
        Some(value)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.ephemeral.set(key, value);
        self.removed.remove(key);
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.ephemeral.remove(key) {
            return true;
        }
        if self.commit_keys.contains_key(key) {
            self.removed.insert(key.to_string());
            return true;
        }
        false
    }

    fn keys(&self) -> Vec<String> {
        let mut out: Vec<String> = self.ephemeral.keys();
        for key in self.commit_keys.keys() {
            if !self.removed.contains(key) && !out.contains(key) {
                out.push(key.clone());
            }
        }
        out
    }

    fn contains(&self, key: &str) -> bool {
        self.ephemeral.contains(key) || (!self.removed.contains(key) && self.commit_keys.contains_key(key))
    }
}
