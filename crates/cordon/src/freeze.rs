//! Freeze/rehydrate: the storage-safe transform applied to a [`Value`]
//! before it is written by [`crate::state::Versioned::snapshot`], and the
//! inverse applied when a value is read back.
//!
//! Grounded on `examples/original_source/tic/eval/freezing.py`
//! (`ObjectFreezer`). One divergence from the original: `ruff_python_ast`
//! nodes are not `serde`-serializable, so a frozen `UserFunction`/
//! `UserClass` method keeps its already-captured `source_text` and is
//! re-parsed on rehydrate rather than having its AST pickled directly (the
//! Python original pickles `ast` nodes as-is, which Rust's AST crate
//! doesn't support).

use std::{cell::RefCell, collections::HashSet, rc::Rc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    agent::Agent,
    function::{ParamSpec, UserFunction},
    object::{DataClass, DataObject, HostInstance, ModuleStub, UserClass, UserInstance},
    state::Closure,
    value::{Value, ValueKey},
};

/// Storage-safe mirror of [`Value`]. No `Rc`/`RefCell`/trait objects, so it
/// round-trips through `serde_json`/`postcard` without special handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoredValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<StoredValue>),
    Tuple(Vec<StoredValue>),
    PrintTuple(Vec<StoredValue>),
    Set(Vec<StoredValue>),
    Mapping(Vec<(StoredValue, StoredValue)>),
    UserFunction {
        name: String,
        source_text: Option<String>,
        closure: Vec<(String, StoredValue)>,
        agent_fingerprint: String,
    },
    UserClass { name: String, methods: Vec<(String, StoredValue)> },
    UserInstance { class_name: String, methods: Vec<(String, StoredValue)>, attributes: Vec<(String, StoredValue)> },
    DataClass { name: String, fields: Vec<String> },
    DataObject { class_name: String, fields: Vec<String>, attributes: Vec<(String, StoredValue)> },
    ModuleStub { name: String },
    HostInstance { class_name: String, attributes: Vec<(String, StoredValue)> },
    /// Sentinel for a reference cycle encountered during freezing. Rehydrates
    /// to `None` — a deliberate, documented loss of fidelity (see
    /// `DESIGN.md`), matching the Python original's own fallback.
    CircularRef { type_name: String, obj_id: u64 },
    /// Not a `Value` variant; this is the payload [`crate::state::Versioned`]
    /// stores under `__commit_keyset__<id>`.
    CommitKeys(IndexMap<String, String>),
}

struct FreezeCtx {
    visited: RefCell<HashSet<usize>>,
}

impl FreezeCtx {
    fn new() -> Self {
        Self { visited: RefCell::new(HashSet::new()) }
    }

    /// Runs `body` while `ptr` is marked visited, restoring the previous
    /// state afterward — mirrors `ObjectFreezer._freeze_recursive`'s
    /// enter/finally bracket around a single object identity.
    fn guard<T>(&self, ptr: usize, body: impl FnOnce() -> T) -> Option<T> {
        if !self.visited.borrow_mut().insert(ptr) {
            return None;
        }
        let result = body();
        self.visited.borrow_mut().remove(&ptr);
        Some(result)
    }
}

#[must_use]
pub fn freeze_value(value: &Value) -> StoredValue {
    let ctx = FreezeCtx::new();
    freeze_with(value, &ctx)
}

fn freeze_with(value: &Value, ctx: &FreezeCtx) -> StoredValue {
    match value {
        Value::None => StoredValue::None,
        Value::Bool(b) => StoredValue::Bool(*b),
        Value::Int(i) => StoredValue::Int(*i),
        Value::Float(f) => StoredValue::Float(*f),
        Value::Str(s) => StoredValue::Str(s.to_string()),
        Value::List(items) => {
            let ptr = Rc::as_ptr(items) as usize;
            ctx.guard(ptr, || StoredValue::List(items.borrow().iter().map(|v| freeze_with(v, ctx)).collect()))
                .unwrap_or_else(|| circular(value))
        }
        Value::Tuple(items) => StoredValue::Tuple(items.iter().map(|v| freeze_with(v, ctx)).collect()),
        Value::PrintTuple(items) => StoredValue::PrintTuple(items.iter().map(|v| freeze_with(v, ctx)).collect()),
        Value::Set(items) => {
            let ptr = Rc::as_ptr(items) as usize;
            ctx.guard(ptr, || {
                StoredValue::Set(items.borrow().iter().map(|k| freeze_with(&k.clone().into_value(), ctx)).collect())
            })
            .unwrap_or_else(|| circular(value))
        }
        Value::Mapping(map) => {
            let ptr = Rc::as_ptr(map) as usize;
            ctx.guard(ptr, || {
                StoredValue::Mapping(
                    map.borrow()
                        .iter()
                        .map(|(k, v)| (freeze_with(&k.clone().into_value(), ctx), freeze_with(v, ctx)))
                        .collect(),
                )
            })
            .unwrap_or_else(|| circular(value))
        }
        Value::UserFunction(func) => {
            let ptr = Rc::as_ptr(func) as usize;
            ctx.guard(ptr, || freeze_function(func, ctx)).unwrap_or_else(|| circular(value))
        }
        Value::UserClass(class) => {
            let ptr = Rc::as_ptr(class) as usize;
            ctx.guard(ptr, || StoredValue::UserClass {
                name: class.name.clone(),
                methods: class.methods.iter().map(|(n, f)| (n.clone(), freeze_function(f, ctx))).collect(),
            })
            .unwrap_or_else(|| circular(value))
        }
        Value::UserInstance(inst) => {
            let ptr = Rc::as_ptr(inst) as usize;
            ctx.guard(ptr, || {
                let inst = inst.borrow();
                StoredValue::UserInstance {
                    class_name: inst.class.name.clone(),
                    methods: inst
                        .class
                        .methods
                        .iter()
                        .map(|(n, f)| (n.clone(), freeze_function(f, ctx)))
                        .collect(),
                    attributes: inst.attributes.iter().map(|(k, v)| (k.clone(), freeze_with(v, ctx))).collect(),
                }
            })
            .unwrap_or_else(|| circular(value))
        }
        Value::BoundMethod(_) => StoredValue::None,
        Value::DataClass(dc) => StoredValue::DataClass { name: dc.name.clone(), fields: dc.fields.clone() },
        Value::DataObject(obj) => {
            let ptr = Rc::as_ptr(obj) as usize;
            ctx.guard(ptr, || {
                let obj = obj.borrow();
                StoredValue::DataObject {
                    class_name: obj.class.name.clone(),
                    fields: obj.class.fields.clone(),
                    attributes: obj.attributes.iter().map(|(k, v)| (k.clone(), freeze_with(v, ctx))).collect(),
                }
            })
            .unwrap_or_else(|| circular(value))
        }
        Value::ModuleStub(stub) => StoredValue::ModuleStub { name: stub.name.clone() },
        Value::HostInstance(inst) => {
            let inst = inst.borrow();
            StoredValue::HostInstance {
                class_name: inst.class_name.clone(),
                attributes: inst.attributes.iter().map(|(k, v)| (k.clone(), freeze_with(v, ctx))).collect(),
            }
        }
        // `HostClass` is a reference to the agent's live registry, not data;
        // like `NativeFunction`, it is re-derived from the agent on rehydrate
        // rather than carried through storage.
        Value::NativeFunction(_) | Value::TypePlaceholder(_) | Value::HostClass(_) => StoredValue::None,
    }
}

fn freeze_function(func: &Rc<UserFunction>, ctx: &FreezeCtx) -> StoredValue {
    let closure = match &*func.closure.borrow() {
        Closure::Live { vars, .. } | Closure::Frozen(_) => {
            let source = func.closure.borrow();
            source
                .var_names()
                .into_iter()
                .filter_map(|name| source.get(&name).map(|v| (name, freeze_with(&v, ctx))))
                .collect::<Vec<_>>()
        }
    };
    StoredValue::UserFunction {
        name: func.name.clone(),
        source_text: func.source_text.clone(),
        closure,
        agent_fingerprint: func.agent_fingerprint.clone(),
    }
}

fn circular(value: &Value) -> StoredValue {
    let (type_name, obj_id) = match value {
        Value::List(items) => ("list".to_string(), Rc::as_ptr(items) as usize),
        Value::Set(items) => ("set".to_string(), Rc::as_ptr(items) as usize),
        Value::Mapping(items) => ("dict".to_string(), Rc::as_ptr(items) as usize),
        Value::UserFunction(f) => ("UserFunction".to_string(), Rc::as_ptr(f) as usize),
        Value::UserClass(c) => ("UserClass".to_string(), Rc::as_ptr(c) as usize),
        Value::UserInstance(i) => ("UserInstance".to_string(), Rc::as_ptr(i) as usize),
        Value::DataObject(o) => ("DataObject".to_string(), Rc::as_ptr(o) as usize),
        other => (other.type_name(), 0),
    };
    StoredValue::CircularRef { type_name, obj_id: obj_id as u64 }
}

#[must_use]
pub fn rehydrate_value(stored: StoredValue, agent: Option<&Rc<Agent>>) -> Value {
    match stored {
        StoredValue::None | StoredValue::CommitKeys(_) => Value::None,
        StoredValue::Bool(b) => Value::Bool(b),
        StoredValue::Int(i) => Value::Int(i),
        StoredValue::Float(f) => Value::Float(f),
        StoredValue::Str(s) => Value::str(s),
        StoredValue::List(items) => Value::list(items.into_iter().map(|v| rehydrate_value(v, agent)).collect()),
        StoredValue::Tuple(items) => Value::tuple(items.into_iter().map(|v| rehydrate_value(v, agent)).collect()),
        StoredValue::PrintTuple(items) => {
            Value::PrintTuple(Rc::new(items.into_iter().map(|v| rehydrate_value(v, agent)).collect()))
        }
        StoredValue::Set(items) => {
            let mut set = indexmap::IndexSet::new();
            for item in items {
                if let Some(key) = ValueKey::from_value(&rehydrate_value(item, agent)) {
                    set.insert(key);
                }
            }
            Value::Set(Rc::new(RefCell::new(set)))
        }
        StoredValue::Mapping(entries) => {
            let mut map = IndexMap::new();
            for (k, v) in entries {
                if let Some(key) = ValueKey::from_value(&rehydrate_value(k, agent)) {
                    map.insert(key, rehydrate_value(v, agent));
                }
            }
            Value::mapping(map)
        }
        StoredValue::UserFunction { name, source_text, closure, agent_fingerprint } => {
            let mut ephemeral = crate::state::Ephemeral::new();
            for (k, v) in closure {
                ephemeral.set(&k, rehydrate_value(v, agent));
            }
            let (params, body) = source_text
                .as_deref()
                .and_then(crate::parse::reparse_function)
                .unwrap_or_else(|| (ParamSpec::empty(), Vec::new()));
            Value::UserFunction(Rc::new(UserFunction {
                name,
                params,
                body,
                closure: RefCell::new(Closure::Frozen(ephemeral)),
                source_text,
                agent_fingerprint,
            }))
        }
        StoredValue::UserClass { name, methods } => {
            let methods = methods
                .into_iter()
                .map(|(n, f)| match rehydrate_value(f, agent) {
                    Value::UserFunction(func) => (n, func),
                    _ => (n, Rc::new(UserFunction::unreachable(n.clone()))),
                })
                .collect();
            Value::UserClass(Rc::new(UserClass { name, methods }))
        }
        StoredValue::UserInstance { class_name, methods, attributes } => {
            let methods = methods
                .into_iter()
                .map(|(n, f)| match rehydrate_value(f, agent) {
                    Value::UserFunction(func) => (n, func),
                    _ => (n, Rc::new(UserFunction::unreachable(n.clone()))),
                })
                .collect();
            let class = Rc::new(UserClass { name: class_name, methods });
            let attributes =
                attributes.into_iter().map(|(k, v)| (k, rehydrate_value(v, agent))).collect();
            Value::UserInstance(Rc::new(RefCell::new(UserInstance { class, attributes })))
        }
        StoredValue::DataClass { name, fields } => Value::DataClass(Rc::new(DataClass { name, fields })),
        StoredValue::DataObject { class_name, fields, attributes } => {
            let class = Rc::new(DataClass { name: class_name, fields });
            let attributes = attributes.into_iter().map(|(k, v)| (k, rehydrate_value(v, agent))).collect();
            Value::DataObject(Rc::new(RefCell::new(DataObject { class, attributes })))
        }
        StoredValue::ModuleStub { name } => match agent.and_then(|a| a.build_module_stub(&name)) {
            Some(stub) => Value::ModuleStub(Rc::new(stub)),
            None => Value::ModuleStub(Rc::new(ModuleStub::empty(name))),
        },
        StoredValue::HostInstance { class_name, attributes } => {
            let attributes = attributes.into_iter().map(|(k, v)| (k, rehydrate_value(v, agent))).collect();
            Value::HostInstance(Rc::new(RefCell::new(HostInstance { class_name, attributes })))
        }
        StoredValue::CircularRef { .. } => Value::None,
    }
}
