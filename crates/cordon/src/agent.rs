//! Host registration surface: functions, classes, and modules an agent
//! exposes to sandboxed programs, plus the process-wide fingerprint table
//! used to re-resolve an agent for a rehydrated function.
//!
//! Grounded on `examples/original_source/tic/agent/core.py` (`Agent.fn`,
//! `.cls`, `.module`, `register_agent`/`resolve_agent`) and
//! `tic/agent/datatypes.py` (`MemberSpec`, `RESERVED_NAMES`, `Visibility`).
//! One structural divergence: Python discovers a class/module's members via
//! `inspect.getmembers`; Rust has no runtime reflection over host types, so
//! a host here declares its exposed functions/constants/methods directly
//! rather than having them auto-discovered.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::{error::TicError, object::ModuleStub, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    Low,
    Medium,
    High,
}

/// Per-member override of an enclosing registration's defaults.
#[derive(Debug, Clone, Default)]
pub struct MemberSpec {
    pub visibility: Option<Visibility>,
    pub docstring: Option<String>,
    pub constructable: Option<bool>,
}

impl MemberSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    #[must_use]
    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }
}

/// A host-supplied native callable. Signature mirrors the binding the
/// evaluator performs for `UserFunction`: positional then keyword.
pub type HostFn = Rc<dyn Fn(&[Value], &[(String, Value)]) -> Result<Value, TicError>>;

/// A single function registered with [`Agent::register_fn`].
pub struct NativeFunction {
    pub name: String,
    pub visibility: Visibility,
    pub docstring: Option<String>,
    pub callback: HostFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).field("visibility", &self.visibility).finish()
    }
}

impl NativeFunction {
    pub fn call(&self, args: &[Value], kwargs: &[(String, Value)]) -> Result<Value, TicError> {
        (self.callback)(args, kwargs)
    }
}

/// A registered host class: the allowed attribute and method surface a
/// `UserInstance`-like host object may expose. Since Rust types aren't
/// reflectively enumerable, a host lists `attrs`/`methods` explicitly at
/// registration time rather than having them discovered.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistration {
    pub name: String,
    pub visibility: Visibility,
    pub constructable: bool,
    pub attrs: IndexMap<String, MemberSpec>,
    pub methods: IndexMap<String, MemberSpec>,
}

impl ClassRegistration {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), visibility: Visibility::High, constructable: true, attrs: IndexMap::new(), methods: IndexMap::new() }
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, spec: MemberSpec) -> Self {
        self.attrs.insert(name.into(), spec);
        self
    }

    #[must_use]
    pub fn with_method(mut self, name: impl Into<String>, spec: MemberSpec) -> Self {
        self.methods.insert(name.into(), spec);
        self
    }

    /// Merges a parent registration's allowed sets into this one, matching
    /// `Agent.cls`'s inheritance-from-registered-bases behavior. Entries
    /// already present on `self` win.
    pub fn inherit_from(&mut self, parent: &ClassRegistration) {
        for (name, spec) in &parent.attrs {
            self.attrs.entry(name.clone()).or_insert_with(|| spec.clone());
        }
        for (name, spec) in &parent.methods {
            self.methods.entry(name.clone()).or_insert_with(|| spec.clone());
        }
    }

    #[must_use]
    pub fn allows_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    #[must_use]
    pub fn allows_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
}

/// A constant exposed by a registered module.
#[derive(Debug, Clone)]
pub struct RegisteredConst {
    pub value: Value,
    pub spec: MemberSpec,
}

/// A registered host module: the functions, constants, and nested classes
/// it exposes under dotted names.
#[derive(Default)]
pub struct ModuleRegistration {
    pub name: String,
    pub visibility: Visibility,
    pub fns: IndexMap<String, Rc<NativeFunction>>,
    pub consts: IndexMap<String, RegisteredConst>,
    pub classes: IndexMap<String, ClassRegistration>,
}

impl ModuleRegistration {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), visibility: Visibility::High, fns: IndexMap::new(), consts: IndexMap::new(), classes: IndexMap::new() }
    }

    #[must_use]
    pub fn with_fn(mut self, f: NativeFunction) -> Self {
        self.fns.insert(f.name.clone(), Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_const(mut self, name: impl Into<String>, value: Value, spec: MemberSpec) -> Self {
        self.consts.insert(name.into(), RegisteredConst { value, spec });
        self
    }

    #[must_use]
    pub fn with_class(mut self, class: ClassRegistration) -> Self {
        self.classes.insert(class.name.clone(), class);
        self
    }
}

/// The host-side bundle of registered functions, classes, and modules plus
/// a primer string, identified by a content-hash fingerprint.
pub struct Agent {
    pub primer: Option<String>,
    pub timeout_seconds: f64,
    fn_registry: RefCell<IndexMap<String, Rc<NativeFunction>>>,
    cls_registry: RefCell<IndexMap<String, ClassRegistration>>,
    modules: RefCell<IndexMap<String, Rc<ModuleRegistration>>>,
    fingerprint: RefCell<String>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent").field("fingerprint", &self.fingerprint.borrow().as_str()).finish_non_exhaustive()
    }
}

impl Agent {
    #[must_use]
    pub fn new(primer: Option<String>, timeout_seconds: f64) -> Rc<Self> {
        let agent = Rc::new(Self {
            primer,
            timeout_seconds,
            fn_registry: RefCell::new(IndexMap::new()),
            cls_registry: RefCell::new(IndexMap::new()),
            modules: RefCell::new(IndexMap::new()),
            fingerprint: RefCell::new(String::new()),
        });
        agent.recompute_fingerprint();
        with_registry(|r| r.insert(agent.fingerprint(), agent.clone()));
        agent
    }

    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.fingerprint.borrow().clone()
    }

    fn recompute_fingerprint(&self) {
        let mut hasher = Sha256::new();
        if let Some(primer) = &self.primer {
            hasher.update(primer.as_bytes());
        }
        hasher.update(b"\0");
        for name in self.fn_registry.borrow().keys() {
            hasher.update(name.as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"\0");
        for (name, class) in self.cls_registry.borrow().iter() {
            hasher.update(name.as_bytes());
            for attr in class.attrs.keys() {
                hasher.update(attr.as_bytes());
            }
            for method in class.methods.keys() {
                hasher.update(method.as_bytes());
            }
        }
        hasher.update(b"\0");
        for name in self.modules.borrow().keys() {
            hasher.update(name.as_bytes());
            hasher.update(b",");
        }
        let digest = hasher.finalize();
        *self.fingerprint.borrow_mut() = digest.iter().map(|b| format!("{b:02x}")).collect();
    }

    fn reregister(self: &Rc<Self>) {
        with_registry(|r| r.remove(&self.fingerprint()));
        self.recompute_fingerprint();
        with_registry(|r| r.insert(self.fingerprint(), self.clone()));
    }

    pub fn register_fn(
        self: &Rc<Self>,
        name: impl Into<String>,
        visibility: Visibility,
        docstring: Option<String>,
        callback: HostFn,
    ) -> Result<(), TicError> {
        let name = name.into();
        if crate::policy::is_reserved_name(&name) {
            return Err(TicError::value_error(format!("The name '{name}' is reserved and cannot be registered.")));
        }
        self.fn_registry
            .borrow_mut()
            .insert(name.clone(), Rc::new(NativeFunction { name, visibility, docstring, callback }));
        self.reregister();
        Ok(())
    }

    pub fn register_class(self: &Rc<Self>, mut class: ClassRegistration) -> Result<(), TicError> {
        if crate::policy::is_reserved_name(&class.name) {
            return Err(TicError::value_error(format!(
                "The name '{}' is reserved and cannot be registered.",
                class.name
            )));
        }
        if let Some(existing) = self.cls_registry.borrow().get(&class.name) {
            class.inherit_from(existing);
        }
        self.cls_registry.borrow_mut().insert(class.name.clone(), class);
        self.reregister();
        Ok(())
    }

    pub fn register_module(self: &Rc<Self>, module: ModuleRegistration) -> Result<(), TicError> {
        if crate::policy::is_reserved_name(&module.name) {
            return Err(TicError::value_error(format!(
                "The name '{}' is reserved and cannot be registered.",
                module.name
            )));
        }
        // Also land nested classes in the central by-name registry, so
        // `lookup_class` finds them even though they were declared only as
        // part of a module (mirrors `tic/agent/core.py`'s `Agent.module`).
        for mut class in module.classes.values().cloned() {
            if let Some(existing) = self.cls_registry.borrow().get(&class.name) {
                class.inherit_from(existing);
            }
            self.cls_registry.borrow_mut().insert(class.name.clone(), class);
        }
        self.modules.borrow_mut().insert(module.name.clone(), Rc::new(module));
        self.reregister();
        Ok(())
    }

    #[must_use]
    pub fn lookup_fn(&self, name: &str) -> Option<Rc<NativeFunction>> {
        self.fn_registry.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn lookup_class(&self, name: &str) -> Option<ClassRegistration> {
        self.cls_registry.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn fn_names(&self) -> Vec<String> {
        self.fn_registry.borrow().keys().cloned().collect()
    }

    /// Reconstructs a [`ModuleStub`] for `name` from this agent's current
    /// registration, or `None` if the module is no longer (or never was)
    /// registered — the rehydrate path falls back to an empty stub in that
    /// case.
    #[must_use]
    pub fn build_module_stub(&self, name: &str) -> Option<ModuleStub> {
        let module = self.modules.borrow().get(name)?.clone();
        let mut members = IndexMap::new();
        for (fn_name, f) in &module.fns {
            members.insert(fn_name.clone(), Value::NativeFunction(f.clone()));
        }
        for (const_name, c) in &module.consts {
            members.insert(const_name.clone(), c.value.clone());
        }
        for class_name in module.classes.keys() {
            members.insert(class_name.clone(), Value::HostClass(Rc::new(class_name.clone())));
        }
        Some(ModuleStub { name: name.to_string(), members })
    }
}

thread_local! {
    static AGENT_REGISTRY: RefCell<HashMap<String, Rc<Agent>>> = RefCell::new(HashMap::new());
}

fn with_registry<T>(f: impl FnOnce(&mut HashMap<String, Rc<Agent>>) -> T) -> T {
    AGENT_REGISTRY.with(|r| f(&mut r.borrow_mut()))
}

/// `resolve_agent` — looks an agent up by fingerprint, for a rehydrated
/// `UserFunction` to re-find its defining agent at call time.
#[must_use]
pub fn resolve_agent(fingerprint: &str) -> Option<Rc<Agent>> {
    with_registry(|r| r.get(fingerprint).cloned())
}

/// Clears the process-wide (thread-local) agent registry. Primarily for
/// tests that construct several agents in sequence.
pub fn clear_agent_registry() {
    with_registry(HashMap::clear);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_reserved_name_is_rejected() {
        clear_agent_registry();
        let agent = Agent::new(None, 5.0);
        let err = agent.register_fn("dataclass", Visibility::High, None, Rc::new(|_, _| Ok(Value::None)));
        assert!(err.is_err());
    }

    #[test]
    fn fingerprint_changes_on_registration() {
        clear_agent_registry();
        let agent = Agent::new(None, 5.0);
        let before = agent.fingerprint();
        agent.register_fn("ping", Visibility::High, None, Rc::new(|_, _| Ok(Value::None))).unwrap();
        assert_ne!(before, agent.fingerprint());
        assert!(resolve_agent(&agent.fingerprint()).is_some());
    }

    #[test]
    fn class_inherits_parent_registration() {
        clear_agent_registry();
        let agent = Agent::new(None, 5.0);
        let base = ClassRegistration::new("Base").with_method("greet", MemberSpec::new());
        agent.register_class(base).unwrap();
        let child = ClassRegistration::new("Base").with_method("wave", MemberSpec::new());
        agent.register_class(child).unwrap();
        let merged = agent.lookup_class("Base").unwrap();
        assert!(merged.allows_method("greet"));
        assert!(merged.allows_method("wave"));
    }
}
