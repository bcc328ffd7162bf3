//! Sandbox-native object kinds: user classes/instances, dataclasses, bound
//! methods, module stubs, and the `type()` placeholder.
//!
//! Grounded on `examples/original_source/tic/eval/objects.py` — the shapes
//! here (`TicClass`/`TicInstance`/`TicObject`/`TicMethod`/`TicModule`) are
//! translated name-for-name into `UserClass`/`UserInstance`/`DataObject`/
//! `BoundMethod`/`ModuleStub`.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use indexmap::IndexMap;

use crate::{
    error::TicError,
    function::UserFunction,
    value::Value,
};

/// A class created with a plain `class` statement. Inheritance is refused
/// at parse time, so this never carries a base-class list.
#[derive(Debug)]
pub struct UserClass {
    pub name: String,
    pub methods: IndexMap<String, Rc<UserFunction>>,
}

impl UserClass {
    #[must_use]
    pub fn find_method(&self, name: &str) -> Option<Rc<UserFunction>> {
        self.methods.get(name).cloned()
    }
}

/// An instance of a [`UserClass`].
#[derive(Debug)]
pub struct UserInstance {
    pub class: Rc<UserClass>,
    pub attributes: HashMap<String, Value>,
}

impl UserInstance {
    pub fn getattr(this: &Rc<RefCell<Self>>, name: &str) -> Result<Value, TicError> {
        let borrowed = this.borrow();
        if let Some(v) = borrowed.attributes.get(name) {
            return Ok(v.clone());
        }
        if let Some(method) = borrowed.class.find_method(name) {
            return Ok(Value::BoundMethod(Rc::new(BoundMethod {
                instance: this.clone(),
                function: method,
            })));
        }
        Err(TicError::attribute_error(format!(
            "'{}' object has no attribute '{name}'",
            borrowed.class.name
        )))
    }

    pub fn setattr(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn delattr(&mut self, name: &str) -> Result<(), TicError> {
        if self.attributes.remove(name).is_none() {
            return Err(TicError::attribute_error(format!(
                "'{}' object has no attribute '{name}'",
                self.class.name
            )));
        }
        Ok(())
    }
}

/// A method bound to a [`UserInstance`]; calling it prepends the instance
/// to the positional argument list.
#[derive(Debug)]
pub struct BoundMethod {
    pub instance: Rc<RefCell<UserInstance>>,
    pub function: Rc<UserFunction>,
}

/// The callable factory created by `@dataclass class Name: ...`.
#[derive(Debug)]
pub struct DataClass {
    pub name: String,
    pub fields: Vec<String>,
}

impl DataClass {
    /// Binds positional-then-keyword arguments against `fields`, exactly as
    /// `TicDataClass.__call__` does, then constructs a [`DataObject`].
    pub fn construct(self: &Rc<Self>, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<DataObject, TicError> {
        if args.len() > self.fields.len() {
            return Err(TicError::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                self.name,
                self.fields.len(),
                args.len()
            )));
        }
        let mut kwargs: HashMap<String, Value> = kwargs.into_iter().collect();
        let mut attributes = HashMap::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            if let Some(v) = args.get(i) {
                if kwargs.contains_key(field) {
                    return Err(TicError::type_error(format!(
                        "{}() got multiple values for argument '{field}'",
                        self.name
                    )));
                }
                attributes.insert(field.clone(), v.clone());
            } else if let Some(v) = kwargs.remove(field) {
                attributes.insert(field.clone(), v);
            } else {
                return Err(TicError::type_error(format!(
                    "{}() missing required positional argument: '{field}'",
                    self.name
                )));
            }
        }
        if let Some(unexpected) = kwargs.keys().next() {
            return Err(TicError::type_error(format!(
                "{}() got an unexpected keyword argument '{unexpected}'",
                self.name
            )));
        }
        Ok(DataObject { class: self.clone(), attributes })
    }
}

/// An instance of a [`DataClass`]. New attributes cannot be added; existing
/// ones can be reassigned or deleted.
#[derive(Debug)]
pub struct DataObject {
    pub class: Rc<DataClass>,
    pub attributes: HashMap<String, Value>,
}

impl DataObject {
    pub fn getattr(&self, name: &str) -> Result<Value, TicError> {
        self.attributes.get(name).cloned().ok_or_else(|| {
            TicError::attribute_error(format!("'{}' object has no attribute '{name}'", self.class.name))
        })
    }

    pub fn setattr(&mut self, name: &str, value: Value) -> Result<(), TicError> {
        if !self.class.fields.iter().any(|f| f == name) {
            return Err(TicError::attribute_error(format!(
                "'{}' object has no attribute '{name}' (cannot add new attributes)",
                self.class.name
            )));
        }
        self.attributes.insert(name.to_string(), value);
        Ok(())
    }

    pub fn delattr(&mut self, name: &str) -> Result<(), TicError> {
        if self.attributes.remove(name).is_none() {
            return Err(TicError::attribute_error(format!(
                "'{}' object has no attribute '{name}'",
                self.class.name
            )));
        }
        Ok(())
    }
}

/// A sandboxed, serializable view of a host module. Only the names present
/// in `members` are reachable; everything else behaves as if absent.
#[derive(Debug)]
pub struct ModuleStub {
    pub name: String,
    pub members: IndexMap<String, Value>,
}

impl ModuleStub {
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self { name: name.into(), members: IndexMap::new() }
    }

    pub fn getattr(&self, name: &str) -> Result<Value, TicError> {
        self.members.get(name).cloned().ok_or_else(|| {
            TicError::attribute_error(format!("module '{}' has no attribute '{name}'", self.name))
        })
    }
}

/// The result of calling the `type()` builtin on a value the sandbox does
/// not otherwise expose reflectively. Supports `isinstance` comparison and,
/// for registered host classes, re-invoking the constructor; all other
/// attribute access is refused.
#[derive(Debug)]
pub struct TypePlaceholder {
    pub name: String,
}

/// An instance of a registered host class (`Agent::register_class`, exposed
/// as a module member via `Agent::register_module`). Unlike `UserInstance`,
/// there is no backing method table: a `ClassRegistration`'s `methods` entry
/// is whitelist metadata only, so `getattr`/`setattr` here are gated by the
/// registration's `attrs` allow-list rather than by anything this struct
/// itself knows how to do.
#[derive(Debug)]
pub struct HostInstance {
    pub class_name: String,
    pub attributes: HashMap<String, Value>,
}

impl HostInstance {
    pub fn getattr(&self, allowed: bool, name: &str) -> Result<Value, TicError> {
        if !allowed {
            return Err(TicError::attribute_error(format!("'{}' object has no attribute '{name}'", self.class_name)));
        }
        self.attributes.get(name).cloned().ok_or_else(|| {
            TicError::attribute_error(format!("'{}' object has no attribute '{name}'", self.class_name))
        })
    }

    pub fn setattr(&mut self, allowed: bool, name: &str, value: Value) -> Result<(), TicError> {
        if !allowed {
            return Err(TicError::attribute_error(format!(
                "'{}' object has no attribute '{name}' (not declared on the registered class)",
                self.class_name
            )));
        }
        self.attributes.insert(name.to_string(), value);
        Ok(())
    }

    pub fn delattr(&mut self, allowed: bool, name: &str) -> Result<(), TicError> {
        if !allowed || self.attributes.remove(name).is_none() {
            return Err(TicError::attribute_error(format!("'{}' object has no attribute '{name}'", self.class_name)));
        }
        Ok(())
    }
}
