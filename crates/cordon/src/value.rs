//! Runtime value model for the sandboxed evaluator.
//!
//! Containers are `Rc<RefCell<_>>` rather than arena-indexed: this crate
//! walks an AST directly instead of compiling to bytecode, so there is no
//! heap to intern values into. Aliasing is intentional — two names bound to
//! the same list must observe each other's mutations, exactly as in the
//! source language.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    agent::NativeFunction,
    error::ExcKind,
    function::UserFunction,
    object::{BoundMethod, DataClass, DataObject, HostInstance, ModuleStub, TypePlaceholder, UserClass, UserInstance},
};

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type SetRef = Rc<RefCell<indexmap::IndexSet<ValueKey>>>;
pub type MappingRef = Rc<RefCell<IndexMap<ValueKey, Value>>>;

/// Every value a sandboxed program can hold.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    List(ListRef),
    Tuple(Rc<Vec<Value>>),
    /// A tuple created by `print()`, rendered distinctly when shown back to
    /// the host (see `__stdout__` handling in `eval::builtins`).
    PrintTuple(Rc<Vec<Value>>),
    Set(SetRef),
    Mapping(MappingRef),
    UserFunction(Rc<UserFunction>),
    NativeFunction(Rc<NativeFunction>),
    UserClass(Rc<UserClass>),
    UserInstance(Rc<RefCell<UserInstance>>),
    BoundMethod(Rc<BoundMethod>),
    DataClass(Rc<DataClass>),
    DataObject(Rc<RefCell<DataObject>>),
    ModuleStub(Rc<ModuleStub>),
    TypePlaceholder(Rc<TypePlaceholder>),
    /// An as-yet-uninstantiated registered host class, reached as a member of
    /// a registered module. Calling it constructs a [`Value::HostInstance`].
    HostClass(Rc<String>),
    /// An instance of a registered host class. Attribute access is gated by
    /// the originating [`crate::agent::ClassRegistration`]'s `attrs`/`methods`
    /// whitelist rather than carrying any host-side behavior itself.
    HostInstance(Rc<RefCell<HostInstance>>),
    /// One of the five names `raise`/`except` recognize by identifier
    /// (`Exception`, `ValueError`, `TypeError`, `KeyError`, `IndexError`).
    /// Calling it constructs an [`Value::ExceptionInstance`]; `except Exception`
    /// matches any kind, the others match their own kind exactly.
    ExceptionClass(ExcKind),
    /// A raised-or-constructed exception value; what `except ... as e` binds.
    ExceptionInstance(ExcKind, Rc<String>),
}

/// A hashable projection of [`Value`], used as the element type of sets and
/// the key type of mappings. Only scalar values are hashable; attempting to
/// use a container as a key is a `TypeError` raised by the caller before a
/// `ValueKey` is ever constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    None,
    Bool(bool),
    Int(i64),
    /// Float keys compare by bit pattern; NaN keys are permitted but only
    /// ever equal themselves by bit identity, matching the scalar-only key
    /// restriction rather than IEEE-754 semantics.
    Float(u64),
    Str(Rc<String>),
}

impl ValueKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::None => Some(Self::None),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Float(f) => Some(Self::Float(f.to_bits())),
            Value::Str(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::Int(i),
            Self::Float(bits) => Value::Float(f64::from_bits(bits)),
            Self::Str(s) => Value::Str(s),
        }
    }
}

impl Value {
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(Rc::new(s.into()))
    }

    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    #[must_use]
    pub fn mapping(items: IndexMap<ValueKey, Value>) -> Self {
        Self::Mapping(Rc::new(RefCell::new(items)))
    }

    /// `bool(x)` truthiness, used by `if`/`while`/boolean operators.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Tuple(t) | Self::PrintTuple(t) => !t.is_empty(),
            Self::Set(s) => !s.borrow().is_empty(),
            Self::Mapping(m) => !m.borrow().is_empty(),
            _ => true,
        }
    }

    /// The type name reported in error messages (`TypeError`, `AttributeError`).
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::None => "NoneType".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Str(_) => "str".to_string(),
            Self::List(_) => "list".to_string(),
            Self::Tuple(_) | Self::PrintTuple(_) => "tuple".to_string(),
            Self::Set(_) => "set".to_string(),
            Self::Mapping(_) => "dict".to_string(),
            Self::UserFunction(_) | Self::NativeFunction(_) => "function".to_string(),
            Self::UserClass(_) | Self::DataClass(_) | Self::TypePlaceholder(_) | Self::HostClass(_) => "type".to_string(),
            Self::UserInstance(inst) => inst.borrow().class.name.clone(),
            Self::DataObject(obj) => obj.borrow().class.name.clone(),
            Self::HostInstance(inst) => inst.borrow().class_name.clone(),
            Self::BoundMethod(_) => "method".to_string(),
            Self::ModuleStub(_) => "module".to_string(),
            Self::ExceptionClass(_) => "type".to_string(),
            Self::ExceptionInstance(kind, _) => kind.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => {
                let mut buf = ryu::Buffer::new();
                write!(f, "{}", buf.format(*x))
            }
            Self::Str(s) => write!(f, "{s}"),
            Self::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ReprValue(v))?;
                }
                write!(f, "]")
            }
            Self::Tuple(t) | Self::PrintTuple(t) => {
                write!(f, "(")?;
                for (i, v) in t.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ReprValue(v))?;
                }
                if t.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Self::Set(s) => {
                write!(f, "{{")?;
                for (i, v) in s.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ReprValue(&v.clone().into_value()))?;
                }
                write!(f, "}}")
            }
            Self::Mapping(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", ReprValue(&k.clone().into_value()), ReprValue(v))?;
                }
                write!(f, "}}")
            }
            Self::UserFunction(func) => write!(f, "<function {}>", func.name),
            Self::NativeFunction(n) => write!(f, "<built-in function {}>", n.name),
            Self::UserClass(c) => write!(f, "<class '{}'>", c.name),
            Self::UserInstance(inst) => write!(f, "<{} object>", inst.borrow().class.name),
            Self::BoundMethod(m) => write!(f, "<bound method {}>", m.function.name),
            Self::DataClass(d) => write!(f, "<class '{}'>", d.name),
            Self::DataObject(obj) => {
                let obj = obj.borrow();
                write!(f, "{}(", obj.class.name)?;
                for (i, name) in obj.class.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={}", ReprValue(&obj.attributes[name]))?;
                }
                write!(f, ")")
            }
            Self::ModuleStub(m) => write!(f, "<module '{}'>", m.name),
            Self::TypePlaceholder(t) => write!(f, "<class '{}'>", t.name),
            Self::HostClass(name) => write!(f, "<class '{name}'>"),
            Self::HostInstance(inst) => write!(f, "<{} object>", inst.borrow().class_name),
            Self::ExceptionClass(kind) => write!(f, "<class '{kind}'>"),
            Self::ExceptionInstance(_, message) => write!(f, "{message}"),
        }
    }
}

/// Wraps a value so strings are quoted the way Python's `repr()` quotes
/// them when nested inside a container's `str()`.
struct ReprValue<'a>(&'a Value);

impl fmt::Display for ReprValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Str(s) => write!(f, "'{s}'"),
            other => write!(f, "{other}"),
        }
    }
}
