//! `cordon` — a sandboxed tree-walking interpreter for untrusted,
//! LLM-generated code, plus the versioned key/value state store programs
//! run against.
//!
//! Two subsystems carry the weight: [`eval`] walks a parsed AST directly
//! (no bytecode stage) against a [`state::ScopeState`], enforcing
//! attribute-level whitelisting and format-string escape prevention; `state`
//! layers an ephemeral overlay and commit chain ([`state::Versioned`]) over
//! a [`state::KvStore`], with [`freeze`] stripping live references (agent,
//! closure source) out of values before they cross a storage boundary.

mod agent;
mod analysis;
mod error;
mod eval;
mod freeze;
mod function;
mod object;
mod parse;
mod policy;
mod state;
mod value;
mod view;

pub use crate::{
    agent::{
        clear_agent_registry, resolve_agent, Agent, ClassRegistration, HostFn, MemberSpec, ModuleRegistration,
        NativeFunction, RegisteredConst, Visibility,
    },
    error::{ControlFlow, EvalError, EvalOutcome, EvalResult, ExcKind, ParseError, ResourceError, RunError, SourceLoc, TicError},
    eval::{evaluate_program, Evaluator, DEFAULT_MAX_RANGE_SIZE, DEFAULT_MAX_RECURSION_DEPTH},
    function::{bind_arguments, ParamSpec, UserFunction},
    object::{BoundMethod, DataClass, DataObject, HostInstance, ModuleStub, TypePlaceholder, UserClass, UserInstance},
    policy::{is_reserved_name, MemberPattern, NativeKind, RESERVED_NAMES},
    state::{items, Closure, Ephemeral, KvStore, MemoryKv, Namespaced, ScopeState, Scoped, StateHandle, StorageMode, Versioned},
    value::{ListRef, MappingRef, SetRef, Value, ValueKey},
    view::{view, Focus},
};
