//! User-defined functions and lambdas: parameter binding and the closure
//! they carry.
//!
//! Grounded on `examples/original_source/tic/eval/functions.py`
//! (`UserFunction`, `visit_FunctionDef`, `visit_Lambda`) and the argument
//! binder referenced there (`tic.eval.arguments.bind_arguments`).

use std::cell::RefCell;

use ruff_python_ast::Stmt;

use crate::error::TicError;
use crate::value::Value;

/// A function's formal parameter list: positional-or-keyword names with
/// optional defaults, plus an optional `*args`/`**kwargs` catch-all.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    pub names: Vec<String>,
    /// Default value expressions, one slot per `names` entry (`None` means
    /// that parameter is required). Keyword-only parameters can be required
    /// even after an optional one, so this cannot be a trailing-only slice.
    pub defaults: Vec<Option<ruff_python_ast::Expr>>,
    pub vararg: Option<String>,
    pub kwarg: Option<String>,
}

impl ParamSpec {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct UserFunction {
    pub name: String,
    pub params: ParamSpec,
    pub body: Vec<Stmt>,
    /// The function's own defining environment: a live view restricted to
    /// its free variables, or (after a snapshot) a frozen copy of them.
    pub closure: RefCell<crate::state::Closure>,
    /// The exact source segment the function was parsed from, retained for
    /// display and for re-deriving `params`/`body` after a freeze/rehydrate
    /// round trip.
    pub source_text: Option<String>,
    /// Fingerprint of the agent this function was defined under; resolved
    /// through the process-wide agent registry at call time.
    pub agent_fingerprint: String,
}

impl UserFunction {
    /// A placeholder used only when a stored method/function could not be
    /// reconstructed (e.g. no source segment was captured). Calling it is
    /// always a `TypeError`.
    #[must_use]
    pub fn unreachable(name: String) -> Self {
        Self {
            name,
            params: ParamSpec::empty(),
            body: Vec::new(),
            closure: RefCell::new(crate::state::Closure::Frozen(crate::state::Ephemeral::new())),
            source_text: None,
            agent_fingerprint: String::new(),
        }
    }
}

/// Binds `args`/`kwargs` against `spec`, mirroring CPython's
/// positional-then-keyword binding rules closely enough for the sandbox's
/// restricted call surface.
pub fn bind_arguments(
    func_name: &str,
    spec: &ParamSpec,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
    mut eval_default: impl FnMut(&ruff_python_ast::Expr) -> Result<Value, TicError>,
) -> Result<Vec<(String, Value)>, TicError> {
    let mut bound = Vec::with_capacity(spec.names.len());
    let mut args = args.into_iter();

    for (i, name) in spec.names.iter().enumerate() {
        if let Some(value) = args.next() {
            bound.push((name.clone(), value));
            continue;
        }
        if let Some(pos) = kwargs.iter().position(|(k, _)| k == name) {
            bound.push((name.clone(), kwargs.remove(pos).1));
            continue;
        }
        if let Some(default_expr) = spec.defaults.get(i).and_then(Option::as_ref) {
            bound.push((name.clone(), eval_default(default_expr)?));
            continue;
        }
        return Err(TicError::type_error(format!(
            "{func_name}() missing required positional argument: '{name}'"
        )));
    }

    let remaining: Vec<Value> = args.collect();
    if let Some(vararg) = &spec.vararg {
        bound.push((vararg.clone(), Value::tuple(remaining)));
    } else if !remaining.is_empty() {
        return Err(TicError::type_error(format!(
            "{func_name}() takes {} positional arguments but more were given",
            spec.names.len()
        )));
    }

    if let Some(kwarg) = &spec.kwarg {
        let mapping: indexmap::IndexMap<_, _> = kwargs
            .into_iter()
            .filter_map(|(k, v)| crate::value::ValueKey::from_value(&Value::str(k)).map(|key| (key, v)))
            .collect();
        bound.push((kwarg.clone(), Value::mapping(mapping)));
    } else if let Some((unexpected, _)) = kwargs.into_iter().next() {
        return Err(TicError::type_error(format!(
            "{func_name}() got an unexpected keyword argument '{unexpected}'"
        )));
    }

    Ok(bound)
}
