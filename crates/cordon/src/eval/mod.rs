//! The tree-walking evaluator: one visitor pass over `ruff_python_ast`
//! nodes, dispatching expressions/statements/calls directly rather than
//! compiling to bytecode first.
//!
//! Grounded on `examples/original_source/tic/eval/base.py` (`BaseEvaluator`,
//! the shared `visit`/recursion-guard/error-wrapping machinery that
//! `expr.py`/`stmt.py`/`call.py` mix into via `ExpressionEvaluator` /
//! `StatementEvaluator` / `CallEvaluator`).

mod builtins;
mod call;
mod expr;
mod format;
mod reflect;
mod stmt;

use std::{cell::Cell, rc::Rc, time::Instant};

use ruff_python_ast::Stmt;
use ruff_text_size::Ranged;

use crate::{
    agent::Agent,
    error::{ControlFlow, EvalError, EvalOutcome, EvalResult, ExcKind, ResourceError, RunError, SourceLoc, TicError},
    state::StateHandle,
    value::Value,
};

/// Mirrors the teacher's `resource::DEFAULT_MAX_RECURSION_DEPTH` idiom: a
/// guard against runaway user-function recursion blowing the host stack.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 400;

/// Independent allocation guard for the `range()` builtin.
pub const DEFAULT_MAX_RANGE_SIZE: usize = 10_000;

pub struct Evaluator<'a> {
    pub(crate) agent: Rc<Agent>,
    pub(crate) state: StateHandle,
    pub(crate) source: &'a str,
    recursion_depth: Cell<usize>,
    max_recursion_depth: usize,
    max_range_size: usize,
    deadline: Option<Instant>,
    /// The exception currently being handled, set around an `except` body so
    /// a bare `raise` inside it can re-raise without naming it again.
    current_exception: std::cell::RefCell<Option<TicError>>,
}

impl<'a> Evaluator<'a> {
    #[must_use]
    pub fn new(agent: Rc<Agent>, state: StateHandle, source: &'a str) -> Self {
        Self {
            agent,
            state,
            source,
            recursion_depth: Cell::new(0),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_range_size: DEFAULT_MAX_RANGE_SIZE,
            deadline: None,
            current_exception: std::cell::RefCell::new(None),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    #[must_use]
    pub fn with_max_range_size(mut self, max_range_size: usize) -> Self {
        self.max_range_size = max_range_size;
        self
    }

    pub(crate) fn max_range_size(&self) -> usize {
        self.max_range_size
    }

    /// Checks the wall-clock budget, if any was configured. Called at
    /// statement boundaries, matching the spec's "aborts at the next node
    /// boundary" cancellation semantics.
    pub(crate) fn check_deadline(&self) -> EvalResult<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ResourceError::Timeout { limit: std::time::Duration::from_secs(0) }.into_outcome());
            }
        }
        Ok(())
    }

    pub(crate) fn enter_call(&self) -> EvalResult<()> {
        let depth = self.recursion_depth.get() + 1;
        if depth > self.max_recursion_depth {
            return Err(ResourceError::Recursion { limit: self.max_recursion_depth }.into_outcome());
        }
        self.recursion_depth.set(depth);
        Ok(())
    }

    pub(crate) fn exit_call(&self) {
        self.recursion_depth.set(self.recursion_depth.get().saturating_sub(1));
    }

    pub(crate) fn loc_of(&self, range: ruff_text_size::TextRange) -> SourceLoc {
        let start = usize::from(range.start());
        let line = self.source[..start.min(self.source.len())].matches('\n').count() as u32 + 1;
        let column = self.source[..start.min(self.source.len())]
            .rfind('\n')
            .map_or(start, |nl| start - nl - 1) as u32
            + 1;
        SourceLoc { line, column }
    }

    pub(crate) fn tic_err(&self, err: TicError, range: ruff_text_size::TextRange) -> EvalOutcome {
        EvalOutcome::Tic(err.at(self.loc_of(range)))
    }

    /// Installs `err` as the exception a bare `raise` re-raises, returning
    /// whatever was installed before it (restored by the caller on the way
    /// back out of the handler body).
    pub(crate) fn set_current_exception(&self, err: Option<TicError>) -> Option<TicError> {
        self.current_exception.replace(err)
    }

    pub(crate) fn current_exception(&self) -> Option<TicError> {
        self.current_exception.borrow().clone()
    }

    pub fn run_block(&self, body: &[Stmt]) -> EvalResult<()> {
        for stmt in body {
            self.check_deadline()?;
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }
}

/// Parses and runs `source` to completion against `state`, registered under
/// `agent`. Mutates `state` in place; an agent-exit signal is translated
/// into `Ok(())` (the caller observes the exit by reading state or by the
/// `exit_*` builtin's side channel — see `DESIGN.md` for the decision not
/// to thread a separate exit-result return value, matching the teacher's
/// `run::run_program`'s unit-returning contract).
pub fn evaluate_program(
    source: &str,
    agent: Rc<Agent>,
    state: StateHandle,
    timeout: Option<std::time::Duration>,
) -> Result<(), RunError> {
    let body = crate::parse::parse_program(source)?;
    let mut evaluator = Evaluator::new(agent, state, source);
    if let Some(timeout) = timeout {
        evaluator = evaluator.with_timeout(timeout);
    }
    match evaluator.run_block(&body) {
        Ok(()) => Ok(()),
        Err(EvalOutcome::Signal(ControlFlow::ExitSuccess(_) | ControlFlow::ExitFail(_) | ControlFlow::ExitClarify(_))) => {
            Ok(())
        }
        Err(EvalOutcome::Signal(ControlFlow::Return(_) | ControlFlow::Break | ControlFlow::Continue)) => {
            Err(RunError::Eval(EvalOutcome::Eval(EvalError::new("control-flow signal escaped the program body"))))
        }
        Err(other) => Err(RunError::Eval(other)),
    }
}

/// Shorthand used throughout `expr`/`stmt`/`call`: wraps a [`TicError`] with
/// the evaluator's current source location.
pub(crate) fn type_error_at<T>(ev: &Evaluator, range: ruff_text_size::TextRange, message: impl Into<String>) -> EvalResult<T> {
    Err(ev.tic_err(TicError::new(ExcKind::TypeError, message), range))
}

#[allow(dead_code)]
fn _assert_ranged<T: Ranged>(_: &T) {}

pub use call::call_value;
pub use expr::eval_expr;
