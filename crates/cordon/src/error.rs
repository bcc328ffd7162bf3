//! Error taxonomy for the sandboxed evaluator, split by pipeline stage.
//!
//! Keeping parse/eval/resource/control-flow failures distinct lets callers
//! (and `try`/`except` inside the sandbox) tell apart what is a user-catchable
//! mistake from what is a structural refusal that must never be caught.

use std::fmt;

use ruff_text_size::TextRange;

/// A source position rendered for error messages, 1-indexed like the rest of
/// the toolchain's diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}", self.line, self.column)
    }
}

/// The kind of a user-catchable exception, mirrored 1:1 onto names reachable
/// from inside sandboxed `except` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum ExcKind {
    ValueError,
    TypeError,
    KeyError,
    IndexError,
    AttributeError,
    NameError,
    ZeroDivisionError,
    RecursionError,
    Exception,
}

/// A user-catchable error: something a sandboxed `try`/`except` is allowed
/// to observe and handle.
#[derive(Debug, Clone)]
pub struct TicError {
    pub kind: ExcKind,
    pub message: String,
    pub loc: Option<SourceLoc>,
}

impl TicError {
    #[must_use]
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), loc: None }
    }

    #[must_use]
    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    #[must_use]
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::ValueError, message)
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::TypeError, message)
    }

    #[must_use]
    pub fn key_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::KeyError, message)
    }

    #[must_use]
    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::IndexError, message)
    }

    #[must_use]
    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::AttributeError, message)
    }

    #[must_use]
    pub fn name_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::NameError, message)
    }
}

impl fmt::Display for TicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Some(loc) => write!(f, "Error at {loc}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TicError {}

/// A structural, always-fatal evaluator error: unsupported syntax, a sandbox
/// escape attempt, an unregistered import. Never catchable from inside the
/// sandbox.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
    pub range: Option<TextRange>,
}

impl EvalError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), range: None }
    }

    #[must_use]
    pub fn at(mut self, range: TextRange) -> Self {
        self.range = Some(range);
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range {
            Some(range) => write!(f, "Error at {:?}: {}", range, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for EvalError {}

/// Internal control-flow signal. Threaded through the evaluator's `Result`
/// channel alongside `TicError`/`EvalError`, but never observable by a
/// sandboxed `except`, even a bare `except:`.
#[derive(Debug, Clone)]
pub enum ControlFlow {
    Return(crate::value::Value),
    Break,
    Continue,
    ExitSuccess(crate::value::Value),
    ExitFail(String),
    ExitClarify(String),
}

/// The error channel threaded through every evaluator operation.
#[derive(Debug, Clone)]
pub enum EvalOutcome {
    /// A user-catchable error (`except ValueError: ...` can see this).
    Tic(TicError),
    /// A structural failure; always propagates past every `except`.
    Eval(EvalError),
    /// A return/break/continue/exit signal; propagates past every `except`
    /// and is only consumed by the frame that understands it.
    Signal(ControlFlow),
}

impl From<TicError> for EvalOutcome {
    fn from(err: TicError) -> Self {
        Self::Tic(err)
    }
}

impl From<EvalError> for EvalOutcome {
    fn from(err: EvalError) -> Self {
        Self::Eval(err)
    }
}

impl From<ControlFlow> for EvalOutcome {
    fn from(signal: ControlFlow) -> Self {
        Self::Signal(signal)
    }
}

impl fmt::Display for EvalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tic(e) => write!(f, "{e}"),
            Self::Eval(e) => write!(f, "{e}"),
            Self::Signal(ControlFlow::ExitSuccess(_)) => write!(f, "agent exited: success"),
            Self::Signal(ControlFlow::ExitFail(reason)) => write!(f, "agent exited: failure ({reason})"),
            Self::Signal(ControlFlow::ExitClarify(q)) => write!(f, "agent exited: clarification needed ({q})"),
            Self::Signal(ControlFlow::Return(_)) => write!(f, "return outside function"),
            Self::Signal(ControlFlow::Break) => write!(f, "break outside loop"),
            Self::Signal(ControlFlow::Continue) => write!(f, "continue outside loop"),
        }
    }
}

impl std::error::Error for EvalOutcome {}

pub type EvalResult<T> = Result<T, EvalOutcome>;

/// A parse-stage failure, wrapping the parser's own diagnostics.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// A resource-limit failure: timeout, recursion depth, or range-length cap.
#[derive(Debug, Clone)]
pub enum ResourceError {
    Timeout { limit: std::time::Duration },
    Recursion { limit: usize },
    RangeTooLarge { limit: usize, requested: i64 },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { limit } => write!(f, "time limit exceeded: {limit:?}"),
            Self::Recursion { limit } => write!(f, "maximum recursion depth exceeded: {limit}"),
            Self::RangeTooLarge { limit, requested } => {
                write!(f, "range length {requested} exceeds maximum of {limit}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    /// Recursion limits are user-catchable (`except RecursionError`); timeouts
    /// and allocation caps are not, to keep a runaway program from masking
    /// its own abort.
    #[must_use]
    pub fn into_outcome(self) -> EvalOutcome {
        match self {
            Self::Recursion { limit } => {
                TicError::new(ExcKind::RecursionError, format!("maximum recursion depth exceeded: {limit}")).into()
            }
            Self::Timeout { .. } | Self::RangeTooLarge { .. } => EvalError::new(self.to_string()).into(),
        }
    }
}

/// Top-level error returned by [`crate::evaluate_program`], composing every
/// pipeline stage the way `ReplError` composes `ouros`'s stages.
#[derive(Debug, Clone)]
pub enum RunError {
    Parse(ParseError),
    Eval(EvalOutcome),
    Resource(ResourceError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Eval(e) => write!(f, "{e}"),
            Self::Resource(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<ParseError> for RunError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<EvalOutcome> for RunError {
    fn from(e: EvalOutcome) -> Self {
        Self::Eval(e)
    }
}

impl From<ResourceError> for RunError {
    fn from(e: ResourceError) -> Self {
        Self::Resource(e)
    }
}
