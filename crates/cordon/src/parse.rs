//! Source parsing: wraps `ruff_python_parser` and provides the AST segment
//! extraction a `def`/`lambda` statement needs to retain its own source
//! text, plus the inverse used to re-derive a function's parameter spec and
//! body after a freeze/rehydrate round trip.
//!
//! Grounded on `examples/parcadei-ouros/crates/ouros/src/parse.rs`'s use of
//! `ruff_python_parser::parse_module`.

use ruff_python_ast::{self as ast, Parameters, Stmt};
use ruff_python_parser::parse_module;

use crate::{error::ParseError, function::ParamSpec};

/// Parses a full program into its top-level statement list.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let parsed = parse_module(source).map_err(|e| ParseError { message: e.to_string() })?;
    Ok(parsed.into_syntax().body)
}

/// Builds the [`ParamSpec`] the evaluator binds calls against from a
/// parsed `Parameters` node. Positional-only and positional-or-keyword
/// parameters are treated uniformly (the sandbox does not distinguish
/// call styles); keyword-only parameters are appended after them since
/// `bind_arguments` itself does not special-case keyword-only-ness beyond
/// requiring a name match.
#[must_use]
pub fn param_spec_from(params: &Parameters) -> ParamSpec {
    let mut names = Vec::new();
    let mut defaults = Vec::new();

    for p in params.posonlyargs.iter().chain(params.args.iter()) {
        names.push(p.parameter.name.id.to_string());
        defaults.push(p.default.as_deref().cloned());
    }
    for p in &params.kwonlyargs {
        names.push(p.parameter.name.id.to_string());
        defaults.push(p.default.as_deref().cloned());
    }

    // `bind_arguments` expects one `defaults` slot per name, `None` meaning
    // "required" — a keyword-only parameter can be required even after an
    // optional one, so a trailing-only slice would misalign them.
    ParamSpec {
        names,
        defaults,
        vararg: params.vararg.as_ref().map(|v| v.name.id.to_string()),
        kwarg: params.kwarg.as_ref().map(|v| v.name.id.to_string()),
    }
}

/// Re-parses a retained source segment for a single `def`/`lambda`,
/// recovering its `(ParamSpec, body)` pair. A `lambda`'s single expression
/// body is wrapped in a synthetic `return` so it can run through the same
/// statement evaluator as a `def`. Returns `None` if the segment no longer
/// parses as a single function definition, or the source was not retained
/// at all.
#[must_use]
pub fn reparse_function(source_text: &str) -> Option<(ParamSpec, Vec<Stmt>)> {
    let body = parse_program(source_text).ok()?;
    match body.into_iter().next()? {
        Stmt::FunctionDef(def) => Some((param_spec_from(&def.parameters), def.body)),
        Stmt::Expr(ast::StmtExpr { value, .. }) => match *value {
            ast::Expr::Lambda(lambda) => {
                let params = lambda.parameters.as_deref().cloned().unwrap_or_default();
                let body = vec![Stmt::Return(ast::StmtReturn {
                    value: Some(lambda.body),
                    range: lambda.range,
                    node_index: ast::AtomicNodeIndex::default(),
                })];
                Some((param_spec_from(&params), body))
            }
            _ => None,
        },
        _ => None,
    }
}
