//! S6 from SPEC_FULL §8 and universal property 8: an agent-exit signal is
//! not an exception a sandboxed `except` (bare or otherwise) can observe.
//! `evaluate_program` itself folds the signal into `Ok(())` (see its own
//! doc comment), so these tests go one level down to `Evaluator::run_block`
//! to see the raw signal escape.

use std::{cell::RefCell, rc::Rc};

use cordon::{Agent, ControlFlow, EvalOutcome, Evaluator, MemoryKv, ScopeState, StateHandle, StorageMode, Value, Versioned};

#[test]
fn exit_success_escapes_bare_except_and_finally_still_runs() {
    let source = "try:\n    exit_success(result=1)\nexcept:\n    pass\nfinally:\n    z = 1\n";
    let body = cordon_parse(source);

    let state = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
    let handle: StateHandle = state.clone();
    let evaluator = Evaluator::new(Agent::new(None, 5.0), handle, source);

    let err = evaluator.run_block(&body).unwrap_err();
    match err {
        EvalOutcome::Signal(ControlFlow::ExitSuccess(Value::Int(1))) => {}
        other => panic!("expected an uncaught ExitSuccess(1), got {other:?}"),
    }

    assert!(matches!(state.borrow().get("z"), Some(Value::Int(1))), "finally block should still have run");
}

#[test]
fn exit_fail_escapes_typed_except() {
    let source = "try:\n    exit_fail(reason='nope')\nexcept ValueError:\n    x = 99\n";
    let body = cordon_parse(source);

    let state = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
    let handle: StateHandle = state.clone();
    let evaluator = Evaluator::new(Agent::new(None, 5.0), handle, source);

    let err = evaluator.run_block(&body).unwrap_err();
    assert!(matches!(err, EvalOutcome::Signal(ControlFlow::ExitFail(ref reason)) if reason == "nope"));
    assert!(state.borrow().get("x").is_none(), "the except body must not have run");
}

#[test]
fn return_break_continue_do_not_escape_a_plain_except() {
    let source = "def f():\n    for i in [1, 2, 3]:\n        try:\n            return i\n        except:\n            pass\n    return -1\nr = f()\n";
    let body = cordon_parse(source);

    let state = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
    let handle: StateHandle = state.clone();
    let evaluator = Evaluator::new(Agent::new(None, 5.0), handle, source);
    evaluator.run_block(&body).unwrap();
    assert!(matches!(state.borrow().get("r"), Some(Value::Int(1))));
}

fn cordon_parse(source: &str) -> Vec<ruff_python_ast::Stmt> {
    // mirrors `evaluate_program`'s own first step; re-parsing here lets the
    // test drop to `run_block` instead of going through the exit-swallowing
    // top-level entry point.
    match ruff_python_parser::parse_module(source) {
        Ok(parsed) => parsed.into_syntax().body,
        Err(e) => panic!("failed to parse test program: {e}"),
    }
}
