//! Universal property 7 from SPEC_FULL §8: `range(N)` with `N` over the
//! configured cap raises, and the cap itself is configurable per evaluator.

use std::{cell::RefCell, rc::Rc};

use cordon::{evaluate_program, Agent, EvalOutcome, Evaluator, MemoryKv, RunError, StateHandle, StorageMode, Versioned};

fn new_store() -> Rc<RefCell<Versioned>> {
    Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)))
}

#[test]
fn range_over_default_cap_is_refused() {
    let state: StateHandle = new_store();
    let err = evaluate_program("r = range(10_000_001)\n", Agent::new(None, 5.0), state, None).unwrap_err();
    match err {
        RunError::Eval(EvalOutcome::Eval(e)) => assert!(e.message.contains("exceeds maximum")),
        other => panic!("expected a range-too-large EvalError, got {other:?}"),
    }
}

#[test]
fn range_under_default_cap_succeeds() {
    let state: StateHandle = new_store();
    evaluate_program("r = len(range(1000))\n", Agent::new(None, 5.0), state, None).unwrap();
}

#[test]
fn range_cap_is_configurable_per_evaluator() {
    let source = "r = range(50)\n";
    let body = {
        let parsed = ruff_python_parser::parse_module(source).unwrap();
        parsed.into_syntax().body
    };
    let state: StateHandle = new_store();
    let evaluator = Evaluator::new(Agent::new(None, 5.0), state, source).with_max_range_size(10);
    let err = evaluator.run_block(&body).unwrap_err();
    assert!(matches!(err, EvalOutcome::Eval(ref e) if e.message.contains("exceeds maximum of 10")));
}
