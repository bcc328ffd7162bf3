//! S3 from SPEC_FULL §8 and universal property 2: `str.format` refuses any
//! field reference that reaches for attribute access, item access, or a
//! call, rather than silently performing the substitution.

use std::{cell::RefCell, rc::Rc};

use cordon::{evaluate_program, Agent, EvalOutcome, MemoryKv, RunError, StateHandle, StorageMode, Versioned};

fn run(source: &str) -> Result<(), RunError> {
    let state: StateHandle = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
    evaluate_program(source, Agent::new(None, 5.0), state, None)
}

#[test]
fn format_attribute_access_is_refused() {
    let err = run("r = '{0.__subclasses__}'.format(int)\n").unwrap_err();
    let RunError::Eval(EvalOutcome::Eval(eval_err)) = &err else {
        panic!("expected a structural EvalError, got {err:?}");
    };
    assert!(
        eval_err.message.contains("Format string attribute access"),
        "unexpected message: {}",
        eval_err.message
    );
}

#[test]
fn format_item_access_is_refused() {
    let err = run("d = {'a': 1}\nr = '{0[a]}'.format(d)\n").unwrap_err();
    assert!(matches!(err, RunError::Eval(EvalOutcome::Eval(_))));
}

#[test]
fn format_plain_substitution_still_works() {
    run("r = '{0} and {1}'.format('a', 'b')\n").unwrap();
}
