//! S1/S2 from SPEC_FULL §8 and universal property 3: a `UserFunction`
//! closure reads its free variables live against the defining state, and
//! `snapshot`/`checkout` freezes that read to whatever it was at commit time.

use std::{cell::RefCell, rc::Rc};

use cordon::{evaluate_program, Agent, MemoryKv, ScopeState, StateHandle, StorageMode, Value, Versioned};

fn store() -> Rc<RefCell<Versioned>> {
    Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)))
}

fn run(state: &Rc<RefCell<Versioned>>, source: &str) {
    let handle: StateHandle = state.clone();
    evaluate_program(source, Agent::new(None, 5.0), handle, None).unwrap();
}

fn get(state: &Rc<RefCell<Versioned>>, key: &str) -> Option<Value> {
    state.borrow().get(key)
}

/// S1 — `g` closes over the enclosing `x`, not a copy taken at `def` time:
/// reassigning `x` between the two calls to `h` changes what the second
/// call sees.
#[test]
fn late_binding_closure_sees_reassignment() {
    let state = store();
    run(
        &state,
        "x = 10\n\
         def f():\n\
         \x20   def g():\n\
         \x20       return x\n\
         \x20   return g\n\
         h = f()\n\
         r1 = h()\n\
         x = 20\n\
         r2 = h()\n",
    );
    assert!(matches!(get(&state, "r1"), Some(Value::Int(10))));
    assert!(matches!(get(&state, "r2"), Some(Value::Int(20))));
}

/// S2 — a function frozen into a commit reads its free variables as they
/// stood at snapshot time, even once the live state (and a later checkout's
/// own state) have moved past that.
#[test]
fn snapshot_freezes_closure_value() {
    let agent = Agent::new(None, 5.0);
    let state = store();
    run(&state, "x = 100\ndef g():\n    return x\n");

    let commit = Versioned::snapshot(&state).expect("non-empty ephemeral produces a commit");

    run(&state, "x = 200\nr = g()\n");
    assert!(matches!(get(&state, "r"), Some(Value::Int(200))));

    let checked_out = state.borrow().checkout(&commit, Some(agent.clone())).expect("commit is in history");
    let checked_out = Rc::new(RefCell::new(checked_out));
    run(&checked_out, "x = 300\nr2 = g()\n");
    assert!(matches!(get(&checked_out, "r2"), Some(Value::Int(200))));
}
