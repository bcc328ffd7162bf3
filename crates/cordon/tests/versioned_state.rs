//! S7 from SPEC_FULL §8 and universal properties 4-6: commit ordering,
//! idempotent empty snapshots, and exact diff fidelity.

use std::{cell::RefCell, rc::Rc};

use cordon::{evaluate_program, view, Agent, Focus, MemoryKv, StateHandle, StorageMode, Value, Versioned};

fn store() -> Rc<RefCell<Versioned>> {
    Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)))
}

fn run(state: &Rc<RefCell<Versioned>>, source: &str) {
    let handle: StateHandle = state.clone();
    evaluate_program(source, Agent::new(None, 5.0), handle, None).unwrap();
}

/// S7 — a second snapshot's diff lists exactly the keys it wrote, in
/// write order, excluding the internal `__stdout__` accounting key.
#[test]
fn diffs_list_exactly_the_keys_the_commit_wrote_in_order() {
    let state = store();
    run(&state, "a = 1\n");
    Versioned::snapshot(&state).expect("first commit");

    run(&state, "x = 1\ny = 2\n__stdout__ = ['hi']\n");
    let second = Versioned::snapshot(&state).expect("second commit");

    let diffs = state.borrow().diffs(Some(&second));
    let keys: Vec<&str> = diffs.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["x", "y"], "diff should list exactly x,y in write order, no __stdout__");
    assert!(matches!(diffs.get("x"), Some(Value::Int(1))));
    assert!(matches!(diffs.get("y"), Some(Value::Int(2))));

    let rendered = view(&state.borrow(), Focus::Stdout, None, None).unwrap();
    let Value::List(stdout) = rendered else { panic!("expected a list") };
    let stdout = stdout.borrow();
    assert_eq!(stdout.len(), 1);
    assert!(matches!(&stdout[0], Value::Str(s) if s.as_str() == "hi"));
}

/// Universal property 5 — snapshotting with nothing written since the last
/// commit is a no-op: same commit hash, no new entry in `history()`.
#[test]
fn empty_snapshot_is_idempotent() {
    let state = store();
    run(&state, "a = 1\n");
    let first = Versioned::snapshot(&state).expect("first commit");

    let again = Versioned::snapshot(&state);
    assert_eq!(again, Some(first.clone()));

    let history = state.borrow().history(None);
    assert_eq!(history, vec![first]);
}

/// Universal property 4 — `history()` lists commits most-recent-first, and
/// every one of them is reachable via `checkout`.
#[test]
fn history_lists_commits_most_recent_first_and_each_is_checkoutable() {
    let state = store();
    run(&state, "a = 1\n");
    let c1 = Versioned::snapshot(&state).unwrap();
    run(&state, "b = 2\n");
    let c2 = Versioned::snapshot(&state).unwrap();
    run(&state, "c = 3\n");
    let c3 = Versioned::snapshot(&state).unwrap();

    let history = state.borrow().history(None);
    assert_eq!(history, vec![c3.clone(), c2.clone(), c1.clone()]);

    for commit in [&c1, &c2, &c3] {
        assert!(state.borrow().checkout(commit, None).is_some(), "commit {commit} should be checkoutable");
    }
}
