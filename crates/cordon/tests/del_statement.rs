//! SPEC_FULL §4.3: `del` removes from state, a container, or an instance
//! attribute map.

use std::{cell::RefCell, rc::Rc};

use cordon::{evaluate_program, Agent, MemoryKv, ScopeState, StateHandle, StorageMode, Value, ValueKey, Versioned};

fn key(s: &str) -> ValueKey {
    ValueKey::Str(Rc::new(s.to_string()))
}

fn run(source: &str) -> Rc<RefCell<Versioned>> {
    let state = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
    let handle: StateHandle = state.clone();
    evaluate_program(source, Agent::new(None, 5.0), handle, None).unwrap();
    state
}

fn run_err(source: &str) -> String {
    let state: StateHandle = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
    let err = evaluate_program(source, Agent::new(None, 5.0), state, None).unwrap_err();
    format!("{err}")
}

#[test]
fn del_name_removes_from_state_and_later_access_fails() {
    let state = run("x = 1\ndel x\n");
    assert!(state.borrow().get("x").is_none());

    assert!(run_err("x = 1\ndel x\ny = x\n").contains("not defined"));
}

#[test]
fn del_undefined_name_is_name_error() {
    assert!(run_err("del nope\n").contains("not defined"));
}

#[test]
fn del_list_index_shifts_remaining_items() {
    let state = run("xs = [1, 2, 3]\ndel xs[1]\n");
    let Some(Value::List(xs)) = state.borrow().get("xs") else { panic!("expected a list") };
    let xs = xs.borrow();
    assert_eq!(xs.len(), 2);
    assert!(matches!(xs[0], Value::Int(1)));
    assert!(matches!(xs[1], Value::Int(3)));
}

#[test]
fn del_mapping_key_removes_entry() {
    let state = run("d = {'a': 1, 'b': 2}\ndel d['a']\n");
    let Some(Value::Mapping(d)) = state.borrow().get("d") else { panic!("expected a mapping") };
    let d = d.borrow();
    assert_eq!(d.len(), 1);
    assert!(d.get(&key("b")).is_some());
    assert!(d.get(&key("a")).is_none());
}

#[test]
fn del_missing_mapping_key_is_key_error() {
    assert!(run_err("d = {'a': 1}\ndel d['missing']\n").contains("missing"));
}

#[test]
fn del_instance_attribute_then_reaccess_is_attribute_error() {
    let err = run_err(
        "class C:\n\
         \x20   def __init__(self):\n\
         \x20       self.n = 1\n\
         c = C()\n\
         del c.n\n\
         r = c.n\n",
    );
    assert!(err.contains("has no attribute"), "unexpected error: {err}");
}

#[test]
fn del_multiple_targets_in_one_statement() {
    let state = run("a = 1\nb = 2\ndel a, b\n");
    assert!(state.borrow().get("a").is_none());
    assert!(state.borrow().get("b").is_none());
}
