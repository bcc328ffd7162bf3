//! S4 from SPEC_FULL §8 and universal property 1: attribute access (and the
//! `dir`/`hasattr` reflection builtins) on a registered host class are gated
//! by the class's own allow-list, not by whatever the host struct actually
//! carries.

use std::{cell::RefCell, rc::Rc};

use cordon::{
    clear_agent_registry, evaluate_program, Agent, ClassRegistration, MemberSpec, MemoryKv, ModuleRegistration,
    ScopeState, StateHandle, StorageMode, Value, Versioned,
};

fn agent_with_class_c() -> Rc<Agent> {
    clear_agent_registry();
    let agent = Agent::new(None, 5.0);
    let class = ClassRegistration::new("C").with_method("inc", MemberSpec::new());
    let module = ModuleRegistration::new("mod").with_class(class);
    agent.register_module(module).unwrap();
    agent
}

fn run(agent: Rc<Agent>, source: &str) -> Rc<RefCell<Versioned>> {
    let state = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
    let handle: StateHandle = state.clone();
    evaluate_program(source, agent, handle, None).unwrap();
    state
}

#[test]
fn hasattr_and_dir_respect_registered_class_whitelist() {
    let agent = agent_with_class_c();
    let state = run(
        agent,
        "from mod import C\n\
         c = C()\n\
         a = hasattr(c, 'inc')\n\
         b = hasattr(c, 'exc')\n\
         d = dir(c)\n",
    );

    assert!(matches!(state.borrow().get("a"), Some(Value::Bool(true))));
    assert!(matches!(state.borrow().get("b"), Some(Value::Bool(false))));

    let Some(Value::List(items)) = state.borrow().get("d") else {
        panic!("expected dir(c) to return a list");
    };
    let names: Vec<String> = items.borrow().iter().map(ToString::to_string).collect();
    assert!(names.iter().any(|n| n == "inc"), "dir(c) missing 'inc': {names:?}");
    assert!(!names.iter().any(|n| n == "exc"), "dir(c) unexpectedly lists 'exc': {names:?}");
}

#[test]
fn dir_and_hasattr_on_native_container_use_the_method_whitelist() {
    let agent = agent_with_class_c();
    let state = run(
        agent,
        "xs = [1, 2]\n\
         d = dir(xs)\n\
         a = hasattr(xs, 'append')\n\
         b = hasattr(xs, '__sizeof__')\n",
    );

    let Some(Value::List(items)) = state.borrow().get("d") else {
        panic!("expected dir([1, 2]) to return a list");
    };
    let names: Vec<String> = items.borrow().iter().map(ToString::to_string).collect();
    assert!(names.iter().any(|n| n == "append"), "dir([1, 2]) missing 'append': {names:?}");
    assert!(!names.iter().any(|n| n == "__sizeof__"), "dir([1, 2]) unexpectedly lists '__sizeof__': {names:?}");

    assert!(matches!(state.borrow().get("a"), Some(Value::Bool(true))));
    assert!(matches!(state.borrow().get("b"), Some(Value::Bool(false))));
}

#[test]
fn getattr_on_undeclared_attribute_raises_attribute_error() {
    let agent = agent_with_class_c();
    let err = evaluate_program(
        "from mod import C\nc = C()\nc.secret\n",
        agent,
        {
            let state: StateHandle = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
            state
        },
        None,
    )
    .unwrap_err();
    assert!(format!("{err}").contains("has no attribute"), "unexpected error: {err}");
}
