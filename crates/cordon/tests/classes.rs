//! S5 from SPEC_FULL §8: a `@dataclass` produces a `DataObject` whose field
//! set is fixed at class definition time — reassigning a declared field
//! works, adding an undeclared one is an `AttributeError`.

use std::{cell::RefCell, rc::Rc};

use cordon::{evaluate_program, Agent, MemoryKv, ScopeState, StateHandle, StorageMode, Value, Versioned};

fn run(source: &str) -> Rc<RefCell<Versioned>> {
    let state = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
    let handle: StateHandle = state.clone();
    evaluate_program(source, Agent::new(None, 5.0), handle, None).unwrap();
    state
}

#[test]
fn dataclass_field_reassignment() {
    let state = run(
        "@dataclass\n\
         class P:\n\
         \x20   x: int\n\
         \x20   y: int\n\
         p = P(1, 2)\n\
         p.x = 3\n",
    );
    let Some(Value::DataObject(obj)) = state.borrow().get("p") else {
        panic!("expected p to be a DataObject");
    };
    let obj = obj.borrow();
    assert_eq!(obj.class.name, "P");
    assert!(matches!(obj.getattr("x"), Ok(Value::Int(3))));
    assert!(matches!(obj.getattr("y"), Ok(Value::Int(2))));
}

#[test]
fn dataclass_undeclared_field_is_attribute_error() {
    let err = evaluate_program(
        "@dataclass\nclass P:\n    x: int\n    y: int\np = P(1, 2)\np.z = 0\n",
        Agent::new(None, 5.0),
        {
            let state: StateHandle = Rc::new(RefCell::new(Versioned::new(MemoryKv::handle(StorageMode::Json), None)));
            state
        },
        None,
    )
    .unwrap_err();
    assert!(format!("{err}").contains("attribute"), "unexpected error: {err}");
}

#[test]
fn user_class_with_methods_constructs_instance() {
    let state = run(
        "class Counter:\n\
         \x20   def __init__(self, start):\n\
         \x20       self.n = start\n\
         \x20   def inc(self):\n\
         \x20       self.n = self.n + 1\n\
         \x20       return self.n\n\
         c = Counter(5)\n\
         r = c.inc()\n",
    );
    assert!(matches!(state.borrow().get("r"), Some(Value::Int(6))));
}
