//! `dir()`/`hasattr()`/`help()`: the sandbox's limited reflection surface.
//!
//! Grounded on `examples/original_source/tic/eval/builtins.py`'s `_dir`,
//! `_hasattr`, `_help`. Both `dir()` and `help()` write their result to the
//! program's `__stdout__` list rather than returning it, matching the
//! original's odd-but-pinned-by-tests calling convention.

use std::rc::Rc;

use ruff_text_size::TextRange;

use crate::{
    error::EvalResult,
    eval::{call, Evaluator},
    policy,
    value::Value,
};

pub fn dir(ev: &Evaluator, args: &[Value], range: TextRange) -> EvalResult<Value> {
    let mut names: Vec<String> = match args.first() {
        None => ev.state.borrow().keys(),
        Some(Value::UserInstance(inst)) => inst.borrow().attributes.keys().cloned().collect(),
        Some(Value::DataObject(obj)) => obj.borrow().attributes.keys().cloned().collect(),
        Some(Value::ModuleStub(stub)) => stub.members.keys().cloned().collect(),
        Some(Value::HostInstance(inst)) => match ev.agent.lookup_class(&inst.borrow().class_name) {
            Some(reg) => reg.attrs.keys().chain(reg.methods.keys()).cloned().collect(),
            None => Vec::new(),
        },
        Some(other) => match call::native_kind(other) {
            Some(kind) => policy::whitelisted_methods(kind).iter().map(|m| (*m).to_string()).collect(),
            None => Vec::new(),
        },
    };
    names.sort();
    let listing = Value::list(names.into_iter().map(Value::str).collect());
    ev.push_stdout(Value::PrintTuple(Rc::new(vec![listing])), range);
    Ok(Value::None)
}

pub fn hasattr(ev: &Evaluator, args: &[Value], range: TextRange) -> EvalResult<Value> {
    let (Some(obj), Some(Value::Str(name))) = (args.first(), args.get(1)) else {
        return crate::eval::type_error_at(ev, range, "hasattr(): attribute name must be a string");
    };
    let found = match obj {
        Value::UserInstance(inst) => {
            inst.borrow().attributes.contains_key(name.as_str()) || inst.borrow().class.find_method(name).is_some()
        }
        Value::DataObject(obj) => obj.borrow().attributes.contains_key(name.as_str()),
        Value::ModuleStub(stub) => stub.members.contains_key(name.as_str()),
        Value::HostInstance(inst) => ev
            .agent
            .lookup_class(&inst.borrow().class_name)
            .is_some_and(|reg| reg.allows_attr(name.as_str()) || reg.allows_method(name.as_str())),
        other => match call::native_kind(other) {
            Some(kind) => policy::is_whitelisted_method(kind, name.as_str()),
            None => crate::eval::call::get_attr(ev, obj, name, range).is_ok(),
        },
    };
    Ok(Value::Bool(found))
}

pub fn help(ev: &Evaluator, args: &[Value], range: TextRange) -> EvalResult<Value> {
    let doc = match args.first() {
        None => general_help(ev),
        Some(Value::UserInstance(inst)) => format!("Help on {}:\n\n(no docstring)", inst.borrow().class.name),
        Some(Value::NativeFunction(f)) => f.docstring.clone().unwrap_or_else(|| format!("No documentation available for {}", f.name)),
        Some(Value::ModuleStub(stub)) => {
            let mut names: Vec<&str> = stub.members.keys().map(String::as_str).collect();
            names.sort_unstable();
            format!("Help on module '{}':\n\nCONTENTS\n{}", stub.name, names.join("\n"))
        }
        Some(Value::HostInstance(inst)) => format!("Help on {}:\n\n(no docstring)", inst.borrow().class_name),
        Some(other) => format!("No documentation available for {other}"),
    };
    ev.push_stdout(Value::PrintTuple(Rc::new(vec![Value::str(doc)])), range);
    Ok(Value::None)
}

fn general_help(ev: &Evaluator) -> String {
    let mut parts = Vec::new();
    let fns = ev.agent.fn_names();
    if !fns.is_empty() {
        let mut fns = fns;
        fns.sort();
        parts.push("Functions:".to_string());
        parts.extend(fns.iter().map(|n| format!("  - {n}")));
    }
    if parts.is_empty() {
        "No functions, classes, or modules are registered with the agent.".to_string()
    } else {
        format!("Available items:\n{}", parts.join("\n"))
    }
}
