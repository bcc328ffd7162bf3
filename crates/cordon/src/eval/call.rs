//! Call dispatch, attribute access, and the native-container method
//! whitelist.
//!
//! Grounded on `examples/original_source/tic/eval/call.py`
//! (`CallEvaluator.visit_Call`, `WHITELISTED_METHODS`, `MATERIALIZE_METHODS`)
//! and `tic/eval/objects.py` for attribute get/set on sandbox-native object
//! kinds.

use std::{cell::RefCell, rc::Rc};

use ruff_python_ast::{self as ast, Expr};
use ruff_text_size::{Ranged, TextRange};

use crate::{
    error::{ControlFlow, EvalError, EvalOutcome, EvalResult, TicError},
    eval::{type_error_at, Evaluator},
    function::bind_arguments,
    object::{HostInstance, UserInstance},
    policy::{self, NativeKind},
    state::{Closure, ScopeState, Scoped},
    value::{Value, ValueKey},
};

impl Evaluator<'_> {
    pub fn eval_call(&self, call: &ast::ExprCall) -> EvalResult<Value> {
        let args: Vec<Value> = call.arguments.args.iter().map(|a| self.eval_expr(a)).collect::<EvalResult<_>>()?;
        let kwargs: Vec<(String, Value)> = call
            .arguments
            .keywords
            .iter()
            .map(|kw| {
                let name = kw.arg.as_ref().map(|n| n.as_str().to_string()).ok_or_else(|| {
                    EvalOutcome::from(EvalError::new("`**kwargs` call unpacking is not supported").at(kw.range()))
                })?;
                Ok((name, self.eval_expr(&kw.value)?))
            })
            .collect::<EvalResult<_>>()?;

        match call.func.as_ref() {
            Expr::Name(ast::ExprName { id, .. }) => self.call_by_name(id.as_str(), args, kwargs, call.range()),
            Expr::Attribute(attr) => self.call_method(attr, args, kwargs, call.range()),
            other => {
                let callee = self.eval_expr(other)?;
                call_value(self, &callee, args, kwargs, call.range())
            }
        }
    }

    fn call_by_name(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        range: TextRange,
    ) -> EvalResult<Value> {
        if let Some(value) = self.state.borrow().get(name) {
            return call_value(self, &value, args, kwargs, range);
        }
        if let Some(result) = crate::eval::builtins::call(self, name, &args, &kwargs, range)? {
            return Ok(result);
        }
        Err(EvalError::new(format!("Function '{name}' is not defined.")).at(range).into())
    }

    fn call_method(
        &self,
        attr: &ast::ExprAttribute,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        range: TextRange,
    ) -> EvalResult<Value> {
        let receiver = self.eval_expr(&attr.value)?;
        let method_name = attr.attr.as_str();

        // `.format()` is handled outside the native-method whitelist entirely:
        // it isn't a whitelisted str method, it's the interpolation mini-language.
        if method_name == "format" {
            if let Value::Str(template) = &receiver {
                return crate::eval::format::format_method(self, template, &args, &kwargs, range);
            }
        }

        if let Some(kind) = native_kind(&receiver) {
            if !policy::is_whitelisted_method(kind, method_name) {
                return Err(EvalError::new(format!(
                    "Method '{method_name}' is not allowed on type '{}'.",
                    receiver.type_name()
                ))
                .at(range)
                .into());
            }
            // Mapping's keys()/values()/items() return a live view in the original
            // language; this evaluator has no lazy view type, so the mapping-method
            // handlers below materialize them into a concrete list directly.
            return self.call_native_method(kind, &receiver, method_name, &args, range);
        }

        let bound = get_attr(self, &receiver, method_name, attr.range())?;
        call_value(self, &bound, args, kwargs, range)
    }

    fn call_native_method(
        &self,
        kind: NativeKind,
        receiver: &Value,
        method: &str,
        args: &[Value],
        range: TextRange,
    ) -> EvalResult<Value> {
        match (kind, receiver) {
            (NativeKind::List, Value::List(list)) => self.call_list_method(list, method, args, range),
            (NativeKind::Mapping, Value::Mapping(map)) => self.call_mapping_method(map, method, args, range),
            (NativeKind::Set, Value::Set(set)) => self.call_set_method(set, method, args, range),
            (NativeKind::Str, Value::Str(s)) => self.call_str_method(s, method, args, range),
            _ => unreachable!("native_kind and receiver variant must agree"),
        }
    }

    fn call_list_method(
        &self,
        list: &crate::value::ListRef,
        method: &str,
        args: &[Value],
        range: TextRange,
    ) -> EvalResult<Value> {
        match method {
            "append" => {
                list.borrow_mut().push(args.first().cloned().unwrap_or(Value::None));
                Ok(Value::None)
            }
            "clear" => {
                list.borrow_mut().clear();
                Ok(Value::None)
            }
            "copy" => Ok(Value::list(list.borrow().clone())),
            "count" => {
                let needle = args.first().cloned().unwrap_or(Value::None);
                Ok(Value::Int(list.borrow().iter().filter(|v| crate::eval::expr::values_equal(v, &needle)).count() as i64))
            }
            "extend" => {
                let extra = self.iterate(args.first().unwrap_or(&Value::None), range)?;
                list.borrow_mut().extend(extra);
                Ok(Value::None)
            }
            "index" => {
                let needle = args.first().cloned().unwrap_or(Value::None);
                list.borrow()
                    .iter()
                    .position(|v| crate::eval::expr::values_equal(v, &needle))
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| self.tic_err(TicError::value_error("value not in list"), range))
            }
            "insert" => {
                let Some(Value::Int(i)) = args.first() else {
                    return type_error_at(self, range, "insert() index must be an int");
                };
                let mut items = list.borrow_mut();
                let i = (*i).clamp(0, items.len() as i64) as usize;
                items.insert(i, args.get(1).cloned().unwrap_or(Value::None));
                Ok(Value::None)
            }
            "pop" => {
                let mut items = list.borrow_mut();
                if items.is_empty() {
                    return Err(self.tic_err(TicError::index_error("pop from empty list"), range));
                }
                let i = match args.first() {
                    Some(Value::Int(i)) if *i < 0 => (items.len() as i64 + i) as usize,
                    Some(Value::Int(i)) => *i as usize,
                    _ => items.len() - 1,
                };
                if i >= items.len() {
                    return Err(self.tic_err(TicError::index_error("pop index out of range"), range));
                }
                Ok(items.remove(i))
            }
            "remove" => {
                let needle = args.first().cloned().unwrap_or(Value::None);
                let mut items = list.borrow_mut();
                match items.iter().position(|v| crate::eval::expr::values_equal(v, &needle)) {
                    Some(i) => {
                        items.remove(i);
                        Ok(Value::None)
                    }
                    None => Err(self.tic_err(TicError::value_error("list.remove(x): x not in list"), range)),
                }
            }
            "reverse" => {
                list.borrow_mut().reverse();
                Ok(Value::None)
            }
            "sort" => {
                // Elements that don't support ordering compare as equal rather than
                // raising, so a mixed-type list sorts stably instead of aborting mid-sort.
                let mut items = list.borrow_mut();
                items.sort_by(|a, b| {
                    crate::eval::expr::compare_ordered(a, b).unwrap_or(std::cmp::Ordering::Equal)
                });
                Ok(Value::None)
            }
            _ => unreachable!("whitelisted_methods kept in sync with match arms"),
        }
    }

    fn call_mapping_method(
        &self,
        map: &crate::value::MappingRef,
        method: &str,
        args: &[Value],
        range: TextRange,
    ) -> EvalResult<Value> {
        match method {
            "clear" => {
                map.borrow_mut().clear();
                Ok(Value::None)
            }
            "copy" => Ok(Value::mapping(map.borrow().clone())),
            "get" => {
                let key = self.key_arg(args.first(), range)?;
                Ok(map.borrow().get(&key).cloned().unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
            }
            "items" => Ok(Value::list(
                map.borrow().iter().map(|(k, v)| Value::tuple(vec![k.clone().into_value(), v.clone()])).collect(),
            )),
            "keys" => Ok(Value::list(map.borrow().keys().map(|k| k.clone().into_value()).collect())),
            "values" => Ok(Value::list(map.borrow().values().cloned().collect())),
            "pop" => {
                let key = self.key_arg(args.first(), range)?;
                map.borrow_mut().shift_remove(&key).or_else(|| args.get(1).cloned()).ok_or_else(|| {
                    self.tic_err(TicError::key_error(format!("{:?}", args.first())), range)
                })
            }
            "setdefault" => {
                let key = self.key_arg(args.first(), range)?;
                let default = args.get(1).cloned().unwrap_or(Value::None);
                let mut m = map.borrow_mut();
                Ok(m.entry(key).or_insert(default).clone())
            }
            "update" => {
                let Some(other) = args.first() else { return Ok(Value::None) };
                if let Value::Mapping(other) = other {
                    map.borrow_mut().extend(other.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Ok(Value::None)
            }
            _ => unreachable!("whitelisted_methods kept in sync with match arms"),
        }
    }

    fn call_set_method(
        &self,
        set: &crate::value::SetRef,
        method: &str,
        args: &[Value],
        range: TextRange,
    ) -> EvalResult<Value> {
        match method {
            "add" => {
                let key = self.key_arg(args.first(), range)?;
                set.borrow_mut().insert(key);
                Ok(Value::None)
            }
            "clear" => {
                set.borrow_mut().clear();
                Ok(Value::None)
            }
            "copy" => Ok(Value::Set(Rc::new(RefCell::new(set.borrow().clone())))),
            "discard" => {
                let key = self.key_arg(args.first(), range)?;
                set.borrow_mut().shift_remove(&key);
                Ok(Value::None)
            }
            "pop" => set.borrow_mut().shift_remove_index(0).map(ValueKey::into_value).ok_or_else(|| {
                self.tic_err(TicError::key_error("pop from an empty set"), range)
            }),
            "remove" => {
                let key = self.key_arg(args.first(), range)?;
                if set.borrow_mut().shift_remove(&key) {
                    Ok(Value::None)
                } else {
                    Err(self.tic_err(TicError::key_error(format!("{:?}", args.first())), range))
                }
            }
            "update" => {
                let Some(other) = args.first() else { return Ok(Value::None) };
                for item in self.iterate(other, range)? {
                    if let Some(key) = ValueKey::from_value(&item) {
                        set.borrow_mut().insert(key);
                    }
                }
                Ok(Value::None)
            }
            _ => unreachable!("whitelisted_methods kept in sync with match arms"),
        }
    }

    fn call_str_method(&self, s: &Rc<String>, method: &str, args: &[Value], range: TextRange) -> EvalResult<Value> {
        let arg_str = |i: usize| -> EvalResult<String> {
            match args.get(i) {
                Some(Value::Str(s)) => Ok(s.to_string()),
                _ => type_error_at(self, range, format!("{method}() argument must be str")),
            }
        };
        match method {
            "upper" => Ok(Value::str(s.to_uppercase())),
            "lower" => Ok(Value::str(s.to_lowercase())),
            "strip" => Ok(Value::str(s.trim().to_string())),
            "split" => {
                let parts: Vec<Value> = match args.first() {
                    Some(Value::Str(sep)) => s.split(sep.as_str()).map(Value::str).collect(),
                    _ => s.split_whitespace().map(Value::str).collect(),
                };
                Ok(Value::list(parts))
            }
            "replace" => Ok(Value::str(s.replace(&arg_str(0)?, &arg_str(1)?))),
            "startswith" => Ok(Value::Bool(s.starts_with(&arg_str(0)?))),
            "endswith" => Ok(Value::Bool(s.ends_with(&arg_str(0)?))),
            "join" => {
                let parts = self.iterate(args.first().unwrap_or(&Value::None), range)?;
                let parts: Vec<String> = parts
                    .iter()
                    .map(|v| match v {
                        Value::Str(s) => Ok(s.to_string()),
                        other => type_error_at(self, range, format!("sequence item: expected str, got '{}'", other.type_name())),
                    })
                    .collect::<EvalResult<_>>()?;
                Ok(Value::str(parts.join(s.as_str())))
            }
            _ => unreachable!("whitelisted_methods kept in sync with match arms"),
        }
    }

    fn key_arg(&self, value: Option<&Value>, range: TextRange) -> EvalResult<ValueKey> {
        let value = value.cloned().unwrap_or(Value::None);
        ValueKey::from_value(&value).ok_or_else(|| self.tic_err(TicError::type_error(format!("unhashable type: '{}'", value.type_name())), range))
    }

    /// Calls a bound `UserFunction`, running its body in a new `Scoped`
    /// frame parented on its closure.
    pub(crate) fn call_user_function(
        &self,
        func: &Rc<crate::function::UserFunction>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        range: TextRange,
    ) -> EvalResult<Value> {
        self.enter_call()?;
        let result = self.call_user_function_inner(func, args, kwargs, range);
        self.exit_call();
        result
    }

    fn call_user_function_inner(
        &self,
        func: &Rc<crate::function::UserFunction>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        range: TextRange,
    ) -> EvalResult<Value> {
        let closure_handle: crate::state::StateHandle = match &*func.closure.borrow() {
            Closure::Live { source, vars } => Rc::new(RefCell::new(Closure::Live { source: source.clone(), vars: vars.clone() })),
            Closure::Frozen(ephemeral) => Rc::new(RefCell::new(Closure::Frozen(ephemeral.clone()))),
        };

        let bound = bind_arguments(&func.name, &func.params, args, kwargs, |expr| {
            let default_eval = Evaluator::new(self.agent.clone(), closure_handle.clone(), self.source);
            default_eval.eval_expr(expr).map_err(|outcome| match outcome {
                EvalOutcome::Tic(e) => e,
                other => TicError::type_error(other.to_string()),
            })
        })
        .map_err(|e| self.tic_err(e, range))?;

        let mut frame = Scoped::new(closure_handle);
        for (name, value) in bound {
            frame.set(&name, value);
        }
        let frame_handle: crate::state::StateHandle = Rc::new(RefCell::new(frame));
        let body_eval = Evaluator::new(
            resolve_call_agent(self, func),
            frame_handle,
            self.source,
        );
        match body_eval.run_block(&func.body) {
            Ok(()) => Ok(Value::None),
            Err(EvalOutcome::Signal(ControlFlow::Return(value))) => Ok(value),
            Err(other) => Err(other),
        }
    }

    /// Iterates a container value into a concrete `Vec`, the same
    /// materialize-eagerly approach the teacher's builtins use for `zip`/
    /// `enumerate`/`map`/`filter`.
    pub(crate) fn iterate(&self, value: &Value, range: TextRange) -> EvalResult<Vec<Value>> {
        match value {
            Value::List(l) => Ok(l.borrow().clone()),
            Value::Tuple(t) | Value::PrintTuple(t) => Ok(t.as_ref().clone()),
            Value::Set(s) => Ok(s.borrow().iter().cloned().map(ValueKey::into_value).collect()),
            Value::Mapping(m) => Ok(m.borrow().keys().cloned().map(ValueKey::into_value).collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            _ => type_error_at(self, range, format!("'{}' object is not iterable", value.type_name())),
        }
    }
}

fn resolve_call_agent(ev: &Evaluator, func: &Rc<crate::function::UserFunction>) -> Rc<crate::agent::Agent> {
    crate::agent::resolve_agent(&func.agent_fingerprint).unwrap_or_else(|| ev.agent.clone())
}

pub(crate) fn native_kind(value: &Value) -> Option<NativeKind> {
    match value {
        Value::List(_) => Some(NativeKind::List),
        Value::Mapping(_) => Some(NativeKind::Mapping),
        Value::Set(_) => Some(NativeKind::Set),
        Value::Str(_) => Some(NativeKind::Str),
        _ => None,
    }
}

/// Invokes an already-evaluated callable value (used for both direct calls
/// and calls through an already-bound `BoundMethod`/indirect call target).
pub fn call_value(
    ev: &Evaluator,
    callee: &Value,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    range: TextRange,
) -> EvalResult<Value> {
    match callee {
        Value::UserFunction(func) => ev.call_user_function(func, args, kwargs, range),
        Value::NativeFunction(native) => native.call(&args, &kwargs).map_err(|e| ev.tic_err(e, range)),
        Value::BoundMethod(method) => {
            let mut full_args = vec![Value::UserInstance(method.instance.clone())];
            full_args.extend(args);
            ev.call_user_function(&method.function, full_args, kwargs, range)
        }
        Value::UserClass(class) => {
            let instance = Rc::new(RefCell::new(UserInstance { class: class.clone(), attributes: Default::default() }));
            if let Some(init) = class.find_method("__init__") {
                let mut full_args = vec![Value::UserInstance(instance.clone())];
                full_args.extend(args);
                ev.call_user_function(&init, full_args, kwargs, range)?;
            }
            Ok(Value::UserInstance(instance))
        }
        Value::DataClass(dc) => {
            let obj = dc.construct(args, kwargs).map_err(|e| ev.tic_err(e, range))?;
            Ok(Value::DataObject(Rc::new(RefCell::new(obj))))
        }
        Value::ExceptionClass(kind) => {
            let message = match args.first() {
                Some(Value::Str(s)) => s.to_string(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            Ok(Value::ExceptionInstance(*kind, Rc::new(message)))
        }
        Value::TypePlaceholder(tp) => construct_from_type_placeholder(ev, tp, &args, &kwargs, range),
        Value::HostClass(name) => construct_host_class(ev, name, range),
        other => Err(EvalError::new(format!(
            "Indirect call on a non-user function is not supported. Got: {}",
            other.type_name()
        ))
        .at(range)
        .into()),
    }
}

/// `t = type(x); t()` or `t = str; t(...)` — calling a `type()` placeholder
/// re-invokes the constructor it names: a registered host class's (see
/// [`Value::HostClass`]), or a scalar builtin's own conversion, e.g. `str()`.
fn construct_from_type_placeholder(
    ev: &Evaluator,
    tp: &Rc<crate::object::TypePlaceholder>,
    args: &[Value],
    kwargs: &[(String, Value)],
    range: TextRange,
) -> EvalResult<Value> {
    if ev.agent.lookup_class(&tp.name).is_some() {
        return construct_host_class(ev, &tp.name, range);
    }
    crate::eval::builtins::call(ev, &tp.name, args, kwargs, range)?
        .ok_or_else(|| EvalError::new(format!("'{}' object is not callable", tp.name)).at(range).into())
}

fn construct_host_class(ev: &Evaluator, name: &str, range: TextRange) -> EvalResult<Value> {
    let Some(reg) = ev.agent.lookup_class(name) else {
        return Err(EvalError::new(format!("'{name}' object is not callable")).at(range).into());
    };
    if !reg.constructable {
        return Err(ev.tic_err(TicError::type_error(format!("'{name}' is not constructable")), range));
    }
    Ok(Value::HostInstance(Rc::new(RefCell::new(HostInstance {
        class_name: name.to_string(),
        attributes: std::collections::HashMap::new(),
    }))))
}

/// Attribute read, gated by the sandbox's allow-lists rather than exposing
/// whatever the host object happens to carry.
pub fn get_attr(ev: &Evaluator, receiver: &Value, name: &str, range: TextRange) -> EvalResult<Value> {
    match receiver {
        Value::UserInstance(inst) => UserInstance::getattr(inst, name).map_err(|e| ev.tic_err(e, range)),
        Value::DataObject(obj) => obj.borrow().getattr(name).map_err(|e| ev.tic_err(e, range)),
        Value::ModuleStub(stub) => stub.getattr(name).map_err(|e| ev.tic_err(e, range)),
        Value::HostInstance(inst) => {
            let allowed = host_class_allows_attr(ev, inst, name);
            inst.borrow().getattr(allowed, name).map_err(|e| ev.tic_err(e, range))
        }
        _ => Err(ev.tic_err(
            TicError::attribute_error(format!("'{}' object has no attribute '{name}'", receiver.type_name())),
            range,
        )),
    }
}

/// Attribute write, mirroring `get_attr`'s allow-list.
pub fn set_attr(ev: &Evaluator, receiver: &Value, name: &str, value: Value, range: TextRange) -> EvalResult<()> {
    match receiver {
        Value::UserInstance(inst) => {
            inst.borrow_mut().setattr(name, value);
            Ok(())
        }
        Value::DataObject(obj) => obj.borrow_mut().setattr(name, value).map_err(|e| ev.tic_err(e, range)),
        Value::HostInstance(inst) => {
            let allowed = host_class_allows_attr(ev, inst, name);
            inst.borrow_mut().setattr(allowed, name, value).map_err(|e| ev.tic_err(e, range))
        }
        _ => Err(ev.tic_err(
            TicError::attribute_error(format!("'{}' object has no attribute '{name}'", receiver.type_name())),
            range,
        )),
    }
}

/// Attribute deletion (`del obj.attr`), mirroring `get_attr`'s dispatch.
pub fn delete_attr(ev: &Evaluator, receiver: &Value, name: &str, range: TextRange) -> EvalResult<()> {
    match receiver {
        Value::UserInstance(inst) => inst.borrow_mut().delattr(name).map_err(|e| ev.tic_err(e, range)),
        Value::DataObject(obj) => obj.borrow_mut().delattr(name).map_err(|e| ev.tic_err(e, range)),
        Value::HostInstance(inst) => {
            let allowed = host_class_allows_attr(ev, inst, name);
            inst.borrow_mut().delattr(allowed, name).map_err(|e| ev.tic_err(e, range))
        }
        _ => Err(ev.tic_err(
            TicError::attribute_error(format!("'{}' object has no attribute '{name}'", receiver.type_name())),
            range,
        )),
    }
}

/// Whitelist check shared by `get_attr`/`set_attr`/`dir`/`hasattr` for
/// `HostInstance` values: a data field is reachable only if the originating
/// `ClassRegistration` still declares it. Calling a registered *method* is
/// out of scope — `ClassRegistration.methods` is whitelist metadata only,
/// with no host callback attached (unlike `NativeFunction`), so there is
/// nothing for `get_attr` to return for one; see DESIGN.md.
fn host_class_allows_attr(ev: &Evaluator, inst: &Rc<RefCell<HostInstance>>, name: &str) -> bool {
    ev.agent.lookup_class(&inst.borrow().class_name).is_some_and(|reg| reg.allows_attr(name))
}

pub fn iterate(ev: &Evaluator, value: &Value, range: TextRange) -> EvalResult<Vec<Value>> {
    ev.iterate(value, range)
}
