//! Expression evaluation.
//!
//! Grounded on `examples/original_source/tic/eval/expr.py`
//! (`ExpressionEvaluator`): one visitor method per `ast.expr` node kind,
//! translated onto `ruff_python_ast::Expr`.

use std::{cell::RefCell, rc::Rc};

use indexmap::{IndexMap, IndexSet};
use ruff_python_ast::{self as ast, CmpOp, Expr, Number, Operator, UnaryOp};
use ruff_text_size::Ranged;

use crate::{
    error::{EvalError, EvalResult, ExcKind, TicError},
    eval::{type_error_at, Evaluator},
    function::UserFunction,
    state::{Closure, ScopeState},
    value::{Value, ValueKey},
};

impl Evaluator<'_> {
    pub fn eval_expr(&self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::NumberLiteral(lit) => Ok(number_to_value(&lit.value)),
            Expr::StringLiteral(lit) => Ok(Value::str(lit.value.to_str().to_string())),
            Expr::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expr::NoneLiteral(_) => Ok(Value::None),
            Expr::FString(fstring) => self.eval_fstring(fstring),
            Expr::Name(ast::ExprName { id, .. }) => self.lookup_name(id.as_str(), expr.range()),
            Expr::BoolOp(ast::ExprBoolOp { op, values, .. }) => self.eval_bool_op(*op, values),
            Expr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => self.eval_unary_op(*op, operand),
            Expr::BinOp(ast::ExprBinOp { left, op, right, .. }) => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                self.apply_binop(*op, &l, &r, expr.range())
            }
            Expr::Compare(compare) => self.eval_compare(compare),
            Expr::If(ast::ExprIf { test, body, orelse, .. }) => {
                if self.eval_expr(test)?.is_truthy() {
                    self.eval_expr(body)
                } else {
                    self.eval_expr(orelse)
                }
            }
            Expr::Tuple(ast::ExprTuple { elts, .. }) => {
                Ok(Value::tuple(elts.iter().map(|e| self.eval_expr(e)).collect::<EvalResult<_>>()?))
            }
            Expr::List(ast::ExprList { elts, .. }) => {
                Ok(Value::list(elts.iter().map(|e| self.eval_expr(e)).collect::<EvalResult<_>>()?))
            }
            Expr::Set(ast::ExprSet { elts, .. }) => {
                let mut set = IndexSet::new();
                for e in elts {
                    let v = self.eval_expr(e)?;
                    set.insert(self.require_key(v, expr.range())?);
                }
                Ok(Value::Set(Rc::new(RefCell::new(set))))
            }
            Expr::Dict(dict) => {
                let mut map = IndexMap::new();
                for item in &dict.items {
                    let Some(key_expr) = &item.key else {
                        return Err(EvalError::new("dict unpacking (`**`) is not supported").at(expr.range()).into());
                    };
                    let key = self.eval_expr(key_expr)?;
                    let key = self.require_key(key, key_expr.range())?;
                    let value = self.eval_expr(&item.value)?;
                    map.insert(key, value);
                }
                Ok(Value::mapping(map))
            }
            Expr::Attribute(attr) => self.eval_attribute(attr),
            Expr::Subscript(sub) => self.eval_subscript(sub),
            Expr::Call(call) => self.eval_call(call),
            Expr::Lambda(lambda) => self.eval_lambda(lambda),
            Expr::Starred(ast::ExprStarred { value, .. }) => self.eval_expr(value),
            Expr::ListComp(comp) => self.eval_list_comp(comp),
            Expr::SetComp(comp) => self.eval_set_comp(comp),
            Expr::DictComp(comp) => self.eval_dict_comp(comp),
            other => Err(EvalError::new(format!("unsupported expression: {other:?}")).at(expr.range()).into()),
        }
    }

    fn require_key(&self, value: Value, range: ruff_text_size::TextRange) -> EvalResult<ValueKey> {
        ValueKey::from_value(&value)
            .ok_or_else(|| self.tic_err(TicError::type_error(format!("unhashable type: '{}'", value.type_name())), range))
    }

    fn lookup_name(&self, name: &str, range: ruff_text_size::TextRange) -> EvalResult<Value> {
        if let Some(value) = self.state.borrow().get(name) {
            return Ok(value);
        }
        if let Some(value) = crate::eval::builtins::lookup(self, name) {
            return Ok(value);
        }
        Err(self.tic_err(TicError::name_error(format!("name '{name}' is not defined")), range))
    }

    fn eval_bool_op(&self, op: ast::BoolOp, values: &[Expr]) -> EvalResult<Value> {
        let mut last = Value::None;
        for (i, value_expr) in values.iter().enumerate() {
            last = self.eval_expr(value_expr)?;
            let is_last = i == values.len() - 1;
            match op {
                ast::BoolOp::And if !last.is_truthy() && !is_last => return Ok(last),
                ast::BoolOp::Or if last.is_truthy() && !is_last => return Ok(last),
                _ => {}
            }
        }
        Ok(last)
    }

    fn eval_unary_op(&self, op: UnaryOp, operand: &Expr) -> EvalResult<Value> {
        let value = self.eval_expr(operand)?;
        match (op, &value) {
            (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
            (UnaryOp::USub, Value::Int(i)) => Ok(Value::Int(-i)),
            (UnaryOp::USub, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::UAdd, Value::Int(_) | Value::Float(_)) => Ok(value),
            (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(!i)),
            _ => type_error_at(
                self,
                operand.range(),
                format!("bad operand type for unary {op:?}: '{}'", value.type_name()),
            ),
        }
    }

    pub(crate) fn apply_binop(&self, op: Operator, l: &Value, r: &Value, range: ruff_text_size::TextRange) -> EvalResult<Value> {
        use Value::{Float, Int, Str};
        match (op, l, r) {
            (Operator::Add, Int(a), Int(b)) => Ok(Int(a + b)),
            (Operator::Add, Float(a), Float(b)) => Ok(Float(a + b)),
            (Operator::Add, Int(a), Float(b)) => Ok(Float(*a as f64 + b)),
            (Operator::Add, Float(a), Int(b)) => Ok(Float(a + *b as f64)),
            (Operator::Add, Str(a), Str(b)) => Ok(Value::str(format!("{a}{b}"))),
            (Operator::Add, Value::List(a), Value::List(b)) => {
                let mut out = a.borrow().clone();
                out.extend(b.borrow().iter().cloned());
                Ok(Value::list(out))
            }
            (Operator::Add, Value::Tuple(a), Value::Tuple(b)) => {
                Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
            }
            (Operator::Sub, Int(a), Int(b)) => Ok(Int(a - b)),
            (Operator::Sub, Float(a), Float(b)) => Ok(Float(a - b)),
            (Operator::Sub, Int(a), Float(b)) => Ok(Float(*a as f64 - b)),
            (Operator::Sub, Float(a), Int(b)) => Ok(Float(a - *b as f64)),
            (Operator::Mult, Int(a), Int(b)) => Ok(Int(a * b)),
            (Operator::Mult, Float(a), Float(b)) => Ok(Float(a * b)),
            (Operator::Mult, Int(a), Float(b)) => Ok(Float(*a as f64 * b)),
            (Operator::Mult, Float(a), Int(b)) => Ok(Float(a * *b as f64)),
            (Operator::Mult, Str(a), Int(b)) => Ok(Value::str(a.repeat((*b).max(0) as usize))),
            (Operator::Mult, Value::List(a), Int(b)) => {
                let repeated: Vec<Value> = a.borrow().iter().cloned().collect::<Vec<_>>().repeat((*b).max(0) as usize);
                Ok(Value::list(repeated))
            }
            (Operator::Div, l, r) => self.divide(l, r, range, false),
            (Operator::FloorDiv, l, r) => self.divide(l, r, range, true),
            (Operator::Mod, Int(a), Int(b)) => {
                if *b == 0 {
                    return Err(self.tic_err(TicError::new(ExcKind::ZeroDivisionError, "integer division or modulo by zero"), range));
                }
                Ok(Int(a.rem_euclid(*b)))
            }
            (Operator::Mod, Float(a), Float(b)) => Ok(Float(a.rem_euclid(*b))),
            (Operator::Mod, Str(template), _) => crate::eval::format::percent_format(self, template, r, range),
            (Operator::Pow, Int(a), Int(b)) if *b >= 0 => Ok(Int(a.pow(*b as u32))),
            (Operator::Pow, Float(a), Float(b)) => Ok(Float(a.powf(*b))),
            (Operator::Pow, Int(a), Float(b)) => Ok(Float((*a as f64).powf(*b))),
            (Operator::Pow, Float(a), Int(b)) => Ok(Float(a.powi(*b as i32))),
            (Operator::BitAnd, Int(a), Int(b)) => Ok(Int(a & b)),
            (Operator::BitOr, Int(a), Int(b)) => Ok(Int(a | b)),
            (Operator::BitXor, Int(a), Int(b)) => Ok(Int(a ^ b)),
            (Operator::LShift, Int(a), Int(b)) => Ok(Int(a << b)),
            (Operator::RShift, Int(a), Int(b)) => Ok(Int(a >> b)),
            _ => type_error_at(
                self,
                range,
                format!("unsupported operand type(s) for {op:?}: '{}' and '{}'", l.type_name(), r.type_name()),
            ),
        }
    }

    fn divide(&self, l: &Value, r: &Value, range: ruff_text_size::TextRange, floor: bool) -> EvalResult<Value> {
        let (a, b) = match (l, r) {
            (Value::Int(a), Value::Int(b)) => (*a as f64, *b as f64),
            (Value::Float(a), Value::Float(b)) => (*a, *b),
            (Value::Int(a), Value::Float(b)) => (*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => (*a, *b as f64),
            _ => {
                return type_error_at(
                    self,
                    range,
                    format!("unsupported operand type(s) for /: '{}' and '{}'", l.type_name(), r.type_name()),
                )
            }
        };
        if b == 0.0 {
            return Err(self.tic_err(TicError::new(ExcKind::ZeroDivisionError, "division by zero"), range));
        }
        if floor {
            let result = (a / b).floor();
            if matches!((l, r), (Value::Int(_), Value::Int(_))) {
                Ok(Value::Int(result as i64))
            } else {
                Ok(Value::Float(result))
            }
        } else {
            Ok(Value::Float(a / b))
        }
    }

    fn eval_compare(&self, compare: &ast::ExprCompare) -> EvalResult<Value> {
        if compare.ops.len() != 1 || compare.comparators.len() != 1 {
            return Err(EvalError::new("chained comparisons are not supported").at(compare.range()).into());
        }
        let left = self.eval_expr(&compare.left)?;
        let right = self.eval_expr(&compare.comparators[0])?;
        let op = compare.ops[0];
        let result = match op {
            CmpOp::Eq => values_equal(&left, &right),
            CmpOp::NotEq => !values_equal(&left, &right),
            CmpOp::Is => identical(&left, &right),
            CmpOp::IsNot => !identical(&left, &right),
            CmpOp::In => self.contains(&right, &left, compare.range())?,
            CmpOp::NotIn => !self.contains(&right, &left, compare.range())?,
            CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
                let ordering = compare_ordered(&left, &right)
                    .ok_or_else(|| self.tic_err(TicError::type_error(format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        cmp_symbol(op), left.type_name(), right.type_name()
                    )), compare.range()))?;
                match op {
                    CmpOp::Lt => ordering.is_lt(),
                    CmpOp::LtE => ordering.is_le(),
                    CmpOp::Gt => ordering.is_gt(),
                    CmpOp::GtE => ordering.is_ge(),
                    _ => unreachable!(),
                }
            }
        };
        Ok(Value::Bool(result))
    }

    fn contains(&self, container: &Value, needle: &Value, range: ruff_text_size::TextRange) -> EvalResult<bool> {
        match container {
            Value::Str(s) => match needle {
                Value::Str(n) => Ok(s.contains(n.as_str())),
                _ => type_error_at(self, range, "'in <string>' requires string as left operand"),
            },
            Value::List(l) => Ok(l.borrow().iter().any(|v| values_equal(v, needle))),
            Value::Tuple(t) | Value::PrintTuple(t) => Ok(t.iter().any(|v| values_equal(v, needle))),
            Value::Set(s) => Ok(ValueKey::from_value(needle).is_some_and(|k| s.borrow().contains(&k))),
            Value::Mapping(m) => Ok(ValueKey::from_value(needle).is_some_and(|k| m.borrow().contains_key(&k))),
            _ => type_error_at(self, range, format!("argument of type '{}' is not iterable", container.type_name())),
        }
    }

    fn eval_attribute(&self, attr: &ast::ExprAttribute) -> EvalResult<Value> {
        let receiver = self.eval_expr(&attr.value)?;
        let name = attr.attr.as_str();
        crate::eval::call::get_attr(self, &receiver, name, attr.range())
    }

    fn eval_subscript(&self, sub: &ast::ExprSubscript) -> EvalResult<Value> {
        let receiver = self.eval_expr(&sub.value)?;
        if let Expr::Slice(slice) = sub.slice.as_ref() {
            return self.eval_slice(&receiver, slice, sub.range());
        }
        let index = self.eval_expr(&sub.slice)?;
        self.subscript_get(&receiver, &index, sub.range())
    }

    pub(crate) fn subscript_get(&self, receiver: &Value, index: &Value, range: ruff_text_size::TextRange) -> EvalResult<Value> {
        match receiver {
            Value::List(l) => {
                let items = l.borrow();
                let i = normalize_index(index, items.len(), self, range)?;
                items.get(i).cloned().ok_or_else(|| self.tic_err(TicError::index_error("list index out of range"), range))
            }
            Value::Tuple(t) | Value::PrintTuple(t) => {
                let i = normalize_index(index, t.len(), self, range)?;
                t.get(i).cloned().ok_or_else(|| self.tic_err(TicError::index_error("tuple index out of range"), range))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = normalize_index(index, chars.len(), self, range)?;
                chars.get(i).map(|c| Value::str(c.to_string())).ok_or_else(|| {
                    self.tic_err(TicError::index_error("string index out of range"), range)
                })
            }
            Value::Mapping(m) => {
                let key = self.require_key(index.clone(), range)?;
                m.borrow().get(&key).cloned().ok_or_else(|| {
                    self.tic_err(TicError::key_error(format!("{}", crate::eval::format::repr(index))), range)
                })
            }
            _ => type_error_at(self, range, format!("'{}' object is not subscriptable", receiver.type_name())),
        }
    }

    fn eval_slice(&self, receiver: &Value, slice: &ast::ExprSlice, range: ruff_text_size::TextRange) -> EvalResult<Value> {
        let len = match receiver {
            Value::List(l) => l.borrow().len(),
            Value::Tuple(t) | Value::PrintTuple(t) => t.len(),
            Value::Str(s) => s.chars().count(),
            _ => return type_error_at(self, range, format!("'{}' object is not subscriptable", receiver.type_name())),
        };
        let step = match &slice.step {
            Some(e) => match self.eval_expr(e)? {
                Value::Int(i) if i != 0 => i,
                Value::Int(_) => return Err(self.tic_err(TicError::value_error("slice step cannot be zero"), range)),
                _ => 1,
            },
            None => 1,
        };
        let (start, stop) = slice_bounds(self, &slice.lower, &slice.upper, len, step, range)?;
        let indices: Vec<usize> = if step > 0 {
            (start..stop).step_by(step as usize).collect()
        } else {
            let mut out = Vec::new();
            let mut i = start as isize;
            while i > stop as isize {
                out.push(i as usize);
                i += step as isize;
            }
            out
        };
        match receiver {
            Value::List(l) => {
                let items = l.borrow();
                Ok(Value::list(indices.into_iter().filter_map(|i| items.get(i).cloned()).collect()))
            }
            Value::Tuple(t) | Value::PrintTuple(t) => {
                Ok(Value::tuple(indices.into_iter().filter_map(|i| t.get(i).cloned()).collect()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(Value::str(indices.into_iter().filter_map(|i| chars.get(i)).collect::<String>()))
            }
            _ => unreachable!(),
        }
    }

    fn eval_lambda(&self, lambda: &ast::ExprLambda) -> EvalResult<Value> {
        let params = lambda.parameters.as_deref().cloned().unwrap_or_default();
        let spec = crate::parse::param_spec_from(&params);
        let body = vec![ast::Stmt::Return(ast::StmtReturn {
            value: Some(lambda.body.clone()),
            range: lambda.range(),
            node_index: ast::AtomicNodeIndex::default(),
        })];
        let free = crate::analysis::free_variables_of(&params, &body);
        let closure = Closure::live(self.state.clone(), free);
        Ok(Value::UserFunction(Rc::new(UserFunction {
            name: "<lambda>".to_string(),
            params: spec,
            body,
            closure: RefCell::new(closure),
            source_text: segment(self.source, lambda.range()),
            agent_fingerprint: self.agent.fingerprint(),
        })))
    }

    fn eval_list_comp(&self, comp: &ast::ExprListComp) -> EvalResult<Value> {
        let mut out = Vec::new();
        self.run_comprehension(&comp.generators, &mut |ev| {
            out.push(ev.eval_expr(&comp.elt)?);
            Ok(())
        })?;
        Ok(Value::list(out))
    }

    fn eval_set_comp(&self, comp: &ast::ExprSetComp) -> EvalResult<Value> {
        let mut out = IndexSet::new();
        self.run_comprehension(&comp.generators, &mut |ev| {
            let v = ev.eval_expr(&comp.elt)?;
            out.insert(ev.require_key(v, comp.range())?);
            Ok(())
        })?;
        Ok(Value::Set(Rc::new(RefCell::new(out))))
    }

    fn eval_dict_comp(&self, comp: &ast::ExprDictComp) -> EvalResult<Value> {
        let mut out = IndexMap::new();
        self.run_comprehension(&comp.generators, &mut |ev| {
            let k = ev.eval_expr(&comp.key)?;
            let k = ev.require_key(k, comp.range())?;
            let v = ev.eval_expr(&comp.value)?;
            out.insert(k, v);
            Ok(())
        })?;
        Ok(Value::mapping(out))
    }

    /// Shared driver for list/set/dict comprehensions: evaluates nested
    /// `for`/`if` generator clauses in a fresh [`crate::state::Scoped`]
    /// frame so loop variables never leak into the enclosing scope.
    fn run_comprehension(
        &self,
        generators: &[ast::Comprehension],
        emit: &mut dyn FnMut(&Evaluator) -> EvalResult<()>,
    ) -> EvalResult<()> {
        let scoped = crate::state::Scoped::new(self.state.clone());
        let handle: crate::state::StateHandle = Rc::new(RefCell::new(scoped));
        let inner = Evaluator::new(self.agent.clone(), handle, self.source);
        inner.run_comprehension_rec(generators, emit)
    }

    fn run_comprehension_rec(
        &self,
        generators: &[ast::Comprehension],
        emit: &mut dyn FnMut(&Evaluator) -> EvalResult<()>,
    ) -> EvalResult<()> {
        let Some((gen, rest)) = generators.split_first() else {
            return emit(self);
        };
        let iterable = self.eval_expr(&gen.iter)?;
        for item in crate::eval::call::iterate(self, &iterable, gen.range())? {
            self.bind_target(&gen.target, item)?;
            let mut keep = true;
            for cond in &gen.ifs {
                if !self.eval_expr(cond)?.is_truthy() {
                    keep = false;
                    break;
                }
            }
            if keep {
                self.run_comprehension_rec(rest, emit)?;
            }
        }
        Ok(())
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::LtE => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtE => ">=",
        _ => "?",
    }
}

fn number_to_value(n: &Number) -> Value {
    match n {
        Number::Int(i) => Value::Int(i.as_i64().unwrap_or(i64::MAX)),
        Number::Float(f) => Value::Float(*f),
        Number::Complex { .. } => Value::None,
    }
}

/// Structural equality across value kinds, matching Python's `==`.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::Bool(x), Value::Int(y)) | (Value::Int(y), Value::Bool(x)) => i64::from(*x) == *y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let x = x.borrow();
            let y = y.borrow();
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Tuple(x), Value::Tuple(y)) | (Value::PrintTuple(x), Value::PrintTuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Set(x), Value::Set(y)) => *x.borrow() == *y.borrow(),
        (Value::Mapping(x), Value::Mapping(y)) => {
            let x = x.borrow();
            let y = y.borrow();
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|v2| values_equal(v, v2)))
        }
        _ => identical(a, b),
    }
}

/// `is`/`is not`: reference identity for containers/objects, value equality
/// for immutable scalars (matching CPython's small-int/string interning
/// closely enough for sandboxed programs, which never rely on identity of
/// equal scalars).
#[must_use]
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || x == y,
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
        (Value::Mapping(x), Value::Mapping(y)) => Rc::ptr_eq(x, y),
        (Value::UserInstance(x), Value::UserInstance(y)) => Rc::ptr_eq(x, y),
        (Value::DataObject(x), Value::DataObject(y)) => Rc::ptr_eq(x, y),
        (Value::HostInstance(x), Value::HostInstance(y)) => Rc::ptr_eq(x, y),
        (Value::UserFunction(x), Value::UserFunction(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

pub(crate) fn compare_ordered(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.partial_cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            let x = x.borrow();
            let y = y.borrow();
            x.iter().zip(y.iter()).find_map(|(a, b)| compare_ordered(a, b).filter(|o| !o.is_eq())).or_else(|| {
                x.len().partial_cmp(&y.len())
            })
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.iter().zip(y.iter()).find_map(|(a, b)| compare_ordered(a, b).filter(|o| !o.is_eq())).or_else(|| {
                x.len().partial_cmp(&y.len())
            })
        }
        _ => None,
    }
}

fn normalize_index(index: &Value, len: usize, ev: &Evaluator, range: ruff_text_size::TextRange) -> EvalResult<usize> {
    let Value::Int(i) = index else {
        return type_error_at(ev, range, format!("indices must be integers, not '{}'", index.type_name()));
    };
    let i = if *i < 0 { *i + len as i64 } else { *i };
    if i < 0 { Ok(usize::MAX) } else { Ok(i as usize) }
}

fn slice_bounds(
    ev: &Evaluator,
    lower: &Option<Box<Expr>>,
    upper: &Option<Box<Expr>>,
    len: usize,
    step: i64,
    range: ruff_text_size::TextRange,
) -> EvalResult<(usize, usize)> {
    let resolve = |e: &Option<Box<Expr>>, default: i64| -> EvalResult<i64> {
        match e {
            Some(e) => match ev.eval_expr(e)? {
                Value::Int(i) => Ok(i),
                _ => type_error_at(ev, range, "slice indices must be integers"),
            },
            None => Ok(default),
        }
    };
    let len_i = len as i64;
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { (i + len_i).max(0) } else { i.min(len_i) };
        i as usize
    };
    if step > 0 {
        let start = clamp(resolve(lower, 0)?);
        let stop = clamp(resolve(upper, len_i)?);
        Ok((start, stop.max(start)))
    } else {
        let start = clamp(resolve(lower, len_i - 1)?.min(len_i - 1).max(-1));
        let stop = resolve(upper, -1)?;
        let stop = if stop < 0 && upper.is_none() { 0usize.wrapping_sub(1) } else { clamp(stop) };
        Ok((start, stop))
    }
}

/// Reads `target = value` onto a single name, tuple, subscript, or
/// attribute target — shared by assignment statements, `for` loops, and
/// comprehension generator targets.
impl Evaluator<'_> {
    pub(crate) fn bind_target(&self, target: &Expr, value: Value) -> EvalResult<()> {
        match target {
            Expr::Name(ast::ExprName { id, .. }) => {
                self.state.borrow_mut().set(id.as_str(), value);
                Ok(())
            }
            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
                let items = self.unpack(&value, elts.len(), target.range())?;
                for (target, value) in elts.iter().zip(items) {
                    self.bind_target(target, value)?;
                }
                Ok(())
            }
            Expr::Subscript(sub) => {
                let receiver = self.eval_expr(&sub.value)?;
                let index = self.eval_expr(&sub.slice)?;
                self.subscript_set(&receiver, &index, value, sub.range())
            }
            Expr::Attribute(attr) => {
                let receiver = self.eval_expr(&attr.value)?;
                crate::eval::call::set_attr(self, &receiver, attr.attr.as_str(), value, attr.range())
            }
            other => Err(EvalError::new(format!("unsupported assignment target: {other:?}")).at(target.range()).into()),
        }
    }

    fn unpack(&self, value: &Value, expected: usize, range: ruff_text_size::TextRange) -> EvalResult<Vec<Value>> {
        let items: Vec<Value> = match value {
            Value::List(l) => l.borrow().clone(),
            Value::Tuple(t) | Value::PrintTuple(t) => t.as_ref().clone(),
            Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            _ => return type_error_at(self, range, format!("cannot unpack non-iterable {} object", value.type_name())),
        };
        if items.len() != expected {
            return Err(self.tic_err(
                TicError::value_error(format!("too many values to unpack (expected {expected})")),
                range,
            ));
        }
        Ok(items)
    }

    pub(crate) fn subscript_set(
        &self,
        receiver: &Value,
        index: &Value,
        value: Value,
        range: ruff_text_size::TextRange,
    ) -> EvalResult<()> {
        match receiver {
            Value::List(l) => {
                let mut items = l.borrow_mut();
                let i = normalize_index(index, items.len(), self, range)?;
                match items.get_mut(i) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(self.tic_err(TicError::index_error("list assignment index out of range"), range)),
                }
            }
            Value::Mapping(m) => {
                let key = self.require_key(index.clone(), range)?;
                m.borrow_mut().insert(key, value);
                Ok(())
            }
            _ => type_error_at(self, range, format!("'{}' object does not support item assignment", receiver.type_name())),
        }
    }

    /// `del receiver[index]`.
    pub(crate) fn subscript_remove(&self, receiver: &Value, index: &Value, range: ruff_text_size::TextRange) -> EvalResult<()> {
        match receiver {
            Value::List(l) => {
                let mut items = l.borrow_mut();
                let i = normalize_index(index, items.len(), self, range)?;
                if i >= items.len() {
                    return Err(self.tic_err(TicError::index_error("list assignment index out of range"), range));
                }
                items.remove(i);
                Ok(())
            }
            Value::Mapping(m) => {
                let key = self.require_key(index.clone(), range)?;
                match m.borrow_mut().shift_remove(&key) {
                    Some(_) => Ok(()),
                    None => Err(self.tic_err(TicError::key_error(format!("{}", crate::eval::format::repr(index))), range)),
                }
            }
            _ => type_error_at(self, range, format!("'{}' object doesn't support item deletion", receiver.type_name())),
        }
    }
}

pub(crate) fn segment(source: &str, range: ruff_text_size::TextRange) -> Option<String> {
    source.get(usize::from(range.start())..usize::from(range.end())).map(str::to_string)
}

pub fn eval_expr(ev: &Evaluator, expr: &Expr) -> EvalResult<Value> {
    ev.eval_expr(expr)
}
