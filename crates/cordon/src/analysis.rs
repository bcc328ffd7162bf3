//! Free-variable analysis: a static pre-pass over a function or lambda body
//! that determines which names it reads without binding locally, so a
//! closure can be restricted to exactly that set.
//!
//! Grounded statement-for-statement on
//! `examples/original_source/tic/eval/analysis.py`'s `FreeVariableAnalyzer`.

use indexmap::IndexSet;
use ruff_python_ast::{self as ast, Expr, ExprContext, Parameters, Stmt};

#[derive(Default)]
struct Analyzer {
    bound: IndexSet<String>,
    loaded: IndexSet<String>,
    globals: IndexSet<String>,
}

impl Analyzer {
    fn bind_params(&mut self, params: &Parameters) {
        for p in params.posonlyargs.iter().chain(params.args.iter()) {
            self.bound.insert(p.parameter.name.id.to_string());
        }
        for p in &params.kwonlyargs {
            self.bound.insert(p.parameter.name.id.to_string());
        }
        if let Some(vararg) = &params.vararg {
            self.bound.insert(vararg.name.id.to_string());
        }
        if let Some(kwarg) = &params.kwarg {
            self.bound.insert(kwarg.name.id.to_string());
        }
    }

    fn free(&self) -> IndexSet<String> {
        self.loaded.iter().filter(|n| !self.bound.contains(*n) && !self.globals.contains(*n)).cloned().collect()
    }

    fn visit_name(&mut self, id: &str, ctx: ExprContext) {
        if self.globals.contains(id) {
            return;
        }
        match ctx {
            ExprContext::Load => {
                if !self.bound.contains(id) {
                    self.loaded.insert(id.to_string());
                }
            }
            ExprContext::Store => {
                self.bound.insert(id.to_string());
            }
            ExprContext::Del | ExprContext::Invalid => {}
        }
    }

    fn adopt_nested_free_vars(&mut self, free: IndexSet<String>) {
        for var in free {
            if !self.bound.contains(&var) {
                self.loaded.insert(var);
            }
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => {
                self.bound.insert(def.name.id.to_string());
                let nested = free_variables_of(&def.parameters, &def.body);
                self.adopt_nested_free_vars(nested);
                for decorator in &def.decorator_list {
                    self.visit_expr(&decorator.expression);
                }
            }
            Stmt::ClassDef(def) => {
                self.bound.insert(def.name.id.to_string());
            }
            Stmt::Return(ast::StmtReturn { value, .. }) => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            Stmt::Delete(ast::StmtDelete { targets, .. }) => {
                for t in targets {
                    self.visit_expr(t);
                }
            }
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                self.visit_expr(value);
                for t in targets {
                    self.visit_expr(t);
                }
            }
            Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
                self.visit_expr(target);
                self.visit_expr(value);
            }
            Stmt::AnnAssign(ast::StmtAnnAssign { target, value, .. }) => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
                self.visit_expr(target);
            }
            Stmt::For(ast::StmtFor { target, iter, body, orelse, .. }) => {
                self.visit_expr(iter);
                self.visit_expr(target);
                for s in body.iter().chain(orelse.iter()) {
                    self.visit_stmt(s);
                }
            }
            Stmt::While(ast::StmtWhile { test, body, orelse, .. }) => {
                self.visit_expr(test);
                for s in body.iter().chain(orelse.iter()) {
                    self.visit_stmt(s);
                }
            }
            Stmt::If(ast::StmtIf { test, body, elif_else_clauses, .. }) => {
                self.visit_expr(test);
                for s in body {
                    self.visit_stmt(s);
                }
                for clause in elif_else_clauses {
                    if let Some(test) = &clause.test {
                        self.visit_expr(test);
                    }
                    for s in &clause.body {
                        self.visit_stmt(s);
                    }
                }
            }
            Stmt::Try(ast::StmtTry { body, handlers, orelse, finalbody, .. }) => {
                for s in body.iter().chain(orelse.iter()).chain(finalbody.iter()) {
                    self.visit_stmt(s);
                }
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    if let Some(name) = &h.name {
                        self.bound.insert(name.id.to_string());
                    }
                    if let Some(ty) = &h.type_ {
                        self.visit_expr(ty);
                    }
                    for s in &h.body {
                        self.visit_stmt(s);
                    }
                }
            }
            Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                if let Some(exc) = exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = cause {
                    self.visit_expr(cause);
                }
            }
            Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
                self.visit_expr(test);
                if let Some(msg) = msg {
                    self.visit_expr(msg);
                }
            }
            Stmt::Import(_) | Stmt::ImportFrom(_) => {}
            Stmt::Global(ast::StmtGlobal { names, .. }) => {
                for n in names {
                    self.globals.insert(n.id.to_string());
                }
            }
            Stmt::Nonlocal(ast::StmtNonlocal { names, .. }) => {
                // Treated like `global`: the name is resolved outside this
                // function's own bindings, so it is never a free variable.
                for n in names {
                    self.globals.insert(n.id.to_string());
                }
            }
            Stmt::Expr(ast::StmtExpr { value, .. }) => self.visit_expr(value),
            Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(ast::ExprName { id, ctx, .. }) => self.visit_name(id, *ctx),
            Expr::Lambda(lambda) => {
                let params = lambda.parameters.as_deref().cloned().unwrap_or_default();
                let body = vec![Stmt::Return(ast::StmtReturn {
                    value: Some(lambda.body.clone()),
                    range: lambda.range,
                    node_index: ast::AtomicNodeIndex::default(),
                })];
                let nested = free_variables_of(&params, &body);
                self.adopt_nested_free_vars(nested);
            }
            Expr::BoolOp(ast::ExprBoolOp { values, .. }) => values.iter().for_each(|v| self.visit_expr(v)),
            Expr::BinOp(ast::ExprBinOp { left, right, .. }) => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            Expr::UnaryOp(ast::ExprUnaryOp { operand, .. }) => self.visit_expr(operand),
            Expr::Compare(ast::ExprCompare { left, comparators, .. }) => {
                self.visit_expr(left);
                comparators.iter().for_each(|c| self.visit_expr(c));
            }
            Expr::Call(ast::ExprCall { func, arguments, .. }) => {
                self.visit_expr(func);
                arguments.args.iter().for_each(|a| self.visit_expr(a));
                arguments.keywords.iter().for_each(|k| self.visit_expr(&k.value));
            }
            Expr::Attribute(ast::ExprAttribute { value, .. }) => self.visit_expr(value),
            Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                self.visit_expr(value);
                self.visit_expr(slice);
            }
            Expr::Slice(ast::ExprSlice { lower, upper, step, .. }) => {
                for e in [lower, upper, step].into_iter().flatten() {
                    self.visit_expr(e);
                }
            }
            Expr::Starred(ast::ExprStarred { value, .. }) => self.visit_expr(value),
            Expr::List(ast::ExprList { elts, .. })
            | Expr::Tuple(ast::ExprTuple { elts, .. })
            | Expr::Set(ast::ExprSet { elts, .. }) => elts.iter().for_each(|e| self.visit_expr(e)),
            Expr::Dict(dict) => {
                for item in &dict.items {
                    if let Some(key) = &item.key {
                        self.visit_expr(key);
                    }
                    self.visit_expr(&item.value);
                }
            }
            Expr::If(ast::ExprIf { test, body, orelse, .. }) => {
                self.visit_expr(test);
                self.visit_expr(body);
                self.visit_expr(orelse);
            }
            Expr::FString(fstring) => {
                for part in fstring.value.elements() {
                    if let ast::InterpolatedStringElement::Interpolation(expr_elem) = part {
                        self.visit_expr(&expr_elem.expression);
                    }
                }
            }
            Expr::ListComp(comp) => self.visit_comprehension(&comp.elt, None, &comp.generators),
            Expr::SetComp(comp) => self.visit_comprehension(&comp.elt, None, &comp.generators),
            Expr::DictComp(comp) => self.visit_comprehension(&comp.key, Some(&comp.value), &comp.generators),
            Expr::Generator(comp) => self.visit_comprehension(&comp.elt, None, &comp.generators),
            _ => {}
        }
    }

    /// Comprehensions introduce their own scope in CPython 3; this crate's
    /// analyzer treats the loop targets as bound for the remainder of the
    /// enclosing function, which is a conservative (slightly wider) free-set
    /// than CPython's but never under-captures a variable the evaluator
    /// needs.
    fn visit_comprehension(&mut self, elt: &Expr, value: Option<&Expr>, generators: &[ast::Comprehension]) {
        for gen in generators {
            self.visit_expr(&gen.iter);
            self.visit_expr(&gen.target);
            for cond in &gen.ifs {
                self.visit_expr(cond);
            }
        }
        self.visit_expr(elt);
        if let Some(value) = value {
            self.visit_expr(value);
        }
    }
}

/// `get_free_variables` — the free-variable set of a function/lambda body
/// given its parameters, as a deterministically ordered set (insertion
/// order of first load) so closure materialization order is stable.
#[must_use]
pub fn free_variables_of(params: &Parameters, body: &[Stmt]) -> IndexSet<String> {
    let mut analyzer = Analyzer::default();
    analyzer.bind_params(params);
    for stmt in body {
        analyzer.visit_stmt(stmt);
    }
    analyzer.free()
}
