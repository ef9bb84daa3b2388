//! Generic in-place traversal of the syntax tree.
//!
//! A [`Transformer`] overrides the hooks for the node kinds it cares about
//! and calls back into the `walk_*` functions to descend into children.
//! Expressions are rewritten through `&mut Expr`; statements report a
//! [`Visited`] outcome so a body can grow, shrink or swap entries while it
//! is being walked.

use crate::ast::{Comprehension, Expr, ExprKind, FunctionDef, Module, Parameters, Stmt, StmtKind};

/// What to do with a statement after its hook ran.
#[derive(Debug)]
pub enum Visited {
    Keep,
    Replace(Stmt),
    /// Splice these statements in place of the visited one.
    Expand(Vec<Stmt>),
    Remove,
}

pub trait Transformer {
    fn visit_module(&mut self, module: &mut Module) {
        walk_body(self, &mut module.body);
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> Visited {
        walk_stmt(self, stmt);
        Visited::Keep
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        walk_expr(self, expr);
    }
}

/// Visit every statement of `body`, applying each outcome at the same
/// position. Spliced statements are not visited again.
pub fn walk_body<T: Transformer + ?Sized>(visitor: &mut T, body: &mut Vec<Stmt>) {
    let mut idx = 0;
    while idx < body.len() {
        match visitor.visit_stmt(&mut body[idx]) {
            Visited::Keep => idx += 1,
            Visited::Replace(stmt) => {
                body[idx] = stmt;
                idx += 1;
            }
            Visited::Expand(stmts) => {
                let count = stmts.len();
                body.splice(idx..=idx, stmts);
                idx += count;
            }
            Visited::Remove => {
                body.remove(idx);
            }
        }
    }
}

/// Visit each expression of a sequence in order. Works for any backing
/// storage that can lend out a mutable slice.
pub fn walk_exprs<T: Transformer + ?Sized>(visitor: &mut T, exprs: &mut [Expr]) {
    for expr in exprs {
        visitor.visit_expr(expr);
    }
}

fn walk_opt<T: Transformer + ?Sized>(visitor: &mut T, expr: Option<&mut Expr>) {
    if let Some(expr) = expr {
        visitor.visit_expr(expr);
    }
}

/// Parameter defaults only; names are not expressions.
pub fn walk_parameters<T: Transformer + ?Sized>(visitor: &mut T, params: &mut Parameters) {
    for param in &mut params.args {
        walk_opt(visitor, param.default.as_mut());
    }
}

pub fn walk_function<T: Transformer + ?Sized>(visitor: &mut T, def: &mut FunctionDef) {
    walk_parameters(visitor, &mut def.params);
    walk_body(visitor, &mut def.body);
}

pub fn walk_comprehension<T: Transformer + ?Sized>(visitor: &mut T, comp: &mut Comprehension) {
    visitor.visit_expr(&mut comp.iter);
    visitor.visit_expr(&mut comp.target);
    walk_exprs(visitor, &mut comp.ifs);
}

/// Visit every child of `stmt`.
pub fn walk_stmt<T: Transformer + ?Sized>(visitor: &mut T, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Expr(value) => visitor.visit_expr(value),
        StmtKind::Assign { targets, value } => {
            visitor.visit_expr(value);
            walk_exprs(visitor, targets);
        }
        StmtKind::AugAssign { target, value, .. } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
        StmtKind::Delete(targets) => walk_exprs(visitor, targets),
        StmtKind::Print { dest, values, .. } => {
            walk_opt(visitor, dest.as_mut());
            walk_exprs(visitor, values);
        }
        StmtKind::Exec {
            body,
            globals,
            locals,
        } => {
            visitor.visit_expr(body);
            walk_opt(visitor, globals.as_mut());
            walk_opt(visitor, locals.as_mut());
        }
        StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
            visitor.visit_expr(test);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            visitor.visit_expr(iter);
            visitor.visit_expr(target);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::Return(value) => walk_opt(visitor, value.as_mut()),
        StmtKind::FunctionDef(def) => walk_function(visitor, def),
        StmtKind::ClassDef { bases, body, .. } => {
            walk_exprs(visitor, bases);
            walk_body(visitor, body);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            walk_body(visitor, body);
            for handler in handlers {
                walk_opt(visitor, handler.type_.as_mut());
                walk_body(visitor, &mut handler.body);
            }
            walk_body(visitor, orelse);
            walk_body(visitor, finalbody);
        }
        StmtKind::Raise { exc, msg } => {
            walk_opt(visitor, exc.as_mut());
            walk_opt(visitor, msg.as_mut());
        }
        StmtKind::Assert { test, msg } => {
            visitor.visit_expr(test);
            walk_opt(visitor, msg.as_mut());
        }
        StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Pass
        | StmtKind::Import(_)
        | StmtKind::ImportFrom { .. }
        | StmtKind::Global(_) => {}
    }
}

/// Visit every child of `expr`.
pub fn walk_expr<T: Transformer + ?Sized>(visitor: &mut T, expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Constant(_) | ExprKind::Name { .. } => {}
        ExprKind::Attribute { value, .. } => visitor.visit_expr(value),
        ExprKind::Subscript { value, index, .. } => {
            visitor.visit_expr(value);
            visitor.visit_expr(index);
        }
        ExprKind::Slice { lower, upper, step } => {
            walk_opt(visitor, lower.as_deref_mut());
            walk_opt(visitor, upper.as_deref_mut());
            walk_opt(visitor, step.as_deref_mut());
        }
        ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => walk_exprs(visitor, elts),
        ExprKind::Dict { keys, values } => {
            for (key, value) in keys.iter_mut().zip(values.iter_mut()) {
                visitor.visit_expr(key);
                visitor.visit_expr(value);
            }
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            visitor.visit_expr(func);
            walk_exprs(visitor, args);
            for keyword in keywords {
                visitor.visit_expr(&mut keyword.value);
            }
        }
        ExprKind::Starred(value) => visitor.visit_expr(value),
        ExprKind::BinOp { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        ExprKind::UnaryOp { operand, .. } => visitor.visit_expr(operand),
        ExprKind::BoolOp { values, .. } => walk_exprs(visitor, values),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            visitor.visit_expr(left);
            walk_exprs(visitor, comparators);
        }
        ExprKind::IfExp { test, body, orelse } => {
            visitor.visit_expr(test);
            visitor.visit_expr(body);
            visitor.visit_expr(orelse);
        }
        ExprKind::Lambda { params, body } => {
            walk_parameters(visitor, params);
            visitor.visit_expr(body);
        }
        ExprKind::ListComp { elt, generators } | ExprKind::GeneratorExp { elt, generators } => {
            for comp in generators {
                walk_comprehension(visitor, comp);
            }
            visitor.visit_expr(elt);
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            for comp in generators {
                walk_comprehension(visitor, comp);
            }
            visitor.visit_expr(key);
            visitor.visit_expr(value);
        }
        ExprKind::Yield(value) => walk_opt(visitor, value.as_deref_mut()),
    }
}
