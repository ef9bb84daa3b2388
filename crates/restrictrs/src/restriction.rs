//! The restriction pass.
//!
//! [`RestrictionMutator`] walks a parsed tree once, rejecting identifiers and
//! constructs that untrusted code may not use and rewriting attribute access,
//! subscripts, iteration, star calls and `print` into calls to the guard
//! helpers bound in the execution namespace. Violations are collected, never
//! raised, so one pass reports all of them.

use std::collections::BTreeSet;

use crate::ast::{
    BoolOp, Constant, Expr, ExprContext, ExprKind, Expression, Module, Stmt, StmtKind,
};
use crate::diagnostic::{Loc, Span};
use crate::walker::{Transformer, Visited, walk_body, walk_expr, walk_parameters, walk_stmt};

/// Guarded attribute read: `_getattr_(obj, name)`.
pub const GETATTR: &str = "_getattr_";
/// Guarded item read: `_getitem_(obj, key)`.
pub const GETITEM: &str = "_getitem_";
/// Wraps the object of an attribute or item write.
pub const WRITE: &str = "_write_";
/// Wraps the iterable of every loop and comprehension.
pub const GETITER: &str = "_getiter_";
/// Receives calls that use `*args` or `**kwargs`.
pub const APPLY: &str = "_apply_";
/// Factory for the print collector bound at the top of a printing scope.
pub const PRINT_FACTORY: &str = "_print_";
/// Local holding the current scope's print collector.
pub const PRINT_TARGET: &str = "_print";
/// Pseudo-variable that reads back everything the scope printed.
pub const PRINTED: &str = "printed";

const EXEC_NOT_ALLOWED: &str = "Exec statements are not allowed.";
const YIELD_NOT_ALLOWED: &str = "Yield statements are not allowed.";
const AUG_ATTR_NOT_ALLOWED: &str = "Augmented assignment of attributes is not allowed.";
const AUG_ITEM_NOT_ALLOWED: &str =
    "Augmented assignment of object items and slices is not allowed.";

/// Print bookkeeping for one function (or module) scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuncInfo {
    pub print_used: bool,
    pub printed_used: bool,
}

/// Restriction state for a single compile.
#[derive(Debug, Default)]
pub struct RestrictionMutator {
    pub errors: Vec<String>,
    /// Source span of each entry in `errors`, when the node had one.
    pub spans: Vec<Option<Span>>,
    pub warnings: Vec<String>,
    /// Plain names the code reads, excluding `printed`.
    pub used_names: BTreeSet<String>,
    funcinfo: FuncInfo,
}

impl RestrictionMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict a whole program in place.
    pub fn restrict_module(&mut self, module: &mut Module) {
        self.visit_module(module);
    }

    /// Restrict an `eval`-mode expression in place.
    pub fn restrict_expression(&mut self, expression: &mut Expression) {
        self.visit_expr(&mut expression.body);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn error(&mut self, loc: Option<Loc>, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.spans.push(loc.map(|loc| loc.span));
        match loc {
            Some(loc) => self.errors.push(format!("Line {}: {}", loc.line, message)),
            None => self.errors.push(message.to_string()),
        }
    }

    /// Validate a variable name. Returns `false` if any rule rejected it.
    fn check_name(&mut self, loc: Option<Loc>, name: &str) -> bool {
        let before = self.errors.len();
        if name.len() > 1 && name.starts_with('_') {
            self.error(
                loc,
                format!(
                    "\"{}\" is an invalid variable name because it starts with \"_\"",
                    name
                ),
            );
        }
        if name.ends_with("__roles__") {
            self.error(
                loc,
                format!(
                    "\"{}\" is an invalid variable name because it ends with \"__roles__\".",
                    name
                ),
            );
        }
        if name == PRINTED {
            self.error(loc, "\"printed\" is a reserved name.");
        }
        self.errors.len() == before
    }

    fn check_attr_name(&mut self, loc: Option<Loc>, name: &str) {
        if name.len() > 1 && name.starts_with('_') {
            self.error(
                loc,
                format!(
                    "\"{}\" is an invalid attribute name because it starts with \"_\".",
                    name
                ),
            );
        }
        if name.ends_with("__roles__") {
            self.error(
                loc,
                format!(
                    "\"{}\" is an invalid attribute name because it ends with \"__roles__\".",
                    name
                ),
            );
        }
    }

    /// Bind the print collector at the top of `body` if the scope printed
    /// or read `printed`, and warn about one-sided use.
    fn prep_body(&mut self, body: &mut Vec<Stmt>) {
        let info = self.funcinfo;
        if !info.print_used && !info.printed_used {
            return;
        }
        body.insert(0, print_target_prep());
        if !info.printed_used {
            self.warnings
                .push("Prints, but never reads 'printed' variable.".to_string());
        } else if !info.print_used {
            self.warnings
                .push("Doesn't print, but reads 'printed' variable.".to_string());
        }
    }

    fn visit_function(&mut self, stmt: &mut Stmt) {
        let loc = stmt.loc;
        let StmtKind::FunctionDef(def) = &mut stmt.kind else {
            return;
        };
        self.check_name(loc, &def.name);
        for name in def.params.names() {
            self.check_name(loc, name);
        }
        // Defaults are evaluated in the enclosing scope.
        walk_parameters(self, &mut def.params);

        let outer = std::mem::take(&mut self.funcinfo);
        walk_body(self, &mut def.body);
        self.prep_body(&mut def.body);
        self.funcinfo = outer;
    }

    fn visit_print(&mut self, stmt: &mut Stmt) {
        walk_stmt(self, stmt);
        self.funcinfo.print_used = true;
        let StmtKind::Print { dest, .. } = &mut stmt.kind else {
            return;
        };
        *dest = Some(match dest.take() {
            None => Expr::name(PRINT_TARGET),
            Some(target) => {
                let loc = target.loc;
                let check = Expr::call(
                    Expr::name(GETATTR),
                    vec![target.clone(), Expr::str("write")],
                    loc,
                );
                Expr::new(
                    ExprKind::BoolOp {
                        op: BoolOp::And,
                        values: vec![check, target],
                    },
                    loc,
                )
            }
        });
    }

    fn visit_aug_assign(&mut self, stmt: &mut Stmt) {
        let loc = stmt.loc;
        let StmtKind::AugAssign { target, value, .. } = &mut stmt.kind else {
            return;
        };
        match &mut target.kind {
            ExprKind::Attribute { value: obj, .. } => {
                self.error(loc, AUG_ATTR_NOT_ALLOWED);
                self.visit_expr(obj);
            }
            ExprKind::Subscript {
                value: obj, index, ..
            } => {
                self.error(loc, AUG_ITEM_NOT_ALLOWED);
                self.visit_expr(obj);
                self.visit_expr(index);
            }
            ExprKind::Name { id, .. } => {
                // The name is read as well as written.
                if self.check_name(target.loc, id) {
                    self.used_names.insert(id.clone());
                }
            }
            _ => self.visit_expr(target),
        }
        self.visit_expr(value);
    }

    fn visit_name(&mut self, expr: &mut Expr) {
        let loc = expr.loc;
        let ExprKind::Name { id, ctx } = &expr.kind else {
            return;
        };
        let (id, ctx) = (id.clone(), *ctx);
        match ctx {
            ExprContext::Load if id == PRINTED => {
                self.funcinfo.printed_used = true;
                *expr = Expr::call(Expr::name(PRINT_TARGET), Vec::new(), loc);
            }
            ExprContext::Load => {
                if self.check_name(loc, &id) {
                    self.used_names.insert(id);
                }
            }
            ExprContext::Store | ExprContext::Del => {
                self.check_name(loc, &id);
            }
        }
    }

    fn visit_attribute(&mut self, expr: &mut Expr) {
        let loc = expr.loc;
        let ExprKind::Attribute { value, attr, ctx } = &mut expr.kind else {
            return;
        };
        let ctx = *ctx;
        self.check_attr_name(loc, attr);
        self.visit_expr(value);
        match ctx {
            ExprContext::Load => {
                let args = vec![value.take(), Expr::str(attr.clone())];
                *expr = Expr::call(Expr::name(GETATTR), args, loc);
            }
            ExprContext::Store | ExprContext::Del => wrap_in_write(value),
        }
    }

    fn visit_subscript(&mut self, expr: &mut Expr) {
        let loc = expr.loc;
        let ExprKind::Subscript { value, index, ctx } = &mut expr.kind else {
            return;
        };
        let ctx = *ctx;
        self.visit_expr(value);
        self.visit_expr(index);
        fill_slice_bounds(index);
        match ctx {
            ExprContext::Load => {
                let args = vec![value.take(), index.take()];
                *expr = Expr::call(Expr::name(GETITEM), args, loc);
            }
            ExprContext::Store | ExprContext::Del => wrap_in_write(value),
        }
    }

    fn visit_call(&mut self, expr: &mut Expr) {
        walk_expr(self, expr);
        let ExprKind::Call {
            func,
            args,
            keywords,
        } = &mut expr.kind
        else {
            return;
        };
        let starred = args.iter().any(|a| matches!(a.kind, ExprKind::Starred(_)))
            || keywords.iter().any(|k| k.arg.is_none());
        if starred {
            let loc = func.loc;
            args.insert(0, func.take());
            **func = Expr::new(
                ExprKind::Name {
                    id: APPLY.to_string(),
                    ctx: ExprContext::Load,
                },
                loc,
            );
        }
    }

    fn visit_lambda(&mut self, expr: &mut Expr) {
        let loc = expr.loc;
        if let ExprKind::Lambda { params, .. } = &expr.kind {
            let names: Vec<String> = params.names().map(str::to_string).collect();
            for name in &names {
                self.check_name(loc, name);
            }
        }
        walk_expr(self, expr);
    }

    fn visit_comprehension(&mut self, expr: &mut Expr) {
        walk_expr(self, expr);
        if let ExprKind::ListComp { generators, .. }
        | ExprKind::GeneratorExp { generators, .. }
        | ExprKind::DictComp { generators, .. } = &mut expr.kind
        {
            for comp in generators {
                guard_iter(&mut comp.iter);
            }
        }
    }
}

impl Transformer for RestrictionMutator {
    fn visit_module(&mut self, module: &mut Module) {
        self.funcinfo = FuncInfo::default();
        walk_body(self, &mut module.body);
        self.prep_body(&mut module.body);
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> Visited {
        match &mut stmt.kind {
            StmtKind::FunctionDef(_) => self.visit_function(stmt),
            StmtKind::Print { .. } => self.visit_print(stmt),
            StmtKind::AugAssign { .. } => self.visit_aug_assign(stmt),
            StmtKind::Exec { .. } => self.error(stmt.loc, EXEC_NOT_ALLOWED),
            StmtKind::ClassDef { name, .. } => {
                let name = name.clone();
                self.check_name(stmt.loc, &name);
                walk_stmt(self, stmt);
            }
            StmtKind::Import(names) | StmtKind::ImportFrom { names, .. } => {
                let bound: Vec<String> = names
                    .iter()
                    .flat_map(|alias| std::iter::once(alias.name.clone()).chain(alias.asname.clone()))
                    .collect();
                for name in &bound {
                    self.check_name(stmt.loc, name);
                }
            }
            StmtKind::Try { handlers, .. } => {
                let bound: Vec<(Option<Loc>, String)> = handlers
                    .iter()
                    .filter_map(|h| h.name.clone().map(|n| (h.loc, n)))
                    .collect();
                for (loc, name) in &bound {
                    self.check_name(*loc, name);
                }
                walk_stmt(self, stmt);
            }
            StmtKind::For { .. } => {
                walk_stmt(self, stmt);
                if let StmtKind::For { iter, .. } = &mut stmt.kind {
                    guard_iter(iter);
                }
            }
            _ => walk_stmt(self, stmt),
        }
        Visited::Keep
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        match expr.kind {
            ExprKind::Name { .. } => self.visit_name(expr),
            ExprKind::Attribute { .. } => self.visit_attribute(expr),
            ExprKind::Subscript { .. } => self.visit_subscript(expr),
            ExprKind::Call { .. } => self.visit_call(expr),
            ExprKind::Lambda { .. } => self.visit_lambda(expr),
            ExprKind::ListComp { .. } | ExprKind::GeneratorExp { .. } | ExprKind::DictComp { .. } => {
                self.visit_comprehension(expr)
            }
            ExprKind::Yield(_) => self.error(expr.loc, YIELD_NOT_ALLOWED),
            _ => walk_expr(self, expr),
        }
    }
}

/// `_print = _print_()`
fn print_target_prep() -> Stmt {
    let target = Expr::new(
        ExprKind::Name {
            id: PRINT_TARGET.to_string(),
            ctx: ExprContext::Store,
        },
        None,
    );
    let value = Expr::call(Expr::name(PRINT_FACTORY), Vec::new(), None);
    Stmt::new(
        StmtKind::Assign {
            targets: vec![target],
            value,
        },
        None,
    )
}

fn guard_iter(iter: &mut Expr) {
    let loc = iter.loc;
    let inner = iter.take();
    *iter = Expr::call(Expr::name(GETITER), vec![inner], loc);
}

fn wrap_in_write(obj: &mut Expr) {
    let loc = obj.loc;
    let inner = obj.take();
    *obj = Expr::call(Expr::name(WRITE), vec![inner], loc);
}

/// Give every slice in a subscript key explicit `None` bounds, so the
/// guarded getitem always receives a complete slice object.
fn fill_slice_bounds(index: &mut Expr) {
    match &mut index.kind {
        ExprKind::Slice { lower, upper, step } => {
            for bound in [lower, upper, step] {
                if bound.is_none() {
                    *bound = Some(Box::new(Expr::constant(Constant::None)));
                }
            }
        }
        ExprKind::Tuple { elts, .. } => elts.iter_mut().for_each(fill_slice_bounds),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression, parse_module};
    use pretty_assertions::assert_eq;

    fn restrict(source: &str) -> (Module, RestrictionMutator) {
        let mut module = parse_module(source, "<test>").unwrap();
        let mut mutator = RestrictionMutator::new();
        mutator.restrict_module(&mut module);
        (module, mutator)
    }

    fn call_name(expr: &Expr) -> Option<&str> {
        match &expr.kind {
            ExprKind::Call { func, .. } => match &func.kind {
                ExprKind::Name { id, .. } => Some(id),
                _ => None,
            },
            _ => None,
        }
    }

    #[test]
    fn test_attribute_read_becomes_getattr() {
        let mut expr = parse_expression("a.b", "<test>").unwrap();
        let mut mutator = RestrictionMutator::new();
        mutator.restrict_expression(&mut expr);
        assert_eq!(call_name(&expr.body), Some(GETATTR));
        let ExprKind::Call { args, .. } = &expr.body.kind else {
            unreachable!()
        };
        assert_eq!(args[1].kind, ExprKind::Constant(Constant::Str("b".into())));
        assert_eq!(mutator.used_names.iter().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_slice_key_gets_none_bounds() {
        let mut expr = parse_expression("s[1:]", "<test>").unwrap();
        RestrictionMutator::new().restrict_expression(&mut expr);
        let ExprKind::Call { args, .. } = &expr.body.kind else {
            panic!("expected call");
        };
        match &args[1].kind {
            ExprKind::Slice { lower, upper, step } => {
                assert!(lower.is_some());
                assert_eq!(upper.as_ref().map(|e| &e.kind), Some(&ExprKind::Constant(Constant::None)));
                assert_eq!(step.as_ref().map(|e| &e.kind), Some(&ExprKind::Constant(Constant::None)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_store_target_wrapped_in_write() {
        let (module, mutator) = restrict("a.b[0] = 1\n");
        assert!(!mutator.has_errors());
        let StmtKind::Assign { targets, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Subscript { value, ctx, .. } = &targets[0].kind else {
            panic!("expected subscript target");
        };
        assert_eq!(*ctx, ExprContext::Store);
        assert_eq!(call_name(value), Some(WRITE));
    }

    #[test]
    fn test_print_target_injected_once_per_scope() {
        let (module, mutator) = restrict("def f():\n    print 1\n    return printed\n");
        assert!(!mutator.has_errors());
        assert!(mutator.warnings.is_empty());
        assert_eq!(module.body.len(), 1);
        let StmtKind::FunctionDef(def) = &module.body[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.body[0], print_target_prep());
        let StmtKind::Return(Some(value)) = &def.body[2].kind else {
            panic!("expected return");
        };
        assert_eq!(call_name(value), Some(PRINT_TARGET));
    }

    #[test]
    fn test_print_to_explicit_target_validates_write() {
        let (module, mutator) = restrict("print >> out, 1\n");
        assert_eq!(
            mutator.warnings,
            vec!["Prints, but never reads 'printed' variable."]
        );
        let StmtKind::Print { dest: Some(dest), .. } = &module.body[1].kind else {
            panic!("expected print");
        };
        let ExprKind::BoolOp { op, values } = &dest.kind else {
            panic!("expected and");
        };
        assert_eq!(*op, BoolOp::And);
        assert_eq!(call_name(&values[0]), Some(GETATTR));
    }

    #[test]
    fn test_star_call_goes_through_apply() {
        let (module, _) = restrict("f(*args, **kw)\n");
        let StmtKind::Expr(expr) = &module.body[0].kind else {
            panic!("expected expression");
        };
        assert_eq!(call_name(expr), Some(APPLY));
        let ExprKind::Call { args, .. } = &expr.kind else {
            unreachable!()
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_all_violations_collected() {
        let (_, mutator) = restrict("_a = 1\nx._b = 2\nexec 'y'\ndef _f(_p): yield 1\n");
        assert_eq!(
            mutator.errors,
            vec![
                "Line 1: \"_a\" is an invalid variable name because it starts with \"_\"",
                "Line 2: \"_b\" is an invalid attribute name because it starts with \"_\".",
                "Line 3: Exec statements are not allowed.",
                "Line 4: \"_f\" is an invalid variable name because it starts with \"_\"",
                "Line 4: \"_p\" is an invalid variable name because it starts with \"_\"",
                "Line 4: Yield statements are not allowed.",
            ]
        );
    }

    #[test]
    fn test_single_underscore_and_roles() {
        let (_, mutator) = restrict("_ = 1\nx__roles__ = 2\nprinted = 3\n");
        assert_eq!(
            mutator.errors,
            vec![
                "Line 2: \"x__roles__\" is an invalid variable name because it ends with \"__roles__\".",
                "Line 3: \"printed\" is a reserved name.",
            ]
        );
    }
}
