//! Syntax tree for the restricted Python dialect.
//!
//! Statements and expressions are a location plus a kind enum. The
//! restriction pass rewrites trees in place, so every child is owned and
//! mutable; nodes it synthesizes either inherit the location of the node
//! they replace or carry none.

use crate::bytecode::{BinOp, CmpOp, UnaryOp};
use crate::diagnostic::Loc;

/// A literal value. Shared between the syntax tree and the bytecode
/// constant pool.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Constant>),
}

/// Whether a name, attribute or subscript is read, written or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprContext {
    Load,
    Store,
    Del,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// A parsed `eval`-mode input: a single expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    Delete(Vec<Expr>),
    /// `print >> dest, a, b,` in its Python 2 form. A trailing comma
    /// clears `newline`.
    Print {
        dest: Option<Expr>,
        values: Vec<Expr>,
        newline: bool,
    },
    Exec {
        body: Expr,
        globals: Option<Expr>,
        locals: Option<Expr>,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
    Return(Option<Expr>),
    FunctionDef(FunctionDef),
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Import(Vec<Alias>),
    ImportFrom {
        module: String,
        names: Vec<Alias>,
    },
    Global(Vec<String>),
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    /// `raise`, `raise E`, `raise E(msg)` or the Python 2 `raise E, msg`.
    Raise {
        exc: Option<Expr>,
        msg: Option<Expr>,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Parameters,
    pub body: Vec<Stmt>,
    /// Leading string literal of the body, removed from `body`.
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    pub args: Vec<Param>,
    pub vararg: Option<String>,
    pub kwarg: Option<String>,
}

impl Parameters {
    /// Every name the parameter list binds, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.vararg.as_deref())
            .chain(self.kwarg.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    /// Dotted module name for `import`, member name for `from ... import`.
    pub name: String,
    pub asname: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// `None` for a bare `except:`.
    pub type_: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    Name {
        id: String,
        ctx: ExprContext,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
        ctx: ExprContext,
    },
    Subscript {
        value: Box<Expr>,
        /// The key: a plain expression, a `Tuple` for `a[x, y]` or a `Slice`.
        index: Box<Expr>,
        ctx: ExprContext,
    },
    /// Only valid as a subscript index.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Tuple {
        elts: Vec<Expr>,
        ctx: ExprContext,
    },
    List {
        elts: Vec<Expr>,
        ctx: ExprContext,
    },
    Dict {
        keys: Vec<Expr>,
        values: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        /// Positional arguments; `*xs` appears as `Starred`.
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    /// `*value` in a call's positional arguments.
    Starred(Box<Expr>),
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Parameters,
        body: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Yield(Option<Box<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

/// A keyword argument; `arg` is `None` for `**kwargs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub arg: Option<String>,
    pub value: Expr,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: Option<Loc>) -> Self {
        Self { kind, loc }
    }

    /// 1-based source line, if known.
    pub fn line(&self) -> Option<u32> {
        self.loc.map(|l| l.line)
    }
}

impl Expr {
    pub fn new(kind: ExprKind, loc: Option<Loc>) -> Self {
        Self { kind, loc }
    }

    pub fn line(&self) -> Option<u32> {
        self.loc.map(|l| l.line)
    }

    /// A `Load` reference to `id` with no source location.
    pub fn name(id: impl Into<String>) -> Self {
        Expr::new(
            ExprKind::Name {
                id: id.into(),
                ctx: ExprContext::Load,
            },
            None,
        )
    }

    pub fn constant(value: Constant) -> Self {
        Expr::new(ExprKind::Constant(value), None)
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::constant(Constant::Str(value.into()))
    }

    /// `func(args...)` with no keywords.
    pub fn call(func: Expr, args: Vec<Expr>, loc: Option<Loc>) -> Self {
        Expr::new(
            ExprKind::Call {
                func: Box::new(func),
                args,
                keywords: Vec::new(),
            },
            loc,
        )
    }

    /// Move the expression out, leaving a `None` constant behind.
    pub fn take(&mut self) -> Expr {
        std::mem::replace(self, Expr::constant(Constant::None))
    }

    /// Set the store/delete context on an assignment target, recursing into
    /// tuple and list targets. Returns `false` for expressions that cannot
    /// be assigned to.
    pub fn set_context(&mut self, new_ctx: ExprContext) -> bool {
        match &mut self.kind {
            ExprKind::Name { ctx, .. }
            | ExprKind::Attribute { ctx, .. }
            | ExprKind::Subscript { ctx, .. } => {
                *ctx = new_ctx;
                true
            }
            ExprKind::Tuple { elts, ctx } | ExprKind::List { elts, ctx } => {
                *ctx = new_ctx;
                elts.iter_mut().all(|e| e.set_context(new_ctx))
            }
            _ => false,
        }
    }
}

/// A borrowed statement or expression, for walking a tree without
/// recursion.
#[derive(Debug, Clone, Copy)]
enum Node<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

impl<'a> Node<'a> {
    fn loc(self) -> Option<Loc> {
        match self {
            Node::Stmt(stmt) => stmt.loc,
            Node::Expr(expr) => expr.loc,
        }
    }

    fn push_children(self, out: &mut Vec<Node<'a>>) {
        match self {
            Node::Stmt(stmt) => push_stmt_children(stmt, out),
            Node::Expr(expr) => push_expr_children(expr, out),
        }
    }
}

fn push_stmt_children<'a>(stmt: &'a Stmt, out: &mut Vec<Node<'a>>) {
    let exprs = |out: &mut Vec<Node<'a>>, items: &'a [Expr]| {
        out.extend(items.iter().map(Node::Expr));
    };
    let stmts = |out: &mut Vec<Node<'a>>, items: &'a [Stmt]| {
        out.extend(items.iter().map(Node::Stmt));
    };
    match &stmt.kind {
        StmtKind::Expr(value) => out.push(Node::Expr(value)),
        StmtKind::Assign { targets, value } => {
            exprs(out, targets);
            out.push(Node::Expr(value));
        }
        StmtKind::AugAssign { target, value, .. } => {
            out.push(Node::Expr(target));
            out.push(Node::Expr(value));
        }
        StmtKind::Delete(targets) => exprs(out, targets),
        StmtKind::Print { dest, values, .. } => {
            out.extend(dest.iter().map(Node::Expr));
            exprs(out, values);
        }
        StmtKind::Exec {
            body,
            globals,
            locals,
        } => {
            out.push(Node::Expr(body));
            out.extend(globals.iter().chain(locals).map(Node::Expr));
        }
        StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
            out.push(Node::Expr(test));
            stmts(out, body);
            stmts(out, orelse);
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            out.push(Node::Expr(target));
            out.push(Node::Expr(iter));
            stmts(out, body);
            stmts(out, orelse);
        }
        StmtKind::Return(value) => out.extend(value.iter().map(Node::Expr)),
        StmtKind::FunctionDef(def) => {
            out.extend(def.params.args.iter().filter_map(|p| p.default.as_ref()).map(Node::Expr));
            stmts(out, &def.body);
        }
        StmtKind::ClassDef { bases, body, .. } => {
            exprs(out, bases);
            stmts(out, body);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            stmts(out, body);
            for handler in handlers {
                out.extend(handler.type_.iter().map(Node::Expr));
                stmts(out, &handler.body);
            }
            stmts(out, orelse);
            stmts(out, finalbody);
        }
        StmtKind::Raise { exc, msg } => out.extend(exc.iter().chain(msg).map(Node::Expr)),
        StmtKind::Assert { test, msg } => {
            out.push(Node::Expr(test));
            out.extend(msg.iter().map(Node::Expr));
        }
        StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Pass
        | StmtKind::Import(_)
        | StmtKind::ImportFrom { .. }
        | StmtKind::Global(_) => {}
    }
}

fn push_expr_children<'a>(expr: &'a Expr, out: &mut Vec<Node<'a>>) {
    let generators = |out: &mut Vec<Node<'a>>, gens: &'a [Comprehension]| {
        for comp in gens {
            out.push(Node::Expr(&comp.target));
            out.push(Node::Expr(&comp.iter));
            out.extend(comp.ifs.iter().map(Node::Expr));
        }
    };
    match &expr.kind {
        ExprKind::Constant(_) | ExprKind::Name { .. } => {}
        ExprKind::Attribute { value, .. } | ExprKind::Starred(value) => {
            out.push(Node::Expr(value))
        }
        ExprKind::Subscript { value, index, .. } => {
            out.push(Node::Expr(value));
            out.push(Node::Expr(index));
        }
        ExprKind::Slice { lower, upper, step } => out.extend(
            lower
                .iter()
                .chain(upper)
                .chain(step)
                .map(|e| Node::Expr(e)),
        ),
        ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => {
            out.extend(elts.iter().map(Node::Expr))
        }
        ExprKind::Dict { keys, values } => {
            out.extend(keys.iter().chain(values).map(Node::Expr))
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            out.push(Node::Expr(func));
            out.extend(args.iter().map(Node::Expr));
            out.extend(keywords.iter().map(|k| Node::Expr(&k.value)));
        }
        ExprKind::BinOp { left, right, .. } => {
            out.push(Node::Expr(left));
            out.push(Node::Expr(right));
        }
        ExprKind::UnaryOp { operand, .. } => out.push(Node::Expr(operand)),
        ExprKind::BoolOp { values, .. } => out.extend(values.iter().map(Node::Expr)),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            out.push(Node::Expr(left));
            out.extend(comparators.iter().map(Node::Expr));
        }
        ExprKind::IfExp { test, body, orelse } => {
            out.push(Node::Expr(test));
            out.push(Node::Expr(body));
            out.push(Node::Expr(orelse));
        }
        ExprKind::Lambda { params, body } => {
            out.extend(params.args.iter().filter_map(|p| p.default.as_ref()).map(Node::Expr));
            out.push(Node::Expr(body));
        }
        ExprKind::ListComp { elt, generators: gens }
        | ExprKind::GeneratorExp { elt, generators: gens } => {
            out.push(Node::Expr(elt));
            generators(out, gens);
        }
        ExprKind::DictComp {
            key,
            value,
            generators: gens,
        } => {
            out.push(Node::Expr(key));
            out.push(Node::Expr(value));
            generators(out, gens);
        }
        ExprKind::Yield(value) => out.extend(value.iter().map(|e| Node::Expr(e))),
    }
}

/// Find a node nested more than `limit` levels below the roots.
///
/// Returns the location of the first such node (which may itself be
/// unknown), or `None` when the whole tree fits. Uses an explicit stack, so
/// it is safe on trees the recursive passes could not handle.
fn find_too_deep<'a>(roots: Vec<Node<'a>>, limit: usize) -> Option<Option<Loc>> {
    let mut stack: Vec<(Node<'a>, usize)> = roots.into_iter().map(|n| (n, 1)).collect();
    let mut children = Vec::new();
    while let Some((node, depth)) = stack.pop() {
        if depth > limit {
            return Some(node.loc());
        }
        node.push_children(&mut children);
        stack.extend(children.drain(..).map(|child| (child, depth + 1)));
    }
    None
}

impl Module {
    /// Location of a node nested more than `limit` levels deep, counting
    /// statements and expressions alike.
    pub(crate) fn too_deep(&self, limit: usize) -> Option<Option<Loc>> {
        find_too_deep(self.body.iter().map(Node::Stmt).collect(), limit)
    }
}

impl Expression {
    pub(crate) fn too_deep(&self, limit: usize) -> Option<Option<Loc>> {
        find_too_deep(vec![Node::Expr(&self.body)], limit)
    }
}
