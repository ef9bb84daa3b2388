//! Bytecode compiler: translates a restricted syntax tree to bytecode.
//!
//! The compiler runs after the restriction pass and trusts its output: every
//! attribute and item read has already become a guard call and every print
//! statement has a target. Anything the restriction pass should have
//! removed is refused with [`Error::Unsupported`] instead of being compiled
//! unguarded.
//!
//! It walks the tree once and produces a [`CodeObject`]. Jump targets use a
//! placeholder/patch approach: jumps are emitted with a dummy target of `0`
//! and patched in place once the real target is known.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{
    self, BoolOp, Comprehension, Constant, Expr, ExprContext, ExprKind, Keyword, Module, Stmt,
    StmtKind,
};
use crate::bytecode::{CmpOp, CodeObject, ExceptionEntry, FunctionCode, Op};
use crate::diagnostic::{Loc, Span};
use crate::error::{Error, Result};
use crate::lexer::syntax_error;
use crate::restricted::Mode;

/// Compiler state for tracking loops (used for break/continue resolution).
struct LoopContext {
    /// Instruction index of the loop start (target for `continue`).
    continue_target: u32,
    /// Placeholder instruction indices for `break` jumps that need patching.
    break_placeholders: Vec<usize>,
    /// Whether this is a `for` loop (needs `PopIter` before break).
    is_for_loop: bool,
    /// Handler bodies already running when the loop started.
    exc_depth: u32,
}

/// Where names are stored.
enum Scope {
    Module,
    /// A function body; names declared `global` bypass the local scope.
    Function { globals: HashSet<String> },
}

/// Compiles a restricted syntax tree into bytecode.
pub struct Compiler<'src> {
    /// Text the tree was parsed from, for statements that are only
    /// rejected here.
    source: &'src str,
    filename: &'src str,
    /// The code object being built.
    code: CodeObject,
    scope: Scope,
    /// Stack of loop contexts for break/continue resolution.
    loop_stack: Vec<LoopContext>,
    /// Counter for generating unique comprehension temp variable names.
    comp_counter: usize,
    /// Active `for` iterators at the current point of the body.
    iter_depth: u32,
    /// `except` bodies enclosing the current point of the body.
    exc_depth: u32,
    /// Location of the last instruction; inherited by synthesized nodes.
    last_loc: Option<Loc>,
}

impl<'src> Compiler<'src> {
    fn new(scope: Scope, source: &'src str, filename: &'src str) -> Self {
        Self {
            source,
            filename,
            code: CodeObject::new(),
            scope,
            loop_stack: Vec::new(),
            comp_counter: 0,
            iter_depth: 0,
            exc_depth: 0,
            last_loc: None,
        }
    }

    /// Compile a module body.
    ///
    /// In [`Mode::Single`] a trailing expression statement becomes the
    /// result of the code; otherwise the code returns `None`.
    pub fn compile_module(
        module: &Module,
        mode: Mode,
        source: &'src str,
        filename: &'src str,
    ) -> Result<CodeObject> {
        let mut compiler = Compiler::new(Scope::Module, source, filename);
        let body = &module.body;

        match (mode, body.split_last()) {
            (Mode::Single, Some((last, rest))) if matches!(last.kind, StmtKind::Expr(_)) => {
                compiler.compile_body(rest)?;
                if let StmtKind::Expr(value) = &last.kind {
                    compiler.compile_expr(value)?;
                }
                compiler.emit(Op::ReturnValue, last.loc);
            }
            _ => {
                compiler.compile_body(body)?;
                compiler.emit_return_none(None);
            }
        }

        Ok(compiler.code)
    }

    /// Compile a single expression whose value is the result of the code.
    pub fn compile_expression(
        expr: &ast::Expression,
        source: &'src str,
        filename: &'src str,
    ) -> Result<CodeObject> {
        let mut compiler = Compiler::new(Scope::Module, source, filename);
        compiler.compile_expr(&expr.body)?;
        compiler.emit(Op::ReturnValue, expr.body.loc);
        Ok(compiler.code)
    }

    /// A statement the grammar accepts but its position does not, reported
    /// as a syntax error at the statement.
    fn misplaced(&self, message: &str, loc: Option<Loc>) -> Error {
        let offset = loc.or(self.last_loc).map_or(0, |loc| loc.span.start);
        Error::Syntax(syntax_error(self.source, self.filename, message, offset))
    }

    // -----------------------------------------------------------------------
    // Helper methods for emitting instructions
    // -----------------------------------------------------------------------

    /// Emit an instruction. Nodes without a location reuse the previous one.
    fn emit(&mut self, op: Op, loc: Option<Loc>) {
        let loc = loc.or(self.last_loc);
        self.last_loc = loc;
        self.code.instructions.push(op);
        self.code.spans.push(loc.map_or(Span::default(), |l| l.span));
        self.code.lines.push(loc.map_or(0, |l| l.line));
    }

    /// Emit a jump instruction with a placeholder target (0). Returns the
    /// index of the emitted instruction so it can be patched later.
    fn emit_jump(&mut self, make_op: fn(u32) -> Op, loc: Option<Loc>) -> usize {
        let idx = self.code.instructions.len();
        self.emit(make_op(0), loc);
        idx
    }

    /// Patch a previously emitted jump instruction to point at `target`.
    fn patch_jump(&mut self, idx: usize, target: u32) {
        if let Some(
            Op::Jump(t)
            | Op::PopJumpIfFalse(t)
            | Op::PopJumpIfTrue(t)
            | Op::JumpIfFalseOrPop(t)
            | Op::JumpIfTrueOrPop(t)
            | Op::ForIter(t),
        ) = self.code.instructions.get_mut(idx)
        {
            *t = target;
        }
    }

    /// Patch a jump to the next instruction to be emitted.
    fn patch_here(&mut self, idx: usize) {
        let target = self.current_offset();
        self.patch_jump(idx, target);
    }

    /// Return the current instruction offset (next instruction index).
    fn current_offset(&self) -> u32 {
        self.code.instructions.len() as u32
    }

    /// Add a constant to the constant pool and return its index.
    /// Deduplicates identical constants.
    fn add_const(&mut self, value: Constant) -> u32 {
        if let Some(idx) = self.code.constants.iter().position(|c| same_constant(c, &value)) {
            return idx as u32;
        }
        let idx = self.code.constants.len() as u32;
        self.code.constants.push(value);
        idx
    }

    /// Add a name to the name pool and return its index.
    fn add_name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.code.names.iter().position(|n| n == name) {
            return idx as u32;
        }
        let idx = self.code.names.len() as u32;
        self.code.names.push(name.to_string());
        idx
    }

    fn emit_const(&mut self, value: Constant, loc: Option<Loc>) {
        let idx = self.add_const(value);
        self.emit(Op::LoadConst(idx), loc);
    }

    fn emit_return_none(&mut self, loc: Option<Loc>) {
        self.emit_const(Constant::None, loc);
        self.emit(Op::ReturnValue, loc);
    }

    fn is_global(&self, name: &str) -> bool {
        match &self.scope {
            Scope::Module => false,
            Scope::Function { globals } => globals.contains(name),
        }
    }

    /// Turn reads of names the function binds into local-only reads.
    ///
    /// A name stored or deleted anywhere in a function body is local to the
    /// whole body, so reading it before the store must not fall through to
    /// a global of the same name.
    fn bind_locals(&mut self, params: &ast::Parameters) {
        let mut bound: HashSet<u32> = self
            .code
            .instructions
            .iter()
            .filter_map(|op| match op {
                Op::StoreName(idx) | Op::DeleteName(idx) => Some(*idx),
                _ => None,
            })
            .collect();
        for name in params.names() {
            bound.insert(self.add_name(name));
        }
        for op in &mut self.code.instructions {
            if let Op::LoadName(idx) = *op {
                if bound.contains(&idx) {
                    *op = Op::LoadLocal(idx);
                }
            }
        }
    }

    fn emit_load(&mut self, name: &str, loc: Option<Loc>) {
        let idx = self.add_name(name);
        let op = if self.is_global(name) {
            Op::LoadGlobal(idx)
        } else {
            Op::LoadName(idx)
        };
        self.emit(op, loc);
    }

    fn emit_store(&mut self, name: &str, loc: Option<Loc>) {
        let idx = self.add_name(name);
        let op = if self.is_global(name) {
            Op::StoreGlobal(idx)
        } else {
            Op::StoreName(idx)
        };
        self.emit(op, loc);
    }

    fn emit_delete(&mut self, name: &str, loc: Option<Loc>) {
        let idx = self.add_name(name);
        let op = if self.is_global(name) {
            Op::DeleteGlobal(idx)
        } else {
            Op::DeleteName(idx)
        };
        self.emit(op, loc);
    }

    // -----------------------------------------------------------------------
    // Statement compilation
    // -----------------------------------------------------------------------

    fn compile_body(&mut self, body: &[Stmt]) -> Result<()> {
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    /// Compile a single statement. Statements leave the value stack as they
    /// found it.
    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        let loc = stmt.loc;
        match &stmt.kind {
            StmtKind::Expr(value) => {
                self.compile_expr(value)?;
                self.emit(Op::Pop, loc);
            }

            StmtKind::Assign { targets, value } => {
                self.compile_expr(value)?;
                let n_targets = targets.len();
                for (i, target) in targets.iter().enumerate() {
                    if i + 1 < n_targets {
                        self.emit(Op::Dup, loc);
                    }
                    self.compile_store_target(target)?;
                }
            }

            StmtKind::AugAssign { target, op, value } => {
                let ExprKind::Name { id, .. } = &target.kind else {
                    return Err(Error::Unsupported(
                        "augmented assignment is only supported on names".to_string(),
                    ));
                };
                self.emit_load(id, target.loc);
                self.compile_expr(value)?;
                self.emit(Op::BinaryOp(*op), loc);
                self.emit_store(id, target.loc);
            }

            StmtKind::Delete(targets) => {
                for target in targets {
                    self.compile_delete_target(target)?;
                }
            }

            StmtKind::Print {
                dest,
                values,
                newline,
            } => {
                let Some(dest) = dest else {
                    return Err(Error::Unsupported(
                        "print statement without a target".to_string(),
                    ));
                };
                self.compile_expr(dest)?;
                for value in values {
                    self.compile_expr(value)?;
                }
                self.emit(Op::PrintItems(values.len() as u32, *newline), loc);
            }

            StmtKind::Exec { .. } => {
                return Err(Error::Unsupported("exec statement".to_string()));
            }

            StmtKind::If { test, body, orelse } => {
                self.compile_expr(test)?;
                let else_jump = self.emit_jump(Op::PopJumpIfFalse, loc);
                self.compile_body(body)?;
                if orelse.is_empty() {
                    self.patch_here(else_jump);
                } else {
                    let end_jump = self.emit_jump(Op::Jump, loc);
                    self.patch_here(else_jump);
                    self.compile_body(orelse)?;
                    self.patch_here(end_jump);
                }
            }

            StmtKind::While { test, body, orelse } => {
                let loop_start = self.current_offset();
                self.push_loop(loop_start, false);

                self.compile_expr(test)?;
                let exit_jump = self.emit_jump(Op::PopJumpIfFalse, loc);
                self.compile_body(body)?;
                self.emit(Op::Jump(loop_start), loc);

                // `else` runs when the test fails, never after `break`.
                self.patch_here(exit_jump);
                let ctx = self.pop_loop();
                self.compile_body(orelse)?;
                self.patch_breaks(ctx);
            }

            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.compile_expr(iter)?;
                self.emit(Op::GetIter, loc);

                let loop_start = self.current_offset();
                self.push_loop(loop_start, true);
                self.iter_depth += 1;

                let exit_jump = self.emit_jump(Op::ForIter, loc);
                self.compile_store_target(target)?;
                self.compile_body(body)?;
                self.emit(Op::Jump(loop_start), loc);

                self.iter_depth -= 1;
                self.patch_here(exit_jump);
                let ctx = self.pop_loop();
                self.compile_body(orelse)?;
                self.patch_breaks(ctx);
            }

            StmtKind::Pass => self.emit(Op::Nop, loc),

            StmtKind::Break => {
                let Some(ctx) = self.loop_stack.last() else {
                    return Err(self.misplaced("'break' outside loop", loc));
                };
                let (is_for_loop, exc_depth) = (ctx.is_for_loop, ctx.exc_depth);
                self.unwind_handlers(exc_depth, loc);
                if is_for_loop {
                    self.emit(Op::PopIter, loc);
                }
                let placeholder = self.emit_jump(Op::Jump, loc);
                if let Some(ctx) = self.loop_stack.last_mut() {
                    ctx.break_placeholders.push(placeholder);
                }
            }

            StmtKind::Continue => {
                let Some(ctx) = self.loop_stack.last() else {
                    return Err(self.misplaced("'continue' not properly in loop", loc));
                };
                let (target, exc_depth) = (ctx.continue_target, ctx.exc_depth);
                self.unwind_handlers(exc_depth, loc);
                self.emit(Op::Jump(target), loc);
            }

            StmtKind::Return(value) => {
                if matches!(self.scope, Scope::Module) {
                    return Err(self.misplaced("'return' outside function", loc));
                }
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit_const(Constant::None, loc),
                }
                self.emit(Op::ReturnValue, loc);
            }

            StmtKind::FunctionDef(def) => {
                self.compile_function(
                    &def.name,
                    &def.params,
                    FunctionBody::Block(&def.body),
                    def.doc.clone(),
                    loc,
                )?;
                self.emit_store(&def.name, loc);
            }

            StmtKind::ClassDef { .. } => {
                return Err(Error::Unsupported("class definitions".to_string()));
            }

            StmtKind::Import(names) => {
                for alias in names {
                    match &alias.asname {
                        Some(asname) => {
                            let idx = self.add_name(&alias.name);
                            self.emit(Op::ImportName(idx), loc);
                            self.emit_store(asname, loc);
                        }
                        None => {
                            // `import a.b` binds the top-level name `a`.
                            let top = alias.name.split('.').next().unwrap_or(&alias.name);
                            let idx = self.add_name(top);
                            self.emit(Op::ImportName(idx), loc);
                            self.emit_store(top, loc);
                        }
                    }
                }
            }

            StmtKind::ImportFrom { module, names } => {
                let module_idx = self.add_name(module);
                self.emit(Op::ImportName(module_idx), loc);
                for alias in names {
                    let idx = self.add_name(&alias.name);
                    self.emit(Op::ImportFrom(idx), loc);
                    self.emit_store(alias.asname.as_deref().unwrap_or(&alias.name), loc);
                }
                self.emit(Op::Pop, loc);
            }

            // Collected up front by `collect_globals`.
            StmtKind::Global(_) => self.emit(Op::Nop, loc),

            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                if !finalbody.is_empty() {
                    return Err(Error::Unsupported("try/finally".to_string()));
                }
                self.compile_try(body, handlers, orelse, loc)?;
            }

            StmtKind::Raise { exc, msg } => self.compile_raise(exc.as_ref(), msg.as_ref(), loc)?,

            StmtKind::Assert { test, msg } => {
                self.compile_expr(test)?;
                let ok_jump = self.emit_jump(Op::PopJumpIfTrue, loc);
                self.emit_const(Constant::Str("AssertionError".to_string()), loc);
                match msg {
                    Some(msg) => self.compile_expr(msg)?,
                    None => self.emit_const(Constant::None, loc),
                }
                self.emit(Op::Raise, loc);
                self.patch_here(ok_jump);
            }
        }
        Ok(())
    }

    fn push_loop(&mut self, continue_target: u32, is_for_loop: bool) {
        self.loop_stack.push(LoopContext {
            continue_target,
            break_placeholders: Vec::new(),
            is_for_loop,
            exc_depth: self.exc_depth,
        });
    }

    fn pop_loop(&mut self) -> LoopContext {
        self.loop_stack.pop().unwrap_or(LoopContext {
            continue_target: 0,
            break_placeholders: Vec::new(),
            is_for_loop: false,
            exc_depth: 0,
        })
    }

    fn patch_breaks(&mut self, ctx: LoopContext) {
        for placeholder in ctx.break_placeholders {
            self.patch_here(placeholder);
        }
    }

    /// Leaving a loop from inside `except` bodies ends those handlers.
    fn unwind_handlers(&mut self, target_depth: u32, loc: Option<Loc>) {
        for _ in target_depth..self.exc_depth {
            self.emit(Op::PopException, loc);
        }
    }

    // -----------------------------------------------------------------------
    // Assignment target compilation
    // -----------------------------------------------------------------------

    /// Compile an assignment target. Assumes the value to assign is on TOS.
    fn compile_store_target(&mut self, target: &Expr) -> Result<()> {
        let loc = target.loc;
        match &target.kind {
            ExprKind::Name { id, .. } => self.emit_store(id, loc),

            ExprKind::Attribute { value, attr, .. } => {
                self.compile_expr(value)?;
                let idx = self.add_name(attr);
                self.emit(Op::StoreAttr(idx), loc);
            }

            ExprKind::Subscript { value, index, .. } => {
                self.compile_expr(value)?;
                self.compile_expr(index)?;
                self.emit(Op::StoreSubscript, loc);
            }

            ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => {
                self.emit(Op::UnpackSequence(elts.len() as u32), loc);
                for elt in elts {
                    self.compile_store_target(elt)?;
                }
            }

            _ => {
                return Err(Error::Unsupported(
                    "assignment target not supported".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn compile_delete_target(&mut self, target: &Expr) -> Result<()> {
        let loc = target.loc;
        match &target.kind {
            ExprKind::Name { id, .. } => self.emit_delete(id, loc),

            ExprKind::Attribute { value, attr, .. } => {
                self.compile_expr(value)?;
                let idx = self.add_name(attr);
                self.emit(Op::DeleteAttr(idx), loc);
            }

            ExprKind::Subscript { value, index, .. } => {
                self.compile_expr(value)?;
                self.compile_expr(index)?;
                self.emit(Op::DeleteSubscript, loc);
            }

            ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => {
                for elt in elts {
                    self.compile_delete_target(elt)?;
                }
            }

            _ => {
                return Err(Error::Unsupported("delete target not supported".to_string()));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expression compilation
    // -----------------------------------------------------------------------

    /// Compile an expression. The result is left on TOS.
    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        let loc = expr.loc;

        match &expr.kind {
            ExprKind::Constant(value) => self.emit_const(value.clone(), loc),

            ExprKind::Name { id, ctx } => {
                if *ctx != ExprContext::Load {
                    return Err(Error::Unsupported(format!(
                        "name '{}' used as a value in a store context",
                        id
                    )));
                }
                self.emit_load(id, loc);
            }

            ExprKind::Attribute { attr, .. } => {
                return Err(Error::Unsupported(format!(
                    "unguarded attribute read: .{}",
                    attr
                )));
            }

            ExprKind::Subscript { .. } => {
                return Err(Error::Unsupported("unguarded subscript read".to_string()));
            }

            ExprKind::Slice { lower, upper, step } => {
                for bound in [lower, upper, step] {
                    match bound {
                        Some(expr) => self.compile_expr(expr)?,
                        None => self.emit_const(Constant::None, loc),
                    }
                }
                self.emit(Op::BuildSlice, loc);
            }

            ExprKind::Tuple { elts, .. } => {
                for elt in elts {
                    self.compile_expr(elt)?;
                }
                self.emit(Op::BuildTuple(elts.len() as u32), loc);
            }

            ExprKind::List { elts, .. } => {
                for elt in elts {
                    self.compile_expr(elt)?;
                }
                self.emit(Op::BuildList(elts.len() as u32), loc);
            }

            ExprKind::Dict { keys, values } => {
                for (key, value) in keys.iter().zip(values) {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::BuildDict(keys.len() as u32), loc);
            }

            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.compile_call(func, args, keywords, loc)?,

            ExprKind::Starred(_) => {
                return Err(Error::Unsupported(
                    "starred expression outside a call".to_string(),
                ));
            }

            ExprKind::BinOp { left, op, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Op::BinaryOp(*op), loc);
            }

            ExprKind::UnaryOp { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(Op::UnaryOp(*op), loc);
            }

            ExprKind::BoolOp { op, values } => self.compile_boolop(*op, values, loc)?,

            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => self.compile_compare(left, ops, comparators, loc)?,

            ExprKind::IfExp { test, body, orelse } => {
                self.compile_expr(test)?;
                let else_jump = self.emit_jump(Op::PopJumpIfFalse, loc);
                self.compile_expr(body)?;
                let end_jump = self.emit_jump(Op::Jump, loc);
                self.patch_here(else_jump);
                self.compile_expr(orelse)?;
                self.patch_here(end_jump);
            }

            ExprKind::Lambda { params, body } => {
                self.compile_function("<lambda>", params, FunctionBody::Expr(body), None, loc)?;
            }

            // Generator expressions are evaluated eagerly.
            ExprKind::ListComp { elt, generators } | ExprKind::GeneratorExp { elt, generators } => {
                self.compile_comprehension(Accumulator::List(elt), generators, loc)?;
            }

            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                self.compile_comprehension(Accumulator::Dict(key, value), generators, loc)?;
            }

            ExprKind::Yield(_) => {
                return Err(Error::Unsupported("yield".to_string()));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Specialized expression compilers
    // -----------------------------------------------------------------------

    /// Compile a short-circuit boolean operation (`and` / `or`).
    ///
    /// `and` returns the first falsy value (or the last value if all truthy).
    /// `or` returns the first truthy value (or the last value if all falsy).
    fn compile_boolop(&mut self, op: BoolOp, values: &[Expr], loc: Option<Loc>) -> Result<()> {
        let jump_op: fn(u32) -> Op = match op {
            BoolOp::And => Op::JumpIfFalseOrPop,
            BoolOp::Or => Op::JumpIfTrueOrPop,
        };

        let Some((last, rest)) = values.split_last() else {
            return Err(Error::Unsupported("empty boolean operation".to_string()));
        };

        let mut jump_placeholders = Vec::new();
        for value in rest {
            self.compile_expr(value)?;
            jump_placeholders.push(self.emit_jump(jump_op, loc));
        }
        self.compile_expr(last)?;

        for placeholder in jump_placeholders {
            self.patch_here(placeholder);
        }
        Ok(())
    }

    /// Compile a comparison expression, handling chained comparisons.
    ///
    /// Chained comparisons (`a < b < c`) use `Dup` and `RotN` to keep the
    /// middle operand for the next comparison, with short-circuit jumps on
    /// failure.
    fn compile_compare(
        &mut self,
        left: &Expr,
        ops: &[CmpOp],
        comparators: &[Expr],
        loc: Option<Loc>,
    ) -> Result<()> {
        self.compile_expr(left)?;

        let n_ops = ops.len().min(comparators.len());
        if n_ops == 1 {
            self.compile_expr(&comparators[0])?;
            self.emit(Op::CompareOp(ops[0]), loc);
            return Ok(());
        }

        let mut fail_placeholders = Vec::new();
        for i in 0..n_ops - 1 {
            self.compile_expr(&comparators[i])?;
            self.emit(Op::Dup, loc);
            self.emit(Op::RotN(3), loc);
            self.emit(Op::CompareOp(ops[i]), loc);
            fail_placeholders.push(self.emit_jump(Op::PopJumpIfFalse, loc));
        }

        self.compile_expr(&comparators[n_ops - 1])?;
        self.emit(Op::CompareOp(ops[n_ops - 1]), loc);
        let end_jump = self.emit_jump(Op::Jump, loc);

        // Failure path: drop the saved operand and push False.
        for placeholder in fail_placeholders {
            self.patch_here(placeholder);
        }
        self.emit(Op::Pop, loc);
        self.emit_const(Constant::Bool(false), loc);

        self.patch_here(end_jump);
        Ok(())
    }

    /// Compile a call. Calls with `*args` or `**kwargs` assemble an argument
    /// tuple and a keyword dict and go through `CallFunctionEx`.
    fn compile_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
        loc: Option<Loc>,
    ) -> Result<()> {
        self.compile_expr(func)?;

        let has_star = args.iter().any(|a| matches!(a.kind, ExprKind::Starred(_)))
            || keywords.iter().any(|k| k.arg.is_none());

        if !has_star {
            for arg in args {
                self.compile_expr(arg)?;
            }
            if keywords.is_empty() {
                self.emit(Op::CallFunction(args.len() as u32), loc);
            } else {
                for keyword in keywords {
                    let name = keyword.arg.clone().unwrap_or_default();
                    self.emit_const(Constant::Str(name), loc);
                    self.compile_expr(&keyword.value)?;
                }
                self.emit(
                    Op::CallFunctionKw(args.len() as u32, keywords.len() as u32),
                    loc,
                );
            }
            return Ok(());
        }

        // Positional arguments: runs of plain values become tuples, each
        // starred value is passed through as its own iterable.
        let mut groups = 0u32;
        let mut run = 0u32;
        for arg in args {
            if let ExprKind::Starred(value) = &arg.kind {
                if run > 0 {
                    self.emit(Op::BuildTuple(run), loc);
                    groups += 1;
                    run = 0;
                }
                self.compile_expr(value)?;
                groups += 1;
            } else {
                self.compile_expr(arg)?;
                run += 1;
            }
        }
        if run > 0 {
            self.emit(Op::BuildTuple(run), loc);
            groups += 1;
        }
        self.emit(Op::BuildTupleUnpack(groups), loc);

        // Keyword arguments: named ones become dicts, `**` values pass through.
        let mut groups = 0u32;
        let mut run = 0u32;
        for keyword in keywords {
            match &keyword.arg {
                Some(name) => {
                    self.emit_const(Constant::Str(name.clone()), loc);
                    self.compile_expr(&keyword.value)?;
                    run += 1;
                }
                None => {
                    if run > 0 {
                        self.emit(Op::BuildDict(run), loc);
                        groups += 1;
                        run = 0;
                    }
                    self.compile_expr(&keyword.value)?;
                    groups += 1;
                }
            }
        }
        if run > 0 {
            self.emit(Op::BuildDict(run), loc);
            groups += 1;
        }
        self.emit(Op::BuildMapUnpack(groups), loc);

        self.emit(Op::CallFunctionEx, loc);
        Ok(())
    }

    /// Compile a list or dict comprehension.
    ///
    /// Uses a synthetic temp variable (`__comp_N`) to accumulate results,
    /// with nested for-loops and filter conditions compiled inline. The
    /// temp is deleted once its value is on the stack.
    fn compile_comprehension(
        &mut self,
        acc: Accumulator<'_>,
        generators: &[Comprehension],
        loc: Option<Loc>,
    ) -> Result<()> {
        let comp_var = format!("__comp_{}", self.comp_counter);
        self.comp_counter += 1;
        let comp_var_idx = self.add_name(&comp_var);

        match acc {
            Accumulator::List(_) => self.emit(Op::BuildList(0), loc),
            Accumulator::Dict(..) => self.emit(Op::BuildDict(0), loc),
        }
        self.emit(Op::StoreName(comp_var_idx), loc);

        self.compile_generators(&acc, generators, comp_var_idx, loc)?;

        self.emit(Op::LoadName(comp_var_idx), loc);
        self.emit(Op::DeleteName(comp_var_idx), loc);
        Ok(())
    }

    /// Recursively compile comprehension generators.
    fn compile_generators(
        &mut self,
        acc: &Accumulator<'_>,
        generators: &[Comprehension],
        comp_var_idx: u32,
        loc: Option<Loc>,
    ) -> Result<()> {
        let Some((generator, inner)) = generators.split_first() else {
            match acc {
                Accumulator::List(elt) => {
                    self.compile_expr(elt)?;
                    self.emit(Op::ListAppend(comp_var_idx), loc);
                }
                Accumulator::Dict(key, value) => {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                    self.emit(Op::MapAdd(comp_var_idx), loc);
                }
            }
            return Ok(());
        };

        self.compile_expr(&generator.iter)?;
        self.emit(Op::GetIter, loc);
        self.iter_depth += 1;

        let loop_start = self.current_offset();
        let exit_jump = self.emit_jump(Op::ForIter, loc);
        self.compile_store_target(&generator.target)?;

        let mut skip_jumps = Vec::new();
        for condition in &generator.ifs {
            self.compile_expr(condition)?;
            skip_jumps.push(self.emit_jump(Op::PopJumpIfFalse, loc));
        }

        self.compile_generators(acc, inner, comp_var_idx, loc)?;

        for skip in skip_jumps {
            self.patch_jump(skip, loop_start);
        }
        self.emit(Op::Jump(loop_start), loc);

        self.iter_depth -= 1;
        self.patch_here(exit_jump);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Exceptions
    // -----------------------------------------------------------------------

    /// Compile a try/except statement.
    ///
    /// All handlers share a single exception table entry pointing at the
    /// first one. Typed handlers are chained with `CheckExcMatch` and
    /// `PopJumpIfFalse`; if none matches, `Reraise` propagates the error.
    ///
    /// Layout:
    /// ```text
    /// try_start:
    ///     <try body>
    ///     Jump → else
    /// handler_0:
    ///     CheckExcMatch + PopJumpIfFalse → handler_1   (typed only)
    ///     LoadException + store                        (`as name` only)
    ///     <handler body>
    ///     PopException
    ///     Jump → end
    /// handler_1:
    ///     ...
    ///     Reraise                                      (no bare except)
    /// else:
    ///     <else body>
    /// end:
    /// ```
    fn compile_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ast::ExceptHandler],
        orelse: &[Stmt],
        loc: Option<Loc>,
    ) -> Result<()> {
        let try_start = self.current_offset();
        self.compile_body(body)?;
        let try_end_jump = self.emit_jump(Op::Jump, loc);
        let try_end = self.current_offset();

        let mut handler_end_jumps = Vec::new();
        let mut has_bare_except = false;

        for handler in handlers {
            let hloc = handler.loc.or(loc);
            let mut no_match_jump = None;

            match &handler.type_ {
                Some(type_expr) => {
                    let matcher = exception_matcher(type_expr)?;
                    self.emit_const(matcher, hloc);
                    self.emit(Op::CheckExcMatch, hloc);
                    no_match_jump = Some(self.emit_jump(Op::PopJumpIfFalse, hloc));
                }
                None => has_bare_except = true,
            }

            if let Some(name) = &handler.name {
                self.emit(Op::LoadException, hloc);
                self.emit_store(name, hloc);
            }

            self.exc_depth += 1;
            self.compile_body(&handler.body)?;
            self.exc_depth -= 1;

            self.emit(Op::PopException, hloc);
            handler_end_jumps.push(self.emit_jump(Op::Jump, hloc));

            if let Some(jump) = no_match_jump {
                self.patch_here(jump);
            }
            if has_bare_except {
                break;
            }
        }

        if !has_bare_except {
            self.emit(Op::Reraise, loc);
        }

        self.code.exception_table.push(ExceptionEntry {
            start: try_start,
            end: try_end,
            handler: try_end,
            iter_depth: self.iter_depth,
            exc_depth: self.exc_depth,
        });

        self.patch_here(try_end_jump);
        self.compile_body(orelse)?;

        for jump in handler_end_jumps {
            self.patch_here(jump);
        }
        Ok(())
    }

    /// Compile a raise statement.
    ///
    /// - `raise ExceptionType("message")` and `raise ExceptionType, message`
    /// - `raise ExceptionType` raises with no message
    /// - `raise` (bare) re-raises the exception being handled
    fn compile_raise(&mut self, exc: Option<&Expr>, msg: Option<&Expr>, loc: Option<Loc>) -> Result<()> {
        let Some(exc) = exc else {
            self.emit(Op::Reraise, loc);
            return Ok(());
        };

        match &exc.kind {
            ExprKind::Call { func, args, keywords } if msg.is_none() && keywords.is_empty() => {
                let ExprKind::Name { id, .. } = &func.kind else {
                    return Err(Error::Unsupported(
                        "only `raise ExceptionType(...)` is supported".to_string(),
                    ));
                };
                self.emit_const(Constant::Str(id.clone()), loc);
                match args.first() {
                    Some(arg) => self.compile_expr(arg)?,
                    None => self.emit_const(Constant::None, loc),
                }
            }
            ExprKind::Name { id, .. } => {
                self.emit_const(Constant::Str(id.clone()), loc);
                match msg {
                    Some(msg) => self.compile_expr(msg)?,
                    None => self.emit_const(Constant::None, loc),
                }
            }
            _ => {
                return Err(Error::Unsupported(
                    "only `raise ExceptionType(...)` is supported".to_string(),
                ));
            }
        }
        self.emit(Op::Raise, loc);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------------

    /// Compile a `def` or `lambda` and leave the function on the stack.
    ///
    /// Defaults are evaluated in the enclosing scope each time the
    /// definition runs; the body is compiled into its own code object.
    fn compile_function(
        &mut self,
        name: &str,
        params: &ast::Parameters,
        body: FunctionBody<'_>,
        doc: Option<String>,
        loc: Option<Loc>,
    ) -> Result<()> {
        let mut n_defaults = 0;
        for param in &params.args {
            if let Some(default) = &param.default {
                self.compile_expr(default)?;
                n_defaults += 1;
            }
        }

        let globals = match body {
            FunctionBody::Block(stmts) => collect_globals(stmts),
            FunctionBody::Expr(_) => HashSet::new(),
        };
        let scope = Scope::Function { globals };
        let mut sub_compiler = Compiler::new(scope, self.source, self.filename);
        sub_compiler.comp_counter = self.comp_counter;
        sub_compiler.last_loc = loc;

        match body {
            FunctionBody::Block(stmts) => {
                sub_compiler.compile_body(stmts)?;
                let needs_implicit_return = !matches!(
                    sub_compiler.code.instructions.last(),
                    Some(Op::ReturnValue)
                ) || sub_compiler.has_jump_past_end();
                if needs_implicit_return {
                    sub_compiler.emit_return_none(None);
                }
            }
            FunctionBody::Expr(expr) => {
                sub_compiler.compile_expr(expr)?;
                sub_compiler.emit(Op::ReturnValue, expr.loc);
            }
        }

        sub_compiler.bind_locals(params);
        self.comp_counter = sub_compiler.comp_counter;

        let func_idx = self.code.functions.len() as u32;
        self.code.functions.push(Arc::new(FunctionCode {
            name: name.to_string(),
            params: params.args.iter().map(|p| p.name.clone()).collect(),
            n_defaults,
            vararg: params.vararg.clone(),
            kwarg: params.kwarg.clone(),
            doc,
            code: sub_compiler.code,
        }));

        self.emit(Op::MakeFunction(func_idx), loc);
        Ok(())
    }

    /// Whether any jump targets the position just past the last instruction.
    fn has_jump_past_end(&self) -> bool {
        let end = self.current_offset();
        self.code.instructions.iter().any(|op| {
            matches!(
                op,
                Op::Jump(t) | Op::PopJumpIfFalse(t) | Op::PopJumpIfTrue(t) | Op::ForIter(t)
                    if *t == end
            )
        })
    }
}

/// What a comprehension accumulates.
enum Accumulator<'a> {
    List(&'a Expr),
    Dict(&'a Expr, &'a Expr),
}

enum FunctionBody<'a> {
    Block(&'a [Stmt]),
    Expr(&'a Expr),
}

// ---------------------------------------------------------------------------
// Standalone helpers (no &self)
// ---------------------------------------------------------------------------

/// Names declared `global` anywhere in a function body, not counting
/// nested functions.
fn collect_globals(body: &[Stmt]) -> HashSet<String> {
    let mut names = HashSet::new();
    collect_globals_into(body, &mut names);
    names
}

fn collect_globals_into(body: &[Stmt], names: &mut HashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Global(declared) => names.extend(declared.iter().cloned()),
            StmtKind::If { body, orelse, .. }
            | StmtKind::While { body, orelse, .. }
            | StmtKind::For { body, orelse, .. } => {
                collect_globals_into(body, names);
                collect_globals_into(orelse, names);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_globals_into(body, names);
                for handler in handlers {
                    collect_globals_into(&handler.body, names);
                }
                collect_globals_into(orelse, names);
                collect_globals_into(finalbody, names);
            }
            _ => {}
        }
    }
}

/// The constant `CheckExcMatch` compares against: a type name or a tuple
/// of them.
fn exception_matcher(expr: &Expr) -> Result<Constant> {
    match &expr.kind {
        ExprKind::Name { id, .. } => Ok(Constant::Str(id.clone())),
        ExprKind::Tuple { elts, .. } => Ok(Constant::Tuple(
            elts.iter()
                .map(exception_matcher)
                .collect::<Result<Vec<_>>>()?,
        )),
        _ => Err(Error::Unsupported(
            "only named exception types are supported".to_string(),
        )),
    }
}

/// Constant-pool identity: `1`, `1.0` and `True` compare equal in Python
/// but must stay distinct constants.
fn same_constant(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::None, Constant::None) => true,
        (Constant::Bool(x), Constant::Bool(y)) => x == y,
        (Constant::Int(x), Constant::Int(y)) => x == y,
        (Constant::Float(x), Constant::Float(y)) => x.to_bits() == y.to_bits(),
        (Constant::Str(x), Constant::Str(y)) => x == y,
        (Constant::Tuple(x), Constant::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_constant(a, b))
        }
        _ => false,
    }
}
