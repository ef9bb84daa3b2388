//! Bytecode instruction set and compiled code representation.
//!
//! The compiler lowers a restricted syntax tree into [`CodeObject`]s and the
//! VM executes them. Code objects hold only plain data (constants are
//! [`Constant`]s, not runtime values), so a compiled unit can be shared
//! across threads while the values it produces stay single-threaded.
//!
//! There are no instructions for reading an attribute or an
//! item: the restriction pass rewrites every such read into a call to a
//! guard function, so the VM never performs one on its own.

use std::sync::Arc;

use crate::ast::Constant;
use crate::diagnostic::Span;

// ---------------------------------------------------------------------------
// Operator enums
// ---------------------------------------------------------------------------

/// Binary operators for arithmetic and bitwise operations.
///
/// These map 1:1 to Python's binary operators. The VM delegates the actual
/// computation to [`crate::operators::apply_binop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitOr,
    BitXor,
    BitAnd,
    LShift,
    RShift,
}

/// Comparison operators.
///
/// Supports Python's full set of comparisons including chained comparisons
/// (`a < b < c`) which the compiler breaks into individual compare-and-jump
/// sequences. The VM delegates to [`crate::operators::apply_cmpop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Boolean negation: `not x`
    Not,
    /// Arithmetic negation: `-x`
    Neg,
    /// Unary plus: `+x` (identity for numbers)
    Pos,
    /// Bitwise invert: `~x`
    Invert,
}

// ---------------------------------------------------------------------------
// Bytecode instructions
// ---------------------------------------------------------------------------

/// A single bytecode instruction.
///
/// All index arguments (`u32`) refer to entries in the corresponding pool of
/// the [`CodeObject`] that contains this instruction (constants, names or
/// functions). Jump targets are instruction indices.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum Op {
    // --- Stack manipulation ---
    /// Push `constants[i]` onto the stack.
    LoadConst(u32),

    /// Discard the top-of-stack value.
    Pop,

    /// Duplicate the top-of-stack value.
    Dup,

    /// Rotate the top N stack items so that TOS moves to position N.
    ///
    /// `RotN(3)` with stack `[a, b, c]` (c = TOS) produces `[c, a, b]`.
    RotN(u8),

    // --- Variables ---
    /// Push the value of `names[i]`.
    ///
    /// Lookup order: function locals, enclosing function scopes, globals,
    /// builtins. Produces a `NameError` if not found.
    LoadName(u32),

    /// Push `names[i]` from the current function scope only. Raises
    /// `UnboundLocalError` if the function has not bound it yet.
    LoadLocal(u32),

    /// Pop TOS into `names[i]` in the innermost scope.
    StoreName(u32),

    /// Remove `names[i]` from the innermost scope.
    DeleteName(u32),

    /// Like `LoadName` but skips function scopes (`global` declarations).
    LoadGlobal(u32),

    StoreGlobal(u32),

    DeleteGlobal(u32),

    // --- Operators ---
    /// Pop two values (right then left), apply the binary operator, push result.
    BinaryOp(BinOp),

    /// Pop one value, apply the unary operator, push result.
    UnaryOp(UnaryOp),

    /// Pop two values (right then left), compare, push a `Bool` result.
    CompareOp(CmpOp),

    // --- Short-circuit boolean operations ---
    /// If TOS is falsy, jump to target and keep it as the result. Otherwise
    /// pop it and fall through to the next operand.
    JumpIfFalseOrPop(u32),

    /// If TOS is truthy, jump to target and keep it as the result. Otherwise
    /// pop it and fall through to the next operand.
    JumpIfTrueOrPop(u32),

    // --- Control flow ---
    /// Unconditional jump to instruction index.
    Jump(u32),

    /// Pop TOS. If truthy, jump to target.
    PopJumpIfTrue(u32),

    /// Pop TOS. If falsy, jump to target.
    PopJumpIfFalse(u32),

    // --- Collection constructors ---
    /// Pop N items, build a `List` with the first pushed item at index 0.
    BuildList(u32),

    /// Pop N items, build a `Tuple`.
    BuildTuple(u32),

    /// Pop 2*N items (alternating key, value), build a `Dict`.
    BuildDict(u32),

    /// Pop step, stop and start (any may be `None`), push a slice object.
    BuildSlice,

    /// Pop N iterables and push one tuple holding all their items in order.
    ///
    /// Used to assemble the positional arguments of a star call.
    BuildTupleUnpack(u32),

    /// Pop N mappings and merge them into one dict of keyword arguments.
    /// A key given twice is a `TypeError`.
    BuildMapUnpack(u32),

    // --- Writes ---
    /// Stack: `[value, obj]`. Set `obj.names[i] = value`.
    ///
    /// `obj` is always the result of the `_write_` guard.
    StoreAttr(u32),

    /// Pop `obj` and delete `obj.names[i]`.
    DeleteAttr(u32),

    /// Stack: `[value, obj, key]`. Set `obj[key] = value`.
    StoreSubscript,

    /// Stack: `[obj, key]`. Delete `obj[key]`.
    DeleteSubscript,

    // --- Unpacking ---
    /// Pop a sequence and push its N elements so that element 0 is TOS.
    ///
    /// This lets the compiler emit stores in forward target order.
    UnpackSequence(u32),

    // --- Iteration ---
    /// Pop TOS, turn it into an iterator and push it on the frame's
    /// iterator stack (not the value stack).
    GetIter,

    /// Advance the frame's topmost iterator.
    ///
    /// Pushes the next item, or pops the iterator and jumps to target when
    /// it is exhausted.
    ForIter(u32),

    /// Discard the frame's topmost iterator. Emitted before `break`.
    PopIter,

    /// Pop a value and append it to the list held in local `names[i]`.
    ///
    /// Comprehensions accumulate into a hidden local whose name the
    /// restriction pass makes unreachable from user code.
    ListAppend(u32),

    /// Pop value then key and insert them into the dict held in `names[i]`.
    MapAdd(u32),

    // --- Function calls ---
    /// Stack: `[callee, arg_0, ..., arg_n-1]`. Call and push the result.
    CallFunction(u32),

    /// Call with positional and keyword arguments.
    ///
    /// Stack layout (bottom to top):
    /// `[callee, positional..., kw_name_0, kw_val_0, kw_name_1, kw_val_1, ...]`
    ///
    /// Keyword names are `Str` constants.
    CallFunctionKw(u32, u32),

    /// Stack: `[callee, args_tuple, kwargs_dict]`. Used for star calls.
    CallFunctionEx,

    // --- Function definitions ---
    /// Build a function from `functions[i]`.
    ///
    /// Pops the values of its parameter defaults (pushed left to right) and
    /// captures the current function scope, if any, for closures.
    MakeFunction(u32),

    /// Pop TOS and return it from the current frame.
    ReturnValue,

    // --- Imports ---
    /// Push the registered module `names[i]`, or raise `ImportError`.
    ImportName(u32),

    /// Push attribute `names[i]` of the module at TOS, leaving the module.
    ImportFrom(u32),

    // --- Printing ---
    /// Stack: `[dest, v_0, ..., v_n-1]`. Write the values, separated by
    /// spaces, to `dest.write`. The flag adds a trailing newline.
    PrintItems(u32, bool),

    // --- Exception handling ---
    /// Pop the message (or `None`) and the exception type name, then raise.
    Raise,

    /// Re-raise the exception currently being handled (bare `raise`).
    Reraise,

    /// Pop an exception type name (a `Str`, or a `Tuple` of them) and push
    /// whether the exception being handled matches it.
    CheckExcMatch,

    /// Push the message of the exception being handled, for `except E as e`.
    LoadException,

    /// Discard the handled exception. Emitted at the end of each handler.
    PopException,

    // --- Misc ---
    /// No operation.
    Nop,
}

// ---------------------------------------------------------------------------
// Compiled code representation
// ---------------------------------------------------------------------------

/// An entry in the exception table mapping an instruction range to a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionEntry {
    /// First instruction index covered (inclusive).
    pub start: u32,
    /// Last instruction index covered (exclusive).
    pub end: u32,
    /// Instruction index of the handler to jump to.
    pub handler: u32,
    /// Number of active `for` iterators when the `try` began. The VM drops
    /// any iterators opened inside the protected range.
    pub iter_depth: u32,
    /// Number of enclosing `except` bodies still running when the `try`
    /// began. Exceptions they were handling stay active.
    pub exc_depth: u32,
}

/// A compiled unit of code: a module body, an expression or a function body.
///
/// The `instructions`, `spans` and `lines` vectors are always the same
/// length, so every instruction can be traced back to its source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeObject {
    /// The bytecode instructions to execute.
    pub instructions: Vec<Op>,

    /// Constant pool: literal values referenced by `LoadConst(index)`.
    pub constants: Vec<Constant>,

    /// Name pool: variable, attribute and module names referenced by index.
    pub names: Vec<String>,

    /// Source span for each instruction (parallel to `instructions`).
    pub spans: Vec<Span>,

    /// 1-based source line for each instruction, `0` when unknown.
    pub lines: Vec<u32>,

    /// Compiled function bodies referenced by `MakeFunction(index)`.
    pub functions: Vec<Arc<FunctionCode>>,

    /// Exception table for try/except handling.
    ///
    /// When an error occurs, the VM picks the narrowest range
    /// covering the faulting instruction.
    pub exception_table: Vec<ExceptionEntry>,
}

impl CodeObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source line of the instruction at `ip`, if recorded.
    pub fn line_at(&self, ip: usize) -> Option<u32> {
        self.lines.get(ip).copied().filter(|&l| l > 0)
    }
}

/// A compiled function definition, stored inside a parent [`CodeObject`].
///
/// Default values are not part of the code: they are evaluated each time
/// the `def` statement runs and bound by `MakeFunction`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCode {
    /// The function name, `<lambda>` for lambdas.
    pub name: String,

    /// Positional parameter names, in order.
    pub params: Vec<String>,

    /// How many trailing `params` have defaults.
    pub n_defaults: usize,

    /// Name of the `*args` parameter, collecting extra positionals as a tuple.
    pub vararg: Option<String>,

    /// Name of the `**kwargs` parameter, collecting extra keywords as a dict.
    pub kwarg: Option<String>,

    /// The docstring, if the body started with a string literal.
    pub doc: Option<String>,

    /// The compiled function body.
    pub code: CodeObject,
}
