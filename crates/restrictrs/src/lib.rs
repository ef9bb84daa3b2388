//! restrictrs - a restricted Python compiler and runtime
//!
//! restrictrs compiles untrusted Python source into bytecode that can only
//! touch the outside world through guard functions the host controls.
//! Source goes through three stages:
//!
//! 1. **Parse** into a syntax tree ([`parser`], [`ast`]).
//! 2. **Restrict**: the [`RestrictionMutator`] rejects underscore names,
//!    `exec` and `yield`, and rewrites attribute reads, subscripts, write
//!    targets, loops, star calls and `print` into calls to `_getattr_`,
//!    `_getitem_`, `_write_`, `_getiter_`, `_apply_` and `_print_`.
//!    Violations are collected and reported together.
//! 3. **Generate** bytecode that runs on the [`Vm`].
//!
//! # Quick Start
//!
//! ```
//! use restrictrs::{PyValue, Sandbox};
//!
//! let mut sandbox = Sandbox::new();
//! sandbox.set_variable("items", vec![3, 1, 2]);
//!
//! let result = sandbox.execute(r#"
//! ordered = sorted(items)
//! ordered[-1]
//! "#).unwrap();
//! assert_eq!(result, PyValue::Int(3));
//!
//! let err = sandbox.execute("items.__class__").unwrap_err();
//! assert!(matches!(err, restrictrs::Error::Restriction(_)));
//! ```
//!
//! # Compiling without running
//!
//! ```
//! use restrictrs::compile_restricted_exec;
//!
//! let unit = compile_restricted_exec("total = price * qty\n").unwrap();
//! assert_eq!(
//!     unit.used_names.iter().collect::<Vec<_>>(),
//!     vec!["price", "qty"],
//! );
//! ```
//!
//! # Supported Python
//!
//! The accepted language is Python 2 flavoured: `print` is a statement
//! (`print >> out, x` included) and `raise E, msg` is accepted.
//!
//! - `None`, `bool`, `int`, `float`, `str`, `list`, `tuple`, `dict`
//! - `if`/`elif`/`else`, `for` and `while` with `else`, `break`, `continue`
//! - `def` with defaults, `*args` and `**kwargs`, `lambda`, closures,
//!   `global`
//! - list, dict and generator comprehensions
//! - `try`/`except`/`else`, `raise`, `assert`
//! - `import` and `from ... import` of registered modules (`math`,
//!   `string` and `json` by default)
//!
//! # Not Supported
//!
//! - `class` bodies and `finally` blocks
//! - `exec` and `yield`
//! - file, network or process access of any kind

pub mod ast;
mod builtins;
pub mod bytecode;
mod compiler;
mod diagnostic;
mod error;
mod eval;
mod guards;
mod lexer;
mod methods;
mod modules;
mod operators;
pub mod parser;
mod policy;
mod restricted;
pub mod restriction;
mod sandbox;
mod slice;
mod token;
mod value;
mod vm;
pub mod walker;

pub use diagnostic::{Diagnostic, Label, Loc, Span};
pub use error::{Error, RestrictionError, Result, SyntaxError};
pub use eval::RestrictedEval;
pub use guards::{
    Guard, PrintCollector, WriteProxy, default_guards, guarded_apply, guarded_getattr,
    guarded_getitem, guarded_iter, guarded_write,
};
pub use modules::ModuleBuilder;
pub use policy::{
    LIMITED_BUILTINS, Limits, Policy, SAFE_BUILTINS, SEQUENCE_BUILTINS, UTILITY_BUILTINS,
};
pub use restricted::{
    CompiledUnit, Mode, RestrictedCompiler, compile_restricted, compile_restricted_eval,
    compile_restricted_exec, compile_restricted_function,
};
pub use restriction::RestrictionMutator;
pub use sandbox::{Output, Sandbox};
pub use value::{
    BoundMethod, CallArgs, Function, Module, Namespace, NativeFunction, PyIterator, PyObject,
    PyValue, SliceValue, WriteMode,
};
pub use vm::Vm;
