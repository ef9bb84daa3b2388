//! The restricted compile pipeline.
//!
//! Every entry point runs the same stages: parse, apply the
//! [`RestrictionMutator`], fail if it collected any violation, then lower
//! the rewritten tree to bytecode. Syntax errors are returned untouched; a
//! unit is only produced when the source passed every check.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::ast::{Module, Stmt, StmtKind};
use crate::bytecode::CodeObject;
use crate::compiler::Compiler;
use crate::error::{Error, RestrictionError, Result};
use crate::lexer::{is_identifier, syntax_error};
use crate::parser::{parse_expression, parse_module, take_docstring};
use crate::restriction::RestrictionMutator;

const DEFAULT_FILENAME: &str = "<string>";

/// How the source is parsed and what the compiled code returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A sequence of statements. The code returns `None`.
    Exec,
    /// A single expression. The code returns its value.
    Eval,
    /// Interactive: like `Exec`, but a trailing expression statement's value
    /// is returned.
    Single,
}

/// The product of a successful restricted compile.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    code: Arc<CodeObject>,
    /// Always empty: a compile with violations fails instead.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Free names the code reads.
    pub used_names: BTreeSet<String>,
    pub mode: Mode,
    pub filename: String,
}

impl CompiledUnit {
    pub fn code(&self) -> &CodeObject {
        &self.code
    }

    /// The bytecode, shareable across threads.
    pub fn shared_code(&self) -> Arc<CodeObject> {
        Arc::clone(&self.code)
    }
}

/// Compiles untrusted source under one filename.
///
/// ```
/// use restrictrs::{Mode, RestrictedCompiler};
///
/// let unit = RestrictedCompiler::new("script.py")
///     .compile("total = a + b\n", Mode::Exec)
///     .unwrap();
/// assert!(unit.used_names.contains("a"));
/// ```
#[derive(Debug, Clone)]
pub struct RestrictedCompiler {
    filename: String,
}

impl Default for RestrictedCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_FILENAME)
    }
}

impl RestrictedCompiler {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn exec(&self, source: &str) -> Result<CompiledUnit> {
        self.compile(source, Mode::Exec)
    }

    pub fn eval(&self, source: &str) -> Result<CompiledUnit> {
        self.compile(source, Mode::Eval)
    }

    pub fn single(&self, source: &str) -> Result<CompiledUnit> {
        self.compile(source, Mode::Single)
    }

    pub fn compile(&self, source: &str, mode: Mode) -> Result<CompiledUnit> {
        debug!(filename = %self.filename, ?mode, bytes = source.len(), "parsing");
        match mode {
            Mode::Eval => {
                let mut expression = parse_expression(source, &self.filename)?;
                let mut mutator = RestrictionMutator::new();
                mutator.restrict_expression(&mut expression);
                self.check(&mutator)?;
                let code = Compiler::compile_expression(&expression, source, &self.filename)?;
                Ok(self.finish(code, mutator, mode))
            }
            Mode::Exec | Mode::Single => {
                let module = parse_module(source, &self.filename)?;
                self.compile_module(module, mode, source)
            }
        }
    }

    /// Compile `body` as the function `name(params)`.
    ///
    /// Running the unit binds the function under `name`. A leading string
    /// literal of `body` becomes the docstring. With `globalize`, the body
    /// starts with a `global` declaration of those names.
    pub fn function(
        &self,
        params: &str,
        body: &str,
        name: &str,
        globalize: Option<&[&str]>,
    ) -> Result<CompiledUnit> {
        if !is_identifier(name) {
            let message = format!("'{}' is not a valid function name", name);
            return Err(syntax_error(name, &self.filename, message, 0).into());
        }
        let stub = format!("def {}({}): pass\n", name, params);
        let mut module = parse_module(&stub, &self.filename)?;
        let mut statements = parse_module(body, &self.filename)?.body;

        let def = match module.body.as_mut_slice() {
            [Stmt {
                kind: StmtKind::FunctionDef(def),
                ..
            }] => def,
            _ => {
                let message = format!("invalid parameter list '{}'", params);
                return Err(syntax_error(&stub, &self.filename, message, 0).into());
            }
        };
        def.doc = take_docstring(&mut statements);
        if statements.is_empty() {
            statements.push(Stmt {
                kind: StmtKind::Pass,
                loc: None,
            });
        }
        if let Some(names) = globalize.filter(|names| !names.is_empty()) {
            let names = names.iter().map(|n| n.to_string()).collect();
            statements.insert(
                0,
                Stmt {
                    kind: StmtKind::Global(names),
                    loc: None,
                },
            );
        }
        def.body = statements;

        self.compile_module(module, Mode::Exec, body)
    }

    /// `source` is the text the statements' locations point into.
    fn compile_module(&self, mut module: Module, mode: Mode, source: &str) -> Result<CompiledUnit> {
        let mut mutator = RestrictionMutator::new();
        mutator.restrict_module(&mut module);
        self.check(&mutator)?;
        let code = Compiler::compile_module(&module, mode, source, &self.filename)?;
        Ok(self.finish(code, mutator, mode))
    }

    fn check(&self, mutator: &RestrictionMutator) -> Result<()> {
        debug!(
            errors = mutator.errors.len(),
            warnings = mutator.warnings.len(),
            "restricted"
        );
        if mutator.has_errors() {
            debug!(filename = %self.filename, errors = ?mutator.errors, "source rejected");
            return Err(Error::Restriction(RestrictionError {
                errors: mutator.errors.clone(),
                spans: mutator.spans.clone(),
            }));
        }
        Ok(())
    }

    fn finish(&self, code: CodeObject, mutator: RestrictionMutator, mode: Mode) -> CompiledUnit {
        debug!(
            instructions = code.instructions.len(),
            functions = code.functions.len(),
            "generated bytecode"
        );
        CompiledUnit {
            code: Arc::new(code),
            errors: Vec::new(),
            warnings: mutator.warnings,
            used_names: mutator.used_names,
            mode,
            filename: self.filename.clone(),
        }
    }
}

/// Compile a program for execution.
pub fn compile_restricted_exec(source: &str) -> Result<CompiledUnit> {
    RestrictedCompiler::default().exec(source)
}

/// Compile a single expression.
pub fn compile_restricted_eval(source: &str) -> Result<CompiledUnit> {
    RestrictedCompiler::default().eval(source)
}

/// Compile `body` as a function definition. See [`RestrictedCompiler::function`].
pub fn compile_restricted_function(
    params: &str,
    body: &str,
    name: &str,
    filename: &str,
    globalize: Option<&[&str]>,
) -> Result<CompiledUnit> {
    RestrictedCompiler::new(filename).function(params, body, name, globalize)
}

pub fn compile_restricted(source: &str, filename: &str, mode: Mode) -> Result<CompiledUnit> {
    RestrictedCompiler::new(filename).compile(source, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Op;
    use pretty_assertions::assert_eq;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_unit_is_send_and_sync() {
        assert_send_sync::<CompiledUnit>();
    }

    #[test]
    fn test_errors_are_batched() {
        let err = compile_restricted_exec("_a = 1\nexec 'x'\n").unwrap_err();
        let Error::Restriction(RestrictionError { errors, .. }) = err else {
            panic!("expected a restriction error, got {err:?}");
        };
        assert!(errors.first().is_some_and(|e| e.starts_with("Line 1: ")));
        assert_eq!(
            errors.last().map(String::as_str),
            Some("Line 2: Exec statements are not allowed.")
        );
    }

    #[test]
    fn test_syntax_error_is_unwrapped() {
        let err = compile_restricted("x = (1,\n", "calc.py", Mode::Exec).unwrap_err();
        let Error::Syntax(syntax) = err else {
            panic!("expected a syntax error, got {err:?}");
        };
        assert_eq!(syntax.filename, "calc.py");
    }

    #[test]
    fn test_eval_mode_returns_expression() {
        let unit = compile_restricted_eval("a + 1").unwrap();
        assert_eq!(unit.mode, Mode::Eval);
        assert_eq!(unit.filename, "<string>");
        assert_eq!(unit.code().instructions.last(), Some(&Op::ReturnValue));
        assert_eq!(unit.used_names.iter().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_function_takes_docstring() {
        let unit = compile_restricted_function(
            "a, b=2",
            "'Adds.'\nreturn a + b\n",
            "add",
            "<func>",
            None,
        )
        .unwrap();
        let function = &unit.code().functions[0];
        assert_eq!(function.name, "add");
        assert_eq!(function.doc.as_deref(), Some("Adds."));
        assert_eq!(function.params, vec!["a", "b"]);
        assert_eq!(function.n_defaults, 1);
    }

    #[test]
    fn test_function_with_empty_body() {
        let unit = compile_restricted_function("", "", "noop", "<func>", None).unwrap();
        assert_eq!(unit.code().functions[0].doc, None);
    }

    #[test]
    fn test_function_body_is_restricted() {
        let err = compile_restricted_function("", "x = _secret\n", "f", "<func>", None);
        assert!(matches!(err, Err(Error::Restriction(_))));
    }
}
