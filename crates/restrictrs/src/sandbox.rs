use tracing::debug;

use crate::error::{Error, Result};
use crate::guards::{Guard, PrintCollector, default_guards};
use crate::modules::default_modules;
use crate::policy::{Limits, Policy};
use crate::restricted::{CompiledUnit, RestrictedCompiler};
use crate::restriction::PRINT_TARGET;
use crate::value::{CallArgs, PyValue};
use crate::vm::Vm;

/// A restricted Python execution environment.
///
/// Source is compiled through the restriction pass and run on a [`Vm`]
/// whose namespace holds the default guards. Globals persist across calls.
///
/// # Example
///
/// ```
/// use restrictrs::{PyValue, Sandbox};
///
/// let mut sandbox = Sandbox::new();
///
/// sandbox.register_fn("add_numbers", |_vm, args| {
///     let a = args.get(0).and_then(PyValue::as_int).unwrap_or(0);
///     let b = args.get(1).and_then(PyValue::as_int).unwrap_or(0);
///     Ok(PyValue::Int(a + b))
/// });
///
/// let result = sandbox.execute(r#"
/// x = add_numbers(10, 20)
/// x * 2
/// "#).unwrap();
///
/// assert_eq!(result, PyValue::Int(60));
/// ```
pub struct Sandbox {
    vm: Vm,
    compiler: RestrictedCompiler,
}

impl Sandbox {
    /// A sandbox with the standard builtins and default limits.
    pub fn new() -> Self {
        Self::with_policy(Policy::standard())
    }

    pub fn with_policy(policy: Policy) -> Self {
        let mut vm = Vm::with_policy(policy);
        for module in default_modules() {
            if let PyValue::Module(m) = &module {
                let name = m.name.clone();
                vm.register_module(name, module);
            }
        }
        for (name, guard) in default_guards() {
            vm.set_global(name, guard);
        }
        Self {
            vm,
            compiler: RestrictedCompiler::new("<sandbox>"),
        }
    }

    pub fn set_limits(&mut self, limits: Limits) {
        self.vm.set_limits(limits);
    }

    /// Use `filename` in syntax errors and restriction messages.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.compiler = RestrictedCompiler::new(filename);
        self
    }

    /// Execute source in interactive mode.
    ///
    /// Returns the value of a trailing expression statement, or
    /// `PyValue::None` if the code ends with any other statement.
    ///
    /// # Errors
    ///
    /// - [`Error::Syntax`] for malformed source
    /// - [`Error::Restriction`] listing every policy violation
    /// - a runtime error raised by the code and not caught by it
    ///
    /// # Example
    ///
    /// ```
    /// use restrictrs::{PyValue, Sandbox};
    ///
    /// let mut sandbox = Sandbox::new();
    /// let result = sandbox.execute(r#"
    /// total = 0
    /// for i in range(10):
    ///     total += i
    /// total
    /// "#).unwrap();
    /// assert_eq!(result, PyValue::Int(45));
    /// ```
    pub fn execute(&mut self, source: &str) -> Result<PyValue> {
        let unit = self.compiler.single(source)?;
        self.run(&unit)
    }

    /// Run an already compiled unit against this sandbox's globals.
    pub fn run(&mut self, unit: &CompiledUnit) -> Result<PyValue> {
        debug!(filename = %unit.filename, mode = ?unit.mode, "running unit");
        self.vm.execute(unit.code())
    }

    /// Evaluate a single expression.
    pub fn eval(&mut self, expr: &str) -> Result<PyValue> {
        let unit = self.compiler.eval(expr)?;
        self.run(&unit)
    }

    /// Execute source and return its result together with the text that
    /// module-level `print` statements produced.
    ///
    /// ```
    /// use restrictrs::Sandbox;
    ///
    /// let mut sandbox = Sandbox::new();
    /// let output = sandbox.execute_with_output(r#"
    /// x = 10
    /// print "x is", x
    /// x * 2
    /// "#).unwrap();
    ///
    /// assert_eq!(output.printed, "x is 10\n");
    /// assert_eq!(output.result.as_int(), Some(20));
    /// ```
    pub fn execute_with_output(&mut self, source: &str) -> Result<Output> {
        let unit = self.compiler.single(source)?;
        self.vm.remove_global(PRINT_TARGET);
        let result = self.run(&unit);
        let printed = self
            .vm
            .remove_global(PRINT_TARGET)
            .and_then(|collector| {
                collector
                    .downcast_ref::<PrintCollector>()
                    .map(PrintCollector::text)
            })
            .unwrap_or_default();
        Ok(Output {
            result: result?,
            printed,
        })
    }

    /// Compile `body` as the function `name(params)` and bind it globally.
    ///
    /// ```
    /// use restrictrs::{PyValue, Sandbox};
    ///
    /// let mut sandbox = Sandbox::new();
    /// sandbox
    ///     .define_function("a, b=1", "return a * b", "scale", None)
    ///     .unwrap();
    /// let result = sandbox.call("scale", vec![PyValue::Int(3), PyValue::Int(4)]);
    /// assert_eq!(result.unwrap(), PyValue::Int(12));
    /// ```
    pub fn define_function(
        &mut self,
        params: &str,
        body: &str,
        name: &str,
        globalize: Option<&[&str]>,
    ) -> Result<()> {
        let unit = self.compiler.function(params, body, name, globalize)?;
        self.run(&unit)?;
        Ok(())
    }

    /// Call the global `name` with positional arguments.
    pub fn call(&mut self, name: &str, args: Vec<PyValue>) -> Result<PyValue> {
        self.call_with(name, CallArgs::new(args))
    }

    /// Call the global `name` with positional and keyword arguments.
    pub fn call_with(&mut self, name: &str, args: CallArgs) -> Result<PyValue> {
        let callee = self
            .vm
            .get_global(name)
            .ok_or_else(|| Error::NameError(name.to_string()))?;
        self.vm.call_from_host(&callee, args)
    }

    /// Set a variable in the sandbox's global scope.
    ///
    /// ```
    /// use restrictrs::{PyValue, Sandbox};
    ///
    /// let mut sandbox = Sandbox::new();
    /// sandbox.set_variable("x", 42);
    /// assert_eq!(sandbox.execute("x * 2").unwrap(), PyValue::Int(84));
    /// ```
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<PyValue>) {
        self.vm.set_global(name, value);
    }

    pub fn get_variable(&self, name: &str) -> Option<PyValue> {
        self.vm.get_global(name)
    }

    /// Bind a Rust function as a global callable.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Vm, CallArgs) -> Result<PyValue> + 'static,
    {
        let name = name.into();
        let native = PyValue::native(name.clone(), f);
        self.vm.set_global(name, native);
    }

    /// Make `module` importable as `name`.
    pub fn register_module(&mut self, name: impl Into<String>, module: PyValue) {
        self.vm.register_module(name, module);
    }

    /// Replace one of the guard functions restricted code calls.
    pub fn set_guard(&mut self, guard: Guard, value: PyValue) {
        self.vm.set_global(guard.name(), value);
    }

    /// Put a guard back to its default.
    pub fn reset_guard(&mut self, guard: Guard) {
        self.vm.set_global(guard.name(), guard.default_value());
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of executing code with print capture.
#[derive(Debug, Clone)]
pub struct Output {
    /// The value of the trailing expression, or `None`.
    pub result: PyValue,
    /// Everything module-level `print` statements wrote.
    pub printed: String,
}

impl Output {
    pub fn has_output(&self) -> bool {
        !self.printed.is_empty()
    }

    /// The printed text split into lines.
    pub fn lines(&self) -> Vec<&str> {
        self.printed.lines().collect()
    }
}
