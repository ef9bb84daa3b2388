//! Stack-based bytecode virtual machine.
//!
//! Executes [`CodeObject`]s produced by the compiler with a fetch-dispatch
//! loop over a flat instruction array. Each call of a restricted function
//! runs in its own Rust-level frame, so native functions can call back into
//! restricted code through [`Vm::call`].
//!
//! The VM never reads an attribute or item on its own initiative: the
//! restriction pass routed those through the guard functions, which call
//! the public [`Vm::get_attr`] and [`Vm::get_item`] helpers.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::ast::Constant;
use crate::builtins;
use crate::bytecode::{CodeObject, ExceptionEntry, Op};
use crate::error::{Error, Result};
use crate::methods::{self, dict_get, dict_set};
use crate::operators::{apply_binop, apply_cmpop, apply_unaryop};
use crate::policy::{Limits, Policy};
use crate::slice;
use crate::value::{
    BoundMethod, CallArgs, Env, Function, PyIterator, PyObject, PyValue, SliceValue,
};

/// One activation: the code being run and its private state.
struct Frame<'a> {
    code: &'a CodeObject,
    /// Index of the next instruction.
    ip: usize,
    stack: Vec<PyValue>,
    /// Local scope; `None` for module-level code, which uses globals.
    env: Option<Rc<Env>>,
    /// Active `for` iterators, innermost last.
    iterators: Vec<Rc<PyIterator>>,
    /// Depth of the VM's exception stack when the frame started.
    exc_base: usize,
}

impl Frame<'_> {
    fn pop(&mut self) -> PyValue {
        self.stack.pop().unwrap_or(PyValue::None)
    }

    /// Pop `n` values, returning them in push order.
    fn pop_n(&mut self, n: usize) -> Vec<PyValue> {
        let start = self.stack.len().saturating_sub(n);
        self.stack.split_off(start)
    }

    fn name(&self, idx: u32) -> &str {
        self.code
            .names
            .get(idx as usize)
            .map_or("<unknown>", String::as_str)
    }
}

/// The bytecode virtual machine.
///
/// Globals persist across [`Vm::execute`] calls. Builtins are fixed when the
/// VM is built from a [`Policy`]; globals shadow them.
pub struct Vm {
    globals: HashMap<String, PyValue>,
    builtins: HashMap<String, PyValue>,
    /// Modules reachable by `import`.
    modules: HashMap<String, PyValue>,
    limits: Limits,
    /// Instructions executed by the current top-level run.
    instruction_count: u64,
    /// Restricted-function calls currently active.
    depth: usize,
    /// Exceptions being handled by running `except` bodies, innermost last.
    exception_stack: Vec<Error>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A VM with the standard builtins and default limits.
    pub fn new() -> Self {
        Self::with_policy(Policy::standard())
    }

    pub fn with_policy(policy: Policy) -> Self {
        let mut builtins = HashMap::new();
        for name in &policy.builtins {
            match builtins::lookup(name) {
                Some(value) => {
                    builtins.insert(name.clone(), value);
                }
                None => warn!(builtin = %name, "policy allows an unknown builtin"),
            }
        }
        Self {
            globals: HashMap::new(),
            builtins,
            modules: HashMap::new(),
            limits: policy.limits,
            instruction_count: 0,
            depth: 0,
            exception_stack: Vec::new(),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<PyValue>) {
        self.globals.insert(name.into(), value.into());
    }

    pub fn get_global(&self, name: &str) -> Option<PyValue> {
        self.globals.get(name).cloned()
    }

    pub fn remove_global(&mut self, name: &str) -> Option<PyValue> {
        self.globals.remove(name)
    }

    pub fn globals(&self) -> &HashMap<String, PyValue> {
        &self.globals
    }

    /// Whether `name` is bound as a builtin.
    pub fn has_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Make `module` importable as `name`.
    pub fn register_module(&mut self, name: impl Into<String>, module: PyValue) {
        self.modules.insert(name.into(), module);
    }

    /// Run top-level code. Resets the instruction budget.
    pub fn execute(&mut self, code: &CodeObject) -> Result<PyValue> {
        self.reset_run_state();
        self.run_frame(code, None)
    }

    /// Call `callee` from the host. Resets the instruction budget.
    pub fn call_from_host(&mut self, callee: &PyValue, args: CallArgs) -> Result<PyValue> {
        self.reset_run_state();
        self.call(callee, args)
    }

    fn reset_run_state(&mut self) {
        self.instruction_count = 0;
        self.depth = 0;
        self.exception_stack.clear();
    }

    // -----------------------------------------------------------------------
    // Main execution loop
    // -----------------------------------------------------------------------

    fn run_frame(&mut self, code: &CodeObject, env: Option<Rc<Env>>) -> Result<PyValue> {
        let exc_base = self.exception_stack.len();
        let mut frame = Frame {
            code,
            ip: 0,
            stack: Vec::new(),
            env,
            iterators: Vec::new(),
            exc_base,
        };
        let result = self.run(&mut frame);
        self.exception_stack.truncate(exc_base);
        result
    }

    /// Fetch, count, dispatch. Errors go to the innermost covering handler
    /// in the frame's exception table, or out of the frame.
    fn run(&mut self, frame: &mut Frame<'_>) -> Result<PyValue> {
        let code = frame.code;
        loop {
            let ip = frame.ip;
            let Some(op) = code.instructions.get(ip) else {
                return Ok(PyValue::None);
            };
            frame.ip += 1;

            self.instruction_count += 1;
            if let Some(limit) = self.limits.max_instructions
                && self.instruction_count > limit
            {
                return Err(Error::InstructionLimitExceeded(limit));
            }

            let err = match self.dispatch(op, frame) {
                Ok(None) => continue,
                Ok(Some(value)) => return Ok(value),
                Err(err) => err,
            };
            if err.is_uncatchable() {
                return Err(err);
            }
            let Some(entry) = find_handler(code, ip) else {
                debug!(line = code.line_at(ip), error = %err, "exception leaves frame");
                return Err(err);
            };
            frame.stack.clear();
            frame.iterators.truncate(entry.iter_depth as usize);
            self.exception_stack
                .truncate(frame.exc_base + entry.exc_depth as usize);
            self.exception_stack.push(err);
            frame.ip = entry.handler as usize;
        }
    }

    /// Execute one instruction. `Ok(Some(v))` returns `v` from the frame.
    fn dispatch(&mut self, op: &Op, frame: &mut Frame<'_>) -> Result<Option<PyValue>> {
        match op {
            // --- Stack manipulation ---
            Op::LoadConst(i) => {
                let value = frame
                    .code
                    .constants
                    .get(*i as usize)
                    .map_or(PyValue::None, constant_value);
                frame.stack.push(value);
            }
            Op::Pop => {
                frame.pop();
            }
            Op::Dup => {
                let top = frame.stack.last().cloned().unwrap_or(PyValue::None);
                frame.stack.push(top);
            }
            Op::RotN(n) => {
                let len = frame.stack.len();
                let n = *n as usize;
                if n <= len {
                    let top = frame.pop();
                    frame.stack.insert(len - n, top);
                }
            }

            // --- Variables ---
            Op::LoadName(i) => {
                let value = self.load_name(frame, frame.name(*i))?;
                frame.stack.push(value);
            }
            Op::LoadLocal(i) => {
                let name = frame.name(*i);
                let value = match &frame.env {
                    Some(env) => env.vars.borrow().get(name).cloned().ok_or_else(|| {
                        Error::raised(
                            "UnboundLocalError",
                            format!("local variable '{}' referenced before assignment", name),
                        )
                    })?,
                    None => self.load_name(frame, name)?,
                };
                frame.stack.push(value);
            }
            Op::StoreName(i) => {
                let value = frame.pop();
                let name = frame.name(*i).to_string();
                match &frame.env {
                    Some(env) => {
                        env.vars.borrow_mut().insert(name, value);
                    }
                    None => {
                        self.globals.insert(name, value);
                    }
                }
            }
            Op::DeleteName(i) => {
                let name = frame.name(*i);
                let removed = match &frame.env {
                    Some(env) => env.vars.borrow_mut().remove(name),
                    None => self.globals.remove(name),
                };
                if removed.is_none() {
                    return Err(Error::NameError(name.to_string()));
                }
            }
            Op::LoadGlobal(i) => {
                let name = frame.name(*i);
                let value = self
                    .globals
                    .get(name)
                    .or_else(|| self.builtins.get(name))
                    .cloned()
                    .ok_or_else(|| Error::NameError(name.to_string()))?;
                frame.stack.push(value);
            }
            Op::StoreGlobal(i) => {
                let value = frame.pop();
                self.globals.insert(frame.name(*i).to_string(), value);
            }
            Op::DeleteGlobal(i) => {
                let name = frame.name(*i);
                if self.globals.remove(name).is_none() {
                    return Err(Error::NameError(name.to_string()));
                }
            }

            // --- Operators ---
            Op::BinaryOp(op) => {
                let right = frame.pop();
                let left = frame.pop();
                let result = apply_binop(*op, &left, &right, self.limits.max_sequence_len)?;
                frame.stack.push(result);
            }
            Op::UnaryOp(op) => {
                let operand = frame.pop();
                frame.stack.push(apply_unaryop(*op, &operand)?);
            }
            Op::CompareOp(op) => {
                let right = frame.pop();
                let left = frame.pop();
                frame.stack.push(PyValue::Bool(apply_cmpop(*op, &left, &right)?));
            }

            // --- Short-circuit boolean ---
            Op::JumpIfFalseOrPop(target) => {
                if frame.stack.last().is_some_and(|v| !v.is_truthy()) {
                    frame.ip = *target as usize;
                } else {
                    frame.pop();
                }
            }
            Op::JumpIfTrueOrPop(target) => {
                if frame.stack.last().is_some_and(PyValue::is_truthy) {
                    frame.ip = *target as usize;
                } else {
                    frame.pop();
                }
            }

            // --- Control flow ---
            Op::Jump(target) => frame.ip = *target as usize,
            Op::PopJumpIfTrue(target) => {
                if frame.pop().is_truthy() {
                    frame.ip = *target as usize;
                }
            }
            Op::PopJumpIfFalse(target) => {
                if !frame.pop().is_truthy() {
                    frame.ip = *target as usize;
                }
            }

            // --- Collections ---
            Op::BuildList(n) => {
                let items = frame.pop_n(*n as usize);
                frame.stack.push(PyValue::list(items));
            }
            Op::BuildTuple(n) => {
                let items = frame.pop_n(*n as usize);
                frame.stack.push(PyValue::tuple(items));
            }
            Op::BuildDict(n) => {
                let raw = frame.pop_n(*n as usize * 2);
                let dict = PyValue::dict(Vec::with_capacity(*n as usize));
                if let PyValue::Dict(pairs) = &dict {
                    for chunk in raw.chunks(2) {
                        if let [key, value] = chunk {
                            dict_set(pairs, key.clone(), value.clone())?;
                        }
                    }
                }
                frame.stack.push(dict);
            }
            Op::BuildSlice => {
                let step = slice_bound(frame.pop())?;
                let stop = slice_bound(frame.pop())?;
                let start = slice_bound(frame.pop())?;
                frame
                    .stack
                    .push(PyValue::Slice(SliceValue { start, stop, step }));
            }
            Op::BuildTupleUnpack(n) => {
                let groups = frame.pop_n(*n as usize);
                let mut items = Vec::new();
                for group in &groups {
                    items.extend(self.collect_items(group)?);
                }
                frame.stack.push(PyValue::tuple(items));
            }
            Op::BuildMapUnpack(n) => {
                let groups = frame.pop_n(*n as usize);
                let mut merged: Vec<(PyValue, PyValue)> = Vec::new();
                for group in &groups {
                    let PyValue::Dict(pairs) = group else {
                        return Err(Error::TypeError(format!(
                            "argument after ** must be a mapping, not {}",
                            group.type_name()
                        )));
                    };
                    for (key, value) in pairs.borrow().iter() {
                        let Some(name) = key.as_str() else {
                            return Err(Error::TypeError("keywords must be strings".to_string()));
                        };
                        if dict_get(&merged, key).is_some() {
                            return Err(Error::TypeError(format!(
                                "got multiple values for keyword argument '{}'",
                                name
                            )));
                        }
                        merged.push((key.clone(), value.clone()));
                    }
                }
                frame.stack.push(PyValue::dict(merged));
            }

            // --- Writes ---
            Op::StoreAttr(i) => {
                let obj = frame.pop();
                let value = frame.pop();
                self.set_attr(&obj, frame.name(*i), value)?;
            }
            Op::DeleteAttr(i) => {
                let obj = frame.pop();
                self.del_attr(&obj, frame.name(*i))?;
            }
            Op::StoreSubscript => {
                let key = frame.pop();
                let obj = frame.pop();
                let value = frame.pop();
                self.set_item(&obj, &key, value)?;
            }
            Op::DeleteSubscript => {
                let key = frame.pop();
                let obj = frame.pop();
                self.del_item(&obj, &key)?;
            }

            // --- Unpacking ---
            Op::UnpackSequence(n) => {
                let value = frame.pop();
                let items = self.collect_items(&value)?;
                let n = *n as usize;
                if items.len() > n {
                    return Err(Error::ValueError("too many values to unpack".to_string()));
                }
                if items.len() < n {
                    return Err(Error::ValueError(format!(
                        "need more than {} value{} to unpack",
                        items.len(),
                        if items.len() == 1 { "" } else { "s" }
                    )));
                }
                frame.stack.extend(items.into_iter().rev());
            }

            // --- Iteration ---
            Op::GetIter => {
                let value = frame.pop();
                let iter = self.make_iter(&value)?;
                frame.iterators.push(iter);
            }
            Op::ForIter(target) => {
                let Some(iter) = frame.iterators.last().cloned() else {
                    return Err(Error::Unsupported("no active iterator".to_string()));
                };
                match iter.next_value() {
                    Some(item) => frame.stack.push(item?),
                    None => {
                        frame.iterators.pop();
                        frame.ip = *target as usize;
                    }
                }
            }
            Op::PopIter => {
                frame.iterators.pop();
            }
            Op::ListAppend(i) => {
                let value = frame.pop();
                match self.load_name(frame, frame.name(*i))? {
                    PyValue::List(items) => items.borrow_mut().push(value),
                    other => {
                        return Err(Error::TypeError(format!(
                            "cannot append to '{}'",
                            other.type_name()
                        )));
                    }
                }
            }
            Op::MapAdd(i) => {
                let value = frame.pop();
                let key = frame.pop();
                match self.load_name(frame, frame.name(*i))? {
                    PyValue::Dict(pairs) => dict_set(&pairs, key, value)?,
                    other => {
                        return Err(Error::TypeError(format!(
                            "cannot add items to '{}'",
                            other.type_name()
                        )));
                    }
                }
            }

            // --- Calls ---
            Op::CallFunction(n) => {
                let args = frame.pop_n(*n as usize);
                let callee = frame.pop();
                let result = self.call(&callee, CallArgs::new(args))?;
                frame.stack.push(result);
            }
            Op::CallFunctionKw(n_pos, n_kw) => {
                let raw = frame.pop_n(*n_kw as usize * 2);
                let mut kwargs = Vec::with_capacity(*n_kw as usize);
                for chunk in raw.chunks(2) {
                    if let [name, value] = chunk {
                        kwargs.push((name.to_string(), value.clone()));
                    }
                }
                let args = frame.pop_n(*n_pos as usize);
                let callee = frame.pop();
                let result = self.call(&callee, CallArgs::with_kwargs(args, kwargs))?;
                frame.stack.push(result);
            }
            Op::CallFunctionEx => {
                let kwargs = frame.pop();
                let args = frame.pop();
                let callee = frame.pop();
                let args = args.as_sequence().unwrap_or_default();
                let kwargs = match &kwargs {
                    PyValue::Dict(pairs) => pairs
                        .borrow()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.clone()))
                        .collect(),
                    _ => Vec::new(),
                };
                let result = self.call(&callee, CallArgs::with_kwargs(args, kwargs))?;
                frame.stack.push(result);
            }

            // --- Functions ---
            Op::MakeFunction(i) => {
                let Some(code) = frame.code.functions.get(*i as usize).cloned() else {
                    return Err(Error::Unsupported("missing function body".to_string()));
                };
                let defaults = frame.pop_n(code.n_defaults);
                let func = Function {
                    code,
                    defaults,
                    env: frame.env.clone(),
                };
                frame.stack.push(PyValue::Function(Rc::new(func)));
            }
            Op::ReturnValue => return Ok(Some(frame.pop())),

            // --- Imports ---
            Op::ImportName(i) => {
                let name = frame.name(*i);
                let module = self
                    .modules
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::ImportError(format!("No module named {}", name)))?;
                frame.stack.push(module);
            }
            Op::ImportFrom(i) => {
                let name = frame.name(*i);
                let module = frame.stack.last().cloned().unwrap_or(PyValue::None);
                let value = self
                    .get_attr(&module, name)
                    .map_err(|_| Error::ImportError(format!("cannot import name {}", name)))?;
                frame.stack.push(value);
            }

            // --- Printing ---
            Op::PrintItems(n, newline) => {
                let values = frame.pop_n(*n as usize);
                let dest = frame.pop();
                let mut softspace = softspace(&dest);
                let mut text = String::new();
                for value in &values {
                    if softspace {
                        text.push(' ');
                    }
                    let item = value.to_string();
                    // A string ending in a tab or newline needs no separator.
                    softspace = !matches!(value, PyValue::Str(_))
                        || !item
                            .chars()
                            .last()
                            .is_some_and(|c| c.is_whitespace() && c != ' ');
                    text.push_str(&item);
                }
                if *newline {
                    text.push('\n');
                    softspace = false;
                }
                let write = self.get_attr(&dest, "write")?;
                self.call(&write, CallArgs::new(vec![PyValue::Str(text)]))?;
                set_softspace(&dest, softspace);
            }

            // --- Exceptions ---
            Op::Raise => {
                let message = match frame.pop() {
                    PyValue::None => String::new(),
                    other => other.to_string(),
                };
                let exc_type = frame.pop().to_string();
                return Err(Error::raised(exc_type, message));
            }
            Op::Reraise => {
                return Err(self.exception_stack.last().cloned().unwrap_or_else(|| {
                    Error::raised("RuntimeError", "No active exception to re-raise")
                }));
            }
            Op::CheckExcMatch => {
                let matcher = frame.pop();
                let matched = match self.exception_stack.last() {
                    Some(err) => match &matcher {
                        PyValue::Tuple(names) => names
                            .iter()
                            .any(|n| exception_matches(err, &n.to_string())),
                        other => exception_matches(err, &other.to_string()),
                    },
                    None => false,
                };
                frame.stack.push(PyValue::Bool(matched));
            }
            Op::LoadException => {
                let message = self
                    .exception_stack
                    .last()
                    .map(Error::exception_message)
                    .unwrap_or_default();
                frame.stack.push(PyValue::Str(message));
            }
            Op::PopException => {
                if self.exception_stack.len() > frame.exc_base {
                    self.exception_stack.pop();
                }
            }

            Op::Nop => {}
        }
        Ok(None)
    }

    /// Local scope, enclosing scopes, globals, builtins.
    fn load_name(&self, frame: &Frame<'_>, name: &str) -> Result<PyValue> {
        if let Some(value) = frame.env.as_ref().and_then(|env| env.lookup(name)) {
            return Ok(value);
        }
        self.globals
            .get(name)
            .or_else(|| self.builtins.get(name))
            .cloned()
            .ok_or_else(|| Error::NameError(name.to_string()))
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Call any callable value.
    pub fn call(&mut self, callee: &PyValue, args: CallArgs) -> Result<PyValue> {
        match callee {
            PyValue::Function(func) => self.call_function(func, args),
            PyValue::Native(native) => {
                trace!(function = %native.name, "native call");
                (native.func)(self, args)
            }
            PyValue::Method(method) => self.call_method(&method.receiver, &method.name, args),
            PyValue::Object(obj) => obj.call(self, args),
            other => Err(Error::TypeError(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_method(&mut self, receiver: &PyValue, name: &str, args: CallArgs) -> Result<PyValue> {
        match receiver {
            PyValue::Object(obj) => obj.call_method(self, name, args),
            other => methods::call_method(self, other, name, args),
        }
    }

    fn call_function(&mut self, func: &Rc<Function>, args: CallArgs) -> Result<PyValue> {
        let limit = self.limits.max_recursion_depth;
        if self.depth >= limit {
            return Err(Error::RecursionLimitExceeded(limit));
        }
        let locals = bind_arguments(func, args)?;
        let env = Rc::new(Env::new(locals, func.env.clone()));
        let code = Arc::clone(&func.code);

        trace!(function = func.name(), depth = self.depth, "call");
        self.depth += 1;
        let result = self.run_frame(&code.code, Some(env));
        self.depth -= 1;
        result
    }

    // -----------------------------------------------------------------------
    // Object protocols used by guards and builtins
    // -----------------------------------------------------------------------

    /// `obj.name`, with no policy applied.
    pub fn get_attr(&mut self, obj: &PyValue, name: &str) -> Result<PyValue> {
        let found = match obj {
            PyValue::Object(o) => o.get_attr(name).or_else(|| {
                o.has_method(name).then(|| bound_method(obj, name))
            }),
            PyValue::Module(m) => m.attr(name),
            other if methods::has_method(other, name) => Some(bound_method(other, name)),
            _ => None,
        };
        found.ok_or_else(|| {
            Error::AttributeError(format!(
                "'{}' object has no attribute '{}'",
                obj.type_name(),
                name
            ))
        })
    }

    /// `obj[key]`, with no policy applied.
    pub fn get_item(&mut self, obj: &PyValue, key: &PyValue) -> Result<PyValue> {
        match (obj, key) {
            (PyValue::List(items), PyValue::Slice(s)) => {
                Ok(PyValue::list(slice::get_slice(&items.borrow(), s)?))
            }
            (PyValue::Tuple(items), PyValue::Slice(s)) => {
                Ok(PyValue::tuple(slice::get_slice(items, s)?))
            }
            (PyValue::Str(text), PyValue::Slice(s)) => {
                Ok(PyValue::Str(slice::slice_string(text, s)?))
            }
            (PyValue::List(items), _) => {
                let items = items.borrow();
                let idx = slice::normalize_index(index_of(obj, key)?, items.len(), "list")?;
                Ok(items[idx].clone())
            }
            (PyValue::Tuple(items), _) => {
                let idx = slice::normalize_index(index_of(obj, key)?, items.len(), "tuple")?;
                Ok(items[idx].clone())
            }
            (PyValue::Str(text), _) => slice::string_index(text, index_of(obj, key)?),
            (PyValue::Dict(pairs), _) => {
                if !key.is_hashable() {
                    return Err(Error::TypeError(format!(
                        "unhashable type: '{}'",
                        key.type_name()
                    )));
                }
                dict_get(&pairs.borrow(), key).ok_or_else(|| Error::KeyError(key.repr()))
            }
            (PyValue::Object(o), _) => o.get_item(key),
            _ => Err(Error::TypeError(format!(
                "'{}' object is not subscriptable",
                obj.type_name()
            ))),
        }
    }

    pub fn set_attr(&mut self, obj: &PyValue, name: &str, value: PyValue) -> Result<()> {
        match obj {
            PyValue::Object(o) => o.set_attr(name, value),
            other => Err(Error::AttributeError(format!(
                "'{}' object has no attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }

    pub fn del_attr(&mut self, obj: &PyValue, name: &str) -> Result<()> {
        match obj {
            PyValue::Object(o) => o.del_attr(name),
            other => Err(Error::AttributeError(format!(
                "'{}' object has no attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }

    pub fn set_item(&mut self, obj: &PyValue, key: &PyValue, value: PyValue) -> Result<()> {
        match (obj, key) {
            (PyValue::List(items), PyValue::Slice(s)) => {
                let values = self.collect_items(&value)?;
                slice::set_slice(&mut items.borrow_mut(), s, values)
            }
            (PyValue::List(items), _) => {
                let index = index_of(obj, key)?;
                let mut items = items.borrow_mut();
                let idx = slice::normalize_index(index, items.len(), "list assignment")?;
                items[idx] = value;
                Ok(())
            }
            (PyValue::Dict(pairs), _) => dict_set(pairs, key.clone(), value),
            (PyValue::Object(o), _) => o.set_item(&host_slice(o.as_ref(), key), value),
            _ => Err(Error::TypeError(format!(
                "'{}' object does not support item assignment",
                obj.type_name()
            ))),
        }
    }

    pub fn del_item(&mut self, obj: &PyValue, key: &PyValue) -> Result<()> {
        match (obj, key) {
            (PyValue::List(items), PyValue::Slice(s)) => {
                slice::delete_slice(&mut items.borrow_mut(), s)
            }
            (PyValue::List(items), _) => {
                let index = index_of(obj, key)?;
                let mut items = items.borrow_mut();
                let idx = slice::normalize_index(index, items.len(), "list assignment")?;
                items.remove(idx);
                Ok(())
            }
            (PyValue::Dict(pairs), _) => {
                let pos = pairs.borrow().iter().position(|(k, _)| k == key);
                match pos {
                    Some(pos) => {
                        pairs.borrow_mut().remove(pos);
                        Ok(())
                    }
                    None => Err(Error::KeyError(key.repr())),
                }
            }
            (PyValue::Object(o), _) => o.del_item(&host_slice(o.as_ref(), key)),
            _ => Err(Error::TypeError(format!(
                "'{}' object doesn't support item deletion",
                obj.type_name()
            ))),
        }
    }

    /// `iter(obj)`.
    pub fn make_iter(&mut self, obj: &PyValue) -> Result<Rc<PyIterator>> {
        let iter = match obj {
            PyValue::Iterator(it) => return Ok(Rc::clone(it)),
            PyValue::List(items) => PyIterator::over_list(Rc::clone(items)),
            PyValue::Tuple(items) => PyIterator::from_values(items.to_vec()),
            PyValue::Str(s) => {
                PyIterator::from_values(s.chars().map(|c| PyValue::Str(c.to_string())).collect())
            }
            PyValue::Dict(pairs) => {
                PyIterator::from_values(pairs.borrow().iter().map(|(k, _)| k.clone()).collect())
            }
            PyValue::Object(o) => match o.iter() {
                Some(items) => PyIterator::from_values(items),
                None => return Err(not_iterable(obj)),
            },
            _ => return Err(not_iterable(obj)),
        };
        Ok(Rc::new(iter))
    }

    /// Every item `obj` iterates over, up to the sequence length limit.
    pub fn collect_items(&mut self, obj: &PyValue) -> Result<Vec<PyValue>> {
        match obj {
            PyValue::List(items) => return Ok(items.borrow().clone()),
            PyValue::Tuple(items) => return Ok(items.to_vec()),
            _ => {}
        }
        let iter = self.make_iter(obj)?;
        let max = self.limits.max_sequence_len;
        let mut items = Vec::new();
        while let Some(item) = iter.next_value() {
            if items.len() >= max {
                return Err(Error::ValueError(format!(
                    "iterable produced more than {} items",
                    max
                )));
            }
            items.push(item?);
        }
        Ok(items)
    }
}

/// Python 2 simple slices: a negative bound counts from the end of a sized
/// host object before the object sees it.
fn host_slice(obj: &dyn PyObject, key: &PyValue) -> PyValue {
    match (key, obj.len()) {
        (PyValue::Slice(s), Some(len)) if s.step.is_none() => {
            let len = i64::try_from(len).unwrap_or(i64::MAX);
            let shift = |bound: Option<i64>| bound.map(|b| if b < 0 { b + len } else { b });
            PyValue::Slice(SliceValue {
                start: shift(s.start),
                stop: shift(s.stop),
                step: None,
            })
        }
        _ => key.clone(),
    }
}

/// Whether the print destination is mid-line after a trailing comma.
fn softspace(dest: &PyValue) -> bool {
    match dest {
        PyValue::Object(o) => o.get_attr("softspace").is_some_and(|v| v.is_truthy()),
        _ => false,
    }
}

/// Destinations without a writable `softspace` just never get separators
/// carried over from an earlier statement.
fn set_softspace(dest: &PyValue, on: bool) {
    if let PyValue::Object(o) = dest {
        if o.set_attr("softspace", PyValue::Bool(on)).is_err() {
            trace!(dest = o.type_name(), "print destination has no softspace");
        }
    }
}

fn bound_method(receiver: &PyValue, name: &str) -> PyValue {
    PyValue::Method(Rc::new(BoundMethod {
        receiver: receiver.clone(),
        name: name.to_string(),
    }))
}

fn not_iterable(obj: &PyValue) -> Error {
    Error::TypeError(format!("'{}' object is not iterable", obj.type_name()))
}

fn index_of(obj: &PyValue, key: &PyValue) -> Result<i64> {
    key.as_int().ok_or_else(|| {
        Error::TypeError(format!(
            "{} indices must be integers, not {}",
            obj.type_name(),
            key.type_name()
        ))
    })
}

fn slice_bound(value: PyValue) -> Result<Option<i64>> {
    match value {
        PyValue::None => Ok(None),
        other => other.as_int().map(Some).ok_or_else(|| {
            Error::TypeError("slice indices must be integers or None".to_string())
        }),
    }
}

pub(crate) fn constant_value(constant: &Constant) -> PyValue {
    match constant {
        Constant::None => PyValue::None,
        Constant::Bool(b) => PyValue::Bool(*b),
        Constant::Int(i) => PyValue::Int(*i),
        Constant::Float(f) => PyValue::Float(*f),
        Constant::Str(s) => PyValue::Str(s.clone()),
        Constant::Tuple(items) => PyValue::tuple(items.iter().map(constant_value).collect()),
    }
}

/// The innermost exception table entry covering `ip`.
fn find_handler(code: &CodeObject, ip: usize) -> Option<&ExceptionEntry> {
    let ip = ip as u32;
    code.exception_table
        .iter()
        .filter(|e| e.start <= ip && ip < e.end)
        .min_by_key(|e| e.end - e.start)
}

/// Whether `except <name>` catches `err`.
fn exception_matches(err: &Error, name: &str) -> bool {
    let actual = err.exception_type();
    match name {
        "BaseException" | "Exception" | "StandardError" => true,
        "ArithmeticError" => matches!(actual, "ZeroDivisionError" | "OverflowError"),
        "LookupError" => matches!(actual, "KeyError" | "IndexError"),
        "NameError" => matches!(actual, "NameError" | "UnboundLocalError"),
        name => actual == name,
    }
}

/// Bind call arguments to a function's parameters.
fn bind_arguments(func: &Function, args: CallArgs) -> Result<HashMap<String, PyValue>> {
    let code = &func.code;
    let name = code.name.as_str();
    let params = &code.params;
    let n_params = params.len();
    let n_required = n_params - func.defaults.len().min(n_params);
    let qualifier = |too_many: bool| {
        if func.defaults.is_empty() && code.vararg.is_none() {
            "exactly"
        } else if too_many {
            "at most"
        } else {
            "at least"
        }
    };
    let plural = |n: usize| if n == 1 { "" } else { "s" };

    let n_given = args.args.len();
    let mut bound: Vec<Option<PyValue>> = vec![None; n_params];
    let mut extra_positional = Vec::new();
    for (i, value) in args.args.into_iter().enumerate() {
        if i < n_params {
            bound[i] = Some(value);
        } else if code.vararg.is_some() {
            extra_positional.push(value);
        } else {
            return Err(Error::TypeError(format!(
                "{}() takes {} {} argument{} ({} given)",
                name,
                qualifier(true),
                n_params,
                plural(n_params),
                n_given
            )));
        }
    }

    let mut extra_kwargs = Vec::new();
    for (key, value) in args.kwargs {
        match params.iter().position(|p| *p == key) {
            Some(pos) if bound[pos].is_some() => {
                return Err(Error::TypeError(format!(
                    "{}() got multiple values for keyword argument '{}'",
                    name, key
                )));
            }
            Some(pos) => bound[pos] = Some(value),
            None if code.kwarg.is_some() => extra_kwargs.push((PyValue::Str(key), value)),
            None => {
                return Err(Error::TypeError(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, key
                )));
            }
        }
    }

    let mut locals = HashMap::with_capacity(n_params + 2);
    for (i, (param, value)) in params.iter().zip(bound).enumerate() {
        let value = match value {
            Some(value) => value,
            None if i >= n_required => func.defaults[i - n_required].clone(),
            None => {
                return Err(Error::TypeError(format!(
                    "{}() takes {} {} argument{} ({} given)",
                    name,
                    qualifier(false),
                    n_required,
                    plural(n_required),
                    n_given
                )));
            }
        };
        locals.insert(param.clone(), value);
    }
    if let Some(vararg) = &code.vararg {
        locals.insert(vararg.clone(), PyValue::tuple(extra_positional));
    }
    if let Some(kwarg) = &code.kwarg {
        locals.insert(kwarg.clone(), PyValue::dict(extra_kwargs));
    }
    Ok(locals)
}
