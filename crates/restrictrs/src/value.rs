//! Runtime values.
//!
//! Containers share their storage through `Rc`, so mutation through one
//! binding is visible through every other, as in Python. Values are
//! therefore single-threaded; only compiled code crosses threads.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::bytecode::FunctionCode;
use crate::error::{Error, Result};
use crate::vm::Vm;

/// A Python value.
#[derive(Clone)]
pub enum PyValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<PyValue>>>),
    Tuple(Rc<Vec<PyValue>>),
    /// Insertion-ordered key/value pairs.
    Dict(Rc<RefCell<Vec<(PyValue, PyValue)>>>),
    Slice(SliceValue),
    Function(Rc<Function>),
    Native(Rc<NativeFunction>),
    Method(Rc<BoundMethod>),
    Module(Rc<Module>),
    /// A host object.
    Object(Rc<dyn PyObject>),
    Iterator(Rc<PyIterator>),
}

/// `slice(start, stop, step)`; missing bounds are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceValue {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

/// A function defined by restricted code.
pub struct Function {
    pub(crate) code: Arc<FunctionCode>,
    pub(crate) defaults: Vec<PyValue>,
    /// Scope of the enclosing function, for closures.
    pub(crate) env: Option<Rc<Env>>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.code.name
    }

    /// The docstring, if the body started with one.
    pub fn doc(&self) -> Option<&str> {
        self.code.doc.as_deref()
    }

    pub fn params(&self) -> &[String] {
        &self.code.params
    }
}

/// Local variables of one function activation.
pub(crate) struct Env {
    pub(crate) vars: RefCell<HashMap<String, PyValue>>,
    pub(crate) parent: Option<Rc<Env>>,
}

impl Env {
    pub(crate) fn new(vars: HashMap<String, PyValue>, parent: Option<Rc<Env>>) -> Self {
        Self {
            vars: RefCell::new(vars),
            parent,
        }
    }

    /// Look a name up in this scope and its enclosing scopes.
    pub(crate) fn lookup(&self, name: &str) -> Option<PyValue> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }
}

type NativeFn = dyn Fn(&mut Vm, CallArgs) -> Result<PyValue>;

/// A function implemented in Rust.
pub struct NativeFunction {
    pub name: String,
    pub(crate) func: Box<NativeFn>,
}

/// A method looked up on a value, waiting to be called.
pub struct BoundMethod {
    pub receiver: PyValue,
    pub name: String,
}

/// An importable module: a name and its attributes.
pub struct Module {
    pub name: String,
    pub attrs: Vec<(String, PyValue)>,
}

impl Module {
    pub fn attr(&self, name: &str) -> Option<PyValue> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

/// A lazily evaluated stream of values.
///
/// Items are produced on demand and may fail, so an iterator handed out
/// by a host `_getiter_` can stop a loop part way through.
pub struct PyIterator {
    inner: RefCell<Box<dyn Iterator<Item = Result<PyValue>>>>,
}

impl PyIterator {
    pub fn new(iter: impl Iterator<Item = Result<PyValue>> + 'static) -> Self {
        Self {
            inner: RefCell::new(Box::new(iter)),
        }
    }

    /// Iterate over a snapshot of `items`.
    pub fn from_values(items: Vec<PyValue>) -> Self {
        Self::new(items.into_iter().map(Ok))
    }

    /// Iterate over a list, seeing appends made during the loop.
    pub fn over_list(list: Rc<RefCell<Vec<PyValue>>>) -> Self {
        let mut index = 0;
        Self::new(std::iter::from_fn(move || {
            let item = list.borrow().get(index).cloned();
            index += 1;
            item.map(Ok)
        }))
    }

    pub fn next_value(&self) -> Option<Result<PyValue>> {
        self.inner.borrow_mut().next()
    }
}

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// Arguments of a call: positionals then keywords, in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<PyValue>,
    pub kwargs: Vec<(String, PyValue)>,
}

impl CallArgs {
    pub fn new(args: Vec<PyValue>) -> Self {
        Self {
            args,
            kwargs: Vec::new(),
        }
    }

    pub fn with_kwargs(args: Vec<PyValue>, kwargs: Vec<(String, PyValue)>) -> Self {
        Self { args, kwargs }
    }

    pub fn get(&self, idx: usize) -> Option<&PyValue> {
        self.args.get(idx)
    }

    pub fn kwarg(&self, name: &str) -> Option<&PyValue> {
        self.kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Fail unless `min..=max` positionals and no keywords were passed.
    pub fn check_arity(&self, func: &str, min: usize, max: usize) -> Result<()> {
        if let Some((name, _)) = self.kwargs.first() {
            return Err(Error::TypeError(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, name
            )));
        }
        let n = self.args.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("exactly {}", min)
            } else if n < min {
                format!("at least {}", min)
            } else {
                format!("at most {}", max)
            };
            return Err(Error::TypeError(format!(
                "{}() takes {} argument{} ({} given)",
                func,
                expected,
                if min == max && min == 1 { "" } else { "s" },
                n
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Host objects
// ---------------------------------------------------------------------------

/// A host object exposed to restricted code.
///
/// Every method has a default, so an implementation only overrides the
/// protocols it supports. Methods take `&self`; use interior mutability
/// for state.
///
/// The `guarded_*` methods are the write protocol consulted by the
/// default `_write_` guard. Returning `None` means the object does not
/// take part in the protocol and the write is refused.
pub trait PyObject {
    fn type_name(&self) -> &str;

    fn get_attr(&self, _name: &str) -> Option<PyValue> {
        None
    }

    /// Whether `name` is a method handled by [`PyObject::call_method`].
    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn call_method(&self, _vm: &mut Vm, name: &str, _args: CallArgs) -> Result<PyValue> {
        Err(Error::AttributeError(format!(
            "'{}' object has no attribute '{}'",
            self.type_name(),
            name
        )))
    }

    fn set_attr(&self, name: &str, _value: PyValue) -> Result<()> {
        Err(Error::AttributeError(format!(
            "'{}' object attribute '{}' is read-only",
            self.type_name(),
            name
        )))
    }

    fn del_attr(&self, name: &str) -> Result<()> {
        Err(Error::AttributeError(format!(
            "'{}' object attribute '{}' is read-only",
            self.type_name(),
            name
        )))
    }

    fn get_item(&self, _key: &PyValue) -> Result<PyValue> {
        Err(Error::TypeError(format!(
            "'{}' object is not subscriptable",
            self.type_name()
        )))
    }

    fn set_item(&self, _key: &PyValue, _value: PyValue) -> Result<()> {
        Err(Error::TypeError(format!(
            "'{}' object does not support item assignment",
            self.type_name()
        )))
    }

    fn del_item(&self, _key: &PyValue) -> Result<()> {
        Err(Error::TypeError(format!(
            "'{}' object does not support item deletion",
            self.type_name()
        )))
    }

    fn len(&self) -> Option<usize> {
        None
    }

    /// The values a `for` loop over this object visits.
    fn iter(&self) -> Option<Vec<PyValue>> {
        None
    }

    fn call(&self, _vm: &mut Vm, _args: CallArgs) -> Result<PyValue> {
        Err(Error::TypeError(format!(
            "'{}' object is not callable",
            self.type_name()
        )))
    }

    /// Objects that check their own writes are handed to restricted code
    /// unwrapped by `_write_`.
    fn guards_own_writes(&self) -> bool {
        false
    }

    fn guarded_setattr(&self, _name: &str, _value: PyValue) -> Option<Result<()>> {
        None
    }

    fn guarded_delattr(&self, _name: &str) -> Option<Result<()>> {
        None
    }

    fn guarded_setitem(&self, _key: &PyValue, _value: PyValue) -> Option<Result<()>> {
        None
    }

    fn guarded_delitem(&self, _key: &PyValue) -> Option<Result<()>> {
        None
    }

    fn repr(&self) -> String {
        format!("<{} object>", self.type_name())
    }

    fn as_any(&self) -> &dyn Any;
}

/// How a [`Namespace`] treats writes routed through `_write_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// No write protocol: guarded writes are refused.
    #[default]
    Unguarded,
    /// Implements the `guarded_*` protocol by writing through.
    Protocol,
    /// Checks its own writes, so `_write_` returns it unwrapped.
    SelfGuarding,
}

/// A host object with free-form attributes and items.
#[derive(Default)]
pub struct Namespace {
    type_name: String,
    attrs: RefCell<Vec<(String, PyValue)>>,
    items: RefCell<Vec<(PyValue, PyValue)>>,
    mode: WriteMode,
}

impl Namespace {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(self, name: impl Into<String>, value: impl Into<PyValue>) -> Self {
        self.attrs.borrow_mut().push((name.into(), value.into()));
        self
    }

    pub fn with_item(self, key: impl Into<PyValue>, value: impl Into<PyValue>) -> Self {
        self.items.borrow_mut().push((key.into(), value.into()));
        self
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn into_value(self) -> PyValue {
        PyValue::Object(Rc::new(self))
    }

    pub fn attr(&self, name: &str) -> Option<PyValue> {
        self.attrs
            .borrow()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    pub fn item(&self, key: &PyValue) -> Option<PyValue> {
        self.items
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn protocol(&self) -> bool {
        self.mode == WriteMode::Protocol
    }
}

impl PyObject for Namespace {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get_attr(&self, name: &str) -> Option<PyValue> {
        self.attr(name)
    }

    fn set_attr(&self, name: &str, value: PyValue) -> Result<()> {
        let mut attrs = self.attrs.borrow_mut();
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => attrs.push((name.to_string(), value)),
        }
        Ok(())
    }

    fn del_attr(&self, name: &str) -> Result<()> {
        let mut attrs = self.attrs.borrow_mut();
        match attrs.iter().position(|(k, _)| k == name) {
            Some(idx) => {
                attrs.remove(idx);
                Ok(())
            }
            None => Err(Error::AttributeError(name.to_string())),
        }
    }

    fn get_item(&self, key: &PyValue) -> Result<PyValue> {
        self.item(key)
            .ok_or_else(|| Error::KeyError(key.repr()))
    }

    fn set_item(&self, key: &PyValue, value: PyValue) -> Result<()> {
        let mut items = self.items.borrow_mut();
        match items.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => items.push((key.clone(), value)),
        }
        Ok(())
    }

    fn del_item(&self, key: &PyValue) -> Result<()> {
        let mut items = self.items.borrow_mut();
        match items.iter().position(|(k, _)| k == key) {
            Some(idx) => {
                items.remove(idx);
                Ok(())
            }
            None => Err(Error::KeyError(key.repr())),
        }
    }

    fn len(&self) -> Option<usize> {
        Some(self.items.borrow().len())
    }

    fn iter(&self) -> Option<Vec<PyValue>> {
        Some(self.items.borrow().iter().map(|(k, _)| k.clone()).collect())
    }

    fn guards_own_writes(&self) -> bool {
        self.mode == WriteMode::SelfGuarding
    }

    fn guarded_setattr(&self, name: &str, value: PyValue) -> Option<Result<()>> {
        self.protocol().then(|| self.set_attr(name, value))
    }

    fn guarded_delattr(&self, name: &str) -> Option<Result<()>> {
        self.protocol().then(|| self.del_attr(name))
    }

    fn guarded_setitem(&self, key: &PyValue, value: PyValue) -> Option<Result<()>> {
        self.protocol().then(|| self.set_item(key, value))
    }

    fn guarded_delitem(&self, key: &PyValue) -> Option<Result<()>> {
        self.protocol().then(|| self.del_item(key))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// PyValue helpers
// ---------------------------------------------------------------------------

impl PyValue {
    pub fn list(items: Vec<PyValue>) -> Self {
        PyValue::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<PyValue>) -> Self {
        PyValue::Tuple(Rc::new(items))
    }

    pub fn dict(pairs: Vec<(PyValue, PyValue)>) -> Self {
        PyValue::Dict(Rc::new(RefCell::new(pairs)))
    }

    pub fn object(obj: impl PyObject + 'static) -> Self {
        PyValue::Object(Rc::new(obj))
    }

    pub fn iterator(iter: PyIterator) -> Self {
        PyValue::Iterator(Rc::new(iter))
    }

    /// Wrap a Rust closure as a callable value.
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Vm, CallArgs) -> Result<PyValue> + 'static,
    {
        PyValue::Native(Rc::new(NativeFunction {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub fn type_name(&self) -> &str {
        match self {
            PyValue::None => "NoneType",
            PyValue::Bool(_) => "bool",
            PyValue::Int(_) => "int",
            PyValue::Float(_) => "float",
            PyValue::Str(_) => "str",
            PyValue::List(_) => "list",
            PyValue::Tuple(_) => "tuple",
            PyValue::Dict(_) => "dict",
            PyValue::Slice(_) => "slice",
            PyValue::Function(_) => "function",
            PyValue::Native(_) => "builtin_function_or_method",
            PyValue::Method(_) => "instancemethod",
            PyValue::Module(_) => "module",
            PyValue::Object(obj) => obj.type_name(),
            PyValue::Iterator(_) => "iterator",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            PyValue::None => false,
            PyValue::Bool(b) => *b,
            PyValue::Int(i) => *i != 0,
            PyValue::Float(f) => *f != 0.0,
            PyValue::Str(s) => !s.is_empty(),
            PyValue::List(l) => !l.borrow().is_empty(),
            PyValue::Tuple(t) => !t.is_empty(),
            PyValue::Dict(d) => !d.borrow().is_empty(),
            PyValue::Object(obj) => obj.len().is_none_or(|n| n > 0),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PyValue::Int(i) => Some(*i),
            PyValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PyValue::Float(f) => Some(*f),
            PyValue::Int(i) => Some(*i as f64),
            PyValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// A snapshot of a list or tuple's elements.
    pub fn as_sequence(&self) -> Option<Vec<PyValue>> {
        match self {
            PyValue::List(items) => Some(items.borrow().clone()),
            PyValue::Tuple(items) => Some(items.to_vec()),
            _ => None,
        }
    }

    /// Downcast a host object to its concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            PyValue::Object(obj) => obj.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        match self {
            PyValue::Function(_) | PyValue::Native(_) | PyValue::Method(_) => true,
            // Host objects advertise no call protocol; assume they may.
            PyValue::Object(_) => true,
            _ => false,
        }
    }

    /// Whether the value may be used as a dict key.
    pub fn is_hashable(&self) -> bool {
        match self {
            PyValue::List(_) | PyValue::Dict(_) | PyValue::Slice(_) => false,
            PyValue::Tuple(items) => items.iter().all(PyValue::is_hashable),
            _ => true,
        }
    }

    /// Object identity, as tested by `is`.
    pub fn is(&self, other: &PyValue) -> bool {
        match (self, other) {
            (PyValue::None, PyValue::None) => true,
            (PyValue::Bool(a), PyValue::Bool(b)) => a == b,
            (PyValue::Int(a), PyValue::Int(b)) => a == b,
            (PyValue::Float(a), PyValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PyValue::Str(a), PyValue::Str(b)) => a == b,
            (PyValue::List(a), PyValue::List(b)) => Rc::ptr_eq(a, b),
            (PyValue::Tuple(a), PyValue::Tuple(b)) => Rc::ptr_eq(a, b),
            (PyValue::Dict(a), PyValue::Dict(b)) => Rc::ptr_eq(a, b),
            (PyValue::Function(a), PyValue::Function(b)) => Rc::ptr_eq(a, b),
            (PyValue::Native(a), PyValue::Native(b)) => Rc::ptr_eq(a, b),
            (PyValue::Method(a), PyValue::Method(b)) => Rc::ptr_eq(a, b),
            (PyValue::Module(a), PyValue::Module(b)) => Rc::ptr_eq(a, b),
            (PyValue::Object(a), PyValue::Object(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            (PyValue::Iterator(a), PyValue::Iterator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Python's `repr()`.
    pub fn repr(&self) -> String {
        match self {
            PyValue::Str(s) => repr_str(s),
            PyValue::List(items) => {
                let parts: Vec<String> = items.borrow().iter().map(PyValue::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            PyValue::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(PyValue::repr).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            PyValue::Dict(pairs) => {
                let parts: Vec<String> = pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            PyValue::Slice(s) => {
                let bound = |b: Option<i64>| b.map_or("None".to_string(), |v| v.to_string());
                format!(
                    "slice({}, {}, {})",
                    bound(s.start),
                    bound(s.stop),
                    bound(s.step)
                )
            }
            PyValue::Function(f) => format!("<function {}>", f.name()),
            PyValue::Native(f) => format!("<built-in function {}>", f.name),
            PyValue::Method(m) => {
                format!("<bound method {}.{}>", m.receiver.type_name(), m.name)
            }
            PyValue::Module(m) => format!("<module '{}'>", m.name),
            PyValue::Object(obj) => obj.repr(),
            PyValue::Iterator(_) => "<iterator>".to_string(),
            PyValue::Float(f) => float_repr(*f),
            other => other.to_string(),
        }
    }
}

/// `str()` of a float: twelve significant digits, like `%.12g`.
fn float_str(f: f64) -> String {
    if !f.is_finite() {
        return non_finite(f);
    }
    let sci = format!("{:.11e}", f);
    let (mantissa, exp) = split_exponent(&sci);
    let text = if !(-4..12).contains(&exp) {
        exponent_form(trim_fraction(mantissa), exp)
    } else {
        let decimals = usize::try_from(11 - exp).unwrap_or(0);
        trim_fraction(&format!("{:.*}", decimals, f)).to_string()
    };
    with_point(text)
}

/// `repr()` of a float: the shortest text that reads back to the same value.
fn float_repr(f: f64) -> String {
    if !f.is_finite() {
        return non_finite(f);
    }
    let shortest = format!("{:e}", f);
    let (mantissa, exp) = split_exponent(&shortest);
    if !(-4..16).contains(&exp) {
        return exponent_form(mantissa, exp);
    }
    with_point(f.to_string())
}

fn non_finite(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

/// Split Rust's `{:e}` output into mantissa and decimal exponent.
fn split_exponent(sci: &str) -> (&str, i32) {
    match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse().unwrap_or(0)),
        None => (sci, 0),
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

/// `1.5e-07`: signed exponent of at least two digits.
fn exponent_form(mantissa: &str, exp: i32) -> String {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exp.unsigned_abs())
}

/// Integral floats keep a trailing `.0` so they read back as floats.
fn with_point(mut text: String) -> String {
    if !text.contains(['.', 'e']) {
        text.push_str(".0");
    }
    text
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python's `str()`.
impl fmt::Display for PyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PyValue::None => write!(f, "None"),
            PyValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            PyValue::Int(i) => write!(f, "{}", i),
            PyValue::Float(fl) => write!(f, "{}", float_str(*fl)),
            PyValue::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

impl fmt::Debug for PyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl PartialEq for PyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PyValue::None, PyValue::None) => true,
            (PyValue::Str(a), PyValue::Str(b)) => a == b,
            (PyValue::List(a), PyValue::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (PyValue::Tuple(a), PyValue::Tuple(b)) => a == b,
            (PyValue::Dict(a), PyValue::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (PyValue::Slice(a), PyValue::Slice(b)) => a == b,
            (
                PyValue::Bool(_) | PyValue::Int(_) | PyValue::Float(_),
                PyValue::Bool(_) | PyValue::Int(_) | PyValue::Float(_),
            ) => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => a == b,
                _ => self.as_float() == other.as_float(),
            },
            _ => self.is(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for PyValue {
    fn from(b: bool) -> Self {
        PyValue::Bool(b)
    }
}

impl From<i64> for PyValue {
    fn from(i: i64) -> Self {
        PyValue::Int(i)
    }
}

impl From<i32> for PyValue {
    fn from(i: i32) -> Self {
        PyValue::Int(i as i64)
    }
}

impl From<usize> for PyValue {
    fn from(i: usize) -> Self {
        PyValue::Int(i as i64)
    }
}

impl From<f64> for PyValue {
    fn from(f: f64) -> Self {
        PyValue::Float(f)
    }
}

impl From<String> for PyValue {
    fn from(s: String) -> Self {
        PyValue::Str(s)
    }
}

impl From<&str> for PyValue {
    fn from(s: &str) -> Self {
        PyValue::Str(s.to_string())
    }
}

impl<T: Into<PyValue>> From<Vec<T>> for PyValue {
    fn from(v: Vec<T>) -> Self {
        PyValue::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PyValue>> From<Option<T>> for PyValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(PyValue::None, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_str_and_repr() {
        let value = PyValue::list(vec![
            PyValue::Int(1),
            PyValue::Float(2.0),
            PyValue::from("it's"),
            PyValue::tuple(vec![PyValue::None]),
        ]);
        assert_eq!(value.repr(), r#"[1, 2.0, "it's", (None,)]"#);
        assert_eq!(PyValue::from("a\nb").to_string(), "a\nb");
        assert_eq!(PyValue::from("a\nb").repr(), "'a\\nb'");
        assert_eq!(PyValue::Float(0.5).to_string(), "0.5");
    }

    #[test]
    fn test_float_text() {
        let str_of = |f: f64| PyValue::Float(f).to_string();
        assert_eq!(str_of(1e100), "1e+100");
        assert_eq!(str_of(1.5e-7), "1.5e-07");
        assert_eq!(str_of(0.0001), "0.0001");
        assert_eq!(str_of(100.0), "100.0");
        assert_eq!(str_of(-0.0), "-0.0");
        assert_eq!(str_of(0.1 + 0.2), "0.3");
        assert_eq!(str_of(123456789012.0), "123456789012.0");
        assert_eq!(str_of(1234567890123.0), "1.23456789012e+12");
        assert_eq!(str_of(f64::NEG_INFINITY), "-inf");

        let repr_of = |f: f64| PyValue::Float(f).repr();
        assert_eq!(repr_of(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(repr_of(1e15), "1000000000000000.0");
        assert_eq!(repr_of(1e16), "1e+16");
        assert_eq!(repr_of(1.5e-7), "1.5e-07");
        assert_eq!(repr_of(2.5), "2.5");
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert_eq!(PyValue::Int(1), PyValue::Float(1.0));
        assert_eq!(PyValue::Bool(true), PyValue::Int(1));
        assert!(PyValue::Int(1) != PyValue::from("1"));
    }

    #[test]
    fn test_lists_share_storage() {
        let a = PyValue::list(vec![PyValue::Int(1)]);
        let b = a.clone();
        if let PyValue::List(items) = &b {
            items.borrow_mut().push(PyValue::Int(2));
        }
        assert_eq!(a, PyValue::from(vec![1, 2]));
        assert!(a.is(&b));
        assert!(!a.is(&PyValue::from(vec![1, 2])));
    }

    #[test]
    fn test_list_iterator_sees_appends() {
        let list = Rc::new(RefCell::new(vec![PyValue::Int(1)]));
        let iter = PyIterator::over_list(list.clone());
        assert_eq!(iter.next_value().map(|r| r.ok()), Some(Some(PyValue::Int(1))));
        list.borrow_mut().push(PyValue::Int(2));
        assert_eq!(iter.next_value().map(|r| r.ok()), Some(Some(PyValue::Int(2))));
        assert!(iter.next_value().is_none());
    }

    #[test]
    fn test_namespace_write_modes() {
        let plain = Namespace::new("Thing");
        assert!(plain.guarded_setattr("x", PyValue::Int(1)).is_none());

        let guarded = Namespace::new("Thing").with_mode(WriteMode::Protocol);
        assert!(matches!(guarded.guarded_setattr("x", PyValue::Int(1)), Some(Ok(()))));
        assert_eq!(guarded.attr("x"), Some(PyValue::Int(1)));

        let own = Namespace::new("Thing").with_mode(WriteMode::SelfGuarding);
        assert!(own.guards_own_writes());
    }
}
