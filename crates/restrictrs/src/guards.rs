//! The guard functions restricted code calls into.
//!
//! The restriction pass turns every attribute read, item read, write
//! target, loop iterable and star call into a call to one of the names in
//! [`Guard`]. The defaults here permit ordinary access to builtin values
//! and to host objects that opt in; a host tightens the sandbox by binding
//! its own function under the same name.

use std::any::Any;
use std::cell::{Cell, RefCell};

use crate::error::{Error, Result};
use crate::restriction::{APPLY, GETATTR, GETITEM, GETITER, PRINT_FACTORY, WRITE};
use crate::value::{CallArgs, PyObject, PyValue};
use crate::vm::Vm;

/// A hook the rewritten code calls through a global name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// `_getattr_(obj, name)`
    GetAttr,
    /// `_getitem_(obj, key)`
    GetItem,
    /// `_write_(obj)`, applied to the object of every attribute or item store.
    Write,
    /// `_getiter_(obj)`, applied to every `for` and comprehension iterable.
    GetIter,
    /// `_apply_(func, *args, **kwargs)`, used for star calls.
    Apply,
    /// `_print_()`, the factory for the print collector.
    Print,
}

impl Guard {
    pub const ALL: [Guard; 6] = [
        Guard::GetAttr,
        Guard::GetItem,
        Guard::Write,
        Guard::GetIter,
        Guard::Apply,
        Guard::Print,
    ];

    /// The global name restricted code calls.
    pub fn name(self) -> &'static str {
        match self {
            Guard::GetAttr => GETATTR,
            Guard::GetItem => GETITEM,
            Guard::Write => WRITE,
            Guard::GetIter => GETITER,
            Guard::Apply => APPLY,
            Guard::Print => PRINT_FACTORY,
        }
    }

    /// The permissive default implementation.
    pub fn default_value(self) -> PyValue {
        match self {
            Guard::GetAttr => PyValue::native(GETATTR, |vm, args| {
                args.check_arity("getattr", 2, 3)?;
                let name = args.args[1].as_str().ok_or_else(|| {
                    Error::TypeError("attribute name must be string".to_string())
                })?;
                match (guarded_getattr(vm, &args.args[0], name), args.get(2)) {
                    (Err(Error::AttributeError(_)), Some(default)) => Ok(default.clone()),
                    (result, _) => result,
                }
            }),
            Guard::GetItem => PyValue::native(GETITEM, |vm, args| {
                args.check_arity("getitem", 2, 2)?;
                guarded_getitem(vm, &args.args[0], &args.args[1])
            }),
            Guard::Write => PyValue::native(WRITE, |_vm, args| {
                args.check_arity("write", 1, 1)?;
                Ok(guarded_write(&args.args[0]))
            }),
            Guard::GetIter => PyValue::native(GETITER, |vm, args| {
                args.check_arity("iter", 1, 1)?;
                guarded_iter(vm, &args.args[0])
            }),
            Guard::Apply => PyValue::native(APPLY, |vm, args| guarded_apply(vm, args)),
            Guard::Print => PyValue::native(PRINT_FACTORY, |_vm, args| {
                args.check_arity("print", 0, 0)?;
                Ok(PyValue::object(PrintCollector::default()))
            }),
        }
    }
}

/// `(name, value)` for every default guard.
pub fn default_guards() -> Vec<(&'static str, PyValue)> {
    Guard::ALL
        .iter()
        .map(|g| (g.name(), g.default_value()))
        .collect()
}

/// Unrestricted attribute fetch.
pub fn guarded_getattr(vm: &mut Vm, obj: &PyValue, name: &str) -> Result<PyValue> {
    vm.get_attr(obj, name)
}

/// Unrestricted `obj[key]`.
pub fn guarded_getitem(vm: &mut Vm, obj: &PyValue, key: &PyValue) -> Result<PyValue> {
    vm.get_item(obj, key)
}

/// Plain `iter(obj)`.
pub fn guarded_iter(vm: &mut Vm, obj: &PyValue) -> Result<PyValue> {
    vm.make_iter(obj).map(PyValue::Iterator)
}

/// `func(*args, **kwargs)` where the callee is the first positional.
pub fn guarded_apply(vm: &mut Vm, mut args: CallArgs) -> Result<PyValue> {
    if args.args.is_empty() {
        return Err(Error::TypeError("apply() missing the function to call".to_string()));
    }
    let func = args.args.remove(0);
    vm.call(&func, args)
}

/// Prepare `obj` to be the target of an attribute or item store.
///
/// Lists and dicts are writable as-is, as are host objects that check their
/// own writes. Anything else is wrapped in a [`WriteProxy`].
pub fn guarded_write(obj: &PyValue) -> PyValue {
    match obj {
        PyValue::List(_) | PyValue::Dict(_) => obj.clone(),
        PyValue::Object(o) if o.guards_own_writes() => obj.clone(),
        _ => PyValue::object(WriteProxy::new(obj.clone())),
    }
}

const NO_ATTR_WRITE: &str = "attribute-less object (assign or del)";
const NO_ITEM_WRITE: &str = "object does not support item or slice assignment";

/// Forwards one write to the wrapped object's `guarded_*` protocol.
pub struct WriteProxy {
    target: PyValue,
}

impl WriteProxy {
    pub fn new(target: PyValue) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &PyValue {
        &self.target
    }

    fn protocol(&self) -> Option<&dyn PyObject> {
        match &self.target {
            PyValue::Object(obj) => Some(obj.as_ref()),
            _ => None,
        }
    }

    fn forward<F>(&self, message: &str, write: F) -> Result<()>
    where
        F: FnOnce(&dyn PyObject) -> Option<Result<()>>,
    {
        self.protocol()
            .and_then(write)
            .unwrap_or_else(|| Err(Error::TypeError(message.to_string())))
    }
}

impl PyObject for WriteProxy {
    fn type_name(&self) -> &str {
        self.target.type_name()
    }

    fn set_attr(&self, name: &str, value: PyValue) -> Result<()> {
        self.forward(NO_ATTR_WRITE, |obj| obj.guarded_setattr(name, value))
    }

    fn del_attr(&self, name: &str) -> Result<()> {
        self.forward(NO_ATTR_WRITE, |obj| obj.guarded_delattr(name))
    }

    fn set_item(&self, key: &PyValue, value: PyValue) -> Result<()> {
        self.forward(NO_ITEM_WRITE, |obj| obj.guarded_setitem(key, value))
    }

    fn del_item(&self, key: &PyValue) -> Result<()> {
        self.forward(NO_ITEM_WRITE, |obj| obj.guarded_delitem(key))
    }

    fn len(&self) -> Option<usize> {
        match &self.target {
            PyValue::Str(s) => Some(s.chars().count()),
            PyValue::Tuple(items) => Some(items.len()),
            PyValue::Object(obj) => obj.len(),
            _ => None,
        }
    }

    fn repr(&self) -> String {
        format!("<write proxy for {}>", self.target.repr())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Collects the text of `print` statements.
///
/// `_print_()` makes one per scope; `printed` reads call it for the text.
/// Like a Python 2 file it carries `softspace`, set while a `print x,`
/// line is still open.
#[derive(Default)]
pub struct PrintCollector {
    text: RefCell<String>,
    softspace: Cell<bool>,
}

impl PrintCollector {
    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }
}

impl PyObject for PrintCollector {
    fn type_name(&self) -> &str {
        "PrintCollector"
    }

    fn get_attr(&self, name: &str) -> Option<PyValue> {
        (name == "softspace").then(|| PyValue::Bool(self.softspace.get()))
    }

    fn set_attr(&self, name: &str, value: PyValue) -> Result<()> {
        if name != "softspace" {
            return Err(Error::AttributeError(format!(
                "'PrintCollector' object attribute '{}' is read-only",
                name
            )));
        }
        self.softspace.set(value.is_truthy());
        Ok(())
    }

    fn has_method(&self, name: &str) -> bool {
        name == "write"
    }

    fn call_method(&self, _vm: &mut Vm, name: &str, args: CallArgs) -> Result<PyValue> {
        match name {
            "write" => {
                args.check_arity("write", 1, 1)?;
                self.text.borrow_mut().push_str(&args.args[0].to_string());
                Ok(PyValue::None)
            }
            _ => Err(Error::AttributeError(format!(
                "'PrintCollector' object has no attribute '{}'",
                name
            ))),
        }
    }

    fn call(&self, _vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
        args.check_arity("printed", 0, 0)?;
        Ok(PyValue::Str(self.text()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Namespace, WriteMode};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_passes_containers_through() {
        let list = PyValue::from(vec![1]);
        assert!(guarded_write(&list).is(&list));
        let own = Namespace::new("Own").with_mode(WriteMode::SelfGuarding).into_value();
        assert!(guarded_write(&own).is(&own));
        let plain = Namespace::new("Plain").into_value();
        assert!(guarded_write(&plain).downcast_ref::<WriteProxy>().is_some());
    }

    #[test]
    fn test_proxy_refuses_without_protocol() {
        let proxy = WriteProxy::new(Namespace::new("Plain").into_value());
        let err = proxy.set_attr("x", PyValue::Int(1)).unwrap_err();
        assert_eq!(err.exception_message(), NO_ATTR_WRITE);
        let err = proxy.set_item(&PyValue::Int(0), PyValue::Int(1)).unwrap_err();
        assert_eq!(err.exception_message(), NO_ITEM_WRITE);

        let tuple = WriteProxy::new(PyValue::tuple(vec![PyValue::None]));
        assert!(tuple.del_item(&PyValue::Int(0)).is_err());
        assert_eq!(tuple.len(), Some(1));
    }

    #[test]
    fn test_proxy_forwards_protocol_writes() {
        let target = Namespace::new("Thing").with_mode(WriteMode::Protocol).into_value();
        let proxy = WriteProxy::new(target.clone());
        proxy.set_attr("x", PyValue::Int(7)).unwrap();
        let ns = target.downcast_ref::<Namespace>().unwrap();
        assert_eq!(ns.attr("x"), Some(PyValue::Int(7)));
    }

    #[test]
    fn test_print_collector() {
        let mut vm = Vm::new();
        let collector = PyValue::object(PrintCollector::default());
        let write = vm.get_attr(&collector, "write").unwrap();
        vm.call(&write, CallArgs::new(vec!["hi\n".into()])).unwrap();
        assert_eq!(
            vm.call(&collector, CallArgs::default()).unwrap(),
            PyValue::from("hi\n")
        );

        assert_eq!(vm.get_attr(&collector, "softspace").unwrap(), PyValue::Bool(false));
        let inner = collector.downcast_ref::<PrintCollector>().unwrap();
        inner.set_attr("softspace", PyValue::Int(1)).unwrap();
        assert_eq!(inner.get_attr("softspace"), Some(PyValue::Bool(true)));
        assert!(inner.set_attr("text", PyValue::None).is_err());
    }
}
