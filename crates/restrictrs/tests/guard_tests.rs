mod common;

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use common::init_test_logging;
use pretty_assertions::assert_eq;
use restrictrs::{
    CallArgs, Error, Guard, Namespace, PrintCollector, PyIterator, PyObject, PyValue, Result,
    Sandbox, WriteMode, compile_restricted_exec,
};

type Log = Rc<RefCell<Vec<String>>>;

/// Records every write made through it.
struct Recorder {
    log: Log,
}

impl PyObject for Recorder {
    fn type_name(&self) -> &str {
        "Recorder"
    }

    fn set_attr(&self, name: &str, value: PyValue) -> Result<()> {
        self.log.borrow_mut().push(format!("{} = {}", name, value.repr()));
        Ok(())
    }

    fn set_item(&self, key: &PyValue, value: PyValue) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("[{}] = {}", key.repr(), value.repr()));
        Ok(())
    }

    fn del_item(&self, key: &PyValue) -> Result<()> {
        self.log.borrow_mut().push(format!("del [{}]", key.repr()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A sized host object that takes item writes through the write protocol.
struct Tape {
    log: Log,
}

impl PyObject for Tape {
    fn type_name(&self) -> &str {
        "Tape"
    }

    fn len(&self) -> Option<usize> {
        Some(5)
    }

    fn guarded_setitem(&self, key: &PyValue, value: PyValue) -> Option<Result<()>> {
        self.log
            .borrow_mut()
            .push(format!("[{}] = {}", key.repr(), value.repr()));
        Some(Ok(()))
    }

    fn guarded_delitem(&self, key: &PyValue) -> Option<Result<()>> {
        self.log.borrow_mut().push(format!("del [{}]", key.repr()));
        Some(Ok(()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn nested(inner_mode: WriteMode) -> PyValue {
    let b = Namespace::new("B").with_mode(inner_mode).into_value();
    Namespace::new("A").with_attr("b", b).into_value()
}

#[test]
fn test_nested_write_with_protocol_succeeds() {
    init_test_logging();
    let unit = compile_restricted_exec("a.b.c = 5").unwrap();
    let mut sandbox = Sandbox::new();
    let a = nested(WriteMode::Protocol);
    sandbox.set_variable("a", a.clone());
    sandbox.run(&unit).unwrap();

    let value = sandbox.execute("a.b.c").unwrap();
    assert_eq!(value, PyValue::Int(5));
}

#[test]
fn test_nested_write_without_protocol_fails() {
    init_test_logging();
    let unit = compile_restricted_exec("a.b.c = 5").unwrap();
    let mut sandbox = Sandbox::new();
    sandbox.set_variable("a", nested(WriteMode::Unguarded));
    let err = sandbox.run(&unit).unwrap_err();
    assert!(matches!(&err, Error::TypeError(_)));
    assert!(err.to_string().contains("attribute-less object"));
}

#[test]
fn test_item_write_without_protocol_fails() {
    let mut sandbox = Sandbox::new();
    sandbox.set_variable("ns", Namespace::new("Plain").into_value());
    let err = sandbox.execute("ns['k'] = 1").unwrap_err();
    assert_eq!(
        err.exception_message(),
        "object does not support item or slice assignment"
    );
    let err = sandbox.execute("del ns['k']").unwrap_err();
    assert_eq!(
        err.exception_message(),
        "object does not support item or slice assignment"
    );

    sandbox.set_variable("t", PyValue::tuple(vec![PyValue::Int(1)]));
    assert!(matches!(
        sandbox.execute("t[0] = 2"),
        Err(Error::TypeError(_))
    ));
}

#[test]
fn test_self_guarding_objects_are_written_directly() {
    let mut sandbox = Sandbox::new();
    let ns = Namespace::new("Own").with_mode(WriteMode::SelfGuarding).into_value();
    sandbox.set_variable("ns", ns.clone());
    sandbox.execute("ns.x = 1\nns['y'] = 2").unwrap();
    let inner = ns.downcast_ref::<Namespace>().unwrap();
    assert_eq!(inner.attr("x"), Some(PyValue::Int(1)));
    assert_eq!(inner.item(&PyValue::from("y")), Some(PyValue::Int(2)));
}

#[test]
fn test_custom_getiter_stops_loop() {
    init_test_logging();
    let mut sandbox = Sandbox::new();
    sandbox.set_guard(
        Guard::GetIter,
        PyValue::native("_getiter_", |vm, args| {
            let items = vm.collect_items(&args.args[0])?;
            let iter = items.into_iter().map(|item| {
                if item == PyValue::Int(1) {
                    Err(Error::raised("ValueError", "item 1 is refused"))
                } else {
                    Ok(item)
                }
            });
            Ok(PyValue::iterator(PyIterator::new(iter)))
        }),
    );

    let err = sandbox
        .execute("for i in range(3): print(i)")
        .unwrap_err();
    assert_eq!(err.exception_message(), "item 1 is refused");

    // The loop body ran for item 0 only.
    let collector = sandbox.get_variable("_print").unwrap();
    let text = collector.downcast_ref::<PrintCollector>().unwrap().text();
    assert_eq!(text, "0\n");
}

#[test]
fn test_getattr_receives_object_and_name() {
    let calls: Log = Rc::default();
    let mut sandbox = Sandbox::new();
    let seen = Rc::clone(&calls);
    sandbox.set_guard(
        Guard::GetAttr,
        PyValue::native("_getattr_", move |vm, args| {
            let name = args.args[1].as_str().unwrap_or_default().to_string();
            seen.borrow_mut()
                .push(format!("{} {}", args.args[0].type_name(), name));
            vm.get_attr(&args.args[0], &name)
        }),
    );

    let value = sandbox.execute("'abc'.upper()").unwrap();
    assert_eq!(value, PyValue::from("ABC"));
    assert_eq!(*calls.borrow(), vec!["str upper"]);
}

#[test]
fn test_denying_getattr_blocks_all_attribute_reads() {
    let mut sandbox = Sandbox::new();
    sandbox.set_guard(
        Guard::GetAttr,
        PyValue::native("_getattr_", |_vm, args| {
            Err(Error::raised(
                "Unauthorized",
                format!("access to {} denied", args.args[1]),
            ))
        }),
    );
    let err = sandbox.execute("[].append").unwrap_err();
    assert_eq!(err.exception_type(), "Unauthorized");
    assert_eq!(err.exception_message(), "access to append denied");

    sandbox.reset_guard(Guard::GetAttr);
    assert!(sandbox.execute("[].append").unwrap().is_callable());
}

#[test]
fn test_writes_route_through_write_guard() {
    let log: Log = Rc::default();
    let mut sandbox = Sandbox::new();
    let recorder = PyValue::object(Recorder {
        log: Rc::clone(&log),
    });
    sandbox.set_guard(
        Guard::Write,
        PyValue::native("_write_", move |_vm, _args| Ok(recorder.clone())),
    );

    sandbox
        .execute("d = {}\nd['k'] = 1\nd.attr = 2\ndel d[0]\nd[1:2] = [3]\n")
        .unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "['k'] = 1",
            "attr = 2",
            "del [0]",
            "[slice(1, 2, None)] = [3]",
        ]
    );
    // The real dict was never written.
    assert_eq!(sandbox.execute("len(d)").unwrap(), PyValue::Int(0));
}

#[test]
fn test_negative_slice_writes_count_from_host_length() {
    let log: Log = Rc::default();
    let mut sandbox = Sandbox::new();
    sandbox.set_variable("t", PyValue::object(Tape { log: Rc::clone(&log) }));

    sandbox
        .execute("t[-2:] = [9]\ndel t[1:-1]\nt[-1] = 0\nt[::-1] = []\n")
        .unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "[slice(3, None, None)] = [9]",
            "del [slice(1, 4, None)]",
            "[-1] = 0",
            "[slice(None, None, -1)] = []",
        ]
    );
}

#[test]
fn test_getitem_guard_sees_full_slices() {
    let keys: Log = Rc::default();
    let mut sandbox = Sandbox::new();
    let seen = Rc::clone(&keys);
    sandbox.set_guard(
        Guard::GetItem,
        PyValue::native("_getitem_", move |vm, args| {
            seen.borrow_mut().push(args.args[1].repr());
            vm.get_item(&args.args[0], &args.args[1])
        }),
    );
    let value = sandbox.execute("s = 'hello'\ns[1:] + s[0]").unwrap();
    assert_eq!(value, PyValue::from("elloh"));
    assert_eq!(*keys.borrow(), vec!["slice(1, None, None)", "0"]);
}

#[test]
fn test_star_calls_use_apply_guard() {
    let count = Rc::new(RefCell::new(0));
    let mut sandbox = Sandbox::new();
    let seen = Rc::clone(&count);
    sandbox.set_guard(
        Guard::Apply,
        PyValue::native("_apply_", move |vm, mut args: CallArgs| {
            *seen.borrow_mut() += 1;
            let func = args.args.remove(0);
            vm.call(&func, args)
        }),
    );
    let source = "\
def f(a, b, c=0):
    return a + b + c
args = [1, 2]
kw = {'c': 10}
f(*args, **kw)
";
    assert_eq!(sandbox.execute(source).unwrap(), PyValue::Int(13));
    assert_eq!(*count.borrow(), 1);
    assert_eq!(sandbox.execute("f(1, 2)").unwrap(), PyValue::Int(3));
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn test_setattr_builtin_uses_write_protocol() {
    let mut sandbox = Sandbox::new();
    let open = Namespace::new("Open").with_mode(WriteMode::Protocol).into_value();
    sandbox.set_variable("open_ns", open);
    sandbox.set_variable("closed_ns", Namespace::new("Closed").into_value());

    sandbox.execute("setattr(open_ns, 'x', 1)").unwrap();
    assert_eq!(sandbox.execute("open_ns.x").unwrap(), PyValue::Int(1));

    let err = sandbox.execute("setattr(closed_ns, 'x', 1)").unwrap_err();
    assert_eq!(err.exception_message(), "attribute-less object (assign or del)");
    let err = sandbox.execute("delattr(closed_ns, 'x')").unwrap_err();
    assert_eq!(err.exception_message(), "attribute-less object (assign or del)");
}

#[test]
fn test_missing_guard_is_a_name_error() {
    let unit = compile_restricted_exec("x = a.b\n").unwrap();
    let mut vm = restrictrs::Vm::new();
    vm.set_global("a", Namespace::new("A").with_attr("b", 1).into_value());
    let err = vm.execute(unit.code()).unwrap_err();
    assert!(matches!(err, Error::NameError(name) if name == "_getattr_"));
}
