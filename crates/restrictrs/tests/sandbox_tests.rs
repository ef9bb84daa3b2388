mod common;

use common::init_test_logging;
use pretty_assertions::assert_eq;
use restrictrs::{
    CallArgs, Error, Limits, ModuleBuilder, Policy, PyValue, Sandbox, compile_restricted_exec,
};

fn list(items: Vec<PyValue>) -> PyValue {
    PyValue::list(items)
}

fn repr(sandbox: &mut Sandbox, source: &str) -> String {
    sandbox.execute(source).unwrap().repr()
}

#[test]
fn test_basic_arithmetic() {
    init_test_logging();
    let mut sandbox = Sandbox::new();

    assert_eq!(sandbox.execute("2 + 2").unwrap(), PyValue::Int(4));
    assert_eq!(sandbox.execute("10 - 3").unwrap(), PyValue::Int(7));
    assert_eq!(sandbox.execute("4 * 5").unwrap(), PyValue::Int(20));
    assert_eq!(sandbox.execute("10 // 3").unwrap(), PyValue::Int(3));
    assert_eq!(sandbox.execute("-7 % 3").unwrap(), PyValue::Int(2));
    assert_eq!(sandbox.execute("2 ** 8").unwrap(), PyValue::Int(256));
}

#[test]
fn test_integer_division_floors() {
    let mut sandbox = Sandbox::new();

    assert_eq!(sandbox.execute("10 / 4").unwrap(), PyValue::Int(2));
    assert_eq!(sandbox.execute("-7 / 2").unwrap(), PyValue::Int(-4));
    assert_eq!(sandbox.execute("10.0 / 4").unwrap(), PyValue::Float(2.5));
}

#[test]
fn test_variables_persist() {
    let mut sandbox = Sandbox::new();

    sandbox.execute("x = 10").unwrap();
    sandbox.execute("y = 20").unwrap();
    assert_eq!(sandbox.execute("x + y").unwrap(), PyValue::Int(30));
    assert_eq!(sandbox.get_variable("y"), Some(PyValue::Int(20)));
}

#[test]
fn test_strings() {
    let mut sandbox = Sandbox::new();

    assert_eq!(
        sandbox.execute("'hello' + ' ' + 'world'").unwrap(),
        PyValue::from("hello world")
    );
    assert_eq!(sandbox.execute("'ab' * 3").unwrap(), PyValue::from("ababab"));
    assert_eq!(
        sandbox.execute("'%s has %d items' % ('cart', 3)").unwrap(),
        PyValue::from("cart has 3 items")
    );
    assert_eq!(
        sandbox.execute("'-'.join(['a', 'b', 'c'])").unwrap(),
        PyValue::from("a-b-c")
    );
}

#[test]
fn test_lists_and_indexing() {
    let mut sandbox = Sandbox::new();

    assert_eq!(
        sandbox.execute("[1, 2, 3]").unwrap(),
        list(vec![PyValue::Int(1), PyValue::Int(2), PyValue::Int(3)])
    );
    sandbox.execute("nums = [10, 20, 30, 40]").unwrap();
    assert_eq!(sandbox.execute("nums[0]").unwrap(), PyValue::Int(10));
    assert_eq!(sandbox.execute("nums[-1]").unwrap(), PyValue::Int(40));
    assert_eq!(repr(&mut sandbox, "nums[1:3]"), "[20, 30]");
    assert_eq!(repr(&mut sandbox, "nums[::-2]"), "[40, 20]");

    let err = sandbox.execute("nums[10]").unwrap_err();
    assert_eq!(err.exception_type(), "IndexError");
}

#[test]
fn test_list_mutation() {
    let mut sandbox = Sandbox::new();

    let source = "\
items = [3, 1, 2]
items.append(5)
items[0] = 0
items.sort()
del items[-1]
items
";
    assert_eq!(repr(&mut sandbox, source), "[0, 1, 2]");
}

#[test]
fn test_dicts() {
    let mut sandbox = Sandbox::new();

    sandbox
        .execute("data = {'name': 'Alice', 'age': 30}")
        .unwrap();
    assert_eq!(sandbox.execute("data['name']").unwrap(), PyValue::from("Alice"));
    assert_eq!(sandbox.execute("data.get('missing', 0)").unwrap(), PyValue::Int(0));
    sandbox.execute("data['age'] = 31").unwrap();
    assert_eq!(repr(&mut sandbox, "sorted(data.keys())"), "['age', 'name']");
    assert_eq!(sandbox.execute("data['age']").unwrap(), PyValue::Int(31));

    let err = sandbox.execute("data['nope']").unwrap_err();
    assert!(matches!(err, Error::KeyError(key) if key == "'nope'"));
}

#[test]
fn test_tuples_and_unpacking() {
    let mut sandbox = Sandbox::new();

    let source = "\
a, b = 1, 2
a, b = b, a
(c, d), e = (3, 4), 5
[a, b, c, d, e]
";
    assert_eq!(repr(&mut sandbox, source), "[2, 1, 3, 4, 5]");
    assert_eq!(repr(&mut sandbox, "(1,)"), "(1,)");
}

#[test]
fn test_comparisons() {
    let mut sandbox = Sandbox::new();

    assert_eq!(sandbox.execute("5 > 3").unwrap(), PyValue::Bool(true));
    assert_eq!(sandbox.execute("5 < 3").unwrap(), PyValue::Bool(false));
    assert_eq!(sandbox.execute("5 != 3").unwrap(), PyValue::Bool(true));
    assert_eq!(sandbox.execute("1 < 2 < 3").unwrap(), PyValue::Bool(true));
    assert_eq!(sandbox.execute("3 > 2 > 2").unwrap(), PyValue::Bool(false));
    assert_eq!(sandbox.execute("'a' in 'abc'").unwrap(), PyValue::Bool(true));
    assert_eq!(sandbox.execute("4 not in [1, 2]").unwrap(), PyValue::Bool(true));
    assert_eq!(sandbox.execute("None is None").unwrap(), PyValue::Bool(true));
}

#[test]
fn test_boolean_ops_short_circuit() {
    let mut sandbox = Sandbox::new();

    assert_eq!(sandbox.execute("True and False").unwrap(), PyValue::Bool(false));
    assert_eq!(sandbox.execute("0 or 'x'").unwrap(), PyValue::from("x"));
    assert_eq!(sandbox.execute("[] and undefined").unwrap(), list(vec![]));
    assert_eq!(sandbox.execute("not 0").unwrap(), PyValue::Bool(true));
}

#[test]
fn test_if_statement() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
x = 10
if x > 50:
    result = 'huge'
elif x > 5:
    result = 'big'
else:
    result = 'small'
result
"#,
        )
        .unwrap();
    assert_eq!(result, PyValue::from("big"));
}

#[test]
fn test_ternary_expression() {
    let mut sandbox = Sandbox::new();

    assert_eq!(
        sandbox.execute("'yes' if 3 > 2 else 'no'").unwrap(),
        PyValue::from("yes")
    );
}

#[test]
fn test_loops() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
total = 0
for i in range(5):
    total += i
n = 0
while n < 3:
    n += 1
total * 10 + n
"#,
        )
        .unwrap();
    assert_eq!(result, PyValue::Int(103));
}

#[test]
fn test_break_continue_and_else() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
found = []
for i in range(10):
    if i % 2:
        continue
    if i > 6:
        break
    found.append(i)
else:
    found.append('no break')
for j in []:
    pass
else:
    found.append('empty')
found
"#,
        )
        .unwrap();
    assert_eq!(result.repr(), "[0, 2, 4, 6, 'empty']");
}

#[test]
fn test_break_in_nested_loops() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
pairs = []
for i in range(3):
    for j in range(3):
        if j > i:
            break
        pairs.append((i, j))
len(pairs)
"#,
        )
        .unwrap();
    assert_eq!(result, PyValue::Int(6));
}

#[test]
fn test_comprehensions() {
    let mut sandbox = Sandbox::new();

    assert_eq!(
        repr(&mut sandbox, "[x * x for x in range(5) if x % 2 == 0]"),
        "[0, 4, 16]"
    );
    assert_eq!(
        repr(&mut sandbox, "[(a, b) for a in 'ab' for b in [1, 2]]"),
        "[('a', 1), ('a', 2), ('b', 1), ('b', 2)]"
    );
    assert_eq!(
        repr(&mut sandbox, "{k: len(k) for k in ['one', 'three']}"),
        "{'one': 3, 'three': 5}"
    );
    assert_eq!(sandbox.execute("sum(x for x in [1, 2, 3])").unwrap(), PyValue::Int(6));
}

#[test]
fn test_functions() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
def greet(name, greeting='Hello'):
    return greeting + ', ' + name
def nothing():
    pass
[greet('Bob'), greet('Ann', greeting='Hi'), nothing()]
"#,
        )
        .unwrap();
    assert_eq!(result.repr(), "['Hello, Bob', 'Hi, Ann', None]");
}

#[test]
fn test_function_scope_isolation() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
x = 1
def f():
    x = 2
    return x
f() + x
"#,
        )
        .unwrap();
    assert_eq!(result, PyValue::Int(3));
}

#[test]
fn test_global_declaration() {
    let mut sandbox = Sandbox::new();

    sandbox
        .execute("count = 0\ndef bump():\n    global count\n    count += 1\nbump()\nbump()\n")
        .unwrap();
    assert_eq!(sandbox.get_variable("count"), Some(PyValue::Int(2)));
}

#[test]
fn test_assigned_name_is_local_to_the_whole_function() {
    let mut sandbox = Sandbox::new();

    sandbox
        .execute("x = 1\ndef f():\n    y = x\n    x = 2\n    return y\n")
        .unwrap();
    let err = sandbox.execute("f()").unwrap_err();
    assert_eq!(err.exception_type(), "UnboundLocalError");
    assert_eq!(
        err.to_string(),
        "UnboundLocalError: local variable 'x' referenced before assignment"
    );

    let result = sandbox
        .execute(
            r#"
def g():
    try:
        total += 1
    except NameError:
        total = 10
    return total
def h():
    return x + 1
[g(), h()]
"#,
        )
        .unwrap();
    assert_eq!(result, list(vec![PyValue::Int(10), PyValue::Int(2)]));
}

#[test]
fn test_recursive_function() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)
fib(15)
"#,
        )
        .unwrap();
    assert_eq!(result, PyValue::Int(610));
}

#[test]
fn test_lambda_and_closures() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
def make_adder(n):
    return lambda x: x + n
add3 = make_adder(3)
sorted(['ccc', 'a', 'bb'], key=lambda s: len(s)) + [add3(4)]
"#,
        )
        .unwrap();
    assert_eq!(result.repr(), "['a', 'bb', 'ccc', 7]");
}

#[test]
fn test_varargs_and_kwargs() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
def f(a, *args, **kwargs):
    return [a, args, sorted(kwargs.items())]
f(1, 2, 3, y=2, x=1)
"#,
        )
        .unwrap();
    assert_eq!(result.repr(), "[1, (2, 3), [('x', 1), ('y', 2)]]");
}

#[test]
fn test_argument_errors() {
    let mut sandbox = Sandbox::new();
    sandbox.execute("def f(a, b=1):\n    return a\n").unwrap();

    let err = sandbox.execute("f()").unwrap_err();
    assert_eq!(err.exception_message(), "f() takes at least 1 argument (0 given)");
    let err = sandbox.execute("f(1, 2, 3)").unwrap_err();
    assert_eq!(err.exception_message(), "f() takes at most 2 arguments (3 given)");
    let err = sandbox.execute("f(1, a=2)").unwrap_err();
    assert_eq!(
        err.exception_message(),
        "f() got multiple values for keyword argument 'a'"
    );
    let err = sandbox.execute("f(1, c=2)").unwrap_err();
    assert_eq!(
        err.exception_message(),
        "f() got an unexpected keyword argument 'c'"
    );
}

#[test]
fn test_try_except() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
log = []
try:
    1 / 0
except ZeroDivisionError:
    log.append('zero')
try:
    {}['k']
except (IndexError, KeyError) as e:
    log.append('lookup ' + e)
try:
    int('x')
except LookupError:
    log.append('wrong')
except Exception:
    log.append('any')
try:
    pass
except ValueError:
    log.append('never')
else:
    log.append('else')
log
"#,
        )
        .unwrap();
    assert_eq!(result.repr(), "['zero', \"lookup 'k'\", 'any', 'else']");
}

#[test]
fn test_raise_and_reraise() {
    let mut sandbox = Sandbox::new();

    let err = sandbox
        .execute(
            r#"
try:
    raise ValueError('bad value')
except ValueError:
    raise
"#,
        )
        .unwrap_err();
    assert!(matches!(err, Error::ValueError(ref m) if m == "bad value"));

    let err = sandbox.execute("raise CustomError, 'boom'").unwrap_err();
    assert_eq!(err.exception_type(), "CustomError");
    assert_eq!(err.to_string(), "CustomError: boom");
}

#[test]
fn test_uncaught_type_mismatch_propagates() {
    let mut sandbox = Sandbox::new();

    let err = sandbox
        .execute("try:\n    1 / 0\nexcept KeyError:\n    pass\n")
        .unwrap_err();
    assert!(matches!(err, Error::DivisionByZero));
}

#[test]
fn test_assert() {
    let mut sandbox = Sandbox::new();

    assert_eq!(sandbox.execute("assert 1 == 1").unwrap(), PyValue::None);
    let err = sandbox.execute("assert 1 == 2, 'math broke'").unwrap_err();
    assert!(matches!(err, Error::AssertionError(ref m) if m == "math broke"));
}

#[test]
fn test_undefined_variable() {
    let mut sandbox = Sandbox::new();

    let err = sandbox.execute("undefined_name + 1").unwrap_err();
    assert_eq!(err.to_string(), "NameError: name 'undefined_name' is not defined");
}

#[test]
fn test_division_by_zero() {
    let mut sandbox = Sandbox::new();

    let err = sandbox.execute("1 / 0").unwrap_err();
    assert!(matches!(err, Error::DivisionByZero));
}

#[test]
fn test_builtins() {
    let mut sandbox = Sandbox::new();

    assert_eq!(sandbox.execute("len([1, 2, 3])").unwrap(), PyValue::Int(3));
    assert_eq!(sandbox.execute("abs(-4)").unwrap(), PyValue::Int(4));
    assert_eq!(sandbox.execute("max([3, 9, 2])").unwrap(), PyValue::Int(9));
    assert_eq!(sandbox.execute("min(3, 9, 2)").unwrap(), PyValue::Int(2));
    assert_eq!(sandbox.execute("int('42')").unwrap(), PyValue::Int(42));
    assert_eq!(sandbox.execute("str(1.5)").unwrap(), PyValue::from("1.5"));
    assert_eq!(sandbox.execute("round(2.5)").unwrap(), PyValue::Float(3.0));
    assert_eq!(repr(&mut sandbox, "list(range(0, 10, 3))"), "[0, 3, 6, 9]");
    assert_eq!(repr(&mut sandbox, "zip([1, 2], 'ab')"), "[(1, 'a'), (2, 'b')]");
    assert_eq!(repr(&mut sandbox, "list(enumerate('ab'))"), "[(0, 'a'), (1, 'b')]");
    assert_eq!(repr(&mut sandbox, "map(lambda x: x * 2, [1, 2])"), "[2, 4]");
    assert_eq!(
        sandbox.execute("isinstance(1, int)").unwrap(),
        PyValue::Bool(true)
    );
    assert_eq!(sandbox.execute("test(0, 'a', 'b')").unwrap(), PyValue::from("b"));
}

#[test]
fn test_policy_controls_builtins() {
    let mut sandbox = Sandbox::with_policy(Policy::safe());

    assert_eq!(sandbox.execute("len('abc')").unwrap(), PyValue::Int(3));
    let err = sandbox.execute("sorted([2, 1])").unwrap_err();
    assert!(matches!(err, Error::NameError(name) if name == "sorted"));

    let mut sandbox = Sandbox::with_policy(Policy::standard().deny("len"));
    assert!(sandbox.execute("len('abc')").is_err());
}

#[test]
fn test_imports() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
import math
from json import dumps, loads
from string import capwords as cap
[math.floor(2.7), dumps({'a': [1, None]}), loads('[1, 2]'), cap('hello world')]
"#,
        )
        .unwrap();
    assert_eq!(
        result.repr(),
        "[2.0, '{\"a\": [1, null]}', [1, 2], 'Hello World']"
    );

    let err = sandbox.execute("import os").unwrap_err();
    assert_eq!(err.to_string(), "ImportError: No module named os");
    let err = sandbox.execute("from math import nothing").unwrap_err();
    assert_eq!(err.exception_type(), "ImportError");
}

#[test]
fn test_register_module() {
    let mut sandbox = Sandbox::new();

    let mut builder = ModuleBuilder::new("units");
    builder
        .constant("METER", 100)
        .function("to_cm", |_vm, args| {
            let meters = args.get(0).and_then(PyValue::as_float).unwrap_or(0.0);
            Ok(PyValue::Float(meters * 100.0))
        });
    sandbox.register_module("units", builder.build());

    let result = sandbox
        .execute("import units\nunits.to_cm(2) + units.METER")
        .unwrap();
    assert_eq!(result, PyValue::Float(300.0));
}

#[test]
fn test_register_fn() {
    let mut sandbox = Sandbox::new();

    sandbox.register_fn("double", |_vm, args| {
        args.check_arity("double", 1, 1)?;
        let n = args.args[0].as_int().unwrap_or(0);
        Ok(PyValue::Int(n * 2))
    });
    sandbox.register_fn("lookup", |_vm, args| {
        let key = args.kwarg("key").cloned().unwrap_or(PyValue::None);
        Ok(PyValue::dict(vec![(PyValue::from("key"), key)]))
    });

    assert_eq!(sandbox.execute("double(21)").unwrap(), PyValue::Int(42));
    assert_eq!(
        sandbox.execute("lookup(key='k')['key']").unwrap(),
        PyValue::from("k")
    );
    let err = sandbox.execute("double(1, 2)").unwrap_err();
    assert_eq!(err.exception_type(), "TypeError");
}

#[test]
fn test_native_fn_calls_back_into_restricted_code() {
    let mut sandbox = Sandbox::new();

    sandbox.register_fn("twice", |vm, args| {
        let f = args.args[0].clone();
        let once = vm.call(&f, CallArgs::new(vec![args.args[1].clone()]))?;
        vm.call(&f, CallArgs::new(vec![once]))
    });
    let result = sandbox
        .execute("def inc(x):\n    return x + 1\ntwice(inc, 5)")
        .unwrap();
    assert_eq!(result, PyValue::Int(7));
}

#[test]
fn test_define_and_call_function() {
    let mut sandbox = Sandbox::new();

    sandbox
        .define_function("items", "'Totals a list.'\nreturn sum(items)", "total", None)
        .unwrap();
    let result = sandbox.call("total", vec![PyValue::from(vec![1, 2, 3])]).unwrap();
    assert_eq!(result, PyValue::Int(6));

    let PyValue::Function(f) = sandbox.get_variable("total").unwrap() else {
        panic!("expected a function");
    };
    assert_eq!(f.doc(), Some("Totals a list."));

    sandbox
        .define_function("", "hits += 1", "hit", Some(&["hits"]))
        .unwrap();
    sandbox.set_variable("hits", 0);
    sandbox.call("hit", vec![]).unwrap();
    sandbox.call("hit", vec![]).unwrap();
    assert_eq!(sandbox.get_variable("hits"), Some(PyValue::Int(2)));

    let err = sandbox.call("missing", vec![]).unwrap_err();
    assert!(matches!(err, Error::NameError(_)));
}

#[test]
fn test_call_with_keywords() {
    let mut sandbox = Sandbox::new();

    sandbox
        .execute("def scale(x, factor=2):\n    return x * factor\n")
        .unwrap();
    let args = CallArgs::with_kwargs(
        vec![PyValue::Int(5)],
        vec![("factor".to_string(), PyValue::Int(3))],
    );
    assert_eq!(sandbox.call_with("scale", args).unwrap(), PyValue::Int(15));
}

#[test]
fn test_print_output() {
    let mut sandbox = Sandbox::new();

    let output = sandbox
        .execute_with_output("for i in range(3):\n    print i,\nprint\nprint 'done', 1.5\n")
        .unwrap();
    assert_eq!(output.printed, "0 1 2\ndone 1.5\n");
    assert_eq!(output.lines(), vec!["0 1 2", "done 1.5"]);
    assert_eq!(output.result, PyValue::None);

    let output = sandbox.execute_with_output("x = 1").unwrap();
    assert!(!output.has_output());
}

#[test]
fn test_trailing_comma_separates_before_next_item() {
    let mut sandbox = Sandbox::new();

    let output = sandbox
        .execute_with_output("for ch in 'abc':\n    print ch,\n")
        .unwrap();
    assert_eq!(output.printed, "a b c");

    let output = sandbox
        .execute_with_output("print 'x\\n',\nprint 'y',\nprint 1e100, 1.5e-7\n")
        .unwrap();
    assert_eq!(output.printed, "x\ny 1e+100 1.5e-07\n");
}

#[test]
fn test_printed_inside_function() {
    let mut sandbox = Sandbox::new();

    let result = sandbox
        .execute(
            r#"
def report(items):
    for item in items:
        print '-', item
    return printed
report(['a', 'b'])
"#,
        )
        .unwrap();
    assert_eq!(result, PyValue::from("- a\n- b\n"));
}

#[test]
fn test_print_to_explicit_target() {
    let mut sandbox = Sandbox::new();

    let err = sandbox.execute("print >> 5, 'x'").unwrap_err();
    assert_eq!(err.exception_type(), "AttributeError");
}

#[test]
fn test_restricted_source_is_rejected() {
    let mut sandbox = Sandbox::new();

    let err = sandbox.execute("x = ().__class__").unwrap_err();
    let Error::Restriction(restriction) = err else {
        panic!("expected a restriction error");
    };
    assert_eq!(
        restriction.errors,
        vec!["Line 1: \"__class__\" is an invalid attribute name because it starts with \"_\"."]
    );
    // Nothing ran.
    assert_eq!(sandbox.get_variable("x"), None);
}

#[test]
fn test_run_precompiled_unit() {
    let unit = compile_restricted_exec("count = count + 1\n").unwrap();
    let mut sandbox = Sandbox::new();
    sandbox.set_variable("count", 0);
    for _ in 0..3 {
        sandbox.run(&unit).unwrap();
    }
    assert_eq!(sandbox.get_variable("count"), Some(PyValue::Int(3)));
}

#[test]
fn test_eval_expression() {
    let mut sandbox = Sandbox::new();

    sandbox.set_variable("rate", 0.5);
    assert_eq!(sandbox.eval("rate * 4").unwrap(), PyValue::Float(2.0));
    assert!(matches!(sandbox.eval("y = 1"), Err(Error::Syntax(_))));
}

// ============================================================================
// Resource limits
// ============================================================================

#[test]
fn test_instruction_limit_infinite_loop() {
    let mut sandbox = Sandbox::new();
    sandbox.set_limits(Limits {
        max_instructions: Some(1_000),
        ..Default::default()
    });

    let err = sandbox.execute("while True: pass").unwrap_err();
    assert!(err.to_string().contains("Instruction limit"));
}

#[test]
fn test_instruction_budget_resets_per_run() {
    let mut sandbox = Sandbox::new();
    sandbox.set_limits(Limits {
        max_instructions: Some(2_000),
        ..Default::default()
    });

    for _ in 0..5 {
        let result = sandbox.execute("total = 0\nfor i in range(100):\n    total += i\ntotal");
        assert_eq!(result.unwrap(), PyValue::Int(4950));
    }
}

#[test]
fn test_recursion_limit() {
    let mut sandbox = Sandbox::new();
    sandbox.set_limits(Limits {
        max_recursion_depth: 10,
        ..Default::default()
    });

    let err = sandbox
        .execute(
            r#"
def recurse(n):
    return recurse(n + 1)
recurse(0)
"#,
        )
        .unwrap_err();
    assert!(err.to_string().contains("Recursion limit"));

    let result = sandbox
        .execute("def fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\nfact(5)")
        .unwrap();
    assert_eq!(result, PyValue::Int(120));
}

#[test]
fn test_resource_limit_uncatchable() {
    let mut sandbox = Sandbox::new();
    sandbox.set_limits(Limits {
        max_instructions: Some(500),
        ..Default::default()
    });

    let err = sandbox
        .execute("try:\n    while True:\n        pass\nexcept Exception:\n    pass\n")
        .unwrap_err();
    assert!(matches!(err, Error::InstructionLimitExceeded(500)));
}

#[test]
fn test_sequence_limit() {
    let mut sandbox = Sandbox::new();
    sandbox.set_limits(Limits {
        max_sequence_len: 100,
        ..Default::default()
    });

    assert!(sandbox.execute("range(50)").is_ok());
    assert!(sandbox.execute("range(1000)").is_err());
    assert!(sandbox.execute("[0] * 1000").is_err());
    assert!(sandbox.execute("'x' * 1000").is_err());
}
