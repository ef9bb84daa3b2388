mod common;

use common::init_test_logging;
use pretty_assertions::assert_eq;
use restrictrs::{
    Error, Mode, PyValue, RestrictedCompiler, Sandbox, compile_restricted,
    compile_restricted_eval, compile_restricted_exec, compile_restricted_function,
};

fn restriction_errors(source: &str) -> Vec<String> {
    match compile_restricted_exec(source) {
        Err(Error::Restriction(err)) => err.errors,
        Err(other) => panic!("expected a restriction error, got {other:?}"),
        Ok(_) => panic!("{source:?} compiled"),
    }
}

#[test]
fn test_print_without_printed_warns() {
    init_test_logging();
    let unit = compile_restricted_exec("x = 1\nprint(x)").unwrap();
    assert!(unit.errors.is_empty());
    assert_eq!(
        unit.warnings,
        vec!["Prints, but never reads 'printed' variable."]
    );
    // `print` is a statement, so only `x` is read.
    assert_eq!(unit.used_names.iter().collect::<Vec<_>>(), vec!["x"]);
}

#[test]
fn test_printed_without_print_warns() {
    let unit = compile_restricted_exec("result = printed\n").unwrap();
    assert_eq!(
        unit.warnings,
        vec!["Doesn't print, but reads 'printed' variable."]
    );
}

#[test]
fn test_underscore_assignment_rejected() {
    init_test_logging();
    let errors = restriction_errors("_secret = 5");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Line 1: "));
    assert!(errors[0].contains("_secret"));
}

#[test]
fn test_underscore_names_in_every_binding_position() {
    let cases = [
        ("def f(_p):\n    pass\n", "_p"),
        ("def _f():\n    pass\n", "_f"),
        ("class _C:\n    pass\n", "_C"),
        ("import _thread\n", "_thread"),
        ("import os as _os\n", "_os"),
        ("from m import _x\n", "_x"),
        ("for _i in x:\n    pass\n", "_i"),
        ("f = lambda _a: 1\n", "_a"),
        ("try:\n    pass\nexcept ValueError as _e:\n    pass\n", "_e"),
        ("x = _hidden\n", "_hidden"),
        ("x = a._private\n", "_private"),
        ("a.__class__ = 1\n", "__class__"),
    ];
    for (source, name) in cases {
        let errors = restriction_errors(source);
        assert!(
            errors.iter().any(|e| e.contains(name)),
            "{source:?} produced {errors:?}"
        );
    }
}

#[test]
fn test_bare_underscore_is_allowed() {
    let unit = compile_restricted_exec("_ = 1\nfor _ in [1]:\n    pass\n").unwrap();
    assert!(unit.errors.is_empty());
}

#[test]
fn test_exec_and_yield_always_rejected() {
    let errors = restriction_errors("x = 1\nexec 'x = 2'\ny = x\n");
    assert_eq!(errors, vec!["Line 2: Exec statements are not allowed."]);

    let errors = restriction_errors("def gen():\n    x = 1\n    yield x\n");
    assert_eq!(errors, vec!["Line 3: Yield statements are not allowed."]);
}

#[test]
fn test_augmented_attribute_and_item_targets_rejected() {
    let errors = restriction_errors("a.b += 1\nc[0] += 1\nn = 0\nn += 1\n");
    assert_eq!(
        errors,
        vec![
            "Line 1: Augmented assignment of attributes is not allowed.",
            "Line 2: Augmented assignment of object items and slices is not allowed.",
        ]
    );
}

#[test]
fn test_every_violation_reported() {
    let errors = restriction_errors("_a = 1\nb = c._d\nexec 'x'\n");
    assert_eq!(errors.len(), 3);
    assert!(errors[0].starts_with("Line 1: "));
    assert!(errors[1].starts_with("Line 2: "));
    assert!(errors[2].starts_with("Line 3: "));
}

#[test]
fn test_syntax_error_comes_before_restriction() {
    let err = compile_restricted("_a = (\n", "bad.py", Mode::Exec).unwrap_err();
    let Error::Syntax(syntax) = err else {
        panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(syntax.filename, "bad.py");
    assert!(syntax.line >= 1);
}

#[test]
fn test_compiling_twice_gives_identical_units() {
    let source = "def f(x):\n    print x\n    return printed\ny = f(a.b)\n";
    let first = compile_restricted_exec(source).unwrap();
    let second = compile_restricted_exec(source).unwrap();
    assert_eq!(first.warnings, second.warnings);
    assert_eq!(first.used_names, second.used_names);
    assert_eq!(first.code(), second.code());

    let first = restriction_errors("_x = 1\nexec 'y'\n");
    let second = restriction_errors("_x = 1\nexec 'y'\n");
    assert_eq!(first, second);
}

#[test]
fn test_eval_mode_collects_names() {
    let unit = compile_restricted_eval("price * qty + tax.rate").unwrap();
    assert_eq!(unit.mode, Mode::Eval);
    assert_eq!(
        unit.used_names.iter().collect::<Vec<_>>(),
        vec!["price", "qty", "tax"]
    );
    assert!(compile_restricted_eval("x = 1").is_err());
}

#[test]
fn test_function_mode() {
    let unit = compile_restricted_function(
        "a, *rest",
        "\"Sums things.\"\nreturn a + sum(rest)\n",
        "total",
        "<function>",
        Some(&["counter"]),
    )
    .unwrap();
    assert_eq!(unit.filename, "<function>");
    let function = &unit.code().functions[0];
    assert_eq!(function.name, "total");
    assert_eq!(function.doc.as_deref(), Some("Sums things."));
    assert_eq!(function.vararg.as_deref(), Some("rest"));
}

#[test]
fn test_compiler_builder_uses_filename() {
    let compiler = RestrictedCompiler::new("job.py");
    let unit = compiler.single("x = 1\nx\n").unwrap();
    assert_eq!(unit.mode, Mode::Single);
    assert_eq!(unit.filename, "job.py");

    let Err(Error::Syntax(err)) = compiler.exec("if\n") else {
        panic!("expected a syntax error");
    };
    assert_eq!(err.filename, "job.py");
    assert_eq!(err.line, 1);
}

#[test]
fn test_unit_can_move_between_threads() {
    let unit = compile_restricted_exec("x = [i * 2 for i in range(3)]\n").unwrap();
    let code = unit.shared_code();
    let handle = std::thread::spawn(move || code.instructions.len());
    assert_eq!(handle.join().unwrap(), unit.code().instructions.len());
}

#[test]
fn test_violations_render_against_source() {
    let source = "x = 1\nexec 'x = 2'\n";
    let Err(Error::Restriction(err)) = compile_restricted_exec(source) else {
        panic!("expected a restriction error");
    };
    assert_eq!(err.spans.len(), err.errors.len());

    let rendered = err.render(source, "job.py");
    assert!(rendered.starts_with("error: Exec statements are not allowed.\n"));
    assert!(rendered.contains("--> job.py:2:1"));
    assert!(rendered.contains("2 | exec 'x = 2'"));
    assert!(rendered.contains("^ restricted"));
}

fn syntax_message(source: &str) -> String {
    match compile_restricted_exec(source) {
        Err(Error::Syntax(err)) => err.message,
        Err(other) => panic!("expected a syntax error, got {other:?}"),
        Ok(_) => panic!("source compiled"),
    }
}

#[test]
fn test_deeply_nested_brackets_are_a_syntax_error() {
    let source = format!("{}1{}", "[".repeat(500), "]".repeat(500));
    assert!(matches!(
        compile_restricted_exec(&source),
        Err(Error::Syntax(_))
    ));
    assert_eq!(
        syntax_message(&format!("x = {}1{}\n", "(".repeat(200), ")".repeat(200))),
        "too many nested parentheses"
    );
    assert!(matches!(
        compile_restricted_eval(&format!("{}1{}", "{1: ".repeat(300), "}".repeat(300))),
        Err(Error::Syntax(_))
    ));
}

#[test]
fn test_deep_unary_and_not_chains_are_a_syntax_error() {
    assert!(matches!(
        compile_restricted_exec(&format!("x = {}1\n", "-".repeat(1000))),
        Err(Error::Syntax(_))
    ));
    assert!(matches!(
        compile_restricted_exec(&format!("x = {}True\n", "not ".repeat(1000))),
        Err(Error::Syntax(_))
    ));
    assert!(matches!(
        compile_restricted_exec(&format!("x = 2{}\n", " ** 2".repeat(1000))),
        Err(Error::Syntax(_))
    ));
}

#[test]
fn test_long_operator_and_trailer_chains_are_a_syntax_error() {
    let sum = vec!["1"; 5000].join(" + ");
    assert_eq!(syntax_message(&format!("x = {sum}\n")), "too deeply nested");

    let attrs = ".a".repeat(1000);
    assert!(matches!(
        compile_restricted_exec(&format!("x = y{attrs}\n")),
        Err(Error::Syntax(_))
    ));
    let calls = "()".repeat(1000);
    assert!(matches!(
        compile_restricted_exec(&format!("x = f{calls}\n")),
        Err(Error::Syntax(_))
    ));
}

#[test]
fn test_deep_blocks_and_elif_ladders_are_a_syntax_error() {
    let mut source = String::new();
    for depth in 0..100 {
        source.push_str(&"    ".repeat(depth));
        source.push_str("if x:\n");
    }
    source.push_str(&"    ".repeat(100));
    source.push_str("pass\n");
    assert!(matches!(
        compile_restricted_exec(&source),
        Err(Error::Syntax(_))
    ));

    let mut source = String::new();
    for depth in 0..100 {
        source.push_str(&"    ".repeat(depth));
        source.push_str("try:\n");
    }
    assert_eq!(syntax_message(&source), "too many levels of indentation");

    let mut ladder = String::from("if x == 0:\n    y = 0\n");
    for i in 1..500 {
        ladder.push_str(&format!("elif x == {i}:\n    y = {i}\n"));
    }
    assert_eq!(syntax_message(&ladder), "too deeply nested");
}

#[test]
fn test_reasonable_nesting_still_runs() {
    let mut sandbox = Sandbox::new();

    let nested = format!("{}1{}", "[".repeat(20), "]".repeat(20));
    sandbox.execute(&format!("x = {nested}\n")).unwrap();
    assert_eq!(
        sandbox.execute(&format!("len(x) == 1 and {nested} == x")).unwrap(),
        PyValue::Bool(true)
    );

    let sum = vec!["1"; 50].join(" + ");
    assert_eq!(sandbox.execute(&sum).unwrap(), PyValue::Int(50));
    assert_eq!(
        sandbox.execute(&format!("{}5", "-".repeat(20))).unwrap(),
        PyValue::Int(5)
    );
    assert_eq!(
        sandbox.execute("1 + 2 * 3 - 8 / 2 | 16 ^ 3 & 1 << 2").unwrap(),
        PyValue::Int((1 + 2 * 3 - 8 / 2) | (16 ^ (3 & (1 << 2))))
    );

    let mut ladder = String::from("if x == 0:\n    y = 0\n");
    for i in 1..60 {
        ladder.push_str(&format!("elif x == {i}:\n    y = {i}\n"));
    }
    ladder.push_str("else:\n    y = -1\n");
    sandbox.set_variable("x", 42);
    sandbox.execute(&ladder).unwrap();
    assert_eq!(sandbox.get_variable("y"), Some(PyValue::Int(42)));
}

#[test]
fn test_misplaced_control_flow_reports_location() {
    let Err(Error::Syntax(err)) = compile_restricted("x = 1\nbreak\n", "loop.py", Mode::Exec)
    else {
        panic!("expected a syntax error");
    };
    assert_eq!(err.message, "'break' outside loop");
    assert_eq!(err.filename, "loop.py");
    assert_eq!((err.line, err.column), (2, 1));

    let Err(Error::Syntax(err)) = compile_restricted_exec("for i in x:\n    def f():\n        continue\n")
    else {
        panic!("expected a syntax error");
    };
    assert_eq!(err.line, 3);

    assert!(matches!(
        compile_restricted_exec("return\n"),
        Err(Error::Syntax(_))
    ));
    // A function body may return at its top level but not break there.
    assert!(compile_restricted_function("", "return 1\n", "one", "<function>", None).is_ok());
    let Err(Error::Syntax(err)) =
        compile_restricted_function("", "x = 1\nbreak\n", "f", "<function>", None)
    else {
        panic!("expected a syntax error");
    };
    assert_eq!((err.line, err.text.as_str()), (2, "break"));
}

#[test]
fn test_function_mode_rejects_malformed_name_and_params() {
    let err = compile_restricted_function("", "pass\n", "f(): pass\nimport os\ndef g", "<f>", None)
        .unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
    let Error::Syntax(err) = compile_restricted_function("", "pass\n", "lambda", "<f>", None)
        .unwrap_err()
    else {
        panic!("expected a syntax error");
    };
    assert_eq!(err.message, "'lambda' is not a valid function name");

    let Err(Error::Syntax(err)) =
        compile_restricted_function("a): pass\nx = 1\ndef g(b", "pass\n", "f", "<f>", None)
    else {
        panic!("expected a syntax error");
    };
    assert!(err.message.starts_with("invalid parameter list"));

    let unit =
        compile_restricted_function("a, b=2, **kw", "return a + b\n", "add", "<f>", None).unwrap();
    assert_eq!(unit.code().functions[0].name, "add");
}
