mod common;

use std::collections::HashMap;

use common::init_test_logging;
use pretty_assertions::assert_eq;
use restrictrs::{Error, Namespace, Policy, PyValue, RestrictedEval};

#[test]
fn test_evaluates_against_mapping() {
    init_test_logging();
    let expr = RestrictedEval::new("  (a + b) * c  ").unwrap();
    assert_eq!(expr.expression(), "(a + b) * c");

    let mut names = HashMap::new();
    names.insert("a".to_string(), PyValue::Int(1));
    names.insert("b".to_string(), PyValue::Int(2));
    names.insert("c".to_string(), PyValue::Int(3));
    assert_eq!(expr.eval(&names).unwrap(), PyValue::Int(9));

    names.insert("c".to_string(), PyValue::Int(10));
    assert_eq!(expr.eval(&names).unwrap(), PyValue::Int(30));
}

#[test]
fn test_only_used_names_are_bound() {
    let expr = RestrictedEval::new("x.upper()").unwrap();
    assert_eq!(expr.used_names().iter().collect::<Vec<_>>(), vec!["x"]);
    assert_eq!(
        expr.eval_with([("x", "hi"), ("unused", "ignored")]).unwrap(),
        PyValue::from("HI")
    );
}

#[test]
fn test_restricted_expressions_do_not_compile() {
    for source in ["a._b", "_a", "__import__('os')"] {
        assert!(
            matches!(RestrictedEval::new(source), Err(Error::Restriction(_))),
            "{source} compiled"
        );
    }
    assert!(matches!(RestrictedEval::new("a = 1"), Err(Error::Syntax(_))));
}

#[test]
fn test_host_object_reads() {
    let record = Namespace::new("Record")
        .with_attr("title", "Report")
        .with_item("pages", 12)
        .into_value();
    let expr = RestrictedEval::new("record.title + ': ' + str(record['pages'])").unwrap();
    assert!(matches!(
        expr.eval_with([("record", record.clone())]),
        Err(Error::NameError(name)) if name == "str"
    ));

    let expr = RestrictedEval::with_policy(
        "record.title + ': ' + str(record['pages'])",
        Policy::safe(),
    )
    .unwrap();
    assert_eq!(
        expr.eval_with([("record", record)]).unwrap(),
        PyValue::from("Report: 12")
    );
}

#[test]
fn test_multiline_expression_is_wrapped() {
    let expr = RestrictedEval::new("[a,\r\n b,\r\n c]").unwrap();
    assert_eq!(expr.expression(), "([a,\n b,\n c])");
    let value = expr.eval_with([("a", 1), ("b", 2), ("c", 3)]).unwrap();
    assert_eq!(value, PyValue::from(vec![1, 2, 3]));
}

#[test]
fn test_limits_apply() {
    let policy = Policy::safe().with_limits(restrictrs::Limits {
        max_sequence_len: 10,
        ..Default::default()
    });
    let expr = RestrictedEval::with_policy("'ab' * n", policy).unwrap();
    assert_eq!(expr.eval_with([("n", 2)]).unwrap(), PyValue::from("abab"));
    assert!(expr.eval_with([("n", 100)]).is_err());
}
