//! Binary, unary and comparison operators.
//!
//! This module implements Python operators:
//! - Arithmetic: +, -, *, /, //, %, **
//! - Bitwise: |, ^, &, <<, >>
//! - Comparison: ==, !=, <, <=, >, >=, in, not in, is, is not
//!
//! Integer arithmetic is checked: results that leave the `i64` range are
//! reported as `OverflowError` rather than wrapping.

use std::cmp::Ordering;

use crate::bytecode::{BinOp, CmpOp, UnaryOp};
use crate::error::{Error, Result};
use crate::value::PyValue;

/// Apply a binary operator to two values.
///
/// Handles arithmetic (+, -, *, /, //, %, **), bitwise (|, ^, &, <<, >>),
/// and special cases like string concatenation, string/list repetition,
/// and list concatenation. Repetition may not build a sequence longer
/// than `max_len`.
pub fn apply_binop(op: BinOp, left: &PyValue, right: &PyValue, max_len: usize) -> Result<PyValue> {
    match op {
        BinOp::Add => match (left, right) {
            (PyValue::Str(a), PyValue::Str(b)) => Ok(PyValue::Str(format!("{}{}", a, b))),
            (PyValue::List(a), PyValue::List(b)) => {
                let mut result = a.borrow().clone();
                result.extend(b.borrow().iter().cloned());
                Ok(PyValue::list(result))
            }
            (PyValue::Tuple(a), PyValue::Tuple(b)) => {
                let mut result = a.to_vec();
                result.extend(b.iter().cloned());
                Ok(PyValue::tuple(result))
            }
            _ => numeric_binop(left, right, "+", i64::checked_add, |a, b| a + b),
        },
        BinOp::Sub => numeric_binop(left, right, "-", i64::checked_sub, |a, b| a - b),
        BinOp::Mult => match (left, right) {
            (PyValue::Str(s), n) | (n, PyValue::Str(s)) if is_int(n) => {
                let count = repeat_count(n, s.chars().count(), max_len)?;
                Ok(PyValue::Str(s.repeat(count)))
            }
            (PyValue::List(l), n) | (n, PyValue::List(l)) if is_int(n) => {
                let items = l.borrow();
                let count = repeat_count(n, items.len(), max_len)?;
                Ok(PyValue::list(repeat_items(&items, count)))
            }
            (PyValue::Tuple(t), n) | (n, PyValue::Tuple(t)) if is_int(n) => {
                let count = repeat_count(n, t.len(), max_len)?;
                Ok(PyValue::tuple(repeat_items(t, count)))
            }
            _ => numeric_binop(left, right, "*", i64::checked_mul, |a, b| a * b),
        },
        BinOp::Div => {
            // Python 2 semantics: int / int floors.
            if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                return floor_div_int(a, b).map(PyValue::Int);
            }
            let (a, b) = float_operands(left, right, "/")?;
            if b == 0.0 {
                Err(Error::DivisionByZero)
            } else {
                Ok(PyValue::Float(a / b))
            }
        }
        BinOp::FloorDiv => {
            if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                return floor_div_int(a, b).map(PyValue::Int);
            }
            let (a, b) = float_operands(left, right, "//")?;
            if b == 0.0 {
                Err(Error::DivisionByZero)
            } else {
                Ok(PyValue::Float((a / b).floor()))
            }
        }
        BinOp::Mod => match (left, right) {
            (PyValue::Str(fmt), args) => format_percent(fmt, args).map(PyValue::Str),
            _ => {
                if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                    if b == 0 {
                        return Err(Error::DivisionByZero);
                    }
                    // The result takes the sign of the divisor.
                    let r = a.checked_rem(b).ok_or_else(overflow)?;
                    return Ok(PyValue::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }));
                }
                let (a, b) = float_operands(left, right, "%")?;
                if b == 0.0 {
                    Err(Error::DivisionByZero)
                } else {
                    let r = a % b;
                    Ok(PyValue::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
                }
            }
        },
        BinOp::Pow => {
            if let (Some(a), Some(b)) = (left.as_int(), right.as_int())
                && b >= 0
            {
                let exp = u32::try_from(b).map_err(|_| overflow())?;
                return a.checked_pow(exp).map(PyValue::Int).ok_or_else(overflow);
            }
            let (a, b) = float_operands(left, right, "**")?;
            if a == 0.0 && b < 0.0 {
                return Err(Error::DivisionByZero);
            }
            Ok(PyValue::Float(a.powf(b)))
        }
        BinOp::BitOr => int_binop(left, right, "|", |a, b| Some(a | b)),
        BinOp::BitXor => int_binop(left, right, "^", |a, b| Some(a ^ b)),
        BinOp::BitAnd => int_binop(left, right, "&", |a, b| Some(a & b)),
        BinOp::LShift => int_binop(left, right, "<<", |a, b| {
            let shift = u32::try_from(b).ok()?;
            let result = a.checked_shl(shift)?;
            (result >> shift == a).then_some(result)
        }),
        BinOp::RShift => int_binop(left, right, ">>", |a, b| {
            let shift = u32::try_from(b).ok()?;
            Some(if shift >= 64 { if a < 0 { -1 } else { 0 } } else { a >> shift })
        }),
    }
}

/// Apply a unary operator to a value.
pub fn apply_unaryop(op: UnaryOp, operand: &PyValue) -> Result<PyValue> {
    match op {
        UnaryOp::Not => Ok(PyValue::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            PyValue::Float(f) => Ok(PyValue::Float(-f)),
            _ => match operand.as_int() {
                Some(i) => i.checked_neg().map(PyValue::Int).ok_or_else(overflow),
                None => Err(bad_operand("unary -", operand)),
            },
        },
        UnaryOp::Pos => match operand {
            PyValue::Float(_) => Ok(operand.clone()),
            _ => operand
                .as_int()
                .map(PyValue::Int)
                .ok_or_else(|| bad_operand("unary +", operand)),
        },
        UnaryOp::Invert => operand
            .as_int()
            .map(|i| PyValue::Int(!i))
            .ok_or_else(|| bad_operand("unary ~", operand)),
    }
}

/// Apply a comparison operator to two values.
///
/// Returns a boolean result. `in` checks membership in lists, tuples,
/// strings (substring) and dict keys. `is` tests identity.
pub fn apply_cmpop(op: CmpOp, left: &PyValue, right: &PyValue) -> Result<bool> {
    match op {
        CmpOp::Eq => Ok(left == right),
        CmpOp::NotEq => Ok(left != right),
        CmpOp::Lt => Ok(compare_values(left, right)? == Ordering::Less),
        CmpOp::LtE => Ok(compare_values(left, right)? != Ordering::Greater),
        CmpOp::Gt => Ok(compare_values(left, right)? == Ordering::Greater),
        CmpOp::GtE => Ok(compare_values(left, right)? != Ordering::Less),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => Ok(!contains(right, left)?),
        CmpOp::Is => Ok(left.is(right)),
        CmpOp::IsNot => Ok(!left.is(right)),
    }
}

/// Order two values: numbers numerically, strings by code point, lists
/// and tuples lexicographically.
pub fn compare_values(left: &PyValue, right: &PyValue) -> Result<Ordering> {
    match (left, right) {
        (PyValue::Str(a), PyValue::Str(b)) => Ok(a.cmp(b)),
        (PyValue::List(a), PyValue::List(b)) => compare_sequences(&a.borrow(), &b.borrow()),
        (PyValue::Tuple(a), PyValue::Tuple(b)) => compare_sequences(a, b),
        _ => {
            if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                return Ok(a.cmp(&b));
            }
            match (left.as_float(), right.as_float()) {
                (Some(a), Some(b)) => Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal)),
                _ => Err(Error::TypeError(format!(
                    "unorderable types: {}() < {}()",
                    left.type_name(),
                    right.type_name()
                ))),
            }
        }
    }
}

fn compare_sequences(a: &[PyValue], b: &[PyValue]) -> Result<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if x != y {
            return compare_values(x, y);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

fn contains(container: &PyValue, needle: &PyValue) -> Result<bool> {
    match container {
        PyValue::List(items) => Ok(items.borrow().contains(needle)),
        PyValue::Tuple(items) => Ok(items.contains(needle)),
        PyValue::Str(s) => match needle {
            PyValue::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(Error::TypeError(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        PyValue::Dict(pairs) => Ok(pairs.borrow().iter().any(|(k, _)| k == needle)),
        PyValue::Object(obj) => match obj.iter() {
            Some(items) => Ok(items.contains(needle)),
            None => Err(not_iterable(container)),
        },
        _ => Err(not_iterable(container)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_int(value: &PyValue) -> bool {
    matches!(value, PyValue::Int(_) | PyValue::Bool(_))
}

fn repeat_count(n: &PyValue, item_len: usize, max_len: usize) -> Result<usize> {
    let count = usize::try_from(n.as_int().unwrap_or(0).max(0)).unwrap_or(usize::MAX);
    match item_len.checked_mul(count) {
        Some(total) if total <= max_len => Ok(count),
        _ => Err(Error::raised(
            "MemoryError",
            format!("result would exceed {} items", max_len),
        )),
    }
}

fn repeat_items(items: &[PyValue], count: usize) -> Vec<PyValue> {
    let mut result = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        result.extend(items.iter().cloned());
    }
    result
}

fn floor_div_int(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return Err(Error::DivisionByZero);
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn float_operands(left: &PyValue, right: &PyValue, symbol: &str) -> Result<(f64, f64)> {
    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(unsupported_operands(symbol, left, right)),
    }
}

/// Apply a numeric binary operation, staying in integers when both sides
/// are integers.
fn numeric_binop<F, G>(
    left: &PyValue,
    right: &PyValue,
    symbol: &str,
    int_op: F,
    float_op: G,
) -> Result<PyValue>
where
    F: Fn(i64, i64) -> Option<i64>,
    G: Fn(f64, f64) -> f64,
{
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return int_op(a, b).map(PyValue::Int).ok_or_else(overflow);
    }
    let (a, b) = float_operands(left, right, symbol)?;
    Ok(PyValue::Float(float_op(a, b)))
}

/// Apply an integer binary operation.
fn int_binop<F>(left: &PyValue, right: &PyValue, symbol: &str, op: F) -> Result<PyValue>
where
    F: Fn(i64, i64) -> Option<i64>,
{
    match (left.as_int(), right.as_int()) {
        (Some(_), Some(b)) if b < 0 && matches!(symbol, "<<" | ">>") => {
            Err(Error::ValueError("negative shift count".to_string()))
        }
        (Some(a), Some(b)) => op(a, b).map(PyValue::Int).ok_or_else(overflow),
        _ => Err(unsupported_operands(symbol, left, right)),
    }
}

fn overflow() -> Error {
    Error::raised("OverflowError", "integer overflow")
}

fn unsupported_operands(symbol: &str, left: &PyValue, right: &PyValue) -> Error {
    Error::TypeError(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}

fn bad_operand(symbol: &str, operand: &PyValue) -> Error {
    Error::TypeError(format!(
        "bad operand type for {}: '{}'",
        symbol,
        operand.type_name()
    ))
}

fn not_iterable(value: &PyValue) -> Error {
    Error::TypeError(format!(
        "argument of type '{}' is not iterable",
        value.type_name()
    ))
}

// ---------------------------------------------------------------------------
// %-formatting
// ---------------------------------------------------------------------------

/// `fmt % args` with the `%s %r %d %i %f %x %o %%` conversions, an
/// optional width and precision, and the `-`, `0` and `+` flags.
fn format_percent(fmt: &str, args: &PyValue) -> Result<String> {
    let values: Vec<PyValue> = match args {
        PyValue::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut values = values.into_iter();
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        let mut plus = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' => plus = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse::<usize>().unwrap_or(0));
        }

        let Some(conv) = chars.next() else {
            return Err(Error::ValueError("incomplete format".to_string()));
        };
        if conv == '%' {
            out.push('%');
            continue;
        }
        let value = values
            .next()
            .ok_or_else(|| Error::TypeError("not enough arguments for format string".to_string()))?;

        let body = match conv {
            's' => value.to_string(),
            'r' => value.repr(),
            'd' | 'i' => {
                let n = value
                    .as_int()
                    .or_else(|| value.as_float().map(|f| f.trunc() as i64))
                    .ok_or_else(|| format_type_error(conv, &value))?;
                if plus && n >= 0 { format!("+{}", n) } else { n.to_string() }
            }
            'f' | 'F' => {
                let f = value.as_float().ok_or_else(|| format_type_error(conv, &value))?;
                let s = format!("{:.*}", precision.unwrap_or(6), f);
                if plus && f >= 0.0 { format!("+{}", s) } else { s }
            }
            'x' => format!("{:x}", value.as_int().ok_or_else(|| format_type_error(conv, &value))?),
            'X' => format!("{:X}", value.as_int().ok_or_else(|| format_type_error(conv, &value))?),
            'o' => format!("{:o}", value.as_int().ok_or_else(|| format_type_error(conv, &value))?),
            other => {
                return Err(Error::ValueError(format!(
                    "unsupported format character '{}'",
                    other
                )));
            }
        };
        let body = match (conv, precision) {
            ('s' | 'r', Some(p)) => body.chars().take(p).collect(),
            _ => body,
        };

        let width = width.parse::<usize>().unwrap_or(0);
        let len = body.chars().count();
        if len >= width {
            out.push_str(&body);
        } else if left_align {
            out.push_str(&body);
            out.push_str(&" ".repeat(width - len));
        } else if zero_pad && !matches!(conv, 's' | 'r') {
            let (sign, digits) = match body.strip_prefix(['-', '+']) {
                Some(rest) => (&body[..1], rest),
                None => ("", body.as_str()),
            };
            out.push_str(sign);
            out.push_str(&"0".repeat(width - len));
            out.push_str(digits);
        } else {
            out.push_str(&" ".repeat(width - len));
            out.push_str(&body);
        }
    }

    if values.next().is_some() && matches!(args, PyValue::Tuple(_)) {
        return Err(Error::TypeError(
            "not all arguments converted during string formatting".to_string(),
        ));
    }
    Ok(out)
}

fn format_type_error(conv: char, value: &PyValue) -> Error {
    Error::TypeError(format!(
        "%{} format: a number is required, not {}",
        conv,
        value.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn binop(op: BinOp, left: impl Into<PyValue>, right: impl Into<PyValue>) -> Result<PyValue> {
        apply_binop(op, &left.into(), &right.into(), 1000)
    }

    #[test]
    fn test_integer_division_floors() {
        assert_eq!(binop(BinOp::Div, 7, 2).unwrap(), PyValue::Int(3));
        assert_eq!(binop(BinOp::FloorDiv, -7, 2).unwrap(), PyValue::Int(-4));
        assert_eq!(binop(BinOp::Mod, -7, 3).unwrap(), PyValue::Int(2));
        assert_eq!(binop(BinOp::Mod, 7, -3).unwrap(), PyValue::Int(-2));
        assert_eq!(binop(BinOp::Div, 7.0, 2).unwrap(), PyValue::Float(3.5));
        assert!(matches!(binop(BinOp::Div, 1, 0), Err(Error::DivisionByZero)));
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = binop(BinOp::Mult, i64::MAX, 2).unwrap_err();
        assert_eq!(err.exception_type(), "OverflowError");
        assert_eq!(binop(BinOp::Pow, 2, 10).unwrap(), PyValue::Int(1024));
    }

    #[test]
    fn test_repetition_is_capped() {
        assert_eq!(binop(BinOp::Mult, "ab", 2).unwrap(), PyValue::from("abab"));
        let err = binop(BinOp::Mult, vec![0], 5000).unwrap_err();
        assert_eq!(err.exception_type(), "MemoryError");
    }

    #[test]
    fn test_percent_formatting() {
        let args = PyValue::tuple(vec![PyValue::from("x"), PyValue::Int(5), PyValue::Float(1.5)]);
        assert_eq!(
            binop(BinOp::Mod, "%s=%03d (%.2f) 100%%", args).unwrap(),
            PyValue::from("x=005 (1.50) 100%")
        );
        assert_eq!(binop(BinOp::Mod, "%r", "a").unwrap(), PyValue::from("'a'"));
    }

    #[test]
    fn test_membership_and_identity() {
        let dict = PyValue::dict(vec![(PyValue::Int(1), PyValue::None)]);
        assert!(apply_cmpop(CmpOp::In, &PyValue::Int(1), &dict).unwrap());
        assert!(apply_cmpop(CmpOp::In, &PyValue::from("ell"), &PyValue::from("hello")).unwrap());
        let list = PyValue::from(vec![1]);
        assert!(apply_cmpop(CmpOp::Is, &list, &list.clone()).unwrap());
        assert!(!apply_cmpop(CmpOp::Is, &list, &PyValue::from(vec![1])).unwrap());
    }

    #[test]
    fn test_ordering() {
        assert!(apply_cmpop(CmpOp::Lt, &PyValue::Int(1), &PyValue::Float(1.5)).unwrap());
        assert!(apply_cmpop(CmpOp::Lt, &PyValue::from("a"), &PyValue::from("b")).unwrap());
        assert!(
            apply_cmpop(CmpOp::Lt, &PyValue::from(vec![1, 2]), &PyValue::from(vec![1, 3]))
                .unwrap()
        );
        assert!(apply_cmpop(CmpOp::Lt, &PyValue::Int(1), &PyValue::from("a")).is_err());
    }
}
