//! The builtin function table.
//!
//! [`lookup`] returns a fresh value for one builtin name. The VM only asks
//! for the names its [`crate::Policy`] allows, so adding a function here
//! does not by itself expose it to restricted code.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::bytecode::{BinOp, CmpOp};
use crate::error::{Error, Result};
use crate::guards::guarded_write;
use crate::methods::{dict_set, sort_options, sort_values};
use crate::modules;
use crate::operators::{apply_binop, apply_cmpop};
use crate::value::{CallArgs, PyIterator, PyValue};
use crate::vm::Vm;

type Builtin = fn(&mut Vm, CallArgs) -> Result<PyValue>;

/// The builtin bound to `name`, if there is one.
pub fn lookup(name: &str) -> Option<PyValue> {
    let func: Builtin = match name {
        "None" => return Some(PyValue::None),
        "True" => return Some(PyValue::Bool(true)),
        "False" => return Some(PyValue::Bool(false)),
        "math" => return Some(modules::math()),
        "string" => return Some(modules::string()),

        "abs" => builtin_abs,
        "bool" => builtin_bool,
        "callable" => builtin_callable,
        "chr" => builtin_chr,
        "divmod" => builtin_divmod,
        "float" => builtin_float,
        "hash" => builtin_hash,
        "hex" => builtin_hex,
        "int" => builtin_int,
        "isinstance" => builtin_isinstance,
        "len" => builtin_len,
        "oct" => builtin_oct,
        "ord" => builtin_ord,
        "pow" => builtin_pow,
        "range" => builtin_range,
        "repr" => builtin_repr,
        "round" => builtin_round,
        "str" => builtin_str,
        "tuple" => builtin_tuple,
        "zip" => builtin_zip,
        "setattr" => builtin_setattr,
        "delattr" => builtin_delattr,

        "list" => builtin_list,
        "dict" => builtin_dict,

        "same_type" => builtin_same_type,
        "test" => builtin_test,

        "min" => builtin_min,
        "max" => builtin_max,
        "sum" => builtin_sum,
        "sorted" => builtin_sorted,
        "enumerate" => builtin_enumerate,
        "reversed" => builtin_reversed,
        "any" => builtin_any,
        "all" => builtin_all,
        "map" => builtin_map,
        "filter" => builtin_filter,
        _ => return None,
    };
    Some(PyValue::native(name, func))
}

fn int_arg(value: &PyValue, func: &str) -> Result<i64> {
    value.as_int().ok_or_else(|| {
        Error::TypeError(format!(
            "{}() integer argument expected, got {}",
            func,
            value.type_name()
        ))
    })
}

fn float_arg(value: &PyValue, func: &str) -> Result<f64> {
    value.as_float().ok_or_else(|| {
        Error::TypeError(format!(
            "{}() argument must be a number, not '{}'",
            func,
            value.type_name()
        ))
    })
}

/// Fail once a sequence would outgrow the configured cap.
fn check_len(vm: &Vm, len: usize, func: &str) -> Result<()> {
    let max = vm.limits().max_sequence_len;
    if len > max {
        return Err(Error::ValueError(format!(
            "{}() result has {} items, more than the limit of {}",
            func, len, max
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Safe builtins
// ---------------------------------------------------------------------------

fn builtin_abs(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("abs", 1, 1)?;
    match &args.args[0] {
        PyValue::Int(i) => i
            .checked_abs()
            .map(PyValue::Int)
            .ok_or_else(|| Error::raised("OverflowError", "integer overflow in abs()")),
        PyValue::Bool(b) => Ok(PyValue::Int(i64::from(*b))),
        PyValue::Float(f) => Ok(PyValue::Float(f.abs())),
        other => Err(Error::TypeError(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_bool(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("bool", 0, 1)?;
    Ok(PyValue::Bool(args.get(0).is_some_and(PyValue::is_truthy)))
}

fn builtin_callable(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("callable", 1, 1)?;
    Ok(PyValue::Bool(args.args[0].is_callable()))
}

fn builtin_chr(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("chr", 1, 1)?;
    let code = int_arg(&args.args[0], "chr")?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| PyValue::Str(c.to_string()))
        .ok_or_else(|| Error::ValueError("chr() arg not in range(0x110000)".to_string()))
}

fn builtin_divmod(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("divmod", 2, 2)?;
    let max = vm.limits().max_sequence_len;
    let (a, b) = (&args.args[0], &args.args[1]);
    let quotient = apply_binop(BinOp::FloorDiv, a, b, max)?;
    let remainder = apply_binop(BinOp::Mod, a, b, max)?;
    Ok(PyValue::tuple(vec![quotient, remainder]))
}

fn builtin_float(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("float", 0, 1)?;
    let Some(arg) = args.get(0) else {
        return Ok(PyValue::Float(0.0));
    };
    match arg {
        PyValue::Str(s) => {
            let text = s.trim();
            let parsed = match text.to_ascii_lowercase().as_str() {
                "nan" | "+nan" | "-nan" => Some(f64::NAN),
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                _ => text.parse::<f64>().ok(),
            };
            parsed.map(PyValue::Float).ok_or_else(|| {
                Error::ValueError(format!("could not convert string to float: {}", arg.repr()))
            })
        }
        other => float_arg(other, "float").map(PyValue::Float),
    }
}

fn builtin_hash(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("hash", 1, 1)?;
    let value = &args.args[0];
    if !value.is_hashable() {
        return Err(Error::TypeError(format!(
            "unhashable type: '{}'",
            value.type_name()
        )));
    }
    // Equal numbers hash equally across int, bool and float.
    if let Some(i) = value.as_int() {
        return Ok(PyValue::Int(i));
    }
    if let PyValue::Float(f) = value
        && f.fract() == 0.0
        && f.abs() < 9.0e15
    {
        return Ok(PyValue::Int(*f as i64));
    }
    let mut hasher = DefaultHasher::new();
    value.type_name().hash(&mut hasher);
    value.repr().hash(&mut hasher);
    Ok(PyValue::Int(hasher.finish() as i64))
}

fn builtin_hex(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("hex", 1, 1)?;
    let n = int_arg(&args.args[0], "hex")?;
    let digits = format!("{:x}", n.unsigned_abs());
    Ok(PyValue::Str(if n < 0 {
        format!("-0x{}", digits)
    } else {
        format!("0x{}", digits)
    }))
}

fn builtin_oct(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("oct", 1, 1)?;
    let n = int_arg(&args.args[0], "oct")?;
    if n == 0 {
        return Ok(PyValue::from("0"));
    }
    let digits = format!("{:o}", n.unsigned_abs());
    Ok(PyValue::Str(if n < 0 {
        format!("-0{}", digits)
    } else {
        format!("0{}", digits)
    }))
}

fn builtin_int(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("int", 0, 2)?;
    let Some(arg) = args.get(0) else {
        return Ok(PyValue::Int(0));
    };
    let base = match args.get(1) {
        Some(b) => Some(int_arg(b, "int")?),
        None => None,
    };
    match (arg, base) {
        (PyValue::Str(s), base) => parse_int(s, base.unwrap_or(10)),
        (_, Some(_)) => Err(Error::TypeError(
            "int() can't convert non-string with explicit base".to_string(),
        )),
        (PyValue::Int(i), None) => Ok(PyValue::Int(*i)),
        (PyValue::Bool(b), None) => Ok(PyValue::Int(i64::from(*b))),
        (PyValue::Float(f), None) => {
            if f.is_finite() && f.abs() < 9.2e18 {
                Ok(PyValue::Int(f.trunc() as i64))
            } else {
                Err(Error::raised(
                    "OverflowError",
                    "cannot convert float infinity or nan to integer",
                ))
            }
        }
        (other, None) => Err(Error::TypeError(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_int(s: &str, base: i64) -> Result<PyValue> {
    let invalid = || {
        Error::ValueError(format!(
            "invalid literal for int() with base {}: {}",
            base,
            PyValue::from(s).repr()
        ))
    };
    if !(base == 0 || (2..=36).contains(&base)) {
        return Err(Error::ValueError(
            "int() base must be >= 2 and <= 36".to_string(),
        ));
    }
    let text = s.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, digits) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &digits[2..]),
        (0 | 8, Some("0o")) => (8, &digits[2..]),
        (0 | 2, Some("0b")) => (2, &digits[2..]),
        (0, _) if digits.len() > 1 && digits.starts_with('0') => (8, &digits[1..]),
        (0, _) => (10, digits),
        (b, _) => (b as u32, digits),
    };
    let digits = digits.strip_suffix(['l', 'L']).unwrap_or(digits);
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let magnitude = i64::from_str_radix(digits, radix).map_err(|_| invalid())?;
    Ok(PyValue::Int(if negative { -magnitude } else { magnitude }))
}

/// `isinstance(value, cls)`; `cls` is a type builtin such as `int`, a type
/// name string, or a tuple of either.
fn builtin_isinstance(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("isinstance", 2, 2)?;
    let value = &args.args[0];
    let classes = match &args.args[1] {
        PyValue::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    for class in &classes {
        let name = match class {
            PyValue::Native(f) => f.name.as_str(),
            PyValue::Str(s) => s.as_str(),
            other => {
                return Err(Error::TypeError(format!(
                    "isinstance() arg 2 must be a type or tuple of types, not {}",
                    other.type_name()
                )));
            }
        };
        let matches = match name {
            "int" => matches!(value, PyValue::Int(_) | PyValue::Bool(_)),
            "NoneType" | "None" => matches!(value, PyValue::None),
            name => value.type_name() == name,
        };
        if matches {
            return Ok(PyValue::Bool(true));
        }
    }
    Ok(PyValue::Bool(false))
}

fn builtin_len(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("len", 1, 1)?;
    let len = match &args.args[0] {
        PyValue::Str(s) => Some(s.chars().count()),
        PyValue::List(items) => Some(items.borrow().len()),
        PyValue::Tuple(items) => Some(items.len()),
        PyValue::Dict(pairs) => Some(pairs.borrow().len()),
        PyValue::Object(obj) => obj.len(),
        _ => None,
    };
    len.map(PyValue::from).ok_or_else(|| {
        Error::TypeError(format!(
            "object of type '{}' has no len()",
            args.args[0].type_name()
        ))
    })
}

fn builtin_ord(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("ord", 1, 1)?;
    let s = args.args[0].as_str().ok_or_else(|| {
        Error::TypeError(format!(
            "ord() expected string of length 1, but {} found",
            args.args[0].type_name()
        ))
    })?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(PyValue::Int(c as i64)),
        _ => Err(Error::TypeError(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
    }
}

fn builtin_pow(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("pow", 2, 3)?;
    let Some(modulus) = args.get(2) else {
        let max = vm.limits().max_sequence_len;
        return apply_binop(BinOp::Pow, &args.args[0], &args.args[1], max);
    };
    let base = int_arg(&args.args[0], "pow")?;
    let exp = int_arg(&args.args[1], "pow")?;
    let modulus = int_arg(modulus, "pow")?;
    if modulus == 0 {
        return Err(Error::ValueError("pow() 3rd argument cannot be 0".to_string()));
    }
    if exp < 0 {
        return Err(Error::ValueError(
            "pow() 2nd argument cannot be negative when 3rd argument specified".to_string(),
        ));
    }
    let m = modulus as i128;
    let mut result: i128 = 1;
    let mut base = (base as i128).rem_euclid(m);
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * base % m;
        }
        base = base * base % m;
        exp >>= 1;
    }
    // The result takes the sign of the modulus.
    let mut result = result.rem_euclid(m);
    if m < 0 && result != 0 {
        result += m;
    }
    Ok(PyValue::Int(result as i64))
}

fn builtin_range(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("range", 1, 3)?;
    let ints: Vec<i64> = args
        .args
        .iter()
        .map(|a| int_arg(a, "range"))
        .collect::<Result<_>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step, ..] => (*start, *stop, *step),
        [] => (0, 0, 1),
    };
    if step == 0 {
        return Err(Error::ValueError("range() step argument must not be zero".to_string()));
    }
    let span = if step > 0 {
        (stop as i128 - start as i128).max(0)
    } else {
        (start as i128 - stop as i128).max(0)
    };
    let step_abs = (step as i128).abs();
    let len = ((span + step_abs - 1) / step_abs) as usize;
    check_len(vm, len, "range")?;
    Ok(PyValue::list(
        (0..len as i64).map(|i| PyValue::Int(start + i * step)).collect(),
    ))
}

fn builtin_repr(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("repr", 1, 1)?;
    Ok(PyValue::Str(args.args[0].repr()))
}

/// Python 2 `round`: halves round away from zero and the result is a float.
fn builtin_round(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("round", 1, 2)?;
    let x = float_arg(&args.args[0], "round")?;
    let digits = match args.get(1) {
        Some(d) => int_arg(d, "round")?,
        None => 0,
    };
    let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
    Ok(PyValue::Float((x * scale).round() / scale))
}

fn builtin_str(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("str", 0, 1)?;
    Ok(PyValue::Str(
        args.get(0).map(ToString::to_string).unwrap_or_default(),
    ))
}

fn builtin_tuple(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("tuple", 0, 1)?;
    let Some(arg) = args.get(0) else {
        return Ok(PyValue::tuple(Vec::new()));
    };
    if let PyValue::Tuple(_) = arg {
        return Ok(arg.clone());
    }
    let items = vm.collect_items(arg)?;
    check_len(vm, items.len(), "tuple")?;
    Ok(PyValue::tuple(items))
}

fn builtin_zip(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("zip", 0, usize::MAX)?;
    let mut columns = Vec::with_capacity(args.args.len());
    for arg in &args.args {
        columns.push(vm.collect_items(arg)?);
    }
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(PyValue::list(
        (0..len)
            .map(|i| PyValue::tuple(columns.iter().map(|col| col[i].clone()).collect()))
            .collect(),
    ))
}

fn name_arg(args: &CallArgs, func: &str) -> Result<String> {
    args.args[1].as_str().map(str::to_string).ok_or_else(|| {
        Error::TypeError(format!(
            "{}(): attribute name must be string, not '{}'",
            func,
            args.args[1].type_name()
        ))
    })
}

fn builtin_setattr(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("setattr", 3, 3)?;
    let name = name_arg(&args, "setattr")?;
    let target = guarded_write(&args.args[0]);
    vm.set_attr(&target, &name, args.args[2].clone())?;
    Ok(PyValue::None)
}

fn builtin_delattr(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("delattr", 2, 2)?;
    let name = name_arg(&args, "delattr")?;
    let target = guarded_write(&args.args[0]);
    vm.del_attr(&target, &name)?;
    Ok(PyValue::None)
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn builtin_list(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("list", 0, 1)?;
    let items = match args.get(0) {
        Some(arg) => vm.collect_items(arg)?,
        None => Vec::new(),
    };
    check_len(vm, items.len(), "list")?;
    Ok(PyValue::list(items))
}

fn builtin_dict(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    if args.args.len() > 1 {
        return Err(Error::TypeError(format!(
            "dict expected at most 1 arguments, got {}",
            args.args.len()
        )));
    }
    let pairs = Rc::new(RefCell::new(Vec::new()));
    match args.get(0) {
        Some(PyValue::Dict(source)) => {
            let copied = source.borrow().clone();
            *pairs.borrow_mut() = copied;
        }
        Some(source) => {
            for (i, entry) in vm.collect_items(source)?.into_iter().enumerate() {
                match entry.as_sequence().as_deref() {
                    Some([k, v]) => dict_set(&pairs, k.clone(), v.clone())?,
                    _ => {
                        return Err(Error::TypeError(format!(
                            "cannot convert dictionary update sequence element #{} to a sequence of length 2",
                            i
                        )));
                    }
                }
            }
        }
        None => {}
    }
    for (key, value) in args.kwargs {
        dict_set(&pairs, PyValue::Str(key), value)?;
    }
    Ok(PyValue::Dict(pairs))
}

// ---------------------------------------------------------------------------
// Utility builtins
// ---------------------------------------------------------------------------

/// Whether all arguments share one type.
fn builtin_same_type(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("same_type", 1, usize::MAX)?;
    let first = args.args[0].type_name();
    Ok(PyValue::Bool(
        args.args.iter().all(|a| a.type_name() == first),
    ))
}

/// `test(cond1, value1, cond2, value2, ..., default)`: the value paired
/// with the first true condition, else the default (or `None`).
fn builtin_test(_vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("test", 1, usize::MAX)?;
    let mut rest = args.args.as_slice();
    while let [cond, value, tail @ ..] = rest {
        if cond.is_truthy() {
            return Ok(value.clone());
        }
        rest = tail;
    }
    Ok(rest.first().cloned().unwrap_or(PyValue::None))
}

// ---------------------------------------------------------------------------
// Sequence helpers
// ---------------------------------------------------------------------------

fn extremum(vm: &mut Vm, args: CallArgs, func: &str, wanted: CmpOp) -> Result<PyValue> {
    let mut key = None;
    for (name, value) in &args.kwargs {
        if name != "key" {
            return Err(Error::TypeError(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, name
            )));
        }
        key = Some(value.clone());
    }
    let items = match args.args.as_slice() {
        [] => {
            return Err(Error::TypeError(format!(
                "{}() expected 1 arguments, got 0",
                func
            )));
        }
        [single] => vm.collect_items(single)?,
        many => many.to_vec(),
    };

    let mut best: Option<(PyValue, PyValue)> = None;
    for item in items {
        let k = match &key {
            Some(f) => vm.call(f, CallArgs::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        let replace = match &best {
            Some((best_key, _)) => apply_cmpop(wanted, &k, best_key)?,
            None => true,
        };
        if replace {
            best = Some((k, item));
        }
    }
    best.map(|(_, item)| item)
        .ok_or_else(|| Error::ValueError(format!("{}() arg is an empty sequence", func)))
}

fn builtin_min(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    extremum(vm, args, "min", CmpOp::Lt)
}

fn builtin_max(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    extremum(vm, args, "max", CmpOp::Gt)
}

fn builtin_sum(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("sum", 1, 2)?;
    let mut total = args.get(1).cloned().unwrap_or(PyValue::Int(0));
    if let PyValue::Str(_) = total {
        return Err(Error::TypeError(
            "sum() can't sum strings [use ''.join(seq) instead]".to_string(),
        ));
    }
    let max = vm.limits().max_sequence_len;
    for item in vm.collect_items(&args.args[0])? {
        total = apply_binop(BinOp::Add, &total, &item, max)?;
    }
    Ok(total)
}

fn builtin_sorted(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    if args.args.len() != 1 {
        return Err(Error::TypeError(format!(
            "sorted() takes exactly 1 positional argument ({} given)",
            args.args.len()
        )));
    }
    let (key, reverse) = sort_options(&args.kwargs, "sorted")?;
    let items = vm.collect_items(&args.args[0])?;
    Ok(PyValue::list(sort_values(vm, items, key, reverse)?))
}

fn builtin_enumerate(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("enumerate", 1, 2)?;
    let start = match args.get(1) {
        Some(s) => int_arg(s, "enumerate")?,
        None => 0,
    };
    let items = vm.collect_items(&args.args[0])?;
    Ok(PyValue::iterator(PyIterator::from_values(
        items
            .into_iter()
            .enumerate()
            .map(|(i, v)| PyValue::tuple(vec![PyValue::Int(start + i as i64), v]))
            .collect(),
    )))
}

fn builtin_reversed(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("reversed", 1, 1)?;
    let mut items = match &args.args[0] {
        PyValue::List(_) | PyValue::Tuple(_) | PyValue::Str(_) => {
            vm.collect_items(&args.args[0])?
        }
        other => {
            return Err(Error::TypeError(format!(
                "argument to reversed() must be a sequence, not '{}'",
                other.type_name()
            )));
        }
    };
    items.reverse();
    Ok(PyValue::iterator(PyIterator::from_values(items)))
}

fn builtin_any(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("any", 1, 1)?;
    let items = vm.collect_items(&args.args[0])?;
    Ok(PyValue::Bool(items.iter().any(PyValue::is_truthy)))
}

fn builtin_all(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("all", 1, 1)?;
    let items = vm.collect_items(&args.args[0])?;
    Ok(PyValue::Bool(items.iter().all(PyValue::is_truthy)))
}

/// `map(func, *iterables)`; Python 2 semantics, so the result is a list and
/// shorter iterables are padded with `None`.
fn builtin_map(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("map", 2, usize::MAX)?;
    let func = args.args[0].clone();
    let mut columns = Vec::with_capacity(args.args.len() - 1);
    for arg in &args.args[1..] {
        columns.push(vm.collect_items(arg)?);
    }
    let len = columns.iter().map(Vec::len).max().unwrap_or(0);
    let mut result = Vec::with_capacity(len);
    for i in 0..len {
        let row: Vec<PyValue> = columns
            .iter()
            .map(|col| col.get(i).cloned().unwrap_or(PyValue::None))
            .collect();
        let value = if matches!(func, PyValue::None) {
            if row.len() == 1 {
                row.into_iter().next().unwrap_or(PyValue::None)
            } else {
                PyValue::tuple(row)
            }
        } else {
            vm.call(&func, CallArgs::new(row))?
        };
        result.push(value);
    }
    Ok(PyValue::list(result))
}

fn builtin_filter(vm: &mut Vm, args: CallArgs) -> Result<PyValue> {
    args.check_arity("filter", 2, 2)?;
    let func = args.args[0].clone();
    let mut kept = Vec::new();
    for item in vm.collect_items(&args.args[1])? {
        let keep = if matches!(func, PyValue::None) {
            item.is_truthy()
        } else {
            vm.call(&func, CallArgs::new(vec![item.clone()]))?.is_truthy()
        };
        if keep {
            kept.push(item);
        }
    }
    Ok(match &args.args[1] {
        PyValue::Tuple(_) => PyValue::tuple(kept),
        PyValue::Str(_) => PyValue::Str(kept.iter().map(ToString::to_string).collect()),
        _ => PyValue::list(kept),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: Vec<PyValue>) -> Result<PyValue> {
        let mut vm = Vm::new();
        let func = lookup(name).unwrap();
        vm.call(&func, CallArgs::new(args))
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec!["  42 ".into()]).unwrap(), PyValue::Int(42));
        assert_eq!(call("int", vec!["ff".into(), 16.into()]).unwrap(), PyValue::Int(255));
        assert_eq!(call("int", vec!["0x1f".into(), 0.into()]).unwrap(), PyValue::Int(31));
        assert!(matches!(call("int", vec!["x".into()]), Err(Error::ValueError(_))));
        assert_eq!(call("float", vec!["2.5".into()]).unwrap(), PyValue::Float(2.5));
        assert_eq!(call("oct", vec![8.into()]).unwrap(), PyValue::from("010"));
        assert_eq!(call("hex", vec![(-255).into()]).unwrap(), PyValue::from("-0xff"));
        assert_eq!(call("round", vec![2.5.into()]).unwrap(), PyValue::Float(3.0));
    }

    #[test]
    fn test_range_is_capped() {
        assert_eq!(
            call("range", vec![5.into(), 0.into(), (-2).into()]).unwrap(),
            PyValue::from(vec![5, 3, 1])
        );
        let err = call("range", vec![PyValue::Int(i64::MAX)]).unwrap_err();
        assert!(matches!(err, Error::ValueError(_)));
    }

    #[test]
    fn test_isinstance_accepts_type_builtins() {
        let int_type = lookup("int").unwrap();
        assert_eq!(
            call("isinstance", vec![PyValue::Bool(true), int_type.clone()]).unwrap(),
            PyValue::Bool(true)
        );
        assert_eq!(
            call(
                "isinstance",
                vec![PyValue::from("x"), PyValue::tuple(vec![int_type, "str".into()])]
            )
            .unwrap(),
            PyValue::Bool(true)
        );
    }

    #[test]
    fn test_utility_builtins() {
        assert_eq!(
            call("test", vec![false.into(), 1.into(), true.into(), 2.into(), 3.into()]).unwrap(),
            PyValue::Int(2)
        );
        assert_eq!(call("test", vec![false.into(), 1.into(), 3.into()]).unwrap(), PyValue::Int(3));
        assert_eq!(call("same_type", vec![1.into(), 2.into()]).unwrap(), PyValue::Bool(true));
        assert_eq!(call("same_type", vec![1.into(), "2".into()]).unwrap(), PyValue::Bool(false));
    }

    #[test]
    fn test_sequence_helpers() {
        let nums = PyValue::from(vec![3, 1, 2]);
        assert_eq!(call("max", vec![nums.clone()]).unwrap(), PyValue::Int(3));
        assert_eq!(call("min", vec![4.into(), 2.into()]).unwrap(), PyValue::Int(2));
        assert_eq!(call("sum", vec![nums.clone()]).unwrap(), PyValue::Int(6));
        assert_eq!(call("sorted", vec![nums.clone()]).unwrap(), PyValue::from(vec![1, 2, 3]));
        assert!(matches!(call("max", vec![PyValue::list(vec![])]), Err(Error::ValueError(_))));
        assert_eq!(
            call("zip", vec![nums, PyValue::from("ab")]).unwrap().repr(),
            "[(3, 'a'), (1, 'b')]"
        );
    }

    #[test]
    fn test_unknown_name() {
        assert!(lookup("open").is_none());
        assert!(lookup("eval").is_none());
    }
}
