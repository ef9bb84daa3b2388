//! Methods of the builtin types: `str`, `list`, `tuple` and `dict`.
//!
//! Attribute lookup on a builtin value produces a bound method only for the
//! names listed here, so [`has_method`] is the single source of truth for
//! what restricted code can reach on these types.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::operators::compare_values;
use crate::slice::normalize_index;
use crate::value::{CallArgs, PyValue};
use crate::vm::Vm;

const STR_METHODS: &[&str] = &[
    "capitalize", "center", "count", "endswith", "find", "index", "isalnum", "isalpha",
    "isdigit", "islower", "isspace", "isupper", "join", "ljust", "lower", "lstrip", "replace",
    "rfind", "rjust", "rsplit", "rstrip", "split", "splitlines", "startswith", "strip",
    "swapcase", "title", "upper", "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "count", "extend", "index", "insert", "pop", "remove", "reverse", "sort",
];

const TUPLE_METHODS: &[&str] = &["count", "index"];

const DICT_METHODS: &[&str] = &[
    "clear", "copy", "get", "has_key", "items", "keys", "pop", "setdefault", "update", "values",
];

/// Whether `name` is a method of the builtin type of `value`.
pub fn has_method(value: &PyValue, name: &str) -> bool {
    let table = match value {
        PyValue::Str(_) => STR_METHODS,
        PyValue::List(_) => LIST_METHODS,
        PyValue::Tuple(_) => TUPLE_METHODS,
        PyValue::Dict(_) => DICT_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

/// Call method `name` on a builtin value.
pub fn call_method(vm: &mut Vm, receiver: &PyValue, name: &str, args: CallArgs) -> Result<PyValue> {
    match receiver {
        PyValue::Str(s) => call_str_method(vm, s, name, args),
        PyValue::List(items) => call_list_method(vm, items, name, args),
        PyValue::Tuple(items) => call_sequence_query(items, "tuple", name, args),
        PyValue::Dict(pairs) => call_dict_method(vm, pairs, name, args),
        other => Err(no_attribute(other, name)),
    }
}

fn no_attribute(value: &PyValue, name: &str) -> Error {
    Error::AttributeError(format!(
        "'{}' object has no attribute '{}'",
        value.type_name(),
        name
    ))
}

fn str_arg<'a>(args: &'a CallArgs, idx: usize, method: &str) -> Result<&'a str> {
    match args.get(idx) {
        Some(PyValue::Str(s)) => Ok(s),
        Some(other) => Err(Error::TypeError(format!(
            "{}() argument {} must be str, not {}",
            method,
            idx + 1,
            other.type_name()
        ))),
        None => Err(Error::TypeError(format!("{}() missing argument", method))),
    }
}

fn int_arg(args: &CallArgs, idx: usize, method: &str) -> Result<Option<i64>> {
    match args.get(idx) {
        None | Some(PyValue::None) => Ok(None),
        Some(value) => value.as_int().map(Some).ok_or_else(|| {
            Error::TypeError(format!(
                "{}() integer argument expected, got {}",
                method,
                value.type_name()
            ))
        }),
    }
}

// ---------------------------------------------------------------------------
// str
// ---------------------------------------------------------------------------

fn call_str_method(vm: &mut Vm, s: &str, method: &str, args: CallArgs) -> Result<PyValue> {
    let text = |value: String| Ok(PyValue::Str(value));
    match method {
        "lower" => {
            args.check_arity(method, 0, 0)?;
            text(s.to_lowercase())
        }
        "upper" => {
            args.check_arity(method, 0, 0)?;
            text(s.to_uppercase())
        }
        "swapcase" => {
            args.check_arity(method, 0, 0)?;
            text(
                s.chars()
                    .flat_map(|c| {
                        if c.is_uppercase() {
                            c.to_lowercase().collect::<Vec<_>>()
                        } else {
                            c.to_uppercase().collect::<Vec<_>>()
                        }
                    })
                    .collect(),
            )
        }
        "strip" | "lstrip" | "rstrip" => {
            args.check_arity(method, 0, 1)?;
            let chars: Option<Vec<char>> = match args.get(0) {
                None | Some(PyValue::None) => None,
                Some(_) => Some(str_arg(&args, 0, method)?.chars().collect()),
            };
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            text(match method {
                "strip" => s.trim_matches(matches).to_string(),
                "lstrip" => s.trim_start_matches(matches).to_string(),
                _ => s.trim_end_matches(matches).to_string(),
            })
        }
        "split" | "rsplit" => {
            args.check_arity(method, 0, 2)?;
            let sep = match args.get(0) {
                None | Some(PyValue::None) => None,
                Some(_) => Some(str_arg(&args, 0, method)?),
            };
            let maxsplit = int_arg(&args, 1, method)?.filter(|n| *n >= 0);
            Ok(PyValue::list(
                split(s, sep, maxsplit, method == "rsplit")?
                    .into_iter()
                    .map(PyValue::Str)
                    .collect(),
            ))
        }
        "splitlines" => {
            args.check_arity(method, 0, 0)?;
            Ok(PyValue::list(s.lines().map(PyValue::from).collect()))
        }
        "join" => {
            args.check_arity(method, 1, 1)?;
            let items = vm.collect_items(&args.args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                match item {
                    PyValue::Str(part) => parts.push(part),
                    other => {
                        return Err(Error::TypeError(format!(
                            "sequence item {}: expected string, {} found",
                            i,
                            other.type_name()
                        )));
                    }
                }
            }
            text(parts.join(s))
        }
        "replace" => {
            args.check_arity(method, 2, 3)?;
            let old = str_arg(&args, 0, method)?;
            let new = str_arg(&args, 1, method)?;
            match int_arg(&args, 2, method)? {
                Some(n) if n >= 0 => text(s.replacen(old, new, n as usize)),
                _ => text(s.replace(old, new)),
            }
        }
        "startswith" | "endswith" => {
            args.check_arity(method, 1, 1)?;
            let candidates = match &args.args[0] {
                PyValue::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            let mut found = false;
            for candidate in candidates {
                let affix = candidate.as_str().ok_or_else(|| {
                    Error::TypeError(format!(
                        "{} first arg must be str or a tuple of str, not {}",
                        method,
                        candidate.type_name()
                    ))
                })?;
                found |= if method == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
            }
            Ok(PyValue::Bool(found))
        }
        "find" | "rfind" | "index" => {
            args.check_arity(method, 1, 1)?;
            let needle = str_arg(&args, 0, method)?;
            let byte_pos = if method == "rfind" {
                s.rfind(needle)
            } else {
                s.find(needle)
            };
            match byte_pos {
                Some(pos) => Ok(PyValue::Int(s[..pos].chars().count() as i64)),
                None if method == "index" => {
                    Err(Error::ValueError("substring not found".to_string()))
                }
                None => Ok(PyValue::Int(-1)),
            }
        }
        "count" => {
            args.check_arity(method, 1, 1)?;
            let needle = str_arg(&args, 0, method)?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(PyValue::Int(count as i64))
        }
        "isdigit" | "isalpha" | "isalnum" | "isspace" => {
            args.check_arity(method, 0, 0)?;
            let test: fn(char) -> bool = match method {
                "isdigit" => |c| c.is_ascii_digit(),
                "isalpha" => char::is_alphabetic,
                "isalnum" => char::is_alphanumeric,
                _ => char::is_whitespace,
            };
            Ok(PyValue::Bool(!s.is_empty() && s.chars().all(test)))
        }
        "isupper" | "islower" => {
            args.check_arity(method, 0, 0)?;
            let cased: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
            let test: fn(&char) -> bool = if method == "isupper" {
                |c| c.is_uppercase()
            } else {
                |c| c.is_lowercase()
            };
            Ok(PyValue::Bool(!cased.is_empty() && cased.iter().all(test)))
        }
        "title" => {
            args.check_arity(method, 0, 0)?;
            let mut result = String::with_capacity(s.len());
            let mut prev_cased = false;
            for c in s.chars() {
                if prev_cased {
                    result.extend(c.to_lowercase());
                } else {
                    result.extend(c.to_uppercase());
                }
                prev_cased = c.is_alphabetic();
            }
            text(result)
        }
        "capitalize" => {
            args.check_arity(method, 0, 0)?;
            let mut chars = s.chars();
            text(match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            })
        }
        "center" | "ljust" | "rjust" => {
            args.check_arity(method, 1, 2)?;
            let width = int_arg(&args, 0, method)?.unwrap_or(0).max(0) as usize;
            let fill = match args.get(1) {
                Some(_) => {
                    let fill = str_arg(&args, 1, method)?;
                    let mut chars = fill.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c,
                        _ => {
                            return Err(Error::TypeError(
                                "the fill character must be exactly one character long"
                                    .to_string(),
                            ));
                        }
                    }
                }
                None => ' ',
            };
            let len = s.chars().count();
            if len >= width {
                return text(s.to_string());
            }
            let pad = width - len;
            let (left, right) = match method {
                "ljust" => (0, pad),
                "rjust" => (pad, 0),
                _ => (pad / 2 + (pad & width & 1), pad - pad / 2 - (pad & width & 1)),
            };
            let fill_str = |n: usize| fill.to_string().repeat(n);
            text(format!("{}{}{}", fill_str(left), s, fill_str(right)))
        }
        "zfill" => {
            args.check_arity(method, 1, 1)?;
            let width = int_arg(&args, 0, method)?.unwrap_or(0).max(0) as usize;
            let len = s.chars().count();
            if len >= width {
                return text(s.to_string());
            }
            let (sign, digits) = match s.strip_prefix(['-', '+']) {
                Some(rest) => (&s[..1], rest),
                None => ("", s),
            };
            text(format!("{}{}{}", sign, "0".repeat(width - len), digits))
        }
        _ => Err(no_attribute(&PyValue::Str(String::new()), method)),
    }
}

fn split(s: &str, sep: Option<&str>, maxsplit: Option<i64>, from_right: bool) -> Result<Vec<String>> {
    let limit = maxsplit.map(|n| n as usize);
    match sep {
        Some("") => Err(Error::ValueError("empty separator".to_string())),
        Some(sep) => {
            let parts: Vec<String> = match (limit, from_right) {
                (Some(n), false) => s.splitn(n + 1, sep).map(str::to_string).collect(),
                (Some(n), true) => {
                    let mut parts: Vec<String> =
                        s.rsplitn(n + 1, sep).map(str::to_string).collect();
                    parts.reverse();
                    parts
                }
                (None, _) => s.split(sep).map(str::to_string).collect(),
            };
            Ok(parts)
        }
        None => {
            let words: Vec<&str> = s.split_whitespace().collect();
            let Some(n) = limit.filter(|n| *n < words.len()) else {
                return Ok(words.into_iter().map(str::to_string).collect());
            };
            // Keep the unsplit remainder verbatim, minus surrounding whitespace.
            if from_right {
                let mut rest = s.trim_end();
                let mut tail = Vec::new();
                for _ in 0..n {
                    let cut = rest.rfind(char::is_whitespace).map_or(0, |i| i + 1);
                    tail.push(rest[cut..].to_string());
                    rest = rest[..cut].trim_end();
                }
                let mut parts = vec![rest.trim_start().to_string()];
                parts.extend(tail.into_iter().rev());
                Ok(parts)
            } else {
                let mut rest = s.trim_start();
                let mut parts = Vec::new();
                for _ in 0..n {
                    let cut = rest.find(char::is_whitespace).unwrap_or(rest.len());
                    parts.push(rest[..cut].to_string());
                    rest = rest[cut..].trim_start();
                }
                parts.push(rest.trim_end().to_string());
                Ok(parts)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// list and tuple
// ---------------------------------------------------------------------------

/// `index` and `count`, shared by lists and tuples.
fn call_sequence_query(items: &[PyValue], type_name: &str, method: &str, args: CallArgs) -> Result<PyValue> {
    match method {
        "index" => {
            args.check_arity(method, 1, 1)?;
            items
                .iter()
                .position(|item| item == &args.args[0])
                .map(|i| PyValue::Int(i as i64))
                .ok_or_else(|| Error::ValueError(format!("{}.index(x): x not in {}", type_name, type_name)))
        }
        "count" => {
            args.check_arity(method, 1, 1)?;
            let count = items.iter().filter(|item| *item == &args.args[0]).count();
            Ok(PyValue::Int(count as i64))
        }
        _ => Err(Error::AttributeError(format!(
            "'{}' object has no attribute '{}'",
            type_name, method
        ))),
    }
}

fn call_list_method(
    vm: &mut Vm,
    list: &Rc<RefCell<Vec<PyValue>>>,
    method: &str,
    args: CallArgs,
) -> Result<PyValue> {
    match method {
        "append" => {
            args.check_arity(method, 1, 1)?;
            let mut args = args.args;
            list.borrow_mut().append(&mut args);
            Ok(PyValue::None)
        }
        "extend" => {
            args.check_arity(method, 1, 1)?;
            let mut items = vm.collect_items(&args.args[0])?;
            list.borrow_mut().append(&mut items);
            Ok(PyValue::None)
        }
        "insert" => {
            args.check_arity(method, 2, 2)?;
            let index = int_arg(&args, 0, method)?.unwrap_or(0);
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let idx = if index < 0 {
                (len + index).max(0)
            } else {
                index.min(len)
            } as usize;
            items.insert(idx, args.args[1].clone());
            Ok(PyValue::None)
        }
        "pop" => {
            args.check_arity(method, 0, 1)?;
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(Error::IndexError("pop from empty list".to_string()));
            }
            let idx = match int_arg(&args, 0, method)? {
                None => items.len() - 1,
                Some(i) => normalize_index(i, items.len(), "pop")?,
            };
            Ok(items.remove(idx))
        }
        "remove" => {
            args.check_arity(method, 1, 1)?;
            let pos = list.borrow().iter().position(|x| x == &args.args[0]);
            match pos {
                Some(idx) => {
                    list.borrow_mut().remove(idx);
                    Ok(PyValue::None)
                }
                None => Err(Error::ValueError("list.remove(x): x not in list".to_string())),
            }
        }
        "reverse" => {
            args.check_arity(method, 0, 0)?;
            list.borrow_mut().reverse();
            Ok(PyValue::None)
        }
        "sort" => {
            if !args.args.is_empty() {
                return Err(Error::TypeError(
                    "sort() takes no positional arguments".to_string(),
                ));
            }
            let (key, reverse) = sort_options(&args.kwargs, method)?;
            let items = list.borrow().clone();
            let sorted = sort_values(vm, items, key, reverse)?;
            *list.borrow_mut() = sorted;
            Ok(PyValue::None)
        }
        _ => {
            let items = list.borrow().clone();
            call_sequence_query(&items, "list", method, args)
        }
    }
}

/// Read `key=` and `reverse=` for `sort` and `sorted`.
pub fn sort_options(kwargs: &[(String, PyValue)], func: &str) -> Result<(Option<PyValue>, bool)> {
    let mut key = None;
    let mut reverse = false;
    for (name, value) in kwargs {
        match name.as_str() {
            "key" if matches!(value, PyValue::None) => key = None,
            "key" => key = Some(value.clone()),
            "reverse" => reverse = value.is_truthy(),
            other => {
                return Err(Error::TypeError(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    func, other
                )));
            }
        }
    }
    Ok((key, reverse))
}

/// Stable sort, optionally by `key(item)`. Incomparable items are an error.
pub fn sort_values(
    vm: &mut Vm,
    items: Vec<PyValue>,
    key: Option<PyValue>,
    reverse: bool,
) -> Result<Vec<PyValue>> {
    let mut keyed: Vec<(PyValue, PyValue)> = Vec::with_capacity(items.len());
    for item in items {
        let k = match &key {
            Some(func) => vm.call(func, CallArgs::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        keyed.push((k, item));
    }

    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = compare_values(a, b).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        });
        if reverse { ordering.reverse() } else { ordering }
    });
    if let Some(err) = failure {
        return Err(err);
    }
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

// ---------------------------------------------------------------------------
// dict
// ---------------------------------------------------------------------------

type Pairs = Rc<RefCell<Vec<(PyValue, PyValue)>>>;

/// Look `key` up in a dict's pairs.
pub fn dict_get(pairs: &[(PyValue, PyValue)], key: &PyValue) -> Option<PyValue> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

/// Insert or replace `key` in a dict.
pub fn dict_set(pairs: &Pairs, key: PyValue, value: PyValue) -> Result<()> {
    if !key.is_hashable() {
        return Err(Error::TypeError(format!(
            "unhashable type: '{}'",
            key.type_name()
        )));
    }
    let mut pairs = pairs.borrow_mut();
    match pairs.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key, value)),
    }
    Ok(())
}

fn call_dict_method(vm: &mut Vm, pairs: &Pairs, method: &str, args: CallArgs) -> Result<PyValue> {
    match method {
        "get" => {
            args.check_arity(method, 1, 2)?;
            let default = args.get(1).cloned().unwrap_or(PyValue::None);
            Ok(dict_get(&pairs.borrow(), &args.args[0]).unwrap_or(default))
        }
        "has_key" => {
            args.check_arity(method, 1, 1)?;
            Ok(PyValue::Bool(dict_get(&pairs.borrow(), &args.args[0]).is_some()))
        }
        "keys" => {
            args.check_arity(method, 0, 0)?;
            Ok(PyValue::list(pairs.borrow().iter().map(|(k, _)| k.clone()).collect()))
        }
        "values" => {
            args.check_arity(method, 0, 0)?;
            Ok(PyValue::list(pairs.borrow().iter().map(|(_, v)| v.clone()).collect()))
        }
        "items" => {
            args.check_arity(method, 0, 0)?;
            Ok(PyValue::list(
                pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| PyValue::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            ))
        }
        "copy" => {
            args.check_arity(method, 0, 0)?;
            Ok(PyValue::dict(pairs.borrow().clone()))
        }
        "clear" => {
            args.check_arity(method, 0, 0)?;
            pairs.borrow_mut().clear();
            Ok(PyValue::None)
        }
        "update" => {
            args.check_arity(method, 0, 1)?;
            let mut updates = match args.get(0) {
                Some(PyValue::Dict(other)) => other.borrow().clone(),
                Some(other) => {
                    let mut pairs = Vec::new();
                    for entry in vm.collect_items(other)? {
                        match entry.as_sequence().as_deref() {
                            Some([k, v]) => pairs.push((k.clone(), v.clone())),
                            _ => {
                                return Err(Error::TypeError(
                                    "cannot convert dictionary update sequence element"
                                        .to_string(),
                                ));
                            }
                        }
                    }
                    pairs
                }
                None => Vec::new(),
            };
            updates.extend(
                args.kwargs
                    .iter()
                    .map(|(k, v)| (PyValue::Str(k.clone()), v.clone())),
            );
            for (k, v) in updates {
                dict_set(pairs, k, v)?;
            }
            Ok(PyValue::None)
        }
        "setdefault" => {
            args.check_arity(method, 1, 2)?;
            if let Some(existing) = dict_get(&pairs.borrow(), &args.args[0]) {
                return Ok(existing);
            }
            let default = args.get(1).cloned().unwrap_or(PyValue::None);
            dict_set(pairs, args.args[0].clone(), default.clone())?;
            Ok(default)
        }
        "pop" => {
            args.check_arity(method, 1, 2)?;
            let key = &args.args[0];
            let pos = pairs.borrow().iter().position(|(k, _)| k == key);
            match (pos, args.get(1)) {
                (Some(pos), _) => Ok(pairs.borrow_mut().remove(pos).1),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Error::KeyError(key.repr())),
            }
        }
        _ => Err(no_attribute(&PyValue::dict(Vec::new()), method)),
    }
}
