//! Importable modules: `math`, `string` and `json`.
//!
//! Restricted code can only `import` modules a host registered, and `math`
//! and `string` are also available as builtins under the standard policy.
//! Hosts build their own modules with [`ModuleBuilder`].

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::value::{CallArgs, Module, PyValue};
use crate::vm::Vm;

/// Builds a module value from constants and native functions.
///
/// ```
/// use restrictrs::{ModuleBuilder, PyValue};
///
/// let mut m = ModuleBuilder::new("config");
/// m.constant("VERSION", "1.2");
/// m.function("double", |_vm, args| {
///     Ok(PyValue::Int(args.get(0).and_then(PyValue::as_int).unwrap_or(0) * 2))
/// });
/// let module = m.build();
/// assert_eq!(module.type_name(), "module");
/// ```
pub struct ModuleBuilder {
    name: String,
    attrs: Vec<(String, PyValue)>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    pub fn constant(&mut self, name: impl Into<String>, value: impl Into<PyValue>) -> &mut Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn function<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Vm, CallArgs) -> Result<PyValue> + 'static,
    {
        self.attrs.push((name.to_string(), PyValue::native(name, f)));
        self
    }

    pub fn build(self) -> PyValue {
        PyValue::Module(Rc::new(Module {
            name: self.name,
            attrs: self.attrs,
        }))
    }
}

/// Modules a sandbox registers unless told otherwise.
pub fn default_modules() -> Vec<PyValue> {
    vec![math(), string(), json()]
}

fn float_at(args: &CallArgs, idx: usize, func: &str) -> Result<f64> {
    match args.get(idx) {
        Some(value) => value.as_float().ok_or_else(|| {
            Error::TypeError(format!(
                "{}() argument must be a number, not '{}'",
                func,
                value.type_name()
            ))
        }),
        None => Err(Error::TypeError(format!("{}() missing argument", func))),
    }
}

fn domain_error() -> Error {
    Error::ValueError("math domain error".to_string())
}

// ============================================================================
// math
// ============================================================================

/// Register a one-argument float function.
fn unary(m: &mut ModuleBuilder, name: &'static str, f: fn(f64) -> f64) {
    m.function(name, move |_vm, args| {
        args.check_arity(name, 1, 1)?;
        let result = f(float_at(&args, 0, name)?);
        if result.is_nan() && !args.args[0].as_float().is_some_and(f64::is_nan) {
            return Err(domain_error());
        }
        Ok(PyValue::Float(result))
    });
}

pub fn math() -> PyValue {
    let mut m = ModuleBuilder::new("math");
    m.constant("pi", std::f64::consts::PI)
        .constant("e", std::f64::consts::E)
        .constant("tau", std::f64::consts::TAU)
        .constant("inf", f64::INFINITY)
        .constant("nan", f64::NAN);

    unary(&mut m, "sqrt", f64::sqrt);
    unary(&mut m, "exp", f64::exp);
    unary(&mut m, "log10", f64::log10);
    unary(&mut m, "log2", f64::log2);
    unary(&mut m, "sin", f64::sin);
    unary(&mut m, "cos", f64::cos);
    unary(&mut m, "tan", f64::tan);
    unary(&mut m, "asin", f64::asin);
    unary(&mut m, "acos", f64::acos);
    unary(&mut m, "atan", f64::atan);
    unary(&mut m, "fabs", f64::abs);
    unary(&mut m, "degrees", f64::to_degrees);
    unary(&mut m, "radians", f64::to_radians);
    // Python 2 returns floats from floor and ceil.
    unary(&mut m, "floor", f64::floor);
    unary(&mut m, "ceil", f64::ceil);

    m.function("log", |_vm, args| {
        args.check_arity("log", 1, 2)?;
        let x = float_at(&args, 0, "log")?;
        if x <= 0.0 {
            return Err(domain_error());
        }
        match args.get(1) {
            Some(_) => {
                let base = float_at(&args, 1, "log")?;
                if base <= 0.0 || base == 1.0 {
                    return Err(domain_error());
                }
                Ok(PyValue::Float(x.ln() / base.ln()))
            }
            None => Ok(PyValue::Float(x.ln())),
        }
    });
    m.function("pow", |_vm, args| {
        args.check_arity("pow", 2, 2)?;
        Ok(PyValue::Float(
            float_at(&args, 0, "pow")?.powf(float_at(&args, 1, "pow")?),
        ))
    });
    m.function("atan2", |_vm, args| {
        args.check_arity("atan2", 2, 2)?;
        Ok(PyValue::Float(
            float_at(&args, 0, "atan2")?.atan2(float_at(&args, 1, "atan2")?),
        ))
    });
    m.function("hypot", |_vm, args| {
        args.check_arity("hypot", 2, 2)?;
        Ok(PyValue::Float(
            float_at(&args, 0, "hypot")?.hypot(float_at(&args, 1, "hypot")?),
        ))
    });
    m.function("fmod", |_vm, args| {
        args.check_arity("fmod", 2, 2)?;
        let y = float_at(&args, 1, "fmod")?;
        if y == 0.0 {
            return Err(domain_error());
        }
        Ok(PyValue::Float(float_at(&args, 0, "fmod")? % y))
    });
    m.function("isnan", |_vm, args| {
        args.check_arity("isnan", 1, 1)?;
        Ok(PyValue::Bool(float_at(&args, 0, "isnan")?.is_nan()))
    });
    m.function("isinf", |_vm, args| {
        args.check_arity("isinf", 1, 1)?;
        Ok(PyValue::Bool(float_at(&args, 0, "isinf")?.is_infinite()))
    });
    m.function("trunc", |_vm, args| {
        args.check_arity("trunc", 1, 1)?;
        let x = float_at(&args, 0, "trunc")?;
        if !x.is_finite() {
            return Err(Error::raised(
                "OverflowError",
                "cannot convert float infinity or nan to integer",
            ));
        }
        Ok(PyValue::Int(x.trunc() as i64))
    });
    m.function("factorial", |_vm, args| {
        args.check_arity("factorial", 1, 1)?;
        let n = match args.args[0].as_int() {
            Some(n) if n >= 0 => n,
            Some(_) => {
                return Err(Error::ValueError(
                    "factorial() not defined for negative values".to_string(),
                ));
            }
            None => {
                return Err(Error::ValueError(
                    "factorial() only accepts integral values".to_string(),
                ));
            }
        };
        (2..=n)
            .try_fold(1i64, |acc, i| acc.checked_mul(i))
            .map(PyValue::Int)
            .ok_or_else(|| Error::raised("OverflowError", "factorial() result too large"))
    });
    m.build()
}

// ============================================================================
// string
// ============================================================================

pub fn string() -> PyValue {
    const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
    const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const DIGITS: &str = "0123456789";
    const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
    const WHITESPACE: &str = " \t\n\r\x0b\x0c";

    let letters = format!("{}{}", LOWER, UPPER);
    let mut m = ModuleBuilder::new("string");
    m.constant("ascii_lowercase", LOWER)
        .constant("ascii_uppercase", UPPER)
        .constant("ascii_letters", letters.as_str())
        .constant("lowercase", LOWER)
        .constant("uppercase", UPPER)
        .constant("letters", letters.as_str())
        .constant("digits", DIGITS)
        .constant("hexdigits", "0123456789abcdefABCDEF")
        .constant("octdigits", "01234567")
        .constant("punctuation", PUNCTUATION)
        .constant("whitespace", WHITESPACE)
        .constant(
            "printable",
            format!("{}{}{}{}", DIGITS, letters, PUNCTUATION, WHITESPACE),
        );

    m.function("capwords", |_vm, args| {
        args.check_arity("capwords", 1, 1)?;
        let s = args.args[0]
            .as_str()
            .ok_or_else(|| Error::TypeError("capwords() argument must be str".to_string()))?;
        let words: Vec<String> = s
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                    None => String::new(),
                }
            })
            .collect();
        Ok(PyValue::Str(words.join(" ")))
    });
    m.function("join", |vm, args| {
        args.check_arity("join", 1, 2)?;
        let sep = match args.get(1) {
            Some(PyValue::Str(s)) => s.clone(),
            Some(other) => {
                return Err(Error::TypeError(format!(
                    "join() separator must be str, not {}",
                    other.type_name()
                )));
            }
            None => " ".to_string(),
        };
        let words = vm.collect_items(&args.args[0])?;
        let words: Vec<String> = words.iter().map(ToString::to_string).collect();
        Ok(PyValue::Str(words.join(&sep)))
    });
    m.build()
}

// ============================================================================
// json
// ============================================================================

pub fn json() -> PyValue {
    let mut m = ModuleBuilder::new("json");
    m.function("loads", |_vm, args| {
        args.check_arity("loads", 1, 1)?;
        let text = args.args[0].as_str().ok_or_else(|| {
            Error::TypeError(format!(
                "the JSON object must be str, not '{}'",
                args.args[0].type_name()
            ))
        })?;
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| Error::ValueError(e.to_string()))?;
        Ok(from_json(&value))
    });
    m.function("dumps", |_vm, args| {
        if args.args.len() != 1 {
            return Err(Error::TypeError(format!(
                "dumps() takes exactly 1 positional argument ({} given)",
                args.args.len()
            )));
        }
        let value = to_json(&args.args[0])?;
        match args.kwarg("indent") {
            Some(PyValue::None) | None => {
                let mut out = String::new();
                write_compact(&value, &mut out)?;
                Ok(PyValue::Str(out))
            }
            Some(indent) => {
                let width = indent.as_int().unwrap_or(0).max(0) as usize;
                let mut out = String::new();
                write_pretty(&value, width, 0, &mut out)?;
                Ok(PyValue::Str(out))
            }
        }
    });
    m.build()
}

pub(crate) fn from_json(value: &serde_json::Value) -> PyValue {
    match value {
        serde_json::Value::Null => PyValue::None,
        serde_json::Value::Bool(b) => PyValue::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => PyValue::Int(i),
            None => PyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => PyValue::Str(s.clone()),
        serde_json::Value::Array(items) => PyValue::list(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => PyValue::dict(
            map.iter()
                .map(|(k, v)| (PyValue::Str(k.clone()), from_json(v)))
                .collect(),
        ),
    }
}

pub(crate) fn to_json(value: &PyValue) -> Result<serde_json::Value> {
    Ok(match value {
        PyValue::None => serde_json::Value::Null,
        PyValue::Bool(b) => serde_json::Value::Bool(*b),
        PyValue::Int(i) => serde_json::Value::from(*i),
        PyValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| {
                Error::ValueError("Out of range float values are not JSON compliant".to_string())
            })?,
        PyValue::Str(s) => serde_json::Value::String(s.clone()),
        PyValue::List(_) | PyValue::Tuple(_) => {
            let items = value.as_sequence().unwrap_or_default();
            serde_json::Value::Array(items.iter().map(to_json).collect::<Result<_>>()?)
        }
        PyValue::Dict(pairs) => {
            let mut map = serde_json::Map::new();
            for (k, v) in pairs.borrow().iter() {
                let key = match k {
                    PyValue::Str(s) => s.clone(),
                    PyValue::Int(_) | PyValue::Float(_) | PyValue::Bool(_) => k.to_string(),
                    PyValue::None => "null".to_string(),
                    other => {
                        return Err(Error::TypeError(format!(
                            "keys must be str, int, float, bool or None, not {}",
                            other.type_name()
                        )));
                    }
                };
                map.insert(key, to_json(v)?);
            }
            serde_json::Value::Object(map)
        }
        other => {
            return Err(Error::TypeError(format!(
                "Object of type {} is not JSON serializable",
                other.type_name()
            )));
        }
    })
}

fn encode_error(e: serde_json::Error) -> Error {
    Error::ValueError(e.to_string())
}

/// Python's default `json.dumps` layout: `", "` and `": "` separators.
fn write_compact(value: &serde_json::Value, out: &mut String) -> Result<()> {
    match value {
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_compact(item, out)?;
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&serde_json::to_string(k).map_err(encode_error)?);
                out.push_str(": ");
                write_compact(v, out)?;
            }
            out.push('}');
        }
        scalar => out.push_str(&serde_json::to_string(scalar).map_err(encode_error)?),
    }
    Ok(())
}

/// `json.dumps(value, indent=n)`: one item per line.
fn write_pretty(value: &serde_json::Value, width: usize, depth: usize, out: &mut String) -> Result<()> {
    let newline = |out: &mut String, depth: usize| {
        out.push('\n');
        out.push_str(&" ".repeat(width * depth));
    };
    match value {
        serde_json::Value::Array(items) if !items.is_empty() => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline(out, depth + 1);
                write_pretty(item, width, depth + 1, out)?;
            }
            newline(out, depth);
            out.push(']');
        }
        serde_json::Value::Object(map) if !map.is_empty() => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline(out, depth + 1);
                out.push_str(&serde_json::to_string(k).map_err(encode_error)?);
                out.push_str(": ");
                write_pretty(v, width, depth + 1, out)?;
            }
            newline(out, depth);
            out.push('}');
        }
        other => write_compact(other, out)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(module: &PyValue, name: &str, args: CallArgs) -> Result<PyValue> {
        let PyValue::Module(m) = module else {
            panic!("not a module");
        };
        let func = m.attr(name).expect("missing function");
        Vm::new().call(&func, args)
    }

    #[test]
    fn test_math_functions() {
        let math = math();
        assert_eq!(
            call(&math, "sqrt", CallArgs::new(vec![16.into()])).unwrap(),
            PyValue::Float(4.0)
        );
        assert!(matches!(
            call(&math, "sqrt", CallArgs::new(vec![(-1).into()])),
            Err(Error::ValueError(_))
        ));
        assert_eq!(
            call(&math, "factorial", CallArgs::new(vec![5.into()])).unwrap(),
            PyValue::Int(120)
        );
    }

    #[test]
    fn test_json_round_trip_layout() {
        let json = json();
        let value = PyValue::dict(vec![
            ("a".into(), PyValue::from(vec![1, 2])),
            ("b".into(), PyValue::None),
        ]);
        let text = call(&json, "dumps", CallArgs::new(vec![value])).unwrap();
        assert_eq!(text, PyValue::from(r#"{"a": [1, 2], "b": null}"#));

        let parsed = call(&json, "loads", CallArgs::new(vec![text])).unwrap();
        assert_eq!(parsed.repr(), "{'a': [1, 2], 'b': None}");
        assert!(matches!(
            call(&json, "loads", CallArgs::new(vec!["{".into()])),
            Err(Error::ValueError(_))
        ));
    }

    #[test]
    fn test_string_module() {
        let string = string();
        assert_eq!(
            call(&string, "capwords", CallArgs::new(vec!["hello  wide world".into()])).unwrap(),
            PyValue::from("Hello Wide World")
        );
    }
}
