//! Restricted expression evaluator.
//!
//! A [`RestrictedEval`] compiles one expression once and evaluates it any
//! number of times against caller-supplied name mappings. Only the names
//! the expression actually reads are copied from the mapping, so large
//! mappings cost nothing extra.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::error::Result;
use crate::guards::Guard;
use crate::policy::Policy;
use crate::restricted::{CompiledUnit, compile_restricted_eval};
use crate::value::PyValue;
use crate::vm::Vm;

/// A compiled restricted expression.
///
/// ```
/// use std::collections::HashMap;
/// use restrictrs::{PyValue, RestrictedEval};
///
/// let expr = RestrictedEval::new("price * qty").unwrap();
/// let mut names = HashMap::new();
/// names.insert("price".to_string(), PyValue::Int(3));
/// names.insert("qty".to_string(), PyValue::Int(4));
/// assert_eq!(expr.eval(&names).unwrap(), PyValue::Int(12));
/// ```
#[derive(Debug, Clone)]
pub struct RestrictedEval {
    expr: String,
    unit: CompiledUnit,
    policy: Policy,
}

impl RestrictedEval {
    /// Compile `expr` with no builtins available.
    pub fn new(expr: &str) -> Result<Self> {
        Self::with_policy(expr, Policy::empty())
    }

    pub fn with_policy(expr: &str, policy: Policy) -> Result<Self> {
        let expr = normalize(expr);
        let unit = compile_restricted_eval(&expr)?;
        Ok(Self { expr, unit, policy })
    }

    /// The expression after normalization.
    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// Free names the expression reads.
    pub fn used_names(&self) -> &BTreeSet<String> {
        &self.unit.used_names
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Evaluate with names taken from `mapping`.
    ///
    /// A used name missing from `mapping` is a `NameError` only if
    /// evaluation reaches it.
    pub fn eval(&self, mapping: &HashMap<String, PyValue>) -> Result<PyValue> {
        self.run(|name| mapping.get(name).cloned())
    }

    /// Evaluate with names given as `(name, value)` pairs.
    pub fn eval_with<I, K, V>(&self, pairs: I) -> Result<PyValue>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PyValue>,
    {
        let mapping: HashMap<String, PyValue> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.eval(&mapping)
    }

    fn run<F>(&self, lookup: F) -> Result<PyValue>
    where
        F: Fn(&str) -> Option<PyValue>,
    {
        let mut vm = Vm::with_policy(self.policy.clone());
        for guard in [Guard::GetAttr, Guard::GetItem] {
            vm.set_global(guard.name(), guard.default_value());
        }
        for name in &self.unit.used_names {
            if let Some(value) = lookup(name) {
                vm.set_global(name.clone(), value);
            }
        }
        trace!(expr = %self.expr, "evaluating");
        vm.execute(self.unit.code())
    }
}

/// Strip, unify line endings and parenthesize multi-line text so it parses
/// as one expression.
fn normalize(expr: &str) -> String {
    let expr = expr.trim().replace("\r\n", "\n").replace('\r', "\n");
    if expr.contains('\n') {
        format!("({})", expr)
    } else {
        expr
    }
}
