//! Execution policy: which builtins restricted code may call, and the
//! resource limits it runs under.
//!
//! A [`Policy`] is plain data. It is handed to [`crate::Vm::with_policy`],
//! [`crate::Sandbox::with_policy`] or [`crate::RestrictedEval::with_policy`];
//! nothing reads a process-wide default.

use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Builtins with no side effects beyond their return value.
pub const SAFE_BUILTINS: &[&str] = &[
    "abs", "bool", "callable", "chr", "divmod", "float", "hash", "hex", "int", "isinstance",
    "len", "oct", "ord", "pow", "range", "repr", "round", "str", "tuple", "zip", "setattr",
    "delattr", "None", "True", "False",
];

/// Constructors whose output size is capped by [`Limits::max_sequence_len`].
pub const LIMITED_BUILTINS: &[&str] = &["range", "list", "tuple"];

pub const UTILITY_BUILTINS: &[&str] = &["same_type", "test", "math", "string"];

/// Helpers over sequences. Several call back into restricted code.
pub const SEQUENCE_BUILTINS: &[&str] = &[
    "min", "max", "sum", "sorted", "enumerate", "reversed", "any", "all", "map", "filter",
    "list", "dict",
];

/// Resource limits for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Limits {
    /// Bytecode instructions per execution. `None` is unbounded.
    pub max_instructions: Option<u64>,
    /// Nested restricted-function calls.
    pub max_recursion_depth: usize,
    /// Longest sequence `range`, repetition or `list`/`tuple` may build.
    pub max_sequence_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_instructions: Some(1_000_000),
            max_recursion_depth: 50,
            max_sequence_len: 100_000,
        }
    }
}

impl Limits {
    pub fn unlimited() -> Self {
        Self {
            max_instructions: None,
            max_recursion_depth: 1_000,
            max_sequence_len: usize::MAX,
        }
    }
}

/// The builtins exposed to restricted code plus its limits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Policy {
    pub builtins: BTreeSet<String>,
    pub limits: Limits,
}

impl Policy {
    /// No builtins at all. Names must come from the caller's globals.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn safe() -> Self {
        Self::empty().allow_all(SAFE_BUILTINS)
    }

    /// [`Policy::safe`] plus the size-limited constructors.
    pub fn limited() -> Self {
        Self::safe().allow_all(LIMITED_BUILTINS)
    }

    /// Every builtin group.
    pub fn standard() -> Self {
        Self::limited()
            .allow_all(UTILITY_BUILTINS)
            .allow_all(SEQUENCE_BUILTINS)
    }

    pub fn allow(mut self, name: impl Into<String>) -> Self {
        self.builtins.insert(name.into());
        self
    }

    pub fn allow_all(mut self, names: &[&str]) -> Self {
        self.builtins.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn deny(mut self, name: &str) -> Self {
        self.builtins.remove(name);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn allows(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }
}
