use std::fmt;

use thiserror::Error;

use crate::diagnostic::{Diagnostic, Span};

/// A malformed-input error reported by the lexer or parser.
///
/// It is returned as-is by every compile entry point, before any
/// restriction analysis runs, so its position information is exactly what
/// the front end saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub filename: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column, counted in characters.
    pub column: u32,
    /// Byte offset into the source.
    pub offset: usize,
    /// The full text of the offending line.
    pub text: String,
}

impl SyntaxError {
    /// Render a rustc-style snippet pointing at the error.
    pub fn render(&self, source: &str) -> String {
        let end = source[self.offset.min(source.len())..]
            .chars()
            .next()
            .map_or(self.offset, |c| self.offset + c.len_utf8());
        Diagnostic::new(&self.message)
            .with_filename(&self.filename)
            .with_source(source)
            .with_label(Span::new(self.offset, end), "")
            .to_string()
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, line {})", self.message, self.filename, self.line)
    }
}

impl std::error::Error for SyntaxError {}

/// Every policy violation found in one compile, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionError {
    pub errors: Vec<String>,
    /// Where each violation sits in the source, parallel to `errors`.
    pub spans: Vec<Option<Span>>,
}

impl RestrictionError {
    /// Render every violation as a snippet of `source`.
    pub fn render(&self, source: &str, filename: &str) -> String {
        let mut out = String::new();
        for (i, error) in self.errors.iter().enumerate() {
            // The line prefix is redundant next to the snippet header.
            let message = match error.split_once(": ") {
                Some((prefix, rest)) if prefix.starts_with("Line ") => rest,
                _ => error.as_str(),
            };
            let mut diagnostic = Diagnostic::new(message)
                .with_filename(filename)
                .with_source(source);
            if let Some(Some(span)) = self.spans.get(i) {
                diagnostic = diagnostic.with_label(*span, "restricted");
            }
            out.push_str(&diagnostic.to_string());
        }
        out
    }
}

impl fmt::Display for RestrictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "restricted compile failed: {}", self.errors.join("; "))
    }
}

impl std::error::Error for RestrictionError {}

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Restriction(#[from] RestrictionError),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("TypeError: expected {expected}, got {got}")]
    Type { expected: String, got: String },

    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("NameError: name '{0}' is not defined")]
    NameError(String),

    #[error("AttributeError: {0}")]
    AttributeError(String),

    #[error("KeyError: {0}")]
    KeyError(String),

    #[error("IndexError: {0}")]
    IndexError(String),

    #[error("ValueError: {0}")]
    ValueError(String),

    #[error("ImportError: {0}")]
    ImportError(String),

    #[error("ZeroDivisionError: division by zero")]
    DivisionByZero,

    #[error("AssertionError: {0}")]
    AssertionError(String),

    /// An exception raised by restricted code, or by the VM for a type
    /// with no variant of its own.
    #[error("{exc_type}: {message}")]
    Raised { exc_type: String, message: String },

    #[error("Instruction limit exceeded (limit: {0})")]
    InstructionLimitExceeded(u64),

    #[error("Recursion limit exceeded (limit: {0})")]
    RecursionLimitExceeded(usize),
}

impl Error {
    /// The Python exception class this error surfaces as inside restricted code.
    pub fn exception_type(&self) -> &str {
        match self {
            Error::Syntax(_) => "SyntaxError",
            Error::Restriction(_) => "SyntaxError",
            Error::Unsupported(_) => "RuntimeError",
            Error::Type { .. } | Error::TypeError(_) => "TypeError",
            Error::NameError(_) => "NameError",
            Error::AttributeError(_) => "AttributeError",
            Error::KeyError(_) => "KeyError",
            Error::IndexError(_) => "IndexError",
            Error::ValueError(_) => "ValueError",
            Error::ImportError(_) => "ImportError",
            Error::DivisionByZero => "ZeroDivisionError",
            Error::AssertionError(_) => "AssertionError",
            Error::Raised { exc_type, .. } => exc_type.as_str(),
            Error::InstructionLimitExceeded(_) => "InstructionLimitExceeded",
            Error::RecursionLimitExceeded(_) => "RecursionLimitExceeded",
        }
    }

    /// The exception message without the class prefix, as bound by `except ... as e`.
    pub fn exception_message(&self) -> String {
        match self {
            Error::Raised { message, .. } => message.clone(),
            Error::Type { expected, got } => format!("expected {}, got {}", expected, got),
            Error::TypeError(m)
            | Error::AttributeError(m)
            | Error::KeyError(m)
            | Error::IndexError(m)
            | Error::ValueError(m)
            | Error::ImportError(m)
            | Error::AssertionError(m)
            | Error::Unsupported(m) => m.clone(),
            Error::NameError(name) => format!("name '{}' is not defined", name),
            Error::DivisionByZero => "division by zero".to_string(),
            other => other.to_string(),
        }
    }

    /// Resource-limit errors abort execution and cannot be caught by `except`.
    pub fn is_uncatchable(&self) -> bool {
        matches!(
            self,
            Error::InstructionLimitExceeded(_) | Error::RecursionLimitExceeded(_)
        )
    }

    /// Build the error for `raise <exc_type>(message)`.
    pub fn raised(exc_type: impl Into<String>, message: impl Into<String>) -> Self {
        let exc_type = exc_type.into();
        let message = message.into();
        match exc_type.as_str() {
            "TypeError" => Error::TypeError(message),
            "AttributeError" => Error::AttributeError(message),
            "KeyError" => Error::KeyError(message),
            "IndexError" => Error::IndexError(message),
            "ValueError" => Error::ValueError(message),
            "AssertionError" => Error::AssertionError(message),
            _ => Error::Raised { exc_type, message },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError {
            message: "invalid syntax".to_string(),
            filename: "<string>".to_string(),
            line: 3,
            column: 5,
            offset: 20,
            text: "x = = 1".to_string(),
        };
        assert_eq!(err.to_string(), "invalid syntax (<string>, line 3)");
    }

    #[test]
    fn test_exception_type_mapping() {
        assert_eq!(Error::raised("ValueError", "bad").exception_type(), "ValueError");
        assert_eq!(Error::raised("MyError", "bad").exception_type(), "MyError");
        assert_eq!(
            Error::TypeError("attribute-less object (assign or del)".into()).to_string(),
            "TypeError: attribute-less object (assign or del)"
        );
        assert!(Error::InstructionLimitExceeded(10).is_uncatchable());
        assert!(!Error::DivisionByZero.is_uncatchable());
    }
}
