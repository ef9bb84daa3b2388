//! Source positions and rustc-style rendering of compile errors.
//!
//! Syntax tree nodes carry a [`Loc`] (line number plus byte [`Span`]); the
//! code generator copies spans into the [`CodeObject`](crate::bytecode::CodeObject)
//! so runtime failures can be traced back to source. [`Diagnostic`] renders a
//! message with the offending source line and an underline.

use std::collections::BTreeMap;
use std::fmt;

/// A span in the source code (byte offsets).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Where a syntax tree node came from: 1-based line and byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub line: u32,
    pub span: Span,
}

impl Loc {
    pub fn new(line: u32, span: Span) -> Self {
        Self { line, span }
    }

    /// Extend this location to the end of `other`, keeping the start line.
    pub fn to(self, other: Loc) -> Loc {
        Loc::new(self.line, self.span.cover(other.span))
    }
}

/// An underlined span with an optional message.
#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

impl Label {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// A compile error rendered against its source text.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The error message (e.g., "invalid syntax")
    pub message: String,
    /// Filename shown in the location header
    pub filename: Option<String>,
    /// The source code that caused the error
    pub source: String,
    /// Labels pointing to specific locations
    pub labels: Vec<Label>,
    /// Additional notes
    pub notes: Vec<String>,
    /// Help suggestions
    pub help: Vec<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            filename: None,
            source: String::new(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::new(span, message));
        self
    }

    /// Add a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Add a help suggestion.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    /// Find the line and column for a byte offset (both 1-based).
    fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for (i, ch) in self.source.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// Get the line content for a given line number (1-indexed).
    fn get_line(&self, line_num: usize) -> &str {
        self.source.lines().nth(line_num - 1).unwrap_or("")
    }

    /// Calculate the display width needed for line numbers.
    fn line_number_width(&self) -> usize {
        let max_line = self.source.lines().count();
        max_line.to_string().len().max(1)
    }

    fn write_trailer(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for note in &self.notes {
            writeln!(f, "  = note: {}", note)?;
        }
        for help in &self.help {
            writeln!(f, "  = help: {}", help)?;
        }
        Ok(())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if self.source.is_empty() || self.labels.is_empty() {
            return self.write_trailer(f);
        }

        let width = self.line_number_width();

        if let (Some(filename), Some(first)) = (&self.filename, self.labels.first()) {
            let (line, col) = self.offset_to_line_col(first.span.start);
            writeln!(f, "{:width$}--> {}:{}:{}", "", filename, line, col, width = width)?;
        }

        let mut labels_by_line: BTreeMap<usize, Vec<&Label>> = BTreeMap::new();
        for label in &self.labels {
            let (line, _) = self.offset_to_line_col(label.span.start);
            labels_by_line.entry(line).or_default().push(label);
        }

        writeln!(f, "{:width$} |", "", width = width)?;

        for (&line_num, labels) in &labels_by_line {
            let line_content = self.get_line(line_num);
            writeln!(f, "{:width$} | {}", line_num, line_content, width = width)?;

            for label in labels {
                let (_, start_col) = self.offset_to_line_col(label.span.start);
                let (end_line, end_col) = self.offset_to_line_col(label.span.end);

                // Multi-line spans are underlined to the end of the first line.
                let underline_len = if end_line == line_num {
                    end_col.saturating_sub(start_col).max(1)
                } else {
                    (line_content.chars().count() + 1).saturating_sub(start_col).max(1)
                };
                write!(f, "{:width$} | ", "", width = width)?;
                write!(f, "{:pad$}{}", "", "^".repeat(underline_len), pad = start_col - 1)?;
                if !label.message.is_empty() {
                    write!(f, " {}", label.message)?;
                }
                writeln!(f)?;
            }
        }

        writeln!(f, "{:width$} |", "", width = width)?;
        self.write_trailer(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_diagnostic() {
        let diag = Diagnostic::new("invalid syntax")
            .with_source("x = = 1")
            .with_label(Span::new(4, 5), "unexpected `=`")
            .with_note("an expression was expected here")
            .with_help("remove the second `=`");

        let output = diag.to_string();
        assert!(output.contains("error: invalid syntax"));
        assert!(output.contains("x = = 1"));
        assert!(output.contains("    ^ unexpected `=`"));
        assert!(output.contains("note:"));
        assert!(output.contains("help:"));
    }

    #[test]
    fn test_location_header() {
        let diag = Diagnostic::new("invalid syntax")
            .with_filename("script.py")
            .with_source("a = 1\nb = )\n")
            .with_label(Span::new(10, 11), "");

        let output = diag.to_string();
        assert!(output.contains("--> script.py:2:5"));
        assert!(output.contains("2 | b = )"));
    }

    #[test]
    fn test_no_source_only_trailer() {
        let diag = Diagnostic::new("oops").with_note("nothing to show");
        assert_eq!(diag.to_string(), "error: oops\n  = note: nothing to show\n");
    }

    #[test]
    fn test_span_cover() {
        assert_eq!(Span::new(4, 6).cover(Span::new(1, 5)), Span::new(1, 6));
    }
}
