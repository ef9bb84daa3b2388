//! Tokenizer for the restricted Python dialect.
//!
//! Produces the whole token stream up front, including the synthetic
//! `Newline`, `Indent` and `Dedent` tokens that carry Python's block
//! structure. Newlines inside brackets and after a trailing backslash are
//! joined, comments and blank lines are dropped.

use crate::diagnostic::Span;
use crate::error::SyntaxError;
use crate::token::{AugOp, Token, TokenKind};

/// Tab stops used when measuring indentation.
const TAB_SIZE: u32 = 8;

/// Build a [`SyntaxError`] for a byte offset in `source`.
pub(crate) fn syntax_error(
    source: &str,
    filename: &str,
    message: impl Into<String>,
    offset: usize,
) -> SyntaxError {
    let offset = offset.min(source.len());
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[offset..]
        .find('\n')
        .map_or(source.len(), |i| offset + i);
    let line = source[..offset].matches('\n').count() as u32 + 1;
    let column = source[line_start..offset].chars().count() as u32 + 1;
    SyntaxError {
        message: message.into(),
        filename: filename.to_string(),
        line,
        column,
        offset,
        text: source[line_start..line_end].trim_end_matches('\r').to_string(),
    }
}

/// Whether `text` lexes as a single name token.
pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let starts_name = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_');
    starts_name
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && TokenKind::keyword(text).is_none()
}

pub struct Lexer<'a> {
    source: &'a str,
    filename: &'a str,
    /// Byte position of the next unread character.
    pos: usize,
    line: u32,
    /// Byte offset where the current physical line starts.
    line_start: usize,
    indent_stack: Vec<u32>,
    paren_depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, filename: &'a str) -> Self {
        Self {
            source,
            filename,
            pos: 0,
            line: 1,
            line_start: 0,
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            if self.at_line_start && self.paren_depth == 0 && !self.read_indentation()? {
                break;
            }

            self.skip_inline_whitespace();

            let Some(ch) = self.peek() else {
                break;
            };

            match ch {
                '#' => self.skip_comment(),
                '\\' if matches!(self.peek_at(1), Some('\n' | '\r')) => {
                    self.bump();
                    self.consume_newline();
                }
                '\n' | '\r' => {
                    let start = self.pos;
                    if self.paren_depth == 0 {
                        self.push(TokenKind::Newline, start, start + 1);
                        self.at_line_start = true;
                    }
                    self.consume_newline();
                }
                c if c.is_alphabetic() || c == '_' => self.read_name_or_string()?,
                c if c.is_ascii_digit() => self.read_number()?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_number()?
                }
                '\'' | '"' => {
                    let start = self.pos;
                    let value = self.read_string(false)?;
                    self.push(TokenKind::Str(value), start, self.pos);
                }
                _ => self.read_operator()?,
            }
        }

        if self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Dedent))
        {
            self.push(TokenKind::Newline, self.pos, self.pos);
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, self.pos, self.pos);
        }
        self.push(TokenKind::EndOfFile, self.pos, self.pos);
        Ok(self.tokens)
    }

    // -----------------------------------------------------------------------
    // Character helpers
    // -----------------------------------------------------------------------

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consume `\n`, `\r\n` or a lone `\r` and start a new physical line.
    fn consume_newline(&mut self) {
        if self.peek() == Some('\r') {
            self.bump();
        }
        if self.peek() == Some('\n') {
            self.bump();
        }
        self.line += 1;
        self.line_start = self.pos;
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> SyntaxError {
        syntax_error(self.source, self.filename, message, offset)
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        let (line, line_start) = if start >= self.line_start {
            (self.line, self.line_start)
        } else {
            // Token began on an earlier line (triple-quoted string).
            (
                self.source[..start].matches('\n').count() as u32 + 1,
                self.source[..start].rfind('\n').map_or(0, |i| i + 1),
            )
        };
        let column = self.source[line_start..start].chars().count() as u32 + 1;
        self.tokens
            .push(Token::new(kind, Span::new(start, end), line, column));
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(' ' | '\t' | '\x0c') = self.peek() {
            self.bump();
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.bump();
        }
    }

    // -----------------------------------------------------------------------
    // Indentation
    // -----------------------------------------------------------------------

    /// Measure the indentation of the next logical line and emit
    /// `Indent`/`Dedent` tokens. Blank and comment-only lines are skipped.
    /// Returns `false` at end of input.
    fn read_indentation(&mut self) -> Result<bool, SyntaxError> {
        loop {
            let mut width = 0u32;
            loop {
                match self.peek() {
                    Some(' ') => width += 1,
                    Some('\t') => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                    Some('\x0c') => width = 0,
                    _ => break,
                }
                self.bump();
            }

            match self.peek() {
                None => return Ok(false),
                Some('#') => {
                    self.skip_comment();
                    if self.peek().is_none() {
                        return Ok(false);
                    }
                    self.consume_newline();
                }
                Some('\n' | '\r') => self.consume_newline(),
                Some(_) => {
                    self.at_line_start = false;
                    let current = self.indent_stack.last().copied().unwrap_or(0);
                    if width > current {
                        self.indent_stack.push(width);
                        self.push(TokenKind::Indent, self.pos, self.pos);
                    } else if width < current {
                        while self.indent_stack.last().is_some_and(|&top| top > width) {
                            self.indent_stack.pop();
                            self.push(TokenKind::Dedent, self.pos, self.pos);
                        }
                        if self.indent_stack.last() != Some(&width) {
                            return Err(self.error(
                                "unindent does not match any outer indentation level",
                                self.pos,
                            ));
                        }
                    }
                    return Ok(true);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Names, numbers, strings
    // -----------------------------------------------------------------------

    fn read_name_or_string(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let ident = &self.source[start..self.pos];

        if matches!(self.peek(), Some('\'' | '"')) {
            let prefix = ident.to_ascii_lowercase();
            if matches!(prefix.as_str(), "r" | "u" | "b" | "ur" | "br" | "rb") {
                let raw = prefix.contains('r');
                let value = self.read_string(raw)?;
                self.push(TokenKind::Str(value), start, self.pos);
                return Ok(());
            }
        }

        let kind = TokenKind::keyword(ident).unwrap_or_else(|| TokenKind::Name(ident.to_string()));
        self.push(kind, start, self.pos);
        Ok(())
    }

    fn read_number(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;

        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let digits_start = self.pos;
                while self.peek().is_some_and(|c| c.is_digit(radix)) {
                    self.bump();
                }
                let digits = &self.source[digits_start..self.pos];
                let value = i64::from_str_radix(digits, radix)
                    .map_err(|_| self.error("invalid integer literal", start))?;
                self.skip_long_suffix();
                self.push(TokenKind::Int(value), start, self.pos);
                return self.reject_trailing_name(start);
            }
        }

        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.bump();
                if signed {
                    self.bump();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }

        let text = &self.source[start..self.pos];
        let kind = if is_float {
            TokenKind::Float(
                text.parse::<f64>()
                    .map_err(|_| self.error("invalid float literal", start))?,
            )
        } else if text.len() > 1 && text.starts_with('0') {
            // Legacy octal literal such as 017.
            let value = i64::from_str_radix(&text[1..], 8)
                .map_err(|_| self.error("invalid token", start))?;
            TokenKind::Int(value)
        } else {
            TokenKind::Int(
                text.parse::<i64>()
                    .map_err(|_| self.error("integer literal is too large", start))?,
            )
        };
        if !is_float {
            self.skip_long_suffix();
        }
        self.push(kind, start, self.pos);
        self.reject_trailing_name(start)
    }

    fn skip_long_suffix(&mut self) {
        if matches!(self.peek(), Some('l' | 'L')) {
            self.bump();
        }
    }

    /// `1abc` and `3j` are not valid tokens.
    fn reject_trailing_name(&self, start: usize) -> Result<(), SyntaxError> {
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.error("invalid syntax", start));
        }
        Ok(())
    }

    /// Read a string literal starting at the opening quote.
    fn read_string(&mut self, raw: bool) -> Result<String, SyntaxError> {
        let start = self.pos;
        let quote = self.bump().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                let message = if triple {
                    "EOF while scanning triple-quoted string literal"
                } else {
                    "EOL while scanning string literal"
                };
                return Err(self.error(message, start));
            };

            if c == quote {
                if !triple {
                    self.bump();
                    return Ok(value);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    return Ok(value);
                }
                self.bump();
                value.push(c);
                continue;
            }

            match c {
                '\n' | '\r' => {
                    if !triple {
                        return Err(self.error("EOL while scanning string literal", start));
                    }
                    self.consume_newline();
                    value.push('\n');
                }
                '\\' => {
                    self.bump();
                    self.read_escape(raw, &mut value, start)?;
                }
                _ => {
                    self.bump();
                    value.push(c);
                }
            }
        }
    }

    /// Handle the character(s) after a backslash inside a string literal.
    fn read_escape(&mut self, raw: bool, out: &mut String, start: usize) -> Result<(), SyntaxError> {
        let Some(c) = self.peek() else {
            return Err(self.error("EOL while scanning string literal", start));
        };

        if c == '\n' || c == '\r' {
            self.consume_newline();
            if raw {
                out.push('\\');
                out.push('\n');
            }
            return Ok(());
        }

        self.bump();
        if raw {
            out.push('\\');
            out.push(c);
            return Ok(());
        }

        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' | '\'' | '"' => out.push(c),
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.bump();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'x' => out.push(self.read_hex_escape(2, start)?),
            'u' => out.push(self.read_hex_escape(4, start)?),
            'U' => out.push(self.read_hex_escape(8, start)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn read_hex_escape(&mut self, digits: usize, start: usize) -> Result<char, SyntaxError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let d = self
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("truncated \\xXX escape", start))?;
            code = code * 16 + d;
            self.bump();
        }
        char::from_u32(code).ok_or_else(|| self.error("illegal Unicode character", start))
    }

    // -----------------------------------------------------------------------
    // Operators and delimiters
    // -----------------------------------------------------------------------

    fn read_operator(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let rest = &self.source[self.pos..];

        const THREE: &[(&str, AugOp)] = &[
            ("**=", AugOp::Pow),
            ("//=", AugOp::FloorDiv),
            (">>=", AugOp::RShift),
            ("<<=", AugOp::LShift),
        ];
        for (text, op) in THREE {
            if rest.starts_with(text) {
                self.pos += 3;
                self.push(TokenKind::AugAssign(*op), start, self.pos);
                return Ok(());
            }
        }

        let two = match rest.get(..2) {
            Some("**") => Some(TokenKind::DoubleStar),
            Some("//") => Some(TokenKind::DoubleSlash),
            Some("<<") => Some(TokenKind::LeftShift),
            Some(">>") => Some(TokenKind::RightShift),
            Some("<=") => Some(TokenKind::LessEqual),
            Some(">=") => Some(TokenKind::GreaterEqual),
            Some("==") => Some(TokenKind::EqEqual),
            Some("!=") | Some("<>") => Some(TokenKind::NotEqual),
            Some("+=") => Some(TokenKind::AugAssign(AugOp::Add)),
            Some("-=") => Some(TokenKind::AugAssign(AugOp::Sub)),
            Some("*=") => Some(TokenKind::AugAssign(AugOp::Mult)),
            Some("/=") => Some(TokenKind::AugAssign(AugOp::Div)),
            Some("%=") => Some(TokenKind::AugAssign(AugOp::Mod)),
            Some("&=") => Some(TokenKind::AugAssign(AugOp::BitAnd)),
            Some("|=") => Some(TokenKind::AugAssign(AugOp::BitOr)),
            Some("^=") => Some(TokenKind::AugAssign(AugOp::BitXor)),
            _ => None,
        };
        if let Some(kind) = two {
            self.pos += 2;
            self.push(kind, start, self.pos);
            return Ok(());
        }

        let c = self.peek().unwrap_or('\0');
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '&' => TokenKind::Amper,
            '|' => TokenKind::Pipe,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '=' => TokenKind::Equal,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '@' => TokenKind::At,
            '(' | '[' | '{' => {
                self.paren_depth += 1;
                match c {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                }
            }
            ')' | ']' | '}' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                match c {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                }
            }
            _ => return Err(self.error("invalid syntax", start)),
        };
        self.bump();
        self.push(kind, start, self.pos);
        Ok(())
    }
}

/// Tokenize `source`, reporting errors against `filename`.
pub fn tokenize(source: &str, filename: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source, filename).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, "<test>")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn name(n: &str) -> TokenKind {
        TokenKind::Name(n.to_string())
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("x = 1\n"),
            vec![
                name("x"),
                TokenKind::Equal,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = kinds("if x:\n    y\n\n    # comment\nz\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::If,
                name("x"),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                name("y"),
                TokenKind::Newline,
                TokenKind::Dedent,
                name("z"),
                TokenKind::Newline,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn test_dedent_at_end_of_input() {
        let tokens = kinds("def f():\n    return 1");
        assert_eq!(
            &tokens[tokens.len() - 3..],
            &[TokenKind::Newline, TokenKind::Dedent, TokenKind::EndOfFile]
        );
    }

    #[test]
    fn test_implicit_line_joining() {
        assert_eq!(
            kinds("f(1,\n  2)\n"),
            vec![
                name("f"),
                TokenKind::LParen,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::RParen,
                TokenKind::Newline,
                TokenKind::EndOfFile
            ]
        );
        assert_eq!(kinds("a = 1 + \\\n 2\n").len(), 7);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("0x1F 0o17 017 0b101 10L 1.5 .5 2e3"),
            vec![
                TokenKind::Int(31),
                TokenKind::Int(15),
                TokenKind::Int(15),
                TokenKind::Int(5),
                TokenKind::Int(10),
                TokenKind::Float(1.5),
                TokenKind::Float(0.5),
                TokenKind::Float(2000.0),
                TokenKind::Newline,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'a\tb' "q\"" r'\n' u'\x41' '''x
y'''"#),
            vec![
                TokenKind::Str("a\tb".into()),
                TokenKind::Str("q\"".into()),
                TokenKind::Str("\\n".into()),
                TokenKind::Str("A".into()),
                TokenKind::Str("x\ny".into()),
                TokenKind::Newline,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("a **= b // c <> d >> e"),
            vec![
                name("a"),
                TokenKind::AugAssign(AugOp::Pow),
                name("b"),
                TokenKind::DoubleSlash,
                name("c"),
                TokenKind::NotEqual,
                name("d"),
                TokenKind::RightShift,
                name("e"),
                TokenKind::Newline,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("total"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("print"));
        assert!(!is_identifier("f(): pass\nimport os\ndef g"));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("print exec yield printed"),
            vec![
                TokenKind::Print,
                TokenKind::Exec,
                TokenKind::Yield,
                name("printed"),
                TokenKind::Newline,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn test_token_positions() {
        let tokens = tokenize("a = 1\n  \nbb = 2\n", "<test>").unwrap();
        let bb = tokens
            .iter()
            .find(|t| t.kind == name("bb"))
            .unwrap();
        assert_eq!((bb.line, bb.column), (3, 1));
        assert_eq!(bb.span, Span::new(9, 11));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc\n", "<test>").unwrap_err();
        assert_eq!(err.message, "EOL while scanning string literal");
        assert_eq!((err.line, err.column), (1, 5));
        assert_eq!(err.text, "x = 'abc");
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n    a\n  b\n", "<test>").unwrap_err();
        assert_eq!(
            err.message,
            "unindent does not match any outer indentation level"
        );
        assert_eq!(err.line, 3);
    }
}
