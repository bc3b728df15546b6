//! Tokenizer for rule scripts.
//!
//! Produces an indentation-aware token stream: `Indent` / `Dedent` tokens
//! bracket blocks, `Newline` ends logical lines, and line breaks inside
//! brackets are ignored.

use super::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Break,
    Continue,
    Pass,
    Return,
    Yield,
    Raise,
    And,
    Or,
    Not,
    Is,
    None,
    True,
    False,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Self> {
        Some(match word {
            "if" => Keyword::If,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "pass" => Keyword::Pass,
            "return" => Keyword::Return,
            "yield" => Keyword::Yield,
            "raise" => Keyword::Raise,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "is" => Keyword::Is,
            "None" => Keyword::None,
            "True" => Keyword::True,
            "False" => Keyword::False,
            _ => return None,
        })
    }
}

/// Words reserved by the host language that rule scripts may not use.
const FORBIDDEN: &[&str] = &[
    "def", "class", "import", "from", "lambda", "try", "except", "finally", "with", "as", "async",
    "await", "global", "nonlocal", "assert", "del",
];

const OPERATORS: &[&str] = &[
    "**=", "//=", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "**", "//", "+", "-", "*",
    "/", "%", "<", ">", "=", ".", ",", ":", ";", "(", ")", "[", "]", "{", "}",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Kw(Keyword),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    Lexer::new(&dedent(source)).run()
}

/// Remove indentation common to every non-blank line.
fn dedent(source: &str) -> String {
    let margin = source
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    source
        .lines()
        .map(|l| if l.trim().is_empty() { "" } else { &l[margin..] })
        .collect::<Vec<_>>()
        .join("\n")
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, CompileError> {
        let mut line_start = true;
        while self.index < self.chars.len() {
            if line_start && self.depth == 0 {
                line_start = false;
                if !self.indentation()? {
                    continue;
                }
            }
            let ch = self.chars[self.index];
            match ch {
                '\n' => {
                    self.index += 1;
                    if self.depth == 0 {
                        self.newline();
                        line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' | '\x0c' => self.index += 1,
                '#' => self.skip_comment(),
                '\\' if self.peek(1) == Some('\n') => {
                    self.index += 2;
                    self.line += 1;
                }
                '0'..='9' => self.number()?,
                '.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
                '\'' | '"' => self.string(false)?,
                c if c.is_alphabetic() || c == '_' => self.word()?,
                _ => self.operator()?,
            }
        }
        self.newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::at(message, self.line)
    }

    fn newline(&mut self) {
        if matches!(self.tokens.last(), Some(t) if t.tok != Tok::Newline) {
            self.push(Tok::Newline);
        }
    }

    fn skip_comment(&mut self) {
        while self.index < self.chars.len() && self.chars[self.index] != '\n' {
            self.index += 1;
        }
    }

    /// Measure the indentation of a new line and emit block tokens.
    /// Returns false for blank or comment-only lines.
    fn indentation(&mut self) -> Result<bool, CompileError> {
        let mut width = 0;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\r' | '\x0c' => {}
                _ => break,
            }
            self.index += 1;
        }
        match self.peek(0) {
            None => return Ok(false),
            Some('#') => {
                self.skip_comment();
                return Ok(false);
            }
            Some('\n') => return Ok(false),
            _ => {}
        }
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent);
        } else {
            while width < self.indents.last().copied().unwrap_or(0) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if width != self.indents.last().copied().unwrap_or(0) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(true)
    }

    fn number(&mut self) -> Result<(), CompileError> {
        let start = self.index;
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X')) {
            self.index += 2;
            while self.peek(0).is_some_and(|c| c.is_ascii_hexdigit() || c == '_') {
                self.index += 1;
            }
            let digits: String = self.chars[start + 2..self.index]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.error(format!("invalid hex literal '0x{}'", digits)))?;
            self.push(Tok::Int(value));
            return Ok(());
        }
        let mut is_float = false;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() || c == '_' {
                self.index += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.index += 1;
            } else if matches!(c, 'e' | 'E') {
                is_float = true;
                self.index += 1;
                if matches!(self.peek(0), Some('+' | '-')) {
                    self.index += 1;
                }
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.index]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error(format!("invalid number '{}'", text)))?;
            self.push(Tok::Float(value));
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| self.error(format!("integer literal too large: {}", text)))?;
            self.push(Tok::Int(value));
        }
        Ok(())
    }

    fn word(&mut self) -> Result<(), CompileError> {
        let start = self.index;
        while self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.index += 1;
        }
        let word: String = self.chars[start..self.index].iter().collect();
        if matches!(self.peek(0), Some('\'' | '"')) {
            match word.to_lowercase().as_str() {
                "r" => return self.string(true),
                "u" => return self.string(false),
                "f" | "rf" | "fr" => return Err(self.error("f-strings are not supported")),
                "b" | "rb" | "br" => return Err(self.error("bytes literals are not supported")),
                _ => {}
            }
        }
        if FORBIDDEN.contains(&word.as_str()) {
            return Err(self.error(format!("'{}' is not allowed in rule scripts", word)));
        }
        match Keyword::lookup(&word) {
            Some(kw) => self.push(Tok::Kw(kw)),
            None => self.push(Tok::Name(word)),
        }
        Ok(())
    }

    fn string(&mut self, raw: bool) -> Result<(), CompileError> {
        let quote = self.chars[self.index];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.index += if triple { 3 } else { 1 };
        let start_line = self.line;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(CompileError::at("unterminated string literal", start_line));
            };
            if c == quote {
                if !triple {
                    self.index += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.index += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(CompileError::at("unterminated string literal", start_line));
                }
                self.line += 1;
            }
            if c == '\\' && !raw {
                self.index += 1;
                let escaped = self.escape()?;
                out.extend(escaped);
                continue;
            }
            if c == '\\' && raw && self.peek(1).is_some() {
                out.push(c);
                self.index += 1;
                if let Some(next) = self.peek(0) {
                    out.push(next);
                    self.index += 1;
                }
                continue;
            }
            out.push(c);
            self.index += 1;
        }
        self.push(Tok::Str(out));
        Ok(())
    }

    fn escape(&mut self) -> Result<Option<char>, CompileError> {
        let Some(c) = self.peek(0) else {
            return Err(self.error("unterminated string literal"));
        };
        self.index += 1;
        Ok(Some(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '\n' => {
                self.line += 1;
                return Ok(None);
            }
            'x' => self.hex_escape(2)?,
            'u' => self.hex_escape(4)?,
            'U' => self.hex_escape(8)?,
            _ => {
                // unknown escapes keep the backslash
                self.index -= 1;
                '\\'
            }
        }))
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, CompileError> {
        let end = self.index + len;
        if end > self.chars.len() {
            return Err(self.error("truncated escape sequence"));
        }
        let digits: String = self.chars[self.index..end].iter().collect();
        self.index = end;
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(format!("invalid escape sequence '{}'", digits)))
    }

    fn operator(&mut self) -> Result<(), CompileError> {
        for op in OPERATORS {
            let len = op.chars().count();
            if self.index + len <= self.chars.len()
                && self.chars[self.index..self.index + len].iter().copied().eq(op.chars())
            {
                self.index += len;
                match *op {
                    "(" | "[" | "{" => self.depth += 1,
                    ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                self.push(Tok::Op(op));
                return Ok(());
            }
        }
        Err(self.error(format!("unexpected character '{}'", self.chars[self.index])))
    }
}
