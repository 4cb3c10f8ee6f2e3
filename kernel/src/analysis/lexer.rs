//! Line-oriented tokenizer for Python-style function source.
//!
//! Produces logical lines: physical lines joined across open brackets and
//! backslash continuations, with comments and blank lines dropped. Each
//! logical line carries the indentation of its first physical line.

use super::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Name,
    Number,
    Str,
    Op,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogicalLine {
    /// 1-based line of the first token.
    pub line: usize,
    /// Column of the first token (tabs count as 8).
    pub indent: usize,
    pub tokens: Vec<Token>,
}

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const TWO_CHAR_OPS: &[&str] = &[
    "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", "->", "**",
    "//", ":=", "<<", ">>",
];

pub(crate) fn tokenize(source: &str) -> Result<Vec<LogicalLine>, AnalysisError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    at_line_start: bool,
    lines: Vec<LogicalLine>,
    current: Option<LogicalLine>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            at_line_start: true,
            lines: Vec::new(),
            current: None,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<Vec<LogicalLine>, AnalysisError> {
        let mut column = 0;
        while let Some(c) = self.peek(0) {
            if self.at_line_start {
                column = self.measure_indent();
                self.at_line_start = false;
                continue;
            }
            match c {
                '\n' => {
                    self.pos += 1;
                    self.line += 1;
                    self.at_line_start = true;
                    if self.depth == 0 {
                        self.end_line();
                    }
                }
                '#' => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                c if c.is_whitespace() => self.pos += 1,
                c if c.is_alphabetic() || c == '_' => {
                    let start = self.pos;
                    while self
                        .peek(0)
                        .is_some_and(|c| c.is_alphanumeric() || c == '_')
                    {
                        self.pos += 1;
                    }
                    if matches!(self.peek(0), Some('\'' | '"'))
                        && is_string_prefix(&self.slice(start))
                    {
                        self.pos = start;
                        self.string(column, start)?;
                    } else {
                        let text = self.slice(start);
                        self.push(TokenKind::Name, text, column);
                    }
                }
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) =>
                {
                    let start = self.pos;
                    while self
                        .peek(0)
                        .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
                    {
                        self.pos += 1;
                    }
                    let text = self.slice(start);
                    self.push(TokenKind::Number, text, column);
                }
                '\'' | '"' => {
                    let start = self.pos;
                    self.string(column, start)?;
                }
                _ => self.operator(column)?,
            }
        }
        if self.depth > 0 {
            return Err(AnalysisError::Syntax {
                line: self.line,
                detail: "unclosed bracket at end of source".into(),
            });
        }
        self.end_line();
        Ok(self.lines)
    }

    fn measure_indent(&mut self) -> usize {
        let mut column = 0;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => column += 1,
                '\t' => column = (column / 8 + 1) * 8,
                '\x0c' => column = 0,
                _ => break,
            }
            self.pos += 1;
        }
        column
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn push(&mut self, kind: TokenKind, text: String, column: usize) {
        let line = self.line;
        let current = self.current.get_or_insert_with(|| LogicalLine {
            line,
            indent: column,
            tokens: Vec::new(),
        });
        current.tokens.push(Token { kind, text, line });
    }

    fn end_line(&mut self) {
        if let Some(done) = self.current.take() {
            self.lines.push(done);
        }
    }

    /// Scan a string literal starting at `start` (prefix included).
    fn string(&mut self, column: usize, start: usize) -> Result<(), AnalysisError> {
        let open_line = self.line;
        while self.peek(0).is_some_and(char::is_alphabetic) {
            self.pos += 1;
        }
        let Some(quote) = self.peek(0) else {
            return Err(unterminated(open_line));
        };
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        loop {
            let Some(c) = self.peek(0) else {
                return Err(unterminated(open_line));
            };
            match c {
                '\\' => {
                    if self.peek(1) == Some('\n') {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                '\n' if !triple => return Err(unterminated(open_line)),
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                c if c == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        let text = self.slice(start);
        self.push(TokenKind::Str, text, column);
        Ok(())
    }

    fn operator(&mut self, column: usize) -> Result<(), AnalysisError> {
        let rest: String = self.chars[self.pos..(self.pos + 3).min(self.chars.len())]
            .iter()
            .collect();
        let op = THREE_CHAR_OPS
            .iter()
            .chain(TWO_CHAR_OPS)
            .find(|op| rest.starts_with(**op))
            .map_or_else(|| rest.chars().take(1).collect::<String>(), |op| (*op).to_string());
        match op.as_str() {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => {
                if self.depth == 0 {
                    return Err(AnalysisError::Syntax {
                        line: self.line,
                        detail: format!("unbalanced {op:?}"),
                    });
                }
                self.depth -= 1;
            }
            _ => {}
        }
        self.pos += op.chars().count();
        self.push(TokenKind::Op, op, column);
        Ok(())
    }
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "r" | "b" | "f" | "u" | "rb" | "br" | "fr" | "rf"
    )
}

fn unterminated(line: usize) -> AnalysisError {
    AnalysisError::Syntax {
        line,
        detail: "unterminated string literal".into(),
    }
}
