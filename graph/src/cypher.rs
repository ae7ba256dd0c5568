//! Just enough openCypher lexing to split scripts, inspect statements and render
//! literals. This is not a full grammar.

use ragraph_core::graph::{Properties, Scalar};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CypherSyntaxError {
    #[error("unterminated {0} literal")]
    Unterminated(&'static str),
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `quoted` is set for backtick-escaped names, which are never keywords.
    Ident { name: String, quoted: bool },
    Str(String),
    Integer(i64),
    Float(f64),
    Param(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Dot,
    Dash,
    Arrow,
    LeftArrow,
    Eq,
    PlusEq,
    Semicolon,
    Symbol(char),
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident { name, quoted: false } if name.eq_ignore_ascii_case(keyword))
    }
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), CypherSyntaxError> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some('/') => {
                            for c in self.chars.by_ref() {
                                if c == '\n' {
                                    break;
                                }
                            }
                        }
                        Some('*') => {
                            self.chars.next();
                            self.chars.next();
                            let mut prev = '\0';
                            loop {
                                match self.chars.next() {
                                    Some('/') if prev == '*' => break,
                                    Some(c) => prev = c,
                                    None => return Err(CypherSyntaxError::Unterminated("comment")),
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, CypherSyntaxError> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(CypherSyntaxError::Unterminated("string")),
                },
                Some(c) => out.push(c),
                None => return Err(CypherSyntaxError::Unterminated("string")),
            }
        }
    }

    fn quoted_name(&mut self) -> Result<String, CypherSyntaxError> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('`') if self.chars.peek() == Some(&'`') => {
                    self.chars.next();
                    out.push('`');
                }
                Some('`') => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(CypherSyntaxError::Unterminated("identifier")),
            }
        }
    }

    fn word(&mut self, first: char) -> String {
        let mut out = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                out.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self, first: char) -> Result<Token, CypherSyntaxError> {
        let mut raw = String::from(first);
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                raw.push(c);
            } else if c == '.' && !is_float {
                let mut ahead = self.chars.clone();
                ahead.next();
                if !ahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                    break;
                }
                is_float = true;
                raw.push(c);
            } else if (c == 'e' || c == 'E') && !raw.contains(['e', 'E']) {
                is_float = true;
                raw.push(c);
                self.chars.next();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '-' || sign == '+' {
                        raw.push(sign);
                        self.chars.next();
                    }
                }
                continue;
            } else {
                break;
            }
            self.chars.next();
        }

        if is_float {
            raw.parse()
                .map(Token::Float)
                .map_err(|_| CypherSyntaxError::InvalidNumber(raw))
        } else {
            raw.parse()
                .map(Token::Integer)
                .map_err(|_| CypherSyntaxError::InvalidNumber(raw))
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, CypherSyntaxError> {
        self.skip_trivia()?;
        let Some(c) = self.chars.next() else {
            return Ok(None);
        };

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '.' => Token::Dot,
            ';' => Token::Semicolon,
            '=' => Token::Eq,
            '-' if self.chars.peek() == Some(&'>') => {
                self.chars.next();
                Token::Arrow
            }
            '-' if self.chars.peek().is_some_and(|d| d.is_ascii_digit()) => {
                // Negative literal. Relationship dashes are never followed by a digit.
                self.number('-')?
            }
            '-' => Token::Dash,
            '<' if self.chars.peek() == Some(&'-') => {
                self.chars.next();
                Token::LeftArrow
            }
            '+' if self.chars.peek() == Some(&'=') => {
                self.chars.next();
                Token::PlusEq
            }
            '\'' | '"' => Token::Str(self.string(c)?),
            '`' => Token::Ident {
                name: self.quoted_name()?,
                quoted: true,
            },
            '$' => {
                let name = match self.chars.next() {
                    Some(first) if first.is_alphanumeric() || first == '_' => self.word(first),
                    Some(other) => return Err(CypherSyntaxError::UnexpectedChar(other)),
                    None => return Err(CypherSyntaxError::UnexpectedChar('$')),
                };
                Token::Param(name)
            }
            c if c.is_ascii_digit() => self.number(c)?,
            c if c.is_alphabetic() || c == '_' => Token::Ident {
                name: self.word(c),
                quoted: false,
            },
            other => Token::Symbol(other),
        };
        Ok(Some(token))
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, CypherSyntaxError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Splits a script at top-level `;`. Comments are dropped and blank statements
/// are skipped; quoted text is preserved verbatim.
pub fn split_statements(script: &str) -> Result<Vec<String>, CypherSyntaxError> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' && c != '`' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                        continue;
                    }
                    if inner == c {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(CypherSyntaxError::Unterminated(match c {
                        '`' => "identifier",
                        _ => "string",
                    }));
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for skipped in chars.by_ref() {
                    if skipped == '/' && prev == '*' {
                        closed = true;
                        break;
                    }
                    prev = skipped;
                }
                if !closed {
                    return Err(CypherSyntaxError::Unterminated("comment"));
                }
                current.push(' ');
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            other => current.push(other),
        }
    }
    push_statement(&mut statements, &current);
    Ok(statements)
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Plain names pass through; anything else is backtick-quoted.
pub fn format_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

pub fn format_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Bool(v) => v.to_string(),
        Scalar::Integer(v) => v.to_string(),
        Scalar::Float(v) => format!("{v:?}"),
        Scalar::Text(v) => quote_string(v),
    }
}

pub fn format_map(properties: &Properties) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in properties.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}: {}", format_name(key), format_scalar(value));
    }
    out.push('}');
    out
}

pub fn format_labels(labels: &BTreeSet<String>) -> String {
    labels
        .iter()
        .map(|label| format!(":{}", format_name(label)))
        .collect()
}

/// `(var:Label {props})`, omitting the map when it is empty.
pub fn format_pattern(var: &str, labels: &BTreeSet<String>, properties: &Properties) -> String {
    if properties.is_empty() {
        format!("({var}{})", format_labels(labels))
    } else {
        format!("({var}{} {})", format_labels(labels), format_map(properties))
    }
}
