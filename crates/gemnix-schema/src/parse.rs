//! Reader for the Nix subset written by [`crate::nix`].
//!
//! Accepts attribute sets, lists, double-quoted strings, and `true`/`false`, with
//! whitespace and comments anywhere between tokens. Anything else (interpolation,
//! attribute paths, functions, `let`) is rejected rather than evaluated.

use crate::value::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub fn parse_nix(input: &str) -> Result<Value, ParseError> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    parser.skip_trivia()?;
    let value = parser.value()?;
    parser.skip_trivia()?;
    if parser.pos < parser.chars.len() {
        return Err(parser.error("trailing input after expression"));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let mut line = 1;
        let mut column = 1;
        for &c in &self.chars[..self.pos.min(self.chars.len())] {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }

    fn expect(&mut self, want: char) -> Result<(), ParseError> {
        match self.peek() {
            Some(c) if c == want => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{want}', found '{c}'"))),
            None => Err(self.error(format!("expected '{want}', found end of input"))),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.pos += 2;
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.pos += 1;
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        match self.peek() {
            Some('{') => self.mapping(),
            Some('[') => self.sequence(),
            Some('"') => Ok(Value::Text(self.string()?)),
            Some(c) if is_ident_start(c) => {
                let word = self.identifier();
                match word.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    other => Err(self.error(format!("unsupported expression '{other}'"))),
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn mapping(&mut self) -> Result<Value, ParseError> {
        self.expect('{')?;
        let mut map = Mapping::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Mapping(map));
                }
                Some('"') => {
                    let key = self.string()?;
                    self.binding(key, &mut map)?;
                }
                Some(c) if is_ident_start(c) => {
                    let key = self.identifier();
                    self.binding(key, &mut map)?;
                }
                Some(c) => return Err(self.error(format!("expected attribute name, found '{c}'"))),
                None => return Err(self.error("unterminated attribute set")),
            }
        }
    }

    fn binding(&mut self, key: String, map: &mut Mapping) -> Result<(), ParseError> {
        self.skip_trivia()?;
        if self.peek() == Some('.') {
            return Err(self.error("attribute paths are not supported"));
        }
        self.expect('=')?;
        self.skip_trivia()?;
        let value = self.value()?;
        self.skip_trivia()?;
        self.expect(';')?;
        if map.contains_key(&key) {
            return Err(self.error(format!("attribute '{key}' already defined")));
        }
        map.insert(key, value);
        Ok(())
    }

    fn sequence(&mut self) -> Result<Value, ParseError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(Value::Sequence(items));
            }
            if self.peek().is_none() {
                return Err(self.error("unterminated list"));
            }
            items.push(self.value()?);
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '\'') {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn string(&mut self) -> Result<String, ParseError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some('$') if self.peek() == Some('{') => {
                    return Err(self.error("string interpolation is not supported"));
                }
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-'
}
