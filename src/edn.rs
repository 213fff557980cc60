//! Minimal EDN reader and writer.
//!
//! The task record files (`tasks.ednl`, `complete.ednl`), the config file
//! (`.mcp-tasks.edn`), and the execution-state file are all EDN. This module
//! implements the subset those files use: `nil`, booleans, integers, strings,
//! keywords, vectors, and maps with keyword or string keys. Maps preserve
//! insertion order so records round-trip without reshuffling fields.
//!
//! The writer emits a single canonical form (space-separated, no commas);
//! `read(write(v)) == v` for every value the engine produces.

use std::fmt;

use indexmap::IndexMap;

/// An EDN map key. Records use keyword keys (`:title`); `meta` entries use
/// string keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Keyword(String),
    String(String),
}

impl Key {
    pub fn keyword(name: impl Into<String>) -> Self {
        Key::Keyword(name.into())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Keyword(name) => write!(f, ":{name}"),
            Key::String(s) => write!(f, "\"{}\"", escape(s)),
        }
    }
}

/// An EDN value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    String(String),
    /// Keyword without the leading `:`.
    Keyword(String),
    Vector(Vec<Value>),
    Map(IndexMap<Key, Value>),
}

impl Value {
    pub fn keyword(name: impl Into<String>) -> Self {
        Value::Keyword(name.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn int(i: impl Into<i64>) -> Self {
        Value::Int(i.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Value::Keyword(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_vec(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<Key, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a keyword key in a map value. Returns `None` for non-maps,
    /// missing keys, and explicit `nil` values.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => match entries.get(&Key::Keyword(key.to_string())) {
                Some(Value::Nil) | None => None,
                Some(v) => Some(v),
            },
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::String(s) => write!(f, "\"{}\"", escape(s)),
            Value::Keyword(name) => write!(f, ":{name}"),
            Value::Vector(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{k} {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// A parse failure, with a byte offset into the input.
#[derive(Debug)]
pub struct ParseError {
    pub pos: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.pos)
    }
}

impl std::error::Error for ParseError {}

/// Parse a single EDN value; trailing content other than whitespace and
/// comments is an error.
pub fn parse(input: &str) -> Result<Value, ParseError> {
    let mut parser = Parser::new(input);
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("trailing content after value"));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            pos: self.pos,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Whitespace includes commas (EDN treats them as whitespace) and `;`
    /// line comments, which show up in hand-edited config files.
    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' | b',' => {
                    self.pos += 1;
                }
                b';' => {
                    while let Some(c) = self.peek() {
                        self.pos += 1;
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'{') => self.parse_map(),
            Some(b'[') => self.parse_vector(),
            Some(b'"') => Ok(Value::String(self.parse_string()?)),
            Some(b':') => {
                self.pos += 1;
                let name = self.parse_symbol_chars();
                if name.is_empty() {
                    return Err(self.error("empty keyword"));
                }
                Ok(Value::Keyword(name))
            }
            Some(b) if b == b'-' || b.is_ascii_digit() => self.parse_int(),
            Some(_) => {
                let start = self.pos;
                let sym = self.parse_symbol_chars();
                match sym.as_str() {
                    "nil" => Ok(Value::Nil),
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "" => Err(self.error("unexpected character")),
                    other => Err(ParseError {
                        pos: start,
                        message: format!("unsupported symbol '{other}'"),
                    }),
                }
            }
        }
    }

    fn parse_symbol_chars(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'?' | b'!' | b'*' | b'+' | b'.' | b'/' | b'<' | b'>' | b'=') {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn parse_int(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == digits_start {
            return Err(self.error("expected digits"));
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).expect("ascii digits");
        text.parse::<i64>().map(Value::Int).map_err(|_| ParseError {
            pos: start,
            message: format!("integer out of range: {text}"),
        })
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        debug_assert_eq!(self.peek(), Some(b'"'));
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push(b'"'),
                    Some(b'\\') => out.push(b'\\'),
                    Some(b'n') => out.push(b'\n'),
                    Some(b't') => out.push(b'\t'),
                    Some(b'r') => out.push(b'\r'),
                    Some(other) => {
                        return Err(self.error(format!(
                            "unsupported escape '\\{}'",
                            other as char
                        )));
                    }
                    None => return Err(self.error("unterminated escape")),
                },
                Some(b) => out.push(b),
            }
        }
        String::from_utf8(out).map_err(|_| self.error("invalid UTF-8 in string"))
    }

    fn parse_vector(&mut self) -> Result<Value, ParseError> {
        debug_assert_eq!(self.peek(), Some(b'['));
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error("unterminated vector")),
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Vector(items));
                }
                Some(_) => items.push(self.parse_value()?),
            }
        }
    }

    fn parse_map(&mut self) -> Result<Value, ParseError> {
        debug_assert_eq!(self.peek(), Some(b'{'));
        self.pos += 1;
        let mut entries = IndexMap::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error("unterminated map")),
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Map(entries));
                }
                Some(_) => {
                    let key = match self.parse_value()? {
                        Value::Keyword(name) => Key::Keyword(name),
                        Value::String(s) => Key::String(s),
                        other => {
                            return Err(self.error(format!(
                                "map keys must be keywords or strings, got {other}"
                            )));
                        }
                    };
                    self.skip_whitespace();
                    if self.peek() == Some(b'}') || self.at_end() {
                        return Err(self.error("map key without value"));
                    }
                    let value = self.parse_value()?;
                    entries.insert(key, value);
                }
            }
        }
    }
}
