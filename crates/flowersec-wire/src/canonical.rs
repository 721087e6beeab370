//! Canonical JSON form, used only to fingerprint a handshake Init message
//! for the server's idempotent-retry cache.
//!
//! Two JSON encodings of the same object that merely differ in key order
//! must fingerprint identically. We parse the JSON into a tiny in-memory
//! value tree, sort object keys recursively, and re-serialize. This is not
//! a general-purpose JSON library — it supports exactly the shapes the
//! handshake messages use (objects, strings, numbers, bools, null, arrays).

use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalizeError;

impl std::fmt::Display for CanonicalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid JSON input to canonicalizer")
    }
}

impl std::error::Error for CanonicalizeError {}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == b' ' || b == b'\t' || b == b'\n' || b == b'\r' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, c: u8) -> Result<(), CanonicalizeError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(CanonicalizeError)
        }
    }

    fn parse_value(&mut self) -> Result<Value, CanonicalizeError> {
        self.skip_ws();
        match self.peek().ok_or(CanonicalizeError)? {
            b'{' => self.parse_object(),
            b'[' => self.parse_array(),
            b'"' => Ok(Value::String(self.parse_string()?)),
            b't' => self.parse_literal("true", Value::Bool(true)),
            b'f' => self.parse_literal("false", Value::Bool(false)),
            b'n' => self.parse_literal("null", Value::Null),
            _ => self.parse_number(),
        }
    }

    fn parse_literal(&mut self, lit: &str, value: Value) -> Result<Value, CanonicalizeError> {
        let end = self.pos + lit.len();
        if self.bytes.get(self.pos..end) == Some(lit.as_bytes()) {
            self.pos = end;
            Ok(value)
        } else {
            Err(CanonicalizeError)
        }
    }

    fn parse_number(&mut self) -> Result<Value, CanonicalizeError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(CanonicalizeError);
        }
        let s = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| CanonicalizeError)?;
        Ok(Value::Number(s.to_string()))
    }

    fn parse_string(&mut self) -> Result<String, CanonicalizeError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            let b = self.peek().ok_or(CanonicalizeError)?;
            self.pos += 1;
            match b {
                b'"' => return Ok(out),
                b'\\' => {
                    let esc = self.peek().ok_or(CanonicalizeError)?;
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'n' => out.push('\n'),
                        b't' => out.push('\t'),
                        b'r' => out.push('\r'),
                        b'b' => out.push('\u{0008}'),
                        b'f' => out.push('\u{000C}'),
                        b'u' => {
                            let hex = self.bytes.get(self.pos..self.pos + 4).ok_or(CanonicalizeError)?;
                            let hex = std::str::from_utf8(hex).map_err(|_| CanonicalizeError)?;
                            let cp = u32::from_str_radix(hex, 16).map_err(|_| CanonicalizeError)?;
                            out.push(char::from_u32(cp).ok_or(CanonicalizeError)?);
                            self.pos += 4;
                        }
                        _ => return Err(CanonicalizeError),
                    }
                }
                _ => {
                    // Re-decode as UTF-8 by stepping back one byte and reading
                    // a full scalar value; JSON strings are UTF-8 bodies.
                    self.pos -= 1;
                    let rest = std::str::from_utf8(&self.bytes[self.pos..]).map_err(|_| CanonicalizeError)?;
                    let ch = rest.chars().next().ok_or(CanonicalizeError)?;
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, CanonicalizeError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek().ok_or(CanonicalizeError)? {
                b',' => {
                    self.pos += 1;
                }
                b']' => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(CanonicalizeError),
            }
        }
        Ok(Value::Array(items))
    }

    fn parse_object(&mut self) -> Result<Value, CanonicalizeError> {
        self.expect(b'{')?;
        let mut map = BTreeMap::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(map));
        }
        loop {
            self.skip_ws();
            let key = self.parse_string()?;
            self.skip_ws();
            self.expect(b':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek().ok_or(CanonicalizeError)? {
                b',' => {
                    self.pos += 1;
                }
                b'}' => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(CanonicalizeError),
            }
        }
        Ok(Value::Object(map))
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(n),
        Value::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if (c as u32) < 0x20 => {
                        let _ = write!(out, "\\u{:04x}", c as u32);
                    }
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(&Value::String(k.clone()), out);
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
    }
}

/// Parse `json` and re-serialize it with object keys sorted recursively.
///
/// Two inputs that are the same JSON value up to key order produce
/// byte-identical output.
pub fn canonicalize(json: &str) -> Result<String, CanonicalizeError> {
    let mut parser = Parser::new(json);
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(CanonicalizeError);
    }
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_does_not_matter() {
        let a = r#"{"b":2,"a":1}"#;
        let b = r#"{"a":1,"b":2}"#;
        assert_eq!(canonicalize(a).unwrap(), canonicalize(b).unwrap());
    }

    #[test]
    fn nested_objects_are_sorted() {
        let a = r#"{"outer":{"z":1,"a":2},"first":true}"#;
        let b = r#"{"first":true,"outer":{"a":2,"z":1}}"#;
        assert_eq!(canonicalize(a).unwrap(), canonicalize(b).unwrap());
    }

    #[test]
    fn distinguishes_different_values() {
        let a = r#"{"a":1}"#;
        let b = r#"{"a":2}"#;
        assert_ne!(canonicalize(a).unwrap(), canonicalize(b).unwrap());
    }

    #[test]
    fn arrays_preserve_order() {
        let a = r#"{"xs":[1,2,3]}"#;
        let b = r#"{"xs":[3,2,1]}"#;
        assert_ne!(canonicalize(a).unwrap(), canonicalize(b).unwrap());
    }

    #[test]
    fn strings_with_escapes_roundtrip() {
        let a = r#"{"msg":"hello\nworld"}"#;
        let canon = canonicalize(a).unwrap();
        assert!(canon.contains("\\n"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert_eq!(canonicalize("{not json"), Err(CanonicalizeError));
        assert_eq!(canonicalize(""), Err(CanonicalizeError));
    }

    #[test]
    fn whitespace_does_not_affect_canonical_form() {
        let a = r#"{ "a" : 1 , "b" : 2 }"#;
        let b = r#"{"b":2,"a":1}"#;
        assert_eq!(canonicalize(a).unwrap(), canonicalize(b).unwrap());
    }
}
