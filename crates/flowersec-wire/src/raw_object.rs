//! Parses a flat JSON object into raw value spans without recursively
//! interpreting the values. The RPC envelope's `payload` field is an
//! opaque JSON value the router never inspects, so decoding it through a
//! typed `Facet` struct would force every envelope through one fixed
//! payload shape. Instead we scan just far enough to find each field's
//! byte range and hand the caller the exact substring.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawJsonError;

impl fmt::Display for RawJsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid JSON")
    }
}

impl std::error::Error for RawJsonError {}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(s: &'a str) -> Self {
        Self { bytes: s.as_bytes(), pos: 0 }
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

    fn expect(&mut self, c: u8) -> Result<(), RawJsonError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(RawJsonError)
        }
    }

    fn skip_value(&mut self) -> Result<(), RawJsonError> {
        self.skip_ws();
        match self.peek().ok_or(RawJsonError)? {
            b'{' => self.skip_object(),
            b'[' => self.skip_array(),
            b'"' => self.skip_string(),
            b't' => self.skip_literal("true"),
            b'f' => self.skip_literal("false"),
            b'n' => self.skip_literal("null"),
            _ => self.skip_number(),
        }
    }

    fn skip_literal(&mut self, lit: &str) -> Result<(), RawJsonError> {
        let end = self.pos + lit.len();
        if self.bytes.get(self.pos..end) == Some(lit.as_bytes()) {
            self.pos = end;
            Ok(())
        } else {
            Err(RawJsonError)
        }
    }

    fn skip_number(&mut self) -> Result<(), RawJsonError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(RawJsonError);
        }
        Ok(())
    }

    fn skip_string(&mut self) -> Result<(), RawJsonError> {
        self.expect(b'"')?;
        loop {
            let b = self.peek().ok_or(RawJsonError)?;
            self.pos += 1;
            match b {
                b'"' => return Ok(()),
                b'\\' => {
                    self.peek().ok_or(RawJsonError)?;
                    self.pos += 1;
                }
                _ => {}
            }
        }
    }

    fn skip_array(&mut self) -> Result<(), RawJsonError> {
        self.expect(b'[')?;
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(());
        }
        loop {
            self.skip_value()?;
            self.skip_ws();
            match self.peek().ok_or(RawJsonError)? {
                b',' => self.pos += 1,
                b']' => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(RawJsonError),
            }
        }
        Ok(())
    }

    fn skip_object(&mut self) -> Result<(), RawJsonError> {
        self.expect(b'{')?;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(());
        }
        loop {
            self.skip_ws();
            self.skip_string()?;
            self.skip_ws();
            self.expect(b':')?;
            self.skip_value()?;
            self.skip_ws();
            match self.peek().ok_or(RawJsonError)? {
                b',' => self.pos += 1,
                b'}' => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(RawJsonError),
            }
        }
        Ok(())
    }

    /// Parses a JSON string token (quotes included) into its decoded key text.
    /// Object keys in our callers are always plain identifiers, so no
    /// further unescaping is attempted here.
    fn parse_key(&mut self) -> Result<String, RawJsonError> {
        let start = self.pos;
        self.skip_string()?;
        let raw = std::str::from_utf8(&self.bytes[start + 1..self.pos - 1]).map_err(|_| RawJsonError)?;
        Ok(raw.to_string())
    }
}

/// Parse a top-level JSON object and return each field as `(key, raw_value)`,
/// where `raw_value` is the exact source text of that field's value
/// (whitespace-trimmed), not a parsed representation of it.
pub fn object_fields(json: &str) -> Result<Vec<(String, &str)>, RawJsonError> {
    let mut sc = Scanner::new(json);
    sc.skip_ws();
    sc.expect(b'{')?;
    let mut fields = Vec::new();
    sc.skip_ws();
    if sc.peek() == Some(b'}') {
        sc.pos += 1;
    } else {
        loop {
            sc.skip_ws();
            let key = sc.parse_key()?;
            sc.skip_ws();
            sc.expect(b':')?;
            sc.skip_ws();
            let value_start = sc.pos;
            sc.skip_value()?;
            let raw = std::str::from_utf8(&sc.bytes[value_start..sc.pos]).map_err(|_| RawJsonError)?;
            fields.push((key, raw));
            sc.skip_ws();
            match sc.peek().ok_or(RawJsonError)? {
                b',' => sc.pos += 1,
                b'}' => {
                    sc.pos += 1;
                    break;
                }
                _ => return Err(RawJsonError),
            }
        }
    }
    sc.skip_ws();
    if sc.pos != sc.bytes.len() {
        return Err(RawJsonError);
    }
    Ok(fields)
}

/// Decode one JSON string token (quotes included) into its text value.
pub fn unescape_json_string(raw: &str) -> Result<String, RawJsonError> {
    let mut sc = Scanner::new(raw);
    sc.expect(b'"')?;
    let mut out = String::new();
    loop {
        let b = sc.peek().ok_or(RawJsonError)?;
        sc.pos += 1;
        match b {
            b'"' => {
                if sc.pos != sc.bytes.len() {
                    return Err(RawJsonError);
                }
                return Ok(out);
            }
            b'\\' => {
                let esc = sc.peek().ok_or(RawJsonError)?;
                sc.pos += 1;
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
                        let hex = sc.bytes.get(sc.pos..sc.pos + 4).ok_or(RawJsonError)?;
                        let hex = std::str::from_utf8(hex).map_err(|_| RawJsonError)?;
                        let cp = u32::from_str_radix(hex, 16).map_err(|_| RawJsonError)?;
                        out.push(char::from_u32(cp).ok_or(RawJsonError)?);
                        sc.pos += 4;
                    }
                    _ => return Err(RawJsonError),
                }
            }
            _ => {
                sc.pos -= 1;
                let rest = std::str::from_utf8(&sc.bytes[sc.pos..]).map_err(|_| RawJsonError)?;
                let ch = rest.chars().next().ok_or(RawJsonError)?;
                out.push(ch);
                sc.pos += ch.len_utf8();
            }
        }
    }
}

/// Encode a string as a JSON string token, quotes included.
pub fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_split_without_interpreting_values() {
        let fields = object_fields(r#"{"a":1,"b":{"x":[1,2]},"c":"hi"}"#).unwrap();
        assert_eq!(fields[0], ("a".to_string(), "1"));
        assert_eq!(fields[1], ("b".to_string(), r#"{"x":[1,2]}"#));
        assert_eq!(fields[2], ("c".to_string(), "\"hi\""));
    }

    #[test]
    fn empty_object() {
        assert_eq!(object_fields("{}").unwrap(), Vec::new());
    }

    #[test]
    fn whitespace_is_tolerated() {
        let fields = object_fields(r#"{ "a" : 1 , "b" : 2 }"#).unwrap();
        assert_eq!(fields, vec![("a".to_string(), "1"), ("b".to_string(), "2")]);
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert_eq!(object_fields(r#"{"a":1} garbage"#), Err(RawJsonError));
    }

    #[test]
    fn string_roundtrips_through_escape_and_unescape() {
        let original = "hello\nworld \"quoted\"";
        let escaped = escape_json_string(original);
        assert_eq!(unescape_json_string(&escaped).unwrap(), original);
    }

    #[test]
    fn null_value_is_a_raw_span() {
        let fields = object_fields(r#"{"payload":null}"#).unwrap();
        assert_eq!(fields[0].1, "null");
    }
}
