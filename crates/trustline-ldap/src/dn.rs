//! Distinguished name decomposition (RFC 4514 string form).

use crate::error::{LdapError, Result};

/// One `type=value` pair of a relative distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeTypeAndValue {
    /// Attribute type as written, e.g. `ou`.
    pub attr_type: String,
    /// Unescaped value.
    pub value: String,
}

/// A relative distinguished name: one or more `+`-joined pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDn {
    attributes: Vec<AttributeTypeAndValue>,
}

impl RelativeDn {
    /// The first pair of this RDN.
    #[must_use]
    pub fn first(&self) -> &AttributeTypeAndValue {
        // Construction guarantees at least one pair.
        &self.attributes[0]
    }

    /// All pairs of this RDN.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeTypeAndValue] {
        &self.attributes
    }
}

/// A parsed distinguished name, most specific RDN first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    rdns: Vec<RelativeDn>,
}

impl DistinguishedName {
    /// Parse the string form of a DN.
    ///
    /// Handles backslash escapes (`\,` and `\2c`), quoted values, multi-valued
    /// RDNs and both `,` and `;` separators. Surrounding unescaped spaces are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns `Parse` on a missing `=`, an empty attribute type, a broken
    /// escape, an unterminated quote or a value that is not UTF-8.
    pub fn parse(input: &str) -> Result<Self> {
        let mut rdns = Vec::new();
        if input.trim().is_empty() {
            return Ok(Self { rdns });
        }

        let mut parser = Parser {
            input: input.as_bytes(),
            pos: 0,
        };
        let mut attributes = Vec::new();
        loop {
            attributes.push(parser.attribute()?);
            match parser.bump() {
                Some(b'+') => {}
                Some(_) => rdns.push(RelativeDn {
                    attributes: std::mem::take(&mut attributes),
                }),
                None => {
                    rdns.push(RelativeDn { attributes });
                    break;
                }
            }
        }
        Ok(Self { rdns })
    }

    /// The RDNs, most specific first.
    #[must_use]
    pub fn rdns(&self) -> &[RelativeDn] {
        &self.rdns
    }

    /// Values of every RDN whose first pair has type `attr_type` (case-insensitive).
    pub fn values_of<'a>(&'a self, attr_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rdns
            .iter()
            .map(RelativeDn::first)
            .filter(move |atv| atv.attr_type.eq_ignore_ascii_case(attr_type))
            .map(|atv| atv.value.as_str())
    }
}

/// Characters that may follow a backslash verbatim.
const SPECIAL: &[u8] = b" \"#+,;<=>\\";

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    /// Parse one pair, stopping before the following separator.
    fn attribute(&mut self) -> Result<AttributeTypeAndValue> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'=') => break,
                Some(b',' | b';' | b'+') | None => {
                    return Err(malformed(format!("missing '=' at offset {start}")));
                }
                Some(_) => self.pos += 1,
            }
        }

        let attr_type = String::from_utf8_lossy(&self.input[start..self.pos])
            .trim()
            .to_string();
        if attr_type.is_empty() {
            return Err(malformed(format!("empty attribute type at offset {start}")));
        }
        self.pos += 1;
        self.skip_spaces();

        let value = if self.peek() == Some(b'"') {
            self.quoted_value()?
        } else {
            self.plain_value()?
        };
        Ok(AttributeTypeAndValue { attr_type, value })
    }

    fn plain_value(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        // Length up to the last byte that is not an unescaped trailing space.
        let mut keep = 0;
        while let Some(byte) = self.peek() {
            match byte {
                b',' | b';' | b'+' => break,
                b'\\' => {
                    self.pos += 1;
                    buf.push(self.escaped()?);
                    keep = buf.len();
                }
                b' ' => {
                    self.pos += 1;
                    buf.push(byte);
                }
                _ => {
                    self.pos += 1;
                    buf.push(byte);
                    keep = buf.len();
                }
            }
        }
        buf.truncate(keep);
        utf8(buf)
    }

    fn quoted_value(&mut self) -> Result<String> {
        self.pos += 1;
        let mut buf = Vec::new();
        loop {
            match self.bump() {
                None => return Err(malformed("unterminated quoted value".to_string())),
                Some(b'"') => break,
                Some(b'\\') => buf.push(self.escaped()?),
                Some(byte) => buf.push(byte),
            }
        }
        self.skip_spaces();
        match self.peek() {
            None | Some(b',' | b';' | b'+') => utf8(buf),
            Some(_) => Err(malformed(format!(
                "unexpected character after quoted value at offset {}",
                self.pos
            ))),
        }
    }

    /// Decode the escape following a consumed backslash.
    fn escaped(&mut self) -> Result<u8> {
        let first = self
            .bump()
            .ok_or_else(|| malformed("incomplete escape sequence".to_string()))?;
        if SPECIAL.contains(&first) {
            return Ok(first);
        }
        if !first.is_ascii_hexdigit() {
            return Err(malformed(format!(
                "invalid escape '\\{}' at offset {}",
                char::from(first),
                self.pos - 1
            )));
        }
        let second = self
            .bump()
            .filter(u8::is_ascii_hexdigit)
            .ok_or_else(|| malformed(format!("invalid hex escape at offset {}", self.pos)))?;
        Ok((hex_value(first) << 4) | hex_value(second))
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| malformed(format!("value is not UTF-8: {e}")))
}

fn malformed(reason: String) -> LdapError {
    LdapError::Parse(reason)
}
