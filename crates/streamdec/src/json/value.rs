use alloc::{boxed::Box, collections::BTreeMap, string::String, vec::Vec};
use core::fmt::{self, Write as _};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bstr::{BString, ByteSlice};

use super::token::{Literal, Scalar, StringPart, Structure, Token, TokenKind};
use crate::{
    driver::{BoxError, DriveError, Sink},
    error::{DecodeError, Format, InternalError},
};

/// Array payload of [`Value::Array`].
pub type Array = Vec<Value>;
/// Object payload of [`Value::Map`]. Keys are kept sorted.
pub type Map = BTreeMap<BString, Value>;

/// A fully materialized JSON value, or a CBOR value seen through JSON.
///
/// Strings are byte strings: `\xHH` escapes can produce bytes that are not
/// UTF-8.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// `null`
    Null,
    /// `true` or `false`
    Bool(bool),
    /// A number without fraction or exponent that fits in an `i64`, other
    /// than `-0`, which is a [`Value::Float`] so the sign survives.
    Int(i64),
    /// Every other number.
    Float(f64),
    /// A string.
    String(BString),
    /// Binary data. Renders as unpadded base64url text.
    Bytes(BString),
    /// A list.
    Array(Array),
    /// A dict.
    Map(Map),
}

/// What to do when a dict repeats a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateKeyPolicy {
    /// Fail with [`ValueError::DuplicateKey`].
    #[default]
    Reject,
    /// Keep the earliest value.
    KeepFirst,
    /// Keep the latest value.
    KeepLast,
}

/// Errors from building values out of tokens.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// The token stream was rejected.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A dict repeated a key under [`DuplicateKeyPolicy::Reject`].
    #[error("duplicate key {key:?}")]
    DuplicateKey {
        /// The repeated key.
        key: BString,
    },
    /// A dict key that is neither a string, a byte string nor an integer.
    #[error("invalid JSON map key")]
    InvalidKey,
    /// The tokens stopped in the middle of a value.
    #[error("incomplete value")]
    Incomplete,
    /// Reading the input failed.
    #[error("read error: {0}")]
    Io(#[source] BoxError),
}

impl From<DriveError> for ValueError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::Decode(e) => ValueError::Decode(e),
            DriveError::Sink(e) => match e.downcast::<ValueError>() {
                Ok(v) => *v,
                Err(e) => ValueError::Io(e),
            },
            DriveError::Source(e) => ValueError::Io(e),
        }
    }
}

#[derive(Debug)]
enum Frame {
    List(Array),
    Dict { map: Map, key: Option<BString> },
}

/// Assembles [`Value`]s from a token stream.
///
/// Feed it tokens together with the source bytes they cover, in order, either
/// directly with [`ValueBuilder::push_tokens`] or by using it as the
/// [`Sink`] of a [`crate::Pump`].
#[derive(Debug, Default)]
pub struct ValueBuilder {
    policy: DuplicateKeyPolicy,
    stack: Vec<Frame>,
    text: Vec<u8>,
    in_string: bool,
    binary: bool,
    values: Vec<Value>,
}

fn inconsistent() -> ValueError {
    ValueError::Decode(InternalError::InconsistentSource.into())
}

impl ValueBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new(policy: DuplicateKeyPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Consumes `tokens`; `src` must be exactly the bytes they cover.
    ///
    /// # Errors
    ///
    /// A duplicate key under [`DuplicateKeyPolicy::Reject`], or tokens that
    /// don't line up with `src`.
    pub fn push_tokens(&mut self, tokens: &[Token], src: &[u8]) -> Result<(), ValueError> {
        let mut offset = 0;
        for token in tokens {
            let end = offset + token.len as usize;
            let bytes = src.get(offset..end).ok_or_else(inconsistent)?;
            offset = end;
            self.push(token, bytes)?;
        }
        if offset == src.len() {
            Ok(())
        } else {
            Err(inconsistent())
        }
    }

    fn push(&mut self, token: &Token, bytes: &[u8]) -> Result<(), ValueError> {
        match token.kind {
            TokenKind::Filler(_) => {}
            TokenKind::Structure(Structure::PushList) => self.stack.push(Frame::List(Array::new())),
            TokenKind::Structure(Structure::PushDict) => self.stack.push(Frame::Dict {
                map: Map::new(),
                key: None,
            }),
            TokenKind::Structure(Structure::PopList | Structure::PopDict) => {
                let value = match self.stack.pop().ok_or_else(inconsistent)? {
                    Frame::List(items) => Value::Array(items),
                    Frame::Dict { map, .. } => Value::Map(map),
                };
                self.place(value)?;
            }
            TokenKind::Literal(Literal::Null) => self.place(Value::Null)?,
            TokenKind::Literal(Literal::False) => self.place(Value::Bool(false))?,
            TokenKind::Literal(Literal::True) => self.place(Value::Bool(true))?,
            TokenKind::Number => self.place(parse_number(bytes)?)?,
            TokenKind::String(part) => self.string_part(part, false, bytes)?,
            TokenKind::Bytes(part) => self.string_part(part, true, bytes)?,
            TokenKind::Scalar(scalar) => match scalar {
                Scalar::Unsigned(_) | Scalar::NegativeMinusOne(_) => {
                    self.integer(scalar.integer().ok_or_else(inconsistent)?)?;
                }
                Scalar::Float(bits) => self.place(Value::Float(f64::from_bits(bits)))?,
                Scalar::Undefined | Scalar::Simple(_) => self.place(Value::Null)?,
            },
            TokenKind::Tag(_) => {}
        }
        Ok(())
    }

    fn string_part(&mut self, part: StringPart, binary: bool, bytes: &[u8]) -> Result<(), ValueError> {
        match part {
            StringPart::Quote if !self.in_string => {
                self.in_string = true;
                self.binary = binary;
                self.text.clear();
            }
            StringPart::Quote => {
                if self.binary != binary {
                    return Err(inconsistent());
                }
                self.in_string = false;
                let text = BString::from(core::mem::take(&mut self.text));
                match self.stack.last_mut() {
                    Some(Frame::Dict { key: key @ None, .. }) if binary => *key = Some(base64url(&text).into()),
                    Some(Frame::Dict { key: key @ None, .. }) => *key = Some(text),
                    _ if binary => self.place(Value::Bytes(text))?,
                    _ => self.place(Value::String(text))?,
                }
            }
            StringPart::Copy => self.text.extend_from_slice(bytes),
            StringPart::CodePoint(c) => {
                self.text.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
            }
            StringPart::Byte(b) => self.text.push(b),
            StringPart::Framing => {}
        }
        Ok(())
    }

    /// Integers used as dict keys become their decimal text. Values outside
    /// the `i64` range become floats.
    fn integer(&mut self, n: i128) -> Result<(), ValueError> {
        if let Some(Frame::Dict { key: key @ None, .. }) = self.stack.last_mut() {
            *key = Some(alloc::format!("{n}").into());
            return Ok(());
        }
        #[allow(clippy::cast_precision_loss)]
        let value = i64::try_from(n).map_or(Value::Float(n as f64), Value::Int);
        self.place(value)
    }

    fn place(&mut self, value: Value) -> Result<(), ValueError> {
        match self.stack.last_mut() {
            None => self.values.push(value),
            Some(Frame::List(items)) => items.push(value),
            Some(Frame::Dict { map, key }) => {
                let key = key.take().ok_or(ValueError::InvalidKey)?;
                match self.policy {
                    DuplicateKeyPolicy::Reject if map.contains_key(&key) => {
                        return Err(ValueError::DuplicateKey { key });
                    }
                    DuplicateKeyPolicy::KeepFirst => {
                        map.entry(key).or_insert(value);
                    }
                    DuplicateKeyPolicy::Reject | DuplicateKeyPolicy::KeepLast => {
                        map.insert(key, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// The top-level values completed so far.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns every completed top-level value.
    ///
    /// # Errors
    ///
    /// [`ValueError::Incomplete`] if a container or string is still open.
    pub fn finish(self) -> Result<Vec<Value>, ValueError> {
        if !self.stack.is_empty() || self.in_string {
            return Err(ValueError::Incomplete);
        }
        Ok(self.values)
    }
}

impl Sink<Token> for ValueBuilder {
    fn drain(&mut self, items: &[Token], consumed: &[u8]) -> Result<(), BoxError> {
        self.push_tokens(items, consumed).map_err(|e| Box::new(e) as BoxError)
    }
}

fn base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn parse_number(bytes: &[u8]) -> Result<Value, ValueError> {
    let bad = || ValueError::Decode(DecodeError::malformed(Format::Json, "bad number"));
    let text = core::str::from_utf8(bytes).map_err(|_| bad())?;
    let integral = text.bytes().all(|b| b == b'-' || b.is_ascii_digit());
    if integral {
        match text.parse::<i64>() {
            // `-0` has no `i64` form that keeps the sign.
            Ok(0) if text.starts_with('-') => return Ok(Value::Float(-0.0)),
            Ok(i) => return Ok(Value::Int(i)),
            Err(_) => {}
        }
    }
    text.parse::<f64>().map(Value::Float).map_err(|_| bad())
}

impl Value {
    /// JSON Pointers (RFC 6901) to this value and everything inside it,
    /// depth first. The root is the empty pointer; dict members come in key
    /// order.
    #[must_use]
    pub fn pointers(&self) -> Vec<BString> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_pointers(&mut prefix, &mut out);
        out
    }

    fn collect_pointers(&self, prefix: &mut Vec<u8>, out: &mut Vec<BString>) {
        out.push(BString::from(prefix.as_slice()));
        let len = prefix.len();
        match self {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    prefix.push(b'/');
                    prefix.extend_from_slice(alloc::format!("{i}").as_bytes());
                    item.collect_pointers(prefix, out);
                    prefix.truncate(len);
                }
            }
            Value::Map(map) => {
                for (key, item) in map {
                    prefix.push(b'/');
                    for &b in key.iter() {
                        match b {
                            b'~' => prefix.extend_from_slice(b"~0"),
                            b'/' => prefix.extend_from_slice(b"~1"),
                            _ => prefix.push(b),
                        }
                    }
                    item.collect_pointers(prefix, out);
                    prefix.truncate(len);
                }
            }
            _ => {}
        }
    }

    /// Looks up an RFC 6901 pointer.
    #[must_use]
    pub fn pointer(&self, pointer: &[u8]) -> Option<&Value> {
        if pointer.is_empty() {
            return Some(self);
        }
        let rest = pointer.strip_prefix(b"/")?;
        let mut node = self;
        for part in rest.split_str("/") {
            let part = part.replace("~1", "/").replace("~0", "~");
            node = match node {
                Value::Array(items) => items.get(part.to_str().ok()?.parse::<usize>().ok()?)?,
                Value::Map(map) => map.get(part.as_bstr())?,
                _ => return None,
            };
        }
        Some(node)
    }
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &[u8]) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            '\u{8}' => f.write_str("\\b")?,
            '\u{c}' => f.write_str("\\f")?,
            c if u32::from(c) < 0x20 => write!(f, "\\u{:04x}", u32::from(c))?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

impl fmt::Display for Value {
    /// Compact JSON. Non-finite floats print as `null` and string bytes that
    /// are not UTF-8 as U+FFFD.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) if x.is_finite() => write!(f, "{x:?}"),
            Value::Float(_) => f.write_str("null"),
            Value::String(s) => write_string(f, s),
            Value::Bytes(b) => write_string(f, base64url(b).as_bytes()),
            Value::Array(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            Value::Map(map) => {
                f.write_char('{')?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write_string(f, key)?;
                    write!(f, ":{item}")?;
                }
                f.write_char('}')
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::{string::ToString, vec};

    use super::*;
    use crate::json::token::Filler;

    fn tok(kind: TokenKind, len: u32) -> Token {
        Token {
            kind,
            len,
            continued: false,
        }
    }

    #[test]
    fn builds_from_tokens() {
        let src = br#"{"a":[1,2.5]}"#;
        let tokens = [
            tok(TokenKind::Structure(Structure::PushDict), 1),
            Token {
                continued: true,
                ..tok(TokenKind::String(StringPart::Quote), 1)
            },
            tok(TokenKind::String(StringPart::Copy), 1),
            tok(TokenKind::String(StringPart::Quote), 1),
            tok(TokenKind::Filler(Filler::Punctuation), 1),
            tok(TokenKind::Structure(Structure::PushList), 1),
            tok(TokenKind::Number, 1),
            tok(TokenKind::Filler(Filler::Punctuation), 1),
            tok(TokenKind::Number, 3),
            tok(TokenKind::Structure(Structure::PopList), 1),
            tok(TokenKind::Structure(Structure::PopDict), 1),
        ];
        let mut builder = ValueBuilder::default();
        builder.push_tokens(&tokens, src).unwrap();
        let values = builder.finish().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].to_string(), r#"{"a":[1,2.5]}"#);
    }

    #[test]
    fn misaligned_tokens_are_rejected() {
        let mut builder = ValueBuilder::default();
        let err = builder
            .push_tokens(&[tok(TokenKind::Number, 4)], b"12")
            .unwrap_err();
        assert!(matches!(err, ValueError::Decode(e) if e.is_internal()));
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number(b"-12").unwrap(), Value::Int(-12));
        assert_eq!(parse_number(b"1e2").unwrap(), Value::Float(100.0));
        assert_eq!(
            parse_number(b"99999999999999999999").unwrap(),
            Value::Float(99_999_999_999_999_999_999.0)
        );
        assert!(matches!(parse_number(b"-Infinity").unwrap(), Value::Float(x) if x == f64::NEG_INFINITY));
    }

    #[test]
    fn negative_zero_keeps_its_sign() {
        let Value::Float(x) = parse_number(b"-0").unwrap() else {
            panic!("-0 should be a float");
        };
        assert!(x == 0.0 && x.is_sign_negative());
        assert_eq!(parse_number(b"0").unwrap(), Value::Int(0));
        assert_eq!(Value::Float(x).to_string(), "-0.0");
    }

    #[test]
    fn display_escapes() {
        let v = Value::Array(vec![
            Value::String(BString::from("a\"b\\\n\u{1}")),
            Value::Float(f64::NAN),
            Value::Float(1.0),
        ]);
        assert_eq!(v.to_string(), r#"["a\"b\\\n\u0001",null,1.0]"#);
    }

    #[test]
    fn pointers_escape_and_order() {
        let mut inner = Map::new();
        inner.insert(BString::from("a/b"), Value::Null);
        inner.insert(BString::from("m~n"), Value::Array(vec![Value::Bool(true)]));
        let mut root = Map::new();
        root.insert(BString::from("z"), Value::Map(inner));
        root.insert(BString::from(""), Value::Int(0));
        let root = Value::Map(root);

        let ptrs: Vec<_> = root.pointers().iter().map(ToString::to_string).collect();
        assert_eq!(ptrs, ["", "/", "/z", "/z/a~1b", "/z/m~0n", "/z/m~0n/0"]);
        assert_eq!(root.pointer(b"/z/m~0n/0"), Some(&Value::Bool(true)));
        assert_eq!(root.pointer(b"/z/a~1b"), Some(&Value::Null));
        assert_eq!(root.pointer(b"/nope"), None);
    }
}
