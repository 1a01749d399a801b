use core::fmt;

use crate::buffer::IoBuffer;

/// One lexical unit of JSON or CBOR, covering `len` source bytes.
///
/// Tokens carry no text of their own. A consumer that wants the text slices
/// it out of the source bytes that were consumed alongside the tokens; every
/// consumed byte belongs to exactly one token, in order.
///
/// Long strings and comments are split into several tokens. Every piece but
/// the last has `continued` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Token {
    /// What the bytes mean.
    pub kind: TokenKind,
    /// Number of source bytes covered.
    pub len: u32,
    /// Whether the next token continues this one.
    pub continued: bool,
}

impl Default for Token {
    fn default() -> Self {
        Token {
            kind: TokenKind::Filler(Filler::Whitespace),
            len: 0,
            continued: false,
        }
    }
}

/// A destination buffer of tokens.
pub type TokenBuffer = IoBuffer<Token>;

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TokenKind {
    /// Bytes with no bearing on the value.
    Filler(Filler),
    /// Opening or closing a container.
    Structure(Structure),
    /// `null`, `false` or `true`.
    Literal(Literal),
    /// A number; its text is the covered bytes.
    Number,
    /// Part of a string.
    String(StringPart),
    /// Part of a byte string. Only binary formats have these.
    Bytes(StringPart),
    /// A scalar whose value travels in the token. Binary formats encode
    /// these, so the covered bytes are not text.
    Scalar(Scalar),
    /// A CBOR tag number, annotating the item that follows.
    Tag(u64),
}

/// Kinds of filler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Filler {
    /// Spaces, tabs, carriage returns and line feeds.
    Whitespace,
    /// A `,` or `:` separator.
    Punctuation,
    /// A leading UTF-8 byte order mark.
    ByteOrderMark,
    /// A `/* ... */` comment.
    CommentBlock,
    /// A `// ...` comment, excluding the line feed.
    CommentLine,
}

/// Container boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Structure {
    /// `[`
    PushList,
    /// `]`
    PopList,
    /// `{`
    PushDict,
    /// `}`
    PopDict,
}

/// The three literal names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Literal {
    /// `null`
    Null,
    /// `false`
    False,
    /// `true`
    True,
}

/// Pieces of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StringPart {
    /// The opening (`continued`) or closing quote.
    Quote,
    /// Bytes that stand for themselves: valid UTF-8 with no escapes.
    Copy,
    /// An escape sequence, or replaced invalid input, decoding to this
    /// character.
    CodePoint(char),
    /// A `\xHH` escape decoding to this byte.
    Byte(u8),
    /// Length prefixes inside a chunked binary string. They contribute
    /// nothing to the string.
    Framing,
}

/// Scalars of binary formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Scalar {
    /// A non-negative integer.
    Unsigned(u64),
    /// The integer `-1 - n`, which reaches one below `-u64::MAX`.
    NegativeMinusOne(u64),
    /// An IEEE 754 double, kept as bits so tokens stay `Eq`. Narrower
    /// floats are widened exactly.
    Float(u64),
    /// CBOR `undefined`.
    Undefined,
    /// A CBOR simple value with no assigned meaning.
    Simple(u8),
}

impl Scalar {
    /// The value of an integer scalar.
    #[must_use]
    pub fn integer(self) -> Option<i128> {
        match self {
            Scalar::Unsigned(n) => Some(i128::from(n)),
            Scalar::NegativeMinusOne(n) => Some(-1 - i128::from(n)),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    /// A compact form used by the token dump tools: `kind/len`, with a
    /// trailing `+` when continued.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Filler(filler) => f.write_str(match filler {
                Filler::Whitespace => "ws",
                Filler::Punctuation => "punct",
                Filler::ByteOrderMark => "bom",
                Filler::CommentBlock => "/*",
                Filler::CommentLine => "//",
            })?,
            TokenKind::Structure(s) => f.write_str(match s {
                Structure::PushList => "[",
                Structure::PopList => "]",
                Structure::PushDict => "{",
                Structure::PopDict => "}",
            })?,
            TokenKind::Literal(l) => f.write_str(match l {
                Literal::Null => "null",
                Literal::False => "false",
                Literal::True => "true",
            })?,
            TokenKind::Number => f.write_str("num")?,
            TokenKind::String(part) => write_part(f, part)?,
            TokenKind::Bytes(part) => {
                f.write_str("b")?;
                write_part(f, part)?;
            }
            TokenKind::Scalar(s) => match s {
                Scalar::Unsigned(_) | Scalar::NegativeMinusOne(_) => {
                    write!(f, "int{}", s.integer().unwrap_or_default())?;
                }
                Scalar::Float(bits) => write!(f, "float{:?}", f64::from_bits(bits))?,
                Scalar::Undefined => f.write_str("undefined")?,
                Scalar::Simple(v) => write!(f, "simple{v}")?,
            },
            TokenKind::Tag(tag) => write!(f, "tag{tag}")?,
        }
        write!(f, "/{}", self.len)?;
        if self.continued {
            f.write_str("+")?;
        }
        Ok(())
    }
}

fn write_part(f: &mut fmt::Formatter<'_>, part: StringPart) -> fmt::Result {
    match part {
        StringPart::Quote => f.write_str("\""),
        StringPart::Copy => f.write_str("copy"),
        StringPart::CodePoint(c) => write!(f, "U+{:04X}", u32::from(c)),
        StringPart::Byte(b) => write!(f, "0x{b:02X}"),
        StringPart::Framing => f.write_str("frame"),
    }
}
