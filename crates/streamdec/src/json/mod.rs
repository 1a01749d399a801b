//! JSON: a streaming tokenizer and, on top of it, owned values.
//!
//! [`JsonDecoder`] never materializes anything. It turns bytes into
//! [`Token`]s that say how many bytes each lexical unit spans, so a consumer
//! can work through documents far larger than memory. [`ValueBuilder`] is
//! one such consumer.
//!
//! The token vocabulary and [`ValueBuilder`] are shared with [`crate::cbor`].

mod decoder;
mod token;
mod value;

use alloc::vec::Vec;

pub use decoder::{JsonDecoder, JsonOptions, MAX_DEPTH, MIN_SRC_CAPACITY};
pub use token::{Filler, Literal, Scalar, StringPart, Structure, Token, TokenBuffer, TokenKind};
pub use value::{Array, DuplicateKeyPolicy, Map, Value, ValueBuilder, ValueError};

use crate::{
    buffer::ByteBuffer,
    driver::{Pump, SliceSource},
};

const TOKEN_BATCH: usize = 256;

/// Decodes every top-level value in `input`.
///
/// Without [`JsonOptions::allow_multiple_values`] this yields exactly one
/// value.
///
/// # Errors
///
/// Malformed JSON, or a duplicate key when `policy` rejects them.
pub fn parse_values(
    input: &[u8],
    options: JsonOptions,
    policy: DuplicateKeyPolicy,
) -> Result<Vec<Value>, ValueError> {
    let mut decoder = JsonDecoder::new(options);
    let mut builder = ValueBuilder::new(policy);
    let mut src = ByteBuffer::from_slice(input, true);
    let mut dst = TokenBuffer::with_capacity(TOKEN_BATCH);
    Pump::default().run(
        &mut decoder,
        &mut SliceSource::new(&[]),
        &mut builder,
        &mut src,
        &mut dst,
        &mut [],
    )?;
    builder.finish()
}

/// Decodes a single JSON document.
///
/// # Errors
///
/// As for [`parse_values`].
pub fn parse_value(
    input: &[u8],
    options: JsonOptions,
    policy: DuplicateKeyPolicy,
) -> Result<Value, ValueError> {
    let options = JsonOptions {
        allow_multiple_values: false,
        ..options
    };
    parse_values(input, options, policy)?
        .pop()
        .ok_or(ValueError::Incomplete)
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;
    use crate::DecodeError;

    #[test]
    fn parse_simple() {
        let v = parse_value(r#" {"b": [true, null, -0.5], "a": "xé"} "#.as_bytes(), JsonOptions::default(), DuplicateKeyPolicy::Reject)
            .unwrap();
        assert_eq!(v.to_string(), r#"{"a":"xé","b":[true,null,-0.5]}"#);
    }

    #[test]
    fn duplicate_keys() {
        let input = br#"{"a":1,"a":2}"#;
        let err = parse_value(input, JsonOptions::default(), DuplicateKeyPolicy::Reject).unwrap_err();
        assert!(matches!(err, ValueError::DuplicateKey { key } if key == "a"));

        let first = parse_value(input, JsonOptions::default(), DuplicateKeyPolicy::KeepFirst).unwrap();
        assert_eq!(first.to_string(), r#"{"a":1}"#);
        let last = parse_value(input, JsonOptions::default(), DuplicateKeyPolicy::KeepLast).unwrap();
        assert_eq!(last.to_string(), r#"{"a":2}"#);
    }

    #[test]
    fn multiple_values() {
        let options = JsonOptions {
            allow_multiple_values: true,
            ..JsonOptions::default()
        };
        let values = parse_values(b"1 [2] {}\n\"x\"", options, DuplicateKeyPolicy::Reject).unwrap();
        assert_eq!(values.len(), 4);

        let err = parse_values(b"1 2", JsonOptions::default(), DuplicateKeyPolicy::Reject).unwrap_err();
        assert!(matches!(err, ValueError::Decode(DecodeError::Malformed { .. })));
    }

    #[test]
    fn truncated_is_eof() {
        let err = parse_value(br#"{"a":"#, JsonOptions::default(), DuplicateKeyPolicy::Reject).unwrap_err();
        assert!(matches!(err, ValueError::Decode(DecodeError::UnexpectedEof)));
        let err = parse_value(b"", JsonOptions::default(), DuplicateKeyPolicy::Reject).unwrap_err();
        assert!(matches!(err, ValueError::Decode(DecodeError::UnexpectedEof)));
    }
}
