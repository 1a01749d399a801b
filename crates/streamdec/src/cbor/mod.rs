//! CBOR: a streaming tokenizer feeding the JSON token vocabulary.
//!
//! [`CborDecoder`] emits [`crate::json::Token`]s, so the JSON
//! [`ValueBuilder`] assembles CBOR items too, with the conversions
//! `cbor-to-json` needs:
//!
//! - integer map keys become their decimal text, and other non-string keys
//!   fail with [`ValueError::InvalidKey`]
//! - byte strings become [`Value::Bytes`], rendered as unpadded base64url
//! - `undefined` and unassigned simple values become `null`
//! - tags are dropped
//! - integers outside the `i64` range become floats

mod decoder;

use alloc::vec::Vec;

pub use decoder::{CborDecoder, CborOptions, MAX_DEPTH, MIN_SRC_CAPACITY};

use crate::{
    buffer::ByteBuffer,
    driver::{Pump, SliceSource},
    json::{DuplicateKeyPolicy, TokenBuffer, Value, ValueBuilder, ValueError},
};

const TOKEN_BATCH: usize = 256;

/// Decodes every top-level item in `input`.
///
/// Without [`CborOptions::allow_multiple_values`] this yields exactly one
/// value and ignores anything after it.
///
/// # Errors
///
/// Malformed CBOR, a map key that JSON cannot express, or a duplicate key
/// when `policy` rejects them.
pub fn parse_values(
    input: &[u8],
    options: CborOptions,
    policy: DuplicateKeyPolicy,
) -> Result<Vec<Value>, ValueError> {
    let mut decoder = CborDecoder::new(options);
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

/// Decodes the first CBOR item in `input`.
///
/// # Errors
///
/// As for [`parse_values`].
pub fn parse_value(input: &[u8], policy: DuplicateKeyPolicy) -> Result<Value, ValueError> {
    parse_values(input, CborOptions::default(), policy)?
        .pop()
        .ok_or(ValueError::Incomplete)
}
