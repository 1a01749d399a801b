//! Drivers shared by the property and table tests.

use alloc::{vec, vec::Vec};

use bstr::ByteSlice;

use crate::{
    ByteBuffer, Decoder, DriveError, Pump, Quirk, SliceSource,
    cbor::{self, CborDecoder},
    json::{DuplicateKeyPolicy, JsonDecoder, MIN_SRC_CAPACITY, TokenBuffer, Value, ValueBuilder, ValueError},
};

/// Runs `decoder` over `input` handed out in `chunks`, with a destination of
/// `dst_len` bytes.
pub(crate) fn transform<D: Decoder<Output = u8>>(
    mut decoder: D,
    input: &[u8],
    chunks: Vec<usize>,
    dst_len: usize,
) -> Result<Vec<u8>, DriveError> {
    let mut out = Vec::new();
    let mut workbuf = vec![0; decoder.workbuf_len().max];
    Pump::default().run(
        &mut decoder,
        &mut SliceSource::chunked(input, chunks),
        &mut out,
        &mut ByteBuffer::with_capacity(64),
        &mut ByteBuffer::with_capacity(dst_len),
        &mut workbuf,
    )?;
    Ok(out)
}

/// Parses `input` handed out in `chunks` with a token buffer of `dst_len`.
pub(crate) fn parse_chunked(
    input: &[u8],
    quirks: &[Quirk],
    chunks: Vec<usize>,
    dst_len: usize,
) -> Result<Vec<Value>, ValueError> {
    let mut decoder = JsonDecoder::default();
    for &q in quirks {
        decoder.set_quirk(q, true)?;
    }
    let mut builder = ValueBuilder::new(DuplicateKeyPolicy::Reject);
    Pump::default().run(
        &mut decoder,
        &mut SliceSource::chunked(input, chunks),
        &mut builder,
        &mut ByteBuffer::with_capacity(MIN_SRC_CAPACITY),
        &mut TokenBuffer::with_capacity(dst_len),
        &mut [],
    )?;
    builder.finish()
}

/// Decodes CBOR `input` handed out in `chunks` with a token buffer of
/// `dst_len`.
pub(crate) fn parse_cbor_chunked(
    input: &[u8],
    quirks: &[Quirk],
    chunks: Vec<usize>,
    dst_len: usize,
) -> Result<Vec<Value>, ValueError> {
    let mut decoder = CborDecoder::default();
    for &q in quirks {
        decoder.set_quirk(q, true)?;
    }
    let mut builder = ValueBuilder::new(DuplicateKeyPolicy::Reject);
    Pump::default().run(
        &mut decoder,
        &mut SliceSource::chunked(input, chunks),
        &mut builder,
        &mut ByteBuffer::with_capacity(cbor::MIN_SRC_CAPACITY),
        &mut TokenBuffer::with_capacity(dst_len),
        &mut [],
    )?;
    builder.finish()
}

fn cbor_head(out: &mut Vec<u8>, major: u8, arg: u64) {
    let major = major << 5;
    match arg {
        0..=23 => out.push(major | arg as u8),
        24..=0xFF => out.extend_from_slice(&[major | 24, arg as u8]),
        0x100..=0xFFFF => {
            out.push(major | 25);
            out.extend_from_slice(&(arg as u16).to_be_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(major | 26);
            out.extend_from_slice(&(arg as u32).to_be_bytes());
        }
        _ => {
            out.push(major | 27);
            out.extend_from_slice(&arg.to_be_bytes());
        }
    }
}

/// CBOR encoding of `value`. With `indefinite`, containers end in a break
/// and every string is chunked one character at a time.
pub(crate) fn encode_cbor(value: &Value, indefinite: bool, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(0xF6),
        Value::Bool(b) => out.push(if *b { 0xF5 } else { 0xF4 }),
        Value::Int(i) if *i >= 0 => cbor_head(out, 0, i.unsigned_abs()),
        Value::Int(i) => cbor_head(out, 1, (!*i).unsigned_abs()),
        Value::Float(x) => {
            out.push(0xFB);
            out.extend_from_slice(&x.to_bits().to_be_bytes());
        }
        Value::String(s) | Value::Bytes(s) => {
            let major = if matches!(value, Value::Bytes(_)) { 2 } else { 3 };
            if indefinite {
                out.push(major << 5 | 31);
                for (start, end, _) in s.char_indices() {
                    cbor_head(out, major, (end - start) as u64);
                    out.extend_from_slice(&s[start..end]);
                }
                out.push(0xFF);
            } else {
                cbor_head(out, major, s.len() as u64);
                out.extend_from_slice(s);
            }
        }
        Value::Array(items) => {
            if indefinite {
                out.push(0x9F);
            } else {
                cbor_head(out, 4, items.len() as u64);
            }
            for item in items {
                encode_cbor(item, indefinite, out);
            }
            if indefinite {
                out.push(0xFF);
            }
        }
        Value::Map(map) => {
            if indefinite {
                out.push(0xBF);
            } else {
                cbor_head(out, 5, map.len() as u64);
            }
            for (key, item) in map {
                encode_cbor(&Value::String(key.clone()), indefinite, out);
                encode_cbor(item, indefinite, out);
            }
            if indefinite {
                out.push(0xFF);
            }
        }
    }
}

/// gzip envelope around a raw deflate body.
pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x1f, 0x8b, 8, 0, 0, 0, 0, 0, 0, 0xff];
    out.extend_from_slice(&miniz_oxide::deflate::compress_to_vec(data, 6));
    out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    out.extend_from_slice(&u32::try_from(data.len()).unwrap().to_le_bytes());
    out
}
