//! `streamdec json-ptrs` and `streamdec json-tokens`.

use std::io::{self, BufWriter, Write};

use anyhow::Result;
use clap::ValueEnum;
use streamdec::{
    BoxError, ByteBuffer, Decoder, FnSink, Pump,
    json::{DuplicateKeyPolicy, JsonDecoder, MIN_SRC_CAPACITY, Token, TokenBuffer, ValueBuilder},
};

use crate::Common;

const SRC_LEN: usize = 64 * 1024;
const TOKEN_BATCH: usize = 1024;

const _: () = assert!(SRC_LEN >= MIN_SRC_CAPACITY);

/// What to do when an object repeats a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Duplicates {
    /// Fail.
    Reject,
    /// Keep the first value.
    KeepFirst,
    /// Keep the last value.
    KeepLast,
}

impl From<Duplicates> for DuplicateKeyPolicy {
    fn from(d: Duplicates) -> Self {
        match d {
            Duplicates::Reject => DuplicateKeyPolicy::Reject,
            Duplicates::KeepFirst => DuplicateKeyPolicy::KeepFirst,
            Duplicates::KeepLast => DuplicateKeyPolicy::KeepLast,
        }
    }
}

/// Arguments for `streamdec json-ptrs`.
#[derive(clap::Args)]
pub struct PtrsArgs {
    #[command(flatten)]
    pub common: Common,

    /// Duplicate key handling.
    #[arg(long, value_enum, default_value_t = Duplicates::Reject)]
    pub duplicates: Duplicates,
}

/// Arguments for `streamdec json-tokens`.
#[derive(clap::Args)]
pub struct TokensArgs {
    #[command(flatten)]
    pub common: Common,
}

fn decoder(common: &Common) -> Result<JsonDecoder> {
    let mut decoder = JsonDecoder::default();
    for &quirk in &common.quirks {
        decoder.set_quirk(quirk, true)?;
    }
    Ok(decoder)
}

pub fn run_ptrs(args: &PtrsArgs) -> Result<()> {
    let mut builder = ValueBuilder::new(args.duplicates.into());
    Pump::default().run(
        &mut decoder(&args.common)?,
        &mut args.common.open()?,
        &mut builder,
        &mut ByteBuffer::with_capacity(SRC_LEN),
        &mut TokenBuffer::with_capacity(TOKEN_BATCH),
        &mut [],
    )?;
    let mut out = BufWriter::new(io::stdout().lock());
    for value in builder.finish()? {
        for pointer in value.pointers() {
            writeln!(out, "{pointer}")?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Writes one line per token: source offset, token, and the covered text.
fn write_tokens<W: Write>(out: &mut W, offset: &mut u64, tokens: &[Token], consumed: &[u8]) -> Result<(), BoxError> {
    let mut at = 0;
    for token in tokens {
        let len = token.len as usize;
        let text = consumed.get(at..at + len).unwrap_or_default();
        let token = token.to_string();
        writeln!(out, "{offset:>8} {token:<10} {:?}", String::from_utf8_lossy(text))?;
        at += len;
        *offset += len as u64;
    }
    Ok(())
}

pub fn run_tokens(args: &TokensArgs) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    let mut offset = 0u64;
    Pump::default().run(
        &mut decoder(&args.common)?,
        &mut args.common.open()?,
        &mut FnSink(|tokens: &[Token], consumed: &[u8]| write_tokens(&mut out, &mut offset, tokens, consumed)),
        &mut ByteBuffer::with_capacity(SRC_LEN),
        &mut TokenBuffer::with_capacity(TOKEN_BATCH),
        &mut [],
    )?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use streamdec::{Quirk, SliceSource};

    use super::*;

    #[test]
    fn token_lines_carry_offsets_and_text() {
        let input = br#"{"k": [1]}"#;
        let mut out = Vec::new();
        let mut offset = 0;
        Pump::default()
            .run(
                &mut JsonDecoder::default(),
                &mut SliceSource::chunked(input, vec![4]),
                &mut FnSink(|tokens: &[Token], consumed: &[u8]| write_tokens(&mut out, &mut offset, tokens, consumed)),
                &mut ByteBuffer::with_capacity(MIN_SRC_CAPACITY),
                &mut TokenBuffer::with_capacity(2),
                &mut [],
            )
            .unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], r#"       0 {/1        "{""#);
        assert_eq!(lines[2], r#"       2 copy/1+    "k""#);
        assert_eq!(lines[9], r#"       9 }/1        "}""#);
        assert_eq!(offset, 10);
    }

    #[test]
    fn quirks_reach_the_decoder() {
        let common = Common {
            file: None,
            quirks: vec![Quirk::IgnoreChecksum],
        };
        assert!(decoder(&common).is_err());
    }
}
