//! `streamdec cbor-to-json`.

use std::io::{self, BufWriter, Write};

use anyhow::Result;
use log::debug;
use streamdec::{
    ByteBuffer, Decoder, Pump, Quirk, Source,
    cbor::{CborDecoder, MIN_SRC_CAPACITY},
    json::{DuplicateKeyPolicy, TokenBuffer, ValueBuilder, ValueError},
};

use crate::{Common, cmd_json::Duplicates};

const SRC_LEN: usize = 64 * 1024;
const TOKEN_BATCH: usize = 1024;

const _: () = assert!(SRC_LEN >= MIN_SRC_CAPACITY);

/// Arguments for `streamdec cbor-to-json`.
#[derive(clap::Args)]
pub struct CborArgs {
    #[command(flatten)]
    pub common: Common,

    /// Duplicate key handling. Integer keys compare as their decimal text.
    #[arg(long, value_enum, default_value_t = Duplicates::Reject)]
    pub duplicates: Duplicates,
}

/// Decodes the CBOR in `source` and writes each top-level item to `out` as
/// one line of compact JSON.
fn convert<S: Source + ?Sized, W: Write>(
    source: &mut S,
    out: &mut W,
    quirks: &[Quirk],
    policy: DuplicateKeyPolicy,
) -> Result<()> {
    let mut decoder = CborDecoder::default();
    for &quirk in quirks {
        decoder.set_quirk(quirk, true)?;
    }
    let mut builder = ValueBuilder::new(policy);
    Pump::default().run(
        &mut decoder,
        source,
        &mut builder,
        &mut ByteBuffer::with_capacity(SRC_LEN),
        &mut TokenBuffer::with_capacity(TOKEN_BATCH),
        &mut [],
    )
    .map_err(ValueError::from)?;
    let values = builder.finish()?;
    debug!("cbor: {} items", values.len());
    for value in values {
        writeln!(out, "{value}")?;
    }
    Ok(())
}

pub fn run(args: &CborArgs) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    convert(
        &mut args.common.open()?,
        &mut out,
        &args.common.quirks,
        args.duplicates.into(),
    )?;
    out.flush()?;
    Ok(())
}
