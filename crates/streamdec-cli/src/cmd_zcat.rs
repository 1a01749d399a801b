//! `streamdec zcat`: decompress to stdout.

use std::io;

use anyhow::{Result, bail};
use clap::ValueEnum;
use log::debug;
use streamdec::{
    ByteBuffer, Decoder, Pump, Sniff, Source, WriteSink,
    compress::{AnyTransformer, ChecksumOptions, Compression},
    refill,
};

use crate::Common;

const SRC_LEN: usize = 64 * 1024;
const DST_LEN: usize = 64 * 1024;

/// Which envelope to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Sniff gzip or zlib from the first bytes.
    Auto,
    /// RFC 1952.
    Gzip,
    /// RFC 1950.
    Zlib,
    /// Raw RFC 1951; never sniffed.
    Deflate,
}

/// Arguments for `streamdec zcat`.
#[derive(clap::Args)]
pub struct ZcatArgs {
    #[command(flatten)]
    pub common: Common,

    /// Compression envelope.
    #[arg(long, value_enum, default_value_t = Format::Auto)]
    pub format: Format,
}

/// Fills `src` until its prefix identifies a compression envelope.
pub fn sniff<S: Source + ?Sized>(source: &mut S, src: &mut ByteBuffer) -> Result<Compression> {
    loop {
        match Compression::sniff(src.readable(), src.is_closed()) {
            Sniff::Known(compression) => return Ok(compression),
            Sniff::Unknown => bail!("not a gzip or zlib stream (use --format deflate for raw deflate)"),
            Sniff::NeedMoreData => {
                refill(source, src)?;
            }
        }
    }
}

pub fn run(args: &ZcatArgs) -> Result<()> {
    let mut source = args.common.open()?;
    let mut src = ByteBuffer::with_capacity(SRC_LEN);
    let compression = match args.format {
        Format::Auto => sniff(&mut source, &mut src)?,
        Format::Gzip => Compression::Gzip,
        Format::Zlib => Compression::Zlib,
        Format::Deflate => Compression::Deflate,
    };
    debug!("zcat: decoding {compression:?}");

    let mut decoder = AnyTransformer::new(compression, ChecksumOptions::default());
    for &quirk in &args.common.quirks {
        decoder.set_quirk(quirk, true)?;
    }
    let mut workbuf = vec![0; decoder.workbuf_len().max];
    Pump::default().run(
        &mut decoder,
        &mut source,
        &mut WriteSink(io::stdout().lock()),
        &mut src,
        &mut ByteBuffer::with_capacity(DST_LEN),
        &mut workbuf,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use streamdec::SliceSource;

    use super::*;

    #[test]
    fn sniffing_refills_until_it_can_tell() {
        let data = b"\x78\x9c\x03\x00\x00\x00\x00\x01";
        let mut source = SliceSource::chunked(data, vec![1]);
        let mut src = ByteBuffer::with_capacity(16);
        assert_eq!(sniff(&mut source, &mut src).unwrap(), Compression::Zlib);
        assert_eq!(src.readable(), b"\x78\x9c");
    }

    #[test]
    fn unknown_envelopes_are_reported() {
        let mut source = SliceSource::new(b"plain text");
        let mut src = ByteBuffer::with_capacity(16);
        let err = sniff(&mut source, &mut src).unwrap_err();
        assert!(err.to_string().starts_with("not a gzip or zlib stream"));
    }
}
