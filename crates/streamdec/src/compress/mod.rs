//! Byte-to-byte decompressors: raw deflate and its zlib and gzip envelopes.

mod deflate;
mod gzip;
mod zlib;

pub use deflate::{DeflateDecoder, WINDOW_LEN};
pub use gzip::GzipDecoder;
pub use zlib::ZlibDecoder;

use crate::{
    buffer::{ByteBuffer, IoBuffer},
    decoder::{Decoder, Sniff, WorkbufLen},
    error::DecodeError,
    quirks::Quirk,
    status::DecodeResult,
};

/// Options shared by the checksummed envelopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumOptions {
    /// Skip verifying the trailing checksum (and the gzip length field).
    ///
    /// # Default
    ///
    /// `false`
    pub ignore_checksum: bool,
}

/// A compression envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No envelope; cannot be sniffed.
    Deflate,
    /// Two-byte header, Adler-32 trailer.
    Zlib,
    /// `1f 8b` magic, CRC-32 trailer.
    Gzip,
}

impl Compression {
    /// Recognizes a gzip or zlib envelope from the first bytes of a stream.
    ///
    /// Raw deflate has no signature, so it is never reported.
    #[must_use]
    pub fn sniff(prefix: &[u8], closed: bool) -> Sniff<Compression> {
        match prefix {
            [0x1F, 0x8B, ..] => Sniff::Known(Compression::Gzip),
            &[cmf, flg, ..] if zlib::check_header(cmf, flg).is_ok() => Sniff::Known(Compression::Zlib),
            [_] | [] if !closed => Sniff::NeedMoreData,
            _ => Sniff::Unknown,
        }
    }
}

/// Any of the decompressors, chosen at run time.
#[derive(Debug)]
pub enum AnyTransformer {
    /// Raw deflate.
    Deflate(DeflateDecoder),
    /// zlib.
    Zlib(ZlibDecoder),
    /// gzip.
    Gzip(GzipDecoder),
}

impl AnyTransformer {
    /// A fresh decoder for `compression`.
    #[must_use]
    pub fn new(compression: Compression, options: ChecksumOptions) -> Self {
        match compression {
            Compression::Deflate => AnyTransformer::Deflate(DeflateDecoder::new()),
            Compression::Zlib => AnyTransformer::Zlib(ZlibDecoder::new(options)),
            Compression::Gzip => AnyTransformer::Gzip(GzipDecoder::new(options)),
        }
    }
}

impl Decoder for AnyTransformer {
    type Output = u8;

    fn set_quirk(&mut self, quirk: Quirk, enabled: bool) -> Result<(), DecodeError> {
        match self {
            AnyTransformer::Deflate(d) => d.set_quirk(quirk, enabled),
            AnyTransformer::Zlib(d) => d.set_quirk(quirk, enabled),
            AnyTransformer::Gzip(d) => d.set_quirk(quirk, enabled),
        }
    }

    fn workbuf_len(&self) -> WorkbufLen {
        match self {
            AnyTransformer::Deflate(d) => d.workbuf_len(),
            AnyTransformer::Zlib(d) => d.workbuf_len(),
            AnyTransformer::Gzip(d) => d.workbuf_len(),
        }
    }

    fn advance(&mut self, dst: &mut IoBuffer<u8>, src: &mut ByteBuffer, workbuf: &mut [u8]) -> DecodeResult {
        match self {
            AnyTransformer::Deflate(d) => d.advance(dst, src, workbuf),
            AnyTransformer::Zlib(d) => d.advance(dst, src, workbuf),
            AnyTransformer::Gzip(d) => d.advance(dst, src, workbuf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffing() {
        assert_eq!(Compression::sniff(&[0x1F, 0x8B, 0x08], false), Sniff::Known(Compression::Gzip));
        assert_eq!(Compression::sniff(&[0x78, 0x9C], true), Sniff::Known(Compression::Zlib));
        assert_eq!(Compression::sniff(&[0x1F], false), Sniff::NeedMoreData);
        assert_eq!(Compression::sniff(&[0x1F], true), Sniff::Unknown);
        assert_eq!(Compression::sniff(b"{}", true), Sniff::Unknown);
    }
}
