use log::{trace, warn};
use simd_adler32::Adler32;

use super::{ChecksumOptions, deflate::DeflateDecoder};
use crate::{
    buffer::{ByteBuffer, IoBuffer},
    decoder::{Decoder, WorkbufLen},
    error::{DecodeError, Format},
    quirks::{Quirk, admit},
    status::{DecodeResult, Status, peek},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Body,
    Trailer,
    Done,
    Failed,
}

/// RFC 1950 decompressor: a two-byte header, a deflate body and a big-endian
/// Adler-32 of the decompressed bytes.
pub struct ZlibDecoder {
    phase: Phase,
    inner: DeflateDecoder,
    adler: Adler32,
    options: ChecksumOptions,
    started: bool,
}

impl core::fmt::Debug for ZlibDecoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ZlibDecoder")
            .field("phase", &self.phase)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for ZlibDecoder {
    fn default() -> Self {
        Self::new(ChecksumOptions::default())
    }
}

impl ZlibDecoder {
    /// A decoder positioned at the start of a zlib stream.
    #[must_use]
    pub fn new(options: ChecksumOptions) -> Self {
        Self {
            phase: Phase::Header,
            inner: DeflateDecoder::new(),
            adler: Adler32::new(),
            options,
            started: false,
        }
    }

    fn step(&mut self, dst: &mut ByteBuffer, src: &mut ByteBuffer, workbuf: &mut [u8]) -> DecodeResult {
        loop {
            match self.phase {
                Phase::Header => {
                    let Some(&[cmf, flg]) = peek(src, 2)? else {
                        return Ok(Status::SHORT_READ);
                    };
                    check_header(cmf, flg)?;
                    src.consume(2)?;
                    trace!("zlib: header ok, window {}", 1u32 << ((cmf >> 4) + 8));
                    self.phase = Phase::Body;
                }
                Phase::Body => {
                    let before = dst.writer_index();
                    let status = self.inner.advance(dst, src, workbuf);
                    self.adler.write(&dst.written()[before..]);
                    match status? {
                        Status::Ok => self.phase = Phase::Trailer,
                        other => return Ok(other),
                    }
                }
                Phase::Trailer => {
                    let Some(trailer) = peek(src, 4)? else {
                        return Ok(Status::SHORT_READ);
                    };
                    let want = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
                    let have = self.adler.finish();
                    if want != have {
                        if !self.options.ignore_checksum {
                            return Err(DecodeError::ChecksumMismatch {
                                format: Format::Zlib,
                                want,
                                have,
                            });
                        }
                        warn!("zlib: ignoring checksum mismatch");
                    }
                    src.consume(4)?;
                    self.phase = Phase::Done;
                }
                Phase::Done => return Ok(Status::Ok),
                Phase::Failed => return Err(DecodeError::DisabledByPreviousError),
            }
        }
    }
}

pub(super) fn check_header(cmf: u8, flg: u8) -> Result<(), DecodeError> {
    if cmf & 0x0F != 8 {
        return Err(DecodeError::malformed(Format::Zlib, "bad compression method"));
    }
    if cmf >> 4 > 7 {
        return Err(DecodeError::malformed(Format::Zlib, "bad compression window size"));
    }
    if (u16::from(cmf) << 8 | u16::from(flg)) % 31 != 0 {
        return Err(DecodeError::malformed(Format::Zlib, "bad parity check"));
    }
    if flg & 0x20 != 0 {
        return Err(DecodeError::unsupported(Format::Zlib, "preset dictionary"));
    }
    Ok(())
}

impl Decoder for ZlibDecoder {
    type Output = u8;

    fn set_quirk(&mut self, quirk: Quirk, enabled: bool) -> Result<(), DecodeError> {
        admit(quirk, self.started, &[Quirk::IgnoreChecksum])?;
        self.options.ignore_checksum = enabled;
        Ok(())
    }

    fn workbuf_len(&self) -> WorkbufLen {
        self.inner.workbuf_len()
    }

    fn advance(&mut self, dst: &mut IoBuffer<u8>, src: &mut ByteBuffer, workbuf: &mut [u8]) -> DecodeResult {
        self.started = true;
        let result = self.step(dst, src, workbuf);
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }
}
