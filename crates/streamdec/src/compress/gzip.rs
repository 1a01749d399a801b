use crc32fast::Hasher;
use log::{trace, warn};

use super::{ChecksumOptions, deflate::DeflateDecoder};
use crate::{
    buffer::{ByteBuffer, IoBuffer},
    decoder::{Decoder, WorkbufLen},
    error::{DecodeError, Format},
    quirks::{Quirk, admit},
    status::{DecodeResult, Status, need_input, peek},
};

const FLAG_HCRC: u8 = 0x02;
const FLAG_EXTRA: u8 = 0x04;
const FLAG_NAME: u8 = 0x08;
const FLAG_COMMENT: u8 = 0x10;
const FLAG_RESERVED: u8 = 0xE0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    ExtraLen,
    Skip(usize),
    SkipToNul,
    Body,
    Trailer,
    Done,
    Failed,
}

/// RFC 1952 decompressor for a single gzip member.
///
/// The optional header fields are skipped a piece at a time, so a source
/// buffer of 10 bytes is enough for any header.
pub struct GzipDecoder {
    phase: Phase,
    /// Optional header fields not yet skipped.
    flags: u8,
    inner: DeflateDecoder,
    crc: Hasher,
    size: u32,
    options: ChecksumOptions,
    started: bool,
}

impl core::fmt::Debug for GzipDecoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GzipDecoder")
            .field("phase", &self.phase)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for GzipDecoder {
    fn default() -> Self {
        Self::new(ChecksumOptions::default())
    }
}

impl GzipDecoder {
    /// A decoder positioned at the start of a gzip member.
    #[must_use]
    pub fn new(options: ChecksumOptions) -> Self {
        Self {
            phase: Phase::Header,
            flags: 0,
            inner: DeflateDecoder::new(),
            crc: Hasher::new(),
            size: 0,
            options,
            started: false,
        }
    }

    /// The next header field to skip, in the order RFC 1952 lays them out.
    fn next_header_phase(&mut self) -> Phase {
        if self.flags & FLAG_EXTRA != 0 {
            self.flags &= !FLAG_EXTRA;
            Phase::ExtraLen
        } else if self.flags & FLAG_NAME != 0 {
            self.flags &= !FLAG_NAME;
            Phase::SkipToNul
        } else if self.flags & FLAG_COMMENT != 0 {
            self.flags &= !FLAG_COMMENT;
            Phase::SkipToNul
        } else if self.flags & FLAG_HCRC != 0 {
            self.flags &= !FLAG_HCRC;
            Phase::Skip(2)
        } else {
            Phase::Body
        }
    }

    fn step(&mut self, dst: &mut ByteBuffer, src: &mut ByteBuffer, workbuf: &mut [u8]) -> DecodeResult {
        loop {
            match self.phase {
                Phase::Header => {
                    let Some(header) = peek(src, 10)? else {
                        return Ok(Status::SHORT_READ);
                    };
                    if header[..2] != [0x1F, 0x8B] {
                        return Err(DecodeError::malformed(Format::Gzip, "bad header"));
                    }
                    if header[2] != 8 {
                        return Err(DecodeError::malformed(Format::Gzip, "bad compression method"));
                    }
                    if header[3] & FLAG_RESERVED != 0 {
                        return Err(DecodeError::malformed(Format::Gzip, "bad encoding flags"));
                    }
                    self.flags = header[3];
                    src.consume(10)?;
                    self.phase = self.next_header_phase();
                }
                Phase::ExtraLen => {
                    let Some(&[lo, hi]) = peek(src, 2)? else {
                        return Ok(Status::SHORT_READ);
                    };
                    src.consume(2)?;
                    self.phase = Phase::Skip(usize::from(u16::from_le_bytes([lo, hi])));
                }
                Phase::Skip(remaining) => {
                    let n = remaining.min(src.reader_len());
                    src.consume(n)?;
                    if n < remaining {
                        self.phase = Phase::Skip(remaining - n);
                        return need_input(src);
                    }
                    self.phase = self.next_header_phase();
                }
                Phase::SkipToNul => {
                    let Some(nul) = src.readable().iter().position(|&b| b == 0) else {
                        src.consume(src.reader_len())?;
                        return need_input(src);
                    };
                    src.consume(nul + 1)?;
                    self.phase = self.next_header_phase();
                }
                Phase::Body => {
                    trace!("gzip: body at {}", src.reader_position());
                    let before = dst.writer_index();
                    let status = self.inner.advance(dst, src, workbuf);
                    let produced = &dst.written()[before..];
                    self.crc.update(produced);
                    // ISIZE is the length modulo 2^32.
                    #[allow(clippy::cast_possible_truncation)]
                    let produced_len = produced.len() as u32;
                    self.size = self.size.wrapping_add(produced_len);
                    match status? {
                        Status::Ok => self.phase = Phase::Trailer,
                        other => return Ok(other),
                    }
                }
                Phase::Trailer => {
                    let Some(trailer) = peek(src, 8)? else {
                        return Ok(Status::SHORT_READ);
                    };
                    let want_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
                    let want_size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
                    let have_crc = self.crc.clone().finalize();
                    if !self.options.ignore_checksum {
                        if want_crc != have_crc {
                            return Err(DecodeError::ChecksumMismatch {
                                format: Format::Gzip,
                                want: want_crc,
                                have: have_crc,
                            });
                        }
                        if want_size != self.size {
                            return Err(DecodeError::malformed(Format::Gzip, "bad trailing length"));
                        }
                    } else if want_crc != have_crc || want_size != self.size {
                        warn!("gzip: ignoring checksum mismatch");
                    }
                    src.consume(8)?;
                    self.phase = Phase::Done;
                }
                Phase::Done => return Ok(Status::Ok),
                Phase::Failed => return Err(DecodeError::DisabledByPreviousError),
            }
        }
    }
}

impl Decoder for GzipDecoder {
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
