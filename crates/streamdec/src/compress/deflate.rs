use alloc::boxed::Box;

use log::trace;
use miniz_oxide::inflate::{
    TINFLStatus,
    core::{DecompressorOxide, decompress, inflate_flags::TINFL_FLAG_HAS_MORE_INPUT},
};

use crate::{
    buffer::{ByteBuffer, IoBuffer},
    decoder::{Decoder, WorkbufLen},
    error::{DecodeError, Format},
    quirks::{Quirk, admit},
    status::{DecodeResult, Status, need_input},
};

/// Size of the history window, which lives in the caller's work buffer.
pub const WINDOW_LEN: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Done,
    Failed,
}

/// Raw RFC 1951 decompressor.
///
/// Decompressed bytes are first written into the history window inside
/// `workbuf`, then copied to `dst`. Bytes that do not fit in `dst` stay
/// pending in the window and go out on the next call, before any more input
/// is looked at. The work buffer must therefore be the same slice, with the
/// same contents, on every call.
pub struct DeflateDecoder {
    inflater: Box<DecompressorOxide>,
    window_pos: usize,
    pending_start: usize,
    pending_len: usize,
    state: State,
    started: bool,
}

impl Default for DeflateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DeflateDecoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeflateDecoder")
            .field("window_pos", &self.window_pos)
            .field("pending_len", &self.pending_len)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DeflateDecoder {
    /// A decoder positioned at the start of a deflate stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflater: Box::default(),
            window_pos: 0,
            pending_start: 0,
            pending_len: 0,
            state: State::Running,
            started: false,
        }
    }

    /// Whether the final block has been decoded and flushed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == State::Done && self.pending_len == 0
    }

    fn flush(&mut self, dst: &mut ByteBuffer, window: &[u8]) -> Result<bool, DecodeError> {
        if self.pending_len == 0 {
            return Ok(true);
        }
        let n = self.pending_len.min(dst.writer_len());
        dst.append(&window[self.pending_start..self.pending_start + n])?;
        self.pending_start += n;
        self.pending_len -= n;
        Ok(self.pending_len == 0)
    }

    fn step(&mut self, dst: &mut ByteBuffer, src: &mut ByteBuffer, workbuf: &mut [u8]) -> DecodeResult {
        let Some(window) = workbuf.get_mut(..WINDOW_LEN) else {
            return Err(DecodeError::BadArgument("work buffer is too small"));
        };
        loop {
            if !self.flush(dst, window)? {
                return Ok(Status::SHORT_WRITE);
            }
            if self.state == State::Done {
                return Ok(Status::Ok);
            }

            let flags = if src.is_closed() { 0 } else { TINFL_FLAG_HAS_MORE_INPUT };
            let (status, consumed, produced) =
                decompress(&mut self.inflater, src.readable(), window, self.window_pos, flags);
            src.consume(consumed)?;
            self.pending_start = self.window_pos;
            self.pending_len = produced;
            self.window_pos = (self.window_pos + produced) & (WINDOW_LEN - 1);

            match status {
                TINFLStatus::Done => {
                    trace!("deflate: final block done at {}", src.reader_position());
                    self.state = State::Done;
                }
                TINFLStatus::HasMoreOutput => {}
                TINFLStatus::NeedsMoreInput => {
                    if !self.flush(dst, window)? {
                        return Ok(Status::SHORT_WRITE);
                    }
                    return need_input(src);
                }
                TINFLStatus::FailedCannotMakeProgress => {
                    if !self.flush(dst, window)? {
                        return Ok(Status::SHORT_WRITE);
                    }
                    return Err(DecodeError::UnexpectedEof);
                }
                TINFLStatus::Failed | TINFLStatus::Adler32Mismatch | TINFLStatus::BadParam => {
                    return Err(DecodeError::malformed(Format::Deflate, "bad deflate data"));
                }
            }
        }
    }
}

impl Decoder for DeflateDecoder {
    type Output = u8;

    fn set_quirk(&mut self, quirk: Quirk, _enabled: bool) -> Result<(), DecodeError> {
        admit(quirk, self.started, &[])
    }

    fn workbuf_len(&self) -> WorkbufLen {
        WorkbufLen::exactly(WINDOW_LEN)
    }

    fn advance(&mut self, dst: &mut IoBuffer<u8>, src: &mut ByteBuffer, workbuf: &mut [u8]) -> DecodeResult {
        if self.state == State::Failed {
            return Err(DecodeError::DisabledByPreviousError);
        }
        self.started = true;
        let result = self.step(dst, src, workbuf);
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use alloc::{vec, vec::Vec};

    use super::*;
    use crate::driver::{Pump, SliceSource};

    /// "Looks good to me.\n"
    const LGTM: [u8; 20] = [
        0xf3, 0xc9, 0xcf, 0xcf, 0x2e, 0x56, 0x48, 0xcf, 0xcf, 0x4f, 0x51, 0x28, 0xc9, 0x57, 0xc8,
        0x4d, 0xd5, 0xe3, 0x02, 0x00,
    ];

    fn inflate(data: &[u8], chunks: Vec<usize>, dst_len: usize) -> Result<Vec<u8>, crate::driver::DriveError> {
        let mut dec = DeflateDecoder::new();
        let mut out = Vec::new();
        let mut workbuf = vec![0; dec.workbuf_len().max];
        Pump::default().run(
            &mut dec,
            &mut SliceSource::chunked(data, chunks),
            &mut out,
            &mut ByteBuffer::with_capacity(64),
            &mut ByteBuffer::with_capacity(dst_len),
            &mut workbuf,
        )?;
        Ok(out)
    }

    #[test]
    fn lgtm_whole() {
        assert_eq!(inflate(&LGTM, vec![], 1024).unwrap(), b"Looks good to me.\n");
    }

    #[test]
    fn lgtm_one_byte_at_a_time() {
        assert_eq!(inflate(&LGTM, vec![1], 1).unwrap(), b"Looks good to me.\n");
    }

    #[test]
    fn truncated_stream_is_eof() {
        let err = inflate(&LGTM[..10], vec![], 1024).unwrap_err();
        assert!(matches!(
            err,
            crate::driver::DriveError::Decode(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn stored_block_longer_than_destination() {
        // A single stored block holding 300 bytes of 'z'.
        let mut data = vec![0x01, 0x2c, 0x01, 0xd3, 0xfe];
        data.extend(core::iter::repeat_n(b'z', 300));
        let out = inflate(&data, vec![7], 16).unwrap();
        assert_eq!(out.len(), 300);
        assert!(out.iter().all(|&b| b == b'z'));
    }

    #[test]
    fn reserved_block_type_is_malformed() {
        let err = inflate(&[0x07, 0x00], vec![], 16).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(matches!(
            err,
            crate::driver::DriveError::Decode(DecodeError::Malformed { format: Format::Deflate, .. })
        ));
    }

    #[test]
    fn done_repeats_ok() {
        let mut dec = DeflateDecoder::new();
        let mut workbuf = vec![0; WINDOW_LEN];
        let mut src = ByteBuffer::from_slice(&LGTM, true);
        let mut dst = ByteBuffer::with_capacity(64);
        assert_eq!(dec.advance(&mut dst, &mut src, &mut workbuf), Ok(Status::Ok));
        assert_eq!(dec.advance(&mut dst, &mut src, &mut workbuf), Ok(Status::Ok));
        assert_eq!(dst.readable(), b"Looks good to me.\n");
    }

    #[test]
    fn small_workbuf_is_rejected() {
        let mut dec = DeflateDecoder::new();
        let err = dec
            .advance(
                &mut ByteBuffer::with_capacity(8),
                &mut ByteBuffer::from_slice(&LGTM, true),
                &mut [0; 16],
            )
            .unwrap_err();
        assert_eq!(err, DecodeError::BadArgument("work buffer is too small"));
    }
}
