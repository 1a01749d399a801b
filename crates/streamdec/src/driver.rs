//! The pump that moves bytes from a [`Source`] through a [`Decoder`] into a
//! [`Sink`].
//!
//! One iteration of [`Pump::run`]:
//!
//! 1. If `src` has nothing unread and is still open, ask the source for more
//!    (or learn that it is closed).
//! 2. Call [`Decoder::advance`] and hand whatever landed in `dst` to the sink,
//!    together with the source bytes consumed during that call.
//! 3. `Ok` or a note ends the loop. A short write loops straight back. A
//!    short read compacts `src` and refills it; on a closed source it is an
//!    unexpected end of file.
//!
//! A [`ProgressGuard`] watches for iterations in which neither buffer moved
//! and no bytes arrived; too many in a row is an internal error rather than a
//! hang.

use alloc::{boxed::Box, vec::Vec};

use log::trace;
use thiserror::Error;

use crate::{
    buffer::{ByteBuffer, IoBuffer},
    decoder::Decoder,
    error::{DecodeError, InternalError},
    status::{Status, Suspension},
};

/// Type-erased error from a source or sink.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// Consecutive idle iterations tolerated before giving up.
pub const DEFAULT_NO_PROGRESS_LIMIT: u32 = 999;

/// Failure of a whole pumping session.
#[derive(Debug, Error)]
pub enum DriveError {
    /// The decoder failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The source could not produce bytes.
    #[error("read error: {0}")]
    Source(#[source] BoxError),
    /// The sink rejected output.
    #[error("write error: {0}")]
    Sink(#[source] BoxError),
}

impl DriveError {
    /// The decode error, if that is what this is.
    #[must_use]
    pub fn as_decode(&self) -> Option<&DecodeError> {
        match self {
            DriveError::Decode(err) => Some(err),
            _ => None,
        }
    }

    /// Process exit code: 2 for internal errors, 1 for everything else.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.as_decode().map_or(1, DecodeError::exit_code)
    }
}

/// What a [`Source`] managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// This many bytes were written to the front of the slice. Zero is
    /// allowed and means "nothing right now".
    Bytes(usize),
    /// The stream has ended; nothing was written.
    Closed,
}

/// A provider of input bytes.
pub trait Source {
    /// Writes up to `dst.len()` bytes to the front of `dst`.
    ///
    /// # Errors
    ///
    /// Any read failure; the pump stops and reports it.
    fn read_into(&mut self, dst: &mut [u8]) -> Result<Fill, BoxError>;
}

/// A consumer of decoded items.
pub trait Sink<T> {
    /// Accepts every item in `items`.
    ///
    /// `consumed` holds the source bytes the decoder consumed while producing
    /// `items`. Byte-oriented sinks ignore it; token sinks use it to recover
    /// the text each token covers.
    ///
    /// # Errors
    ///
    /// Any write failure; the pump stops and reports it.
    fn drain(&mut self, items: &[T], consumed: &[u8]) -> Result<(), BoxError>;
}

impl Sink<u8> for Vec<u8> {
    fn drain(&mut self, items: &[u8], _consumed: &[u8]) -> Result<(), BoxError> {
        self.extend_from_slice(items);
        Ok(())
    }
}

/// Adapts a closure into a [`Sink`].
pub struct FnSink<F>(pub F);

impl<T, F> Sink<T> for FnSink<F>
where
    F: FnMut(&[T], &[u8]) -> Result<(), BoxError>,
{
    fn drain(&mut self, items: &[T], consumed: &[u8]) -> Result<(), BoxError> {
        (self.0)(items, consumed)
    }
}

/// An in-memory source, optionally doled out in fixed-size pieces.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    offset: usize,
    chunks: Vec<usize>,
    next_chunk: usize,
}

impl<'a> SliceSource<'a> {
    /// Hands out as much of `data` as fits on each call.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            chunks: Vec::new(),
            next_chunk: 0,
        }
    }

    /// Hands out `data` in the given piece sizes, cycling through them.
    /// Zero-sized pieces simulate a source with nothing ready yet.
    #[must_use]
    pub fn chunked(data: &'a [u8], chunks: Vec<usize>) -> Self {
        Self {
            data,
            offset: 0,
            chunks,
            next_chunk: 0,
        }
    }
}

impl Source for SliceSource<'_> {
    fn read_into(&mut self, dst: &mut [u8]) -> Result<Fill, BoxError> {
        let rest = &self.data[self.offset..];
        if rest.is_empty() {
            return Ok(Fill::Closed);
        }
        let mut n = rest.len().min(dst.len());
        if !self.chunks.is_empty() {
            n = n.min(self.chunks[self.next_chunk % self.chunks.len()]);
            self.next_chunk += 1;
        }
        dst[..n].copy_from_slice(&rest[..n]);
        self.offset += n;
        Ok(Fill::Bytes(n))
    }
}

/// Counts consecutive iterations that moved nothing.
#[derive(Debug, Clone, Copy)]
pub struct ProgressGuard {
    limit: u32,
    idle: u32,
}

impl Default for ProgressGuard {
    fn default() -> Self {
        Self::new(DEFAULT_NO_PROGRESS_LIMIT)
    }
}

impl ProgressGuard {
    /// Tolerates `limit` idle iterations in a row.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self { limit, idle: 0 }
    }

    /// Records one iteration.
    ///
    /// # Errors
    ///
    /// [`InternalError::NoProgress`] once the idle streak exceeds the limit.
    pub fn record(&mut self, progressed: bool) -> Result<(), InternalError> {
        if progressed {
            self.idle = 0;
            return Ok(());
        }
        self.idle += 1;
        if self.idle > self.limit {
            return Err(InternalError::NoProgress(self.idle));
        }
        Ok(())
    }
}

/// Asks `source` for more bytes after compacting `src`.
///
/// Returns the number of bytes appended; zero also when the source has just
/// reported that it is closed.
///
/// # Errors
///
/// [`DecodeError::UnexpectedEof`] if `src` was already closed,
/// [`DecodeError::BadArgument`] if `src` is full of unread bytes so nothing
/// can be appended, or the source's own error.
pub fn refill<S: Source + ?Sized>(source: &mut S, src: &mut ByteBuffer) -> Result<usize, DriveError> {
    if src.is_closed() {
        return Err(DecodeError::UnexpectedEof.into());
    }
    src.compact();
    if src.writer_len() == 0 {
        return Err(DecodeError::BadArgument("source buffer is too small").into());
    }
    match source.read_into(src.writable()).map_err(DriveError::Source)? {
        Fill::Bytes(n) => {
            src.commit(n).map_err(DecodeError::from)?;
            Ok(n)
        }
        Fill::Closed => {
            trace!("source closed at {}", src.writer_position());
            src.mark_closed();
            Ok(0)
        }
    }
}

/// Runs a [`Decoder`] to completion.
#[derive(Debug, Clone, Copy)]
pub struct Pump {
    /// Idle iterations tolerated before reporting an internal error.
    pub no_progress_limit: u32,
}

impl Default for Pump {
    fn default() -> Self {
        Self {
            no_progress_limit: DEFAULT_NO_PROGRESS_LIMIT,
        }
    }
}

impl Pump {
    /// Pumps until the decoder finishes or fails.
    ///
    /// Returns the terminal status: [`Status::Ok`] or a [`Status::Note`].
    /// Everything the decoder produced has been handed to `sink` by then.
    ///
    /// # Errors
    ///
    /// The first decode, source or sink error. Output produced before the
    /// failing call has already reached the sink.
    pub fn run<D, S, K>(
        &self,
        decoder: &mut D,
        source: &mut S,
        sink: &mut K,
        src: &mut ByteBuffer,
        dst: &mut IoBuffer<D::Output>,
        workbuf: &mut [u8],
    ) -> Result<Status, DriveError>
    where
        D: Decoder + ?Sized,
        S: Source + ?Sized,
        K: Sink<D::Output> + ?Sized,
    {
        let mut guard = ProgressGuard::new(self.no_progress_limit);
        let mut arrived = 0;
        loop {
            if src.reader_len() == 0 && !src.is_closed() {
                arrived += refill(source, src)?;
            }

            let src_before = src.reader_index();
            let dst_before = dst.writer_index();
            let status = decoder.advance(dst, src, workbuf)?;
            let moved = src.reader_index() != src_before || dst.writer_index() != dst_before;

            sink.drain(dst.readable(), &src.written()[src_before..src.reader_index()])
                .map_err(DriveError::Sink)?;
            dst.clear();

            match status {
                Status::Ok | Status::Note(_) => return Ok(status),
                Status::Suspended(Suspension::ShortWrite) => {}
                Status::Suspended(Suspension::ShortRead) => {
                    arrived += refill(source, src)?;
                }
            }

            guard
                .record(moved || arrived > 0)
                .map_err(DecodeError::from)?;
            arrived = 0;
        }
    }
}

#[cfg(feature = "std")]
pub use self::io::{ReaderSource, WriteSink};

#[cfg(feature = "std")]
mod io {
    use std::io::{ErrorKind, Read, Write};

    use super::{BoxError, Fill, Sink, Source};

    /// Reads from any [`Read`] implementation.
    ///
    /// A read of zero bytes is the end of the stream. Interrupted reads are
    /// retried.
    #[derive(Debug)]
    pub struct ReaderSource<R>(pub R);

    impl<R: Read> Source for ReaderSource<R> {
        fn read_into(&mut self, dst: &mut [u8]) -> Result<Fill, BoxError> {
            loop {
                match self.0.read(dst) {
                    Ok(0) => return Ok(Fill::Closed),
                    Ok(n) => return Ok(Fill::Bytes(n)),
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    /// Writes every byte to any [`Write`] implementation.
    #[derive(Debug)]
    pub struct WriteSink<W>(pub W);

    impl<W: Write> Sink<u8> for WriteSink<W> {
        fn drain(&mut self, items: &[u8], _consumed: &[u8]) -> Result<(), BoxError> {
            self.0.write_all(items)?;
            Ok(())
        }
    }
}
