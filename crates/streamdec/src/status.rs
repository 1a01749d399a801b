use core::fmt;

use crate::{buffer::ByteBuffer, error::DecodeError};

/// Non-error outcome of a decode call.
///
/// Errors travel separately in the `Err` arm of [`DecodeResult`], so a
/// `Result<Status, DecodeError>` always holds exactly one of the four shapes:
/// done, suspended, note or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Status {
    /// The requested unit of work finished.
    Ok,
    /// Call again after supplying input or draining output.
    Suspended(Suspension),
    /// A terminal or semi-terminal condition that is not an error.
    Note(Note),
}

/// Why a decoder handed control back before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Suspension {
    /// Every readable source byte was used; more are needed.
    ShortRead,
    /// The destination is full.
    ShortWrite,
}

/// Clean, non-error terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Note {
    /// The format-level end of the stream was reached.
    EndOfData,
    /// The payload from `position` onwards belongs to another decoder.
    IoRedirect {
        /// Format of the embedded payload.
        fourcc: FourCc,
        /// Absolute source position where that payload starts.
        position: u64,
    },
}

/// A four-character format code such as `JPEG` or `PNG `.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    /// JPEG payload.
    pub const JPEG: FourCc = FourCc(*b"JPEG");
    /// PNG payload.
    pub const PNG: FourCc = FourCc(*b"PNG ");
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// What every decode step returns.
pub type DecodeResult = Result<Status, DecodeError>;

impl Status {
    /// Shorthand for `Suspended(ShortRead)`.
    pub const SHORT_READ: Status = Status::Suspended(Suspension::ShortRead);
    /// Shorthand for `Suspended(ShortWrite)`.
    pub const SHORT_WRITE: Status = Status::Suspended(Suspension::ShortWrite);
    /// Shorthand for `Note(EndOfData)`.
    pub const END_OF_DATA: Status = Status::Note(Note::EndOfData);

    /// Whether the caller should retry after doing I/O.
    #[must_use]
    pub fn is_suspension(self) -> bool {
        matches!(self, Status::Suspended(_))
    }

    /// Whether the decode session has nothing more to give.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_suspension()
    }
}

/// The outcome for a decoder that has run out of readable bytes.
///
/// On an open source this is a [`Suspension::ShortRead`]; once the source is
/// closed no more bytes can arrive, so the same situation is an
/// [`DecodeError::UnexpectedEof`].
pub(crate) fn need_input(src: &ByteBuffer) -> DecodeResult {
    if src.is_closed() {
        Err(DecodeError::UnexpectedEof)
    } else {
        Ok(Status::SHORT_READ)
    }
}

/// Peeks at exactly `n` readable bytes.
///
/// Returns `Ok(None)` when the source is open but does not hold `n` bytes yet.
pub(crate) fn peek(src: &ByteBuffer, n: usize) -> Result<Option<&[u8]>, DecodeError> {
    match src.readable().get(..n) {
        Some(bytes) => Ok(Some(bytes)),
        None if src.is_closed() => Err(DecodeError::UnexpectedEof),
        None => Ok(None),
    }
}
