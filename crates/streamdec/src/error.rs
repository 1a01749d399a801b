use core::fmt;

use thiserror::Error;

use crate::{buffer::BufferError, quirks::Quirk};

/// The formats this crate decodes, used to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Format {
    /// Raw RFC 1951 deflate.
    Deflate,
    /// RFC 1950 zlib.
    Zlib,
    /// RFC 1952 gzip.
    Gzip,
    /// RFC 8259 JSON.
    Json,
    /// RFC 8949 Concise Binary Object Representation.
    Cbor,
    /// Windows bitmap.
    Bmp,
    /// Graphics Interchange Format.
    Gif,
    /// Naive image / naive animation.
    Nie,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Deflate => "deflate",
            Format::Zlib => "zlib",
            Format::Gzip => "gzip",
            Format::Json => "json",
            Format::Cbor => "cbor",
            Format::Bmp => "bmp",
            Format::Gif => "gif",
            Format::Nie => "nie",
        })
    }
}

/// Everything a decode call can fail with.
///
/// All variants except [`DecodeError::Internal`] are foreseeable: bad or
/// unsupported input, or a caller using the API wrongly. `Internal` means the
/// engine itself broke an invariant and must not be retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// More input was needed but the source is closed.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// The input violates the format.
    #[error("{format}: {reason}")]
    Malformed {
        /// Which decoder rejected it.
        format: Format,
        /// Short description, e.g. `bad header`.
        reason: &'static str,
    },
    /// The input is well formed but uses a feature this crate lacks.
    #[error("{format}: unsupported {what}")]
    Unsupported {
        /// Which decoder rejected it.
        format: Format,
        /// The missing feature.
        what: &'static str,
    },
    /// A trailing checksum did not match the decoded data.
    #[error("{format}: checksum mismatch (want {want:#010x}, have {have:#010x})")]
    ChecksumMismatch {
        /// Which decoder computed it.
        format: Format,
        /// Value recorded in the stream.
        want: u32,
        /// Value computed over the decoded data.
        have: u32,
    },
    /// The image header declares dimensions past the configured limits.
    #[error("image is too large: {width}x{height} exceeds {max_width}x{max_height}")]
    TooLarge {
        /// Declared width.
        width: u64,
        /// Declared height.
        height: u64,
        /// Configured width limit.
        max_width: u32,
        /// Configured height limit.
        max_height: u32,
    },
    /// The caller passed an argument the decoder cannot work with.
    #[error("bad argument: {0}")]
    BadArgument(&'static str),
    /// Decoder methods were called out of order.
    #[error("bad call sequence")]
    BadCallSequence,
    /// The quirk does not apply to this decoder, or it came too late.
    #[error("unsupported option: {0}")]
    UnsupportedOption(Quirk),
    /// An earlier call failed; the decoder refuses to continue.
    #[error("disabled by previous error")]
    DisabledByPreviousError,
    /// The engine broke one of its own invariants.
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

/// Invariant violations inside the engine.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InternalError {
    /// The driver loop spun without either buffer moving.
    #[error("no progress after {0} calls")]
    NoProgress(u32),
    /// A decoder tried to write past its destination.
    #[error("destination overflow")]
    DestinationOverflow,
    /// A decoder tried to read past its source.
    #[error("inconsistent source indices")]
    InconsistentSource,
    /// A decoder reached a state its own logic rules out.
    #[error("inconsistent decoder state")]
    InconsistentState,
}

impl From<BufferError> for InternalError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::Underflow { .. } => InternalError::InconsistentSource,
            BufferError::Overflow { .. } | BufferError::Closed => {
                InternalError::DestinationOverflow
            }
        }
    }
}

/// Buffer misuse from inside a decoder is the decoder's fault.
impl From<BufferError> for DecodeError {
    fn from(err: BufferError) -> Self {
        DecodeError::Internal(err.into())
    }
}

impl DecodeError {
    pub(crate) const fn malformed(format: Format, reason: &'static str) -> Self {
        DecodeError::Malformed { format, reason }
    }

    pub(crate) const fn unsupported(format: Format, what: &'static str) -> Self {
        DecodeError::Unsupported { format, what }
    }

    /// Whether this is an engine defect rather than bad input or misuse.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, DecodeError::Internal(_))
    }

    /// Process exit code for drivers: 2 for internal errors, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_internal() { 2 } else { 1 }
    }
}
