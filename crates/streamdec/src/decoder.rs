use crate::{buffer::{ByteBuffer, IoBuffer}, quirks::Quirk, status::DecodeResult};

/// Work buffer requirements, known before decoding starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkbufLen {
    /// Smallest work buffer the decoder accepts.
    pub min: usize,
    /// Largest work buffer the decoder will ever touch.
    pub max: usize,
}

impl WorkbufLen {
    /// No work buffer needed.
    pub const NONE: WorkbufLen = WorkbufLen { min: 0, max: 0 };

    /// Exactly `n` bytes.
    #[must_use]
    pub const fn exactly(n: usize) -> Self {
        WorkbufLen { min: n, max: n }
    }
}

/// A resumable transformation from source bytes to destination items.
///
/// [`Decoder::advance`] may stop at any byte boundary. Whatever state it needs
/// to pick up again lives in `self`; consumed source bytes are never asked for
/// twice. One call returns one of:
///
/// - `Ok(Status::Ok)` or `Ok(Status::Note(_))` when finished. Further calls
///   return the same status again rather than restarting.
/// - `Ok(Status::Suspended(_))` when the caller must refill `src` or drain
///   `dst` first.
/// - `Err(_)` when the input is bad or an invariant broke. The decoder is
///   disabled afterwards.
pub trait Decoder {
    /// The destination element type: `u8` for decompressors, tokens for JSON.
    type Output: Copy + Default;

    /// Enables or disables a quirk. Only valid before the first
    /// [`Decoder::advance`].
    ///
    /// # Errors
    ///
    /// [`crate::DecodeError::UnsupportedOption`] if this decoder does not
    /// consult `quirk`, [`crate::DecodeError::BadCallSequence`] if decoding
    /// has already started.
    fn set_quirk(&mut self, quirk: Quirk, enabled: bool) -> Result<(), crate::DecodeError>;

    /// How large `workbuf` must be.
    fn workbuf_len(&self) -> WorkbufLen;

    /// Decodes as much as the buffers allow.
    ///
    /// # Errors
    ///
    /// Malformed or unsupported input, a too-small `workbuf`, or an internal
    /// invariant violation.
    fn advance(
        &mut self,
        dst: &mut IoBuffer<Self::Output>,
        src: &mut ByteBuffer,
        workbuf: &mut [u8],
    ) -> DecodeResult;
}

/// Result of matching a stream prefix against known signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff<T> {
    /// The prefix identifies this format.
    Known(T),
    /// No supported format starts like this.
    Unknown,
    /// Too few bytes to tell yet.
    NeedMoreData,
}
