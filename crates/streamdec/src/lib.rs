//! Suspendable, bounded-memory streaming decoders.
//!
//! Every decoder here reads from a caller-owned [`ByteBuffer`] and writes to a
//! caller-owned [`IoBuffer`], and may stop at any byte boundary when either
//! runs dry. The caller refills or drains and calls again; nothing is ever
//! re-read and nothing grows without bound. [`Pump`] packages that loop for
//! byte and token decoders, [`image::decode_animation`] for images.
//!
//! ```rust
//! use streamdec::{ByteBuffer, Pump, SliceSource};
//! use streamdec::compress::{ChecksumOptions, GzipDecoder, WINDOW_LEN};
//!
//! let gz = b"\x1f\x8b\x08\x00\x00\x00\x00\x00\x02\x03\xf3\x48\xcd\xc9\xc9\x57\
//! \x08\x2f\x4d\x4b\x2b\xd6\xe3\x02\x00\x3c\x84\x75\xbb\x0d\x00\x00\x00";
//! let mut out = Vec::new();
//! let mut src = ByteBuffer::with_capacity(16);
//! let mut dst = ByteBuffer::with_capacity(16);
//! let mut window = vec![0; WINDOW_LEN];
//! Pump::default()
//!     .run(
//!         &mut GzipDecoder::new(ChecksumOptions::default()),
//!         &mut SliceSource::new(gz),
//!         &mut out,
//!         &mut src,
//!         &mut dst,
//!         &mut window,
//!     )
//!     .unwrap();
//! assert_eq!(out, b"Hello Wuffs.\n");
//! ```

#![no_std]
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

mod buffer;
mod decoder;
mod driver;
mod error;
mod quirks;
mod status;

pub mod cbor;
pub mod compress;
pub mod image;
pub mod json;

#[cfg(any(test, feature = "fuzzing"))]
mod chunk_utils;

#[cfg(test)]
mod tests;

pub use buffer::{BufferError, ByteBuffer, IoBuffer};
#[cfg(any(test, feature = "fuzzing"))]
pub use chunk_utils::{produce_chunks, split_at_schedule};
pub use decoder::{Decoder, Sniff, WorkbufLen};
#[cfg(feature = "std")]
pub use driver::{ReaderSource, WriteSink};
pub use driver::{
    BoxError, DEFAULT_NO_PROGRESS_LIMIT, DriveError, Fill, FnSink, ProgressGuard, Pump, Sink,
    SliceSource, Source, refill,
};
pub use error::{DecodeError, Format, InternalError};
pub use quirks::{ALL_QUIRKS, Quirk, Quirks, UnknownQuirk};
pub use status::{DecodeResult, FourCc, Note, Status, Suspension};
