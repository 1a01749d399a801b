//! Image decoders and the frame compositor.
//!
//! Image decoding is staged. [`ImageDecoder::decode_image_config`] reads the
//! header, [`ImageDecoder::decode_frame_config`] the next frame's header and
//! [`ImageDecoder::decode_frame`] its pixels. A stage may be skipped: asking
//! for a frame config first decodes the image config, and asking for the next
//! frame config skips over undecoded pixels. Each stage can suspend for more
//! input; while it is suspended only the same stage may be called again.

mod bmp;
mod compose;
mod config;
mod gif;
mod nie;
mod pixbuf;

pub use bmp::BmpDecoder;
pub use compose::{Animation, Compositor, decode_animation, run_stage};
pub use config::{
    Blend, Disposal, FLICKS_PER_SECOND, Flicks, FrameConfig, ImageConfig, ImageLimits, PixelFormat, Rect,
};
pub use gif::{GifDecoder, GifOptions, LoopCountPolicy};
pub use nie::NieDecoder;
pub use pixbuf::PixelBuffer;

use crate::{
    buffer::ByteBuffer,
    decoder::{Sniff, WorkbufLen},
    error::DecodeError,
    quirks::Quirk,
    status::{Note, Suspension},
};

/// Source buffer size that fits every header and sub-block an image decoder
/// must see whole.
pub const MIN_SRC_CAPACITY: usize = 256;

/// The outcome of one image decoding stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<T> {
    /// The stage finished with this value.
    Ready(T),
    /// Refill the source and call the same stage again.
    Suspended(Suspension),
    /// No value: the image ended, or its payload belongs to another decoder.
    Note(Note),
}

impl<T> Decoded<T> {
    /// The value, if the stage finished.
    pub fn ready(self) -> Option<T> {
        match self {
            Decoded::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn is_suspended(&self) -> bool {
        matches!(self, Decoded::Suspended(_))
    }
}

pub(crate) type Staged<T> = Result<Decoded<T>, DecodeError>;

pub(crate) const fn short_read<T>() -> Decoded<T> {
    Decoded::Suspended(Suspension::ShortRead)
}

/// A staged, resumable image decoder.
pub trait ImageDecoder {
    /// Enables or disables a quirk before decoding starts.
    ///
    /// # Errors
    ///
    /// As for [`crate::Decoder::set_quirk`].
    fn set_quirk(&mut self, quirk: Quirk, enabled: bool) -> Result<(), DecodeError>;

    /// Scratch space [`ImageDecoder::decode_frame`] needs.
    fn workbuf_len(&self) -> WorkbufLen;

    /// Decodes the image header.
    ///
    /// # Errors
    ///
    /// Malformed or unsupported headers, dimensions past the
    /// [`ImageLimits`], or a call while another stage is suspended.
    fn decode_image_config(&mut self, src: &mut ByteBuffer) -> Staged<ImageConfig>;

    /// Decodes the next frame header, or reports [`Note::EndOfData`].
    ///
    /// # Errors
    ///
    /// As for [`ImageDecoder::decode_image_config`].
    fn decode_frame_config(&mut self, src: &mut ByteBuffer) -> Staged<FrameConfig>;

    /// Paints the current frame into `dst`, which must be sized for the
    /// image config.
    ///
    /// # Errors
    ///
    /// Malformed pixel data, a `workbuf` shorter than
    /// [`ImageDecoder::workbuf_len`], or a call out of sequence.
    fn decode_frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut ByteBuffer,
        blend: Blend,
        workbuf: &mut [u8],
    ) -> Staged<()>;

    /// How many times the animation plays; 0 means forever, and a still
    /// image reports 0.
    fn num_animation_loops(&self) -> u32;

    /// Frame configs decoded so far.
    fn num_decoded_frame_configs(&self) -> u64;

    /// Frames decoded so far.
    fn num_decoded_frames(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    ImageConfig,
    FrameConfig,
    Frame,
}

/// Bookkeeping shared by every image decoder: which stage is suspended,
/// whether decoding started, and whether an error disabled the decoder.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Calls {
    suspended: Option<Call>,
    started: bool,
    failed: bool,
}

impl Calls {
    pub(crate) fn started(&self) -> bool {
        self.started
    }

    pub(crate) fn enter(&mut self, call: Call) -> Result<(), DecodeError> {
        if self.failed {
            return Err(DecodeError::DisabledByPreviousError);
        }
        if self.suspended.is_some_and(|s| s != call) {
            return Err(DecodeError::BadCallSequence);
        }
        self.started = true;
        Ok(())
    }

    pub(crate) fn leave<T>(&mut self, call: Call, result: &Staged<T>) {
        match result {
            Err(_) => self.failed = true,
            Ok(d) if d.is_suspended() => self.suspended = Some(call),
            Ok(_) => self.suspended = None,
        }
    }
}

/// The image formats with decoders in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Windows bitmap.
    Bmp,
    /// GIF 87a or 89a.
    Gif,
    /// Naive image or naive animation.
    Nie,
}

const SIGNATURES: [(&[u8], ImageFormat); 5] = [
    (b"BM", ImageFormat::Bmp),
    (b"GIF87a", ImageFormat::Gif),
    (b"GIF89a", ImageFormat::Gif),
    (&nie::NIE_MAGIC, ImageFormat::Nie),
    (&nie::NIA_MAGIC, ImageFormat::Nie),
];

impl ImageFormat {
    /// Identifies a format from the first bytes of a stream.
    #[must_use]
    pub fn sniff(prefix: &[u8], closed: bool) -> Sniff<ImageFormat> {
        if let Some(&(_, format)) = SIGNATURES.iter().find(|(sig, _)| prefix.starts_with(sig)) {
            return Sniff::Known(format);
        }
        if !closed && SIGNATURES.iter().any(|(sig, _)| sig.starts_with(prefix)) {
            return Sniff::NeedMoreData;
        }
        Sniff::Unknown
    }
}

/// Any of the image decoders, chosen at run time.
#[derive(Debug)]
pub enum AnyImageDecoder {
    /// BMP.
    Bmp(BmpDecoder),
    /// GIF.
    Gif(GifDecoder),
    /// NIE and NIA.
    Nie(NieDecoder),
}

impl AnyImageDecoder {
    /// A fresh decoder for `format` with default options.
    #[must_use]
    pub fn new(format: ImageFormat, limits: ImageLimits) -> Self {
        match format {
            ImageFormat::Bmp => AnyImageDecoder::Bmp(BmpDecoder::new(limits)),
            ImageFormat::Gif => AnyImageDecoder::Gif(GifDecoder::new(GifOptions::default(), limits)),
            ImageFormat::Nie => AnyImageDecoder::Nie(NieDecoder::new(limits)),
        }
    }

    fn inner(&mut self) -> &mut dyn ImageDecoder {
        match self {
            AnyImageDecoder::Bmp(d) => d,
            AnyImageDecoder::Gif(d) => d,
            AnyImageDecoder::Nie(d) => d,
        }
    }

    fn inner_ref(&self) -> &dyn ImageDecoder {
        match self {
            AnyImageDecoder::Bmp(d) => d,
            AnyImageDecoder::Gif(d) => d,
            AnyImageDecoder::Nie(d) => d,
        }
    }
}

impl ImageDecoder for AnyImageDecoder {
    fn set_quirk(&mut self, quirk: Quirk, enabled: bool) -> Result<(), DecodeError> {
        self.inner().set_quirk(quirk, enabled)
    }

    fn workbuf_len(&self) -> WorkbufLen {
        self.inner_ref().workbuf_len()
    }

    fn decode_image_config(&mut self, src: &mut ByteBuffer) -> Staged<ImageConfig> {
        self.inner().decode_image_config(src)
    }

    fn decode_frame_config(&mut self, src: &mut ByteBuffer) -> Staged<FrameConfig> {
        self.inner().decode_frame_config(src)
    }

    fn decode_frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut ByteBuffer,
        blend: Blend,
        workbuf: &mut [u8],
    ) -> Staged<()> {
        self.inner().decode_frame(dst, src, blend, workbuf)
    }

    fn num_animation_loops(&self) -> u32 {
        self.inner_ref().num_animation_loops()
    }

    fn num_decoded_frame_configs(&self) -> u64 {
        self.inner_ref().num_decoded_frame_configs()
    }

    fn num_decoded_frames(&self) -> u64 {
        self.inner_ref().num_decoded_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffing() {
        assert_eq!(ImageFormat::sniff(b"BM\0\0", false), Sniff::Known(ImageFormat::Bmp));
        assert_eq!(ImageFormat::sniff(b"GIF89a\x01", true), Sniff::Known(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"GIF8", false), Sniff::NeedMoreData);
        assert_eq!(ImageFormat::sniff(b"GIF8", true), Sniff::Unknown);
        assert_eq!(ImageFormat::sniff(b"GIF90a", false), Sniff::Unknown);
        assert_eq!(
            ImageFormat::sniff(&[0x6E, 0xC3, 0xAF, 0x41, 0xFF], false),
            Sniff::Known(ImageFormat::Nie)
        );
        assert_eq!(ImageFormat::sniff(b"", false), Sniff::NeedMoreData);
    }

    #[test]
    fn interleaved_stages_are_rejected() {
        let mut calls = Calls::default();
        calls.enter(Call::ImageConfig).unwrap();
        calls.leave::<()>(Call::ImageConfig, &Ok(short_read()));
        assert_eq!(calls.enter(Call::Frame), Err(DecodeError::BadCallSequence));
        calls.enter(Call::ImageConfig).unwrap();
        calls.leave(Call::ImageConfig, &Ok(Decoded::Ready(())));
        calls.enter(Call::Frame).unwrap();
        calls.leave::<()>(Call::Frame, &Err(DecodeError::UnexpectedEof));
        assert_eq!(calls.enter(Call::Frame), Err(DecodeError::DisabledByPreviousError));
    }
}
