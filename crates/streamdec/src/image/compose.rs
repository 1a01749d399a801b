//! Turns a stream of frames into a sequence of complete canvases.
//!
//! Frames may cover part of the canvas and may ask for their area to be
//! cleared or restored once shown. [`Compositor`] tracks that: call
//! [`Compositor::begin_frame`] before decoding each frame into
//! [`Compositor::pixels`], read the finished canvas, then call
//! [`Compositor::end_frame`]. The disposal of one frame is applied when the
//! next one begins.

use alloc::{vec, vec::Vec};
use core::ops::ControlFlow;

use log::{debug, trace};

use super::{
    Decoded, Disposal, FrameConfig, ImageConfig, ImageDecoder, ImageLimits, PixelBuffer, Staged,
};
use crate::{
    buffer::ByteBuffer,
    driver::{BoxError, DriveError, ProgressGuard, Source, refill},
    error::{DecodeError, InternalError},
    status::{Note, Suspension},
};

/// An owned canvas plus the disposal bookkeeping between frames.
#[derive(Debug, Clone)]
pub struct Compositor {
    config: ImageConfig,
    canvas: Vec<u8>,
    backup: Vec<u8>,
    current: Option<FrameConfig>,
    pending: Option<FrameConfig>,
}

impl Compositor {
    /// Allocates a canvas for `config`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::TooLarge`] if the image exceeds `limits`, checked
    /// before anything is allocated.
    pub fn new(config: &ImageConfig, limits: &ImageLimits) -> Result<Self, DecodeError> {
        limits.check(u64::from(config.width), u64::from(config.height))?;
        let len = config
            .pixbuf_len()
            .ok_or(DecodeError::BadArgument("image is too large for this platform"))?;
        Ok(Self {
            config: *config,
            canvas: vec![0; len],
            backup: Vec::new(),
            current: None,
            pending: None,
        })
    }

    /// The image this canvas was sized for.
    #[must_use]
    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Prepares the canvas for `frame`.
    pub fn begin_frame(&mut self, frame: &FrameConfig) {
        if let Some(prev) = self.pending.take() {
            match prev.disposal {
                Disposal::None => {}
                Disposal::RestoreBackground => {
                    trace!("compose: clearing {} after frame {}", prev.bounds, prev.index);
                    self.fill(prev.bounds, prev.background_color);
                }
                Disposal::RestorePrevious => {
                    trace!("compose: restoring canvas after frame {}", prev.index);
                    self.canvas.copy_from_slice(&self.backup);
                }
            }
        }
        if frame.index == 0 {
            let all = self.config.bounds();
            self.fill(all, frame.background_color);
        }
        if frame.disposal == Disposal::RestorePrevious {
            self.backup.clear();
            self.backup.extend_from_slice(&self.canvas);
        }
        self.current = Some(*frame);
    }

    fn fill(&mut self, rect: super::Rect, px: [u8; 4]) {
        if let Ok(mut pixels) = self.pixels() {
            pixels.fill(rect, px);
        }
    }

    /// The canvas as a paint target.
    ///
    /// # Errors
    ///
    /// None in practice; the canvas is always sized for the config.
    pub fn pixels(&mut self) -> Result<PixelBuffer<'_>, DecodeError> {
        PixelBuffer::new(&self.config, &mut self.canvas)
    }

    /// Marks the current frame as shown.
    pub fn end_frame(&mut self) {
        self.pending = self.current.take();
    }

    /// The composited canvas, BGRA row-major.
    #[must_use]
    pub fn canvas(&self) -> &[u8] {
        &self.canvas
    }
}

/// Summary of a fully decoded animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    /// The image header.
    pub config: ImageConfig,
    /// Frames decoded and handed to the callback.
    pub frames: u64,
    /// As reported by [`ImageDecoder::num_animation_loops`] at the end.
    pub loops: u32,
}

/// Calls one decoding stage until it stops suspending, refilling `src` from
/// `source` on short reads.
///
/// # Errors
///
/// The stage's own error, a source error, [`InternalError::NoProgress`] from
/// `guard`, or [`InternalError::InconsistentState`] if the stage asks for
/// output room it cannot have.
pub fn run_stage<T, S>(
    guard: &mut ProgressGuard,
    source: &mut S,
    src: &mut ByteBuffer,
    mut stage: impl FnMut(&mut ByteBuffer) -> Staged<T>,
) -> Result<Decoded<T>, DriveError>
where
    S: Source + ?Sized,
{
    loop {
        let before = src.reader_position();
        match stage(src)? {
            Decoded::Suspended(Suspension::ShortRead) => {
                let arrived = refill(source, src)?;
                guard
                    .record(arrived > 0 || src.reader_position() != before)
                    .map_err(DecodeError::from)?;
            }
            Decoded::Suspended(Suspension::ShortWrite) => {
                return Err(DecodeError::from(InternalError::InconsistentState).into());
            }
            done => return Ok(done),
        }
    }
}

/// Decodes every frame of an image, compositing each onto a canvas and
/// passing it to `on_frame` along with its config.
///
/// `on_frame` may stop early with [`ControlFlow::Break`]. A payload that
/// belongs to another decoder comes back as a [`Decoded::Note`].
///
/// # Errors
///
/// Decode, source and callback errors; callback errors are reported as
/// [`DriveError::Sink`].
pub fn decode_animation<D, S, F>(
    decoder: &mut D,
    source: &mut S,
    src: &mut ByteBuffer,
    limits: &ImageLimits,
    mut on_frame: F,
) -> Result<Decoded<Animation>, DriveError>
where
    D: ImageDecoder + ?Sized,
    S: Source + ?Sized,
    F: FnMut(&FrameConfig, &[u8]) -> Result<ControlFlow<()>, BoxError>,
{
    let mut guard = ProgressGuard::default();
    let config = match run_stage(&mut guard, source, src, |src| decoder.decode_image_config(src))? {
        Decoded::Ready(config) => config,
        other => return Ok(other.map_none()),
    };
    let mut compositor = Compositor::new(&config, limits)?;
    let mut workbuf = vec![0; decoder.workbuf_len().max];
    let mut frames = 0;
    loop {
        let frame = match run_stage(&mut guard, source, src, |src| decoder.decode_frame_config(src))? {
            Decoded::Ready(frame) => frame,
            Decoded::Note(Note::EndOfData) => break,
            other => return Ok(other.map_none()),
        };
        compositor.begin_frame(&frame);
        let mut pixels = compositor.pixels()?;
        let painted = run_stage(&mut guard, source, src, |src| {
            decoder.decode_frame(&mut pixels, src, frame.blend, &mut workbuf)
        })?;
        if !matches!(painted, Decoded::Ready(())) {
            return Ok(painted.map_none());
        }
        frames += 1;
        let flow = on_frame(&frame, compositor.canvas()).map_err(DriveError::Sink)?;
        compositor.end_frame();
        if flow.is_break() {
            debug!("compose: stopped after {frames} frames");
            break;
        }
    }
    Ok(Decoded::Ready(Animation {
        config,
        frames,
        loops: decoder.num_animation_loops(),
    }))
}

impl<T> Decoded<T> {
    /// Re-types a `Suspended` or `Note`; a `Ready` value is dropped.
    fn map_none<U>(self) -> Decoded<U> {
        match self {
            Decoded::Ready(_) => Decoded::Note(Note::EndOfData),
            Decoded::Suspended(s) => Decoded::Suspended(s),
            Decoded::Note(n) => Decoded::Note(n),
        }
    }
}
