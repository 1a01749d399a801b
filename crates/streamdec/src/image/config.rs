use core::fmt;

use crate::error::DecodeError;

/// Time unit for frame durations: 1/705,600,000 of a second.
pub type Flicks = u64;

/// One second in [`Flicks`].
pub const FLICKS_PER_SECOND: Flicks = 705_600_000;

/// Destination pixel layouts. Every decoder produces this single format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PixelFormat {
    /// Four bytes per pixel, blue first, alpha not premultiplied.
    #[default]
    Bgra8Nonpremul,
}

impl PixelFormat {
    /// Bytes occupied by one pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8Nonpremul => 4,
        }
    }
}

/// A half-open pixel rectangle: `x0..x1` by `y0..y1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Rect {
    /// Left edge, inclusive.
    pub x0: u32,
    /// Top edge, inclusive.
    pub y0: u32,
    /// Right edge, exclusive.
    pub x1: u32,
    /// Bottom edge, exclusive.
    pub y1: u32,
}

impl Rect {
    /// The rectangle at the origin with the given size.
    #[must_use]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Rect {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
        }
    }

    /// Width, zero if inverted.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    /// Height, zero if inverted.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// Whether the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// The overlap of two rectangles, possibly empty.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        Rect {
            x0,
            y0,
            x1: self.x1.min(other.x1).max(x0),
            y1: self.y1.min(other.y1).max(y0),
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})..({},{})", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Whole-image properties, known after the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageConfig {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Layout of decoded pixels.
    pub pixel_format: PixelFormat,
    /// Stream offset where the first frame's data starts.
    pub first_frame_io_position: u64,
    /// Whether the first frame covers the canvas with opaque pixels only.
    pub first_frame_is_opaque: bool,
}

impl ImageConfig {
    /// The canvas rectangle.
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Bytes needed for one canvas of pixels, or `None` if that overflows
    /// `usize`.
    #[must_use]
    pub fn pixbuf_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.pixel_format.bytes_per_pixel())
    }
}

/// What happens to a frame's area once the frame has been shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Disposal {
    /// Leave the pixels in place.
    #[default]
    None,
    /// Fill the frame bounds with the background color.
    RestoreBackground,
    /// Put back the canvas as it was before the frame.
    RestorePrevious,
}

/// How frame pixels combine with the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Blend {
    /// Overwrite.
    #[default]
    Src,
    /// Composite over what is already there.
    SrcOver,
}

/// Per-frame properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FrameConfig {
    /// Area of the canvas the frame paints.
    pub bounds: Rect,
    /// How long the frame is shown.
    pub duration: Flicks,
    /// Zero-based frame number.
    pub index: u64,
    /// Stream offset where this frame's data starts.
    pub io_position: u64,
    /// What to do with the frame's area afterwards.
    pub disposal: Disposal,
    /// How to paint the frame.
    pub blend: Blend,
    /// Whether every pixel inside `bounds` is opaque.
    pub opaque_within_bounds: bool,
    /// Canvas background, BGRA non-premultiplied.
    pub background_color: [u8; 4],
}

impl fmt::Display for FrameConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} at {}: bounds {} duration {} {:?}/{:?}",
            self.index, self.io_position, self.bounds, self.duration, self.disposal, self.blend
        )?;
        if self.opaque_within_bounds {
            f.write_str(" opaque")?;
        }
        Ok(())
    }
}

/// Largest canvas an image decoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    /// Widest accepted canvas.
    ///
    /// # Default
    ///
    /// `16384`
    pub max_width: u32,
    /// Tallest accepted canvas.
    ///
    /// # Default
    ///
    /// `16384`
    pub max_height: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_width: 16384,
            max_height: 16384,
        }
    }
}

impl ImageLimits {
    pub(crate) fn check(&self, width: u64, height: u64) -> Result<(), DecodeError> {
        if width > u64::from(self.max_width) || height > u64::from(self.max_height) {
            return Err(DecodeError::TooLarge {
                width,
                height,
                max_width: self.max_width,
                max_height: self.max_height,
            });
        }
        Ok(())
    }
}
