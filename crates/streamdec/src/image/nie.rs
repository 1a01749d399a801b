//! Naive image (NIE) and naive animation (NIA).
//!
//! Both start with a 16-byte header: a magic number, `FF 'b'`, `'n'` or `'p'`
//! (non-premultiplied or premultiplied alpha), `'4'` or `'8'` (bytes per
//! pixel), then width and height as little-endian `u32`s below
//! `0x8000_0000`. NIE follows with BGRA
//! pixels. NIA follows with frames, each an 8-byte cumulative display
//! duration, a complete NIE, and 4 bytes of zero padding when 4-byte pixels
//! leave the frame at an odd multiple of 4. A duration whose high half is
//! exactly `0x8000_0000` is the footer; its low half is the loop count.

use log::{debug, trace};

use super::{
    Blend, Call, Calls, Decoded, FrameConfig, ImageConfig, ImageDecoder, ImageLimits, PixelBuffer,
    PixelFormat, Rect, Staged, short_read,
};
use crate::{
    buffer::ByteBuffer,
    decoder::WorkbufLen,
    error::{DecodeError, Format},
    quirks::{Quirk, admit},
    status::{Note, peek},
};

/// "nïE" in UTF-8.
pub(crate) const NIE_MAGIC: [u8; 4] = [0x6E, 0xC3, 0xAF, 0x45];
/// "nïA" in UTF-8.
pub(crate) const NIA_MAGIC: [u8; 4] = [0x6E, 0xC3, 0xAF, 0x41];

const FOOTER_TAG: u32 = 0x8000_0000;

fn bad(reason: &'static str) -> DecodeError {
    DecodeError::malformed(Format::Nie, reason)
}

fn u32le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    FrameHeader,
    Pixels,
    Padding,
    Done,
}

/// Decoder for NIE stills and NIA animations.
#[derive(Debug, Clone)]
pub struct NieDecoder {
    limits: ImageLimits,
    calls: Calls,
    phase: Phase,
    animated: bool,
    /// Header bytes 4..16, which every NIA frame must repeat.
    layout: [u8; 12],
    config: Option<ImageConfig>,
    pixels_done: u64,
    prev_cdd: u64,
    loops: u32,
    num_frame_configs: u64,
    num_frames: u64,
}

impl Default for NieDecoder {
    fn default() -> Self {
        Self::new(ImageLimits::default())
    }
}

impl NieDecoder {
    /// A decoder positioned at the start of a NIE or NIA stream.
    #[must_use]
    pub fn new(limits: ImageLimits) -> Self {
        Self {
            limits,
            calls: Calls::default(),
            phase: Phase::Header,
            animated: false,
            layout: [0; 12],
            config: None,
            pixels_done: 0,
            prev_cdd: 0,
            loops: 0,
            num_frame_configs: 0,
            num_frames: 0,
        }
    }

    fn premultiplied(&self) -> bool {
        self.layout[2] == b'p'
    }

    fn bytes_per_pixel(&self) -> usize {
        if self.layout[3] == b'8' { 8 } else { 4 }
    }

    fn padded(&self) -> bool {
        let width = u32le(&self.layout[4..8]);
        let height = u32le(&self.layout[8..12]);
        self.animated && self.bytes_per_pixel() == 4 && width & height & 1 == 1
    }

    fn total_pixels(&self) -> u64 {
        u64::from(u32le(&self.layout[4..8])) * u64::from(u32le(&self.layout[8..12]))
    }

    fn image_config(&mut self, src: &mut ByteBuffer) -> Staged<ImageConfig> {
        if let Some(config) = self.config {
            return Ok(Decoded::Ready(config));
        }
        let Some(header) = peek(src, 16)? else {
            return Ok(short_read());
        };
        let animated = if header[..4] == NIE_MAGIC {
            false
        } else if header[..4] == NIA_MAGIC {
            true
        } else {
            return Err(bad("bad header"));
        };
        let width = u32le(&header[8..12]);
        let height = u32le(&header[12..16]);
        if header[4] != 0xFF
            || header[5] != b'b'
            || !matches!(header[6], b'n' | b'p')
            || !matches!(header[7], b'4' | b'8')
            || width >= 0x8000_0000
            || height >= 0x8000_0000
        {
            return Err(bad("bad header"));
        }
        self.limits.check(u64::from(width), u64::from(height))?;
        self.layout.copy_from_slice(&header[4..16]);
        self.animated = animated;
        src.consume(16)?;

        let config = ImageConfig {
            width,
            height,
            pixel_format: PixelFormat::Bgra8Nonpremul,
            first_frame_io_position: src.reader_position(),
            first_frame_is_opaque: false,
        };
        debug!(
            "nie: {}x{} {} animated={animated}",
            width,
            height,
            core::str::from_utf8(&self.layout[1..4]).unwrap_or("?")
        );
        self.config = Some(config);
        self.phase = Phase::FrameHeader;
        Ok(Decoded::Ready(config))
    }

    fn frame_config(&mut self, src: &mut ByteBuffer) -> Staged<FrameConfig> {
        let config = match self.image_config(src)? {
            Decoded::Ready(config) => config,
            Decoded::Suspended(s) => return Ok(Decoded::Suspended(s)),
            Decoded::Note(n) => return Ok(Decoded::Note(n)),
        };
        if matches!(self.phase, Phase::Pixels | Phase::Padding) {
            if let Some(status) = self.skip_frame(src)? {
                return Ok(status);
            }
        }
        if self.phase == Phase::Done {
            return Ok(Decoded::Note(Note::EndOfData));
        }

        let io_position = src.reader_position();
        let duration = if self.animated {
            let Some(cdd) = peek(src, 8)? else {
                return Ok(short_read());
            };
            let cdd = u64::from_le_bytes([cdd[0], cdd[1], cdd[2], cdd[3], cdd[4], cdd[5], cdd[6], cdd[7]]);
            #[allow(clippy::cast_possible_truncation)]
            let (high, low) = ((cdd >> 32) as u32, cdd as u32);
            if high == FOOTER_TAG {
                src.consume(8)?;
                self.loops = low;
                self.phase = Phase::Done;
                trace!("nia: footer, {low} loops");
                return Ok(Decoded::Note(Note::EndOfData));
            }
            if high > FOOTER_TAG || cdd < self.prev_cdd {
                return Err(bad("bad cumulative display duration"));
            }
            let Some(frame) = peek(src, 24)? else {
                return Ok(short_read());
            };
            if frame[8..12] != NIE_MAGIC || frame[12..24] != self.layout {
                return Err(bad("bad frame header"));
            }
            src.consume(24)?;
            let duration = cdd - self.prev_cdd;
            self.prev_cdd = cdd;
            duration
        } else if self.num_frame_configs == 0 {
            0
        } else {
            self.phase = Phase::Done;
            return Ok(Decoded::Note(Note::EndOfData));
        };

        let frame = FrameConfig {
            bounds: Rect::from_size(config.width, config.height),
            duration,
            index: self.num_frame_configs,
            io_position,
            blend: Blend::Src,
            ..FrameConfig::default()
        };
        self.num_frame_configs += 1;
        self.pixels_done = 0;
        self.phase = Phase::Pixels;
        Ok(Decoded::Ready(frame))
    }

    /// Moves past the rest of a frame whose pixels were never asked for.
    fn skip_frame(&mut self, src: &mut ByteBuffer) -> Result<Option<Decoded<FrameConfig>>, DecodeError> {
        let bpp = self.bytes_per_pixel();
        while self.phase == Phase::Pixels {
            let remaining = self.total_pixels() - self.pixels_done;
            if remaining == 0 {
                self.end_pixels();
                break;
            }
            let n = usize::try_from(remaining).map_or(src.reader_len() / bpp, |r| r.min(src.reader_len() / bpp));
            if n == 0 {
                return crate::status::need_input(src).map(|_| Some(short_read()));
            }
            src.consume(n * bpp)?;
            self.pixels_done += n as u64;
        }
        if self.phase == Phase::Padding {
            if let Some(status) = self.padding(src)? {
                return Ok(Some(status));
            }
        }
        Ok(None)
    }

    fn end_pixels(&mut self) {
        self.phase = if self.padded() { Phase::Padding } else { Phase::FrameHeader };
    }

    fn padding<T>(&mut self, src: &mut ByteBuffer) -> Result<Option<Decoded<T>>, DecodeError> {
        let Some(pad) = peek(src, 4)? else {
            return Ok(Some(short_read()));
        };
        if pad != [0; 4] {
            return Err(bad("bad padding"));
        }
        src.consume(4)?;
        self.phase = Phase::FrameHeader;
        Ok(None)
    }

    fn frame(&mut self, dst: &mut PixelBuffer<'_>, src: &mut ByteBuffer, blend: Blend) -> Staged<()> {
        if !matches!(self.phase, Phase::Pixels | Phase::Padding) {
            match self.frame_config(src)? {
                Decoded::Ready(_) => {}
                Decoded::Suspended(s) => return Ok(Decoded::Suspended(s)),
                Decoded::Note(n) => return Ok(Decoded::Note(n)),
            }
        }
        let width = u64::from(u32le(&self.layout[4..8]));
        let bpp = self.bytes_per_pixel();
        let premul = self.premultiplied();
        let total = self.total_pixels();
        while self.phase == Phase::Pixels {
            if self.pixels_done == total {
                self.end_pixels();
                break;
            }
            let Some(px) = peek(src, bpp)? else {
                return Ok(short_read());
            };
            let bgra = to_bgra(px, premul);
            #[allow(clippy::cast_possible_truncation)]
            let (x, y) = ((self.pixels_done % width) as u32, (self.pixels_done / width) as u32);
            dst.put(x, y, bgra, blend);
            src.consume(bpp)?;
            self.pixels_done += 1;
        }
        if self.phase == Phase::Padding {
            if let Some(status) = self.padding(src)? {
                return Ok(status);
            }
        }
        if !self.animated {
            self.phase = Phase::Done;
        }
        self.num_frames += 1;
        Ok(Decoded::Ready(()))
    }
}

/// Converts one 4- or 8-byte pixel to 8-bit non-premultiplied BGRA.
fn to_bgra(px: &[u8], premul: bool) -> [u8; 4] {
    let mut c = [0u8; 4];
    if px.len() == 8 {
        for (i, out) in c.iter_mut().enumerate() {
            let v = u32::from(u16::from_le_bytes([px[2 * i], px[2 * i + 1]]));
            *out = u8::try_from((v * 255 + 32767) / 65535).unwrap_or(u8::MAX);
        }
    } else {
        c.copy_from_slice(&px[..4]);
    }
    if premul {
        let a = u32::from(c[3]);
        if a == 0 {
            return [0; 4];
        }
        for ch in &mut c[..3] {
            *ch = u8::try_from(((u32::from(*ch) * 255 + a / 2) / a).min(255)).unwrap_or(u8::MAX);
        }
    }
    c
}

impl ImageDecoder for NieDecoder {
    fn set_quirk(&mut self, quirk: Quirk, _enabled: bool) -> Result<(), DecodeError> {
        admit(quirk, self.calls.started(), &[])
    }

    fn workbuf_len(&self) -> WorkbufLen {
        WorkbufLen::NONE
    }

    fn decode_image_config(&mut self, src: &mut ByteBuffer) -> Staged<ImageConfig> {
        self.calls.enter(Call::ImageConfig)?;
        let result = self.image_config(src);
        self.calls.leave(Call::ImageConfig, &result);
        result
    }

    fn decode_frame_config(&mut self, src: &mut ByteBuffer) -> Staged<FrameConfig> {
        self.calls.enter(Call::FrameConfig)?;
        let result = self.frame_config(src);
        self.calls.leave(Call::FrameConfig, &result);
        result
    }

    fn decode_frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut ByteBuffer,
        blend: Blend,
        _workbuf: &mut [u8],
    ) -> Staged<()> {
        self.calls.enter(Call::Frame)?;
        let result = self.frame(dst, src, blend);
        self.calls.leave(Call::Frame, &result);
        result
    }

    fn num_animation_loops(&self) -> u32 {
        if !self.animated || (self.phase == Phase::Done && self.num_frame_configs <= 1) {
            0
        } else {
            self.loops
        }
    }

    fn num_decoded_frame_configs(&self) -> u64 {
        self.num_frame_configs
    }

    fn num_decoded_frames(&self) -> u64 {
        self.num_frames
    }
}
