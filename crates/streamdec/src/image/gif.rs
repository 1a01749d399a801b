use log::{debug, trace, warn};
use weezl::{BitOrder, LzwStatus, decode::Decoder as Lzw};

use super::{
    Blend, Call, Calls, Decoded, Disposal, FrameConfig, ImageConfig, ImageDecoder, ImageLimits,
    PixelBuffer, PixelFormat, Rect, Staged, short_read,
};
use crate::{
    buffer::ByteBuffer,
    decoder::WorkbufLen,
    error::{DecodeError, Format, InternalError},
    quirks::{Quirk, admit},
    status::{Note, need_input, peek},
};

/// Scratch bytes for one batch of LZW output.
pub const GIF_WORKBUF_LEN: usize = 4096;

/// Flicks per GIF delay unit (a hundredth of a second).
const FLICKS_PER_CENTISECOND: u64 = super::FLICKS_PER_SECOND / 100;

const GIF_QUIRKS: [Quirk; 3] = [
    Quirk::HonorBackgroundColor,
    Quirk::IgnoreTooMuchPixelData,
    Quirk::ImageBoundsAreStrict,
];

const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

const INTERLACE_START: [u32; 4] = [0, 4, 2, 1];
const INTERLACE_STEP: [u32; 4] = [8, 8, 4, 2];

/// Which loop-count extension wins when a stream carries several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopCountPolicy {
    /// The latest extension seen so far, even after the first frame.
    #[default]
    UpdateMidStream,
    /// Only extensions before the first frame count.
    FreezeAtFirstFrame,
}

/// Options for [`GifDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GifOptions {
    /// Use the global palette's background entry as the canvas background
    /// instead of transparent black.
    ///
    /// # Default
    ///
    /// `false`
    pub honor_background_color: bool,
    /// Drop LZW output past the end of the frame instead of failing.
    ///
    /// # Default
    ///
    /// `false`
    pub ignore_too_much_pixel_data: bool,
    /// Take the canvas size from the screen descriptor alone, rather than
    /// growing it to fit the first frame.
    ///
    /// # Default
    ///
    /// `false`
    pub image_bounds_are_strict: bool,
    /// See [`LoopCountPolicy`].
    pub loop_count: LoopCountPolicy,
}

fn bad(reason: &'static str) -> DecodeError {
    DecodeError::malformed(Format::Gif, reason)
}

fn u16le(b: &[u8]) -> u32 {
    u32::from(u16::from_le_bytes([b[0], b[1]]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    GlobalPalette,
    Blocks,
    GraphicControl,
    Application,
    AppData { looping: bool },
    SkipBlocks,
    ImageDescriptor,
    LocalPalette,
    FrameReady,
    LzwMinCode,
    PixelData,
    SkipPixelData,
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
struct Control {
    disposal: Disposal,
    delay: u16,
    transparent: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    rect: Rect,
    interlaced: bool,
    control: Control,
    io_position: u64,
}

/// Where the next decoded pixel lands, relative to the frame origin.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    x: u32,
    row: u32,
    pass: usize,
    rows_left: u32,
}

impl Cursor {
    fn new(rect: &Rect) -> Self {
        Cursor {
            rows_left: if rect.width() == 0 { 0 } else { rect.height() },
            ..Cursor::default()
        }
    }

    fn advance(&mut self, width: u32, height: u32, interlaced: bool) {
        self.x += 1;
        if self.x < width {
            return;
        }
        self.x = 0;
        self.rows_left -= 1;
        if !interlaced {
            self.row += 1;
            return;
        }
        self.row += INTERLACE_STEP[self.pass];
        while self.row >= height && self.pass < 3 {
            self.pass += 1;
            self.row = INTERLACE_START[self.pass];
        }
    }
}

/// Reads palette entries one at a time; `Ok(true)` once all `len` are in.
fn read_palette(
    src: &mut ByteBuffer,
    table: &mut [[u8; 4]; 256],
    len: usize,
    read: &mut usize,
) -> Result<bool, DecodeError> {
    while *read < len {
        let Some(&[r, g, b]) = peek(src, 3)? else {
            return Ok(false);
        };
        table[*read] = [b, g, r, 255];
        src.consume(3)?;
        *read += 1;
    }
    Ok(true)
}

/// Decoder for GIF 87a and 89a, still or animated.
pub struct GifDecoder {
    options: GifOptions,
    limits: ImageLimits,
    calls: Calls,
    phase: Phase,
    screen: (u32, u32),
    bg_index: u8,
    gct: [[u8; 4]; 256],
    gct_len: usize,
    palette: [[u8; 4]; 256],
    palette_len: usize,
    palette_read: usize,
    control: Control,
    frame: Frame,
    frame_returned: bool,
    frame_start: u64,
    config: Option<ImageConfig>,
    background: [u8; 4],
    loops: Option<u16>,
    descriptors: u64,
    num_frame_configs: u64,
    num_frames: u64,
    skip_remaining: usize,
    lzw: Option<Lzw>,
    block_remaining: usize,
    cursor: Cursor,
    excess_warned: bool,
}

impl core::fmt::Debug for GifDecoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GifDecoder")
            .field("options", &self.options)
            .field("phase", &self.phase)
            .field("screen", &self.screen)
            .field("num_frame_configs", &self.num_frame_configs)
            .field("num_frames", &self.num_frames)
            .finish_non_exhaustive()
    }
}

impl Default for GifDecoder {
    fn default() -> Self {
        Self::new(GifOptions::default(), ImageLimits::default())
    }
}

impl GifDecoder {
    /// A decoder positioned at the start of a GIF stream.
    #[must_use]
    pub fn new(options: GifOptions, limits: ImageLimits) -> Self {
        Self {
            options,
            limits,
            calls: Calls::default(),
            phase: Phase::Header,
            screen: (0, 0),
            bg_index: 0,
            gct: [OPAQUE_BLACK; 256],
            gct_len: 0,
            palette: [OPAQUE_BLACK; 256],
            palette_len: 0,
            palette_read: 0,
            control: Control::default(),
            frame: Frame::default(),
            frame_returned: false,
            frame_start: 0,
            config: None,
            background: [0; 4],
            loops: None,
            descriptors: 0,
            num_frame_configs: 0,
            num_frames: 0,
            skip_remaining: 0,
            lzw: None,
            block_remaining: 0,
            cursor: Cursor::default(),
            excess_warned: false,
        }
    }

    fn enter_blocks(&mut self, src: &ByteBuffer) {
        self.phase = Phase::Blocks;
        self.frame_start = src.reader_position();
    }

    /// Skips data sub-blocks up to and including the empty terminator.
    /// `Ok(false)` means more input is needed.
    fn skip_sub_blocks(&mut self, src: &mut ByteBuffer) -> Result<bool, DecodeError> {
        loop {
            if self.skip_remaining > 0 {
                let n = self.skip_remaining.min(src.reader_len());
                if n == 0 {
                    need_input(src)?;
                    return Ok(false);
                }
                src.consume(n)?;
                self.skip_remaining -= n;
                continue;
            }
            let Some(&[len]) = peek(src, 1)? else {
                return Ok(false);
            };
            src.consume(1)?;
            if len == 0 {
                return Ok(true);
            }
            self.skip_remaining = usize::from(len);
        }
    }

    /// Reads blocks until a frame header is complete or the trailer is seen.
    /// `Ok(false)` means more input is needed.
    fn scan(&mut self, src: &mut ByteBuffer) -> Result<bool, DecodeError> {
        loop {
            match self.phase {
                Phase::Header => {
                    let Some(header) = peek(src, 13)? else {
                        return Ok(false);
                    };
                    if &header[..6] != b"GIF87a" && &header[..6] != b"GIF89a" {
                        return Err(bad("bad header"));
                    }
                    self.screen = (u16le(&header[6..8]), u16le(&header[8..10]));
                    let flags = header[10];
                    self.bg_index = header[11];
                    self.limits
                        .check(u64::from(self.screen.0), u64::from(self.screen.1))?;
                    src.consume(13)?;
                    trace!("gif: screen {}x{}", self.screen.0, self.screen.1);
                    if flags & 0x80 != 0 {
                        self.gct_len = 1 << ((flags & 7) + 1);
                        self.palette_read = 0;
                        self.phase = Phase::GlobalPalette;
                    } else {
                        self.enter_blocks(src);
                    }
                }
                Phase::GlobalPalette => {
                    if !read_palette(src, &mut self.gct, self.gct_len, &mut self.palette_read)? {
                        return Ok(false);
                    }
                    self.enter_blocks(src);
                }
                Phase::Blocks => {
                    let Some(&[introducer]) = peek(src, 1)? else {
                        return Ok(false);
                    };
                    match introducer {
                        0x21 => {
                            let Some(&[_, label]) = peek(src, 2)? else {
                                return Ok(false);
                            };
                            src.consume(2)?;
                            self.phase = match label {
                                0xF9 => Phase::GraphicControl,
                                0xFF => Phase::Application,
                                _ => {
                                    self.skip_remaining = 0;
                                    Phase::SkipBlocks
                                }
                            };
                        }
                        0x2C => {
                            src.consume(1)?;
                            self.phase = Phase::ImageDescriptor;
                        }
                        0x3B => {
                            src.consume(1)?;
                            trace!("gif: trailer after {} frames", self.descriptors);
                            self.phase = Phase::Done;
                            return Ok(true);
                        }
                        _ => return Err(bad("bad block")),
                    }
                }
                Phase::GraphicControl => {
                    let Some(gce) = peek(src, 6)? else {
                        return Ok(false);
                    };
                    if gce[0] != 4 || gce[5] != 0 {
                        return Err(bad("bad graphic control"));
                    }
                    let flags = gce[1];
                    self.control = Control {
                        disposal: match (flags >> 2) & 7 {
                            2 => Disposal::RestoreBackground,
                            3 => Disposal::RestorePrevious,
                            _ => Disposal::None,
                        },
                        delay: u16::from_le_bytes([gce[2], gce[3]]),
                        transparent: (flags & 1 != 0).then_some(gce[4]),
                    };
                    src.consume(6)?;
                    self.phase = Phase::Blocks;
                }
                Phase::Application => {
                    let Some(&[size]) = peek(src, 1)? else {
                        return Ok(false);
                    };
                    if size != 11 {
                        self.skip_remaining = 0;
                        self.phase = Phase::SkipBlocks;
                        continue;
                    }
                    let Some(app) = peek(src, 12)? else {
                        return Ok(false);
                    };
                    let looping = &app[1..] == b"NETSCAPE2.0" || &app[1..] == b"ANIMEXTS1.0";
                    src.consume(12)?;
                    self.phase = Phase::AppData { looping };
                }
                Phase::AppData { looping } => {
                    let Some(&[len]) = peek(src, 1)? else {
                        return Ok(false);
                    };
                    let Some(block) = peek(src, 1 + usize::from(len))? else {
                        return Ok(false);
                    };
                    if looping && len == 3 && block[1] == 1 {
                        let count = u16::from_le_bytes([block[2], block[3]]);
                        let frozen = self.options.loop_count == LoopCountPolicy::FreezeAtFirstFrame
                            && self.descriptors > 0;
                        if frozen {
                            trace!("gif: ignoring loop count {count} after the first frame");
                        } else {
                            self.loops = Some(count);
                        }
                    }
                    src.consume(1 + usize::from(len))?;
                    if len == 0 {
                        self.phase = Phase::Blocks;
                    }
                }
                Phase::SkipBlocks => {
                    if !self.skip_sub_blocks(src)? {
                        return Ok(false);
                    }
                    self.phase = Phase::Blocks;
                }
                Phase::ImageDescriptor => {
                    let Some(desc) = peek(src, 9)? else {
                        return Ok(false);
                    };
                    let (x, y) = (u16le(&desc[0..2]), u16le(&desc[2..4]));
                    let (w, h) = (u16le(&desc[4..6]), u16le(&desc[6..8]));
                    let flags = desc[8];
                    src.consume(9)?;
                    self.frame = Frame {
                        rect: Rect {
                            x0: x,
                            y0: y,
                            x1: x + w,
                            y1: y + h,
                        },
                        interlaced: flags & 0x40 != 0,
                        control: core::mem::take(&mut self.control),
                        io_position: self.frame_start,
                    };
                    self.descriptors += 1;
                    if flags & 0x80 != 0 {
                        self.palette = [OPAQUE_BLACK; 256];
                        self.palette_len = 1 << ((flags & 7) + 1);
                        self.palette_read = 0;
                        self.phase = Phase::LocalPalette;
                    } else {
                        self.palette = self.gct;
                        self.palette_len = self.gct_len;
                        self.phase = Phase::FrameReady;
                    }
                }
                Phase::LocalPalette => {
                    if !read_palette(src, &mut self.palette, self.palette_len, &mut self.palette_read)? {
                        return Ok(false);
                    }
                    self.phase = Phase::FrameReady;
                }
                Phase::FrameReady | Phase::Done => return Ok(true),
                Phase::LzwMinCode | Phase::PixelData | Phase::SkipPixelData => {
                    return Err(InternalError::InconsistentState.into());
                }
            }
        }
    }

    fn image_config(&mut self, src: &mut ByteBuffer) -> Staged<ImageConfig> {
        if let Some(config) = self.config {
            return Ok(Decoded::Ready(config));
        }
        if !self.scan(src)? {
            return Ok(short_read());
        }
        let first = (self.phase == Phase::FrameReady).then_some(self.frame);
        let (mut width, mut height) = self.screen;
        if let Some(f) = first.filter(|_| !self.options.image_bounds_are_strict) {
            width = width.max(f.rect.x1);
            height = height.max(f.rect.y1);
        }
        self.limits.check(u64::from(width), u64::from(height))?;

        let bg = usize::from(self.bg_index);
        let first_transparent = first.and_then(|f| f.control.transparent);
        self.background = if self.options.honor_background_color
            && bg < self.gct_len
            && first_transparent != Some(self.bg_index)
        {
            self.gct[bg]
        } else {
            [0; 4]
        };

        let config = ImageConfig {
            width,
            height,
            pixel_format: PixelFormat::Bgra8Nonpremul,
            first_frame_io_position: self.frame_start,
            first_frame_is_opaque: first.is_some_and(|f| {
                f.control.transparent.is_none()
                    && f.rect.x0 == 0
                    && f.rect.y0 == 0
                    && f.rect.x1 >= width
                    && f.rect.y1 >= height
            }),
        };
        debug!("gif: image config {config:?}");
        self.config = Some(config);
        Ok(Decoded::Ready(config))
    }

    fn current_frame_config(&self, canvas: Rect) -> FrameConfig {
        let transparent = self.frame.control.transparent.is_some();
        FrameConfig {
            bounds: self.frame.rect.intersect(&canvas),
            duration: u64::from(self.frame.control.delay) * FLICKS_PER_CENTISECOND,
            index: self.num_frame_configs,
            io_position: self.frame.io_position,
            disposal: self.frame.control.disposal,
            blend: if transparent { Blend::SrcOver } else { Blend::Src },
            opaque_within_bounds: !transparent,
            background_color: self.background,
        }
    }

    fn frame_config(&mut self, src: &mut ByteBuffer) -> Staged<FrameConfig> {
        let config = match self.image_config(src)? {
            Decoded::Ready(config) => config,
            Decoded::Suspended(s) => return Ok(Decoded::Suspended(s)),
            Decoded::Note(n) => return Ok(Decoded::Note(n)),
        };
        loop {
            match self.phase {
                Phase::FrameReady if !self.frame_returned => {
                    let frame = self.current_frame_config(config.bounds());
                    self.frame_returned = true;
                    self.num_frame_configs += 1;
                    debug!("gif: {frame}");
                    return Ok(Decoded::Ready(frame));
                }
                Phase::FrameReady | Phase::LzwMinCode | Phase::PixelData | Phase::SkipPixelData => {
                    if !self.skip_pixels(src)? {
                        return Ok(short_read());
                    }
                }
                Phase::Done => return Ok(Decoded::Note(Note::EndOfData)),
                _ => {
                    if !self.scan(src)? {
                        return Ok(short_read());
                    }
                }
            }
        }
    }

    /// Moves past the rest of a frame's pixel data without painting it.
    fn skip_pixels(&mut self, src: &mut ByteBuffer) -> Result<bool, DecodeError> {
        match self.phase {
            Phase::FrameReady | Phase::LzwMinCode => {
                if peek(src, 1)?.is_none() {
                    return Ok(false);
                }
                src.consume(1)?;
                self.skip_remaining = 0;
                self.phase = Phase::SkipPixelData;
            }
            Phase::PixelData => {
                self.skip_remaining = self.block_remaining;
                self.phase = Phase::SkipPixelData;
            }
            _ => {}
        }
        if !self.skip_sub_blocks(src)? {
            return Ok(false);
        }
        self.finish_frame(src, false);
        Ok(true)
    }

    fn finish_frame(&mut self, src: &ByteBuffer, painted: bool) {
        if painted {
            self.num_frames += 1;
        }
        self.lzw = None;
        self.block_remaining = 0;
        self.frame_returned = false;
        self.enter_blocks(src);
    }

    fn paint(&mut self, indices: &[u8], dst: &mut PixelBuffer<'_>, blend: Blend) -> Result<(), DecodeError> {
        let rect = self.frame.rect;
        let transparent = self.frame.control.transparent;
        for &idx in indices {
            if self.cursor.rows_left == 0 {
                if !self.options.ignore_too_much_pixel_data {
                    return Err(bad("too much pixel data"));
                }
                if !self.excess_warned {
                    warn!("gif: dropping pixel data past the end of frame {}", self.num_frame_configs - 1);
                    self.excess_warned = true;
                }
                return Ok(());
            }
            let (x, y) = (rect.x0 + self.cursor.x, rect.y0 + self.cursor.row);
            if Some(idx) == transparent {
                if blend == Blend::Src {
                    dst.put(x, y, [0; 4], Blend::Src);
                }
            } else {
                dst.put(x, y, self.palette[usize::from(idx)], Blend::Src);
            }
            self.cursor.advance(rect.width(), rect.height(), self.frame.interlaced);
        }
        Ok(())
    }

    fn frame(
        &mut self,
        dst: &mut PixelBuffer<'_>,
        src: &mut ByteBuffer,
        blend: Blend,
        workbuf: &mut [u8],
    ) -> Staged<()> {
        let in_frame = match self.phase {
            Phase::FrameReady => self.frame_returned,
            Phase::LzwMinCode | Phase::PixelData | Phase::SkipPixelData => true,
            _ => false,
        };
        if !in_frame {
            match self.frame_config(src)? {
                Decoded::Ready(_) => {}
                Decoded::Suspended(s) => return Ok(Decoded::Suspended(s)),
                Decoded::Note(n) => return Ok(Decoded::Note(n)),
            }
        }
        let scratch = workbuf
            .get_mut(..GIF_WORKBUF_LEN)
            .ok_or(DecodeError::BadArgument("work buffer is too small"))?;
        loop {
            match self.phase {
                Phase::FrameReady => self.phase = Phase::LzwMinCode,
                Phase::LzwMinCode => {
                    let Some(&[width]) = peek(src, 1)? else {
                        return Ok(short_read());
                    };
                    if !(2..=8).contains(&width) {
                        return Err(bad("bad literal width"));
                    }
                    src.consume(1)?;
                    self.lzw = Some(Lzw::new(BitOrder::Lsb, width));
                    self.block_remaining = 0;
                    self.cursor = Cursor::new(&self.frame.rect);
                    self.phase = Phase::PixelData;
                }
                Phase::PixelData => {
                    if self.block_remaining == 0 {
                        let Some(&[len]) = peek(src, 1)? else {
                            return Ok(short_read());
                        };
                        src.consume(1)?;
                        if len == 0 {
                            self.finish_frame(src, true);
                            return Ok(Decoded::Ready(()));
                        }
                        self.block_remaining = usize::from(len);
                        continue;
                    }
                    let avail = self.block_remaining.min(src.reader_len());
                    if avail == 0 {
                        need_input(src)?;
                        return Ok(short_read());
                    }
                    let lzw = self.lzw.as_mut().ok_or(InternalError::InconsistentState)?;
                    let res = lzw.decode_bytes(&src.readable()[..avail], scratch);
                    src.consume(res.consumed_in)?;
                    self.block_remaining -= res.consumed_in;
                    self.paint(&scratch[..res.consumed_out], dst, blend)?;
                    match res.status {
                        Ok(LzwStatus::Done) => {
                            self.skip_remaining = self.block_remaining;
                            self.block_remaining = 0;
                            self.phase = Phase::SkipPixelData;
                        }
                        Ok(_) if res.consumed_in == 0 && res.consumed_out == 0 => {
                            return Err(bad("bad LZW code"));
                        }
                        Ok(_) => {}
                        Err(_) => return Err(bad("bad LZW code")),
                    }
                }
                Phase::SkipPixelData => {
                    if !self.skip_sub_blocks(src)? {
                        return Ok(short_read());
                    }
                    self.finish_frame(src, true);
                    return Ok(Decoded::Ready(()));
                }
                _ => return Err(InternalError::InconsistentState.into()),
            }
        }
    }
}

impl ImageDecoder for GifDecoder {
    fn set_quirk(&mut self, quirk: Quirk, enabled: bool) -> Result<(), DecodeError> {
        admit(quirk, self.calls.started(), &GIF_QUIRKS)?;
        match quirk {
            Quirk::HonorBackgroundColor => self.options.honor_background_color = enabled,
            Quirk::IgnoreTooMuchPixelData => self.options.ignore_too_much_pixel_data = enabled,
            Quirk::ImageBoundsAreStrict => self.options.image_bounds_are_strict = enabled,
            _ => {}
        }
        Ok(())
    }

    fn workbuf_len(&self) -> WorkbufLen {
        WorkbufLen::exactly(GIF_WORKBUF_LEN)
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
        workbuf: &mut [u8],
    ) -> Staged<()> {
        self.calls.enter(Call::Frame)?;
        let result = self.frame(dst, src, blend, workbuf);
        self.calls.leave(Call::Frame, &result);
        result
    }

    /// A wire count of N means N + 1 plays and 0 means forever. Without the
    /// extension an animation plays once. A stream that turned out to hold a
    /// single frame reports 0.
    fn num_animation_loops(&self) -> u32 {
        if self.phase == Phase::Done && self.descriptors <= 1 {
            return 0;
        }
        match self.loops {
            Some(0) => 0,
            Some(n) => u32::from(n) + 1,
            None => u32::from(self.descriptors > 1),
        }
    }

    fn num_decoded_frame_configs(&self) -> u64 {
        self.num_frame_configs
    }

    fn num_decoded_frames(&self) -> u64 {
        self.num_frames
    }
}
