//! Windows bitmaps: uncompressed 24- and 32-bit pixels, with or without
//! bit-field masks. Bitmaps that wrap a JPEG or PNG payload hand it off with
//! [`Note::IoRedirect`].

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
    status::{FourCc, Note, need_input, peek},
};

const FILE_HEADER_LEN: usize = 14;

const BI_RGB: u32 = 0;
const BI_BITFIELDS: u32 = 3;
const BI_JPEG: u32 = 4;
const BI_PNG: u32 = 5;

const MASK_RGB: [u32; 3] = [0x00FF_0000, 0x0000_FF00, 0x0000_00FF];
const MASK_ALPHA: u32 = 0xFF00_0000;

fn bad(reason: &'static str) -> DecodeError {
    DecodeError::malformed(Format::Bmp, reason)
}

fn u16le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn u32le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Gap,
    FrameReady,
    Pixels,
    Redirect(FourCc),
    Done,
}

/// Pixel layout details parsed from the info header.
#[derive(Debug, Clone, Copy, Default)]
struct Layout {
    width: u32,
    height: u32,
    top_down: bool,
    bytes_per_pixel: usize,
    alpha: bool,
    pixel_offset: u64,
}

impl Layout {
    fn row_padding(&self) -> usize {
        let row = self.width as usize * self.bytes_per_pixel;
        (4 - row % 4) % 4
    }
}

/// Decoder for BMP stills.
#[derive(Debug, Clone)]
pub struct BmpDecoder {
    limits: ImageLimits,
    calls: Calls,
    phase: Phase,
    layout: Layout,
    config: Option<ImageConfig>,
    gap: u64,
    row: u32,
    col: u32,
    frame_returned: bool,
    num_frame_configs: u64,
    num_frames: u64,
}

impl Default for BmpDecoder {
    fn default() -> Self {
        Self::new(ImageLimits::default())
    }
}

impl BmpDecoder {
    /// A decoder positioned at the start of a BMP file.
    #[must_use]
    pub fn new(limits: ImageLimits) -> Self {
        Self {
            limits,
            calls: Calls::default(),
            phase: Phase::Header,
            layout: Layout::default(),
            config: None,
            gap: 0,
            row: 0,
            col: 0,
            frame_returned: false,
            num_frame_configs: 0,
            num_frames: 0,
        }
    }

    /// Parses the file and info headers, which must be readable in one piece.
    fn header(&mut self, src: &mut ByteBuffer) -> Staged<ImageConfig> {
        let Some(start) = peek(src, FILE_HEADER_LEN + 4)? else {
            return Ok(short_read());
        };
        if &start[..2] != b"BM" {
            return Err(bad("bad header"));
        }
        let base = src.reader_position();
        let pixel_offset = u32le(&start[10..14]);
        let info_len = u32le(&start[14..18]) as usize;
        if !matches!(info_len, 12 | 40 | 52 | 56 | 108 | 124) {
            return Err(DecodeError::unsupported(Format::Bmp, "info header version"));
        }
        let Some(info) = peek(src, FILE_HEADER_LEN + info_len)? else {
            return Ok(short_read());
        };
        let info = &info[FILE_HEADER_LEN..];

        let (width, height, planes, bpp, compression) = if info_len == 12 {
            (
                i64::from(u16le(&info[4..6])),
                i64::from(u16le(&info[6..8])),
                u16le(&info[8..10]),
                u16le(&info[10..12]),
                BI_RGB,
            )
        } else {
            (
                i64::from(i32::from_le_bytes([info[4], info[5], info[6], info[7]])),
                i64::from(i32::from_le_bytes([info[8], info[9], info[10], info[11]])),
                u16le(&info[12..14]),
                u16le(&info[14..16]),
                u32le(&info[16..20]),
            )
        };
        if planes != 1 || width < 0 || height == i64::from(i32::MIN) {
            return Err(bad("bad header"));
        }
        let (width, top_down) = (width.unsigned_abs(), height < 0);
        let height = height.unsigned_abs();
        self.limits.check(width, height)?;

        let redirect = match compression {
            BI_JPEG => Some(FourCc::JPEG),
            BI_PNG => Some(FourCc::PNG),
            _ => None,
        };
        if let Some(fourcc) = redirect {
            let position = base + u64::from(pixel_offset);
            debug!("bmp: {fourcc} payload at {position}");
            src.consume(FILE_HEADER_LEN + info_len)?;
            self.layout.pixel_offset = position;
            self.phase = Phase::Redirect(fourcc);
            return Ok(Decoded::Note(Note::IoRedirect { fourcc, position }));
        }

        let mut header_len = FILE_HEADER_LEN + info_len;
        let alpha = match (bpp, compression) {
            (24 | 32, BI_RGB) => false,
            (32, BI_BITFIELDS) => {
                let masks = if info_len >= 52 {
                    &info[40..info_len.min(56)]
                } else {
                    let Some(all) = peek(src, header_len + 12)? else {
                        return Ok(short_read());
                    };
                    header_len += 12;
                    &all[FILE_HEADER_LEN + info_len..]
                };
                let rgb = [u32le(&masks[0..4]), u32le(&masks[4..8]), u32le(&masks[8..12])];
                let a = if masks.len() >= 16 { u32le(&masks[12..16]) } else { 0 };
                if rgb != MASK_RGB || !matches!(a, 0 | MASK_ALPHA) {
                    return Err(DecodeError::unsupported(Format::Bmp, "bit masks"));
                }
                a == MASK_ALPHA
            }
            (24 | 32, _) => return Err(DecodeError::unsupported(Format::Bmp, "compression")),
            _ => return Err(DecodeError::unsupported(Format::Bmp, "bit depth")),
        };
        if u64::from(pixel_offset) < header_len as u64 {
            return Err(bad("bad pixel offset"));
        }
        src.consume(header_len)?;

        #[allow(clippy::cast_possible_truncation)]
        let (width, height) = (width as u32, height as u32);
        self.layout = Layout {
            width,
            height,
            top_down,
            bytes_per_pixel: usize::from(bpp / 8),
            alpha,
            pixel_offset: base + u64::from(pixel_offset),
        };
        self.gap = u64::from(pixel_offset) - header_len as u64;
        self.phase = Phase::Gap;
        trace!("bmp: {:?}", self.layout);

        let config = ImageConfig {
            width,
            height,
            pixel_format: PixelFormat::Bgra8Nonpremul,
            first_frame_io_position: self.layout.pixel_offset,
            first_frame_is_opaque: !alpha,
        };
        self.config = Some(config);
        Ok(Decoded::Ready(config))
    }

    fn image_config(&mut self, src: &mut ByteBuffer) -> Staged<ImageConfig> {
        match (self.phase, self.config) {
            (Phase::Redirect(fourcc), _) => Ok(Decoded::Note(Note::IoRedirect {
                fourcc,
                position: self.layout.pixel_offset,
            })),
            (_, Some(config)) => Ok(Decoded::Ready(config)),
            _ => self.header(src),
        }
    }

    fn frame_config(&mut self, src: &mut ByteBuffer) -> Staged<FrameConfig> {
        let config = match self.image_config(src)? {
            Decoded::Ready(config) => config,
            Decoded::Suspended(s) => return Ok(Decoded::Suspended(s)),
            Decoded::Note(n) => return Ok(Decoded::Note(n)),
        };
        if self.frame_returned || self.phase == Phase::Done {
            self.phase = Phase::Done;
            return Ok(Decoded::Note(Note::EndOfData));
        }
        while self.gap > 0 {
            let n = usize::try_from(self.gap).map_or(src.reader_len(), |g| g.min(src.reader_len()));
            if n == 0 {
                need_input(src)?;
                return Ok(short_read());
            }
            src.consume(n)?;
            self.gap -= n as u64;
        }
        self.phase = Phase::FrameReady;
        self.frame_returned = true;
        self.num_frame_configs += 1;
        Ok(Decoded::Ready(FrameConfig {
            bounds: Rect::from_size(config.width, config.height),
            io_position: self.layout.pixel_offset,
            blend: Blend::Src,
            opaque_within_bounds: !self.layout.alpha,
            ..FrameConfig::default()
        }))
    }

    fn frame(&mut self, dst: &mut PixelBuffer<'_>, src: &mut ByteBuffer, blend: Blend) -> Staged<()> {
        if !matches!(self.phase, Phase::FrameReady | Phase::Pixels) {
            match self.frame_config(src)? {
                Decoded::Ready(_) => {}
                Decoded::Suspended(s) => return Ok(Decoded::Suspended(s)),
                Decoded::Note(n) => return Ok(Decoded::Note(n)),
            }
        }
        if self.phase == Phase::FrameReady {
            self.phase = Phase::Pixels;
            self.row = 0;
            self.col = 0;
        }
        let layout = self.layout;
        while self.row < layout.height {
            while self.col < layout.width {
                let Some(px) = peek(src, layout.bytes_per_pixel)? else {
                    return Ok(short_read());
                };
                let a = if layout.alpha { px[3] } else { 0xFF };
                let y = if layout.top_down {
                    self.row
                } else {
                    layout.height - 1 - self.row
                };
                dst.put(self.col, y, [px[0], px[1], px[2], a], blend);
                src.consume(layout.bytes_per_pixel)?;
                self.col += 1;
            }
            let pad = layout.row_padding();
            if peek(src, pad)?.is_none() {
                return Ok(short_read());
            }
            src.consume(pad)?;
            self.row += 1;
            self.col = 0;
        }
        self.phase = Phase::Done;
        self.num_frames += 1;
        Ok(Decoded::Ready(()))
    }
}

impl ImageDecoder for BmpDecoder {
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
        0
    }

    fn num_decoded_frame_configs(&self) -> u64 {
        self.num_frame_configs
    }

    fn num_decoded_frames(&self) -> u64 {
        self.num_frames
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloc::{vec, vec::Vec};

    use super::*;
    use crate::status::Suspension;

    /// A BMP with a 40-byte info header. `masks` follow the header when
    /// present; `pixels` must already be row-padded.
    pub(crate) fn bmp(width: i32, height: i32, bpp: u16, compression: u32, masks: &[u32], pixels: &[u8]) -> Vec<u8> {
        let offset = 14 + 40 + 4 * masks.len();
        let mut out = b"BM".to_vec();
        out.extend_from_slice(&u32::try_from(offset + pixels.len()).unwrap().to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&u32::try_from(offset).unwrap().to_le_bytes());
        out.extend_from_slice(&40u32.to_le_bytes());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&bpp.to_le_bytes());
        out.extend_from_slice(&compression.to_le_bytes());
        out.extend_from_slice(&[0; 20]);
        for m in masks {
            out.extend_from_slice(&m.to_le_bytes());
        }
        out.extend_from_slice(pixels);
        out
    }

    fn decode(data: &[u8]) -> (ImageConfig, Vec<u8>) {
        let mut src = ByteBuffer::from_slice(data, true);
        let mut dec = BmpDecoder::default();
        let config = dec.decode_image_config(&mut src).unwrap().ready().unwrap();
        let mut pixels = vec![0; config.pixbuf_len().unwrap()];
        let mut pb = PixelBuffer::new(&config, &mut pixels).unwrap();
        assert_eq!(dec.decode_frame(&mut pb, &mut src, Blend::Src, &mut []), Ok(Decoded::Ready(())));
        assert_eq!(dec.decode_frame_config(&mut src), Ok(Decoded::Note(Note::EndOfData)));
        (config, pixels)
    }

    #[test]
    fn bottom_up_24_bit_rows_are_padded() {
        // Bottom row first: blue, green; then the top row: red, white.
        let pixels = [
            255, 0, 0, 0, 255, 0, 0, 0, //
            0, 0, 255, 255, 255, 255, 0, 0,
        ];
        let (config, out) = decode(&bmp(2, 2, 24, BI_RGB, &[], &pixels));
        assert!(config.first_frame_is_opaque);
        assert_eq!(config.first_frame_io_position, 54);
        assert_eq!(
            out,
            [
                0, 0, 255, 255, 255, 255, 255, 255, //
                255, 0, 0, 255, 0, 255, 0, 255,
            ]
        );
    }

    #[test]
    fn top_down_bitfields_with_alpha() {
        let masks = [MASK_RGB[0], MASK_RGB[1], MASK_RGB[2], MASK_ALPHA];
        let data = bmp(1, -2, 32, BI_BITFIELDS, &masks[..3], &[1, 2, 3, 4, 5, 6, 7, 8]);
        let (config, out) = decode(&data);
        // A 40-byte header carries no alpha mask.
        assert!(config.first_frame_is_opaque);
        assert_eq!(out, [1, 2, 3, 255, 5, 6, 7, 255]);

        let mut v4 = bmp(1, -1, 32, BI_BITFIELDS, &[], &[]);
        v4[14] = 56;
        v4[10] = 14 + 56;
        v4.truncate(14 + 40);
        for m in masks {
            v4.extend_from_slice(&m.to_le_bytes());
        }
        v4.extend_from_slice(&[9, 8, 7, 6]);
        let (config, out) = decode(&v4);
        assert!(!config.first_frame_is_opaque);
        assert_eq!(out, [9, 8, 7, 6]);
    }

    #[test]
    fn embedded_png_is_redirected() {
        let data = bmp(1, 1, 0, BI_PNG, &[], b"\x89PNG");
        let mut dec = BmpDecoder::default();
        let mut src = ByteBuffer::from_slice(&data, true);
        let note = Note::IoRedirect {
            fourcc: FourCc::PNG,
            position: 54,
        };
        assert_eq!(dec.decode_image_config(&mut src), Ok(Decoded::Note(note)));
        assert_eq!(dec.decode_frame_config(&mut src), Ok(Decoded::Note(note)));
    }

    #[test]
    fn unsupported_depth() {
        let data = bmp(1, 1, 8, BI_RGB, &[], &[0; 4]);
        assert_eq!(
            BmpDecoder::default().decode_image_config(&mut ByteBuffer::from_slice(&data, true)),
            Err(DecodeError::unsupported(Format::Bmp, "bit depth"))
        );
    }

    #[test]
    fn suspends_mid_row() {
        let data = bmp(2, 1, 24, BI_RGB, &[], &[1, 1, 1, 2, 2, 2, 0, 0]);
        let mut src = ByteBuffer::with_capacity(data.len());
        src.append(&data[..58]).unwrap();
        let mut dec = BmpDecoder::default();
        let config = dec.decode_image_config(&mut src).unwrap().ready().unwrap();
        let mut pixels = vec![0; 8];
        let mut pb = PixelBuffer::new(&config, &mut pixels).unwrap();
        assert_eq!(
            dec.decode_frame(&mut pb, &mut src, Blend::Src, &mut []),
            Ok(Decoded::Suspended(Suspension::ShortRead))
        );
        assert_eq!(
            dec.decode_image_config(&mut src),
            Err(DecodeError::BadCallSequence)
        );
        src.compact();
        src.append(&data[58..]).unwrap();
        src.mark_closed();
        assert_eq!(dec.decode_frame(&mut pb, &mut src, Blend::Src, &mut []), Ok(Decoded::Ready(())));
        assert_eq!(pixels, [1, 1, 1, 255, 2, 2, 2, 255]);
    }
}
