#![allow(missing_docs, dead_code)]

use std::ops::ControlFlow;

use streamdec::{
    ByteBuffer, DriveError, SliceSource, Sniff,
    image::{AnyImageDecoder, Decoded, FrameConfig, ImageDecoder, ImageFormat, ImageLimits, MIN_SRC_CAPACITY, decode_animation},
};

pub const RED: [u8; 4] = [0, 0, 255, 255];
pub const GREEN: [u8; 4] = [0, 255, 0, 255];
pub const BLUE: [u8; 4] = [255, 0, 0, 255];
pub const WHITE: [u8; 4] = [255; 4];

const NIE: [u8; 4] = [0x6E, 0xC3, 0xAF, 0x45];
const NIA: [u8; 4] = [0x6E, 0xC3, 0xAF, 0x41];

fn nie_header(magic: [u8; 4], width: u32, height: u32) -> Vec<u8> {
    let mut out = magic.to_vec();
    out.extend_from_slice(b"\xFFbn4");
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out
}

/// A `bn4` still image.
pub fn nie(width: u32, height: u32, pixels: &[[u8; 4]]) -> Vec<u8> {
    let mut out = nie_header(NIE, width, height);
    out.extend(pixels.iter().flatten());
    out
}

/// A `bn4` animation; each frame is a cumulative display duration and its
/// pixels.
pub fn nia(width: u32, height: u32, frames: &[(u64, Vec<[u8; 4]>)], loops: u32) -> Vec<u8> {
    let mut out = nie_header(NIA, width, height);
    for (cdd, pixels) in frames {
        out.extend_from_slice(&cdd.to_le_bytes());
        out.extend(nie(width, height, pixels));
        if width & height & 1 == 1 {
            out.extend_from_slice(&[0; 4]);
        }
    }
    out.extend_from_slice(&loops.to_le_bytes());
    out.extend_from_slice(&0x8000_0000u32.to_le_bytes());
    out
}

/// One GIF frame drawn from the red, green, blue, white palette.
pub struct GifFrame {
    pub rect: (u16, u16, u16, u16),
    pub indices: Vec<u8>,
    pub transparent: Option<u8>,
    pub delay: u16,
    pub disposal: u8,
}

impl GifFrame {
    pub fn solid(rect: (u16, u16, u16, u16), index: u8) -> Self {
        GifFrame {
            rect,
            indices: vec![index; usize::from(rect.2) * usize::from(rect.3)],
            transparent: None,
            delay: 10,
            disposal: 0,
        }
    }
}

pub fn gif(width: u16, height: u16, loops: Option<u16>, frames: &[GifFrame]) -> Vec<u8> {
    let mut out = b"GIF89a".to_vec();
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&[0x81, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255]);
    if let Some(n) = loops {
        out.extend_from_slice(b"\x21\xFF\x0BNETSCAPE2.0\x03\x01");
        out.extend_from_slice(&n.to_le_bytes());
        out.push(0);
    }
    for f in frames {
        let flags = (f.disposal << 2) | u8::from(f.transparent.is_some());
        out.extend_from_slice(&[0x21, 0xF9, 4, flags]);
        out.extend_from_slice(&f.delay.to_le_bytes());
        out.extend_from_slice(&[f.transparent.unwrap_or(0), 0, 0x2C]);
        for v in [f.rect.0, f.rect.1, f.rect.2, f.rect.3] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&[0, 2]);
        let lzw = weezl::encode::Encoder::new(weezl::BitOrder::Lsb, 2)
            .encode(&f.indices)
            .unwrap();
        for chunk in lzw.chunks(255) {
            out.push(u8::try_from(chunk.len()).unwrap());
            out.extend_from_slice(chunk);
        }
        out.push(0);
    }
    out.push(0x3B);
    out
}

/// A BMP with a 40-byte info header and already row-padded pixels.
pub fn bmp(width: i32, height: i32, bpp: u16, compression: u32, pixels: &[u8]) -> Vec<u8> {
    let offset = 54u32;
    let mut out = b"BM".to_vec();
    out.extend_from_slice(&(offset + u32::try_from(pixels.len()).unwrap()).to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&bpp.to_le_bytes());
    out.extend_from_slice(&compression.to_le_bytes());
    out.extend_from_slice(&[0; 20]);
    out.extend_from_slice(pixels);
    out
}

/// Every frame config and composited canvas, or whatever note stopped
/// decoding.
pub struct Decoding {
    pub result: Decoded<streamdec::image::Animation>,
    pub frames: Vec<(FrameConfig, Vec<u8>)>,
}

pub fn decode_image(data: &[u8], chunks: Vec<usize>, limits: ImageLimits) -> Result<Decoding, DriveError> {
    let Sniff::Known(format) = ImageFormat::sniff(data, true) else {
        panic!("unrecognized test image");
    };
    let mut decoder = AnyImageDecoder::new(format, limits);
    let mut frames = Vec::new();
    let result = decode_animation(
        &mut decoder,
        &mut SliceSource::chunked(data, chunks),
        &mut ByteBuffer::with_capacity(MIN_SRC_CAPACITY),
        &limits,
        |frame, canvas| {
            frames.push((*frame, canvas.to_vec()));
            Ok(ControlFlow::Continue(()))
        },
    )?;
    assert_eq!(decoder.num_decoded_frames(), frames.len() as u64);
    Ok(Decoding { result, frames })
}
