//! `streamdec image-info` and `streamdec convert-to-nia`.

use std::{
    io::{self, BufWriter, Write},
    ops::ControlFlow,
};

use anyhow::{Result, anyhow, bail};
use log::debug;
use streamdec::{
    ByteBuffer, Note, ProgressGuard, Quirk, Sniff, Source,
    image::{
        AnyImageDecoder, Decoded, ImageConfig, ImageDecoder, ImageFormat, ImageLimits, MIN_SRC_CAPACITY,
        decode_animation, run_stage,
    },
    refill,
};

use crate::Common;

const SRC_LEN: usize = 64 * 1024;

const _: () = assert!(SRC_LEN >= MIN_SRC_CAPACITY);

/// "nïE" in UTF-8.
const NIE_MAGIC: [u8; 4] = [0x6E, 0xC3, 0xAF, 0x45];
/// "nïA" in UTF-8.
const NIA_MAGIC: [u8; 4] = [0x6E, 0xC3, 0xAF, 0x41];

/// Arguments for `streamdec image-info`.
#[derive(clap::Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub common: Common,

    /// Stop after the first frame.
    #[arg(long)]
    pub first_frame_only: bool,
}

/// Arguments for `streamdec convert-to-nia`.
#[derive(clap::Args)]
pub struct NiaArgs {
    #[command(flatten)]
    pub common: Common,

    /// Write the first frame as a still NIE instead of a NIA.
    #[arg(long)]
    pub first_frame_only: bool,
}

/// A decoder for whatever image `source` starts with, with the header
/// decoded.
struct Opened {
    format: ImageFormat,
    decoder: AnyImageDecoder,
    config: ImageConfig,
}

fn open<S: Source + ?Sized>(source: &mut S, src: &mut ByteBuffer, quirks: &[Quirk]) -> Result<Opened> {
    let format = loop {
        match ImageFormat::sniff(src.readable(), src.is_closed()) {
            Sniff::Known(format) => break format,
            Sniff::Unknown => bail!("unrecognized image format"),
            Sniff::NeedMoreData => {
                refill(source, src)?;
            }
        }
    };
    let mut decoder = AnyImageDecoder::new(format, ImageLimits::default());
    for &quirk in quirks {
        decoder.set_quirk(quirk, true)?;
    }
    let config = match run_stage(&mut ProgressGuard::default(), source, src, |src| {
        decoder.decode_image_config(src)
    })? {
        Decoded::Ready(config) => config,
        other => return Err(stopped(&other)),
    };
    debug!("image: {format:?} {}x{}", config.width, config.height);
    Ok(Opened { format, decoder, config })
}

fn stopped<T>(outcome: &Decoded<T>) -> anyhow::Error {
    match outcome {
        Decoded::Note(Note::IoRedirect { fourcc, position }) => {
            anyhow!("embedded {fourcc} payload at offset {position} is not supported")
        }
        Decoded::Note(Note::EndOfData) => anyhow!("image ended early"),
        Decoded::Ready(_) | Decoded::Suspended(_) => anyhow!("image decoding stopped unexpectedly"),
    }
}

fn info<S: Source + ?Sized, W: Write>(source: &mut S, out: &mut W, quirks: &[Quirk], first_only: bool) -> Result<()> {
    let mut src = ByteBuffer::with_capacity(SRC_LEN);
    let Opened {
        format,
        mut decoder,
        config,
    } = open(source, &mut src, quirks)?;
    writeln!(
        out,
        "{format:?} {}x{}, first frame at {}{}",
        config.width,
        config.height,
        config.first_frame_io_position,
        if config.first_frame_is_opaque { ", opaque" } else { "" }
    )?;
    let outcome = decode_animation(&mut decoder, source, &mut src, &ImageLimits::default(), |frame, _| {
        writeln!(out, "{frame}")?;
        Ok(if first_only { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
    })?;
    let Decoded::Ready(anim) = outcome else {
        return Err(stopped(&outcome));
    };
    writeln!(out, "{} frames, {} loops", anim.frames, anim.loops)?;
    Ok(())
}

pub fn run_info(args: &InfoArgs) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    info(&mut args.common.open()?, &mut out, &args.common.quirks, args.first_frame_only)?;
    out.flush()?;
    Ok(())
}

fn nix_header<W: Write>(out: &mut W, magic: [u8; 4], config: &ImageConfig) -> io::Result<()> {
    out.write_all(&magic)?;
    out.write_all(b"\xFFbn4")?;
    out.write_all(&config.width.to_le_bytes())?;
    out.write_all(&config.height.to_le_bytes())
}

/// Decodes the image in `source` and writes every composited frame to `out`
/// as a naive animation, or only the first as a naive image.
fn convert<S: Source + ?Sized, W: Write>(
    source: &mut S,
    out: &mut W,
    quirks: &[Quirk],
    first_only: bool,
) -> Result<()> {
    let mut src = ByteBuffer::with_capacity(SRC_LEN);
    let Opened { mut decoder, config, .. } = open(source, &mut src, quirks)?;
    if !first_only {
        nix_header(out, NIA_MAGIC, &config)?;
    }
    let padded = config.width & config.height & 1 == 1;
    let mut total = 0u64;
    let outcome = decode_animation(&mut decoder, source, &mut src, &ImageLimits::default(), |frame, canvas| {
        total = total
            .checked_add(frame.duration)
            .ok_or("animation frame duration overflow")?;
        if !first_only {
            out.write_all(&total.to_le_bytes())?;
        }
        nix_header(out, NIE_MAGIC, &config)?;
        out.write_all(canvas)?;
        if first_only {
            return Ok(ControlFlow::Break(()));
        }
        if padded {
            out.write_all(&[0; 4])?;
        }
        Ok(ControlFlow::Continue(()))
    })?;
    let Decoded::Ready(anim) = outcome else {
        return Err(stopped(&outcome));
    };
    if !first_only {
        out.write_all(&anim.loops.to_le_bytes())?;
        out.write_all(&0x8000_0000u32.to_le_bytes())?;
    }
    Ok(())
}

pub fn run_nia(args: &NiaArgs) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    convert(&mut args.common.open()?, &mut out, &args.common.quirks, args.first_frame_only)?;
    out.flush()?;
    Ok(())
}
