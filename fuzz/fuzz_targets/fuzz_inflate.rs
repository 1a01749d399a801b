#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use streamdec::{
    BoxError, ByteBuffer, DecodeError, Decoder, DriveError, FnSink, Pump, SliceSource,
    compress::{AnyTransformer, ChecksumOptions, Compression},
    split_at_schedule,
};

/// Decoded output past this is a bomb, not a finding.
const OUTPUT_LIMIT: usize = 1 << 22;

#[derive(Debug, Arbitrary)]
enum Envelope {
    Deflate,
    Zlib,
    Gzip,
}

#[derive(Debug, Arbitrary)]
struct Input {
    envelope: Envelope,
    /// Compress `payload` first instead of decoding it as is.
    compress: Option<u8>,
    ignore_checksum: bool,
    schedule: Vec<u8>,
    dst: u8,
    payload: Vec<u8>,
}

fn inflate(
    compression: Compression,
    options: ChecksumOptions,
    data: &[u8],
    chunks: Option<Vec<usize>>,
    dst: usize,
) -> Result<Vec<u8>, DriveError> {
    let mut decoder = AnyTransformer::new(compression, options);
    let mut workbuf = vec![0; decoder.workbuf_len().max];
    let (mut source, mut src) = match chunks {
        Some(chunks) => (SliceSource::chunked(data, chunks), ByteBuffer::with_capacity(64)),
        None => (SliceSource::new(&[]), ByteBuffer::from_slice(data, true)),
    };
    let mut out = Vec::new();
    let mut sink = FnSink(|items: &[u8], _: &[u8]| {
        if out.len() + items.len() > OUTPUT_LIMIT {
            return Err::<(), BoxError>("output limit".into());
        }
        out.extend_from_slice(items);
        Ok(())
    });
    Pump::default().run(
        &mut decoder,
        &mut source,
        &mut sink,
        &mut src,
        &mut ByteBuffer::with_capacity(dst),
        &mut workbuf,
    )?;
    Ok(out)
}

fn check(input: Input) {
    let compression = match input.envelope {
        Envelope::Deflate => Compression::Deflate,
        Envelope::Zlib => Compression::Zlib,
        Envelope::Gzip => Compression::Gzip,
    };
    let data = match (input.compress, compression) {
        (Some(level), Compression::Deflate) => miniz_oxide::deflate::compress_to_vec(&input.payload, level % 11),
        (Some(level), Compression::Zlib) => miniz_oxide::deflate::compress_to_vec_zlib(&input.payload, level % 11),
        _ => input.payload.clone(),
    };
    let options = ChecksumOptions {
        ignore_checksum: input.ignore_checksum,
    };
    let dst = usize::from(input.dst.max(1));
    let schedule: Vec<usize> = input.schedule.iter().map(|&s| usize::from(s)).collect();
    let chunks = split_at_schedule(&data, &schedule).iter().map(|c| c.len()).collect();

    let whole = inflate(compression, options, &data, None, dst);
    let pieces = inflate(compression, options, &data, Some(chunks), dst);
    for result in [&whole, &pieces] {
        if let Err(DriveError::Decode(e @ DecodeError::Internal(_))) = result {
            panic!("{e} on {data:?}");
        }
    }
    match (&whole, &pieces) {
        (Ok(a), Ok(b)) => assert_eq!(a, b),
        (Err(DriveError::Decode(a)), Err(DriveError::Decode(b))) => assert_eq!(a, b),
        (Err(DriveError::Sink(_)), _) | (_, Err(DriveError::Sink(_))) => {}
        (a, b) => panic!("chunking changed the result: {a:?} vs {b:?}"),
    }

    if input.compress.is_some() && compression != Compression::Gzip {
        assert_eq!(whole.ok().as_deref(), Some(input.payload.as_slice()));
    }
}

fuzz_target!(|input: Input| check(input));
