#![no_main]

use std::ops::ControlFlow;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use streamdec::{
    ByteBuffer, DecodeError, DriveError, SliceSource, Sniff,
    image::{
        Animation, AnyImageDecoder, Decoded, FrameConfig, ImageDecoder, ImageFormat, ImageLimits, MIN_SRC_CAPACITY,
        decode_animation,
    },
    split_at_schedule,
};

const LIMITS: ImageLimits = ImageLimits {
    max_width: 256,
    max_height: 256,
};
const MAX_FRAMES: usize = 32;

#[derive(Debug, Arbitrary)]
struct Input {
    schedule: Vec<u8>,
    data: Vec<u8>,
}

type Outcome = (Result<Decoded<Animation>, Option<DecodeError>>, Vec<(FrameConfig, Vec<u8>)>);

fn decode(format: ImageFormat, data: &[u8], chunks: Option<Vec<usize>>) -> Outcome {
    let mut decoder = AnyImageDecoder::new(format, LIMITS);
    let mut source = match chunks {
        Some(chunks) => SliceSource::chunked(data, chunks),
        None => SliceSource::new(data),
    };
    let mut frames = Vec::new();
    let result = decode_animation(
        &mut decoder,
        &mut source,
        &mut ByteBuffer::with_capacity(MIN_SRC_CAPACITY),
        &LIMITS,
        |frame, canvas| {
            frames.push((*frame, canvas.to_vec()));
            Ok(if frames.len() < MAX_FRAMES {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            })
        },
    );
    if let Err(DriveError::Decode(e @ DecodeError::Internal(_))) = &result {
        panic!("{e} on {data:?}");
    }
    if result.is_ok() {
        assert_eq!(decoder.num_decoded_frames(), frames.len() as u64);
    }
    (result.map_err(|e| e.as_decode().cloned()), frames)
}

fn check(input: Input) {
    let Sniff::Known(format) = ImageFormat::sniff(&input.data, true) else {
        return;
    };
    let schedule: Vec<usize> = input.schedule.iter().map(|&s| usize::from(s)).collect();
    let chunks = split_at_schedule(&input.data, &schedule).iter().map(|c| c.len()).collect();

    let whole = decode(format, &input.data, None);
    let pieces = decode(format, &input.data, Some(chunks));
    assert_eq!(whole, pieces, "chunking changed the result");
}

fuzz_target!(|input: Input| check(input));
