#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use streamdec::{
    ByteBuffer, DecodeError, Decoder, Pump, Quirk, SliceSource,
    cbor::{CborDecoder, MIN_SRC_CAPACITY},
    json::{DuplicateKeyPolicy, TokenBuffer, Value, ValueBuilder, ValueError},
    split_at_schedule,
};

#[derive(Debug, Arbitrary)]
struct Input {
    sequence: bool,
    schedule: Vec<u8>,
    tokens: u8,
    data: Vec<u8>,
}

fn parse(data: &[u8], sequence: bool, chunks: Option<Vec<usize>>, tokens: usize) -> Result<Vec<Value>, ValueError> {
    let mut decoder = CborDecoder::default();
    decoder.set_quirk(Quirk::AllowMultipleValues, sequence)?;
    let mut builder = ValueBuilder::new(DuplicateKeyPolicy::KeepLast);
    let (mut source, mut src) = match chunks {
        Some(chunks) => (
            SliceSource::chunked(data, chunks),
            ByteBuffer::with_capacity(MIN_SRC_CAPACITY),
        ),
        None => (SliceSource::new(&[]), ByteBuffer::from_slice(data, true)),
    };
    Pump::default().run(
        &mut decoder,
        &mut source,
        &mut builder,
        &mut src,
        &mut TokenBuffer::with_capacity(tokens),
        &mut [],
    )?;
    builder.finish()
}

/// Values compare by their debug form so that NaN equals itself.
fn summary(result: &Result<Vec<Value>, ValueError>) -> String {
    match result {
        Ok(values) => format!("{values:?}"),
        Err(e) => format!("error: {e}"),
    }
}

fuzz_target!(|input: Input| {
    let tokens = usize::from(input.tokens.max(1));
    let schedule: Vec<usize> = input.schedule.iter().map(|&s| usize::from(s)).collect();
    let chunks = split_at_schedule(&input.data, &schedule).iter().map(|c| c.len()).collect();

    let whole = parse(&input.data, input.sequence, None, tokens);
    let pieces = parse(&input.data, input.sequence, Some(chunks), tokens);
    for result in [&whole, &pieces] {
        if let Err(ValueError::Decode(e @ DecodeError::Internal(_))) = result {
            panic!("{e} on {:?}", input.data);
        }
    }
    assert_eq!(summary(&whole), summary(&pieces), "chunking changed the result");
});
