#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value as JsonValue};
use streamdec::{
    ALL_QUIRKS, ByteBuffer, DecodeError, Decoder, Pump, SliceSource,
    json::{DuplicateKeyPolicy, JsonDecoder, MIN_SRC_CAPACITY, TokenBuffer, Value, ValueBuilder, ValueError},
    split_at_schedule,
};

/// Structured JSON, so the fuzzer spends time past the first byte.
#[derive(Debug)]
struct ArbitraryValue(JsonValue);

impl<'a> Arbitrary<'a> for ArbitraryValue {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let value = match u.choose_index(21)? {
            0 => JsonValue::Null,
            1 => JsonValue::Bool(u.arbitrary()?),
            2 => {
                let n: f64 = u.arbitrary()?;
                JsonValue::Number(serde_json::Number::from_f64(n).ok_or(arbitrary::Error::IncorrectFormat)?)
            }
            3..=10 => JsonValue::String(u.arbitrary()?),
            11..=15 => {
                let elems: Vec<ArbitraryValue> = u.arbitrary()?;
                JsonValue::Array(elems.into_iter().map(|v| v.0).collect())
            }
            _ => {
                let m: Vec<(String, ArbitraryValue)> = u.arbitrary()?;
                JsonValue::Object(Map::from_iter(m.into_iter().map(|(k, v)| (k, v.0))))
            }
        };
        Ok(ArbitraryValue(value))
    }
}

#[derive(Debug, Arbitrary)]
enum Document {
    Raw(Vec<u8>),
    Generated(ArbitraryValue),
}

#[derive(Debug, Arbitrary)]
struct Input {
    /// One bit per entry of `ALL_QUIRKS`.
    quirks: u16,
    schedule: Vec<u8>,
    tokens: u8,
    document: Document,
}

fn decoder(quirks: u16) -> Result<JsonDecoder, DecodeError> {
    let mut decoder = JsonDecoder::default();
    for (i, &quirk) in ALL_QUIRKS.iter().enumerate() {
        if quirks >> i & 1 == 0 {
            continue;
        }
        match decoder.set_quirk(quirk, true) {
            Ok(()) | Err(DecodeError::UnsupportedOption(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(decoder)
}

fn parse(data: &[u8], quirks: u16, chunks: Option<Vec<usize>>, tokens: usize) -> Result<Vec<Value>, ValueError> {
    let mut builder = ValueBuilder::new(DuplicateKeyPolicy::KeepLast);
    let (mut source, mut src) = match chunks {
        Some(chunks) => (
            SliceSource::chunked(data, chunks),
            ByteBuffer::with_capacity(MIN_SRC_CAPACITY),
        ),
        None => (SliceSource::new(&[]), ByteBuffer::from_slice(data, true)),
    };
    Pump::default().run(
        &mut decoder(quirks)?,
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

fn serde_pointers(value: &JsonValue, prefix: &mut String, out: &mut Vec<String>) {
    out.push(prefix.clone());
    let len = prefix.len();
    match value {
        JsonValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                prefix.push_str(&format!("/{i}"));
                serde_pointers(item, prefix, out);
                prefix.truncate(len);
            }
        }
        JsonValue::Object(map) => {
            for (key, item) in map {
                prefix.push('/');
                prefix.push_str(&key.replace('~', "~0").replace('/', "~1"));
                serde_pointers(item, prefix, out);
                prefix.truncate(len);
            }
        }
        _ => {}
    }
}

fn check(input: Input) {
    let data = match input.document {
        Document::Raw(bytes) => bytes,
        Document::Generated(value) => serde_json::to_vec(&value.0).expect("serializable"),
    };
    let tokens = usize::from(input.tokens.max(1));
    let schedule: Vec<usize> = input.schedule.iter().map(|&s| usize::from(s)).collect();
    let chunks = split_at_schedule(&data, &schedule).iter().map(|c| c.len()).collect();

    let whole = parse(&data, input.quirks, None, tokens);
    let pieces = parse(&data, input.quirks, Some(chunks), tokens);
    for result in [&whole, &pieces] {
        if let Err(ValueError::Decode(e @ DecodeError::Internal(_))) = result {
            panic!("{e} on {data:?}");
        }
    }
    assert_eq!(summary(&whole), summary(&pieces), "chunking changed the result");

    // Strict mode must accept whatever serde_json accepts, short of our own
    // length limits, and agree on the shape.
    if input.quirks != 0 {
        return;
    }
    let Ok(oracle) = serde_json::from_slice::<JsonValue>(&data) else {
        return;
    };
    match whole {
        Ok(values) => {
            assert_eq!(values.len(), 1);
            let mut ours: Vec<String> = values[0]
                .pointers()
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect();
            let mut theirs = Vec::new();
            serde_pointers(&oracle, &mut String::new(), &mut theirs);
            ours.sort();
            theirs.sort();
            assert_eq!(ours, theirs);
        }
        Err(ValueError::Decode(DecodeError::Unsupported { .. })) => {}
        Err(e) => panic!("serde_json accepted what we rejected: {e}"),
    }
}

fuzz_target!(|input: Input| check(input));
