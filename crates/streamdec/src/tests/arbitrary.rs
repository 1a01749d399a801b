use alloc::string::String;

use bstr::BString;
use quickcheck::{Arbitrary, Gen};

use crate::json::{Array, Map, Value};

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct JsonNumber(f64);

impl Arbitrary for JsonNumber {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut value = f64::arbitrary(g);
        while !value.is_finite() {
            value = f64::arbitrary(g);
        }

        Self(value)
    }
}

impl Arbitrary for Value {
    fn arbitrary(g: &mut Gen) -> Self {
        fn scalar(g: &mut Gen) -> Value {
            match usize::arbitrary(g) % 5 {
                0 => Value::Null,
                1 => Value::Bool(bool::arbitrary(g)),
                2 => Value::Int(i64::arbitrary(g)),
                3 => Value::Float(JsonNumber::arbitrary(g).0),
                _ => Value::String(BString::from(String::arbitrary(g))),
            }
        }

        fn gen_val(g: &mut Gen, depth: usize) -> Value {
            if depth == 0 {
                return scalar(g);
            }
            match usize::arbitrary(g) % 7 {
                0..5 => scalar(g),
                5 => {
                    let len = usize::arbitrary(g) % 4;
                    Value::Array((0..len).map(|_| gen_val(g, depth - 1)).collect::<Array>())
                }
                _ => {
                    let len = usize::arbitrary(g) % 4;
                    let mut map = Map::new();
                    for _ in 0..len {
                        map.insert(BString::from(String::arbitrary(g)), gen_val(g, depth - 1));
                    }
                    Value::Map(map)
                }
            }
        }

        let depth = usize::arbitrary(g) % 4;
        gen_val(g, depth)
    }
}
