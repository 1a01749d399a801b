use alloc::{
    string::{String, ToString},
    vec,
    vec::Vec,
};

use rstest::rstest;

use super::utils::parse_cbor_chunked;
use crate::{
    DecodeError, Format,
    Quirk::{self, *},
    json::{Value, ValueError},
};

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn render(values: &[Value]) -> String {
    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

fn bad(reason: &'static str) -> DecodeError {
    DecodeError::malformed(Format::Cbor, reason)
}

// Examples from RFC 8949 Appendix A.
#[rstest]
#[case::zero("00", "0")]
#[case::small("17", "23")]
#[case::one_byte("1818", "24")]
#[case::two_bytes("1903e8", "1000")]
#[case::four_bytes("1a000f4240", "1000000")]
#[case::eight_bytes("1b000000e8d4a51000", "1000000000000")]
#[case::negative("20", "-1")]
#[case::negative_two_bytes("3903e7", "-1000")]
#[case::half_zero("f90000", "0.0")]
#[case::half_negative_zero("f98000", "-0.0")]
#[case::half_one_and_a_half("f93e00", "1.5")]
#[case::half_max("f97bff", "65504.0")]
#[case::single("fa47c35000", "100000.0")]
#[case::double("fb3ff199999999999a", "1.1")]
#[case::double_negative("fbc010666666666666", "-4.1")]
#[case::half_infinity("f97c00", "null")]
#[case::half_nan("f97e00", "null")]
#[case::double_negative_infinity("fbfff0000000000000", "null")]
#[case::literals("83f4f5f6", "[false,true,null]")]
#[case::undefined("f7", "null")]
#[case::simple_low("f0", "null")]
#[case::simple_high("f8ff", "null")]
#[case::empty_bytes("40", r#""""#)]
#[case::bytes("4401020304", r#""AQIDBA""#)]
#[case::empty_text("60", r#""""#)]
#[case::text("6449455446", r#""IETF""#)]
#[case::text_escapes("62225c", r#""\"\\""#)]
#[case::text_two_byte_char("62c3bc", "\"\u{fc}\"")]
#[case::text_astral_char("64f0908591", "\"\u{10151}\"")]
#[case::empty_array("80", "[]")]
#[case::nested_arrays("8301820203820405", "[1,[2,3],[4,5]]")]
#[case::long_array(
    "98190102030405060708090a0b0c0d0e0f101112131415161718181819",
    "[1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23,24,25]"
)]
#[case::empty_map("a0", "{}")]
#[case::integer_keys("a201020304", r#"{"1":2,"3":4}"#)]
#[case::negative_key("a13818f5", r#"{"-25":true}"#)]
#[case::bytes_key("a1420102f6", r#"{"AQI":null}"#)]
#[case::text_keys("a26161016162820203", r#"{"a":1,"b":[2,3]}"#)]
#[case::map_in_array("826161a161626163", r#"["a",{"b":"c"}]"#)]
#[case::chunked_bytes("5f42010243030405ff", r#""AQIDBAU""#)]
#[case::chunked_text("7f657374726561646d696e67ff", r#""streaming""#)]
#[case::empty_indefinite_array("9fff", "[]")]
#[case::mixed_lengths("9f018202039f0405ffff", "[1,[2,3],[4,5]]")]
#[case::definite_around_indefinite("83019f0203ff820405", "[1,[2,3],[4,5]]")]
#[case::indefinite_map("bf61610161629f0203ffff", r#"{"a":1,"b":[2,3]}"#)]
#[case::indefinite_map_in_array("826161bf61626163ff", r#"["a",{"b":"c"}]"#)]
#[case::indefinite_map_literals("bf6346756ef563416d7421ff", r#"{"Amt":-2,"Fun":true}"#)]
#[case::date_tag("c074323031332d30332d32315432303a30343a30305a", r#""2013-03-21T20:04:00Z""#)]
#[case::epoch_tag("c11a514b67b0", "1363896240")]
#[case::bignum_tag("c249010000000000000000", r#""AQAAAAAAAAAA""#)]
#[case::nested_tags("d818456449455446", r#""ZElFVEY""#)]
#[case::tag_before_indefinite_array("d09fff", "[]")]
#[case::tag_before_indefinite_map("d0bfff", "{}")]
#[case::even_map("a10102", r#"{"1":2}"#)]
fn decodes(#[case] input: &str, #[case] expected: &str, #[values(1, 3, 1000)] chunk: usize) {
    let values = parse_cbor_chunked(&hex(input), &[], vec![chunk], 4).unwrap();
    assert_eq!(render(&values), expected);
}

#[rstest]
#[case::truncated_integer(b"\x18".to_vec(), &[], DecodeError::UnexpectedEof)]
#[case::tag_before_break_in_array(b"\x9f\xd0\xff".to_vec(), &[], bad("tag before break"))]
#[case::odd_definite_map(b"\xa1\x01".to_vec(), &[], DecodeError::UnexpectedEof)]
#[case::odd_indefinite_map(b"\xbf\x01\x02\x03\xff".to_vec(), &[], bad("odd map length"))]
#[case::tag_before_break_in_map(b"\xbf\xd0\xff".to_vec(), &[], bad("tag before break"))]
#[case::unused_opcode(b"\xfe".to_vec(), &[], bad("reserved additional information"))]
#[case::lone_break(b"\xff".to_vec(), &[], bad("unexpected break"))]
#[case::break_in_definite_array(b"\x81\xff".to_vec(), &[], bad("unexpected break"))]
#[case::indefinite_integer(b"\x1f".to_vec(), &[], bad("bad indefinite length"))]
#[case::indefinite_tag(b"\xdf\x01".to_vec(), &[], bad("bad indefinite length"))]
#[case::text_chunk_in_bytes(b"\x5f\x61a\xff".to_vec(), &[], bad("bad string chunk"))]
#[case::nested_indefinite_text(b"\x7f\x7f\xff\xff".to_vec(), &[], bad("bad string chunk"))]
#[case::invalid_utf8(b"\x62\xc3\x28".to_vec(), &[], bad("bad UTF-8"))]
#[case::utf8_cut_by_string_end(b"\x61\xc3".to_vec(), &[], bad("bad UTF-8"))]
#[case::short_simple_value(b"\xf8\x10".to_vec(), &[], bad("bad simple value"))]
#[case::truncated_string(b"\x62\xc3".to_vec(), &[], DecodeError::UnexpectedEof)]
#[case::truncated_float(b"\xfb\x3f\xf1".to_vec(), &[], DecodeError::UnexpectedEof)]
#[case::dangling_tag(b"\xc1".to_vec(), &[], DecodeError::UnexpectedEof)]
#[case::empty(Vec::new(), &[], DecodeError::UnexpectedEof)]
#[case::truncated_sequence(b"\x01\x82".to_vec(), &[AllowMultipleValues], DecodeError::UnexpectedEof)]
#[case::deep(vec![0x81; 1025], &[], DecodeError::unsupported(Format::Cbor, "recursion depth"))]
fn rejects(
    #[case] input: Vec<u8>,
    #[case] quirks: &[Quirk],
    #[case] expected: DecodeError,
    #[values(1, 3, 1000)] chunk: usize,
) {
    match parse_cbor_chunked(&input, quirks, vec![chunk], 4) {
        Err(ValueError::Decode(err)) => assert_eq!(err, expected),
        other => panic!("expected {expected}, got {other:?}"),
    }
}

#[rstest]
#[case::null_key(b"\xa1\xf6\x01")]
#[case::float_key(b"\xa1\xf9\x3c\x00\x01")]
#[case::array_key(b"\xa1\x80\x01")]
#[case::map_key(b"\xa1\xa0\x01")]
fn non_string_keys_are_rejected(#[case] input: &[u8]) {
    assert!(matches!(
        parse_cbor_chunked(input, &[], vec![2], 4),
        Err(ValueError::InvalidKey)
    ));
}

#[test]
fn integers_past_i64_become_floats() {
    let values = parse_cbor_chunked(&hex("821bffffffffffffffff3bffffffffffffffff"), &[], vec![], 4).unwrap();
    assert_eq!(
        values,
        [Value::Array(vec![
            Value::Float(18_446_744_073_709_551_616.0),
            Value::Float(-18_446_744_073_709_551_616.0),
        ])]
    );

    let values = parse_cbor_chunked(&hex("a13bffffffffffffffff00"), &[], vec![], 4).unwrap();
    assert_eq!(render(&values), r#"{"-18446744073709551616":0}"#);
}

#[test]
fn depth_limit_is_inclusive() {
    let mut input = vec![0x81; 1024];
    input.push(0x00);
    assert!(parse_cbor_chunked(&input, &[], vec![64], 4).is_ok());
}

#[test]
fn sequences_need_the_quirk() {
    // 1, [2, 3], "x"
    let input = hex("018202036178");
    let values = parse_cbor_chunked(&input, &[], vec![2], 4).unwrap();
    assert_eq!(render(&values), "1");
    let values = parse_cbor_chunked(&input, &[AllowMultipleValues], vec![2], 4).unwrap();
    assert_eq!(render(&values), r#"1 [2,3] "x""#);
}
