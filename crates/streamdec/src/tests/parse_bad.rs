use alloc::{vec, vec::Vec};

use rstest::rstest;

use super::utils::parse_chunked;
use crate::{
    DecodeError, Format,
    Quirk::{self, *},
    json::ValueError,
};

fn bad(reason: &'static str) -> DecodeError {
    DecodeError::malformed(Format::Json, reason)
}

fn unsupported(what: &'static str) -> DecodeError {
    DecodeError::unsupported(Format::Json, what)
}

#[rstest]
#[case::trailing_comma(b"[1,]".to_vec(), &[], bad("bad input"))]
#[case::missing_colon(b"{\"a\" 1}".to_vec(), &[], bad("bad input"))]
#[case::leading_zero(b"[01]".to_vec(), &[], bad("bad input"))]
#[case::bare_dot(b"[1.]".to_vec(), &[], bad("bad number"))]
#[case::control_code(b"\"a\x01\"".to_vec(), &[], bad("bad C0 control code"))]
#[case::unknown_escape(br#""\q""#.to_vec(), &[], bad("bad backslash-escape"))]
#[case::lone_surrogate(br#""\ud800""#.to_vec(), &[], bad("bad backslash-escape"))]
#[case::invalid_utf8(b"\"\xff\"".to_vec(), &[], bad("bad UTF-8"))]
#[case::comment_without_quirk(b"[1 /* c */]".to_vec(), &[], bad("bad input"))]
#[case::two_roots(b"1 2".to_vec(), &[], bad("bad input"))]
#[case::bom_without_quirk(b"\xEF\xBB\xBF1".to_vec(), &[], bad("bad input"))]
#[case::backslash_x_without_quirk(br#""\x41""#.to_vec(), &[], bad("bad backslash-escape"))]
#[case::inf_without_quirk(b"[inf]".to_vec(), &[], bad("bad input"))]
#[case::bom_mid_stream(b"[] \xEF\xBB\xBF[]".to_vec(), &[AllowLeadingByteOrderMark, AllowMultipleValues], bad("bad input"))]
#[case::truncated_literal(b"tru".to_vec(), &[], DecodeError::UnexpectedEof)]
#[case::unclosed_array(b"[".to_vec(), &[], DecodeError::UnexpectedEof)]
#[case::unclosed_comment(b"/* never".to_vec(), &[AllowCommentBlock], DecodeError::UnexpectedEof)]
#[case::empty(Vec::new(), &[], DecodeError::UnexpectedEof)]
#[case::deep(vec![b'['; 1025], &[], unsupported("recursion depth"))]
#[case::long_number(vec![b'1'; 100], &[], unsupported("number length"))]
fn rejects(
    #[case] input: Vec<u8>,
    #[case] quirks: &[Quirk],
    #[case] expected: DecodeError,
    #[values(1, 3, 1000)] chunk: usize,
) {
    match parse_chunked(&input, quirks, vec![chunk], 4) {
        Err(ValueError::Decode(err)) => assert_eq!(err, expected),
        other => panic!("expected {expected}, got {other:?}"),
    }
}

#[test]
fn depth_limit_is_inclusive() {
    let mut input = vec![b'['; 1024];
    input.extend(vec![b']'; 1024]);
    assert!(parse_chunked(&input, &[], vec![64], 4).is_ok());
}
