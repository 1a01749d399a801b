#![allow(missing_docs)]
#![expect(clippy::needless_raw_string_hashes)]

mod common;

use std::fmt::Write;

use streamdec::{
    ByteBuffer, Decoder, FnSink, Pump, Quirk, SliceSource,
    json::{JsonDecoder, MIN_SRC_CAPACITY, Token, TokenBuffer},
};

fn render_tokens(input: &[u8], quirks: &[Quirk], chunks: Vec<usize>) -> String {
    let mut decoder = JsonDecoder::default();
    for &quirk in quirks {
        decoder.set_quirk(quirk, true).unwrap();
    }
    let mut out = Vec::new();
    let mut sink = FnSink(|tokens: &[Token], _: &[u8]| {
        out.extend(tokens.iter().map(ToString::to_string));
        Ok::<_, streamdec::BoxError>(())
    });
    Pump::default()
        .run(
            &mut decoder,
            &mut SliceSource::chunked(input, chunks),
            &mut sink,
            &mut ByteBuffer::with_capacity(MIN_SRC_CAPACITY),
            &mut TokenBuffer::with_capacity(64),
            &mut [],
        )
        .unwrap();
    out.join(" ")
}

#[test]
fn snapshot_plain_tokens() {
    insta::assert_snapshot!(
        render_tokens(br#"{"a": [1, true]}"#, &[], vec![]),
        @r#"{/1 "/1+ copy/1+ "/1 punct/1 ws/1 [/1 num/1 punct/1 ws/1 true/4 ]/1 }/1"#
    );
}

#[test]
fn snapshot_split_string() {
    // Each arrival of string bytes yields its own copy token.
    insta::assert_snapshot!(
        render_tokens(br#""abcdef""#, &[], vec![3]),
        @r#""/1+ copy/2+ copy/3+ copy/1+ "/1"#
    );
}

#[test]
fn snapshot_quirky_tokens() {
    let input = b"/*x*/\"\\u00e9\\x41\" // end\n";
    insta::assert_snapshot!(
        render_tokens(
            input,
            &[Quirk::AllowCommentBlock, Quirk::AllowCommentLine, Quirk::AllowBackslashX],
            vec![],
        ),
        @r#"/*/5 "/1+ U+00E9/6+ 0x41/4+ "/1 ws/1 ///6 ws/1"#
    );
}

#[test]
fn snapshot_comment_line_split_at_end_of_input() {
    // The source only reports that it is closed after its last bytes were
    // tokenized, so the final piece covers no bytes. It only ends the
    // continued run.
    insta::assert_snapshot!(
        render_tokens(b"1 // c", &[Quirk::AllowCommentLine], vec![2]),
        @r#"num/1 ws/1 ///2+ ///2+ ///0"#
    );
    insta::assert_snapshot!(
        render_tokens(b"1 // c", &[Quirk::AllowCommentLine], vec![]),
        @r#"num/1 ws/1 ///4+ ///0"#
    );
}

#[test]
fn snapshot_frame_configs() {
    let data = common::nia(
        1,
        1,
        &[(10, vec![common::RED]), (30, vec![common::GREEN])],
        0,
    );
    let decoded = common::decode_image(&data, vec![], Default::default()).unwrap();
    let mut out = String::new();
    for (frame, _) in &decoded.frames {
        writeln!(out, "{frame}").unwrap();
    }
    insta::assert_snapshot!(out, @r#"
    frame 0 at 16: bounds (0,0)..(1,1) duration 10 None/Src
    frame 1 at 48: bounds (0,0)..(1,1) duration 20 None/Src
    "#);
}
