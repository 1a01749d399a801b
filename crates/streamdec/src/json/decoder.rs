use log::{trace, warn};

use super::token::{Filler, Literal, StringPart, Structure, Token, TokenBuffer, TokenKind};
use crate::{
    buffer::ByteBuffer,
    decoder::{Decoder, WorkbufLen},
    error::{DecodeError, Format},
    quirks::{Quirk, admit},
    status::{DecodeResult, Status, need_input, peek},
};

/// Smallest source buffer that can hold every lookahead the decoder needs
/// (the longest number, or a surrogate pair escape).
pub const MIN_SRC_CAPACITY: usize = 128;

/// Deepest container nesting accepted.
pub const MAX_DEPTH: u32 = 1024;

const MAX_NUMBER_LEN: usize = 99;
const MAX_TOKEN_LEN: usize = 0xFFFF;

const JSON_QUIRKS: [Quirk; 8] = [
    Quirk::AllowCommentBlock,
    Quirk::AllowCommentLine,
    Quirk::AllowExtraComma,
    Quirk::AllowInfNanNumbers,
    Quirk::AllowLeadingByteOrderMark,
    Quirk::AllowBackslashX,
    Quirk::ReplaceInvalidUnicode,
    Quirk::AllowMultipleValues,
];

/// Leniencies for [`JsonDecoder`]. Each field mirrors the [`Quirk`] of the
/// same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[expect(clippy::struct_excessive_bools)]
pub struct JsonOptions {
    /// Accept `/* ... */` comments.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_comment_block: bool,
    /// Accept `// ...` comments.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_comment_line: bool,
    /// Accept a comma before `]` or `}`.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_extra_comma: bool,
    /// Accept `Infinity`, `Inf` and `NaN`, in any case and with an optional
    /// sign.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_inf_nan_numbers: bool,
    /// Skip a leading `EF BB BF`.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_leading_byte_order_mark: bool,
    /// Accept `\xHH` escapes.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_backslash_x: bool,
    /// Turn invalid UTF-8 and lone surrogates into U+FFFD.
    ///
    /// # Default
    ///
    /// `false`
    pub replace_invalid_unicode: bool,
    /// Accept any number of top-level values, one after another.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_multiple_values: bool,
}

impl JsonOptions {
    fn field(&mut self, quirk: Quirk) -> Option<&mut bool> {
        Some(match quirk {
            Quirk::AllowCommentBlock => &mut self.allow_comment_block,
            Quirk::AllowCommentLine => &mut self.allow_comment_line,
            Quirk::AllowExtraComma => &mut self.allow_extra_comma,
            Quirk::AllowInfNanNumbers => &mut self.allow_inf_nan_numbers,
            Quirk::AllowLeadingByteOrderMark => &mut self.allow_leading_byte_order_mark,
            Quirk::AllowBackslashX => &mut self.allow_backslash_x,
            Quirk::ReplaceInvalidUnicode => &mut self.replace_invalid_unicode,
            Quirk::AllowMultipleValues => &mut self.allow_multiple_values,
            _ => return None,
        })
    }
}

/// What the grammar allows next, outside of strings and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    /// Inside a list, right after `[` (or after a comma with the extra-comma
    /// quirk).
    ValueOrClose,
    Key,
    KeyOrClose,
    Colon,
    CommaOrClose,
    /// The top-level value is complete.
    End,
}

/// Multi-byte constructs the decoder may be in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Idle,
    String { key: bool },
    /// `opened` once the leading `/*` or `//` has been emitted.
    CommentBlock { opened: bool },
    CommentLine { opened: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Done,
    Failed,
}

/// A stack of container kinds, one bit per level.
#[derive(Debug, Clone)]
struct Nesting {
    bits: [u64; (MAX_DEPTH / 64) as usize],
    depth: u32,
}

impl Nesting {
    const fn new() -> Self {
        Self {
            bits: [0; (MAX_DEPTH / 64) as usize],
            depth: 0,
        }
    }

    fn push(&mut self, dict: bool) -> Result<(), DecodeError> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::unsupported(Format::Json, "recursion depth"));
        }
        let (word, bit) = ((self.depth / 64) as usize, self.depth % 64);
        if dict {
            self.bits[word] |= 1 << bit;
        } else {
            self.bits[word] &= !(1 << bit);
        }
        self.depth += 1;
        Ok(())
    }

    fn pop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// `Some(true)` inside a dict, `Some(false)` inside a list.
    fn top(&self) -> Option<bool> {
        let top = self.depth.checked_sub(1)?;
        Some(self.bits[(top / 64) as usize] & (1 << (top % 64)) != 0)
    }
}

/// `None` to keep going, `Some(status)` to return it.
type Step = Result<Option<Status>, DecodeError>;

fn short(src: &ByteBuffer) -> Step {
    need_input(src).map(Some)
}

fn bad(reason: &'static str) -> DecodeError {
    DecodeError::malformed(Format::Json, reason)
}

/// Outcome of scanning for a number or a word at the front of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// A complete token of this many bytes.
    Done(usize),
    /// Ran out of bytes; `true` if what was seen is already a complete token.
    More(bool),
    Bad,
}

fn scan_number(buf: &[u8]) -> Scan {
    #[derive(Clone, Copy)]
    enum N {
        Start,
        Minus,
        Zero,
        Int,
        Dot,
        Frac,
        E,
        ESign,
        Exp,
    }
    let accepting = |n: N| matches!(n, N::Zero | N::Int | N::Frac | N::Exp);

    let mut state = N::Start;
    for (i, &b) in buf.iter().enumerate() {
        state = match (state, b) {
            (N::Start, b'-') => N::Minus,
            (N::Start | N::Minus, b'0') => N::Zero,
            (N::Start | N::Minus | N::Int, b'0'..=b'9') => N::Int,
            (N::Zero | N::Int, b'.') => N::Dot,
            (N::Dot | N::Frac, b'0'..=b'9') => N::Frac,
            (N::Zero | N::Int | N::Frac, b'e' | b'E') => N::E,
            (N::E, b'+' | b'-') => N::ESign,
            (N::E | N::ESign | N::Exp, b'0'..=b'9') => N::Exp,
            _ if accepting(state) => return Scan::Done(i),
            _ => return Scan::Bad,
        };
    }
    Scan::More(accepting(state))
}

/// Case-insensitive prefix match: how many bytes of `word` match, and whether
/// `buf` ran out before `word` did.
fn match_word(buf: &[u8], word: &[u8]) -> (usize, bool) {
    let matched = buf
        .iter()
        .zip(word)
        .take_while(|(a, b)| a.eq_ignore_ascii_case(b))
        .count();
    (matched, matched == buf.len() && matched < word.len())
}

fn scan_inf_nan(buf: &[u8]) -> Scan {
    let sign = usize::from(matches!(buf.first(), Some(b'+' | b'-')));
    let rest = &buf[sign..];
    if rest.is_empty() {
        return Scan::More(false);
    }
    match match_word(rest, b"infinity") {
        (8, _) => return Scan::Done(sign + 8),
        (m @ 3.., true) => return Scan::More(m == 3),
        (3, false) => return Scan::Done(sign + 3),
        (4.., false) => return Scan::Bad,
        (_, true) => return Scan::More(false),
        _ => {}
    }
    match match_word(rest, b"nan") {
        (3, _) => Scan::Done(sign + 3),
        (_, true) => Scan::More(false),
        _ => Scan::Bad,
    }
}

fn hex_digit(b: u8) -> Option<u32> {
    char::from(b).to_digit(16)
}

fn hex4(b: &[u8]) -> Option<u32> {
    b.iter().try_fold(0, |acc, &d| Some(acc << 4 | hex_digit(d)?))
}

/// Streaming RFC 8259 tokenizer.
///
/// Emits [`Token`]s into a [`TokenBuffer`]. Scalars that must be seen whole
/// before they can be classified (numbers and literals) are only consumed
/// once complete, so the source buffer must hold at least
/// [`MIN_SRC_CAPACITY`] bytes. Strings and comments are emitted piecewise
/// and can be arbitrarily long.
///
/// After the top-level value only filler may follow. Once the source is
/// closed the decoder reports [`crate::Note::EndOfData`], and keeps
/// reporting it.
#[derive(Debug, Clone)]
pub struct JsonDecoder {
    options: JsonOptions,
    expect: Expect,
    lex: Lex,
    nesting: Nesting,
    at_start: bool,
    state: State,
    started: bool,
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self::new(JsonOptions::default())
    }
}

impl JsonDecoder {
    /// A decoder expecting a top-level value.
    #[must_use]
    pub fn new(options: JsonOptions) -> Self {
        Self {
            options,
            expect: Expect::Value,
            lex: Lex::Idle,
            nesting: Nesting::new(),
            at_start: true,
            state: State::Running,
            started: false,
        }
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> &JsonOptions {
        &self.options
    }

    /// Current container depth.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.nesting.depth
    }

    fn emit(
        &mut self,
        dst: &mut TokenBuffer,
        src: &mut ByteBuffer,
        kind: TokenKind,
        len: usize,
        continued: bool,
    ) -> Result<(), DecodeError> {
        debug_assert!(len <= MAX_TOKEN_LEN);
        #[allow(clippy::cast_possible_truncation)]
        dst.push(Token {
            kind,
            len: len as u32,
            continued,
        })?;
        src.consume(len)?;
        self.at_start = false;
        Ok(())
    }

    fn after_value(&mut self) {
        self.expect = if self.nesting.depth == 0 {
            Expect::End
        } else {
            Expect::CommaOrClose
        };
    }

    fn step(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer) -> DecodeResult {
        loop {
            if dst.writer_len() == 0 {
                if self.lex == Lex::Idle
                    && self.expect == Expect::End
                    && src.reader_len() == 0
                    && src.is_closed()
                {
                    return Ok(Status::END_OF_DATA);
                }
                return Ok(Status::SHORT_WRITE);
            }
            let step = match self.lex {
                Lex::Idle => self.lex_idle(dst, src)?,
                Lex::String { key } => self.lex_string(dst, src, key)?,
                Lex::CommentBlock { opened } => self.lex_comment_block(dst, src, opened)?,
                Lex::CommentLine { opened } => self.lex_comment_line(dst, src, opened)?,
            };
            if let Some(status) = step {
                return Ok(status);
            }
        }
    }

    fn lex_idle(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer) -> Step {
        let buf = src.readable();
        let Some(&c) = buf.first() else {
            if src.is_closed() {
                return if self.expect == Expect::End {
                    trace!("json: end of data at {}", src.reader_position());
                    Ok(Some(Status::END_OF_DATA))
                } else {
                    Err(DecodeError::UnexpectedEof)
                };
            }
            return Ok(Some(Status::SHORT_READ));
        };
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                let n = buf
                    .iter()
                    .take(MAX_TOKEN_LEN)
                    .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
                    .count();
                self.emit(dst, src, TokenKind::Filler(Filler::Whitespace), n, false)?;
            }
            b'/' if self.options.allow_comment_block || self.options.allow_comment_line => {
                let Some(&next) = buf.get(1) else {
                    return short(src);
                };
                self.lex = match next {
                    b'*' if self.options.allow_comment_block => Lex::CommentBlock { opened: false },
                    b'/' if self.options.allow_comment_line => Lex::CommentLine { opened: false },
                    _ => return Err(bad("bad input")),
                };
            }
            0xEF if self.at_start && self.options.allow_leading_byte_order_mark => {
                let Some(bom) = peek(src, 3)? else {
                    return Ok(Some(Status::SHORT_READ));
                };
                if bom != [0xEF, 0xBB, 0xBF] {
                    return Err(bad("bad input"));
                }
                self.emit(dst, src, TokenKind::Filler(Filler::ByteOrderMark), 3, false)?;
            }
            _ => return self.lex_structure(dst, src, c),
        }
        Ok(None)
    }

    fn close(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, dict: bool) -> Step {
        if self.nesting.top() != Some(dict) {
            return Err(bad("bad input"));
        }
        self.nesting.pop();
        let kind = if dict { Structure::PopDict } else { Structure::PopList };
        self.emit(dst, src, TokenKind::Structure(kind), 1, false)?;
        self.after_value();
        Ok(None)
    }

    fn lex_structure(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, c: u8) -> Step {
        let extra = self.options.allow_extra_comma;
        match self.expect {
            Expect::End => {
                if !self.options.allow_multiple_values {
                    return Err(bad("bad input"));
                }
                self.expect = Expect::Value;
            }
            Expect::Colon => {
                if c != b':' {
                    return Err(bad("bad input"));
                }
                self.emit(dst, src, TokenKind::Filler(Filler::Punctuation), 1, false)?;
                self.expect = Expect::Value;
            }
            Expect::CommaOrClose => match c {
                b',' => {
                    self.emit(dst, src, TokenKind::Filler(Filler::Punctuation), 1, false)?;
                    self.expect = match (self.nesting.top() == Some(true), extra) {
                        (true, true) => Expect::KeyOrClose,
                        (true, false) => Expect::Key,
                        (false, true) => Expect::ValueOrClose,
                        (false, false) => Expect::Value,
                    };
                }
                b']' => return self.close(dst, src, false),
                b'}' => return self.close(dst, src, true),
                _ => return Err(bad("bad input")),
            },
            Expect::Key | Expect::KeyOrClose => match c {
                b'"' => {
                    self.emit(dst, src, TokenKind::String(StringPart::Quote), 1, true)?;
                    self.lex = Lex::String { key: true };
                }
                b'}' if self.expect == Expect::KeyOrClose => return self.close(dst, src, true),
                _ => return Err(bad("bad input")),
            },
            Expect::ValueOrClose if c == b']' => return self.close(dst, src, false),
            Expect::Value | Expect::ValueOrClose => return self.start_value(dst, src, c),
        }
        Ok(None)
    }

    fn start_value(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, c: u8) -> Step {
        let inf_nan = self.options.allow_inf_nan_numbers;
        match c {
            b'{' => {
                self.nesting.push(true)?;
                self.emit(dst, src, TokenKind::Structure(Structure::PushDict), 1, false)?;
                self.expect = Expect::KeyOrClose;
            }
            b'[' => {
                self.nesting.push(false)?;
                self.emit(dst, src, TokenKind::Structure(Structure::PushList), 1, false)?;
                self.expect = Expect::ValueOrClose;
            }
            b'"' => {
                self.emit(dst, src, TokenKind::String(StringPart::Quote), 1, true)?;
                self.lex = Lex::String { key: false };
            }
            b't' => return self.literal(dst, src, b"true", Literal::True),
            b'f' => return self.literal(dst, src, b"false", Literal::False),
            b'n' if !inf_nan => return self.literal(dst, src, b"null", Literal::Null),
            b'n' => match scan_inf_nan(src.readable()) {
                Scan::Bad => return self.literal(dst, src, b"null", Literal::Null),
                scan => return self.number(dst, src, scan),
            },
            b'I' | b'i' | b'N' | b'+' if inf_nan => {
                return self.number(dst, src, scan_inf_nan(src.readable()));
            }
            b'-' if inf_nan && src.readable().get(1).is_some_and(u8::is_ascii_alphabetic) => {
                return self.number(dst, src, scan_inf_nan(src.readable()));
            }
            b'-' | b'0'..=b'9' => {
                let buf = src.readable();
                let view = &buf[..buf.len().min(MAX_NUMBER_LEN + 1)];
                let scan = match scan_number(view) {
                    Scan::More(_) if view.len() > MAX_NUMBER_LEN => {
                        return Err(DecodeError::unsupported(Format::Json, "number length"));
                    }
                    scan => scan,
                };
                return self.number(dst, src, scan);
            }
            _ => return Err(bad("bad input")),
        }
        Ok(None)
    }

    fn number(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, scan: Scan) -> Step {
        let len = match scan {
            Scan::Done(n) => n,
            Scan::More(complete) if src.is_closed() => {
                if !complete {
                    return Err(DecodeError::UnexpectedEof);
                }
                src.reader_len()
            }
            Scan::More(_) => return Ok(Some(Status::SHORT_READ)),
            Scan::Bad => return Err(bad("bad number")),
        };
        self.emit(dst, src, TokenKind::Number, len, false)?;
        self.after_value();
        Ok(None)
    }

    fn literal(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, word: &[u8], kind: Literal) -> Step {
        let buf = src.readable();
        let n = buf.len().min(word.len());
        if buf[..n] != word[..n] {
            return Err(bad("bad input"));
        }
        if n < word.len() {
            return short(src);
        }
        self.emit(dst, src, TokenKind::Literal(kind), word.len(), false)?;
        self.after_value();
        Ok(None)
    }

    fn lex_string(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, key: bool) -> Step {
        let buf = src.readable();
        let Some(&c) = buf.first() else {
            return short(src);
        };
        match c {
            b'"' => {
                self.emit(dst, src, TokenKind::String(StringPart::Quote), 1, false)?;
                self.lex = Lex::Idle;
                if key {
                    self.expect = Expect::Colon;
                } else {
                    self.after_value();
                }
            }
            b'\\' => return self.lex_escape(dst, src),
            0x00..=0x1F => return Err(bad("bad C0 control code")),
            _ => {
                let limit = buf
                    .iter()
                    .take(MAX_TOKEN_LEN)
                    .position(|&b| b == b'"' || b == b'\\' || b < 0x20)
                    .unwrap_or(buf.len().min(MAX_TOKEN_LEN));
                match core::str::from_utf8(&buf[..limit]) {
                    Ok(_) => self.emit(dst, src, TokenKind::String(StringPart::Copy), limit, true)?,
                    Err(e) if e.valid_up_to() > 0 => {
                        let n = e.valid_up_to();
                        self.emit(dst, src, TokenKind::String(StringPart::Copy), n, true)?;
                    }
                    Err(e) => {
                        let incomplete = e.error_len().is_none() && limit == buf.len();
                        if incomplete {
                            return short(src);
                        }
                        if !self.options.replace_invalid_unicode {
                            return Err(bad("bad UTF-8"));
                        }
                        let n = e.error_len().unwrap_or(limit);
                        warn!("json: replacing {n} invalid UTF-8 bytes at {}", src.reader_position());
                        self.emit(dst, src, TokenKind::String(StringPart::CodePoint('\u{FFFD}')), n, true)?;
                    }
                }
            }
        }
        Ok(None)
    }

    fn lex_escape(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer) -> Step {
        let Some(&e) = src.readable().get(1) else {
            return short(src);
        };
        let c = match e {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => return self.lex_unicode_escape(dst, src),
            b'x' if self.options.allow_backslash_x => {
                let Some(esc) = peek(src, 4)? else {
                    return Ok(Some(Status::SHORT_READ));
                };
                let byte = hex_digit(esc[2])
                    .zip(hex_digit(esc[3]))
                    .map(|(hi, lo)| (hi << 4 | lo) as u8)
                    .ok_or_else(|| bad("bad backslash-escape"))?;
                self.emit(dst, src, TokenKind::String(StringPart::Byte(byte)), 4, true)?;
                return Ok(None);
            }
            _ => return Err(bad("bad backslash-escape")),
        };
        self.emit(dst, src, TokenKind::String(StringPart::CodePoint(c)), 2, true)?;
        Ok(None)
    }

    fn lex_unicode_escape(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer) -> Step {
        let Some(esc) = peek(src, 6)? else {
            return Ok(Some(Status::SHORT_READ));
        };
        let hi = hex4(&esc[2..6]).ok_or_else(|| bad("bad backslash-escape"))?;
        let (c, len) = match hi {
            0xD800..=0xDBFF => {
                let buf = src.readable();
                let pair_follows = buf.get(6).is_none_or(|&b| b == b'\\')
                    && buf.get(7).is_none_or(|&b| b == b'u');
                if !pair_follows {
                    (None, 6)
                } else if buf.len() < 12 {
                    return short(src);
                } else {
                    let lo = hex4(&buf[8..12]).ok_or_else(|| bad("bad backslash-escape"))?;
                    if (0xDC00..=0xDFFF).contains(&lo) {
                        (char::from_u32(0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)), 12)
                    } else {
                        (None, 6)
                    }
                }
            }
            _ => (char::from_u32(hi), 6),
        };
        let c = match c {
            Some(c) => c,
            None if self.options.replace_invalid_unicode => '\u{FFFD}',
            None => return Err(bad("bad backslash-escape")),
        };
        self.emit(dst, src, TokenKind::String(StringPart::CodePoint(c)), len, true)?;
        Ok(None)
    }

    fn lex_comment_block(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, opened: bool) -> Step {
        let buf = src.readable();
        let view = &buf[..buf.len().min(MAX_TOKEN_LEN)];
        let start = if opened { 0 } else { 2 };
        if let Some(i) = view[start..].windows(2).position(|w| w == b"*/") {
            self.emit(dst, src, TokenKind::Filler(Filler::CommentBlock), start + i + 2, false)?;
            self.lex = Lex::Idle;
            return Ok(None);
        }
        let mut n = view.len();
        if n > start && view[n - 1] == b'*' {
            n -= 1;
        }
        if n == 0 {
            return short(src);
        }
        self.emit(dst, src, TokenKind::Filler(Filler::CommentBlock), n, true)?;
        self.lex = Lex::CommentBlock { opened: true };
        Ok(None)
    }

    fn lex_comment_line(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, opened: bool) -> Step {
        let buf = src.readable();
        let whole = buf.len() <= MAX_TOKEN_LEN;
        let view = &buf[..buf.len().min(MAX_TOKEN_LEN)];
        let start = if opened { 0 } else { 2 };
        if let Some(i) = view[start..].iter().position(|&b| b == b'\n') {
            self.emit(dst, src, TokenKind::Filler(Filler::CommentLine), start + i, false)?;
            self.lex = Lex::Idle;
            return Ok(None);
        }
        let n = view.len();
        // A comment that runs to the end of a closed source ends on a
        // non-continued piece. When earlier pieces already took every byte,
        // that piece is zero bytes long.
        if whole && src.is_closed() {
            self.emit(dst, src, TokenKind::Filler(Filler::CommentLine), n, false)?;
            self.lex = Lex::Idle;
            return Ok(None);
        }
        if n == 0 {
            return Ok(Some(Status::SHORT_READ));
        }
        self.emit(dst, src, TokenKind::Filler(Filler::CommentLine), n, true)?;
        self.lex = Lex::CommentLine { opened: true };
        Ok(None)
    }
}

impl Decoder for JsonDecoder {
    type Output = Token;

    fn set_quirk(&mut self, quirk: Quirk, enabled: bool) -> Result<(), DecodeError> {
        admit(quirk, self.started, &JSON_QUIRKS)?;
        if let Some(field) = self.options.field(quirk) {
            *field = enabled;
        }
        Ok(())
    }

    fn workbuf_len(&self) -> WorkbufLen {
        WorkbufLen::NONE
    }

    fn advance(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, _workbuf: &mut [u8]) -> DecodeResult {
        match self.state {
            State::Failed => return Err(DecodeError::DisabledByPreviousError),
            State::Done => return Ok(Status::END_OF_DATA),
            State::Running => {}
        }
        self.started = true;
        let result = self.step(dst, src);
        match result {
            Err(_) => self.state = State::Failed,
            Ok(Status::Note(_)) => self.state = State::Done,
            Ok(_) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_scanner() {
        assert_eq!(scan_number(b"0,"), Scan::Done(1));
        assert_eq!(scan_number(b"-12.5e+3]"), Scan::Done(9));
        assert_eq!(scan_number(b"12"), Scan::More(true));
        assert_eq!(scan_number(b"1."), Scan::More(false));
        assert_eq!(scan_number(b"-"), Scan::More(false));
        assert_eq!(scan_number(b"-x"), Scan::Bad);
        assert_eq!(scan_number(b"1.e5"), Scan::Bad);
        assert_eq!(scan_number(b"01"), Scan::Done(1));
    }

    #[test]
    fn inf_nan_scanner() {
        assert_eq!(scan_inf_nan(b"Infinity,"), Scan::Done(8));
        assert_eq!(scan_inf_nan(b"-inf]"), Scan::Done(4));
        assert_eq!(scan_inf_nan(b"+NaN"), Scan::Done(4));
        assert_eq!(scan_inf_nan(b"inf"), Scan::More(true));
        assert_eq!(scan_inf_nan(b"infin"), Scan::More(false));
        assert_eq!(scan_inf_nan(b"infinx"), Scan::Bad);
        assert_eq!(scan_inf_nan(b"na"), Scan::More(false));
        assert_eq!(scan_inf_nan(b"null"), Scan::Bad);
    }

    fn tokens_of(dec: &mut JsonDecoder, src: &mut ByteBuffer) -> alloc::string::String {
        let mut dst = TokenBuffer::with_capacity(16);
        let mut out = alloc::vec::Vec::new();
        loop {
            let status = dec.advance(&mut dst, src, &mut []).unwrap();
            out.extend(dst.readable().iter().map(alloc::string::ToString::to_string));
            dst.clear();
            if status != Status::SHORT_WRITE {
                return out.join(" ");
            }
        }
    }

    #[test]
    fn comment_line_ends_with_empty_piece_once_source_closes() {
        let options = JsonOptions {
            allow_comment_line: true,
            ..JsonOptions::default()
        };
        let mut dec = JsonDecoder::new(options);
        let mut src = ByteBuffer::with_capacity(16);
        src.append(b"1 // c").unwrap();
        assert_eq!(tokens_of(&mut dec, &mut src), "num/1 ws/1 ///4+");
        src.mark_closed();
        assert_eq!(tokens_of(&mut dec, &mut src), "///0");

        let mut dec = JsonDecoder::new(options);
        let mut src = ByteBuffer::from_slice(b"1 // c", true);
        assert_eq!(tokens_of(&mut dec, &mut src), "num/1 ws/1 ///4");
    }

    #[test]
    fn nesting_bits() {
        let mut n = Nesting::new();
        assert_eq!(n.top(), None);
        for i in 0..200 {
            n.push(i % 3 == 0).unwrap();
        }
        for i in (0..200).rev() {
            assert_eq!(n.top(), Some(i % 3 == 0));
            n.pop();
        }
        assert_eq!(n.top(), None);
    }

    #[test]
    fn nesting_limit() {
        let mut n = Nesting::new();
        for _ in 0..MAX_DEPTH {
            n.push(false).unwrap();
        }
        assert_eq!(
            n.push(false),
            Err(DecodeError::unsupported(Format::Json, "recursion depth"))
        );
    }
}
