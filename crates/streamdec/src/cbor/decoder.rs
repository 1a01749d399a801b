use alloc::vec::Vec;

use log::trace;

use crate::{
    buffer::ByteBuffer,
    decoder::{Decoder, WorkbufLen},
    error::{DecodeError, Format, InternalError},
    json::{Literal, Scalar, StringPart, Structure, Token, TokenBuffer, TokenKind},
    quirks::{Quirk, admit},
    status::{DecodeResult, Status, need_input, peek},
};

/// Smallest source buffer the decoder can work with: the longest item head.
pub const MIN_SRC_CAPACITY: usize = 9;

/// Deepest array and map nesting accepted. Tags do not count.
pub const MAX_DEPTH: u32 = 1024;

const MAX_TOKEN_LEN: usize = 0xFFFF;

const CBOR_QUIRKS: [Quirk; 1] = [Quirk::AllowMultipleValues];

/// Leniencies for [`CborDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CborOptions {
    /// Accept a sequence of top-level items (RFC 8742), including an empty
    /// one, instead of exactly one item.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_multiple_values: bool,
}

/// An open array or map.
#[derive(Debug, Clone, Copy)]
struct Container {
    dict: bool,
    /// Items still due, or `None` until a break. Map entries count twice.
    left: Option<u64>,
    /// A map holding a key without its value.
    odd: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    /// At the head of an item.
    Head,
    /// Inside the payload of a string, or of one chunk of an
    /// indefinite-length string.
    String { binary: bool, left: u64, chunked: bool },
    /// Between the chunks of an indefinite-length string.
    Chunks { binary: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Done,
    Failed,
}

/// The initial byte of a data item and its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Head {
    major: u8,
    info: u8,
    arg: u64,
    /// Bytes taken by the initial byte and the argument.
    len: usize,
}

impl Head {
    fn indefinite(self) -> bool {
        self.info == 31
    }

    fn is_break(self) -> bool {
        self.major == 7 && self.indefinite()
    }
}

/// `None` to keep going, `Some(status)` to return it.
type Step = Result<Option<Status>, DecodeError>;

fn short(src: &ByteBuffer) -> Step {
    need_input(src).map(Some)
}

fn bad(reason: &'static str) -> DecodeError {
    DecodeError::malformed(Format::Cbor, reason)
}

/// The head at the front of `src`, or `None` until all of it has arrived.
fn read_head(src: &ByteBuffer) -> Result<Option<Head>, DecodeError> {
    let Some(&initial) = src.readable().first() else {
        return need_input(src).map(|_| None);
    };
    let info = initial & 0x1F;
    let len = match info {
        0..=23 | 31 => 1,
        24 => 2,
        25 => 3,
        26 => 5,
        27 => 9,
        _ => return Err(bad("reserved additional information")),
    };
    let Some(bytes) = peek(src, len)? else {
        return Ok(None);
    };
    let arg = match len {
        1 => u64::from(info),
        _ => bytes[1..].iter().fold(0, |acc, &b| acc << 8 | u64::from(b)),
    };
    Ok(Some(Head {
        major: initial >> 5,
        info,
        arg,
        len,
    }))
}

/// Widens an IEEE 754 half-precision float, exactly.
fn f16_to_f64(half: u16) -> f64 {
    let sign = u64::from(half >> 15) << 63;
    let exp = u64::from((half >> 10) & 0x1F);
    let mant = u64::from(half & 0x3FF);
    match exp {
        0 => {
            let magnitude = f64::from(half & 0x3FF) / f64::from(1u32 << 24);
            if sign == 0 { magnitude } else { -magnitude }
        }
        0x1F => f64::from_bits(sign | 0x7FF << 52 | mant << 42),
        _ => f64::from_bits(sign | (exp + 1023 - 15) << 52 | mant << 42),
    }
}

fn emit(
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
    Ok(())
}

fn string_token(binary: bool, part: StringPart) -> TokenKind {
    if binary {
        TokenKind::Bytes(part)
    } else {
        TokenKind::String(part)
    }
}

/// Streaming RFC 8949 tokenizer.
///
/// Emits the same [`Token`]s as [`crate::json::JsonDecoder`], plus the binary
/// kinds: [`TokenKind::Scalar`] for numbers, `undefined` and simple values,
/// [`TokenKind::Bytes`] for byte strings and [`TokenKind::Tag`] for tags.
/// Every head is consumed whole, so the source buffer must hold at least
/// [`MIN_SRC_CAPACITY`] bytes. String payloads are emitted piecewise and can
/// be arbitrarily long; text strings must be valid UTF-8 chunk by chunk.
///
/// A definite-length string opens with a quote covering its head and
/// closes with an empty quote. An indefinite-length one opens with a quote
/// covering the `0x5F` or `0x7F` byte, marks each chunk head as
/// [`StringPart::Framing`] and closes with a quote covering the break. Arrays
/// and maps work the same way with structure tokens.
///
/// Without [`CborOptions::allow_multiple_values`] the decoder reports
/// [`crate::Note::EndOfData`] as soon as the top-level item is complete and
/// leaves whatever follows unread.
#[derive(Debug, Clone)]
pub struct CborDecoder {
    options: CborOptions,
    lex: Lex,
    stack: Vec<Container>,
    /// A tag was read and the item it annotates has not started.
    tagged: bool,
    /// Top-level items completed.
    items: u64,
    state: State,
    started: bool,
}

impl Default for CborDecoder {
    fn default() -> Self {
        Self::new(CborOptions::default())
    }
}

impl CborDecoder {
    /// A decoder expecting a top-level item.
    #[must_use]
    pub fn new(options: CborOptions) -> Self {
        Self {
            options,
            lex: Lex::Head,
            stack: Vec::new(),
            tagged: false,
            items: 0,
            state: State::Running,
            started: false,
        }
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> &CborOptions {
        &self.options
    }

    /// Current array and map depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn item_done(&mut self) {
        self.lex = Lex::Head;
        match self.stack.last_mut() {
            Some(top) => {
                top.odd = top.dict && !top.odd;
                if let Some(left) = &mut top.left {
                    *left = left.saturating_sub(1);
                }
            }
            None => self.items += 1,
        }
    }

    fn at_end(&self, src: &ByteBuffer) -> bool {
        if self.lex != Lex::Head || !self.stack.is_empty() || self.tagged {
            return false;
        }
        if self.options.allow_multiple_values {
            src.reader_len() == 0 && src.is_closed()
        } else {
            self.items > 0
        }
    }

    fn step(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer) -> DecodeResult {
        loop {
            if self.at_end(src) {
                trace!("cbor: {} items, end at {}", self.items, src.reader_position());
                return Ok(Status::END_OF_DATA);
            }
            if dst.writer_len() == 0 {
                return Ok(Status::SHORT_WRITE);
            }
            let step = match self.lex {
                Lex::Head => self.lex_head(dst, src)?,
                Lex::String { binary, left, chunked } => self.lex_string(dst, src, binary, left, chunked)?,
                Lex::Chunks { binary } => self.lex_chunks(dst, src, binary)?,
            };
            if let Some(status) = step {
                return Ok(status);
            }
        }
    }

    fn lex_head(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer) -> Step {
        if self.stack.last().is_some_and(|top| top.left == Some(0)) {
            return self.close(dst, src, 0);
        }
        let Some(head) = read_head(src)? else {
            return Ok(Some(Status::SHORT_READ));
        };
        if head.is_break() {
            return self.lex_break(dst, src);
        }
        if head.major != 6 {
            self.tagged = false;
        }
        match head.major {
            0 | 1 | 6 if head.indefinite() => Err(bad("bad indefinite length")),
            0 => self.scalar(dst, src, head, TokenKind::Scalar(Scalar::Unsigned(head.arg))),
            1 => self.scalar(dst, src, head, TokenKind::Scalar(Scalar::NegativeMinusOne(head.arg))),
            2 | 3 => {
                let binary = head.major == 2;
                emit(dst, src, string_token(binary, StringPart::Quote), head.len, true)?;
                self.lex = if head.indefinite() {
                    Lex::Chunks { binary }
                } else {
                    Lex::String {
                        binary,
                        left: head.arg,
                        chunked: false,
                    }
                };
                Ok(None)
            }
            4 | 5 => self.open(dst, src, head),
            6 => {
                emit(dst, src, TokenKind::Tag(head.arg), head.len, false)?;
                self.tagged = true;
                Ok(None)
            }
            _ => self.simple(dst, src, head),
        }
    }

    fn scalar(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, head: Head, kind: TokenKind) -> Step {
        emit(dst, src, kind, head.len, false)?;
        self.item_done();
        Ok(None)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn simple(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, head: Head) -> Step {
        let kind = match head.info {
            20 => TokenKind::Literal(Literal::False),
            21 => TokenKind::Literal(Literal::True),
            22 => TokenKind::Literal(Literal::Null),
            23 => TokenKind::Scalar(Scalar::Undefined),
            // One-byte simple values below 32 have a shorter encoding.
            24 if head.arg < 32 => return Err(bad("bad simple value")),
            0..=19 | 24 => TokenKind::Scalar(Scalar::Simple(head.arg as u8)),
            25 => TokenKind::Scalar(Scalar::Float(f16_to_f64(head.arg as u16).to_bits())),
            26 => TokenKind::Scalar(Scalar::Float(f64::from(f32::from_bits(head.arg as u32)).to_bits())),
            _ => TokenKind::Scalar(Scalar::Float(head.arg)),
        };
        self.scalar(dst, src, head, kind)
    }

    fn open(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, head: Head) -> Step {
        if self.stack.len() >= MAX_DEPTH as usize {
            return Err(DecodeError::unsupported(Format::Cbor, "recursion depth"));
        }
        let dict = head.major == 5;
        let left = match (head.indefinite(), dict) {
            (true, _) => None,
            (false, false) => Some(head.arg),
            (false, true) => Some(
                head.arg
                    .checked_mul(2)
                    .ok_or_else(|| DecodeError::unsupported(Format::Cbor, "map length"))?,
            ),
        };
        let kind = if dict { Structure::PushDict } else { Structure::PushList };
        emit(dst, src, TokenKind::Structure(kind), head.len, false)?;
        self.stack.push(Container { dict, left, odd: false });
        Ok(None)
    }

    fn close(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, len: usize) -> Step {
        let top = self.stack.pop().ok_or(InternalError::InconsistentState)?;
        let kind = if top.dict { Structure::PopDict } else { Structure::PopList };
        emit(dst, src, TokenKind::Structure(kind), len, false)?;
        self.item_done();
        Ok(None)
    }

    fn lex_break(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer) -> Step {
        let Some(top) = self.stack.last() else {
            return Err(bad("unexpected break"));
        };
        if top.left.is_some() {
            return Err(bad("unexpected break"));
        }
        if self.tagged {
            return Err(bad("tag before break"));
        }
        if top.odd {
            return Err(bad("odd map length"));
        }
        self.close(dst, src, 1)
    }

    fn lex_string(
        &mut self,
        dst: &mut TokenBuffer,
        src: &mut ByteBuffer,
        binary: bool,
        left: u64,
        chunked: bool,
    ) -> Step {
        if left == 0 {
            if chunked {
                self.lex = Lex::Chunks { binary };
            } else {
                emit(dst, src, string_token(binary, StringPart::Quote), 0, false)?;
                self.item_done();
            }
            return Ok(None);
        }
        let buf = src.readable();
        if buf.is_empty() {
            return short(src);
        }
        let limit = usize::try_from(left)
            .unwrap_or(usize::MAX)
            .min(buf.len())
            .min(MAX_TOKEN_LEN);
        let n = if binary {
            limit
        } else {
            match core::str::from_utf8(&buf[..limit]) {
                Ok(_) => limit,
                Err(e) if e.valid_up_to() > 0 => e.valid_up_to(),
                Err(e) if e.error_len().is_none() && (limit as u64) < left => return short(src),
                Err(_) => return Err(bad("bad UTF-8")),
            }
        };
        emit(dst, src, string_token(binary, StringPart::Copy), n, true)?;
        self.lex = Lex::String {
            binary,
            left: left - n as u64,
            chunked,
        };
        Ok(None)
    }

    fn lex_chunks(&mut self, dst: &mut TokenBuffer, src: &mut ByteBuffer, binary: bool) -> Step {
        let Some(head) = read_head(src)? else {
            return Ok(Some(Status::SHORT_READ));
        };
        if head.is_break() {
            emit(dst, src, string_token(binary, StringPart::Quote), 1, false)?;
            self.item_done();
            return Ok(None);
        }
        let major = if binary { 2 } else { 3 };
        if head.major != major || head.indefinite() {
            return Err(bad("bad string chunk"));
        }
        emit(dst, src, string_token(binary, StringPart::Framing), head.len, true)?;
        self.lex = Lex::String {
            binary,
            left: head.arg,
            chunked: true,
        };
        Ok(None)
    }
}

impl Decoder for CborDecoder {
    type Output = Token;

    fn set_quirk(&mut self, quirk: Quirk, enabled: bool) -> Result<(), DecodeError> {
        admit(quirk, self.started, &CBOR_QUIRKS)?;
        if quirk == Quirk::AllowMultipleValues {
            self.options.allow_multiple_values = enabled;
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
