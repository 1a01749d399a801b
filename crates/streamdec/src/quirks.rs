//! Named leniency toggles.
//!
//! Every decoder is strict by default. A [`Quirk`] relaxes (or, for
//! [`Quirk::ImageBoundsAreStrict`], tightens) exactly one rule and implies
//! nothing about the others. Quirks must be set before the first decode call;
//! later attempts fail with [`DecodeError::BadCallSequence`]. A quirk that the
//! receiving decoder never consults is rejected with
//! [`DecodeError::UnsupportedOption`] rather than silently ignored, and names
//! that do not parse are rejected with [`UnknownQuirk`].

use core::{fmt, str::FromStr};

use thiserror::Error;

use crate::error::DecodeError;

/// A single leniency toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Quirk {
    /// zlib, gzip: skip verification of the trailing checksum (and, for gzip,
    /// the length).
    IgnoreChecksum,
    /// JSON: accept `/* ... */` comments wherever whitespace is allowed.
    AllowCommentBlock,
    /// JSON: accept `// ...` comments running to the end of the line.
    AllowCommentLine,
    /// JSON: accept one comma before a closing `]` or `}`.
    AllowExtraComma,
    /// JSON: accept `Infinity`, `Inf` and `NaN` (any case, optional sign) as
    /// numbers.
    AllowInfNanNumbers,
    /// JSON: skip a UTF-8 byte order mark at the very start of the input.
    AllowLeadingByteOrderMark,
    /// JSON: accept `\xHH` escapes in strings, each standing for one byte.
    AllowBackslashX,
    /// JSON: replace invalid UTF-8 and lone surrogate escapes with U+FFFD
    /// instead of failing.
    ReplaceInvalidUnicode,
    /// JSON: accept a sequence of top-level values instead of exactly one.
    AllowMultipleValues,
    /// GIF: fill the canvas with the palette's background color rather than
    /// transparent black.
    HonorBackgroundColor,
    /// GIF: drop LZW output that overflows the frame instead of failing.
    IgnoreTooMuchPixelData,
    /// GIF: keep the image size from the screen descriptor even when the
    /// first frame extends past it.
    ImageBoundsAreStrict,
}

/// Every quirk, in declaration order.
pub const ALL_QUIRKS: [Quirk; 12] = [
    Quirk::IgnoreChecksum,
    Quirk::AllowCommentBlock,
    Quirk::AllowCommentLine,
    Quirk::AllowExtraComma,
    Quirk::AllowInfNanNumbers,
    Quirk::AllowLeadingByteOrderMark,
    Quirk::AllowBackslashX,
    Quirk::ReplaceInvalidUnicode,
    Quirk::AllowMultipleValues,
    Quirk::HonorBackgroundColor,
    Quirk::IgnoreTooMuchPixelData,
    Quirk::ImageBoundsAreStrict,
];

impl Quirk {
    /// The stable kebab-case name accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Quirk::IgnoreChecksum => "ignore-checksum",
            Quirk::AllowCommentBlock => "allow-comment-block",
            Quirk::AllowCommentLine => "allow-comment-line",
            Quirk::AllowExtraComma => "allow-extra-comma",
            Quirk::AllowInfNanNumbers => "allow-inf-nan-numbers",
            Quirk::AllowLeadingByteOrderMark => "allow-leading-byte-order-mark",
            Quirk::AllowBackslashX => "allow-backslash-x",
            Quirk::ReplaceInvalidUnicode => "replace-invalid-unicode",
            Quirk::AllowMultipleValues => "allow-multiple-values",
            Quirk::HonorBackgroundColor => "honor-background-color",
            Quirk::IgnoreTooMuchPixelData => "ignore-too-much-pixel-data",
            Quirk::ImageBoundsAreStrict => "image-bounds-are-strict",
        }
    }

    const fn bit(self) -> u16 {
        1 << (self as u8)
    }
}

impl fmt::Display for Quirk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A quirk name that matches nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown quirk {0:?}")]
pub struct UnknownQuirk(pub alloc::string::String);

impl FromStr for Quirk {
    type Err = UnknownQuirk;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_QUIRKS
            .into_iter()
            .find(|q| q.name() == s)
            .ok_or_else(|| UnknownQuirk(s.into()))
    }
}

/// A set of enabled quirks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quirks(u16);

impl Quirks {
    /// No quirks enabled.
    pub const NONE: Quirks = Quirks(0);

    /// Whether `quirk` is enabled.
    #[must_use]
    pub const fn contains(self, quirk: Quirk) -> bool {
        self.0 & quirk.bit() != 0
    }

    /// Turns `quirk` on or off.
    pub fn set(&mut self, quirk: Quirk, enabled: bool) {
        if enabled {
            self.0 |= quirk.bit();
        } else {
            self.0 &= !quirk.bit();
        }
    }

    /// Iterates over the enabled quirks in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Quirk> {
        ALL_QUIRKS.into_iter().filter(move |q| self.contains(*q))
    }
}

impl FromIterator<Quirk> for Quirks {
    fn from_iter<I: IntoIterator<Item = Quirk>>(iter: I) -> Self {
        let mut quirks = Quirks::NONE;
        for q in iter {
            quirks.set(q, true);
        }
        quirks
    }
}

/// The common admission check every decoder runs in `set_quirk`.
pub(crate) fn admit(quirk: Quirk, started: bool, consulted: &[Quirk]) -> Result<(), DecodeError> {
    if started {
        return Err(DecodeError::BadCallSequence);
    }
    if !consulted.contains(&quirk) {
        return Err(DecodeError::UnsupportedOption(quirk));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use rstest::rstest;

    use super::*;

    #[test]
    fn names_roundtrip() {
        for q in ALL_QUIRKS {
            assert_eq!(q.to_string().parse::<Quirk>(), Ok(q));
        }
    }

    #[rstest]
    #[case("")]
    #[case("allow_comment_block")]
    #[case("Allow-Comment-Block")]
    #[case("allow-everything")]
    fn unknown_names_are_rejected(#[case] name: &str) {
        assert_eq!(name.parse::<Quirk>(), Err(UnknownQuirk(name.into())));
    }

    #[test]
    fn set_is_independent() {
        let mut quirks = Quirks::NONE;
        quirks.set(Quirk::AllowExtraComma, true);
        quirks.set(Quirk::IgnoreChecksum, true);
        quirks.set(Quirk::AllowExtraComma, false);
        assert_eq!(quirks.iter().collect::<alloc::vec::Vec<_>>(), [Quirk::IgnoreChecksum]);
    }

    #[test]
    fn admit_rules() {
        let consulted = [Quirk::IgnoreChecksum];
        assert_eq!(admit(Quirk::IgnoreChecksum, false, &consulted), Ok(()));
        assert_eq!(
            admit(Quirk::AllowCommentLine, false, &consulted),
            Err(DecodeError::UnsupportedOption(Quirk::AllowCommentLine))
        );
        assert_eq!(
            admit(Quirk::IgnoreChecksum, true, &consulted),
            Err(DecodeError::BadCallSequence)
        );
    }
}
