//! Body codec: transfer encodings plus charset transcoding.
//!
//! The document model only ever sees decoded text; everything byte-level
//! goes through [`decode`] and [`encode`].

use crate::encoding::{
    decode_base64, decode_quoted_printable, encode_base64_wrapped, encode_quoted_printable,
};
use crate::error::{Error, Result};
use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;
use std::fmt;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Returns the canonical header token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::Binary => "binary",
        }
    }

    /// Checks if bodies in this encoding must be pure ASCII.
    #[must_use]
    pub const fn is_seven_bit(self) -> bool {
        matches!(self, Self::SevenBit | Self::Base64 | Self::QuotedPrintable)
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line terminator used when framing or re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// `\r\n`, as RFC 5322 requires on the wire.
    #[default]
    CrLf,
    /// Bare `\n`, as found in mbox files and local spools.
    Lf,
}

impl LineEnding {
    /// Returns the terminator bytes as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CrLf => "\r\n",
            Self::Lf => "\n",
        }
    }
}

fn is_ascii_label(label: &str) -> bool {
    matches!(
        label.trim().to_ascii_lowercase().as_str(),
        "us-ascii" | "ascii" | "iso646-us" | "ansi_x3.4-1968" | "646"
    )
}

fn lookup(charset: &str) -> Result<&'static Encoding> {
    Encoding::for_label(charset.trim().as_bytes())
        .ok_or_else(|| Error::UnknownCharset(charset.to_string()))
}

/// Transcodes bytes in `charset` (UTF-8 when absent) to a string.
///
/// Malformed sequences become U+FFFD.
///
/// # Errors
///
/// Returns an error if the charset label is unknown.
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> Result<String> {
    let encoding = match charset {
        Some(label) if is_ascii_label(label) => UTF_8,
        Some(label) => lookup(label)?,
        None => UTF_8,
    };
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        tracing::trace!(charset = encoding.name(), "Replaced malformed sequences");
    }
    Ok(text.into_owned())
}

/// Transcodes a string to `charset` (UTF-8 when absent).
///
/// # Errors
///
/// Returns an error if the charset is unknown or cannot represent `text`.
pub fn encode_charset<'a>(text: &'a str, charset: Option<&str>) -> Result<Cow<'a, [u8]>> {
    let Some(label) = charset else {
        return Ok(Cow::Borrowed(text.as_bytes()));
    };
    if is_ascii_label(label) {
        return if text.is_ascii() {
            Ok(Cow::Borrowed(text.as_bytes()))
        } else {
            Err(Error::Unrepresentable(label.to_string()))
        };
    }
    let (bytes, _, had_errors) = lookup(label)?.encode(text);
    if had_errors {
        return Err(Error::Unrepresentable(label.to_string()));
    }
    Ok(bytes)
}

/// Checks whether `charset` is known and can represent `text`.
#[must_use]
pub fn can_encode(text: &str, charset: &str) -> bool {
    encode_charset(text, Some(charset)).is_ok()
}

/// Decodes a raw body into text.
///
/// # Errors
///
/// Returns an error if the transfer encoding cannot be undone or the
/// charset is unknown.
pub fn decode(raw: &[u8], encoding: TransferEncoding, charset: Option<&str>) -> Result<String> {
    tracing::trace!(%encoding, ?charset, len = raw.len(), "Decoding body");
    let bytes: Cow<'_, [u8]> = match encoding {
        TransferEncoding::Base64 => Cow::Owned(decode_base64(raw)?),
        TransferEncoding::QuotedPrintable => Cow::Owned(decode_quoted_printable(raw)),
        _ => Cow::Borrowed(raw),
    };
    decode_charset(&bytes, charset)
}

/// Encodes text into a raw body.
///
/// The result carries no trailing line break; the framer adds the one
/// that precedes the next boundary delimiter.
///
/// # Errors
///
/// Returns an error if the charset is unknown, cannot represent `text`,
/// or the text is not 7-bit clean for a 7bit part.
pub fn encode(
    text: &str,
    encoding: TransferEncoding,
    charset: Option<&str>,
    line_ending: LineEnding,
) -> Result<Vec<u8>> {
    tracing::trace!(%encoding, ?charset, len = text.len(), "Encoding body");
    let bytes = encode_charset(text, charset)?;
    let eol = line_ending.as_str();

    let encoded = match encoding {
        TransferEncoding::Base64 => {
            let mut wrapped = encode_base64_wrapped(&bytes, eol);
            wrapped.truncate(wrapped.trim_end_matches(eol).len());
            wrapped.into_bytes()
        }
        TransferEncoding::QuotedPrintable => encode_quoted_printable(&bytes, eol).into_bytes(),
        // Base64 and quoted-printable are handled above; what is left of the
        // 7-bit family is 7bit itself.
        other if other.is_seven_bit() && !bytes.is_ascii() => {
            return Err(Error::InvalidBody {
                encoding: other.to_string(),
                reason: "8-bit data in a 7bit body".to_string(),
            });
        }
        _ => normalize_line_endings(&bytes, line_ending),
    };
    Ok(encoded)
}

/// Rewrites every `\n` / `\r\n` to the given line ending.
#[must_use]
pub fn normalize_line_endings(bytes: &[u8], line_ending: LineEnding) -> Vec<u8> {
    let eol = line_ending.as_str().as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 32);
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                out.extend_from_slice(eol);
                i += 2;
            }
            b'\n' => {
                out.extend_from_slice(eol);
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_is_seven_bit() {
        assert!(TransferEncoding::SevenBit.is_seven_bit());
        assert!(TransferEncoding::Base64.is_seven_bit());
        assert!(TransferEncoding::QuotedPrintable.is_seven_bit());
        assert!(!TransferEncoding::EightBit.is_seven_bit());
        assert!(!TransferEncoding::Binary.is_seven_bit());
    }

    #[test]
    fn test_decode_charset() {
        assert_eq!(decode_charset(b"caf\xe9", Some("iso-8859-1")).unwrap(), "café");
        assert_eq!(decode_charset("café".as_bytes(), None).unwrap(), "café");
        assert!(matches!(
            decode_charset(b"x", Some("x-no-such-charset")),
            Err(Error::UnknownCharset(_))
        ));
    }

    #[test]
    fn test_encode_charset_rejects_unrepresentable() {
        assert!(can_encode("café", "iso-8859-1"));
        assert!(!can_encode("café", "us-ascii"));
        assert!(!can_encode("スラング", "iso-8859-1"));
        assert!(!can_encode("x", "x-no-such-charset"));
    }

    #[test]
    fn test_decode_quoted_printable_latin1() {
        let text = decode(b"caf=E9=\r\n!", TransferEncoding::QuotedPrintable, Some("iso-8859-1"))
            .unwrap();
        assert_eq!(text, "café!");
    }

    #[test]
    fn test_decode_bad_base64_is_error() {
        let err = decode(b"@@@", TransferEncoding::Base64, None).unwrap_err();
        assert_eq!(err.subject(), Some("base64"));
    }

    #[test]
    fn test_encode_base64_has_no_trailing_break() {
        let raw = encode("hello", TransferEncoding::Base64, Some("utf-8"), LineEnding::CrLf)
            .unwrap();
        assert_eq!(raw, b"aGVsbG8=");
    }

    #[test]
    fn test_encode_seven_bit_rejects_non_ascii() {
        let err = encode("héllo", TransferEncoding::SevenBit, None, LineEnding::CrLf).unwrap_err();
        assert_eq!(err.subject(), Some("7bit"));
    }

    #[test]
    fn test_encode_eight_bit_normalizes_breaks() {
        let raw = encode("a\nb\r\nc", TransferEncoding::EightBit, None, LineEnding::CrLf).unwrap();
        assert_eq!(raw, b"a\r\nb\r\nc");
    }

    #[test]
    fn test_encode_decode_text_roundtrip_through_qp() {
        let text = "my replaced всякий текст スラングまで幅広く収録 (1)";
        let raw = encode(text, TransferEncoding::QuotedPrintable, Some("utf-8"), LineEnding::Lf)
            .unwrap();
        assert!(raw.is_ascii());
        let back = decode(&raw, TransferEncoding::QuotedPrintable, Some("utf-8")).unwrap();
        assert_eq!(back, text);
    }
}
