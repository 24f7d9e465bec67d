//! Transfer encodings: Base64, Quoted-Printable, and RFC 2047 encoded words.

use crate::codec::decode_charset;
use crate::error::Result;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use std::fmt::Write as _;

/// Maximum encoded line length for Base64 and Quoted-Printable bodies.
const MAX_LINE_LENGTH: usize = 76;

/// Maximum payload bytes per RFC 2047 encoded word (keeps words under 75 chars).
const MAX_WORD_BYTES: usize = 45;

/// Lenient decoder: accepts input with or without trailing padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64, wrapped at 76 columns.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8], line_ending: &str) -> String {
    let encoded = encode_base64(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2 + 2);
    for chunk in encoded.as_bytes().chunks(MAX_LINE_LENGTH) {
        // Base64 output is pure ASCII.
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str(line_ending);
    }
    out
}

/// Decodes Base64 data, ignoring embedded whitespace and missing padding.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT.decode(cleaned).map_err(Into::into)
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks in the input (`\n` or `\r\n`) become hard breaks using
/// `line_ending`; long lines get soft breaks.
#[must_use]
pub fn encode_quoted_printable(data: &[u8], line_ending: &str) -> String {
    let mut result = String::with_capacity(data.len() * 3 / 2);
    let mut line_length = 0;
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];

        if byte == b'\n' || (byte == b'\r' && data.get(i + 1) == Some(&b'\n')) {
            result.push_str(line_ending);
            line_length = 0;
            i += if byte == b'\r' { 2 } else { 1 };
            continue;
        }

        let at_line_end = match data.get(i + 1) {
            None | Some(b'\n') => true,
            Some(b'\r') => data.get(i + 2) == Some(&b'\n'),
            _ => false,
        };
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            // Trailing whitespace would be stripped in transit.
            b' ' | b'\t' => !at_line_end,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // Leave room for the soft-break '=' unless this is the last char on the line.
        let limit = if at_line_end { MAX_LINE_LENGTH } else { MAX_LINE_LENGTH - 1 };
        if line_length + width > limit {
            result.push('=');
            result.push_str(line_ending);
            line_length = 0;
        }

        if literal {
            result.push(byte as char);
        } else {
            let _ = write!(result, "={byte:02X}");
        }
        line_length += width;
        i += 1;
    }

    result
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Malformed escape sequences are passed through literally.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break, possibly with trailing whitespace before it.
        let mut j = i + 1;
        while j < data.len() && (data[j] == b' ' || data[j] == b'\t') {
            j += 1;
        }
        match data.get(j) {
            Some(b'\n') => {
                i = j + 1;
                continue;
            }
            Some(b'\r') if data.get(j + 1) == Some(&b'\n') => {
                i = j + 2;
                continue;
            }
            None => {
                i = j;
                continue;
            }
            _ => {}
        }

        let hex = data.get(i + 1..i + 3).and_then(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        });
        if let Some(decoded) = hex {
            result.push(decoded);
            i += 3;
        } else {
            result.push(b'=');
            i += 1;
        }
    }

    result
}

/// Encodes a header value as RFC 2047 UTF-8 B-encoded words.
///
/// Plain ASCII values that cannot be mistaken for encoded words are
/// returned unchanged.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.is_ascii() && !text.contains("=?") {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (idx, ch) in text.char_indices() {
        let next = idx + ch.len_utf8();
        if next - start > MAX_WORD_BYTES && end > start {
            words.push(format!("=?utf-8?B?{}?=", encode_base64(&text.as_bytes()[start..end])));
            start = end;
        }
        end = next;
    }
    if end > start {
        words.push(format!("=?utf-8?B?{}?=", encode_base64(&text.as_bytes()[start..end])));
    }
    words.join(" ")
}

/// Decodes a single RFC 2047 encoded word.
///
/// Returns `None` if `word` is not an encoded word or cannot be decoded.
#[must_use]
pub fn decode_encoded_word(word: &str) -> Option<String> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut parts = inner.splitn(3, '?');
    let charset = parts.next()?;
    let encoding = parts.next()?;
    let encoded_text = parts.next()?;
    if encoded_text.contains('?') {
        return None;
    }
    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded_text.as_bytes()).ok()?,
        "Q" | "q" => decode_quoted_printable(encoded_text.replace('_', " ").as_bytes()),
        _ => return None,
    };
    decode_charset(&bytes, Some(charset)).ok()
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between adjacent encoded words is dropped; everything else
/// is kept as-is.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    if !text.contains("=?") {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut pending_space = String::new();
    let mut last_encoded = false;
    let mut rest = text;

    while !rest.is_empty() {
        let trimmed = rest.trim_start();
        if trimmed.len() < rest.len() {
            pending_space.push_str(&rest[..rest.len() - trimmed.len()]);
            rest = trimmed;
            continue;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = &rest[..end];
        if let Some(decoded) = decode_encoded_word(word) {
            if !last_encoded {
                out.push_str(&pending_space);
            }
            out.push_str(&decoded);
            last_encoded = true;
        } else {
            out.push_str(&pending_space);
            out.push_str(word);
            last_encoded = false;
        }
        pending_space.clear();
        rest = &rest[end..];
    }
    out.push_str(&pending_space);
    out
}
