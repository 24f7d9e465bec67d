//! MIME content type and disposition handling.

use crate::codec::decode_charset;
use crate::error::{Error, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::collections::BTreeMap;
use std::fmt;

/// Characters left bare in RFC 2231 extended parameter values.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Ordered parameter map (`charset`, `boundary`, `filename`, ...).
pub type Parameters = BTreeMap<String, String>;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: Parameters,
}

impl Default for ContentType {
    /// `text/plain; charset=us-ascii`, the RFC 2045 default.
    fn default() -> Self {
        Self::new("text", "plain").with_parameter("charset", "us-ascii")
    }
}

impl ContentType {
    /// Creates a new content type. Type and subtype are lowercased.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into().to_ascii_lowercase(),
            sub_type: sub_type.into().to_ascii_lowercase(),
            parameters: Parameters::new(),
        }
    }

    /// Creates a text/plain content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "utf-8")
    }

    /// Creates a text/html content type.
    #[must_use]
    pub fn text_html() -> Self {
        Self::new("text", "html").with_parameter("charset", "utf-8")
    }

    /// Creates a multipart/alternative content type with boundary.
    #[must_use]
    pub fn multipart_alternative(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "alternative").with_parameter("boundary", boundary)
    }

    /// Adds a parameter. The name is lowercased.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(key, value);
        self
    }

    /// Inserts or replaces a parameter.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters
            .insert(key.into().to_ascii_lowercase(), value.into());
    }

    /// Returns a parameter by (case-insensitive) name.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `type/subtype`.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Checks the type against a `type/subtype` string, ignoring case.
    #[must_use]
    pub fn is(&self, mime_type: &str) -> bool {
        mime_type.split_once('/').is_some_and(|(main, sub)| {
            self.main_type.eq_ignore_ascii_case(main) && self.sub_type.eq_ignore_ascii_case(sub)
        })
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary").filter(|b| !b.is_empty())
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_parameters(s).into_iter();

        let type_str = segments.next().unwrap_or_default();
        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("Missing subtype in {s:?}")))?;
        let (main_type, sub_type) = (main_type.trim(), sub_type.trim());
        if main_type.is_empty()
            || sub_type.is_empty()
            || !is_token(main_type)
            || !is_token(sub_type)
        {
            return Err(Error::InvalidContentType(format!("Invalid type in {s:?}")));
        }

        let mut content_type = Self::new(main_type, sub_type);
        content_type.parameters = parse_parameters(segments);
        Ok(content_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;
        write_parameters(f, &self.parameters)
    }
}

/// MIME content disposition (`inline`, `attachment`) with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercased.
    pub kind: String,
    /// Parameters (e.g., filename).
    pub parameters: Parameters,
}

impl ContentDisposition {
    /// Creates a disposition of the given kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into().to_ascii_lowercase(),
            parameters: Parameters::new(),
        }
    }

    /// Parses a `Content-Disposition` value.
    ///
    /// # Errors
    ///
    /// Returns an error if the disposition type is empty.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_parameters(s).into_iter();
        let kind = segments.next().unwrap_or_default();
        let kind = kind.trim();
        if kind.is_empty() || !is_token(kind) {
            return Err(Error::InvalidContentType(format!(
                "Invalid disposition {s:?}"
            )));
        }
        let mut disposition = Self::new(kind);
        disposition.parameters = parse_parameters(segments);
        Ok(disposition)
    }

    /// Checks if the disposition type is `attachment`.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.kind == "attachment"
    }

    /// Returns the filename parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters
            .get("filename")
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        write_parameters(f, &self.parameters)
    }
}

fn is_token(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
}

fn write_parameters(f: &mut fmt::Formatter<'_>, parameters: &Parameters) -> fmt::Result {
    for (key, value) in parameters {
        if !value.is_ascii() {
            let encoded = utf8_percent_encode(value, ATTR_CHAR);
            write!(f, "; {key}*=utf-8''{encoded}")?;
        } else if needs_quoting(value) {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            write!(f, "; {key}=\"{escaped}\"")?;
        } else {
            write!(f, "; {key}={value}")?;
        }
    }
    Ok(())
}

/// Splits a header value on `;`, ignoring separators inside quoted strings.
fn split_parameters(s: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    let Some(inner) = value
        .strip_prefix('"')
        .map(|v| v.strip_suffix('"').unwrap_or(v))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// One RFC 2231 continuation segment.
struct Section {
    index: u32,
    extended: bool,
    value: String,
}

/// Parses `key=value` segments, folding RFC 2231 continuations and
/// extended values into plain parameters.
fn parse_parameters(segments: impl Iterator<Item = String>) -> Parameters {
    let mut parameters = Parameters::new();
    let mut sections: BTreeMap<String, Vec<Section>> = BTreeMap::new();

    for segment in segments {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        let value = unquote(value);

        let (name, extended) = key
            .strip_suffix('*')
            .map_or((key.as_str(), false), |name| (name, true));
        match name.rsplit_once('*') {
            Some((base, index)) if index.bytes().all(|b| b.is_ascii_digit()) => {
                let index = index.parse().unwrap_or(u32::MAX);
                sections.entry(base.to_string()).or_default().push(Section {
                    index,
                    extended,
                    value,
                });
            }
            _ if extended => {
                let decoded = decode_extended_value(&value);
                parameters.insert(name.to_string(), decoded);
            }
            _ => {
                parameters.entry(name.to_string()).or_insert(value);
            }
        }
    }

    for (name, mut parts) in sections {
        parts.sort_by_key(|section| section.index);
        let charset_section = parts.first().is_some_and(|s| s.index == 0 && s.extended);
        let mut raw = String::new();
        let mut charset = None;
        for (i, section) in parts.iter().enumerate() {
            if section.extended {
                let mut value = section.value.as_str();
                if i == 0 && charset_section {
                    if let Some((cs, rest)) = split_charset_prefix(value) {
                        charset = Some(cs.to_string());
                        value = rest;
                    }
                }
                raw.push_str(value);
            } else {
                raw.extend(utf8_percent_encode(&section.value, ATTR_CHAR));
            }
        }
        let bytes: Vec<u8> = percent_decode_str(&raw).collect();
        parameters.insert(name, decode_bytes(&bytes, charset.as_deref()));
    }

    parameters
}

fn split_charset_prefix(value: &str) -> Option<(&str, &str)> {
    let (charset, rest) = value.split_once('\'')?;
    let (_language, rest) = rest.split_once('\'')?;
    Some((charset, rest))
}

fn decode_extended_value(value: &str) -> String {
    let (charset, encoded) =
        split_charset_prefix(value).map_or((None, value), |(cs, rest)| (Some(cs), rest));
    let bytes: Vec<u8> = percent_decode_str(encoded).collect();
    decode_bytes(&bytes, charset)
}

fn decode_bytes(bytes: &[u8], charset: Option<&str>) -> String {
    let charset = charset.filter(|cs| !cs.is_empty());
    decode_charset(bytes, charset)
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new_lowercases() {
        let ct = ContentType::new("Text", "PLAIN");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
        assert_eq!(ct.mime_type(), "text/plain");
    }

    #[test]
    fn test_default_is_us_ascii_text() {
        let ct = ContentType::default();
        assert!(ct.is("text/plain"));
        assert_eq!(ct.charset(), Some("us-ascii"));
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/HTML; Charset=utf-8").unwrap();
        assert_eq!(ct.mime_type(), "text/html");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert!(ct.is_text());
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
    }

    #[test]
    fn test_quoted_semicolon_does_not_split() {
        let ct = ContentType::parse("image/jpeg; name=\"a;b.jpg\"; x=1").unwrap();
        assert_eq!(ct.parameter("name"), Some("a;b.jpg"));
        assert_eq!(ct.parameter("x"), Some("1"));
    }

    #[test]
    fn test_content_type_parse_rejects_missing_subtype() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
    }

    #[test]
    fn test_rfc2231_extended_parameter() {
        let d = ContentDisposition::parse("attachment; filename*=utf-8''na%C3%AFve.txt").unwrap();
        assert_eq!(d.filename(), Some("naïve.txt"));
    }

    #[test]
    fn test_rfc2231_continuations() {
        let d = ContentDisposition::parse(
            "attachment; filename*0*=utf-8''caf%C3%A9; filename*1=\" menu.pdf\"",
        )
        .unwrap();
        assert_eq!(d.filename(), Some("café menu.pdf"));
    }

    #[test]
    fn test_disposition_parse() {
        let d = ContentDisposition::parse("INLINE; filename=\"kien.jpg\"").unwrap();
        assert_eq!(d.kind, "inline");
        assert!(!d.is_attachment());
        assert_eq!(d.filename(), Some("kien.jpg"));
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::multipart_alternative("b 1").with_parameter("charset", "utf-8");
        assert_eq!(
            ct.to_string(),
            "multipart/alternative; boundary=\"b 1\"; charset=utf-8"
        );
    }

    #[test]
    fn test_display_non_ascii_parameter() {
        let mut d = ContentDisposition::new("attachment");
        d.parameters.insert("filename".into(), "naïve.txt".into());
        assert_eq!(d.to_string(), "attachment; filename*=utf-8''na%C3%AFve.txt");
        assert_eq!(
            ContentDisposition::parse(&d.to_string()).unwrap().filename(),
            Some("naïve.txt")
        );
    }
}
