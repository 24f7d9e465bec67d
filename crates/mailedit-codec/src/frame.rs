//! Message framing: header lines and body boundaries.
//!
//! [`Frame::parse`] performs the lexical scan only. It does not decode
//! bodies or header values; it hands back ordered raw header fields and
//! byte ranges into the input for every part.

use crate::codec::{LineEnding, TransferEncoding};
use crate::content_type::{ContentDisposition, ContentType};
use crate::error::{Error, Result};
use std::ops::Range;

/// Deepest multipart nesting that is split into children.
///
/// A multipart found below this depth is framed as a leaf; its body is kept
/// as raw bytes.
pub const MAX_DEPTH: usize = 100;

/// One framed header field, unfolded.
pub type HeaderLine = (String, String);

/// Layout of a part body inside the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyLayout {
    /// A leaf body: raw, still transfer-encoded bytes.
    Leaf(Range<usize>),
    /// A multipart container.
    Multipart {
        /// Boundary delimiter (without the leading `--`).
        boundary: String,
        /// Bytes before the first delimiter.
        preamble: Range<usize>,
        /// Child parts, in document order.
        parts: Vec<PartLayout>,
        /// Bytes after the close delimiter.
        epilogue: Range<usize>,
    },
}

/// Framed description of one MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartLayout {
    /// Header fields in document order.
    pub headers: Vec<HeaderLine>,
    /// Parsed `Content-Type`, defaulted when absent or unparsable.
    pub content_type: ContentType,
    /// Parsed `Content-Disposition`, if present and valid.
    pub disposition: Option<ContentDisposition>,
    /// Declared `Content-Transfer-Encoding`.
    pub transfer_encoding: TransferEncoding,
    /// Body layout.
    pub body: BodyLayout,
}

impl PartLayout {
    /// Returns the first value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Line ending used by the header block.
    pub line_ending: LineEnding,
    /// The top-level part; its headers are the message headers.
    pub root: PartLayout,
}

impl Frame {
    /// Frames a raw message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the input has no header block.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Malformed("empty input".to_string()));
        }

        let mut start = 0;
        // Tolerate a leading mbox separator line.
        if raw.starts_with(b"From ") {
            start = next_line(raw, 0, raw.len()).1;
        }

        let line_ending = detect_line_ending(&raw[start..]);
        let block = scan_headers(raw, start..raw.len());
        if block.headers.is_empty() {
            return Err(Error::Malformed(
                "no header/body boundary found".to_string(),
            ));
        }

        let root = build_part(raw, block, &ContentType::default(), 0);
        tracing::debug!(?line_ending, headers = root.headers.len(), "Framed message");
        Ok(Self { line_ending, root })
    }
}

struct HeaderBlock {
    headers: Vec<HeaderLine>,
    body: Range<usize>,
}

fn detect_line_ending(raw: &[u8]) -> LineEnding {
    match memchr::memchr(b'\n', raw) {
        Some(idx) if idx > 0 && raw[idx - 1] == b'\r' => LineEnding::CrLf,
        Some(_) => LineEnding::Lf,
        None => LineEnding::CrLf,
    }
}

/// Returns the line content end (before the terminator) and the start of
/// the next line.
fn next_line(raw: &[u8], pos: usize, end: usize) -> (usize, usize) {
    match memchr::memchr(b'\n', &raw[pos..end]) {
        Some(offset) => {
            let nl = pos + offset;
            let content_end = if nl > pos && raw[nl - 1] == b'\r' { nl - 1 } else { nl };
            (content_end, nl + 1)
        }
        None => (end, end),
    }
}

/// Checks that `name` can stand before the colon of a header field:
/// printable ASCII with no whitespace or `:`.
#[must_use]
pub fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}

fn scan_headers(raw: &[u8], range: Range<usize>) -> HeaderBlock {
    let mut headers: Vec<HeaderLine> = Vec::new();
    let mut pos = range.start;

    while pos < range.end {
        let (content_end, next) = next_line(raw, pos, range.end);
        let line = String::from_utf8_lossy(&raw[pos..content_end]);

        if line.is_empty() {
            return HeaderBlock {
                headers,
                body: next..range.end,
            };
        }

        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                let folded = line.trim();
                if !folded.is_empty() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(folded);
                }
                pos = next;
                continue;
            }
        }

        let field = line
            .split_once(':')
            .map(|(name, value)| (name.trim_end(), value.trim()))
            .filter(|(name, _)| is_field_name(name));
        let Some((name, value)) = field else {
            // Not a field: the body starts here.
            return HeaderBlock {
                headers,
                body: pos..range.end,
            };
        };
        headers.push((name.to_string(), value.to_string()));
        pos = next;
    }

    HeaderBlock {
        headers,
        body: range.end..range.end,
    }
}

fn header<'a>(headers: &'a [HeaderLine], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn build_part(
    raw: &[u8],
    block: HeaderBlock,
    default_type: &ContentType,
    depth: usize,
) -> PartLayout {
    let content_type = match header(&block.headers, "content-type").map(ContentType::parse) {
        Some(Ok(ct)) => ct,
        Some(Err(e)) => {
            tracing::debug!(?e, "Unparsable Content-Type, using default");
            default_type.clone()
        }
        None => default_type.clone(),
    };
    let disposition = header(&block.headers, "content-disposition")
        .and_then(|value| ContentDisposition::parse(value).ok());
    let transfer_encoding = header(&block.headers, "content-transfer-encoding")
        .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);

    let body = match content_type.boundary() {
        Some(boundary) if content_type.is_multipart() && depth >= MAX_DEPTH => {
            tracing::debug!(boundary, depth, "Multipart nested too deeply, framing as leaf");
            BodyLayout::Leaf(block.body)
        }
        Some(boundary) if content_type.is_multipart() => {
            let child_default = if content_type.sub_type == "digest" {
                ContentType::new("message", "rfc822")
            } else {
                ContentType::default()
            };
            split_multipart(raw, block.body, boundary, &child_default, depth)
        }
        _ => BodyLayout::Leaf(block.body),
    };

    PartLayout {
        headers: block.headers,
        content_type,
        disposition,
        transfer_encoding,
        body,
    }
}

struct Delimiter {
    start: usize,
    next: usize,
    close: bool,
}

/// Drops the line break that belongs to a following delimiter.
fn strip_trailing_break(raw: &[u8], start: usize, mut end: usize) -> usize {
    if end > start && raw[end - 1] == b'\n' {
        end -= 1;
        if end > start && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

fn find_delimiters(raw: &[u8], range: &Range<usize>, boundary: &str) -> Vec<Delimiter> {
    let mut delimiters = Vec::new();
    let mut pos = range.start;

    while pos < range.end {
        let (content_end, next) = next_line(raw, pos, range.end);
        let line = &raw[pos..content_end];
        if let Some(rest) = line
            .strip_prefix(b"--")
            .and_then(|l| l.strip_prefix(boundary.as_bytes()))
        {
            let close = rest.starts_with(b"--");
            let padding = if close { &rest[2..] } else { rest };
            if padding.iter().all(|&b| b == b' ' || b == b'\t') {
                delimiters.push(Delimiter {
                    start: pos,
                    next,
                    close,
                });
                if close {
                    break;
                }
            }
        }
        pos = next;
    }

    delimiters
}

fn split_multipart(
    raw: &[u8],
    body: Range<usize>,
    boundary: &str,
    child_default: &ContentType,
    depth: usize,
) -> BodyLayout {
    let delimiters = find_delimiters(raw, &body, boundary);
    let Some(first) = delimiters.first() else {
        tracing::debug!(boundary, "No delimiter found in multipart body");
        return BodyLayout::Multipart {
            boundary: boundary.to_string(),
            preamble: body.clone(),
            parts: Vec::new(),
            epilogue: body.end..body.end,
        };
    };

    let preamble = body.start..strip_trailing_break(raw, body.start, first.start);
    let mut parts = Vec::new();
    for (i, delimiter) in delimiters.iter().enumerate() {
        if delimiter.close {
            break;
        }
        let end = delimiters
            .get(i + 1)
            .map_or(body.end, |following| {
                strip_trailing_break(raw, delimiter.next, following.start)
            });
        let block = scan_headers(raw, delimiter.next..end);
        parts.push(build_part(raw, block, child_default, depth + 1));
    }

    let epilogue = match delimiters.last() {
        Some(last) if last.close => last.next..body.end,
        _ => body.end..body.end,
    };

    tracing::trace!(boundary, depth, parts = parts.len(), "Split multipart");
    BodyLayout::Multipart {
        boundary: boundary.to_string(),
        preamble,
        parts,
        epilogue,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn leaf<'a>(raw: &'a [u8], part: &PartLayout) -> &'a [u8] {
        match &part.body {
            BodyLayout::Leaf(range) => &raw[range.clone()],
            BodyLayout::Multipart { .. } => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_single_part() {
        let raw = b"From: a@example.com\r\nSubject: Hi\r\n\r\nHello\r\n";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.line_ending, LineEnding::CrLf);
        assert_eq!(frame.root.headers.len(), 2);
        assert_eq!(frame.root.header("subject"), Some("Hi"));
        assert!(frame.root.content_type.is("text/plain"));
        assert_eq!(leaf(raw, &frame.root), b"Hello\r\n");
    }

    #[test]
    fn test_folded_header_and_lf() {
        let raw = b"Subject: a\n  long\n\tsubject\nTo: b@example.com\n\nbody";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.line_ending, LineEnding::Lf);
        assert_eq!(frame.root.header("Subject"), Some("a long subject"));
        assert_eq!(leaf(raw, &frame.root), b"body");
    }

    #[test]
    fn test_headers_only() {
        let raw = b"Subject: none\r\n";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(leaf(raw, &frame.root), b"");
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(Frame::parse(b""), Err(Error::Malformed(_))));
        assert!(matches!(Frame::parse(b"\r\n\r\n"), Err(Error::Malformed(_))));
        assert!(matches!(
            Frame::parse(b"this is not a message\r\n"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_mbox_separator_skipped() {
        let raw = b"From a@b Sat Jan  3 01:05:34 1996\nSubject: x\n\nbody";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.root.header("subject"), Some("x"));
    }

    #[test]
    fn test_nested_multipart() {
        let raw = concat!(
            "Content-Type: multipart/related; boundary=outer\r\n",
            "\r\n",
            "preamble\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<b>html</b>\r\n",
            "--inner--\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: image/jpeg; name=kien.jpg\r\n",
            "Content-Disposition: inline; filename=kien.jpg\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "AAAA\r\n",
            "--outer--\r\n",
            "epilogue\r\n",
        )
        .as_bytes();
        let frame = Frame::parse(raw).unwrap();
        let BodyLayout::Multipart {
            boundary,
            preamble,
            parts,
            epilogue,
        } = &frame.root.body
        else {
            panic!("expected multipart");
        };
        assert_eq!(boundary, "outer");
        assert_eq!(&raw[preamble.clone()], b"preamble");
        assert_eq!(&raw[epilogue.clone()], b"epilogue\r\n");
        assert_eq!(parts.len(), 2);

        let BodyLayout::Multipart { parts: inner, .. } = &parts[0].body else {
            panic!("expected nested multipart");
        };
        assert_eq!(inner.len(), 2);
        assert_eq!(leaf(raw, &inner[0]), b"plain");
        assert_eq!(leaf(raw, &inner[1]), b"<b>html</b>");

        let image = &parts[1];
        assert!(image.content_type.is("image/jpeg"));
        assert_eq!(image.transfer_encoding, TransferEncoding::Base64);
        assert_eq!(
            image.disposition.as_ref().and_then(ContentDisposition::filename),
            Some("kien.jpg")
        );
        assert_eq!(leaf(raw, image), b"AAAA");
    }

    #[test]
    fn test_missing_close_delimiter() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\n\none\n--b\n\ntwo\n";
        let frame = Frame::parse(raw).unwrap();
        let BodyLayout::Multipart { parts, .. } = &frame.root.body else {
            panic!("expected multipart");
        };
        assert_eq!(parts.len(), 2);
        assert!(parts[0].headers.is_empty());
        assert_eq!(leaf(raw, &parts[0]), b"one");
        assert_eq!(leaf(raw, &parts[1]), b"two\n");
    }

    #[test]
    fn test_multipart_without_boundary_is_leaf() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        let frame = Frame::parse(raw).unwrap();
        assert!(matches!(frame.root.body, BodyLayout::Leaf(_)));
    }

    #[test]
    fn test_digest_children_default_to_rfc822() {
        let raw =
            b"Content-Type: multipart/digest; boundary=d\n\n--d\n\nSubject: inner\n\nx\n--d--\n";
        let frame = Frame::parse(raw).unwrap();
        let BodyLayout::Multipart { parts, .. } = &frame.root.body else {
            panic!("expected multipart");
        };
        assert!(parts[0].content_type.is("message/rfc822"));
    }

    #[test]
    fn test_nesting_capped_at_max_depth() {
        let levels = MAX_DEPTH + 50;
        let mut raw = String::new();
        for i in 0..levels {
            raw.push_str(&format!("Content-Type: multipart/mixed; boundary=b{i}\n\n--b{i}\n"));
        }
        raw.push_str("Content-Type: text/plain\n\nleaf\n");
        for i in (0..levels).rev() {
            raw.push_str(&format!("--b{i}--\n"));
        }

        let frame = Frame::parse(raw.as_bytes()).unwrap();
        let mut part = &frame.root;
        let mut containers = 0;
        while let BodyLayout::Multipart { parts, .. } = &part.body {
            containers += 1;
            part = &parts[0];
        }
        assert_eq!(containers, MAX_DEPTH);
        assert!(part.content_type.is_multipart());
        let body = leaf(raw.as_bytes(), part);
        assert!(body.starts_with(format!("--b{MAX_DEPTH}\n").as_bytes()));
        assert!(body.ends_with(format!("--b{MAX_DEPTH}--").as_bytes()));
    }
}
