//! Serialization of a part tree back to bytes.

use crate::address::{AddressHeader, format_address_list, parse_address_list};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::header::{Headers, key_matches};
use crate::part::{Body, Part, is_content_header};
use mailedit_codec::encoding::encode_rfc2047;
use mailedit_codec::{ContentDisposition, ContentType, LineEnding, codec, is_field_name};

/// Writes parts with a fixed line ending and configuration.
pub(crate) struct Writer<'a> {
    out: Vec<u8>,
    eol: &'static str,
    line_ending: LineEnding,
    config: &'a Config,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(line_ending: LineEnding, config: &'a Config) -> Self {
        Self {
            out: Vec::new(),
            eol: line_ending.as_str(),
            line_ending,
            config,
        }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.out
    }

    fn line(&mut self, text: &str) {
        self.out.extend_from_slice(text.as_bytes());
        self.out.extend_from_slice(self.eol.as_bytes());
    }

    fn headers(&mut self, headers: &Headers) {
        for (name, value) in headers.iter() {
            if !is_field_name(name) {
                tracing::warn!(name, "Skipping header with an invalid name");
                continue;
            }
            // Stored values are unfolded; stray breaks would inject fields.
            let value = value.replace(['\r', '\n'], " ");
            let value = if self.config.encode_headers && !value.is_ascii() {
                encode_header_value(name, &value)
            } else {
                value
            };
            let field = format!("{name}: {value}");
            let folded = fold(&field, self.config.fold_width, self.eol);
            self.line(&folded);
        }
    }

    pub(crate) fn part(&mut self, part: &Part) -> Result<()> {
        self.headers(&part.headers);
        self.out.extend_from_slice(self.eol.as_bytes());

        match &part.body {
            Body::Text { raw: Some(raw), .. } | Body::Binary(raw) => {
                self.out.extend_from_slice(raw);
            }
            Body::Text { text, raw: None } => {
                let encoded = codec::encode(
                    text,
                    part.transfer_encoding(),
                    part.mime().charset(),
                    self.line_ending,
                )?;
                tracing::trace!(
                    mime = %part.content_type(),
                    len = encoded.len(),
                    "Re-encoded text part"
                );
                self.out.extend_from_slice(&encoded);
            }
            Body::Multipart {
                preamble,
                children,
                epilogue,
            } => {
                if children.is_empty() {
                    // Nothing was framed: keep the body as found.
                    self.out.extend_from_slice(preamble);
                    self.out.extend_from_slice(epilogue);
                    return Ok(());
                }
                let boundary = part
                    .mime()
                    .boundary()
                    .ok_or_else(|| {
                        Error::Codec(mailedit_codec::Error::InvalidContentType(format!(
                            "{} without boundary",
                            part.content_type()
                        )))
                    })?
                    .to_string();

                if !preamble.is_empty() {
                    self.out.extend_from_slice(preamble);
                    self.out.extend_from_slice(self.eol.as_bytes());
                }
                for child in children {
                    self.line(&format!("--{boundary}"));
                    self.part(child)?;
                    self.out.extend_from_slice(self.eol.as_bytes());
                }
                self.line(&format!("--{boundary}--"));
                self.out.extend_from_slice(epilogue);
            }
        }
        Ok(())
    }
}

/// Makes a non-ASCII header value 7-bit clean.
///
/// Address headers only encode display names so the list stays parseable.
/// `Content-Type` and `Content-Disposition` are re-rendered with RFC 2231
/// parameters; encoded words are not allowed there. Other `Content-*`
/// values are left as they are.
fn encode_header_value(name: &str, value: &str) -> String {
    if is_content_header(name) {
        let rendered = if key_matches(name, "content-type") {
            ContentType::parse(value).map(|ct| ct.to_string()).ok()
        } else if key_matches(name, "content-disposition") {
            ContentDisposition::parse(value).map(|cd| cd.to_string()).ok()
        } else {
            None
        };
        return rendered.unwrap_or_else(|| value.to_string());
    }
    if AddressHeader::lookup(name).is_some() {
        let addresses: Vec<_> = parse_address_list(value)
            .into_iter()
            .map(|address| {
                address.map_name(|display| {
                    if display.is_ascii() {
                        display
                    } else {
                        encode_rfc2047(&display)
                    }
                })
            })
            .collect();
        return format_address_list(&addresses);
    }
    encode_rfc2047(value)
}

/// Folds a header field at whitespace so lines stay within `width` where
/// possible. `width == 0` disables folding.
fn fold(field: &str, width: usize, eol: &str) -> String {
    if width == 0 || field.len() <= width {
        return field.to_string();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    for (i, c) in field.char_indices() {
        if (c == ' ' || c == '\t') && i > start && !field[start..i].trim().is_empty() {
            chunks.push(&field[start..i]);
            start = i;
        }
    }
    chunks.push(&field[start..]);

    let mut out = String::with_capacity(field.len() + chunks.len() * eol.len());
    let mut current = 0;
    for chunk in chunks {
        if current > 0 && current + chunk.len() > width {
            out.push_str(eol);
            current = 0;
        }
        out.push_str(chunk);
        current += chunk.len();
    }
    out
}
