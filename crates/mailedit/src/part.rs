//! MIME part tree nodes.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::header::{Headers, key_matches};
use crate::walk::walk;
use mailedit_codec::encoding::decode_rfc2047;
use mailedit_codec::{
    BodyLayout, ContentDisposition, ContentType, Parameters, PartLayout, TransferEncoding, codec,
};
use std::ops::{Deref, DerefMut};

static NO_PARAMETERS: Parameters = Parameters::new();

/// Checks if a header describes the part content (`Content-*`).
#[must_use]
pub fn is_content_header(name: &str) -> bool {
    name.len() > 8 && name.get(..8).is_some_and(|prefix| key_matches(prefix, "content-"))
}

/// Body of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Body {
    /// Decoded text; `raw` holds the original encoded bytes until the text changes.
    Text { text: String, raw: Option<Vec<u8>> },
    /// Opaque, still transfer-encoded bytes.
    Binary(Vec<u8>),
    /// Container of child parts.
    Multipart {
        preamble: Vec<u8>,
        children: Vec<Part>,
        epilogue: Vec<u8>,
    },
}

/// One node of the MIME tree: a leaf with content or a multipart container.
///
/// The top-level part of a message carries the message headers; nested
/// parts carry their own MIME headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub(crate) headers: Headers,
    content_type: ContentType,
    disposition: Option<ContentDisposition>,
    transfer_encoding: TransferEncoding,
    pub(crate) body: Body,
}

impl Part {
    /// Creates a new text leaf.
    ///
    /// The charset is set to UTF-8 and the transfer encoding to
    /// quoted-printable when `text` is not plain ASCII.
    #[must_use]
    pub fn new_text(content_type: ContentType, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut content_type = content_type;
        let transfer_encoding = if text.is_ascii() {
            TransferEncoding::SevenBit
        } else {
            content_type.set_parameter("charset", "utf-8");
            TransferEncoding::QuotedPrintable
        };

        let headers = [
            ("Content-Type", content_type.to_string()),
            ("Content-Transfer-Encoding", transfer_encoding.to_string()),
        ]
        .into_iter()
        .collect();

        Self {
            headers,
            content_type,
            disposition: None,
            transfer_encoding,
            body: Body::Text { text, raw: None },
        }
    }

    /// Creates a multipart container. `content_type` must carry a boundary.
    #[must_use]
    pub(crate) fn new_multipart(
        content_type: ContentType,
        headers: Headers,
        children: Vec<Self>,
    ) -> Self {
        Self {
            headers,
            content_type,
            disposition: None,
            transfer_encoding: TransferEncoding::SevenBit,
            body: Body::Multipart {
                preamble: Vec::new(),
                children,
                epilogue: Vec::new(),
            },
        }
    }

    /// Builds a part from its framed layout, decoding text leaves.
    pub(crate) fn from_layout(raw: &[u8], layout: PartLayout, config: &Config) -> Result<Self> {
        let PartLayout {
            headers,
            mut content_type,
            mut disposition,
            transfer_encoding,
            body,
        } = layout;

        decode_parameter(&mut content_type.parameters, "name");
        if let Some(disposition) = disposition.as_mut() {
            decode_parameter(&mut disposition.parameters, "filename");
        }

        let body = match body {
            BodyLayout::Leaf(range) => {
                let bytes = raw[range].to_vec();
                if content_type.is_text() {
                    let text = decode_text(&bytes, transfer_encoding, &content_type, config)?;
                    Body::Text {
                        text,
                        raw: Some(bytes),
                    }
                } else {
                    Body::Binary(bytes)
                }
            }
            BodyLayout::Multipart {
                preamble,
                parts,
                epilogue,
                ..
            } => Body::Multipart {
                preamble: raw[preamble].to_vec(),
                children: parts
                    .into_iter()
                    .map(|child| Self::from_layout(raw, child, config))
                    .collect::<Result<_>>()?,
                epilogue: raw[epilogue].to_vec(),
            },
        };

        Ok(Self {
            headers: headers.into_iter().collect(),
            content_type,
            disposition,
            transfer_encoding,
            body,
        })
    }

    /// Returns the part headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the part headers for modification.
    ///
    /// Changes to `Content-Type`, `Content-Disposition` or
    /// `Content-Transfer-Encoding` take effect when the returned guard is
    /// dropped.
    pub fn headers_mut(&mut self) -> HeadersMut<'_> {
        HeadersMut { part: self }
    }

    /// Returns the MIME type (`type/subtype`), lowercase.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.content_type.mime_type()
    }

    /// Returns the structured content type.
    #[must_use]
    pub fn mime(&self) -> &ContentType {
        &self.content_type
    }

    /// Returns the content type parameters.
    #[must_use]
    pub fn content_type_params(&self) -> &Parameters {
        &self.content_type.parameters
    }

    /// Returns the disposition type (`inline`, `attachment`), if any.
    #[must_use]
    pub fn disposition(&self) -> Option<&str> {
        self.disposition.as_ref().map(|d| d.kind.as_str())
    }

    /// Returns the disposition parameters (empty without a disposition).
    #[must_use]
    pub fn disposition_params(&self) -> &Parameters {
        self.disposition
            .as_ref()
            .map_or(&NO_PARAMETERS, |d| &d.parameters)
    }

    /// Returns the declared transfer encoding.
    #[must_use]
    pub const fn transfer_encoding(&self) -> TransferEncoding {
        self.transfer_encoding
    }

    /// Checks if the top-level type is `text`.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.content_type.is_text()
    }

    /// Checks if this is a multipart container.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart { .. })
    }

    /// Checks if this part is an attachment.
    ///
    /// True for `Content-Disposition: attachment`, or for a named part
    /// that is not readable `text/plain` / `text/html` content.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        if self.is_multipart() {
            return false;
        }
        if self
            .disposition
            .as_ref()
            .is_some_and(ContentDisposition::is_attachment)
        {
            return true;
        }
        self.filename().is_some()
            && !(self.content_type.is("text/plain") || self.content_type.is("text/html"))
    }

    /// Returns the filename from the disposition, falling back to the
    /// content type `name` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.disposition
            .as_ref()
            .and_then(ContentDisposition::filename)
            .or_else(|| self.content_type.parameter("name"))
            .filter(|name| !name.is_empty())
    }

    /// Returns the decoded text of a text leaf.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Body::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Replaces the text of a text leaf.
    ///
    /// The leaf is re-encoded on export. When the declared charset cannot
    /// represent `value` the part switches to UTF-8, and a 7bit part
    /// receiving non-ASCII text switches to quoted-printable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotTextPart`] for non-text parts.
    pub fn set_text(&mut self, value: impl Into<String>) -> Result<()> {
        if !matches!(self.body, Body::Text { .. }) {
            return Err(Error::NotTextPart(self.content_type()));
        }
        let value = value.into();

        let charset_ok = match self.content_type.charset() {
            Some(charset) => codec::can_encode(&value, charset),
            None => value.is_ascii(),
        };
        let mut retyped = false;
        if !charset_ok {
            tracing::debug!(
                charset = ?self.content_type.charset(),
                "Upgrading text part to utf-8"
            );
            self.content_type.set_parameter("charset", "utf-8");
            retyped = true;
        }
        if !value.is_ascii()
            && matches!(
                self.transfer_encoding,
                TransferEncoding::SevenBit | TransferEncoding::Binary
            )
        {
            self.transfer_encoding = TransferEncoding::QuotedPrintable;
            self.headers
                .put("Content-Transfer-Encoding", self.transfer_encoding.to_string());
        }
        if retyped {
            self.headers.put("Content-Type", self.content_type.to_string());
        }

        self.body = Body::Text {
            text: value,
            raw: None,
        };
        Ok(())
    }

    /// Returns the raw, still-encoded body of a non-text leaf.
    #[must_use]
    pub fn raw_body(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the child parts (empty for leaves).
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match &self.body {
            Body::Multipart { children, .. } => children,
            _ => &[],
        }
    }

    /// Returns the child parts for in-place modification.
    pub fn children_mut(&mut self) -> &mut [Self] {
        match &mut self.body {
            Body::Multipart { children, .. } => children,
            _ => &mut [],
        }
    }

    /// Visits this part and every descendant in pre-order.
    ///
    /// Stops at the first error and returns it; changes already made
    /// by the visitor are kept.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visitor`.
    pub fn walk<E, F>(&mut self, mut visitor: F) -> std::result::Result<(), E>
    where
        F: FnMut(&mut Self) -> std::result::Result<(), E>,
    {
        walk(self, &mut visitor)
    }

    /// Re-reads the content type, disposition and transfer encoding from
    /// the headers.
    ///
    /// A text leaf whose transfer encoding or charset changed drops its
    /// original bytes so export re-encodes it. An unparsable `Content-Type`
    /// keeps the previous type; a missing one falls back to the default.
    pub(crate) fn sync_content_fields(&mut self) {
        let previous = (self.transfer_encoding, self.content_type.charset().map(str::to_owned));

        match self.headers.get("content-type").map(ContentType::parse) {
            Some(Ok(mut content_type)) => {
                decode_parameter(&mut content_type.parameters, "name");
                self.content_type = content_type;
            }
            Some(Err(e)) => tracing::debug!(?e, "Unparsable Content-Type, keeping previous"),
            None => self.content_type = ContentType::default(),
        }
        self.disposition = self
            .headers
            .get("content-disposition")
            .and_then(|value| ContentDisposition::parse(value).ok())
            .map(|mut disposition| {
                decode_parameter(&mut disposition.parameters, "filename");
                disposition
            });
        self.transfer_encoding = self
            .headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);

        let changed = previous.0 != self.transfer_encoding
            || previous.1.as_deref() != self.content_type.charset();
        if changed
            && let Body::Text { raw, .. } = &mut self.body
            && raw.take().is_some()
        {
            tracing::trace!(
                mime = %self.content_type.mime_type(),
                "Text part will be re-encoded"
            );
        }
    }

    /// Takes the `Content-*` headers other than `Content-Type` out of a
    /// message-level part.
    pub(crate) fn split_content_headers(&mut self) -> Headers {
        self.headers
            .extract(|h| is_content_header(h.name()) && !key_matches(h.name(), "content-type"))
    }
}

/// Mutable access to a part's headers; see [`Part::headers_mut`].
#[derive(Debug)]
pub struct HeadersMut<'a> {
    part: &'a mut Part,
}

impl Deref for HeadersMut<'_> {
    type Target = Headers;

    fn deref(&self) -> &Headers {
        &self.part.headers
    }
}

impl DerefMut for HeadersMut<'_> {
    fn deref_mut(&mut self) -> &mut Headers {
        &mut self.part.headers
    }
}

impl Drop for HeadersMut<'_> {
    fn drop(&mut self) {
        self.part.sync_content_fields();
    }
}

fn decode_parameter(parameters: &mut Parameters, key: &str) {
    if let Some(value) = parameters.get_mut(key) {
        if value.contains("=?") {
            *value = decode_rfc2047(value);
        }
    }
}

fn decode_text(
    bytes: &[u8],
    encoding: TransferEncoding,
    content_type: &ContentType,
    config: &Config,
) -> Result<String> {
    match codec::decode(bytes, encoding, content_type.charset()) {
        Ok(text) => Ok(text),
        Err(e) if !config.strict_decoding => {
            tracing::warn!(?e, mime = %content_type.mime_type(), "Falling back to lossy text");
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        Err(e) => Err(e.into()),
    }
}
