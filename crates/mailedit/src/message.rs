//! MIME message: the header store plus the part tree.

use crate::address::{Address, AddressHeader, format_address_list, parse_address_list};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::Writer;
use crate::header::Headers;
use crate::part::{Body, Part, is_content_header};
use crate::walk::{Parts, walk};
use chrono::{DateTime, FixedOffset};
use mailedit_codec::encoding::decode_rfc2047;
use mailedit_codec::{ContentType, Frame, LineEnding};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Decodes encoded words in a raw header value.
///
/// Address headers are decoded per display name so that a decoded comma
/// cannot split an address; `Content-*` values are left alone.
fn decode_header_value(name: &str, value: &str) -> String {
    if !value.contains("=?") || is_content_header(name) {
        return value.to_string();
    }
    if AddressHeader::lookup(name).is_some() {
        let addresses: Vec<Address> = parse_address_list(value)
            .into_iter()
            .map(|address| address.map_name(|display| decode_rfc2047(&display)))
            .collect();
        return format_address_list(&addresses);
    }
    decode_rfc2047(value)
}

/// A parsed, mutable MIME message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    root: Part,
    line_ending: LineEnding,
    config: Config,
}

impl Message {
    /// Parses a raw message with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] if no header/body structure can
    /// be found, or [`Error::Codec`] in strict decoding mode.
    pub fn parse(raw: impl AsRef<[u8]>) -> Result<Self> {
        Self::parse_with_config(raw, Config::default())
    }

    /// Parses a raw message; `config` is kept for export.
    ///
    /// # Errors
    ///
    /// See [`Message::parse`].
    pub fn parse_with_config(raw: impl AsRef<[u8]>, config: Config) -> Result<Self> {
        let raw = raw.as_ref();
        let frame = Frame::parse(raw)?;
        let line_ending = frame.line_ending;

        let mut root = Part::from_layout(raw, frame.root, &config)?;
        root.headers = root
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), decode_header_value(name, value)))
            .collect();

        tracing::debug!(
            headers = root.headers.len(),
            parts = Parts::new(&root).count(),
            mime = %root.content_type(),
            "Parsed message"
        );
        Ok(Self {
            root,
            line_ending,
            config,
        })
    }

    /// Serializes the message.
    ///
    /// Unchanged leaves are written from their original bytes; text leaves
    /// changed since parse are re-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if a changed leaf cannot be re-encoded.
    pub fn export(&self) -> Result<Vec<u8>> {
        let line_ending = self.config.line_ending.unwrap_or(self.line_ending);
        let mut writer = Writer::new(line_ending, &self.config);
        writer.part(&self.root)?;
        let bytes = writer.finish();
        tracing::debug!(len = bytes.len(), "Exported message");
        Ok(bytes)
    }

    /// Releases the message and everything it owns.
    pub fn close(self) {
        tracing::trace!("Releasing message");
        drop(self);
    }

    /// Returns the message headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Returns the top-level part.
    #[must_use]
    pub const fn root(&self) -> &Part {
        &self.root
    }

    /// Returns the top-level part for modification.
    ///
    /// Header edits made through [`Part::headers_mut`] update the part's
    /// content type and transfer encoding when the guard is dropped.
    pub fn root_mut(&mut self) -> &mut Part {
        &mut self.root
    }

    /// Returns the configuration used for export.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Gets the Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.root.headers.get("subject")
    }

    /// Sets the Subject header.
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.root.headers.put("Subject", subject);
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.root.headers.get("message-id")
    }

    /// Parses the Date header.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.root
            .headers
            .get("date")
            .and_then(|date| DateTime::parse_from_rfc2822(date).ok())
    }

    /// Sets the Date header.
    pub fn set_date(&mut self, date: &DateTime<FixedOffset>) {
        self.root.headers.put("Date", date.to_rfc2822());
    }

    /// Returns the MIME type of the top-level part.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.root.content_type()
    }

    /// Gets the first value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.root.headers.get(name)
    }

    /// Gets every value of a header, in order.
    #[must_use]
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.root.headers.get_all(name)
    }

    /// Keeps the top-level part's content fields in step with its headers.
    fn content_header_changed(&mut self, name: &str) {
        if is_content_header(name) {
            self.root.sync_content_fields();
        }
    }

    /// Sets a header value in place, or appends it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderName`] for a name that is not a valid
    /// field name, or [`Error::AddressHeaderWriteRejected`] for an address
    /// header that already has a value; use the address methods instead.
    pub fn set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        self.root.headers.set(name.as_str(), value)?;
        self.content_header_changed(&name);
        Ok(())
    }

    /// Appends a header value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderName`] for a name that is not a valid
    /// field name.
    pub fn add_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        self.root.headers.add(name.as_str(), value)?;
        self.content_header_changed(&name);
        Ok(())
    }

    /// Removes the first entry of a header.
    pub fn remove_header(&mut self, name: &str) -> bool {
        let removed = self.root.headers.remove(name);
        self.content_header_changed(name);
        removed
    }

    /// Removes every entry of a header.
    pub fn remove_all_headers(&mut self, name: &str) -> bool {
        let removed = self.root.headers.remove_all(name);
        self.content_header_changed(name);
        removed
    }

    /// Replaces the value of the entry matching both key and value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderNotFound`] if no entry matches.
    pub fn replace_header(
        &mut self,
        name: &str,
        old_value: &str,
        new_value: impl Into<String>,
    ) -> Result<()> {
        self.root.headers.replace(name, old_value, new_value)?;
        self.content_header_changed(name);
        Ok(())
    }

    /// Appends addresses to an address header, keeping its position.
    fn append_addresses(
        &mut self,
        field: AddressHeader,
        addresses: impl IntoIterator<Item = Address>,
    ) {
        let mut list = self
            .root
            .headers
            .get(field.name())
            .map(parse_address_list)
            .unwrap_or_default();
        list.extend(addresses);
        tracing::trace!(header = %field, count = list.len(), "Writing address list");
        self.root.headers.put(field.name(), format_address_list(&list));
    }

    /// Adds one address to an address header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAddressHeader`] if `header` is not one of
    /// the six address headers, or [`Error::InvalidAddress`] for a bad email.
    pub fn add_address(&mut self, header: &str, name: &str, email: &str) -> Result<()> {
        let field = AddressHeader::lookup(header).ok_or_else(|| Error::cannot_add(header))?;
        let address = Address::with_name(name, email)?;
        self.append_addresses(field, [address]);
        Ok(())
    }

    /// Removes every address from an address header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAddressHeader`] for an unrecognised header.
    pub fn clear_address(&mut self, header: &str) -> Result<()> {
        let field = AddressHeader::lookup(header).ok_or_else(|| Error::unknown_header(header))?;
        self.root.headers.remove_all(field.name());
        Ok(())
    }

    /// Parses a raw address list and appends the valid addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAddressHeader`] for an unrecognised header.
    pub fn parse_and_append_addresses(&mut self, header: &str, addresses: &str) -> Result<()> {
        let field = AddressHeader::lookup(header).ok_or_else(|| Error::cannot_add(header))?;
        self.append_addresses(field, parse_address_list(addresses));
        Ok(())
    }

    /// Appends structured addresses. An empty list still leaves the header
    /// present (with an empty value).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAddressHeader`] for an unrecognised header.
    pub fn append_address_list(&mut self, header: &str, addresses: &[Address]) -> Result<()> {
        let field = AddressHeader::lookup(header).ok_or_else(|| Error::cannot_add(header))?;
        self.append_addresses(field, addresses.iter().cloned());
        Ok(())
    }

    /// Returns the parsed addresses of an address header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAddressHeader`] for an unrecognised header.
    pub fn addresses(&self, header: &str) -> Result<Vec<Address>> {
        let field = AddressHeader::lookup(header).ok_or_else(|| Error::unknown_header(header))?;
        Ok(self
            .root
            .headers
            .get_all(field.name())
            .into_iter()
            .flat_map(parse_address_list)
            .collect())
    }

    /// Visits every part in pre-order.
    ///
    /// A single-part message visits its only part; a multipart message
    /// visits everything below the top-level container, nested containers
    /// included.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visitor`.
    pub fn walk<E, F>(&mut self, mut visitor: F) -> std::result::Result<(), E>
    where
        F: FnMut(&mut Part) -> std::result::Result<(), E>,
    {
        if !self.root.is_multipart() {
            return walk(&mut self.root, &mut visitor);
        }
        for child in self.root.children_mut() {
            walk(child, &mut visitor)?;
        }
        Ok(())
    }

    /// Iterates over the parts [`Message::walk`] would visit.
    #[must_use]
    pub fn parts(&self) -> Parts<'_> {
        if self.root.is_multipart() {
            Parts::descendants(&self.root)
        } else {
            Parts::new(&self.root)
        }
    }

    /// Turns a `text/plain` message into `multipart/alternative` with the
    /// original text and a new `text/html` part.
    ///
    /// Returns false, changing nothing, for any other top-level type.
    pub fn add_html_alternative_to_plain_text(&mut self, html: &str) -> bool {
        if self.root.is_multipart() || !self.root.mime().is("text/plain") {
            return false;
        }

        let placeholder = Part::new_text(ContentType::text_plain(), "");
        let mut plain = std::mem::replace(&mut self.root, placeholder);
        let moved = plain.split_content_headers();
        let mut message_headers = std::mem::take(&mut plain.headers);
        let original_type = message_headers
            .get("content-type")
            .map_or_else(|| plain.mime().to_string(), str::to_string);
        plain.headers = std::iter::once(("Content-Type".to_string(), original_type))
            .chain(moved.iter().map(|(name, value)| (name.to_string(), value.to_string())))
            .collect();

        let html_part = Part::new_text(ContentType::text_html(), html);
        let boundary = boundary_for(&[&plain, &html_part]);
        let content_type = ContentType::multipart_alternative(boundary);
        tracing::debug!(boundary = ?content_type.boundary(), "Adding text/html alternative");

        message_headers.put("Content-Type", content_type.to_string());
        if !message_headers.contains("mime-version") {
            message_headers.put("MIME-Version", "1.0");
        }

        self.root = Part::new_multipart(content_type, message_headers, vec![plain, html_part]);
        true
    }
}

/// Picks a boundary that occurs in none of the given parts.
fn boundary_for(parts: &[&Part]) -> String {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash_body(&mut hasher);
    }
    let mut seed = hasher.finish();
    loop {
        let boundary = format!("=_mailedit_{seed:016x}");
        if !parts.iter().any(|part| part.body_contains(boundary.as_bytes())) {
            return boundary;
        }
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    }
}

impl Part {
    fn hash_body<H: Hasher>(&self, state: &mut H) {
        match &self.body {
            Body::Text { text, .. } => text.hash(state),
            Body::Binary(bytes) => bytes.hash(state),
            Body::Multipart { children, .. } => {
                for child in children {
                    child.hash_body(state);
                }
            }
        }
    }

    fn body_contains(&self, needle: &[u8]) -> bool {
        let contains = |haystack: &[u8]| memchr::memmem::find(haystack, needle).is_some();
        match &self.body {
            Body::Text { text, raw } => {
                contains(text.as_bytes()) || raw.as_deref().is_some_and(contains)
            }
            Body::Binary(bytes) => contains(bytes.as_slice()),
            Body::Multipart { children, .. } => {
                children.iter().any(|child| child.body_contains(needle))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PLAIN: &str = "From: Alice <alice@example.com>\r\n\
        To: bob@example.com\r\n\
        Subject: Hello\r\n\
        Date: Tue, 15 Oct 2024 10:00:00 +0000\r\n\
        Message-ID: <1@example.com>\r\n\
        Content-Type: text/plain; charset=us-ascii\r\n\
        Content-Transfer-Encoding: 7bit\r\n\
        \r\n\
        Plain body\r\n";

    fn plain() -> Message {
        Message::parse(PLAIN).unwrap()
    }

    #[test]
    fn test_parse_and_export_unchanged() {
        let message = plain();
        assert_eq!(message.subject(), Some("Hello"));
        assert_eq!(message.message_id(), Some("<1@example.com>"));
        assert_eq!(message.content_type(), "text/plain");
        assert_eq!(message.export().unwrap(), PLAIN.as_bytes());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Message::parse(""), Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn test_date_round_trip() {
        let mut message = plain();
        let date = message.date().unwrap();
        assert_eq!(date.timestamp(), 1_728_986_400);

        let later = DateTime::parse_from_rfc3339("2024-10-16T12:30:00+02:00").unwrap();
        message.set_date(&later);
        assert_eq!(message.date(), Some(later));
    }

    #[test]
    fn test_encoded_subject_is_decoded() {
        let message = Message::parse("Subject: =?utf-8?B?SGVsbG8gd8O2cmxk?=\r\n\r\nbody").unwrap();
        assert_eq!(message.subject(), Some("Hello wörld"));
    }

    #[test]
    fn test_encoded_display_name_is_decoded() {
        let message =
            Message::parse("From: =?utf-8?Q?M=C3=BCller=2C_Jo?= <jo@example.com>\r\n\r\nbody")
                .unwrap();
        let from = message.addresses("From").unwrap();
        assert_eq!(from.len(), 1);
        assert_eq!(from[0].name(), Some("Müller, Jo"));
        assert_eq!(from[0].email(), "jo@example.com");
    }

    #[test]
    fn test_set_subject_keeps_position() {
        let mut message = plain();
        message.set_subject("Changed");
        let names: Vec<&str> = message.headers().iter().map(|(name, _)| name).collect();
        assert_eq!(names[2], "Subject");
        assert_eq!(message.subject(), Some("Changed"));
    }

    #[test]
    fn test_set_header_on_address_header_is_rejected() {
        let mut message = plain();
        let err = message.set_header("To", "carol@example.com").unwrap_err();
        assert!(matches!(err, Error::AddressHeaderWriteRejected(_)));
        assert_eq!(message.header("to"), Some("bob@example.com"));

        message.set_header("Cc", "carol@example.com").unwrap();
        assert_eq!(message.header("Cc"), Some("carol@example.com"));
    }

    #[test]
    fn test_add_address_appends() {
        let mut message = plain();
        message.add_address("to", "Carol", "carol@example.com").unwrap();
        assert_eq!(message.header("To"), Some("bob@example.com, Carol <carol@example.com>"));

        let err = message.add_address("X-Custom", "", "x@example.com").unwrap_err();
        assert_eq!(err.to_string(), "can't add to header X-Custom");
    }

    #[test]
    fn test_add_address_validates_email() {
        let mut message = plain();
        let err = message.add_address("To", "", "not an address").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn test_clear_address() {
        let mut message = plain();
        message.clear_address("TO").unwrap();
        assert!(message.header("To").is_none());

        let err = message.clear_address("Subject").unwrap_err();
        assert_eq!(err.to_string(), "unknown header Subject");
    }

    #[test]
    fn test_parse_and_append_addresses_skips_invalid() {
        let mut message = plain();
        message
            .parse_and_append_addresses("Cc", "a@example.com, broken, B <b@example.com>")
            .unwrap();
        let cc = message.addresses("cc").unwrap();
        let emails: Vec<&str> = cc.iter().map(Address::email).collect();
        assert_eq!(emails, ["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_append_empty_address_list_creates_header() {
        let mut message = plain();
        message.append_address_list("Bcc", &[]).unwrap();
        assert_eq!(message.header("Bcc"), Some(""));
    }

    #[test]
    fn test_header_store_operations() {
        let mut message = plain();
        message.add_header("X-Tag", "one").unwrap();
        message.add_header("X-Tag", "two").unwrap();
        assert_eq!(message.header_all("x-tag"), ["one", "two"]);

        message.replace_header("X-Tag", "two", "three").unwrap();
        assert_eq!(message.header_all("X-Tag"), ["one", "three"]);
        assert!(matches!(
            message.replace_header("X-Tag", "missing", "x"),
            Err(Error::HeaderNotFound(_))
        ));

        assert!(message.remove_header("X-Tag"));
        assert_eq!(message.header_all("X-Tag"), ["three"]);
        assert!(message.remove_all_headers("X-Tag"));
        assert!(!message.remove_all_headers("X-Tag"));
    }

    #[test]
    fn test_add_html_alternative() {
        let mut message = plain();
        assert!(message.add_html_alternative_to_plain_text("<p>Plain body</p>"));
        assert_eq!(message.content_type(), "multipart/alternative");
        assert_eq!(message.header("MIME-Version"), Some("1.0"));
        assert!(message.header("Content-Transfer-Encoding").is_none());

        let names: Vec<&str> = message.headers().iter().map(|(name, _)| name).collect();
        assert_eq!(names[5], "Content-Type");

        let types: Vec<String> = message.parts().map(Part::content_type).collect();
        assert_eq!(types, ["text/plain", "text/html"]);
        let plain_part = &message.root().children()[0];
        assert_eq!(plain_part.text(), Some("Plain body\r\n"));
        assert_eq!(
            plain_part.headers().get("Content-Transfer-Encoding"),
            Some("7bit")
        );

        let exported = String::from_utf8(message.export().unwrap()).unwrap();
        let reparsed = Message::parse(&exported).unwrap();
        let texts: Vec<Option<String>> = reparsed
            .parts()
            .map(|p| p.text().map(str::to_string))
            .collect();
        assert_eq!(
            texts,
            [Some("Plain body\r\n".to_string()), Some("<p>Plain body</p>".to_string())]
        );
    }

    #[test]
    fn test_add_html_alternative_rejects_non_plain() {
        let raw = "Content-Type: text/html\r\n\r\n<p>hi</p>";
        let mut message = Message::parse(raw).unwrap();
        assert!(!message.add_html_alternative_to_plain_text("<p>x</p>"));
        assert_eq!(message.export().unwrap(), raw.as_bytes());
    }

    #[test]
    fn test_walk_single_part_visits_root() {
        let mut message = plain();
        let mut visited = 0;
        message
            .walk(|part| {
                visited += 1;
                part.set_text("Replaced")
            })
            .unwrap();
        assert_eq!(visited, 1);
        assert_eq!(message.root().text(), Some("Replaced"));
    }

    #[test]
    fn test_walk_stops_on_error() {
        let raw = "Content-Type: multipart/mixed; boundary=b\r\n\r\n\
            --b\r\nContent-Type: text/plain\r\n\r\none\r\n\
            --b\r\nContent-Type: text/plain\r\n\r\ntwo\r\n--b--\r\n";
        let mut message = Message::parse(raw).unwrap();
        let mut seen = Vec::new();
        let result = message.walk(|part| {
            seen.push(part.text().map(str::to_string));
            Err::<(), _>("stop")
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, [Some("one".to_string())]);
    }

    #[test]
    fn test_export_line_ending_override() {
        let config = Config::builder().line_ending(LineEnding::Lf).build();
        let message = Message::parse_with_config("Subject: x\r\n\r\nbody", config).unwrap();
        assert_eq!(message.export().unwrap(), b"Subject: x\n\nbody");
    }

    #[test]
    fn test_boundary_avoids_content() {
        let first = Part::new_text(ContentType::text_plain(), "hello");
        let html = Part::new_text(ContentType::text_html(), "<b>hello</b>");
        let boundary = boundary_for(&[&first, &html]);
        assert!(boundary.starts_with("=_mailedit_"));
        assert!(!first.body_contains(boundary.as_bytes()));
    }
}
