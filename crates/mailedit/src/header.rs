//! Ordered header store.
//!
//! Entries keep insertion order and original key casing; keys match
//! case-insensitively; duplicate keys are allowed.

use crate::address::AddressHeader;
use crate::error::{Error, Result};
use mailedit_codec::is_field_name;
use std::fmt;

/// Case-insensitive header key comparison.
#[must_use]
pub fn key_matches(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    /// Creates a header field.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the name with its original casing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Collection of email headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks whether any entry has the given key.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|h| key_matches(&h.name, name))
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].value.as_str())
    }

    /// Gets all values for a header, in order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|h| key_matches(&h.name, name))
            .map(|h| h.value.as_str())
            .collect()
    }

    /// Sets a header value.
    ///
    /// Replaces the first matching entry in place, or appends when the key
    /// is absent. Address headers may only be written here while absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderName`] for a name that is not a valid
    /// field name, and [`Error::AddressHeaderWriteRejected`] when `name` is
    /// an address header that already has an entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = checked_name(name.into())?;
        if AddressHeader::lookup(&name).is_some() && self.contains(&name) {
            return Err(Error::AddressHeaderWriteRejected(name));
        }
        self.put(name, value);
        Ok(())
    }

    /// Replaces the first matching entry in place, or appends. Callers pass
    /// fixed, valid names; no address check.
    pub(crate) fn put(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].value = value,
            None => self.entries.push(Header { name, value }),
        }
    }

    /// Appends a header value, regardless of duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderName`] for a name that is not a valid
    /// field name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = checked_name(name.into())?;
        self.entries.push(Header::new(name, value));
        Ok(())
    }

    /// Removes the first entry for a header. Returns whether one was found.
    pub fn remove(&mut self, name: &str) -> bool {
        self.position(name)
            .map(|i| self.entries.remove(i))
            .is_some()
    }

    /// Removes all entries for a header. Returns whether any were found.
    pub fn remove_all(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|h| !key_matches(&h.name, name));
        self.entries.len() != before
    }

    /// Replaces the value of the first entry matching both key and value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderNotFound`] if no entry has this key with
    /// exactly `old_value`; the store is left unchanged.
    pub fn replace(
        &mut self,
        name: &str,
        old_value: &str,
        new_value: impl Into<String>,
    ) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|h| key_matches(&h.name, name) && h.value == old_value)
            .ok_or_else(|| Error::HeaderNotFound(name.to_string()))?;
        entry.value = new_value.into();
        Ok(())
    }

    /// Removes and returns every entry selected by `pred`, keeping order.
    pub(crate) fn extract(&mut self, mut pred: impl FnMut(&Header) -> bool) -> Self {
        let (taken, kept): (Vec<Header>, Vec<Header>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|h| pred(h));
        self.entries = kept;
        Self { entries: taken }
    }

    /// Returns an iterator over all headers as `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|h| (h.name.as_str(), h.value.as_str()))
    }

    /// Returns the entries in order.
    #[must_use]
    pub fn entries(&self) -> &[Header] {
        &self.entries
    }
}

fn checked_name(name: String) -> Result<String> {
    if is_field_name(&name) {
        Ok(name)
    } else {
        Err(Error::InvalidHeaderName(name))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| Header::new(name, value))
                .collect(),
        }
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for header in &self.entries {
            write!(f, "{}: {}\r\n", header.name, header.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Headers {
        [
            ("Received", "from a"),
            ("X-HEADER", "1"),
            ("To", "Kien Pham <kien@sendgrid.com>"),
            ("X-Header", "2"),
            ("Received", "from b"),
            ("x-header", "3"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_get_is_case_insensitive_and_first() {
        let headers = sample();
        assert_eq!(headers.get("x-header"), Some("1"));
        assert_eq!(headers.get("RECEIVED"), Some("from a"));
        assert_eq!(headers.get("Missing"), None);
        assert_eq!(headers.get_all("X-HEADER"), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_set_replaces_first_in_place() {
        let mut headers = sample();
        headers.set("x-header", "one").unwrap();
        assert_eq!(headers.entries()[1], Header::new("X-HEADER", "one"));
        assert_eq!(headers.get_all("X-Header"), vec!["one", "2", "3"]);

        headers.set("Subject", "new").unwrap();
        assert_eq!(headers.entries().last(), Some(&Header::new("Subject", "new")));
    }

    #[test]
    fn test_set_rejects_existing_address_header() {
        let mut headers = sample();
        let err = headers.set("TO", "x@y.com").unwrap_err();
        assert!(matches!(err, Error::AddressHeaderWriteRejected(_)));
        assert_eq!(headers.get("to"), Some("Kien Pham <kien@sendgrid.com>"));

        headers.set("Cc", "x@y.com").unwrap();
        assert_eq!(headers.get("cc"), Some("x@y.com"));
        assert!(headers.set("cc", "z@y.com").is_err());
    }

    #[test]
    fn test_add_appends_duplicates() {
        let mut headers = sample();
        headers.add("X-Header", "4").unwrap();
        assert_eq!(headers.get_all("x-header").len(), 4);
        assert_eq!(headers.len(), 7);
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let mut headers = sample();
        let before = headers.clone();
        for name in ["X-Note: hi\r\nBcc", "Bad Name", "", "X:Y", "Caf\u{e9}"] {
            assert!(
                matches!(headers.set(name, "v"), Err(Error::InvalidHeaderName(_))),
                "{name:?}"
            );
            assert!(
                matches!(headers.add(name, "v"), Err(Error::InvalidHeaderName(_))),
                "{name:?}"
            );
        }
        assert_eq!(headers, before);
    }

    #[test]
    fn test_remove_first() {
        let mut headers = sample();
        assert!(headers.remove("received"));
        assert_eq!(headers.get_all("Received"), vec!["from b"]);
        assert!(!headers.remove("Missing"));
    }

    #[test]
    fn test_remove_all() {
        let mut headers = sample();
        assert!(headers.remove_all("X-HEADER"));
        assert_eq!(headers.get("X-HEADER"), None);
        assert!(!headers.remove_all("X-HEADER"));
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Received", "To", "Received"]);
    }

    #[test]
    fn test_replace_preserves_position() {
        let mut headers = sample();
        let mut expected = headers.clone();
        headers.replace("X-HEADER", "2", "5").unwrap();
        expected.entries[3].value = "5".to_string();
        assert_eq!(headers, expected);
    }

    #[test]
    fn test_replace_without_match_leaves_store_unchanged() {
        let mut headers = sample();
        let before = headers.clone();
        assert!(matches!(
            headers.replace("X-HEADER", "value don't exist", "5"),
            Err(Error::HeaderNotFound(_))
        ));
        assert!(headers.replace("key don't exist", "1", "5").is_err());
        assert_eq!(headers, before);
    }

    #[test]
    fn test_extract_keeps_order() {
        let mut headers = sample();
        let received = headers.extract(|h| key_matches(h.name(), "received"));
        assert_eq!(received.get_all("received"), vec!["from a", "from b"]);
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn test_headers_display() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com").unwrap();
        headers.add("to", "recipient@example.com").unwrap();
        assert_eq!(
            headers.to_string(),
            "From: sender@example.com\r\nto: recipient@example.com\r\n"
        );
    }

    fn key() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["A", "a", "B", "b", "X-Tag", "x-tag", "Received"])
            .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn prop_remove_all_keeps_other_order(
            entries in prop::collection::vec((key(), "[a-z]{0,4}"), 0..24),
            target in key(),
        ) {
            let mut headers: Headers = entries.iter().cloned().collect();
            let expected: Vec<(String, String)> = entries
                .iter()
                .filter(|(k, _)| !key_matches(k, &target))
                .cloned()
                .collect();
            let had_any = expected.len() != entries.len();

            prop_assert_eq!(headers.remove_all(&target), had_any);
            prop_assert!(!headers.remove_all(&target));
            let remaining: Vec<(String, String)> = headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            prop_assert_eq!(remaining, expected);
        }

        #[test]
        fn prop_set_never_reorders(
            entries in prop::collection::vec((key(), "[a-z]{0,4}"), 1..24),
            target in key(),
        ) {
            let mut headers: Headers = entries.iter().cloned().collect();
            let names_before: Vec<String> = headers.iter().map(|(k, _)| k.to_string()).collect();
            headers.set(target.clone(), "new").unwrap();
            let names_after: Vec<String> = headers.iter().map(|(k, _)| k.to_string()).collect();
            if names_before.iter().any(|k| key_matches(k, &target)) {
                prop_assert_eq!(names_after, names_before);
            } else {
                prop_assert_eq!(&names_after[..names_before.len()], &names_before[..]);
                prop_assert_eq!(names_after.len(), names_before.len() + 1);
            }
            prop_assert_eq!(headers.get(&target), Some("new"));
        }
    }
}
