//! Address lists for `From`, `To`, `Cc` and friends.
//!
//! The grammar is RFC 5322 `address-list` with the tolerance real mail
//! needs: every comma-separated segment is parsed on its own, bare
//! addresses may be separated by whitespace alone, and any unit that does
//! not yield a usable address is dropped without failing the whole list.

use crate::error::{Error, Result};
use std::fmt;

/// The six header fields whose values are address lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressHeader {
    /// `To`
    To,
    /// `Cc`
    Cc,
    /// `Bcc`
    Bcc,
    /// `From`
    From,
    /// `Sender`
    Sender,
    /// `Reply-To`
    ReplyTo,
}

const ADDRESS_HEADERS: [(&str, AddressHeader); 6] = [
    ("to", AddressHeader::To),
    ("cc", AddressHeader::Cc),
    ("bcc", AddressHeader::Bcc),
    ("from", AddressHeader::From),
    ("sender", AddressHeader::Sender),
    ("reply-to", AddressHeader::ReplyTo),
];

impl AddressHeader {
    /// All address headers.
    pub const ALL: [Self; 6] = [
        Self::To,
        Self::Cc,
        Self::Bcc,
        Self::From,
        Self::Sender,
        Self::ReplyTo,
    ];

    /// Looks up an address header by name, ignoring case.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        ADDRESS_HEADERS
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|&(_, header)| header)
    }

    /// Returns the canonical header name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::To => "To",
            Self::Cc => "Cc",
            Self::Bcc => "Bcc",
            Self::From => "From",
            Self::Sender => "Sender",
            Self::ReplyTo => "Reply-To",
        }
    }
}

impl fmt::Display for AddressHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A mailbox: optional display name plus email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    name: Option<String>,
    email: String,
}

impl Address {
    /// Creates an address without a display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is invalid.
    pub fn new(email: impl Into<String>) -> Result<Self> {
        let email = email.into();
        validate(&email)?;
        Ok(Self { name: None, email })
    }

    /// Creates an address with a display name. An empty name is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is invalid.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        let mut address = Self::new(email)?;
        address.name = Some(name.into()).filter(|n| !n.trim().is_empty());
        Ok(address)
    }

    /// Returns the display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Applies `f` to the display name.
    #[must_use]
    pub(crate) fn map_name(mut self, f: impl FnOnce(String) -> String) -> Self {
        self.name = self.name.map(f);
        self
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if needs_quoting(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.email)
            }
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => f.write_str(&self.email),
        }
    }
}

/// Validates an email address (basic validation).
fn validate(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(Error::InvalidAddress("Address cannot be empty".into()));
    }

    if email
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | ',' | '"'))
    {
        return Err(Error::InvalidAddress(format!("Invalid characters in {email:?}")));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(Error::InvalidAddress("Address must contain @".into()));
    };
    if domain.contains('@') {
        return Err(Error::InvalidAddress("Address must have exactly one @".into()));
    }
    if local.is_empty() || domain.is_empty() {
        return Err(Error::InvalidAddress(
            "Local and domain parts cannot be empty".into(),
        ));
    }

    Ok(())
}

fn is_special(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '[' | ']' | ':' | ';' | '@' | '\\' | ',' | '.' | '"'
    )
}

fn needs_quoting(name: &str) -> bool {
    name.starts_with(char::is_whitespace)
        || name.ends_with(char::is_whitespace)
        || name.chars().any(is_special)
}

/// Lexical unit of one address segment.
#[derive(Debug, PartialEq, Eq)]
enum Token {
    /// Run of atom text; holds an addr-spec when it contains `@`.
    Atom(String),
    /// Quoted string, unescaped.
    Quoted(String),
    /// Contents of `<...>`.
    Angle(String),
    /// Any other special character.
    Special(char),
}

/// Splits on commas outside quotes, angle brackets and comments.
fn split_segments(value: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut angle = false;
    let mut comment_depth = 0usize;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes || comment_depth > 0 => escaped = true,
            '"' if comment_depth == 0 => in_quotes = !in_quotes,
            _ if in_quotes => {}
            '(' => comment_depth += 1,
            ')' => comment_depth = comment_depth.saturating_sub(1),
            _ if comment_depth > 0 => {}
            '<' => angle = true,
            '>' => angle = false,
            ',' if !angle => {
                segments.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&value[start..]);
    segments
}

/// Tokenizes a segment; `None` for unterminated quotes or angle brackets.
fn tokenize(segment: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = segment.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '"' => {
                let mut text = String::new();
                loop {
                    match chars.next()? {
                        '\\' => text.push(chars.next()?),
                        '"' => break,
                        other => text.push(other),
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            '(' => {
                let mut depth = 1;
                while depth > 0 {
                    match chars.next() {
                        Some('\\') => {
                            chars.next();
                        }
                        Some('(') => depth += 1,
                        Some(')') => depth -= 1,
                        Some(_) => {}
                        None => break,
                    }
                }
            }
            '<' => {
                let mut text = String::new();
                loop {
                    match chars.next()? {
                        '>' => break,
                        other => text.push(other),
                    }
                }
                tokens.push(Token::Angle(text));
            }
            '[' | ']' | ':' | ';' | '\\' | '>' | ')' => tokens.push(Token::Special(c)),
            _ => {
                let mut atom = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next == '[' && atom.ends_with('@') {
                        // Domain literal: user@[10.0.0.1]
                        for literal in chars.by_ref() {
                            atom.push(literal);
                            if literal == ']' {
                                break;
                            }
                        }
                        continue;
                    }
                    if next.is_whitespace()
                        || matches!(
                            next,
                            '"' | '(' | ')' | '<' | '>' | '[' | ']' | ':' | ';' | '\\'
                        )
                    {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }

    Some(tokens)
}

/// Strips an obsolete source route (`@a,@b:user@host`) and whitespace.
fn angle_email(inner: &str) -> &str {
    let inner = inner.trim();
    inner.rsplit_once(':').map_or(inner, |(_, email)| email.trim())
}

fn parse_segment(segment: &str, out: &mut Vec<Address>) {
    let Some(tokens) = tokenize(segment) else {
        tracing::trace!(segment, "Dropping unterminated address");
        return;
    };

    let mut phrase: Vec<String> = Vec::new();
    let mut malformed = false;

    for token in tokens {
        match token {
            Token::Atom(atom) if atom.contains('@') => {
                if phrase.is_empty() && !malformed {
                    if let Ok(address) = Address::new(atom) {
                        out.push(address);
                    }
                } else {
                    // Phrase followed by a bare address: not one unit we can trust.
                    malformed = true;
                }
            }
            Token::Atom(word) | Token::Quoted(word) => phrase.push(word),
            Token::Angle(inner) => {
                if !malformed {
                    let name = phrase.join(" ");
                    if let Ok(address) = Address::with_name(name, angle_email(&inner)) {
                        out.push(address);
                    }
                }
                phrase.clear();
                malformed = false;
            }
            // Group label / group end
            Token::Special(':' | ';') => {
                phrase.clear();
                malformed = false;
            }
            Token::Special(_) => malformed = true,
        }
    }
}

/// Parses an address list header value.
///
/// Never fails: malformed entries are dropped, the rest keep their order.
#[must_use]
pub fn parse_address_list(value: &str) -> Vec<Address> {
    let mut addresses = Vec::new();
    for segment in split_segments(value) {
        parse_segment(segment, &mut addresses);
    }
    addresses
}

/// Serializes addresses to a header value, joined by `", "`.
#[must_use]
pub fn format_address_list(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::needless_pass_by_value)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn named(name: &str, email: &str) -> Address {
        Address::with_name(name, email).unwrap()
    }

    fn bare(email: &str) -> Address {
        Address::new(email).unwrap()
    }

    fn reformat(value: &str) -> String {
        format_address_list(&parse_address_list(value))
    }

    #[test]
    fn test_lookup_address_header() {
        assert_eq!(AddressHeader::lookup("REPLY-TO"), Some(AddressHeader::ReplyTo));
        assert_eq!(AddressHeader::lookup("bcc"), Some(AddressHeader::Bcc));
        assert_eq!(AddressHeader::lookup("wtf"), None);
        assert_eq!(AddressHeader::lookup("x-to"), None);
        for header in AddressHeader::ALL {
            assert_eq!(AddressHeader::lookup(header.name()), Some(header));
        }
    }

    #[test]
    fn test_address_validation() {
        assert!(Address::new("user@example.com").is_ok());
        assert!(Address::new("userexample.com").is_err());
        assert!(Address::new("").is_err());
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
        assert!(Address::new("a@b@c").is_err());
        assert!(Address::new("a b@c.com").is_err());
    }

    #[test]
    fn test_with_empty_name_drops_name() {
        assert_eq!(named("", "a@a.com").name(), None);
        assert_eq!(named("Foo", "a@a.com").name(), Some("Foo"));
    }

    #[test]
    fn test_parse_named_lists() {
        assert_eq!(
            parse_address_list("Foo Bar <foo@bar.baz>"),
            vec![named("Foo Bar", "foo@bar.baz")]
        );
        assert_eq!(
            parse_address_list("Foo Bar <foo@bar.baz>, Bar Baz <bar@foo.com>"),
            vec![named("Foo Bar", "foo@bar.baz"), named("Bar Baz", "bar@foo.com")]
        );
        assert_eq!(
            parse_address_list(
                "Foo Bar <foo@bar.baz>, Bar Baz <bar@foo.com>, \
                 Another Email <another.email@mail.com>"
            ),
            vec![
                named("Foo Bar", "foo@bar.baz"),
                named("Bar Baz", "bar@foo.com"),
                named("Another Email", "another.email@mail.com"),
            ]
        );
    }

    #[test]
    fn test_parse_drops_non_address_segment() {
        assert_eq!(
            parse_address_list("Foo Bar <foo@bar.baz>, Bar Baz <bar@foo.com>, Not an email at all"),
            vec![named("Foo Bar", "foo@bar.baz"), named("Bar Baz", "bar@foo.com")]
        );
    }

    #[test]
    fn test_parse_bare_and_angle_only() {
        assert_eq!(
            parse_address_list("<foo@bar.baz>, <bar@foo.baz>"),
            vec![bare("foo@bar.baz"), bare("bar@foo.baz")]
        );
        assert_eq!(
            parse_address_list("foo@bar.baz, <bar@foo.baz>"),
            vec![bare("foo@bar.baz"), bare("bar@foo.baz")]
        );
        assert_eq!(
            parse_address_list("foo@bar.baz, Bar Foo <bar@foo.baz>"),
            vec![bare("foo@bar.baz"), named("Bar Foo", "bar@foo.baz")]
        );
        assert_eq!(
            parse_address_list("foo@bar.baz, bar@foo.baz"),
            vec![bare("foo@bar.baz"), bare("bar@foo.baz")]
        );
    }

    #[test]
    fn test_phrase_before_bare_address_is_dropped() {
        assert_eq!(
            parse_address_list("foo@bar.baz, Bar Foo bar@foo.baz"),
            vec![bare("foo@bar.baz")]
        );
        assert_eq!(reformat("a <a@a.com> b b@b.com"), "a <a@a.com>");
        assert_eq!(
            reformat(r#"a a@a.com, b <b@b.com>, "c" <c@c.com>"#),
            "b <b@b.com>, c <c@c.com>"
        );
    }

    #[test]
    fn test_whitespace_separates_bare_addresses() {
        assert_eq!(reformat("a@a.com"), "a@a.com");
        assert_eq!(reformat("a@a.com,b@b.com"), "a@a.com, b@b.com");
        assert_eq!(reformat("a@a.com b@b.com"), "a@a.com, b@b.com");
        assert_eq!(reformat("a@a.com,b <b@b.com>"), "a@a.com, b <b@b.com>");
    }

    #[test]
    fn test_brackets_need_quotes() {
        assert_eq!(
            reformat("a@a.com,[] <badbrackets@b.com>, c <c@c.com>"),
            "a@a.com, c <c@c.com>"
        );
        let parsed = parse_address_list(r#"a@a.com, "[]" <goodbrackets@b.com>, c@c.com"#);
        assert_eq!(parsed[1].name(), Some("[]"));
        assert_eq!(
            format_address_list(&parsed),
            r#"a@a.com, "[]" <goodbrackets@b.com>, c@c.com"#
        );
    }

    #[test]
    fn test_comments_groups_and_literals() {
        assert_eq!(
            parse_address_list("Pete (the boss) <pete@example.com>"),
            vec![named("Pete", "pete@example.com")]
        );
        assert_eq!(
            parse_address_list("Team: a@x.com, B <b@y.com>;, c@z.com"),
            vec![bare("a@x.com"), named("B", "b@y.com"), bare("c@z.com")]
        );
        assert!(parse_address_list("undisclosed-recipients:;").is_empty());
        assert_eq!(
            parse_address_list("root@[10.0.0.1]"),
            vec![bare("root@[10.0.0.1]")]
        );
    }

    #[test]
    fn test_quoted_name_with_comma_and_escapes() {
        let parsed = parse_address_list(r#""Doe, John \"JD\"" <jd@example.com>, x@y.com"#);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name(), Some(r#"Doe, John "JD""#));
        assert_eq!(
            parsed[0].to_string(),
            r#""Doe, John \"JD\"" <jd@example.com>"#
        );
    }

    #[test]
    fn test_unterminated_segments_dropped() {
        assert_eq!(reformat(r#""open <a@a.com>, b@b.com"#), "");
        assert_eq!(reformat("x <a@a.com, b@b.com"), "");
        assert_eq!(reformat("c@c.com, d <d@d.com"), "c@c.com");
    }

    #[test]
    fn test_format_empty() {
        assert_eq!(format_address_list(&[]), "");
        assert!(parse_address_list("").is_empty());
        assert!(parse_address_list(" , ,").is_empty());
    }

    #[test]
    fn test_duplicates_kept_in_order() {
        assert_eq!(reformat("a@a.com, b@b.com, a@a.com"), "a@a.com, b@b.com, a@a.com");
    }

    fn address() -> impl Strategy<Value = Address> {
        let email = "[a-z]{1,8}(\\.[a-z]{1,5})?@[a-z]{1,8}\\.(com|org|net)";
        let name = proptest::option::of("[A-Za-z\\[\\]\\.,\"]{1,6}( [A-Za-z\\[\\]]{1,6})?");
        (name, email).prop_map(|(name, email)| match name {
            Some(name) => Address::with_name(name, email).unwrap(),
            None => Address::new(email).unwrap(),
        })
    }

    proptest! {
        #[test]
        fn prop_formatted_lists_parse_back(addresses in prop::collection::vec(address(), 0..6)) {
            let formatted = format_address_list(&addresses);
            prop_assert_eq!(parse_address_list(&formatted), addresses);
        }
    }
}
