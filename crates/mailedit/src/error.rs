//! Error types for document model operations.

/// Result type alias for document model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Document model error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The framer could not establish a header/body structure.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A header outside the six address fields was named where one is required.
    #[error("{context} {name}")]
    UnknownAddressHeader {
        /// What was being attempted (`"can't add to header"`, `"unknown header"`).
        context: &'static str,
        /// The header name as given by the caller.
        name: String,
    },

    /// Generic set used on an address header that already has a value.
    #[error("address header {0} requires AddAddress/ClearAddress")]
    AddressHeaderWriteRejected(String),

    /// Header name that cannot be written as a field name.
    #[error("Invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// No header matched both key and value.
    #[error("failed to find header with matching key & value: {0}")]
    HeaderNotFound(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Text operation on a part that holds no text.
    #[error("Part {0} is not a text part")]
    NotTextPart(String),

    /// Transfer-encoding or charset conversion failed for a leaf.
    #[error("Codec error: {0}")]
    Codec(#[source] mailedit_codec::Error),
}

impl From<mailedit_codec::Error> for Error {
    fn from(e: mailedit_codec::Error) -> Self {
        match e {
            mailedit_codec::Error::Malformed(reason) => Self::MalformedMessage(reason),
            other => Self::Codec(other),
        }
    }
}

impl Error {
    pub(crate) fn cannot_add(name: &str) -> Self {
        Self::UnknownAddressHeader {
            context: "can't add to header",
            name: name.to_string(),
        }
    }

    pub(crate) fn unknown_header(name: &str) -> Self {
        Self::UnknownAddressHeader {
            context: "unknown header",
            name: name.to_string(),
        }
    }
}
