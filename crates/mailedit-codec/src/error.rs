//! Error types for framing and codec operations.

/// Result type alias for framing and codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Framing and codec error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input has no recognisable header/body structure.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Invalid content type or disposition value.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Charset label not known to the transcoder.
    #[error("Unknown charset: {0}")]
    UnknownCharset(String),

    /// Text contains characters the target charset cannot represent.
    #[error("Text is not representable in charset {0}")]
    Unrepresentable(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Transfer encoding could not be undone.
    #[error("Invalid {encoding} body: {reason}")]
    InvalidBody {
        /// Transfer encoding name.
        encoding: String,
        /// What went wrong.
        reason: String,
    },
}

impl Error {
    /// Returns the encoding or charset name this error is about, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::UnknownCharset(name) | Self::Unrepresentable(name) => Some(name),
            Self::InvalidBody { encoding, .. } => Some(encoding),
            Self::Base64Decode(_) => Some("base64"),
            Self::Malformed(_) | Self::InvalidContentType(_) => None,
        }
    }
}
