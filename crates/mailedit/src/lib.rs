//! # mailedit
//!
//! Parse an RFC 5322 / MIME message into a mutable document, change it,
//! and write it back out.
//!
//! ## Features
//!
//! - **Headers**: ordered, case-insensitive, duplicate-preserving store
//! - **Addresses**: tolerant parsing of `To`/`Cc`/`Bcc`/`From`/`Sender`/
//!   `Reply-To` lists, with structured append and clear operations
//! - **Part tree**: pre-order traversal with in-place text replacement
//! - **Restructuring**: turn a `text/plain` message into
//!   `multipart/alternative` with an HTML alternative
//! - **Export**: untouched parts are written byte-for-byte; changed text is
//!   re-encoded with the part's transfer encoding and charset
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailedit::Message;
//!
//! let mut message = Message::parse(raw)?;
//! message.add_address("To", "Bob", "bob@example.com")?;
//! message.walk(|part| {
//!     if let Some(text) = part.text().map(str::to_owned) {
//!         part.set_text(text.replace("Hello", "Hi"))?;
//!     }
//!     Ok::<_, mailedit::Error>(())
//! })?;
//! let bytes = message.export()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod config;
mod error;
mod export;
mod header;
mod message;
mod part;
mod walk;

pub use address::{Address, AddressHeader, format_address_list, parse_address_list};
pub use config::{Config, ConfigBuilder, DEFAULT_FOLD_WIDTH};
pub use error::{Error, Result};
pub use header::{Header, Headers, key_matches};
pub use message::Message;
pub use part::{HeadersMut, Part, is_content_header};
pub use walk::{Parts, walk};

pub use mailedit_codec::{
    ContentDisposition, ContentType, LineEnding, MAX_DEPTH, Parameters, TransferEncoding,
};
