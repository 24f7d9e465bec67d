//! # mailedit-codec
//!
//! Byte-level collaborators of the `mailedit` document model.
//!
//! ## Features
//!
//! - **Framing**: split a raw message into ordered header fields and
//!   per-part body ranges, with unbounded multipart nesting
//! - **Body codecs**: Base64 and Quoted-Printable plus charset transcoding
//! - **Header words**: RFC 2047 encoded-word decoding and encoding
//! - **Content types**: `Content-Type` / `Content-Disposition` values with
//!   RFC 2231 parameters
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailedit_codec::{Frame, BodyLayout, codec};
//!
//! let raw = b"Subject: Test\r\nContent-Transfer-Encoding: base64\r\n\r\nSGk=";
//! let frame = Frame::parse(raw)?;
//! if let BodyLayout::Leaf(range) = &frame.root.body {
//!     let text = codec::decode(&raw[range.clone()], frame.root.transfer_encoding, None)?;
//!     assert_eq!(text, "Hi");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod frame;

pub mod codec;
pub mod encoding;

pub use codec::{LineEnding, TransferEncoding};
pub use content_type::{ContentDisposition, ContentType, Parameters};
pub use error::{Error, Result};
pub use frame::{BodyLayout, Frame, HeaderLine, MAX_DEPTH, PartLayout, is_field_name};
