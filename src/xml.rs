//! Owned document model for sysPass XML exports
//!
//! The pipeline mutates the document in place while splicing decrypted
//! fragments, so the event stream from xml-rs is collected into a
//! small owned element tree.

mod dom;
pub(crate) mod parse;
pub(crate) mod serialize;

pub use dom::{Document, Element, SelectError};
pub use parse::{parse_document, parse_fragment, Error as ParseError};
pub use serialize::{fragment_to_string, write_document, Error as WriteError};
