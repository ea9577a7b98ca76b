//! Error types for spxd

pub use crate::checker::IntegrityError;
pub use crate::container::{OpenError, UnsealError};
pub use crate::crypto::CryptoError;
pub use crate::query::QueryError;
pub use crate::schema::SchemaError;
pub use crate::version::VersionError;
pub use crate::xml::ParseError as XmlError;
use thiserror::Error;

#[derive(Error, Debug)]
/// Wrapper error type for this library
pub enum Error {
    /// Failed to open a container file
    #[error("Could not open container: {0}")]
    Open(#[from] OpenError),
    /// Failed verifying or decrypting a container
    #[error("Could not unseal container: {0}")]
    Unseal(#[from] UnsealError),
    /// Failed querying the record set
    #[error("Could not query container: {0}")]
    Query(#[from] QueryError),
}
