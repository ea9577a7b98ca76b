//! Independent integrity checks over a loaded document
//!
//! Every check here is idempotent and side effect free. The container
//! pipeline sequences them; the query layer re-runs the version gate on
//! its own.

use crate::crypto::{self, CryptoError};
use crate::schema::{self, SchemaError};
use crate::version::{Version, VersionError, MIN_VERSION};
use crate::xml::{Document, Element};
use thiserror::Error;

#[derive(Debug, Error)]
/// Integrity failures that are not schema or crypto failures
pub enum IntegrityError {
    /// A required node is absent (or not present exactly once)
    #[error("Node missing: {0}")]
    NodeMissing(&'static str),
    /// A signature check was requested but the document carries none
    #[error("XML signature not found")]
    SignatureNotFound,
    /// The document predates the oldest supported format version
    #[error("Unsupported XML version {found}, expected >= {minimum}")]
    UnsupportedVersion {
        /// Version declared by the document, normalized
        found: String,
        /// Oldest accepted version, normalized
        minimum: String,
    },
    /// The declared version could not be parsed
    #[error(transparent)]
    MalformedVersion(#[from] VersionError),
}

/// Validate the document against the export schema
pub fn validate_schema(document: &Document) -> Result<(), SchemaError> {
    schema::validate(document)
}

fn require_exactly_one(
    document: &Document,
    name: &'static str,
) -> Result<(), IntegrityError> {
    if document.root().count_children_named(name) == 1 {
        Ok(())
    } else {
        Err(IntegrityError::NodeMissing(name))
    }
}

/// Nodes every container must carry, encrypted or not
pub fn check_base_nodes(document: &Document) -> Result<(), IntegrityError> {
    require_exactly_one(document, "Meta")
}

/// Data sections that must exist once no ciphertext remains
pub fn check_unencrypted_nodes(document: &Document) -> Result<(), IntegrityError> {
    for name in ["Categories", "Clients", "Tags", "Accounts"] {
        require_exactly_one(document, name)?;
    }
    Ok(())
}

/// Shape of the `Encrypted` section when one was detected
pub fn check_encrypted_nodes(document: &Document) -> Result<(), IntegrityError> {
    require_exactly_one(document, "Encrypted")
}

fn signature_node(document: &Document) -> Option<&Element> {
    document.root().child("Meta")?.child("Hash")
}

/// Verify the keyed signature over the document digest
///
/// Returns `Ok(false)` on a plain mismatch; fails only when the
/// signature node itself is absent.
pub fn check_signature(document: &Document, key: &str) -> Result<bool, IntegrityError> {
    let hash = signature_node(document).ok_or(IntegrityError::SignatureNotFound)?;
    let sign = hash
        .attribute("sign")
        .ok_or(IntegrityError::SignatureNotFound)?;
    Ok(crypto::verify_message(hash.text(), key, sign))
}

/// Fast-fail password check against the `Encrypted` section's salted hash
///
/// Passing this guard does not prove the ciphertext is recoverable; a
/// corrupted capsule still fails later, during real decryption.
pub fn check_encryption_hash(document: &Document, password: &str) -> Result<(), CryptoError> {
    let hash = document
        .root()
        .child("Encrypted")
        .and_then(|encrypted| encrypted.attribute("hash"))
        .unwrap_or_default();
    if !hash.is_empty() && !crypto::verify_password(password, hash) {
        return Err(CryptoError::WrongPassword);
    }
    Ok(())
}

/// Gate a declared version against the oldest supported one
pub fn check_version(declared: &str) -> Result<(), IntegrityError> {
    let found = Version::parse(declared)?;
    let minimum = Version::parse(MIN_VERSION)?;
    if found < minimum {
        return Err(IntegrityError::UnsupportedVersion {
            found: found.to_string(),
            minimum: minimum.to_string(),
        });
    }
    Ok(())
}
