//! Loading and unsealing export containers
//!
//! A container starts [`Sealed`]: parsed, but unverified and possibly
//! holding ciphertext sections. [`Container::unseal`] runs the whole
//! verification and decryption pipeline and produces a [`Ready`]
//! container, which is frozen and only ever read from that point on.
//!
//! Most methods are available on a specific state, like
//! `Container<Sealed>` or `Container<Ready>`.

use crate::checker::{self, IntegrityError};
use crate::crypto::{self, CryptoError, KeyEnvelope};
use crate::schema::SchemaError;
use crate::version::Version;
use crate::xml::{self, Document, ParseError};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{DateTime, TimeZone, Utc};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
/// Errors encountered loading a container before any verification
pub enum OpenError {
    /// The file does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    /// The file exists but could not be read
    #[error("File not readable: {0}")]
    NotReadable(PathBuf),
    /// The content is not an XML document
    #[error("File type not allowed - not an XML document")]
    WrongType,
    /// The XML markup could not be parsed
    #[error("Unable to process the XML file: {0}")]
    MalformedDocument(#[from] ParseError),
    /// Other IO failure while reading
    #[error("IO error reading file - {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
/// Errors encountered verifying and decrypting a sealed container
pub enum UnsealError {
    /// The container holds ciphertext but no password was supplied
    #[error("Encryption password not set")]
    PasswordRequired,
    /// A signing key was supplied and the signature did not verify
    #[error("XML signature verification failed")]
    SignatureInvalid,
    /// Wrong password, corrupt envelope or unrecoverable ciphertext
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Decrypted plaintext was not a well-formed XML fragment
    #[error("Error loading decrypted XML data: {0}")]
    FragmentInvalid(String),
    /// A required node is missing or the version is unsupported
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// The document violates the export schema, before or after merging
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// State shared by every container
pub trait ContainerState {
    /// The underlying document tree
    fn document(&self) -> &Document;
}

/// An export container
///
/// The type parameter tracks pipeline progress; see the module docs.
pub struct Container<S: ContainerState> {
    state: S,
}

impl<S: ContainerState> Container<S> {
    /// Access the underlying document tree
    pub fn document(&self) -> &Document {
        self.state.document()
    }
}

/// A loaded container that has not been verified or decrypted yet
pub struct Sealed {
    document: Document,
}

impl ContainerState for Sealed {
    fn document(&self) -> &Document {
        &self.document
    }
}

/// A verified container with every section decrypted and spliced in
pub struct Ready {
    document: Document,
    declared_version: String,
    version: Version,
}

impl ContainerState for Ready {
    fn document(&self) -> &Document {
        &self.document
    }
}

fn looks_like_xml(content: &[u8]) -> bool {
    let content = content.strip_prefix(b"\xef\xbb\xbf").unwrap_or(content);
    content
        .iter()
        .find(|byte| !byte.is_ascii_whitespace())
        .map(|byte| *byte == b'<')
        .unwrap_or(false)
}

/// Read a container from a given path
///
/// The container starts sealed; use [`Container::unseal`] to verify it
/// and decrypt any ciphertext sections.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Container<Sealed>, OpenError> {
    let path = path.as_ref();
    info!("Reading XML file {}", path.display());

    let mut file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OpenError::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => OpenError::NotReadable(path.to_path_buf()),
        _ => OpenError::Io(e),
    })?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .map_err(|_| OpenError::NotReadable(path.to_path_buf()))?;

    from_bytes(&content)
}

/// Read a container from an in-memory buffer
pub fn from_bytes(content: &[u8]) -> Result<Container<Sealed>, OpenError> {
    if !looks_like_xml(content) {
        return Err(OpenError::WrongType);
    }
    let document = xml::parse_document(content)?;
    Ok(Container {
        state: Sealed { document },
    })
}

impl Container<Sealed> {
    /// Verify the container and decrypt any ciphertext sections
    ///
    /// Runs schema validation, the required node checks, the optional
    /// signature check, then detects an `Encrypted` section and, if one
    /// exists, decrypts each `Data` child in document order and splices
    /// the plaintext back into the document. Any decryption failure
    /// aborts the whole operation; no partially merged container is
    /// ever returned.
    pub fn unseal(
        self,
        password: Option<&str>,
        signing_key: Option<&str>,
    ) -> Result<Container<Ready>, UnsealError> {
        let mut document = self.state.document;

        checker::validate_schema(&document)?;
        checker::check_base_nodes(&document)?;
        let declared_version = declared_version(&document)?;
        let version = Version::parse(&declared_version).map_err(IntegrityError::from)?;

        if let Some(key) = signing_key {
            info!("Checking XML signature");
            if !checker::check_signature(&document, key)? {
                return Err(UnsealError::SignatureInvalid);
            }
        }

        if document.root().child("Encrypted").is_some() {
            info!("Encrypted XML detected");
            let password = password.ok_or(UnsealError::PasswordRequired)?;
            checker::check_encrypted_nodes(&document)?;
            checker::check_encryption_hash(&document, password)?;
            process_encrypted(&mut document, password, version)?;
            // the merged document must conform as well, which catches
            // ciphertext substituted with foreign but well-formed XML
            checker::validate_schema(&document)?;
        }

        checker::check_unencrypted_nodes(&document)?;

        Ok(Container {
            state: Ready {
                document,
                declared_version,
                version,
            },
        })
    }
}

fn declared_version(document: &Document) -> Result<String, IntegrityError> {
    document
        .root()
        .child("Meta")
        .and_then(|meta| meta.child("Version"))
        .map(|version| version.text().to_string())
        .ok_or(IntegrityError::NodeMissing("Version"))
}

fn process_encrypted(
    document: &mut Document,
    password: &str,
    version: Version,
) -> Result<(), UnsealError> {
    info!("Processing encrypted data");

    let base64_ciphertext = version >= crate::version::base64_ciphertext_threshold();

    let mut sections: Vec<(String, String)> = Vec::new();
    if let Some(encrypted) = document.root().child("Encrypted") {
        for data in encrypted.children_named("Data") {
            let key = data.attribute("key").unwrap_or_default().to_string();
            sections.push((key, data.text().to_string()));
        }
    }

    for (serialized_envelope, text) in sections {
        let envelope = KeyEnvelope::from_ascii(&serialized_envelope)?;
        let key = envelope.unlock(password)?;

        let ciphertext = if base64_ciphertext {
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            BASE64_STANDARD
                .decode(compact)
                .map_err(|_| CryptoError::DecryptionFailed)?
        } else {
            text.into_bytes()
        };

        // key material stays scoped to this one section
        let plaintext = crypto::decrypt(&ciphertext, &key)?;
        drop(key);

        let fragment = xml::parse_fragment(&plaintext)
            .map_err(|e| UnsealError::FragmentInvalid(e.to_string()))?;
        debug!("Spliced decrypted section <{}>", fragment.name());
        document.root_mut().append_child(fragment);
    }

    document.root_mut().remove_children_named("Encrypted");
    Ok(())
}

impl Container<Ready> {
    /// The version string as declared by the document
    pub fn xml_version(&self) -> &str {
        &self.state.declared_version
    }

    /// The declared version, normalized for comparison
    pub fn version(&self) -> Version {
        self.state.version
    }

    /// The creation timestamp as integer seconds
    pub fn xml_time(&self) -> i64 {
        self.document()
            .root()
            .child("Meta")
            .and_then(|meta| meta.child("Time"))
            .and_then(|time| time.text().parse().ok())
            .unwrap_or_default()
    }

    /// The creation timestamp as a UTC datetime, when representable
    pub fn xml_date(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.xml_time(), 0).single()
    }

    /// The generator that produced the export, when declared
    pub fn generator(&self) -> Option<&str> {
        self.document()
            .root()
            .child("Meta")
            .and_then(|meta| meta.child("Generator"))
            .map(|generator| generator.text())
    }
}
