#![deny(missing_docs)]

//! Module to read, verify and decrypt sysPass XML exports.
//!
//! The main types in this crate are:
//!
//! * [`Container`] which represents an export file as it moves through
//!   the verification and decryption pipeline
//! * [`Search`] which queries the decrypted record set
//!
//! # Opening an export
//!
//! Exports are read with the [`spxd::open`] function. The container
//! starts sealed; [`Container::unseal`] validates the document, checks
//! the optional signature, and decrypts any encrypted sections with the
//! export password.
//!
//! ```no_run
//! # fn main() -> Result<(), spxd::Error> {
//! let container = spxd::open("./export.xml")?;
//! let container = container.unseal(Some("export password"), None)?;
//! println!("version {}", container.xml_version());
//! # Ok(())
//! # }
//! ```
//!
//! # Querying accounts
//!
//! A [`Search`] borrows an unsealed container and projects matched
//! accounts into records. Without a master password, record secrets
//! come back as a fixed sentinel instead of being decrypted.
//!
//! ```no_run
//! use spxd::{Search, SearchOptions};
//! # fn main() -> Result<(), spxd::Error> {
//! # let container = spxd::open("./export.xml")?.unseal(None, None)?;
//! let search = Search::new(&container).with_options(SearchOptions {
//!     with_tags: true,
//!     ..SearchOptions::default()
//! });
//! for record in search.by_name("mail")? {
//!     println!("{} ({})", record.name, record.client);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`spxd::open`]: crate::open
//! [`Container`]: crate::Container
//! [`Container::unseal`]: crate::Container#method.unseal
//! [`Search`]: crate::Search

pub mod checker;
pub mod container;
pub mod crypto;
pub mod errors;
pub mod query;
pub mod schema;
pub mod version;
pub mod xml;

pub use container::{open, Container, Ready, Sealed};
pub use crypto::KeyEnvelope;
pub use errors::Error;
pub use query::{AccountRecord, Search, SearchOptions, PASSWORD_SENTINEL};
pub use version::Version;
