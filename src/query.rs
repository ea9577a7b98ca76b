//! Searching accounts and projecting them into output records
//!
//! Queries run over a [`Container<Ready>`], which is frozen; nothing
//! here mutates the document. Records come back in document order.

use crate::checker::{self, IntegrityError};
use crate::container::{Container, Ready};
use crate::crypto::{self, CryptoError, KeyEnvelope};
use crate::xml::{Element, SelectError};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Emitted in place of a password when no master password is supplied
pub const PASSWORD_SENTINEL: &str = "**encrypted**";

/// Width of shaped text fields, excluding the ellipsis
pub const TRUNCATE_LIMIT: usize = 25;

const ELLIPSIS: &str = "...";

#[derive(Debug, Error)]
/// Errors from the query layer
pub enum QueryError {
    /// The node selection expression was rejected
    #[error(transparent)]
    InvalidExpression(#[from] SelectError),
    /// An account references an id missing from its reference table
    #[error("Unknown {kind} reference: {id}")]
    UnknownReference {
        /// Which reference table the id was looked up in
        kind: &'static str,
        /// The id that did not resolve
        id: i64,
    },
    /// The version gate rejected the container
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// A record secret failed to unlock or decrypt
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, Copy)]
/// Output shaping for search results
pub struct SearchOptions {
    /// Resolve and include the category column
    pub with_categories: bool,
    /// Resolve and include the tags column
    pub with_tags: bool,
    /// Truncate text fields to [`TRUNCATE_LIMIT`] characters
    pub truncate: bool,
}

impl Default for SearchOptions {
    fn default() -> SearchOptions {
        SearchOptions {
            with_categories: false,
            with_tags: false,
            truncate: true,
        }
    }
}

/// One account projected for output
///
/// Field order is fixed; optional columns appear only when requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRecord {
    /// Account name
    pub name: String,
    /// Login user
    pub login: String,
    /// Service URL
    pub url: String,
    /// Free text notes
    pub notes: String,
    /// Resolved client name
    pub client: String,
    /// Resolved category name, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Comma joined resolved tag names, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Decrypted secret, or [`PASSWORD_SENTINEL`]
    pub password: String,
}

impl AccountRecord {
    /// Fields in output order, skipping columns that were not requested
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("name", self.name.as_str()),
            ("login", self.login.as_str()),
            ("url", self.url.as_str()),
            ("notes", self.notes.as_str()),
            ("client", self.client.as_str()),
        ];
        if let Some(category) = &self.category {
            fields.push(("category", category));
        }
        if let Some(tags) = &self.tags {
            fields.push(("tags", tags));
        }
        fields.push(("password", self.password.as_str()));
        fields
    }
}

/// Truncate `text` to `limit` characters with a trailing ellipsis
///
/// The cut text is trimmed before the ellipsis is appended, so a break
/// on a space does not leave a gap.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let cut: String = text.chars().take(limit).collect();
        format!("{}{}", cut.trim(), ELLIPSIS)
    } else {
        text.to_string()
    }
}

/// Account search over an unsealed container
pub struct Search<'a> {
    container: &'a Container<Ready>,
    options: SearchOptions,
    master_password: Option<String>,
}

impl<'a> Search<'a> {
    /// Create a search with default output shaping
    pub fn new(container: &'a Container<Ready>) -> Search<'a> {
        Search {
            container,
            options: SearchOptions::default(),
            master_password: None,
        }
    }

    /// Replace the output shaping options
    pub fn with_options(mut self, options: SearchOptions) -> Search<'a> {
        self.options = options;
        self
    }

    /// Supply the master password used to decrypt record secrets
    ///
    /// Without one, every record's password is [`PASSWORD_SENTINEL`].
    pub fn with_master_password(mut self, password: impl Into<String>) -> Search<'a> {
        self.master_password = Some(password.into());
        self
    }

    /// Every account, in document order
    pub fn all(&self) -> Result<Vec<AccountRecord>, QueryError> {
        self.search(None)
    }

    /// Accounts whose name contains `name` (case sensitive)
    pub fn by_name(&self, name: &str) -> Result<Vec<AccountRecord>, QueryError> {
        self.search(Some(name))
    }

    fn search(&self, filter: Option<&str>) -> Result<Vec<AccountRecord>, QueryError> {
        checker::check_version(self.container.xml_version())?;

        let document = self.container.document();
        let accounts = document.select("/Root/Accounts/Account")?;

        let clients = reference_map(document.select("/Root/Clients/Client")?);
        let categories = match self.options.with_categories {
            true => Some(reference_map(document.select("/Root/Categories/Category")?)),
            false => None,
        };
        let tags = match self.options.with_tags {
            true => Some(reference_map(document.select("/Root/Tags/Tag")?)),
            false => None,
        };

        let mut records = Vec::new();
        for account in accounts {
            let name = account
                .child("name")
                .map(|name| name.text())
                .unwrap_or_default();
            if let Some(filter) = filter {
                if !name.contains(filter) {
                    continue;
                }
            }
            records.push(self.project(account, &clients, &categories, &tags)?);
        }
        debug!("Matched {} accounts", records.len());
        Ok(records)
    }

    fn project(
        &self,
        account: &Element,
        clients: &HashMap<i64, &str>,
        categories: &Option<HashMap<i64, &str>>,
        tags: &Option<HashMap<i64, &str>>,
    ) -> Result<AccountRecord, QueryError> {
        let text = |field: &str| {
            account
                .child(field)
                .map(|node| node.text())
                .unwrap_or_default()
        };

        let client = resolve(clients, account, "clientId", "client")?;
        let category = match categories {
            Some(map) => Some(self.shape(resolve(map, account, "categoryId", "category")?)),
            None => None,
        };
        let tags = match tags {
            Some(map) => Some(self.shape(&self.joined_tags(account, map)?)),
            None => None,
        };

        Ok(AccountRecord {
            name: self.shape(text("name")),
            login: self.shape(text("login")),
            url: self.shape(text("url")),
            notes: self.shape(text("notes")),
            client: self.shape(client),
            category,
            tags,
            password: self.record_password(account)?,
        })
    }

    fn joined_tags(
        &self,
        account: &Element,
        tags: &HashMap<i64, &str>,
    ) -> Result<String, QueryError> {
        let mut names = Vec::new();
        if let Some(tag_list) = account.child("tags") {
            for tag in tag_list.children_named("tag") {
                let id: i64 = tag
                    .attribute("id")
                    .and_then(|id| id.parse().ok())
                    .unwrap_or(-1);
                let name = tags
                    .get(&id)
                    .ok_or(QueryError::UnknownReference { kind: "tag", id })?;
                names.push(*name);
            }
        }
        Ok(names.join(","))
    }

    /// Decrypt one record's secret under its record-local envelope
    ///
    /// There is no hash guard at the record level; a wrong master
    /// password surfaces as a hard unlock or decryption failure.
    fn record_password(&self, account: &Element) -> Result<String, QueryError> {
        let password = match &self.master_password {
            Some(password) => password,
            None => return Ok(PASSWORD_SENTINEL.to_string()),
        };

        let envelope = account
            .child("key")
            .map(|key| key.text())
            .unwrap_or_default();
        let key = KeyEnvelope::from_ascii(envelope)?.unlock(password)?;

        let ciphertext = BASE64_STANDARD
            .decode(account.child("pass").map(|p| p.text()).unwrap_or_default())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let plaintext = crypto::decrypt(&ciphertext, &key)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed.into())
    }

    fn shape(&self, value: &str) -> String {
        if self.options.truncate {
            truncate(value, TRUNCATE_LIMIT)
        } else {
            value.to_string()
        }
    }
}

fn reference_map<'d>(entries: Vec<&'d Element>) -> HashMap<i64, &'d str> {
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        let id: i64 = match entry.attribute("id").and_then(|id| id.parse().ok()) {
            Some(id) => id,
            None => continue,
        };
        let name = entry.child("name").map(|name| name.text()).unwrap_or_default();
        map.insert(id, name);
    }
    map
}

fn resolve<'d>(
    map: &HashMap<i64, &'d str>,
    account: &Element,
    field: &str,
    kind: &'static str,
) -> Result<&'d str, QueryError> {
    let id: i64 = account
        .child(field)
        .and_then(|node| node.text().parse().ok())
        .unwrap_or(-1);
    map.get(&id)
        .copied()
        .ok_or(QueryError::UnknownReference { kind, id })
}
