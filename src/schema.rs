//! Structural validation of the export format
//!
//! Mirrors the published export schema: a `Root` element carrying `Meta`
//! plus the four data sections, with ciphertext sections held in an
//! `Encrypted` element until they are decrypted and spliced back in.
//! Validation runs both on the freshly loaded document and again after
//! splicing, so a ciphertext substitution that decrypts to well-formed
//! but foreign XML still fails loudly.

use crate::xml::{Document, Element};
use thiserror::Error;

#[derive(Debug, Error)]
/// The document does not conform to the export schema
pub enum SchemaError {
    /// Schema violation, with the offending node and reason
    #[error("Invalid export schema: {0}")]
    Invalid(String),
}

fn invalid(detail: impl Into<String>) -> SchemaError {
    SchemaError::Invalid(detail.into())
}

const TOP_LEVEL: [&str; 6] = [
    "Meta",
    "Categories",
    "Clients",
    "Tags",
    "Accounts",
    "Encrypted",
];

/// Validate a document against the export schema
pub fn validate(document: &Document) -> Result<(), SchemaError> {
    let root = document.root();
    if root.name() != "Root" {
        return Err(invalid(format!(
            "root element is <{}>, expected <Root>",
            root.name()
        )));
    }

    for section in TOP_LEVEL {
        if root.count_children_named(section) > 1 {
            return Err(invalid(format!("<{}> appears more than once", section)));
        }
    }
    for child in root.children() {
        if !TOP_LEVEL.contains(&child.name()) {
            return Err(invalid(format!("unexpected element <{}>", child.name())));
        }
    }

    if let Some(meta) = root.child("Meta") {
        validate_meta(meta)?;
    }
    if let Some(categories) = root.child("Categories") {
        validate_reference_table(categories, "Category")?;
    }
    if let Some(clients) = root.child("Clients") {
        validate_reference_table(clients, "Client")?;
    }
    if let Some(tags) = root.child("Tags") {
        validate_reference_table(tags, "Tag")?;
    }
    if let Some(accounts) = root.child("Accounts") {
        validate_accounts(accounts)?;
    }
    if let Some(encrypted) = root.child("Encrypted") {
        validate_encrypted(encrypted)?;
    }
    Ok(())
}

fn validate_meta(meta: &Element) -> Result<(), SchemaError> {
    let version = meta
        .child("Version")
        .ok_or_else(|| invalid("<Meta> is missing <Version>"))?;
    if version.text().is_empty() {
        return Err(invalid("<Version> is empty"));
    }
    let time = meta
        .child("Time")
        .ok_or_else(|| invalid("<Meta> is missing <Time>"))?;
    if time.text().parse::<i64>().is_err() {
        return Err(invalid(format!(
            "<Time> is not an integer timestamp: {:?}",
            time.text()
        )));
    }
    for named in ["User", "Group"] {
        if let Some(node) = meta.child(named) {
            require_int_attribute(node, "id")?;
        }
    }
    Ok(())
}

fn validate_reference_table(table: &Element, entry_name: &str) -> Result<(), SchemaError> {
    for entry in table.children() {
        if entry.name() != entry_name {
            return Err(invalid(format!(
                "unexpected element <{}> under <{}>",
                entry.name(),
                table.name()
            )));
        }
        require_int_attribute(entry, "id")?;
        if entry.child("name").is_none() {
            return Err(invalid(format!("<{}> is missing <name>", entry_name)));
        }
    }
    Ok(())
}

const ACCOUNT_REQUIRED: [&str; 8] = [
    "name", "clientId", "categoryId", "login", "url", "notes", "pass", "key",
];

fn validate_accounts(accounts: &Element) -> Result<(), SchemaError> {
    for account in accounts.children() {
        if account.name() != "Account" {
            return Err(invalid(format!(
                "unexpected element <{}> under <Accounts>",
                account.name()
            )));
        }
        for field in ACCOUNT_REQUIRED {
            if account.child(field).is_none() {
                return Err(invalid(format!("<Account> is missing <{}>", field)));
            }
        }
        for field in ["clientId", "categoryId"] {
            if let Some(node) = account.child(field) {
                if node.text().parse::<i64>().is_err() {
                    return Err(invalid(format!(
                        "<{}> is not an integer id: {:?}",
                        field,
                        node.text()
                    )));
                }
            }
        }
        if let Some(tags) = account.child("tags") {
            for tag in tags.children() {
                if tag.name() != "tag" {
                    return Err(invalid(format!(
                        "unexpected element <{}> under <tags>",
                        tag.name()
                    )));
                }
                require_int_attribute(tag, "id")?;
            }
        }
    }
    Ok(())
}

fn validate_encrypted(encrypted: &Element) -> Result<(), SchemaError> {
    for data in encrypted.children() {
        if data.name() != "Data" {
            return Err(invalid(format!(
                "unexpected element <{}> under <Encrypted>",
                data.name()
            )));
        }
        match data.attribute("key") {
            Some(key) if !key.is_empty() => {}
            _ => return Err(invalid("<Data> is missing its key attribute")),
        }
    }
    Ok(())
}

fn require_int_attribute(element: &Element, attribute: &str) -> Result<(), SchemaError> {
    match element.attribute(attribute) {
        Some(value) if value.parse::<i64>().is_ok() => Ok(()),
        Some(value) => Err(invalid(format!(
            "<{}> attribute {} is not an integer: {:?}",
            element.name(),
            attribute,
            value
        ))),
        None => Err(invalid(format!(
            "<{}> is missing attribute {}",
            element.name(),
            attribute
        ))),
    }
}
