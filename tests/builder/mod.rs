//! Programmatic export fixtures for integration tests
//!
//! Builds deterministic containers with seeded categories, clients,
//! tags and accounts, optionally encrypting each data section the way
//! sysPass does when exporting with a password.

#![allow(dead_code)]

use base64::prelude::{Engine as _, BASE64_STANDARD};
use spxd::crypto::{self, KeyEnvelope};
use spxd::xml::{fragment_to_string, write_document, Document, Element};
use std::path::{Path, PathBuf};

pub const XML_PASSWORD: &str = "syspass";
pub const MASTER_PASSWORD: &str = "12345678900";
pub const XML_VERSION: &str = "320.0";
pub const XML_TIME: i64 = 1563046531;

/// The plaintext secret seeded into account `id` when secrets are real
pub fn secret_for(id: usize) -> String {
    format!("secret-{}", id)
}

pub struct XmlBuilder {
    version: String,
    seed_count: usize,
    encrypt: bool,
    with_secrets: bool,
    signing_key: Option<String>,
}

impl XmlBuilder {
    pub fn new() -> XmlBuilder {
        XmlBuilder {
            version: XML_VERSION.to_string(),
            seed_count: 10,
            encrypt: false,
            with_secrets: false,
            signing_key: None,
        }
    }

    pub fn version(mut self, version: &str) -> XmlBuilder {
        self.version = version.to_string();
        self
    }

    pub fn seed_count(mut self, count: usize) -> XmlBuilder {
        self.seed_count = count;
        self
    }

    pub fn encrypted(mut self) -> XmlBuilder {
        self.encrypt = true;
        self
    }

    /// Seed real record envelopes and ciphertext instead of placeholders
    pub fn with_secrets(mut self) -> XmlBuilder {
        self.with_secrets = true;
        self
    }

    pub fn signed_with(mut self, key: &str) -> XmlBuilder {
        self.signing_key = Some(key.to_string());
        self
    }

    pub fn build(&self) -> String {
        let mut root = Element::new("Root");
        root.append_child(self.meta());

        let sections = [
            self.reference_table("Categories", "Category"),
            self.reference_table("Clients", "Client"),
            self.reference_table("Tags", "Tag"),
            self.accounts(),
        ];

        if self.encrypt {
            let mut encrypted = Element::new("Encrypted");
            encrypted.set_attribute(
                "hash",
                crypto::hash_password(XML_PASSWORD).expect("hashing fixture password"),
            );
            for section in sections {
                encrypted.append_child(encrypt_section(&section));
            }
            root.append_child(encrypted);
        } else {
            for section in sections {
                root.append_child(section);
            }
        }

        let document = Document::new(root);
        let mut buffer = Vec::new();
        write_document(&mut buffer, &document).expect("serializing fixture");
        String::from_utf8(buffer).expect("fixture is UTF-8")
    }

    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join("syspass_export.xml");
        std::fs::write(&path, self.build()).expect("writing fixture");
        path
    }

    fn meta(&self) -> Element {
        let mut meta = Element::new("Meta");
        meta.append_child(Element::with_text("Generator", "sysPass"));
        meta.append_child(Element::with_text("Version", &self.version));
        meta.append_child(Element::with_text("Time", XML_TIME.to_string()));
        let mut user = Element::with_text("User", "TestUser");
        user.set_attribute("id", "1");
        meta.append_child(user);
        let mut group = Element::with_text("Group", "TestGroup");
        group.set_attribute("id", "1");
        meta.append_child(group);
        if let Some(key) = &self.signing_key {
            let digest = "c0ffee00c0ffee00";
            let mut hash = Element::with_text("Hash", digest);
            hash.set_attribute("sign", crypto::sign_message(digest, key));
            meta.append_child(hash);
        }
        meta
    }

    fn reference_table(&self, section: &str, entry: &str) -> Element {
        let mut table = Element::new(section);
        for id in 1..=self.seed_count {
            let mut node = Element::new(entry);
            node.set_attribute("id", id.to_string());
            node.append_child(Element::with_text("name", format!("{} {}", entry, id)));
            node.append_child(Element::with_text(
                "description",
                format!("Seeded {} number {}", entry, id),
            ));
            table.append_child(node);
        }
        table
    }

    fn accounts(&self) -> Element {
        let mut accounts = Element::new("Accounts");
        for id in 1..=self.seed_count {
            let mut account = Element::new("Account");
            account.set_attribute("id", id.to_string());
            account.append_child(Element::with_text("name", format!("Account {}", id)));
            account.append_child(Element::with_text("clientId", id.to_string()));
            account.append_child(Element::with_text("categoryId", id.to_string()));
            account.append_child(Element::with_text("login", format!("user{}", id)));
            account.append_child(Element::with_text(
                "url",
                format!("https://host-{}.example.com", id),
            ));
            account.append_child(Element::with_text("notes", format!("Notes {}", id)));

            let (pass, key) = if self.with_secrets {
                let (envelope, secret_key) =
                    KeyEnvelope::lock(MASTER_PASSWORD).expect("locking record envelope");
                let ciphertext = crypto::encrypt(secret_for(id).as_bytes(), &secret_key);
                (BASE64_STANDARD.encode(ciphertext), envelope.to_ascii())
            } else {
                ("placeholder".to_string(), "placeholder".to_string())
            };
            account.append_child(Element::with_text("pass", pass));
            account.append_child(Element::with_text("key", key));

            let mut tags = Element::new("tags");
            let mut tag = Element::new("tag");
            tag.set_attribute("id", id.to_string());
            tags.append_child(tag);
            if id > 1 {
                let mut extra = Element::new("tag");
                extra.set_attribute("id", "1");
                tags.append_child(extra);
            }
            account.append_child(tags);

            accounts.append_child(account);
        }
        accounts
    }
}

fn encrypt_section(section: &Element) -> Element {
    let plaintext = fragment_to_string(section).expect("serializing section");
    let (envelope, key) = KeyEnvelope::lock(XML_PASSWORD).expect("locking section envelope");
    let ciphertext = crypto::encrypt(plaintext.as_bytes(), &key);

    let mut data = Element::with_text("Data", BASE64_STANDARD.encode(ciphertext));
    data.set_attribute("key", envelope.to_ascii());
    data
}

/// Flip one character inside the first `Data` ciphertext
pub fn tamper_first_data(xml: &str) -> String {
    let start = xml.find("<Data key=").expect("no Data node to tamper with");
    let content_at = xml[start..].find('>').expect("unterminated Data node") + start + 1;
    // stay clear of the base64 padding at the end
    let target = content_at + 10;
    let original = xml.as_bytes()[target] as char;
    let replacement = if original == 'A' { 'B' } else { 'A' };
    let mut tampered = String::with_capacity(xml.len());
    tampered.push_str(&xml[..target]);
    tampered.push(replacement);
    tampered.push_str(&xml[target + 1..]);
    tampered
}
