mod builder;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use builder::{tamper_first_data, XmlBuilder, XML_PASSWORD};
use spxd::container::{from_bytes, UnsealError};
use spxd::crypto::{self, CryptoError, KeyEnvelope};
use spxd::errors::IntegrityError;
use spxd::Search;

#[test]
fn decrypts_with_correct_password() {
    let encrypted = XmlBuilder::new().encrypted().build();
    let plain = XmlBuilder::new().build();

    let unsealed = from_bytes(encrypted.as_bytes())
        .unwrap()
        .unseal(Some(XML_PASSWORD), None)
        .unwrap();
    let reference = from_bytes(plain.as_bytes())
        .unwrap()
        .unseal(None, None)
        .unwrap();

    let decrypted_accounts = Search::new(&unsealed).all().unwrap();
    let reference_accounts = Search::new(&reference).all().unwrap();
    assert_eq!(decrypted_accounts.len(), 10);
    assert_eq!(decrypted_accounts, reference_accounts);
}

#[test]
fn wrong_password_caught_by_hash_guard() {
    let xml = XmlBuilder::new().encrypted().seed_count(2).build();
    let result = from_bytes(xml.as_bytes())
        .unwrap()
        .unseal(Some("not the password"), None);
    assert!(matches!(
        result,
        Err(UnsealError::Crypto(CryptoError::WrongPassword))
    ));
}

#[test]
fn encrypted_export_requires_a_password() {
    let xml = XmlBuilder::new().encrypted().seed_count(2).build();
    let result = from_bytes(xml.as_bytes()).unwrap().unseal(None, None);
    assert!(matches!(result, Err(UnsealError::PasswordRequired)));
}

#[test]
fn tampered_ciphertext_aborts_unsealing() {
    let xml = tamper_first_data(&XmlBuilder::new().encrypted().seed_count(2).build());
    let result = from_bytes(xml.as_bytes())
        .unwrap()
        .unseal(Some(XML_PASSWORD), None);
    assert!(matches!(
        result,
        Err(UnsealError::Crypto(CryptoError::DecryptionFailed))
    ));
}

#[test]
fn signature_verifies_with_matching_key() {
    let xml = XmlBuilder::new().signed_with("signing key").seed_count(2).build();
    let container = from_bytes(xml.as_bytes())
        .unwrap()
        .unseal(None, Some("signing key"))
        .unwrap();
    assert_eq!(container.xml_version(), "320.0");
}

#[test]
fn signature_mismatch_is_fatal() {
    let xml = XmlBuilder::new().signed_with("signing key").seed_count(2).build();
    let result = from_bytes(xml.as_bytes())
        .unwrap()
        .unseal(None, Some("some other key"));
    assert!(matches!(result, Err(UnsealError::SignatureInvalid)));
}

#[test]
fn undecodable_signature_treated_as_mismatch() {
    let xml = XmlBuilder::new().signed_with("signing key").seed_count(2).build();
    let start = xml.find("sign=\"").unwrap() + "sign=\"".len();
    let end = start + xml[start..].find('"').unwrap();
    let with_junk_sign = format!("{}aé9{}", &xml[..start], &xml[end..]);

    let result = from_bytes(with_junk_sign.as_bytes())
        .unwrap()
        .unseal(None, Some("signing key"));
    assert!(matches!(result, Err(UnsealError::SignatureInvalid)));
}

#[test]
fn absent_signature_reported_when_key_given() {
    let xml = XmlBuilder::new().seed_count(2).build();
    let result = from_bytes(xml.as_bytes())
        .unwrap()
        .unseal(None, Some("signing key"));
    assert!(matches!(
        result,
        Err(UnsealError::Integrity(IntegrityError::SignatureNotFound))
    ));
}

fn single_section_capsule(plaintext: &[u8]) -> String {
    let (envelope, key) = KeyEnvelope::lock(XML_PASSWORD).unwrap();
    let ciphertext = BASE64_STANDARD.encode(crypto::encrypt(plaintext, &key));
    format!(
        "<Root><Meta><Version>320.0</Version><Time>0</Time></Meta>\
         <Encrypted hash=\"\"><Data key=\"{}\">{}</Data></Encrypted></Root>",
        envelope.to_ascii(),
        ciphertext
    )
}

#[test]
fn garbled_plaintext_rejected_as_fragment() {
    let xml = single_section_capsule(b"<<< definitely not markup");
    let result = from_bytes(xml.as_bytes())
        .unwrap()
        .unseal(Some(XML_PASSWORD), None);
    assert!(matches!(result, Err(UnsealError::FragmentInvalid(_))));
}

#[test]
fn substituted_foreign_fragment_fails_schema_revalidation() {
    // well formed, decrypts cleanly, but is not part of the export format
    let xml = single_section_capsule(b"<Bogus><entry/></Bogus>");
    let result = from_bytes(xml.as_bytes())
        .unwrap()
        .unseal(Some(XML_PASSWORD), None);
    assert!(matches!(result, Err(UnsealError::Schema(_))));
}
