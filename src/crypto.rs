//! Key envelopes and authenticated encryption for export payloads
//!
//! This module knows nothing about XML. It operates on byte payloads,
//! passwords and serialized key capsules, which keeps it testable on
//! its own.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const ENVELOPE_MAGIC: &[u8; 4] = b"SPXK";
const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;
const KEY_LEN: usize = 32;
// 32 byte key plus one full PKCS7 padding block
const WRAPPED_KEY_LEN: usize = 48;

const KDF_MEMORY_KIB: u32 = 65536;
const KDF_ITERATIONS: u32 = 2;
const KDF_LANES: u32 = 1;

#[derive(Debug, Error)]
/// Errors from envelope and payload cryptography
pub enum CryptoError {
    /// The password did not match the capsule or hash guard
    #[error("Wrong password")]
    WrongPassword,
    /// Ciphertext failed its integrity check or did not decrypt
    #[error("Decryption failed - corrupt ciphertext or wrong key")]
    DecryptionFailed,
    /// A serialized key envelope could not be parsed
    #[error("Malformed key envelope")]
    MalformedEnvelope,
    /// The key derivation function rejected its parameters
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

fn kdf_config(hash_length: u32) -> argon2::Config<'static> {
    argon2::Config {
        variant: argon2::Variant::Argon2id,
        mem_cost: KDF_MEMORY_KIB,
        time_cost: KDF_ITERATIONS,
        lanes: KDF_LANES,
        hash_length,
        ..argon2::Config::default()
    }
}

/// Derive the wrap cipher key and wrap MAC key from a password
fn wrap_keys(password: &str, salt: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let derived = argon2::hash_raw(password.as_bytes(), salt, &kdf_config(64))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(Zeroizing::new(derived))
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// A raw symmetric key recovered from (or sealed into) a [`KeyEnvelope`]
///
/// The key material is wiped from memory on drop.
pub struct SecretKey(Zeroizing<[u8; KEY_LEN]>);

impl SecretKey {
    /// Generate a fresh random key from OS randomness
    pub fn generate() -> SecretKey {
        SecretKey(Zeroizing::new(random_bytes()))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// A password-wrapped capsule holding one randomly generated symmetric key
///
/// Envelopes serialize to an ASCII-safe string so they can be carried in
/// XML attributes. Wrapping is authenticated; unlocking with the wrong
/// password fails closed without releasing any key material.
pub struct KeyEnvelope {
    salt: [u8; SALT_LEN],
    iv: [u8; IV_LEN],
    wrapped: [u8; WRAPPED_KEY_LEN],
    mac: [u8; MAC_LEN],
}

impl KeyEnvelope {
    /// Generate a fresh key and wrap it under `password`
    ///
    /// Every call produces a new, independent envelope and key.
    pub fn lock(password: &str) -> Result<(KeyEnvelope, SecretKey), CryptoError> {
        let key = SecretKey::generate();
        let envelope = KeyEnvelope::seal(&key, password)?;
        Ok((envelope, key))
    }

    /// Wrap an existing key under `password`
    pub fn seal(key: &SecretKey, password: &str) -> Result<KeyEnvelope, CryptoError> {
        let salt: [u8; SALT_LEN] = random_bytes();
        let iv: [u8; IV_LEN] = random_bytes();
        let derived = wrap_keys(password, &salt)?;
        let (cipher_key, mac_key) = derived.split_at(KEY_LEN);

        let ct = Aes256CbcEnc::new_from_slices(cipher_key, &iv)
            .expect("fixed length key and IV")
            .encrypt_padded_vec_mut::<Pkcs7>(key.as_bytes());
        let mut wrapped = [0u8; WRAPPED_KEY_LEN];
        wrapped.copy_from_slice(&ct);

        let mut mac = HmacSha256::new_from_slice(mac_key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        mac.update(ENVELOPE_MAGIC);
        mac.update(&salt);
        mac.update(&iv);
        mac.update(&wrapped);
        let tag = mac.finalize().into_bytes();
        let mut mac_bytes = [0u8; MAC_LEN];
        mac_bytes.copy_from_slice(&tag);

        Ok(KeyEnvelope {
            salt,
            iv,
            wrapped,
            mac: mac_bytes,
        })
    }

    /// Recover the wrapped key with the original password
    pub fn unlock(&self, password: &str) -> Result<SecretKey, CryptoError> {
        let derived = wrap_keys(password, &self.salt)?;
        let (cipher_key, mac_key) = derived.split_at(KEY_LEN);

        let mut mac = HmacSha256::new_from_slice(mac_key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        mac.update(ENVELOPE_MAGIC);
        mac.update(&self.salt);
        mac.update(&self.iv);
        mac.update(&self.wrapped);
        mac.verify_slice(&self.mac)
            .map_err(|_| CryptoError::WrongPassword)?;

        let mut plain = Aes256CbcDec::new_from_slices(cipher_key, &self.iv)
            .expect("fixed length key and IV")
            .decrypt_padded_vec_mut::<Pkcs7>(&self.wrapped)
            .map_err(|_| CryptoError::WrongPassword)?;

        if plain.len() != KEY_LEN {
            plain.zeroize();
            return Err(CryptoError::WrongPassword);
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&plain);
        plain.zeroize();
        Ok(SecretKey(key))
    }

    /// Serialize to an ASCII-safe string suitable for an XML attribute
    pub fn to_ascii(&self) -> String {
        let mut raw = Vec::with_capacity(4 + SALT_LEN + IV_LEN + WRAPPED_KEY_LEN + MAC_LEN);
        raw.extend_from_slice(ENVELOPE_MAGIC);
        raw.extend_from_slice(&self.salt);
        raw.extend_from_slice(&self.iv);
        raw.extend_from_slice(&self.wrapped);
        raw.extend_from_slice(&self.mac);
        BASE64_STANDARD.encode(raw)
    }

    /// Parse a serialized envelope
    pub fn from_ascii(serialized: &str) -> Result<KeyEnvelope, CryptoError> {
        let raw = BASE64_STANDARD
            .decode(serialized.trim())
            .map_err(|_| CryptoError::MalformedEnvelope)?;
        if raw.len() != 4 + SALT_LEN + IV_LEN + WRAPPED_KEY_LEN + MAC_LEN
            || &raw[..4] != ENVELOPE_MAGIC
        {
            return Err(CryptoError::MalformedEnvelope);
        }
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        let mut wrapped = [0u8; WRAPPED_KEY_LEN];
        let mut mac = [0u8; MAC_LEN];
        let mut offset = 4;
        salt.copy_from_slice(&raw[offset..offset + SALT_LEN]);
        offset += SALT_LEN;
        iv.copy_from_slice(&raw[offset..offset + IV_LEN]);
        offset += IV_LEN;
        wrapped.copy_from_slice(&raw[offset..offset + WRAPPED_KEY_LEN]);
        offset += WRAPPED_KEY_LEN;
        mac.copy_from_slice(&raw[offset..offset + MAC_LEN]);
        Ok(KeyEnvelope {
            salt,
            iv,
            wrapped,
            mac,
        })
    }
}

/// Per-payload subkey for the block cipher
fn payload_cipher_key(salt: &[u8], key: &SecretKey) -> Zeroizing<[u8; KEY_LEN]> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    out.copy_from_slice(&digest);
    out
}

/// Per-payload subkey for the authentication MAC
fn payload_mac_key(salt: &[u8], key: &SecretKey) -> Zeroizing<[u8; 64]> {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&digest);
    out
}

/// Encrypt an arbitrary byte payload under `key`
///
/// Output layout is `salt || iv || ciphertext || mac`, with fresh salt
/// and IV for every call.
pub fn encrypt(plaintext: &[u8], key: &SecretKey) -> Vec<u8> {
    let salt: [u8; SALT_LEN] = random_bytes();
    let iv: [u8; IV_LEN] = random_bytes();
    let cipher_key = payload_cipher_key(&salt, key);
    let mac_key = payload_mac_key(&salt, key);

    let ct = Aes256CbcEnc::new_from_slices(cipher_key.as_slice(), &iv)
        .expect("fixed length key and IV")
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut mac =
        HmacSha256::new_from_slice(mac_key.as_slice()).expect("HMAC accepts any key length");
    mac.update(&salt);
    mac.update(&iv);
    mac.update(&ct);
    let tag = mac.finalize().into_bytes();

    let mut out = Vec::with_capacity(SALT_LEN + IV_LEN + ct.len() + MAC_LEN);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ct);
    out.extend_from_slice(&tag);
    out
}

/// Decrypt a payload produced by [`encrypt`]
///
/// Fails closed on truncation, tampering or a wrong key. No partially
/// decrypted data is ever returned.
pub fn decrypt(ciphertext: &[u8], key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    // smallest valid payload is one padded block
    if ciphertext.len() < SALT_LEN + IV_LEN + 16 + MAC_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (salt, rest) = ciphertext.split_at(SALT_LEN);
    let (iv, rest) = rest.split_at(IV_LEN);
    let (ct, tag) = rest.split_at(rest.len() - MAC_LEN);
    if ct.len() % 16 != 0 {
        return Err(CryptoError::DecryptionFailed);
    }

    let mac_key = payload_mac_key(salt, key);
    let mut mac =
        HmacSha256::new_from_slice(mac_key.as_slice()).expect("HMAC accepts any key length");
    mac.update(salt);
    mac.update(iv);
    mac.update(ct);
    mac.verify_slice(tag)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let cipher_key = payload_cipher_key(salt, key);
    Aes256CbcDec::new_from_slices(cipher_key.as_slice(), iv)
        .expect("fixed length key and IV")
        .decrypt_padded_vec_mut::<Pkcs7>(ct)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Produce a salted, one-way hash of a password
///
/// Used as the fast-fail guard on encrypted sections. Verifying the
/// hash proves the password matches, not that any ciphertext wrapped
/// under it is recoverable.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let salt: [u8; SALT_LEN] = random_bytes();
    argon2::hash_encoded(password.as_bytes(), &salt, &kdf_config(32))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Check a password against a hash from [`hash_password`]
pub fn verify_password(password: &str, encoded: &str) -> bool {
    argon2::verify_encoded(encoded, password.as_bytes()).unwrap_or(false)
}

/// Sign a message with a keyed MAC, returned hex encoded
pub fn sign_message(message: &str, key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    to_hex_string(&mac.finalize().into_bytes())
}

/// Verify a hex encoded signature produced by [`sign_message`]
pub fn verify_message(message: &str, key: &str, signature: &str) -> bool {
    let expected = match from_hex_string(signature) {
        Some(bytes) => bytes,
        None => return false,
    };
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn to_hex_string(data: &[u8]) -> String {
    use std::fmt::Write;
    let mut output = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(output, "{:02x}", byte);
    }
    output
}

fn from_hex_string(hex: &str) -> Option<Vec<u8>> {
    // byte-offset slicing below requires single byte characters
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
