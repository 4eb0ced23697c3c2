//! # Session Credentials
//!
//! Generation, hashing and verification of the per-session bearer secret.
//!
//! ## Stored Format:
//! `sha256$<salt>$<digest>` where `salt` is 16 random bytes and `digest` is
//! `SHA-256(salt || secret)`, both base64 without padding. The salt is drawn
//! fresh for every hash, so hashing the same secret twice gives different
//! strings that both verify.
//!
//! The secret is a short random bearer token rather than a user password, so a
//! single salted digest is enough. Its strength is set by the configured
//! secret length.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to gather entropy for salt: {0}")]
    Entropy(String),
}

/// Generate a plaintext secret of `length` alphanumeric characters.
pub fn generate_secret(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn digest(salt: &[u8], secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

/// Hash `secret` with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String, CredentialError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CredentialError::Entropy(e.to_string()))?;

    Ok(format!(
        "{}${}${}",
        SCHEME,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(digest(&salt, secret))
    ))
}

/// Check `secret` against a value produced by [`hash_secret`].
///
/// The digest comparison is constant time. A malformed stored hash never
/// verifies.
pub fn verify_secret(secret: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(3, '$');
    let (Some(scheme), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }

    let (Ok(salt), Ok(expected)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(expected))
    else {
        return false;
    };

    digest(&salt, secret).as_slice().ct_eq(expected.as_slice()).into()
}
