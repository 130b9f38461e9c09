//! AES-256-GCM authenticated encryption.
//!
//! `encrypt` draws a fresh random 12-byte nonce per call and prepends it
//! to the ciphertext, so callers store a single self-contained blob:
//!
//!   [ 12-byte nonce | ciphertext + 16-byte auth tag ]
//!
//! `decrypt` reports failure without detail: the error does not say
//! whether the key was wrong or the data was tampered with.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};

use crate::errors::{DerivaultError, Result};

/// Size of the AES-256-GCM nonce in bytes.
const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` with a 32-byte `key`.
///
/// Returns nonce || ciphertext.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| DerivaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| DerivaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt a blob produced by `encrypt`.
///
/// The first 12 bytes must be the nonce.
pub fn decrypt(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(DerivaultError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| DerivaultError::DecryptionFailed)?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| DerivaultError::DecryptionFailed)?;

    Ok(plaintext)
}

/// Fill `buf` with random bytes from the OS entropy source.
///
/// Used for container padding; nonces come from `encrypt` itself.
pub fn random_bytes(buf: &mut [u8]) -> Result<()> {
    use aes_gcm::aead::rand_core::RngCore;
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| DerivaultError::EncryptionFailed(format!("entropy source failed: {e}")))?;
    Ok(())
}
