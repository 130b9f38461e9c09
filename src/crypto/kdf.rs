//! Master-key derivation using Argon2id.
//!
//! Argon2id is a memory-hard KDF that protects against brute-force and
//! GPU-based attacks.  The master key is derived from (username, password)
//! alone: the salt is computed from the username, so the same credentials
//! always reconstruct the same key and nothing has to be persisted.

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::crypto::keys::MasterKey;
use crate::errors::{DerivaultError, Result};

/// Length of the derived master key in bytes (256 bits).
const KEY_LEN: usize = 32;

/// Domain separator mixed into the per-user salt.
const SALT_CONTEXT: &[u8] = b"derivault/salt/v1";

/// Configurable Argon2id parameters.
///
/// These map 1:1 to the fields in `Settings` so callers can pass
/// whatever the user configured in `.derivault.toml`.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

impl Argon2Params {
    /// Reject cost settings below the floor this crate will run with.
    ///
    /// Called on every derivation; `Settings::load` also calls it so a
    /// weak config file is rejected when it is read, not at first use.
    pub fn validate(&self) -> Result<()> {
        if self.memory_kib < MIN_MEMORY_KIB {
            return Err(DerivaultError::KeyDerivationFailed(format!(
                "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
                self.memory_kib
            )));
        }
        if self.iterations < 1 {
            return Err(DerivaultError::KeyDerivationFailed(
                "Argon2 iterations must be at least 1".into(),
            ));
        }
        if self.parallelism < 1 {
            return Err(DerivaultError::KeyDerivationFailed(
                "Argon2 parallelism must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Derive the master key from a username and password.
///
/// Uses the default Argon2id parameters (64 MB, 3 iterations, 4 lanes).
/// Prefer `derive_master_key_with_params` when you have a `Settings`.
pub fn derive_master_key(username: &str, password: &str) -> Result<MasterKey> {
    derive_master_key_with_params(username, password, &Argon2Params::default())
}

/// Derive the master key with explicit Argon2id parameters.
///
/// Deterministic: the same credentials + params always produce the same key,
/// including for an empty password (the stretching still runs in full).
/// Params below the cost floor are rejected before any hashing.
pub fn derive_master_key_with_params(
    username: &str,
    password: &str,
    argon2_params: &Argon2Params,
) -> Result<MasterKey> {
    argon2_params.validate()?;

    let params = Params::new(
        argon2_params.memory_kib,
        argon2_params.iterations,
        argon2_params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| DerivaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = user_salt(username);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), &salt, &mut key)
        .map_err(|e| {
            DerivaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}"))
        })?;

    let master = MasterKey::new(key);
    key.zeroize();
    Ok(master)
}

/// Compute the deterministic per-user salt: SHA-256 over a domain
/// separator and the username.
fn user_salt(username: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SALT_CONTEXT);
    hasher.update(username.as_bytes());
    hasher.finalize().into()
}
