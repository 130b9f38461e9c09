//! Cryptographic orchestration for derivault.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption (`encryption`)
//! - Argon2id credential-based master-key derivation (`kdf`)
//! - The HKDF/HMAC key hierarchy and zeroizing secret wrappers (`keys`)

pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, derive_master_key, ...};
pub use encryption::{decrypt, encrypt};
pub use kdf::{derive_master_key, derive_master_key_with_params, Argon2Params};
pub use keys::{EntriesKey, MasterKey, OuterKey, SecretBytes, SecretString, SiteSeed};
