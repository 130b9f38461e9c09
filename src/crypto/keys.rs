//! The vault key hierarchy and zeroizing secret wrappers.
//!
//! From a single master key we derive:
//! - An **outer key** protecting the vault container envelope.
//! - An **entries key** from which per-entry seal keys and derived
//!   secrets are generated.
//!
//! HKDF (RFC 5869) uses the master key as input keying material (IKM)
//! and a context string (`info`) to produce independent sub-keys.
//! Per-site seeds come from HMAC-SHA256 under the entries key, bound to
//! a scope string, the site identifier, and a rotation counter.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{DerivaultError, Result};

/// Length of derived sub-keys (256 bits).
const KEY_LEN: usize = 32;

/// HKDF context for the container (outer) key.
const OUTER_INFO: &[u8] = b"derivault/outer-key";

/// HKDF context for the entries key.
const ENTRIES_INFO: &[u8] = b"derivault/entries-key";

/// Internal helper: run HKDF-SHA256 expand with the given `info`.
///
/// We skip the `extract` step and use the master key directly as the
/// pseudo-random key (PRK), because the master key already has high
/// entropy (it came from Argon2id).
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| DerivaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// The root of the key hierarchy, derived from (username, password).
///
/// Zeroes its memory on drop so the key cannot linger once the session
/// releases it.  Never serialized.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Derive the container (outer) key.  Idempotent: repeated calls
    /// yield bit-identical keys.
    pub fn derive_outer_key(&self) -> Result<OuterKey> {
        let mut bytes = hkdf_derive(&self.bytes, OUTER_INFO)?;
        let key = OuterKey { bytes };
        bytes.zeroize();
        Ok(key)
    }

    /// Derive the entries key.  Idempotent, like `derive_outer_key`.
    pub fn derive_entries_key(&self) -> Result<EntriesKey> {
        let mut bytes = hkdf_derive(&self.bytes, ENTRIES_INFO)?;
        let key = EntriesKey { bytes };
        bytes.zeroize();
        Ok(key)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Key protecting the vault container envelope.
///
/// Short-lived: handed to the container at open/create and not retained
/// by the session afterward.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct OuterKey {
    bytes: [u8; KEY_LEN],
}

impl OuterKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for OuterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OuterKey(..)")
    }
}

/// Key protecting entry payloads and feeding the secret generator.
///
/// Lives as long as the owning session is open.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct EntriesKey {
    bytes: [u8; KEY_LEN],
}

impl EntriesKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Derive a per-site seed: HMAC-SHA256 over
    /// `scope || be32(len(site)) || site || be32(counter)`.
    ///
    /// The scope string keeps consumers apart, so a seal key for entry
    /// "github" can never equal a password seed for site "github".
    pub fn site_seed(&self, scope: &[u8], site: &str, counter: u32) -> Result<SiteSeed> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.bytes)
            .map_err(|e| DerivaultError::KeyDerivationFailed(format!("HMAC init failed: {e}")))?;
        mac.update(scope);
        mac.update(&(site.len() as u32).to_be_bytes());
        mac.update(site.as_bytes());
        mac.update(&counter.to_be_bytes());

        let digest = mac.finalize().into_bytes();
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest);
        let seed = SiteSeed { bytes };
        bytes.zeroize();
        Ok(seed)
    }
}

impl std::fmt::Debug for EntriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EntriesKey(..)")
    }
}

/// A 32-byte deterministic seed bound to (scope, site, counter).
///
/// Intermediate material for seal keys and generated secrets; zeroed on
/// drop like the keys above.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SiteSeed {
    bytes: [u8; KEY_LEN],
}

impl SiteSeed {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for SiteSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SiteSeed(..)")
    }
}

/// Variable-length secret payload that zeroes its memory on drop.
///
/// Equality is constant-time so comparisons of secret material do not
/// leak positions of the first differing byte.  `Debug` never prints
/// the contents.
#[derive(Clone)]
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    /// Access the raw secret bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SecretBytes {}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes({} bytes)", self.0.len())
    }
}

/// A secret string (e.g. a generated password) that zeroes on drop.
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
    pub fn new(s: String) -> Self {
        Self(Zeroizing::new(s))
    }

    /// Access the secret as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for SecretString {}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> MasterKey {
        MasterKey::new([7u8; 32])
    }

    #[test]
    fn outer_and_entries_keys_differ() {
        let m = master();
        let outer = m.derive_outer_key().unwrap();
        let entries = m.derive_entries_key().unwrap();
        assert_ne!(outer.as_bytes(), entries.as_bytes());
    }

    #[test]
    fn derivation_is_idempotent() {
        let m = master();
        let a = m.derive_entries_key().unwrap();
        let b = m.derive_entries_key().unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn site_seed_scoping() {
        let k = master().derive_entries_key().unwrap();
        let a = k.site_seed(b"scope-a", "example.com", 1).unwrap();
        let b = k.site_seed(b"scope-b", "example.com", 1).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn site_seed_length_prefix_disambiguates() {
        // "ab" + counter bytes must not collide with "a" + shifted input.
        let k = master().derive_entries_key().unwrap();
        let a = k.site_seed(b"s", "ab", 1).unwrap();
        let b = k.site_seed(b"s", "a", 1).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn secret_bytes_equality() {
        let a = SecretBytes::from_slice(b"hunter2");
        let b = SecretBytes::from_slice(b"hunter2");
        let c = SecretBytes::from_slice(b"hunter3");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn secret_debug_is_redacted() {
        let s = SecretString::new("top secret".to_string());
        assert_eq!(format!("{s:?}"), "SecretString(..)");
    }
}
