//! Deterministic secret generation for derived fields.
//!
//! This module provides:
//! - `generate`: turn (entries key, site, counter, usage) into a secret.
//!   Pure: identical inputs always produce the identical secret, so
//!   derived secrets never need to be stored.
//! - `reveal`: produce the output a whole `Field` describes, deriving
//!   or passing stored payloads through shaped by their usage.
//! - `Ed25519Secret`: a derived signing keypair with OpenSSH public-key
//!   formatting.
//!
//! Passwords are shaped character-by-character from a 32-byte site
//! seed against named template presets, so a template name plus the
//! seed fully determines the password.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::codec::{DerivedUsage, Field, StoredUsage};
use crate::crypto::keys::{EntriesKey, SecretBytes, SecretString, SiteSeed};
use crate::errors::{DerivaultError, Result};

// ---------------------------------------------------------------------------
// Seed scopes
// ---------------------------------------------------------------------------

// Each usage derives under its own scope, so a password seed for a site
// can never equal a raw key or keypair seed for the same site.
const PASSWORD_SCOPE: &[u8] = b"derivault/seed/password";
const RAW_KEY_SCOPE: &[u8] = b"derivault/seed/raw";
const ED25519_SCOPE: &[u8] = b"derivault/seed/ed25519";

/// Scope for an Ed25519 seed: the usage discriminator is folded in,
/// length-prefixed, so distinct usages yield independent keypairs.
fn ed25519_scope(usage: &str) -> Vec<u8> {
    let mut scope = Vec::with_capacity(ED25519_SCOPE.len() + 4 + usage.len());
    scope.extend_from_slice(ED25519_SCOPE);
    scope.extend_from_slice(&(usage.len() as u32).to_be_bytes());
    scope.extend_from_slice(usage.as_bytes());
    scope
}

// ---------------------------------------------------------------------------
// Password templates
// ---------------------------------------------------------------------------

const TEMPLATES_MAXIMUM: &[&str] = &["anoxxxxxxxxxxxxxxxxx", "axxxxxxxxxxxxxxxxxno"];

const TEMPLATES_LONG: &[&str] = &[
    "CvcvnoCvcvCvcv",
    "CvcvCvcvnoCvcv",
    "CvcvCvcvCvcvno",
    "CvccnoCvcvCvcv",
    "CvccCvcvnoCvcv",
    "CvccCvcvCvcvno",
    "CvcvnoCvccCvcv",
    "CvcvCvccnoCvcv",
    "CvcvCvccCvcvno",
    "CvcvnoCvcvCvcc",
    "CvcvCvcvnoCvcc",
    "CvcvCvcvCvccno",
    "CvccnoCvccCvcv",
    "CvccCvccnoCvcv",
    "CvccCvccCvcvno",
    "CvcvnoCvccCvcc",
    "CvcvCvccnoCvcc",
    "CvcvCvccCvccno",
    "CvccnoCvcvCvcc",
    "CvccCvcvnoCvcc",
    "CvccCvcvCvccno",
];

const TEMPLATES_MEDIUM: &[&str] = &["CvcnoCvc", "CvcCvcno"];

const TEMPLATES_SHORT: &[&str] = &["Cvcn"];

const TEMPLATES_BASIC: &[&str] = &["aaanaaan", "aannaaan", "aaannaaa"];

const TEMPLATES_PIN: &[&str] = &["nnnn"];

/// Resolve a template preset by name.
fn pick_templates(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "Maximum" => Some(TEMPLATES_MAXIMUM),
        "Long" => Some(TEMPLATES_LONG),
        "Medium" => Some(TEMPLATES_MEDIUM),
        "Short" => Some(TEMPLATES_SHORT),
        "Basic" => Some(TEMPLATES_BASIC),
        "Pin" => Some(TEMPLATES_PIN),
        _ => None,
    }
}

/// Character alphabet for one template class, `None` for characters
/// that are not a class (they pass through as literals).
fn class_chars(class: char) -> Option<&'static [u8]> {
    match class {
        'V' => Some(b"AEIOU"),
        'C' => Some(b"BCDFGHJKLMNPQRSTVWXYZ"),
        'v' => Some(b"aeiou"),
        'c' => Some(b"bcdfghjklmnpqrstvwxyz"),
        'A' => Some(b"AEIOUBCDFGHJKLMNPQRSTVWXYZ"),
        'a' => Some(b"AEIOUaeiouBCDFGHJKLMNPQRSTVWXYZbcdfghjklmnpqrstvwxyz"),
        'n' => Some(b"0123456789"),
        'o' => Some(b"@&%?,=[]_:-+*$#!'^~;()/."),
        'x' => Some(b"AEIOUaeiouBCDFGHJKLMNPQRSTVWXYZbcdfghjklmnpqrstvwxyz0123456789!@#$%^&*()"),
        _ => None,
    }
}

/// Shape a password from a site seed.
///
/// Seed byte 0 picks the template; each following byte picks one
/// character from its class alphabet.  The longest template is 20
/// characters, which the 32-byte seed always covers.
fn shape_password(seed: &SiteSeed, templates: &[&str]) -> SecretString {
    let bytes = seed.as_bytes();
    let template = templates[bytes[0] as usize % templates.len()];
    let mut out = String::with_capacity(template.len());
    for (class, byte) in template.chars().zip(&bytes[1..]) {
        match class_chars(class) {
            Some(chars) => out.push(chars[*byte as usize % chars.len()] as char),
            None => out.push(class),
        }
    }
    SecretString::new(out)
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A revealed secret, shaped by the field usage that produced it.
#[derive(Debug)]
pub enum SecretOutput {
    /// Plain text meant to be shown openly.
    OpenText(String),
    /// Text to display guardedly (passwords); zeroed on drop.
    PrivateText(SecretString),
    /// Raw bytes never meant for direct display; zeroed on drop.
    PrivateBytes(SecretBytes),
    /// A derived signing keypair.
    Ed25519Key(Ed25519Secret),
}

/// A derived Ed25519 signing keypair plus its usage discriminator.
///
/// The signing key zeroes on drop.  The public half can be exported as
/// an OpenSSH `authorized_keys` line.
pub struct Ed25519Secret {
    usage: String,
    signing: SigningKey,
}

impl Ed25519Secret {
    /// Build a keypair deterministically from a 32-byte seed.
    pub fn from_seed(usage: &str, seed: &[u8; 32]) -> Self {
        Self {
            usage: usage.to_string(),
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// The usage discriminator this keypair was derived for.
    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Sign a message with the derived key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    /// Format the public half as an OpenSSH public-key line:
    /// `ssh-ed25519 <base64 blob> <comment>`.
    pub fn ssh_public_key(&self, comment: &str) -> String {
        let verifying = self.signing.verifying_key();
        // SSH wire format: length-prefixed algorithm name, then the
        // length-prefixed 32-byte public key.
        let mut raw = Vec::with_capacity(4 + 11 + 4 + 32);
        raw.extend_from_slice(&11u32.to_be_bytes());
        raw.extend_from_slice(b"ssh-ed25519");
        raw.extend_from_slice(&32u32.to_be_bytes());
        raw.extend_from_slice(verifying.as_bytes());
        format!("ssh-ed25519 {} {}", BASE64.encode(&raw), comment)
    }
}

impl std::fmt::Debug for Ed25519Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Secret({})", self.usage)
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generate the secret a derived usage describes.
///
/// Deterministic in all four inputs.  Incrementing `counter` rotates
/// the secret; distinct sites and usages are isolated because each is
/// bound into the seed derivation.
pub fn generate(
    entries_key: &EntriesKey,
    site: &str,
    counter: u32,
    usage: &DerivedUsage,
) -> Result<SecretOutput> {
    match usage {
        DerivedUsage::Password { template } => {
            let templates = pick_templates(template)
                .ok_or_else(|| DerivaultError::UnknownTemplate(template.clone()))?;
            let seed = entries_key.site_seed(PASSWORD_SCOPE, site, counter)?;
            Ok(SecretOutput::PrivateText(shape_password(&seed, templates)))
        }
        DerivedUsage::Ed25519Key { usage } => {
            let scope = ed25519_scope(usage);
            let seed = entries_key.site_seed(&scope, site, counter)?;
            Ok(SecretOutput::Ed25519Key(Ed25519Secret::from_seed(
                usage,
                seed.as_bytes(),
            )))
        }
        DerivedUsage::RawKey => {
            let seed = entries_key.site_seed(RAW_KEY_SCOPE, site, counter)?;
            Ok(SecretOutput::PrivateBytes(SecretBytes::from_slice(
                seed.as_bytes(),
            )))
        }
        // Substituting a default here would silently change the secret
        // a previous write derived for the same counter.
        DerivedUsage::Unreadable => Err(DerivaultError::UnreadableUsage),
    }
}

/// Produce the output a whole field describes.
///
/// For derived fields the entry name stands in for a missing
/// `site_name`.  Stored payloads pass through shaped by usage: `Text`
/// opens as plain text, `Password` stays private, and anything that is
/// not valid UTF-8 (or whose usage is unreadable) is handed back as
/// private bytes rather than mutated into replacement characters.
pub fn reveal(entries_key: &EntriesKey, entry_name: &str, field: &Field) -> Result<SecretOutput> {
    match field {
        Field::Derived {
            counter,
            site_name,
            usage,
        } => {
            let site = site_name.as_deref().unwrap_or(entry_name);
            generate(entries_key, site, *counter, usage)
        }
        Field::Stored { data, usage } => match usage {
            StoredUsage::Text => match std::str::from_utf8(data.expose()) {
                Ok(text) => Ok(SecretOutput::OpenText(text.to_string())),
                Err(_) => Ok(SecretOutput::PrivateBytes(data.clone())),
            },
            StoredUsage::Password => match std::str::from_utf8(data.expose()) {
                Ok(text) => Ok(SecretOutput::PrivateText(SecretString::new(
                    text.to_string(),
                ))),
                Err(_) => Ok(SecretOutput::PrivateBytes(data.clone())),
            },
            StoredUsage::Unreadable => Ok(SecretOutput::PrivateBytes(data.clone())),
        },
        Field::Unreadable => Err(DerivaultError::UnreadableField),
    }
}
