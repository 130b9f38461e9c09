//! Container envelope: framing, sealing and atomic writes.
//!
//! A `.vault` container has this layout:
//!
//! ```text
//! [DVLT: 4 bytes][version: 1 byte][12-byte nonce | ciphertext + tag]
//! ```
//!
//! - **Magic** (`DVLT`): identifies the file as a derivault container.
//! - **Version**: format version (currently `1`).
//! - **Sealed body**: the container body encrypted with AES-256-GCM
//!   under the outer key (nonce prepended, see `crypto::encryption`).
//!
//! Framing problems (bad magic, unknown version, short file) are
//! reported as `InvalidContainer`; they are detectable without any key
//! material, so the distinction leaks nothing about credentials.  A
//! body that will not decrypt is `DecryptionFailed`, which does not say
//! whether the credentials were wrong or the file corrupt.

use std::fs;
use std::path::Path;

use zeroize::Zeroizing;

use crate::crypto::encryption;
use crate::crypto::keys::OuterKey;
use crate::errors::{DerivaultError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every container.
const MAGIC: &[u8; 4] = b"DVLT";

/// Current container format version.
pub const CURRENT_VERSION: u8 = 1;

/// Fixed-size prefix: 4 (magic) + 1 (version).
const PREFIX_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// Seal a plaintext body into a complete container image.
pub fn seal_container(outer_key: &OuterKey, body: &[u8]) -> Result<Vec<u8>> {
    let sealed = encryption::encrypt(outer_key.as_bytes(), body)?;

    let mut image = Vec::with_capacity(PREFIX_LEN + sealed.len());
    image.extend_from_slice(MAGIC);
    image.push(CURRENT_VERSION);
    image.extend_from_slice(&sealed);
    Ok(image)
}

/// Open a container image and return the plaintext body.
///
/// The body is wrapped in `Zeroizing` so the decrypted bytes are wiped
/// once the caller is done parsing them.
pub fn open_container(outer_key: &OuterKey, image: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if image.len() < PREFIX_LEN {
        return Err(DerivaultError::InvalidContainer(
            "file too small to be a vault container".into(),
        ));
    }

    if &image[0..4] != MAGIC {
        return Err(DerivaultError::InvalidContainer(
            "missing DVLT magic bytes".into(),
        ));
    }

    let version = image[4];
    if version != CURRENT_VERSION {
        return Err(DerivaultError::InvalidContainer(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }

    let body = encryption::decrypt(outer_key.as_bytes(), &image[PREFIX_LEN..])?;
    Ok(Zeroizing::new(body))
}

// ---------------------------------------------------------------------------
// Atomic persistence
// ---------------------------------------------------------------------------

/// Write a container image to disk **atomically**.
///
/// The image goes to a temp file in the same directory first, then a
/// rename moves it over the target path.  Readers never see a
/// half-written container; on failure the previous container survives.
pub fn write_atomic(path: &Path, image: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, image).map_err(DerivaultError::StoreWrite)?;
    fs::rename(&tmp_path, path).map_err(DerivaultError::StoreWrite)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
