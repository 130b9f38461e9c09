//! The vault session state machine.
//!
//! A `VaultSession` owns the key hierarchy for one open vault.  The
//! state is a tagged enum, so a stray container handle after `close()`
//! is unrepresentable.  Sessions are plain values: a process can hold
//! several, open and close them independently, and must serialize
//! `open`/`close`/`put_entry` per session (the `&mut self` receivers
//! encode that single-writer discipline).
//!
//! All methods are synchronous and blocking.  Key derivation is
//! intentionally slow; callers who need responsiveness offload `open`
//! to a worker thread.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::container::Container;
use crate::codec::{self, Entry, Field};
use crate::crypto::kdf::{self, Argon2Params};
use crate::crypto::keys::{EntriesKey, MasterKey};
use crate::errors::{DerivaultError, Result};
use crate::generator::{self, SecretOutput};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Keys and handle held while the vault is open.
///
/// Field order is release order: on close the master key drops first,
/// then the entries key, then the container handle.
struct OpenVault {
    master_key: MasterKey,
    entries_key: EntriesKey,
    container: Container,
}

enum SessionState {
    Closed,
    Open(OpenVault),
}

/// A vault session: `Closed` until `open()` succeeds, `Open` until
/// `close()`.
pub struct VaultSession {
    params: Argon2Params,
    state: SessionState,
}

impl Default for VaultSession {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultSession {
    /// New closed session with the default key-derivation cost.
    pub fn new() -> Self {
        Self::with_params(Argon2Params::default())
    }

    /// New closed session with explicit key-derivation parameters.
    pub fn with_params(params: Argon2Params) -> Self {
        Self {
            params,
            state: SessionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    /// Resolved path of the open vault, `None` when closed.
    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            SessionState::Open(open) => Some(open.container.path()),
            SessionState::Closed => None,
        }
    }

    /// Open the vault at `path`, creating it if it does not exist.
    ///
    /// Fails with `AlreadyOpen` (and does nothing else) if the session
    /// is already open.  An existing but unreadable file fails with
    /// `UnreadableFile` before any key material is derived.  A store
    /// that cannot be opened (wrong credentials or corruption) drops
    /// every derived key before the error propagates.
    pub fn open(&mut self, path: &Path, username: &str, password: &str) -> Result<()> {
        if self.is_open() {
            return Err(DerivaultError::AlreadyOpen);
        }

        let path = resolve_path(path)?;
        let image = match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(DerivaultError::UnreadableFile { path, source: e });
            }
        };

        let master_key = kdf::derive_master_key_with_params(username, password, &self.params)?;
        let entries_key = master_key.derive_entries_key()?;
        let outer_key = master_key.derive_outer_key()?;

        // The outer key moves into the container and is not retained
        // here; on failure the container drops it, and the two keys
        // above drop on the early return.
        let created = image.is_none();
        let container = match image {
            Some(image) => Container::open(&path, &image, entries_key.clone(), outer_key)?,
            None => Container::create(&path, entries_key.clone(), outer_key)?,
        };

        debug!(path = %container.path().display(), created, "vault session opened");
        self.state = SessionState::Open(OpenVault {
            master_key,
            entries_key,
            container,
        });
        Ok(())
    }

    /// Close the session.  Safe to call when already closed.
    pub fn close(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        if let SessionState::Open(open) = state {
            let OpenVault {
                master_key,
                entries_key,
                container,
            } = open;
            drop(master_key);
            drop(entries_key);
            drop(container);
            debug!("vault session closed");
        }
    }

    /// All entry names, materialized.  Empty when the session is
    /// closed.  Stable for a given store state; callers must not rely
    /// on any particular order.
    pub fn entry_names(&self) -> Vec<String> {
        match &self.state {
            SessionState::Open(open) => {
                open.container.entry_names().map(str::to_string).collect()
            }
            SessionState::Closed => Vec::new(),
        }
    }

    /// Number of entries, 0 when closed.
    pub fn entry_count(&self) -> usize {
        match &self.state {
            SessionState::Open(open) => open.container.len(),
            SessionState::Closed => 0,
        }
    }

    /// Fetch and decode one entry.
    ///
    /// `None` when the session is closed, the name is unknown, or the
    /// record cannot be unsealed or parsed at all.  One read and one
    /// decode per call; nothing is cached.
    pub fn get_entry(&self, name: &str) -> Option<Entry> {
        let open = match &self.state {
            SessionState::Open(open) => open,
            SessionState::Closed => return None,
        };
        let document = match open.container.unseal(name) {
            Ok(Some(document)) => document,
            Ok(None) => return None,
            Err(e) => {
                warn!(name, error = %e, "entry record could not be unsealed");
                return None;
            }
        };
        match codec::decode_entry(&document) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(name, error = %e, "entry document could not be decoded");
                None
            }
        }
    }

    /// Encode and store one entry under `name`, overwriting any
    /// previous entry with that name.
    ///
    /// The write is atomic from the caller's perspective: on failure
    /// the previous state stays visible to subsequent reads.
    pub fn put_entry(&mut self, name: &str, entry: &Entry) -> Result<()> {
        let open = self.open_mut()?;
        let document = Zeroizing::new(codec::encode_entry(entry));
        open.container.seal(name, &document)
    }

    /// Delete one entry.  Returns whether it existed.
    pub fn remove_entry(&mut self, name: &str) -> Result<bool> {
        let open = self.open_mut()?;
        open.container.remove(name)
    }

    /// Produce the secret a field describes.
    ///
    /// Derived fields regenerate deterministically from the entries
    /// key; stored fields pass their payload through shaped by usage.
    /// The entry name stands in for a missing `site_name`.
    pub fn reveal(&self, entry_name: &str, field: &Field) -> Result<SecretOutput> {
        match &self.state {
            SessionState::Open(open) => generator::reveal(&open.entries_key, entry_name, field),
            SessionState::Closed => Err(DerivaultError::NotOpen),
        }
    }

    fn open_mut(&mut self) -> Result<&mut OpenVault> {
        match &mut self.state {
            SessionState::Open(open) => Ok(open),
            SessionState::Closed => Err(DerivaultError::NotOpen),
        }
    }
}

/// Resolve a possibly-relative path against the current directory.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
