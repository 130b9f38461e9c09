//! The encrypted entry store behind an open session.
//!
//! A container keeps a map of sealed entry records plus its own copies
//! of the entries key and outer key.  Each record is encrypted under a
//! seal key derived from (entries key, entry name, rotation counter),
//! so records cannot be swapped between names and every overwrite gets
//! a fresh key.  The whole body is then sealed under the outer key and
//! persisted atomically on every mutation.
//!
//! The body also carries random padding so the container size does not
//! track the payload size byte-for-byte.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::Zeroizing;

use super::format;
use crate::codec::value::{self, Value};
use crate::crypto::encryption;
use crate::crypto::keys::{EntriesKey, OuterKey};
use crate::errors::{DerivaultError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Seed scope for per-entry seal keys.
const ENTRY_SEAL_SCOPE: &[u8] = b"derivault/seal/entry";

/// Upper bound on random body padding (8 KiB).
const PADDING_MAX: usize = 8 * 1024;

/// Body map key holding the entry records.
const KEY_ENTRIES: &str = "entries";

/// Body map key holding the padding.
const KEY_PADDING: &str = "padding";

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// A sealed entry record: rotation counter + sealed document.
#[derive(Debug, Clone)]
struct SealedEntry {
    counter: u32,
    sealed: Vec<u8>,
}

/// An open vault container.
///
/// Owns its key material; dropping the container zeroes the keys.
/// Valid only while the owning session is open; the session's state
/// enum enforces that, not this type.
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    entries: BTreeMap<String, SealedEntry>,
    entries_key: EntriesKey,
    outer_key: OuterKey,
}

impl Container {
    /// Create a new empty container and persist it immediately.
    ///
    /// Persisting up front surfaces permission problems at open time
    /// instead of at the first put.
    pub fn create(path: &Path, entries_key: EntriesKey, outer_key: OuterKey) -> Result<Self> {
        let container = Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
            entries_key,
            outer_key,
        };
        container.save()?;
        debug!(path = %container.path.display(), "created empty vault container");
        Ok(container)
    }

    /// Open a container from its on-disk image.
    pub fn open(
        path: &Path,
        image: &[u8],
        entries_key: EntriesKey,
        outer_key: OuterKey,
    ) -> Result<Self> {
        let body = format::open_container(&outer_key, image)?;
        let entries = parse_body(&body)?;
        debug!(path = %path.display(), entries = entries.len(), "opened vault container");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
            entries_key,
            outer_key,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names, stable for a given store state.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Decrypt and return an entry's document bytes.
    ///
    /// `Ok(None)` when no such entry exists.  The buffer is `Zeroizing`;
    /// it is wiped once the caller drops it.
    pub fn unseal(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let record = match self.entries.get(name) {
            Some(r) => r,
            None => return Ok(None),
        };
        let seal_key = self
            .entries_key
            .site_seed(ENTRY_SEAL_SCOPE, name, record.counter)?;
        let document = encryption::decrypt(seal_key.as_bytes(), &record.sealed)?;
        Ok(Some(Zeroizing::new(document)))
    }

    /// Seal a document under `name` and persist.
    ///
    /// Overwrite-by-name; each overwrite rotates the entry's counter so
    /// the seal key is fresh.  If the disk write fails the in-memory
    /// map is rolled back and readers keep seeing the last persisted
    /// state.
    pub fn seal(&mut self, name: &str, document: &[u8]) -> Result<()> {
        let counter = match self.entries.get(name) {
            Some(prev) => prev.counter.checked_add(1).unwrap_or(1),
            None => 1,
        };
        let seal_key = self.entries_key.site_seed(ENTRY_SEAL_SCOPE, name, counter)?;
        let sealed = encryption::encrypt(seal_key.as_bytes(), document)?;

        let previous = self
            .entries
            .insert(name.to_string(), SealedEntry { counter, sealed });
        if let Err(e) = self.save() {
            match previous {
                Some(prev) => {
                    self.entries.insert(name.to_string(), prev);
                }
                None => {
                    self.entries.remove(name);
                }
            }
            return Err(e);
        }
        debug!(name, counter, "sealed entry");
        Ok(())
    }

    /// Remove an entry and persist.  Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let (key, record) = match self.entries.remove_entry(name) {
            Some(kv) => kv,
            None => return Ok(false),
        };
        if let Err(e) = self.save() {
            self.entries.insert(key, record);
            return Err(e);
        }
        debug!(name, "removed entry");
        Ok(true)
    }

    /// Serialize, seal under the outer key and persist atomically.
    fn save(&self) -> Result<()> {
        let body = self.encode_body()?;
        let image = format::seal_container(&self.outer_key, &body)?;
        format::write_atomic(&self.path, &image)
    }

    fn encode_body(&self) -> Result<Zeroizing<Vec<u8>>> {
        // Fresh random padding every save; two random bytes pick the
        // length, more fill it.
        let mut len_bytes = [0u8; 2];
        encryption::random_bytes(&mut len_bytes)?;
        let pad_len = u16::from_be_bytes(len_bytes) as usize % (PADDING_MAX + 1);
        let mut padding = vec![0u8; pad_len];
        encryption::random_bytes(&mut padding)?;

        let records = self
            .entries
            .iter()
            .map(|(name, record)| {
                (
                    Value::Text(name.clone()),
                    Value::Array(vec![
                        Value::Uint(record.counter as u64),
                        Value::Bytes(record.sealed.clone()),
                    ]),
                )
            })
            .collect();

        let body = Value::Map(vec![
            (Value::Text(KEY_ENTRIES.to_string()), Value::Map(records)),
            (Value::Text(KEY_PADDING.to_string()), Value::Bytes(padding)),
        ]);
        Ok(Zeroizing::new(value::encode_value(&body)))
    }
}

/// Parse a decrypted container body into its entry records.
///
/// The body sits behind AEAD, so a malformed one means a writer bug or
/// a version this reader does not know, not tampering.  Unknown body
/// keys and extra record elements are tolerated.
fn parse_body(body: &[u8]) -> Result<BTreeMap<String, SealedEntry>> {
    let root = value::decode_value(body)
        .map_err(|_| DerivaultError::InvalidContainer("body is not a well-formed document".into()))?;
    let records = root
        .map_get(KEY_ENTRIES)
        .and_then(Value::as_map)
        .ok_or_else(|| DerivaultError::InvalidContainer("body has no entries map".into()))?;

    let mut entries = BTreeMap::new();
    for (key, record) in records {
        let name = key
            .as_str()
            .ok_or_else(|| DerivaultError::InvalidContainer("entry name is not text".into()))?;
        let tuple = record
            .as_array()
            .ok_or_else(|| DerivaultError::InvalidContainer("entry record is not an array".into()))?;
        let counter = tuple
            .first()
            .and_then(Value::as_uint)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| DerivaultError::InvalidContainer("entry record has no counter".into()))?;
        let sealed = tuple
            .get(1)
            .and_then(Value::as_bytes)
            .ok_or_else(|| DerivaultError::InvalidContainer("entry record has no payload".into()))?
            .to_vec();
        entries.insert(name.to_string(), SealedEntry { counter, sealed });
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
