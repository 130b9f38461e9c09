//! Entry codec: typed entries and their binary documents.
//!
//! This module provides:
//! - The CBOR-subset value layer (`value`)
//! - The `Entry`/`Field` model and its containing codec (`entry`)

pub mod entry;
pub mod value;

// Re-export the most commonly used items.
pub use entry::{decode_entry, encode_entry, DerivedUsage, Entry, Field, StoredUsage};
pub use value::Value;
