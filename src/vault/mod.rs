//! Vault module: encrypted entry storage and session lifecycle.
//!
//! This module provides:
//! - Sealed container envelope and atomic persistence (`format`)
//! - The encrypted entry store with per-entry seal keys (`container`)
//! - The `VaultSession` state machine that owns the keys (`session`)

pub mod container;
pub mod format;
pub mod session;

// Re-export the most commonly used items.
pub use container::Container;
pub use session::VaultSession;
