use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in derivault.
#[derive(Debug, Error)]
pub enum DerivaultError {
    // --- Session lifecycle errors ---
    #[error("Session is already open — close it before opening again")]
    AlreadyOpen,

    #[error("Session is not open")]
    NotOpen,

    // --- Crypto errors ---
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed — wrong credentials or corrupted container")]
    DecryptionFailed,

    // --- Container errors ---
    #[error("Vault container at {path} is not readable: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a vault container: {0}")]
    InvalidContainer(String),

    #[error("Failed to write vault container: {0}")]
    StoreWrite(#[source] std::io::Error),

    // --- Codec errors ---
    #[error("Entry payload could not be decoded: {0}")]
    Codec(String),

    // --- Generator errors ---
    #[error("Cannot act on an unreadable field")]
    UnreadableField,

    #[error("Cannot derive a secret from an unreadable usage descriptor")]
    UnreadableUsage,

    #[error("Unknown password template '{0}'")]
    UnknownTemplate(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for derivault results.
pub type Result<T> = std::result::Result<T, DerivaultError>;
