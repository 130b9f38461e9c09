//! Library configuration loaded from an optional TOML file.
//!
//! This module provides:
//! - `Settings`: the vault directory and the Argon2 cost triple
//! - `Settings::load`: read `<base_dir>/.derivault.toml`, falling back
//!   to defaults when the file is absent
//!
//! A file that parses but carries Argon2 costs below the KDF floor is
//! rejected at load time, not at first use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::Argon2Params;
use crate::errors::{DerivaultError, Result};

/// Extension given to vault container files.
const VAULT_EXTENSION: &str = "vault";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunable settings for callers embedding the vault.
///
/// Absent fields take their defaults, so a partial file (or none at
/// all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory under the base dir where containers live.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// Argon2 memory cost in KiB.
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count.
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree.
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

fn default_vault_dir() -> String {
    ".derivault".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
        }
    }
}

impl Settings {
    /// File name looked up under the base directory.
    pub const FILE_NAME: &'static str = ".derivault.toml";

    /// Load settings from `<base_dir>/.derivault.toml`.
    ///
    /// A missing file yields the defaults.  A file that does not parse,
    /// or that configures Argon2 costs below the KDF floor, is a
    /// `ConfigError`.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let config_path = base_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            DerivaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;
        settings
            .argon2_params()
            .validate()
            .map_err(|e| DerivaultError::ConfigError(format!("{}: {e}", config_path.display())))?;

        Ok(settings)
    }

    /// Path of the container file for `vault_name`.
    pub fn vault_path(&self, base_dir: &Path, vault_name: &str) -> PathBuf {
        base_dir
            .join(&self.vault_dir)
            .join(format!("{vault_name}.{VAULT_EXTENSION}"))
    }

    /// The configured Argon2 cost triple as KDF parameters.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) {
        fs::write(dir.path().join(Settings::FILE_NAME), contents).unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let s = Settings::load(tmp.path()).unwrap();
        assert_eq!(s.vault_dir, ".derivault");
        assert_eq!(s.argon2_memory_kib, 65_536);
        assert_eq!(s.argon2_iterations, 3);
        assert_eq!(s.argon2_parallelism, 4);
    }

    #[test]
    fn full_file_overrides_every_field() {
        let tmp = TempDir::new().unwrap();
        write_config(
            &tmp,
            r#"
vault_dir = "containers"
argon2_memory_kib = 131072
argon2_iterations = 4
argon2_parallelism = 2
"#,
        );

        let s = Settings::load(tmp.path()).unwrap();
        assert_eq!(s.vault_dir, "containers");
        assert_eq!(s.argon2_memory_kib, 131_072);
        assert_eq!(s.argon2_iterations, 4);
        assert_eq!(s.argon2_parallelism, 2);
    }

    #[test]
    fn partial_file_keeps_defaults_elsewhere() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "argon2_iterations = 1\n");

        let s = Settings::load(tmp.path()).unwrap();
        assert_eq!(s.argon2_iterations, 1);
        assert_eq!(s.vault_dir, ".derivault");
        assert_eq!(s.argon2_memory_kib, 65_536);
    }

    #[test]
    fn unparseable_file_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "vault_dir = [broken");

        let err = Settings::load(tmp.path()).unwrap_err();
        assert!(matches!(err, DerivaultError::ConfigError(_)));
    }

    #[test]
    fn weak_argon2_costs_are_rejected_at_load() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "argon2_memory_kib = 1024\n");

        let err = Settings::load(tmp.path()).unwrap_err();
        assert!(matches!(err, DerivaultError::ConfigError(_)));
    }

    #[test]
    fn vault_path_nests_name_under_the_vault_dir() {
        let s = Settings {
            vault_dir: "containers".to_string(),
            ..Settings::default()
        };
        let path = s.vault_path(Path::new("/data"), "personal");
        assert_eq!(path, PathBuf::from("/data/containers/personal.vault"));
    }
}
