//! Project configuration, read from `.raas/config.toml`.
//!
//! Only two knobs exist today: the identifier prefix used in human-readable
//! ids, and an optional override for the mutation lock wait.

use crate::core::error::RaasError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_PREFIX: &str = "RAAS";
pub const DEFAULT_LOCK_WAIT_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Prefix segment of every human-readable id (e.g. `RAAS` in
    /// `RAAS-FEAT-001`). Uppercase ASCII, fixed at init time.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Bounded wait for the mutation lock, in milliseconds. Exceeding it
    /// surfaces a retryable contention error.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_lock_wait_ms() -> u64 {
    DEFAULT_LOCK_WAIT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            lock_wait_ms: default_lock_wait_ms(),
        }
    }
}

impl Config {
    /// Load config from `<raas_dir>/config.toml`, falling back to defaults
    /// when the file is absent.
    pub fn load(raas_dir: &Path) -> Result<Self, RaasError> {
        let path = raas_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).map_err(RaasError::IoError)?;
        let cfg: Config = toml::from_str(&raw)
            .map_err(|e| RaasError::ConfigError(format!("{}: {}", path.display(), e)))?;
        if cfg.prefix.is_empty() || !cfg.prefix.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RaasError::ConfigError(format!(
                "prefix '{}' must be non-empty uppercase ASCII",
                cfg.prefix
            )));
        }
        Ok(cfg)
    }

    pub fn save(&self, raas_dir: &Path) -> Result<(), RaasError> {
        fs::create_dir_all(raas_dir).map_err(RaasError::IoError)?;
        let raw = toml::to_string_pretty(self)
            .map_err(|e| RaasError::ConfigError(e.to_string()))?;
        fs::write(raas_dir.join(CONFIG_FILE), raw).map_err(RaasError::IoError)?;
        Ok(())
    }
}
