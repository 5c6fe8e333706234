use crate::paths::KeelvaultPaths;
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

pub const DEFAULT_AUTO_LOCK_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_AUTO_LOCK_CHECK_SECONDS: u64 = 10;
pub const DEFAULT_VAULT_KDF_ITERATIONS: u32 = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Seconds of inactivity after which an unlocked session re-locks.
    pub auto_lock_timeout_seconds: u64,

    /// How often a host should drive `VaultSession::auto_lock_check`.
    ///
    /// The core applies the timeout lazily on every operation entry as
    /// well, so this interval only bounds how stale an idle Unlocked state
    /// can get between operations.
    pub auto_lock_check_seconds: u64,

    /// PBKDF2 iteration count used for newly written vault blobs.
    ///
    /// Existing blobs carry their own count and stay readable when this
    /// changes.
    pub vault_kdf_iterations: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            auto_lock_timeout_seconds: DEFAULT_AUTO_LOCK_TIMEOUT_SECONDS,
            auto_lock_check_seconds: DEFAULT_AUTO_LOCK_CHECK_SECONDS,
            vault_kdf_iterations: DEFAULT_VAULT_KDF_ITERATIONS,
        }
    }
}

/// Apply environment variable overrides to the config.
fn apply_env_overrides(cfg: &mut CoreConfig) {
    fn apply_u64(var: &str, setter: impl FnOnce(u64)) {
        if let Ok(v) = std::env::var(var) {
            if let Ok(n) = v.trim().parse::<u64>() {
                if n > 0 {
                    setter(n);
                }
            }
        }
    }

    apply_u64("KEELVAULT_AUTO_LOCK_SECONDS", |n| {
        cfg.auto_lock_timeout_seconds = n;
    });
    apply_u64("KEELVAULT_KDF_ITERATIONS", |n| {
        cfg.vault_kdf_iterations = u32::try_from(n).unwrap_or(u32::MAX);
    });
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(paths: &KeelvaultPaths) -> Self {
        Self {
            path: paths.config_dir.join("config.toml"),
        }
    }

    pub fn load_or_init_default(&self) -> eyre::Result<CoreConfig> {
        if !self.path.exists() {
            let mut cfg = CoreConfig::default();
            apply_env_overrides(&mut cfg);
            self.save(&cfg)?;
            return Ok(cfg);
        }

        let s = fs::read_to_string(&self.path).context("read config.toml")?;
        let mut cfg: CoreConfig = toml::from_str(&s).context("parse config.toml")?;
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &CoreConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        crate::fsutil::write_string_atomic_private(&self.path, &s).context("write config.toml")?;
        Ok(())
    }
}
