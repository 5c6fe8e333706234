use crate::{
    config::{ConfigStore, CoreConfig},
    paths::KeelvaultPaths,
    store::FileStore,
    vault::SecureVault,
};
use eyre::Context as _;
use serde_json::json;
use std::io::Write as _;

struct ConfigReport {
    exists: bool,
    parse_ok: bool,
    error: Option<String>,
    auto_lock_timeout_seconds: Option<u64>,
}

struct VaultReport {
    store_ok: bool,
    has_wallet: bool,
    cached_address: Option<String>,
    error: Option<String>,
}

/// Self-diagnostic: resolved paths, config parse status, vault presence.
/// Output is safe to paste anywhere: it never touches ciphertext and
/// never contains secrets.
pub fn run(json_output: bool) -> eyre::Result<()> {
    let paths = KeelvaultPaths::discover()?;

    let cfg_path = paths.config_dir.join("config.toml");
    let cfg = if cfg_path.exists() {
        match ConfigStore::new(&paths).load_or_init_default() {
            Ok(c) => ConfigReport {
                exists: true,
                parse_ok: true,
                error: None,
                auto_lock_timeout_seconds: Some(c.auto_lock_timeout_seconds),
            },
            Err(e) => ConfigReport {
                exists: true,
                parse_ok: false,
                error: Some(format!("{e:#}")),
                auto_lock_timeout_seconds: None,
            },
        }
    } else {
        ConfigReport {
            exists: false,
            parse_ok: false,
            error: None,
            auto_lock_timeout_seconds: Some(CoreConfig::default().auto_lock_timeout_seconds),
        }
    };

    let vault_report = match FileStore::open(paths.vault_dir(), paths.lock_path()) {
        Ok(store) => {
            let vault = SecureVault::new(store);
            match (vault.has_wallet(), vault.cached_address()) {
                (Ok(has_wallet), Ok(cached_address)) => VaultReport {
                    store_ok: true,
                    has_wallet,
                    cached_address,
                    error: None,
                },
                (has, addr) => {
                    let error = has
                        .as_ref()
                        .err()
                        .map(ToString::to_string)
                        .or_else(|| addr.as_ref().err().map(ToString::to_string));
                    VaultReport {
                        store_ok: true,
                        has_wallet: has.unwrap_or(false),
                        cached_address: None,
                        error,
                    }
                }
            }
        }
        Err(e) => VaultReport {
            store_ok: false,
            has_wallet: false,
            cached_address: None,
            error: Some(e.to_string()),
        },
    };

    let ok = (cfg.parse_ok || !cfg.exists) && vault_report.store_ok && vault_report.error.is_none();

    let report = json!({
        "ok": ok,
        "version": env!("CARGO_PKG_VERSION"),
        "paths": {
            "config_dir": paths.config_dir,
            "data_dir": paths.data_dir,
            "log_file": paths.log_file,
            "vault_dir": paths.vault_dir(),
        },
        "config": {
            "exists": cfg.exists,
            "parse_ok": cfg.parse_ok,
            "error": cfg.error,
            "auto_lock_timeout_seconds": cfg.auto_lock_timeout_seconds,
        },
        "vault": {
            "store_ok": vault_report.store_ok,
            "has_wallet": vault_report.has_wallet,
            "cached_address": vault_report.cached_address,
            "error": vault_report.error,
        },
    });

    let mut stdout = std::io::stdout().lock();
    if json_output {
        writeln!(stdout, "{report}").context("write doctor json")?;
    } else {
        let rendered = serde_json::to_string_pretty(&report).context("render doctor report")?;
        writeln!(stdout, "{rendered}").context("write doctor report")?;
    }
    Ok(())
}
