use clap::{Parser, Subcommand};
use eyre::Context as _;
use keelvault::{
    config::ConfigStore,
    paths::KeelvaultPaths,
    session::VaultSession,
    signer::{self, EvmTransaction},
    store::FileStore,
    vault::SecureVault,
    wallet,
};
use secrecy::{ExposeSecret as _, SecretString};
use serde_json::json;
use std::io::Write as _;
use std::time::Duration;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "keelvault", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print resolved paths (useful for debugging).
    Paths,

    /// Print a quick self-diagnostic report (safe to paste; contains no secrets).
    Doctor {
        /// Emit JSON to stdout (machine-readable).
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Generate a new wallet and store it encrypted under a password.
    ///
    /// The recovery phrase is printed exactly once; write it down.
    Create,

    /// Import an existing recovery phrase and store it encrypted.
    Import,

    /// Show whether a wallet exists and its cached address. Never decrypts.
    Status,

    /// Derive account addresses (requires the vault password).
    Accounts {
        /// How many accounts to derive, starting at index 0.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Sign a legacy transaction offline and print the raw bytes.
    ///
    /// Nonce, gas price and gas limit come from your own node or
    /// provider; nothing here talks to the network.
    Sign {
        /// Recipient, 0x + 40 hex chars. Omit for contract creation.
        #[arg(long)]
        to: Option<String>,
        /// Amount in wei.
        #[arg(long, default_value_t = 0)]
        value: u128,
        #[arg(long)]
        gas_price: u128,
        #[arg(long, default_value_t = 21_000)]
        gas_limit: u64,
        #[arg(long)]
        nonce: u64,
        #[arg(long)]
        chain_id: u64,
        /// Calldata / init code as hex (with or without 0x).
        #[arg(long, default_value = "")]
        data: String,
        /// Account index on the canonical derivation path.
        #[arg(long, default_value_t = 0)]
        account: u32,
    },

    /// Re-encrypt the vault under a new password.
    ChangePassword,

    /// Delete the stored wallet and its cached address.
    Delete {
        /// Skip the confirmation prompt.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

fn init_logging(paths: &KeelvaultPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("keelvault.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn prompt_password(prompt: &str) -> eyre::Result<SecretString> {
    let pw = rpassword::prompt_password(prompt).context("read password")?;
    Ok(SecretString::new(pw.into()))
}

fn prompt_new_password() -> eyre::Result<SecretString> {
    let first =
        rpassword::prompt_password("New password (6-8 digits): ").context("read password")?;
    let second = rpassword::prompt_password("Repeat password: ").context("read password")?;
    if first != second {
        eyre::bail!("passwords do not match");
    }
    Ok(SecretString::new(first.into()))
}

fn open_vault(paths: &KeelvaultPaths) -> eyre::Result<(SecureVault<FileStore>, FileStore)> {
    let cfg = ConfigStore::new(paths).load_or_init_default()?;
    let store = FileStore::open(paths.vault_dir(), paths.lock_path())?;
    let vault = SecureVault::with_kdf_iterations(store.clone(), cfg.vault_kdf_iterations);
    Ok((vault, store))
}

fn open_session(paths: &KeelvaultPaths) -> eyre::Result<VaultSession<FileStore>> {
    let cfg = ConfigStore::new(paths).load_or_init_default()?;
    let store = FileStore::open(paths.vault_dir(), paths.lock_path())?;
    let vault = SecureVault::with_kdf_iterations(store, cfg.vault_kdf_iterations);
    Ok(VaultSession::with_timeout(
        vault,
        Duration::from_secs(cfg.auto_lock_timeout_seconds),
    ))
}

fn emit(value: &serde_json::Value) -> eyre::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{value}").context("write output")?;
    Ok(())
}

fn cmd_create(paths: &KeelvaultPaths) -> eyre::Result<()> {
    let (vault, store) = open_vault(paths)?;
    if vault.has_wallet()? {
        eyre::bail!("a wallet already exists; delete it first");
    }
    let password = prompt_new_password()?;
    let new_wallet = wallet::create_wallet()?;

    let lock = store.acquire_write_lock()?;
    let stored = vault.store_seed(&new_wallet.mnemonic, &password, Some(&new_wallet.address));
    drop(lock);
    stored?;

    // The one and only time the phrase is shown.
    emit(&json!({
        "address": new_wallet.address,
        "mnemonic": &*new_wallet.mnemonic,
    }))
}

fn cmd_import(paths: &KeelvaultPaths) -> eyre::Result<()> {
    let (vault, store) = open_vault(paths)?;
    if vault.has_wallet()? {
        eyre::bail!("a wallet already exists; delete it first");
    }
    let phrase = SecretString::new(
        rpassword::prompt_password("Recovery phrase: ")
            .context("read phrase")?
            .into(),
    );
    let outcome = wallet::import_wallet(phrase.expose_secret());
    if !outcome.valid {
        eyre::bail!(
            "invalid recovery phrase: {}",
            outcome.error.unwrap_or_default()
        );
    }
    let address = outcome.address.unwrap_or_default();

    let password = prompt_new_password()?;
    let lock = store.acquire_write_lock()?;
    let stored = vault.store_seed(phrase.expose_secret(), &password, Some(&address));
    drop(lock);
    stored?;

    emit(&json!({ "address": address }))
}

fn cmd_status(paths: &KeelvaultPaths) -> eyre::Result<()> {
    let (vault, _store) = open_vault(paths)?;
    emit(&json!({
        "has_wallet": vault.has_wallet()?,
        "cached_address": vault.cached_address()?,
    }))
}

fn cmd_accounts(paths: &KeelvaultPaths, count: u32) -> eyre::Result<()> {
    let session = open_session(paths)?;
    let password = prompt_password("Password: ")?;
    session.unlock(&password)?;

    let accounts = session.with_mnemonic(&password, |m| {
        (0..count)
            .map(|i| wallet::derive_account(m, i))
            .collect::<keelvault::Result<Vec<_>>>()
    })?;
    let rendered: Vec<_> = accounts
        .iter()
        .map(|a| json!({ "index": a.index, "address": a.address, "path": a.path }))
        .collect();
    emit(&json!({ "accounts": rendered }))
}

fn cmd_sign(paths: &KeelvaultPaths, tx: EvmTransaction, account: u32) -> eyre::Result<()> {
    let session = open_session(paths)?;
    let password = prompt_password("Password: ")?;
    session.unlock(&password)?;

    let signed = session.with_private_key(&password, account, |key| signer::sign(&tx, key))?;
    emit(&json!({
        "raw_transaction": signed.raw_transaction_hex,
        "transaction_hash": signed.transaction_hash,
        "signer": signer::recover_signer(&signed)?,
    }))
}

fn cmd_change_password(paths: &KeelvaultPaths) -> eyre::Result<()> {
    let (vault, store) = open_vault(paths)?;
    let old = prompt_password("Current password: ")?;
    let new = prompt_new_password()?;

    let lock = store.acquire_write_lock()?;
    let changed = vault.change_password(&old, &new);
    drop(lock);
    changed?;
    emit(&json!({ "changed": true }))
}

fn cmd_delete(paths: &KeelvaultPaths, yes: bool) -> eyre::Result<()> {
    let (vault, store) = open_vault(paths)?;
    if !yes {
        let confirm =
            rpassword::prompt_password("Type DELETE to confirm: ").context("read confirmation")?;
        if confirm.trim() != "DELETE" {
            eyre::bail!("aborted");
        }
    }
    let lock = store.acquire_write_lock()?;
    let deleted = vault.delete_wallet();
    drop(lock);
    deleted?;
    emit(&json!({ "deleted": true }))
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = KeelvaultPaths::discover()?;
    std::fs::create_dir_all(&paths.data_dir).context("create data dir")?;
    let _log_guard = init_logging(&paths);

    match cli.cmd {
        Command::Paths => emit(&json!({
            "config_dir": paths.config_dir,
            "data_dir": paths.data_dir,
            "log_file": paths.log_file,
        })),
        Command::Doctor { json } => keelvault::doctor::run(json).context("doctor failed"),
        Command::Create => cmd_create(&paths),
        Command::Import => cmd_import(&paths),
        Command::Status => cmd_status(&paths),
        Command::Accounts { count } => cmd_accounts(&paths, count),
        Command::Sign {
            to,
            value,
            gas_price,
            gas_limit,
            nonce,
            chain_id,
            data,
            account,
        } => {
            let data_hex = data.strip_prefix("0x").unwrap_or(&data);
            let calldata = if data_hex.is_empty() {
                vec![]
            } else {
                hex::decode(data_hex).context("decode --data hex")?
            };
            let tx = EvmTransaction {
                to,
                value,
                gas_price,
                gas_limit,
                nonce,
                chain_id,
                data: calldata,
            };
            cmd_sign(&paths, tx, account)
        }
        Command::ChangePassword => cmd_change_password(&paths),
        Command::Delete { yes } => cmd_delete(&paths, yes),
    }
}
