use thiserror::Error;

/// Crate-wide result alias for the cryptographic core.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Structured errors for every operation in the core.
///
/// Messages are safe to display verbatim: none of them ever embeds secret
/// material (mnemonics, seeds, keys, passwords).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    // ── Validation ────────────────────────────────────────────────────
    #[error("password must be 6 to 8 digits")]
    InvalidPasswordFormat,

    #[error("invalid mnemonic phrase")]
    InvalidMnemonic,

    #[error("invalid derivation path: {0}")]
    PathParse(String),

    #[error("account index out of range")]
    InvalidAccountIndex,

    #[error("invalid transaction field: {field}")]
    InvalidTransaction { field: &'static str },

    #[error("invalid address")]
    InvalidAddress,

    // ── Cryptographic ─────────────────────────────────────────────────
    /// Deliberately undifferentiated: a wrong password and a tampered blob
    /// must be indistinguishable to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("signing failed")]
    SigningFailed,

    /// Child key fell outside the curve order, or key material did not
    /// parse as a valid secp256k1 scalar.
    #[error("invalid key derivation")]
    InvalidDerivation,

    #[error("secure randomness unavailable")]
    EntropySource,

    // ── State ─────────────────────────────────────────────────────────
    #[error("wallet is locked")]
    WalletLocked,

    #[error("no wallet stored")]
    VaultEmpty,

    #[error("a wallet already exists")]
    VaultNotEmpty,

    // ── Resource ──────────────────────────────────────────────────────
    #[error("secure store failure: {0}")]
    Store(String),

    #[error("vault busy; retry the operation")]
    StoreBusy,
}
