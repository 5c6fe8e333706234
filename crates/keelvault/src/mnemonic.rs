use crate::errors::{Result, VaultError};
use bip39::{Language, Mnemonic};
use rand::{rngs::SysRng, TryRng as _};
use tracing::error;
use zeroize::Zeroizing;

/// Wallets are always generated at maximum strength: 24 words from 256
/// bits of entropy.
pub const GENERATED_WORD_COUNT: usize = 24;
const ENTROPY_BYTES: usize = 32;

/// Generate a fresh 24-word mnemonic from OS entropy.
///
/// The checksum bits are computed by the `bip39` crate from entropy drawn
/// here, so a failed OS RNG surfaces as an error rather than weak output.
pub fn generate() -> Result<Zeroizing<String>> {
    let mut entropy = Zeroizing::new([0_u8; ENTROPY_BYTES]);
    SysRng.try_fill_bytes(&mut *entropy).map_err(|e| {
        error!(error = %e, "os rng unavailable");
        VaultError::EntropySource
    })?;

    let mnemonic = Mnemonic::from_entropy_in(Language::English, &*entropy).map_err(|e| {
        error!(error = %e, "mnemonic encoding failed");
        VaultError::InvalidMnemonic
    })?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Canonical form of a user-supplied phrase: lowercase, trimmed, single
/// spaces between words. Idempotent.
///
/// The English wordlist is pure ASCII, so full NFKD normalization reduces
/// to exactly this.
pub fn normalize(phrase: &str) -> Zeroizing<String> {
    let mut out = String::with_capacity(phrase.len());
    for (i, word) in phrase.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        for c in word.chars() {
            out.push(c.to_ascii_lowercase());
        }
    }
    Zeroizing::new(out)
}

/// Whether `phrase` is a well-formed 24-word mnemonic: wordlist membership
/// and embedded checksum included. A predicate; never errors.
pub fn validate(phrase: &str) -> bool {
    let normalized = normalize(phrase);
    if normalized.split(' ').count() != GENERATED_WORD_COUNT {
        return false;
    }
    Mnemonic::parse_in_normalized(Language::English, &normalized).is_ok()
}

/// BIP39 seed derivation: PBKDF2-HMAC-SHA512, salt `"mnemonic" +
/// passphrase`, 2048 iterations, 64-byte output. Deterministic.
pub fn to_seed(phrase: &str, passphrase: &str) -> Result<Zeroizing<[u8; 64]>> {
    let normalized = normalize(phrase);
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|_e| VaultError::InvalidMnemonic)?;
    Ok(Zeroizing::new(mnemonic.to_seed_normalized(passphrase)))
}
