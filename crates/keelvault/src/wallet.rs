use crate::errors::{Result, VaultError};
use crate::{address, hd, mnemonic};
use zeroize::Zeroizing;

/// A freshly generated wallet: the phrase (shown to the user exactly once
/// for backup) and its first account address.
pub struct NewWallet {
    pub mnemonic: Zeroizing<String>,
    pub address: String,
}

impl std::fmt::Debug for NewWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewWallet")
            .field("mnemonic", &"[REDACTED]")
            .field("address", &self.address)
            .finish()
    }
}

/// One derived account on the canonical Ethereum path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub index: u32,
    pub address: String,
    pub path: String,
}

/// Outcome of checking a candidate recovery phrase.
///
/// Import is outcome-shaped rather than error-shaped: a bad phrase is an
/// expected user input, not a failure of this layer.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub valid: bool,
    pub address: Option<String>,
    pub error: Option<String>,
}

/// Generate a new wallet and derive its first address.
pub fn create_wallet() -> Result<NewWallet> {
    let phrase = mnemonic::generate()?;
    let account = derive_account(&phrase, 0)?;
    Ok(NewWallet {
        mnemonic: phrase,
        address: account.address,
    })
}

/// Validate a candidate phrase and, when well-formed, derive the account 0
/// address it would control.
pub fn import_wallet(candidate: &str) -> ImportOutcome {
    let normalized = mnemonic::normalize(candidate);
    if !mnemonic::validate(&normalized) {
        return ImportOutcome {
            valid: false,
            address: None,
            error: Some(VaultError::InvalidMnemonic.to_string()),
        };
    }
    match derive_account(&normalized, 0) {
        Ok(account) => ImportOutcome {
            valid: true,
            address: Some(account.address),
            error: None,
        },
        Err(e) => ImportOutcome {
            valid: false,
            address: None,
            error: Some(e.to_string()),
        },
    }
}

/// Derive the account at `index`. Re-derives the seed on every call;
/// nothing is cached anywhere.
pub fn derive_account(phrase: &str, index: u32) -> Result<Account> {
    if index >= hd::HARDENED_OFFSET {
        return Err(VaultError::InvalidAccountIndex);
    }
    let key = derive_private_key(phrase, index)?;
    let pubkey = address::public_key_from(&key)?;
    Ok(Account {
        index,
        address: address::address_from(&pubkey),
        path: address::ethereum_path(index),
    })
}

/// Transient private key for the account at `index`. The caller owns the
/// buffer; it wipes itself on drop.
pub fn derive_private_key(phrase: &str, index: u32) -> Result<Zeroizing<[u8; 32]>> {
    if index >= hd::HARDENED_OFFSET {
        return Err(VaultError::InvalidAccountIndex);
    }
    let seed = mnemonic::to_seed(phrase, "")?;
    address::derive_private_key_at_index(seed.as_ref(), index)
}
