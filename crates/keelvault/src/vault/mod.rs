pub mod crypto;

use crate::errors::{Result, VaultError};
use crate::store::SecureStore;
use crypto::EncryptedBlob;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use zeroize::{Zeroize as _, Zeroizing};

/// Store key for the encrypted vault record.
pub const RECORD_KEY: &str = "vault.record";
/// Store key for the plaintext cached address (public, non-sensitive).
pub const ADDRESS_KEY: &str = "vault.address";

/// The single persisted wallet record. At most one exists device-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    pub id: String,
    pub blob: EncryptedBlob,
    pub created_at: String,
    pub updated_at: String,
}

/// Password-encrypted persistence for exactly one seed phrase.
///
/// The backing store is opaque and assumed to be platform-protected; this
/// layer adds its own AES-256-GCM encryption in depth, so neither layer
/// alone is sufficient to recover the seed.
#[derive(Debug)]
pub struct SecureVault<S: SecureStore> {
    store: S,
    kdf_iterations: u32,
}

impl<S: SecureStore> SecureVault<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            kdf_iterations: crypto::DEFAULT_KDF_ITERATIONS,
        }
    }

    /// Override the iteration count for newly written blobs (config knob;
    /// existing blobs carry their own).
    pub fn with_kdf_iterations(store: S, kdf_iterations: u32) -> Self {
        Self {
            store,
            kdf_iterations,
        }
    }

    /// Existence check; touches no ciphertext.
    pub fn has_wallet(&self) -> Result<bool> {
        Ok(self.store.get(RECORD_KEY)?.is_some())
    }

    /// Cached public address, if one was stored. Never decrypts.
    pub fn cached_address(&self) -> Result<Option<String>> {
        let Some(bytes) = self.store.get(ADDRESS_KEY)? else {
            return Ok(None);
        };
        let s = String::from_utf8(bytes)
            .map_err(|e| VaultError::Store(format!("corrupt address cache: {e}")))?;
        Ok(Some(s))
    }

    /// Encrypt and persist a mnemonic. Enforces the single-wallet
    /// invariant: a second store attempt fails `VaultNotEmpty` and leaves
    /// the existing record untouched.
    pub fn store_seed(
        &self,
        mnemonic: &str,
        password: &SecretString,
        address: Option<&str>,
    ) -> Result<()> {
        if self.has_wallet()? {
            return Err(VaultError::VaultNotEmpty);
        }

        let blob = crypto::encrypt(mnemonic.as_bytes(), password, self.kdf_iterations)?;
        let now = chrono::Utc::now().to_rfc3339();
        let record = VaultRecord {
            id: Uuid::new_v4().to_string(),
            blob,
            created_at: now.clone(),
            updated_at: now,
        };
        self.write_record(&record)?;
        if let Some(a) = address {
            self.store.put(ADDRESS_KEY, a.as_bytes())?;
        }
        debug!("vault record created");
        Ok(())
    }

    /// Decrypt and return the stored mnemonic. The caller owns the buffer;
    /// it wipes itself on drop.
    pub fn retrieve_seed(&self, password: &SecretString) -> Result<Zeroizing<String>> {
        let record = self.read_record()?;
        let plaintext = crypto::decrypt(&record.blob, password)?;
        match String::from_utf8(plaintext.to_vec()) {
            Ok(s) => Ok(Zeroizing::new(s)),
            Err(e) => {
                // Wipe the copy the error is carrying before dropping it.
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                Err(VaultError::DecryptionFailed)
            }
        }
    }

    /// Validate `password` against the stored record without exposing the
    /// plaintext to the caller.
    pub fn verify_password(&self, password: &SecretString) -> Result<bool> {
        let record = self.read_record()?;
        Ok(crypto::verify_password(&record.blob, password))
    }

    /// Re-encrypt the record under a new password.
    ///
    /// The new record replaces the old one in a single store write, which
    /// the file store performs atomically; any failure before that write
    /// leaves the original record fully intact.
    pub fn change_password(&self, old: &SecretString, new: &SecretString) -> Result<()> {
        crypto::validate_password(new)?;

        let mut record = self.read_record()?;
        let mnemonic = crypto::decrypt(&record.blob, old)?;
        record.blob = crypto::encrypt(&mnemonic, new, self.kdf_iterations)?;
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.write_record(&record)?;
        debug!("vault record re-encrypted under new password");
        Ok(())
    }

    /// Update the cached public address.
    pub fn update_cached_address(&self, address: &str) -> Result<()> {
        self.store.put(ADDRESS_KEY, address.as_bytes())
    }

    /// Remove the record and the address cache. Idempotent.
    pub fn delete_wallet(&self) -> Result<()> {
        self.store.delete(RECORD_KEY)?;
        self.store.delete(ADDRESS_KEY)?;
        debug!("vault record deleted");
        Ok(())
    }

    fn read_record(&self) -> Result<VaultRecord> {
        let bytes = self.store.get(RECORD_KEY)?.ok_or(VaultError::VaultEmpty)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VaultError::Store(format!("corrupt vault record: {e}")))
    }

    fn write_record(&self, record: &VaultRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record).map_err(|e| VaultError::Store(e.to_string()))?;
        self.store.put(RECORD_KEY, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

    fn pw(s: &str) -> SecretString {
        SecretString::new(s.to_owned().into())
    }

    fn vault() -> SecureVault<MemoryStore> {
        // Low iteration count keeps the unit tests fast; the default is
        // exercised through the config path.
        SecureVault::with_kdf_iterations(MemoryStore::new(), 1_000)
    }

    #[test]
    fn store_then_retrieve_round_trips() -> eyre::Result<()> {
        let v = vault();
        assert!(!v.has_wallet()?);

        v.store_seed(PHRASE, &pw("123456"), Some("0xAbCd"))?;
        assert!(v.has_wallet()?);
        assert_eq!(v.cached_address()?.as_deref(), Some("0xAbCd"));

        let seed = v.retrieve_seed(&pw("123456"))?;
        assert_eq!(&*seed, PHRASE);
        Ok(())
    }

    #[test]
    fn second_store_fails_and_preserves_original() -> eyre::Result<()> {
        let v = vault();
        v.store_seed(PHRASE, &pw("123456"), None)?;

        let err = v.store_seed("other words", &pw("999999"), None).err();
        assert_eq!(err, Some(VaultError::VaultNotEmpty));

        // Original record still opens under the original password.
        let seed = v.retrieve_seed(&pw("123456"))?;
        assert_eq!(&*seed, PHRASE);
        Ok(())
    }

    #[test]
    fn retrieve_from_empty_vault_fails() {
        let v = vault();
        assert_eq!(
            v.retrieve_seed(&pw("123456")).err(),
            Some(VaultError::VaultEmpty)
        );
    }

    #[test]
    fn wrong_password_is_undifferentiated() -> eyre::Result<()> {
        let v = vault();
        v.store_seed(PHRASE, &pw("123456"), None)?;
        assert_eq!(
            v.retrieve_seed(&pw("000000")).err(),
            Some(VaultError::DecryptionFailed)
        );
        assert!(!v.verify_password(&pw("000000"))?);
        assert!(v.verify_password(&pw("123456"))?);
        Ok(())
    }

    #[test]
    fn change_password_swaps_which_password_opens() -> eyre::Result<()> {
        let v = vault();
        v.store_seed(PHRASE, &pw("123456"), None)?;

        v.change_password(&pw("123456"), &pw("654321"))?;
        assert_eq!(
            v.retrieve_seed(&pw("123456")).err(),
            Some(VaultError::DecryptionFailed)
        );
        assert_eq!(&*v.retrieve_seed(&pw("654321"))?, PHRASE);
        Ok(())
    }

    #[test]
    fn failed_change_password_leaves_record_intact() -> eyre::Result<()> {
        let v = vault();
        v.store_seed(PHRASE, &pw("123456"), None)?;

        // Wrong old password.
        assert_eq!(
            v.change_password(&pw("000000"), &pw("654321")).err(),
            Some(VaultError::DecryptionFailed)
        );
        // Malformed new password, rejected before any store access.
        assert_eq!(
            v.change_password(&pw("123456"), &pw("abc")).err(),
            Some(VaultError::InvalidPasswordFormat)
        );

        assert_eq!(&*v.retrieve_seed(&pw("123456"))?, PHRASE);
        Ok(())
    }

    #[test]
    fn delete_is_idempotent() -> eyre::Result<()> {
        let v = vault();
        v.store_seed(PHRASE, &pw("123456"), Some("0xAbCd"))?;

        v.delete_wallet()?;
        assert!(!v.has_wallet()?);
        assert_eq!(v.cached_address()?, None);

        // Deleting an already-empty vault is fine.
        v.delete_wallet()?;
        Ok(())
    }

    #[test]
    fn record_metadata_is_tracked() -> eyre::Result<()> {
        let v = vault();
        v.store_seed(PHRASE, &pw("123456"), None)?;
        let record = v.read_record()?;
        assert!(!record.id.is_empty());
        assert_eq!(record.created_at, record.updated_at);

        v.change_password(&pw("123456"), &pw("222222"))?;
        let updated = v.read_record()?;
        assert_eq!(updated.id, record.id);
        assert!(updated.updated_at >= record.updated_at);
        Ok(())
    }
}
