use crate::errors::{Result, VaultError};
use aes_gcm::{
    aead::{Aead as _, KeyInit as _},
    Aes256Gcm, Nonce,
};
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::SysRng, TryRng as _};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::error;
use zeroize::{Zeroize as _, Zeroizing};

pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

const ENVELOPE_VERSION: u8 = 1;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// At-rest envelope for a password-encrypted secret.
///
/// Version-tagged and self-describing so parameters can change without
/// breaking stored blobs: v1 is PBKDF2-HMAC-SHA256 (iteration count in
/// `kdf_iters`) + AES-256-GCM, all four byte strings base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub v: u8,
    pub kdf_iters: u32,
    pub salt_b64: String,
    pub nonce_b64: String,
    pub ct_b64: String,
    pub tag_b64: String,
}

/// Vault passwords are device-PIN style: 6 to 8 ASCII digits.
pub fn validate_password(password: &SecretString) -> Result<()> {
    let p = password.expose_secret();
    if !(6..=8).contains(&p.len()) || !p.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VaultError::InvalidPasswordFormat);
    }
    Ok(())
}

fn derive_key(password: &SecretString, salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0_u8; 32]);
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut *key,
    );
    key
}

/// Encrypt `plaintext` under `password` with a fresh salt and nonce.
///
/// Two calls with identical inputs produce different blobs. The derived
/// key lives in a self-wiping buffer and is gone before this returns.
pub fn encrypt(plaintext: &[u8], password: &SecretString, kdf_iters: u32) -> Result<EncryptedBlob> {
    validate_password(password)?;

    let mut salt = [0_u8; SALT_LEN];
    let mut nonce = [0_u8; NONCE_LEN];
    SysRng.try_fill_bytes(&mut salt).map_err(|e| {
        error!(error = %e, "os rng unavailable");
        VaultError::EntropySource
    })?;
    SysRng.try_fill_bytes(&mut nonce).map_err(|e| {
        error!(error = %e, "os rng unavailable");
        VaultError::EntropySource
    })?;

    let key = derive_key(password, &salt, kdf_iters);
    let cipher =
        Aes256Gcm::new_from_slice(&*key).map_err(|_e| VaultError::EncryptionFailed)?;
    let mut combined = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_e| VaultError::EncryptionFailed)?;
    drop(key);

    // aes-gcm appends the tag; the envelope stores it as its own field.
    let split = combined
        .len()
        .checked_sub(TAG_LEN)
        .ok_or(VaultError::EncryptionFailed)?;
    let tag = combined.split_off(split);

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(EncryptedBlob {
        v: ENVELOPE_VERSION,
        kdf_iters,
        salt_b64: b64.encode(salt),
        nonce_b64: b64.encode(nonce),
        ct_b64: b64.encode(&combined),
        tag_b64: b64.encode(&tag),
    })
}

/// Decrypt a blob. Every failure mode (wrong password, truncated fields,
/// flipped bits, unknown version) collapses into `DecryptionFailed` so
/// callers cannot be used as a padding/tamper oracle.
pub fn decrypt(blob: &EncryptedBlob, password: &SecretString) -> Result<Zeroizing<Vec<u8>>> {
    if blob.v != ENVELOPE_VERSION {
        return Err(VaultError::DecryptionFailed);
    }
    let b64 = base64::engine::general_purpose::STANDARD;
    let salt = b64
        .decode(&blob.salt_b64)
        .map_err(|_e| VaultError::DecryptionFailed)?;
    let nonce = b64
        .decode(&blob.nonce_b64)
        .map_err(|_e| VaultError::DecryptionFailed)?;
    let ct = b64
        .decode(&blob.ct_b64)
        .map_err(|_e| VaultError::DecryptionFailed)?;
    let tag = b64
        .decode(&blob.tag_b64)
        .map_err(|_e| VaultError::DecryptionFailed)?;
    if salt.len() != SALT_LEN || nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(VaultError::DecryptionFailed);
    }

    let key = derive_key(password, &salt, blob.kdf_iters);
    let cipher =
        Aes256Gcm::new_from_slice(&*key).map_err(|_e| VaultError::DecryptionFailed)?;

    let mut combined = Vec::with_capacity(ct.len() + tag.len());
    combined.extend_from_slice(&ct);
    combined.extend_from_slice(&tag);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), combined.as_slice())
        .map_err(|_e| VaultError::DecryptionFailed)?;
    drop(key);
    combined.zeroize();

    Ok(Zeroizing::new(plaintext))
}

/// Whether `password` opens `blob`. The decrypted bytes never leave this
/// function; the buffer wipes itself on the way out.
pub fn verify_password(blob: &EncryptedBlob, password: &SecretString) -> bool {
    decrypt(blob, password).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pw(s: &str) -> SecretString {
        SecretString::new(s.to_owned().into())
    }

    #[test]
    fn round_trip() -> eyre::Result<()> {
        let blob = encrypt(b"some mnemonic words", &pw("123456"), 1_000)?;
        let out = decrypt(&blob, &pw("123456"))?;
        assert_eq!(out.as_slice(), b"some mnemonic words");
        Ok(())
    }

    #[test]
    fn ciphertext_is_nondeterministic() -> eyre::Result<()> {
        let a = encrypt(b"payload", &pw("123456"), 1_000)?;
        let b = encrypt(b"payload", &pw("123456"), 1_000)?;
        assert_ne!(a.ct_b64, b.ct_b64);
        assert_ne!(a.salt_b64, b.salt_b64);
        assert_ne!(a.nonce_b64, b.nonce_b64);
        Ok(())
    }

    #[test]
    fn wrong_password_is_rejected() -> eyre::Result<()> {
        let blob = encrypt(b"payload", &pw("123456"), 1_000)?;
        assert_eq!(
            decrypt(&blob, &pw("654321")).err(),
            Some(VaultError::DecryptionFailed)
        );
        Ok(())
    }

    #[test]
    fn tampering_is_undifferentiated() -> eyre::Result<()> {
        let blob = encrypt(b"payload", &pw("123456"), 1_000)?;

        let mut ct_flipped = blob.clone();
        ct_flipped.ct_b64 = blob.tag_b64.clone(); // structurally valid b64, wrong bytes
        assert_eq!(
            decrypt(&ct_flipped, &pw("123456")).err(),
            Some(VaultError::DecryptionFailed)
        );

        let mut bad_version = blob.clone();
        bad_version.v = 9;
        assert_eq!(
            decrypt(&bad_version, &pw("123456")).err(),
            Some(VaultError::DecryptionFailed)
        );

        let mut bad_b64 = blob;
        bad_b64.tag_b64 = "!!!".to_owned();
        assert_eq!(
            decrypt(&bad_b64, &pw("123456")).err(),
            Some(VaultError::DecryptionFailed)
        );
        Ok(())
    }

    #[test]
    fn password_format_is_enforced_on_encrypt() {
        for bad in ["12345", "123456789", "12345a", "abcdef", ""] {
            assert_eq!(
                encrypt(b"x", &pw(bad), 1_000).err(),
                Some(VaultError::InvalidPasswordFormat),
                "{bad:?} must be rejected"
            );
        }
        for good in ["123456", "1234567", "12345678", "000000"] {
            assert!(validate_password(&pw(good)).is_ok(), "{good:?} must pass");
        }
    }

    #[test]
    fn verify_password_returns_bool_only() -> eyre::Result<()> {
        let blob = encrypt(b"payload", &pw("123456"), 1_000)?;
        assert!(verify_password(&blob, &pw("123456")));
        assert!(!verify_password(&blob, &pw("000000")));
        Ok(())
    }

    #[test]
    fn envelope_survives_json_round_trip() -> eyre::Result<()> {
        let blob = encrypt(b"payload", &pw("123456"), 1_000)?;
        let json = serde_json::to_string(&blob)?;
        let back: EncryptedBlob = serde_json::from_str(&json)?;
        assert_eq!(back, blob);
        let out = decrypt(&back, &pw("123456"))?;
        assert_eq!(out.as_slice(), b"payload");
        Ok(())
    }

    #[test]
    fn blob_records_its_kdf_iterations() -> eyre::Result<()> {
        let blob = encrypt(b"payload", &pw("123456"), 2_048)?;
        assert_eq!(blob.kdf_iters, 2_048);
        assert_eq!(blob.v, 1);
        Ok(())
    }
}
