use crate::errors::{Result, VaultError};
use crate::hd;
use k256::{elliptic_curve::sec1::ToEncodedPoint as _, SecretKey};
use sha3::{Digest as _, Keccak256};
use zeroize::Zeroizing;

/// BIP44 path for the canonical Ethereum account at `index`:
/// `m/44'/60'/0'/0/{index}`.
pub fn ethereum_path(account_index: u32) -> String {
    format!("m/44'/60'/0'/0/{account_index}")
}

/// Uncompressed secp256k1 public key (64 bytes, SEC1 point without the
/// 0x04 prefix).
pub fn public_key_from(private_key: &[u8; 32]) -> Result<[u8; 64]> {
    let sk = SecretKey::from_slice(private_key).map_err(|_e| VaultError::InvalidDerivation)?;
    let point = sk.public_key().to_encoded_point(false);
    point
        .as_bytes()
        .get(1..)
        .and_then(|xy| xy.try_into().ok())
        .ok_or(VaultError::InvalidDerivation)
}

/// Ethereum address for an uncompressed public key: the last 20 bytes of
/// its Keccak-256 hash, rendered with the EIP-55 checksum.
pub fn address_from(public_key: &[u8; 64]) -> String {
    let hash = Keccak256::digest(public_key);
    let (_, tail) = hash.split_at(12);
    checksum_hex(&hex::encode(tail))
}

/// Apply the EIP-55 mixed-case checksum to an address.
///
/// Accepts the address with or without a `0x` prefix, in any case; fails
/// `InvalidAddress` unless it is exactly 40 hex characters.
pub fn checksum(address: &str) -> Result<String> {
    let bare = address.strip_prefix("0x").unwrap_or(address);
    if bare.len() != 40 || !bare.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(VaultError::InvalidAddress);
    }
    Ok(checksum_hex(&bare.to_ascii_lowercase()))
}

// `bare` must already be 40 lowercase hex characters.
fn checksum_hex(bare: &str) -> String {
    let hash = Keccak256::digest(bare.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in bare.chars().enumerate() {
        let byte = hash.get(i / 2).copied().unwrap_or(0);
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Private key for the canonical Ethereum account at `account_index`.
pub fn derive_private_key_at_index(
    seed: &[u8],
    account_index: u32,
) -> Result<Zeroizing<[u8; 32]>> {
    let node = hd::derive_at_path(seed, &ethereum_path(account_index))?;
    Ok(Zeroizing::new(node.key))
}
