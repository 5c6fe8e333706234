use crate::address;
use crate::errors::{Result, VaultError};
use alloy_rlp::{Encodable as _, Header};
use k256::{
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint as _,
};
use sha3::{Digest as _, Keccak256};
use zeroize::Zeroize as _;

/// A legacy (pre-typed-envelope) EVM transaction, EIP-155 protected.
///
/// `nonce`, `gas_price` and `gas_limit` are supplied by the caller's
/// chain-data services; nothing here talks to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTransaction {
    /// Recipient as `0x` + 40 hex chars; `None` for contract creation.
    pub to: Option<String>,
    /// Amount in wei.
    pub value: u128,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub nonce: u64,
    pub chain_id: u64,
    pub data: Vec<u8>,
}

impl EvmTransaction {
    /// Check every field, reporting the first violated one, and parse the
    /// destination. Returns the 20-byte recipient, or `None` for contract
    /// creation.
    pub fn validate(&self) -> Result<Option<[u8; 20]>> {
        if self.gas_price == 0 {
            return Err(VaultError::InvalidTransaction { field: "gas_price" });
        }
        if self.gas_limit == 0 {
            return Err(VaultError::InvalidTransaction { field: "gas_limit" });
        }
        if self.chain_id == 0 {
            return Err(VaultError::InvalidTransaction { field: "chain_id" });
        }
        match self.to.as_deref() {
            Some(s) => parse_recipient(s).map(Some),
            None if self.data.is_empty() => {
                // A transaction with no recipient and no init code moves
                // nothing and deploys nothing.
                Err(VaultError::InvalidTransaction { field: "data" })
            }
            None => Ok(None),
        }
    }
}

/// The signed result: broadcast-ready bytes plus the signature parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// RLP of the 9-field tuple, `0x`-prefixed; feed this to
    /// `eth_sendRawTransaction`.
    pub raw_transaction_hex: String,
    /// Keccak-256 of the raw bytes, `0x`-prefixed.
    pub transaction_hash: String,
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub transaction: EvmTransaction,
}

fn parse_recipient(s: &str) -> Result<[u8; 20]> {
    let bare = s
        .strip_prefix("0x")
        .ok_or(VaultError::InvalidTransaction { field: "to" })?;
    if bare.len() != 40 {
        return Err(VaultError::InvalidTransaction { field: "to" });
    }
    let bytes = hex::decode(bare).map_err(|_e| VaultError::InvalidTransaction { field: "to" })?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_e| VaultError::InvalidTransaction { field: "to" })
}

fn keccak256(bytes: &[u8]) -> [u8; 32] {
    Keccak256::digest(bytes).into()
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes.get(first..).unwrap_or_default()
}

// RLP of the 9-field legacy tuple. The last three slots carry either the
// EIP-155 placeholders (chain_id, 0, 0) or the real (v, r, s).
fn encode_tuple(
    tx: &EvmTransaction,
    to: Option<&[u8; 20]>,
    v: u64,
    r: &[u8],
    s: &[u8],
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(128 + tx.data.len());
    tx.nonce.encode(&mut payload);
    tx.gas_price.encode(&mut payload);
    tx.gas_limit.encode(&mut payload);
    match to {
        Some(addr) => addr.as_slice().encode(&mut payload),
        None => {
            // Contract creation: the recipient slot is an empty string.
            let empty: &[u8] = &[];
            empty.encode(&mut payload);
        }
    }
    tx.value.encode(&mut payload);
    tx.data.as_slice().encode(&mut payload);
    v.encode(&mut payload);
    trim_leading_zeros(r).encode(&mut payload);
    trim_leading_zeros(s).encode(&mut payload);

    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

/// The hash a signer commits to: Keccak-256 of the tuple with
/// `(chain_id, 0, 0)` in the signature slots, per EIP-155.
pub fn signing_hash(tx: &EvmTransaction) -> Result<[u8; 32]> {
    let to = tx.validate()?;
    Ok(keccak256(&encode_tuple(tx, to.as_ref(), tx.chain_id, &[], &[])))
}

// Ethereum requires low-s signatures; flip the recovery bit along with
// the normalization.
fn normalized(sig: Signature, recid: RecoveryId) -> (Signature, RecoveryId) {
    match sig.normalize_s() {
        Some(low_s) => {
            let flipped = RecoveryId::from_byte(recid.to_byte() ^ 1).unwrap_or(recid);
            (low_s, flipped)
        }
        None => (sig, recid),
    }
}

fn eip155_v(chain_id: u64, recovery_id: u8) -> Result<u64> {
    chain_id
        .checked_mul(2)
        .and_then(|x| x.checked_add(35))
        .and_then(|x| x.checked_add(u64::from(recovery_id)))
        .ok_or(VaultError::InvalidTransaction { field: "chain_id" })
}

/// Sign `tx` with a transient secp256k1 key.
///
/// ECDSA nonces are deterministic (RFC 6979), so identical inputs yield
/// identical signatures; the chain id folded into `v` makes the same
/// transaction invalid on every other chain.
pub fn sign(tx: &EvmTransaction, private_key: &[u8; 32]) -> Result<SignedTransaction> {
    let to = tx.validate()?;
    let sighash = keccak256(&encode_tuple(tx, to.as_ref(), tx.chain_id, &[], &[]));

    let signing_key =
        SigningKey::from_slice(private_key).map_err(|_e| VaultError::InvalidDerivation)?;
    let (sig, recid) = signing_key
        .sign_prehash_recoverable(&sighash)
        .map_err(|_e| VaultError::SigningFailed)?;
    let (sig, recid) = normalized(sig, recid);

    let v = eip155_v(tx.chain_id, recid.to_byte())?;
    let (r_bytes, s_bytes) = sig.split_bytes();
    let mut r = [0_u8; 32];
    let mut s = [0_u8; 32];
    r.copy_from_slice(r_bytes.as_slice());
    s.copy_from_slice(s_bytes.as_slice());

    let raw = encode_tuple(tx, to.as_ref(), v, &r, &s);
    let hash = keccak256(&raw);

    Ok(SignedTransaction {
        raw_transaction_hex: format!("0x{}", hex::encode(&raw)),
        transaction_hash: format!("0x{}", hex::encode(hash)),
        v,
        r,
        s,
        transaction: tx.clone(),
    })
}

/// Like [`sign`], but wipes the key buffer on every exit path. External
/// callers should use this entry point.
pub fn sign_and_clear(tx: &EvmTransaction, private_key: &mut [u8; 32]) -> Result<SignedTransaction> {
    let out = sign(tx, private_key);
    private_key.zeroize();
    out
}

/// Recover the EIP-55 address that produced `signed`. Useful for
/// post-signing sanity checks; broadcasting nodes do the same.
pub fn recover_signer(signed: &SignedTransaction) -> Result<String> {
    let tx = &signed.transaction;
    let sighash = signing_hash(tx)?;

    let base = eip155_v(tx.chain_id, 0)?;
    let recid_byte = signed
        .v
        .checked_sub(base)
        .and_then(|x| u8::try_from(x).ok())
        .ok_or(VaultError::SigningFailed)?;
    let recid = RecoveryId::from_byte(recid_byte).ok_or(VaultError::SigningFailed)?;

    let mut sig_bytes = [0_u8; 64];
    let (left, right) = sig_bytes.split_at_mut(32);
    left.copy_from_slice(&signed.r);
    right.copy_from_slice(&signed.s);
    let sig = Signature::from_slice(&sig_bytes).map_err(|_e| VaultError::SigningFailed)?;

    let vk = VerifyingKey::recover_from_prehash(&sighash, &sig, recid)
        .map_err(|_e| VaultError::SigningFailed)?;
    let point = vk.to_encoded_point(false);
    let pubkey: [u8; 64] = point
        .as_bytes()
        .get(1..)
        .and_then(|xy| xy.try_into().ok())
        .ok_or(VaultError::SigningFailed)?;
    Ok(address::address_from(&pubkey))
}

/// `gas_price * gas_limit`, checked.
pub fn fee(tx: &EvmTransaction) -> Result<u128> {
    tx.gas_price
        .checked_mul(u128::from(tx.gas_limit))
        .ok_or(VaultError::InvalidTransaction { field: "fee" })
}

/// `value + fee`, checked.
pub fn total_cost(tx: &EvmTransaction) -> Result<u128> {
    tx.value
        .checked_add(fee(tx)?)
        .ok_or(VaultError::InvalidTransaction { field: "total_cost" })
}
