use crate::errors::{Result, VaultError};
use hmac::{Hmac, Mac as _};
use k256::{
    elliptic_curve::{sec1::ToEncodedPoint as _, Field as _, PrimeField as _},
    Scalar, SecretKey,
};
use ripemd::Ripemd160;
use sha2::{Digest as _, Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha512 = Hmac<Sha512>;

/// Child indices at or above this value are hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// One node of the BIP32 tree: private key, chain code, and position
/// metadata. Key material is wiped when the value drops.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExtendedKey {
    pub key: [u8; 32],
    pub chain_code: [u8; 32],
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_index: u32,
}

impl std::fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("key", &"[REDACTED]")
            .field("chain_code", &"[REDACTED]")
            .field("depth", &self.depth)
            .field("parent_fingerprint", &hex::encode(self.parent_fingerprint))
            .field("child_index", &self.child_index)
            .finish()
    }
}

/// One segment of a derivation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSegment {
    pub index: u32,
    pub hardened: bool,
}

/// BIP32 master key: HMAC-SHA512 keyed with `"Bitcoin seed"` over the
/// seed; left half is the private key, right half the chain code.
pub fn master_key_from(seed: &[u8]) -> Result<ExtendedKey> {
    let mut mac =
        HmacSha512::new_from_slice(MASTER_HMAC_KEY).map_err(|_e| VaultError::InvalidDerivation)?;
    mac.update(seed);
    let mut digest = mac.finalize().into_bytes();

    let (left, right) = digest.split_at(32);
    // Left half must be a valid non-zero scalar below the curve order.
    SecretKey::from_slice(left).map_err(|_e| VaultError::InvalidDerivation)?;

    let mut key = [0_u8; 32];
    let mut chain_code = [0_u8; 32];
    key.copy_from_slice(left);
    chain_code.copy_from_slice(right);
    digest.as_mut_slice().zeroize();

    Ok(ExtendedKey {
        key,
        chain_code,
        depth: 0,
        parent_fingerprint: [0_u8; 4],
        child_index: 0,
    })
}

/// CKDpriv: derive one child of `parent`.
///
/// Hardened children commit to the parent private key, normal children to
/// the compressed public key. The two failure branches required by BIP32
/// (tweak at or above the curve order, child scalar of zero) surface as
/// `InvalidDerivation`; both have probability below 2^-127 and callers
/// that want the standard skip-to-next-index behavior retry explicitly.
pub fn derive_child(parent: &ExtendedKey, index: u32, hardened: bool) -> Result<ExtendedKey> {
    if index >= HARDENED_OFFSET {
        return Err(VaultError::InvalidAccountIndex);
    }
    let effective = if hardened {
        index | HARDENED_OFFSET
    } else {
        index
    };

    let mut mac = HmacSha512::new_from_slice(&parent.chain_code)
        .map_err(|_e| VaultError::InvalidDerivation)?;
    if hardened {
        mac.update(&[0x00]);
        mac.update(&parent.key);
    } else {
        mac.update(&compressed_public_key(&parent.key)?);
    }
    mac.update(&effective.to_be_bytes());
    let mut digest = mac.finalize().into_bytes();

    let (left, right) = digest.split_at(32);
    let left_arr: [u8; 32] = left.try_into().map_err(|_e| VaultError::InvalidDerivation)?;

    let tweak = Option::<Scalar>::from(Scalar::from_repr(left_arr.into()))
        .ok_or(VaultError::InvalidDerivation)?;
    let parent_scalar = Option::<Scalar>::from(Scalar::from_repr(parent.key.into()))
        .ok_or(VaultError::InvalidDerivation)?;
    let child_scalar = tweak + parent_scalar;
    if bool::from(child_scalar.is_zero()) {
        return Err(VaultError::InvalidDerivation);
    }

    let mut key = [0_u8; 32];
    let mut repr = child_scalar.to_repr();
    key.copy_from_slice(repr.as_slice());
    repr.as_mut_slice().zeroize();

    let mut chain_code = [0_u8; 32];
    chain_code.copy_from_slice(right);
    digest.as_mut_slice().zeroize();

    Ok(ExtendedKey {
        key,
        chain_code,
        depth: parent.depth.saturating_add(1),
        parent_fingerprint: fingerprint(&parent.key)?,
        child_index: effective,
    })
}

/// Parse `m(/\d+'?)*` into segments. `"m"` alone is the master node.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let mut parts = path.trim().split('/');
    if parts.next() != Some("m") {
        return Err(VaultError::PathParse("must start with 'm'".to_owned()));
    }

    let mut segments = vec![];
    for part in parts {
        let (digits, hardened) = match part.strip_suffix('\'') {
            Some(d) => (d, true),
            None => (part, false),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VaultError::PathParse(format!("bad segment '{part}'")));
        }
        let index: u32 = digits
            .parse()
            .map_err(|_e| VaultError::PathParse(format!("bad segment '{part}'")))?;
        if index >= HARDENED_OFFSET {
            return Err(VaultError::PathParse(format!(
                "segment index out of range '{part}'"
            )));
        }
        segments.push(PathSegment { index, hardened });
    }
    Ok(segments)
}

/// Fold `derive_child` over a parsed path, starting at the master key.
pub fn derive_at_path(seed: &[u8], path: &str) -> Result<ExtendedKey> {
    let segments = parse_path(path)?;
    let mut node = master_key_from(seed)?;
    for seg in segments {
        node = derive_child(&node, seg.index, seg.hardened)?;
    }
    Ok(node)
}

/// Compressed SEC1 encoding of the public key for `private_key`.
pub fn compressed_public_key(private_key: &[u8; 32]) -> Result<[u8; 33]> {
    let sk = SecretKey::from_slice(private_key).map_err(|_e| VaultError::InvalidDerivation)?;
    let point = sk.public_key().to_encoded_point(true);
    point
        .as_bytes()
        .try_into()
        .map_err(|_e| VaultError::InvalidDerivation)
}

// BIP32 identifier prefix: RIPEMD160(SHA256(compressed pubkey)), first
// four bytes.
fn fingerprint(parent_key: &[u8; 32]) -> Result<[u8; 4]> {
    let pubkey = compressed_public_key(parent_key)?;
    let sha = Sha256::digest(pubkey);
    let rip = Ripemd160::digest(sha);
    let mut out = [0_u8; 4];
    out.copy_from_slice(rip.get(..4).ok_or(VaultError::InvalidDerivation)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Context as _;

    // BIP32 test vector 1.
    const TV1_SEED: &str = "000102030405060708090a0b0c0d0e0f";

    fn tv1_seed() -> eyre::Result<Vec<u8>> {
        hex::decode(TV1_SEED).context("decode seed")
    }

    #[test]
    fn master_key_matches_bip32_vector_1() -> eyre::Result<()> {
        let m = master_key_from(&tv1_seed()?)?;
        assert_eq!(
            hex::encode(m.key),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            hex::encode(m.chain_code),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
        assert_eq!(m.depth, 0);
        assert_eq!(m.parent_fingerprint, [0_u8; 4]);
        Ok(())
    }

    #[test]
    fn hardened_child_matches_bip32_vector_1() -> eyre::Result<()> {
        let m = master_key_from(&tv1_seed()?)?;
        let child = derive_child(&m, 0, true)?;
        assert_eq!(
            hex::encode(child.key),
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );
        assert_eq!(
            hex::encode(child.chain_code),
            "47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141"
        );
        assert_eq!(child.depth, 1);
        assert_eq!(child.child_index, HARDENED_OFFSET);
        // Master key identifier from the published vector.
        assert_eq!(hex::encode(child.parent_fingerprint), "3442193e");
        Ok(())
    }

    #[test]
    fn normal_child_matches_bip32_vector_1() -> eyre::Result<()> {
        let node = derive_at_path(&tv1_seed()?, "m/0'/1")?;
        assert_eq!(
            hex::encode(node.key),
            "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368"
        );
        assert_eq!(node.depth, 2);
        assert_eq!(node.child_index, 1);
        Ok(())
    }

    #[test]
    fn derivation_is_deterministic() -> eyre::Result<()> {
        let a = derive_at_path(&tv1_seed()?, "m/44'/60'/0'/0/0")?;
        let b = derive_at_path(&tv1_seed()?, "m/44'/60'/0'/0/0")?;
        assert_eq!(a.key, b.key);
        assert_eq!(a.chain_code, b.chain_code);
        Ok(())
    }

    #[test]
    fn hardened_and_normal_children_differ() -> eyre::Result<()> {
        let m = master_key_from(&tv1_seed()?)?;
        let hardened = derive_child(&m, 0, true)?;
        let normal = derive_child(&m, 0, false)?;
        assert_ne!(hardened.key, normal.key);
        Ok(())
    }

    #[test]
    fn parse_path_accepts_canonical_ethereum_path() -> eyre::Result<()> {
        let segs = parse_path("m/44'/60'/0'/0/7")?;
        assert_eq!(
            segs,
            vec![
                PathSegment {
                    index: 44,
                    hardened: true
                },
                PathSegment {
                    index: 60,
                    hardened: true
                },
                PathSegment {
                    index: 0,
                    hardened: true
                },
                PathSegment {
                    index: 0,
                    hardened: false
                },
                PathSegment {
                    index: 7,
                    hardened: false
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn parse_path_master_only() -> eyre::Result<()> {
        assert!(parse_path("m")?.is_empty());
        Ok(())
    }

    #[test]
    fn parse_path_rejects_malformed_input() {
        for bad in ["", "x/0", "m//0", "m/abc", "m/0''", "m/-1", "m/2147483648"] {
            assert!(
                matches!(parse_path(bad), Err(VaultError::PathParse(_))),
                "{bad:?} must fail to parse"
            );
        }
    }

    #[test]
    fn derive_child_rejects_out_of_range_index() -> eyre::Result<()> {
        let m = master_key_from(&tv1_seed()?)?;
        let err = derive_child(&m, HARDENED_OFFSET, false).err();
        assert_eq!(err, Some(VaultError::InvalidAccountIndex));
        Ok(())
    }

    #[test]
    fn debug_output_redacts_key_material() -> eyre::Result<()> {
        let m = master_key_from(&tv1_seed()?)?;
        let rendered = format!("{m:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("e8f32e72"), "key bytes must not leak");
        Ok(())
    }
}
