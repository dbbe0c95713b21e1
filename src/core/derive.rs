//! Extended public keys and address derivation.
//!
//! A cached extended public key is enough to derive any non-hardened child
//! locally, so fixed-base conventions need exactly one device round trip per
//! session. Address derivation is secp256k1 point arithmetic plus Keccak-256,
//! with EIP-55 checksumming on the way out.

use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ProjectivePoint, PublicKey, SecretKey};
use sha2::Sha512;
use sha3::{Digest, Keccak256};

use crate::core::errors::KeyringError;

type HmacSha512 = Hmac<Sha512>;

const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Compressed public key plus chain code, sufficient for local non-hardened
/// child derivation without further device interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    public_key: [u8; 33],
    chain_code: [u8; 32],
}

impl ExtendedPublicKey {
    /// Build from the hex strings a signing bridge returns.
    pub fn from_hex(public_key: &str, chain_code: &str) -> Result<Self, KeyringError> {
        let pk = hex::decode(public_key)
            .map_err(|e| KeyringError::InvalidKey(format!("bad public key hex: {}", e)))?;
        let cc = hex::decode(chain_code)
            .map_err(|e| KeyringError::InvalidKey(format!("bad chain code hex: {}", e)))?;

        let public_key: [u8; 33] = pk.as_slice().try_into().map_err(|_| {
            KeyringError::InvalidKey(format!(
                "public key must be 33 compressed bytes, got {}",
                pk.len()
            ))
        })?;
        let chain_code: [u8; 32] = cc.as_slice().try_into().map_err(|_| {
            KeyringError::InvalidKey(format!("chain code must be 32 bytes, got {}", cc.len()))
        })?;

        // Reject anything that is not a point on the curve up front.
        PublicKey::from_sec1_bytes(&public_key)
            .map_err(|e| KeyringError::InvalidKey(format!("invalid secp256k1 point: {}", e)))?;

        Ok(Self { public_key, chain_code })
    }

    /// Hex of the compressed public key; used as the base-key fingerprint.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// BIP32 CKDpub: non-hardened child at `index`.
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyringError> {
        if index >= HARDENED_OFFSET {
            return Err(KeyringError::InvalidKey(format!(
                "cannot derive hardened child {} from a public key",
                index
            )));
        }

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| KeyringError::InvalidKey(format!("HMAC initialization failed: {}", e)))?;
        mac.update(&self.public_key);
        mac.update(&index.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        // IL must be a non-zero scalar below the curve order.
        let tweak = SecretKey::from_slice(&digest[..32])
            .map_err(|e| KeyringError::InvalidKey(format!("derived tweak out of range: {}", e)))?;
        let parent = PublicKey::from_sec1_bytes(&self.public_key)
            .map_err(|e| KeyringError::InvalidKey(format!("invalid parent point: {}", e)))?;

        let child_point =
            ProjectivePoint::GENERATOR * *tweak.to_nonzero_scalar() + parent.to_projective();
        let child = PublicKey::from_affine(child_point.to_affine()).map_err(|_| {
            KeyringError::InvalidKey("derived child is the point at infinity".to_string())
        })?;

        let encoded = child.to_encoded_point(true);
        let mut public_key = [0u8; 33];
        public_key.copy_from_slice(encoded.as_bytes());
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);

        Ok(Self { public_key, chain_code })
    }

    /// Checksummed Ethereum address of this key.
    pub fn address(&self) -> Result<String, KeyringError> {
        let key = PublicKey::from_sec1_bytes(&self.public_key)
            .map_err(|e| KeyringError::InvalidKey(format!("invalid secp256k1 point: {}", e)))?;
        let uncompressed = key.to_encoded_point(false);
        // Keccak-256 over the 64-byte point, skipping the 0x04 tag; the
        // address is the last 20 bytes.
        let hash = Keccak256::digest(&uncompressed.as_bytes()[1..]);
        Ok(to_checksum_address(&format!("0x{}", hex::encode(&hash[12..]))))
    }
}

/// EIP-55 mixed-case checksum encoding.
///
/// https://eips.ethereum.org/EIPS/eip-55
pub fn to_checksum_address(address: &str) -> String {
    let addr = address.trim_start_matches("0x").to_lowercase();
    let hash_hex = hex::encode(Keccak256::digest(addr.as_bytes()));

    let checksum_addr: String = addr
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if c.is_numeric() {
                c
            } else {
                let hash_char = hash_hex.chars().nth(i).unwrap_or('0');
                if hash_char >= '8' {
                    c.to_ascii_uppercase()
                } else {
                    c
                }
            }
        })
        .collect();

    format!("0x{}", checksum_addr)
}

/// Canonical comparison: addresses are equal regardless of checksum casing.
pub fn is_same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
