//! Signing identity derivation and envelope signing.
//!
//! A 32-byte secret deterministically derives exactly one secp256k1 signing
//! identity; signing uses RFC 6979 nonces, so the same unsigned transaction
//! signed twice with the same secret yields byte-identical envelopes. The
//! secret is parsed per call and never retained or logged.

use crate::error::{ChainTraceError, Result};
use crate::ledger::{Address, SignedEnvelope, UnsignedTransaction};
use k256::ecdsa::{signature::Signer, Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

/// A signing identity derived from a caller-provided secret.
///
/// Scoped to a single orchestration call; key material is zeroized on drop.
pub struct SigningIdentity {
    signing_key: SigningKey,
    address: Address,
}

impl SigningIdentity {
    /// Derive the identity from a 32-byte hex secret (with or without a
    /// `0x` prefix).
    pub fn from_secret(secret: &str) -> Result<Self> {
        let stripped = secret.trim().strip_prefix("0x").unwrap_or_else(|| secret.trim());
        let mut bytes = hex::decode(stripped)
            .map_err(|_| ChainTraceError::InvalidKey("secret is not valid hex".to_string()))?;

        if bytes.len() != 32 {
            bytes.zeroize();
            return Err(ChainTraceError::InvalidKey(format!(
                "secret must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        let signing_key = SigningKey::from_slice(&bytes).map_err(|_| {
            ChainTraceError::InvalidKey("secret is not a valid signing key".to_string())
        });
        bytes.zeroize();
        let signing_key = signing_key?;

        let address = derive_address(&signing_key);
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// The account address this identity submits on behalf of
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign an unsigned transaction into a wire-ready envelope.
    ///
    /// Deterministic: identical inputs produce identical envelope bytes.
    pub fn sign(&self, transaction: &UnsignedTransaction) -> SignedEnvelope {
        let payload = transaction.encode();
        let signature: Signature = self.signing_key.sign(&payload);
        let sig_bytes: [u8; 64] = signature.to_bytes().into();

        let encoded = self.signing_key.verifying_key().to_encoded_point(true);
        let mut public_key = [0u8; 33];
        public_key.copy_from_slice(encoded.as_bytes());

        SignedEnvelope::new(payload, sig_bytes, public_key)
    }
}

impl Drop for SigningIdentity {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Account address: last 20 bytes of the Keccak-256 hash of the
/// uncompressed public key.
fn derive_address(signing_key: &SigningKey) -> Address {
    let point = signing_key.verifying_key().to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    Address(bytes)
}
