//! DID derivation from a private signing key.
//!
//! A `did:key` identifier is derived deterministically from the Ed25519
//! verifying key: the multicodec prefix `0xed 0x01` followed by the 32
//! public-key bytes, multibase base58btc encoded. Because the mapping is
//! deterministic, the DID doubles as the integrity check that a
//! reconstructed private key is the expected one, the only guard against
//! the silent wrong-key hazard of mixed-split reconstruction.

use ed25519_dalek::SigningKey;
use multibase::Base;

use crate::keys::PrivateKey;

const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

/// Derive the `did:key` identifier for a private key.
pub fn did_key_from_private_key(key: &PrivateKey) -> String {
    let signing = SigningKey::from_bytes(key.as_bytes());
    let verifying = signing.verifying_key();

    let mut bytes = Vec::with_capacity(2 + 32);
    bytes.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
    bytes.extend_from_slice(verifying.as_bytes());

    format!("did:key:{}", multibase::encode(Base::Base58Btc, bytes))
}
