//! Private signing-key seed type.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::PRIVATE_KEY_LEN;
use crate::errors::{CryptoError, Result};
use crate::utils::generate_random_bytes;

/// A 32-byte signing-key seed.
///
/// Only ever held in volatile memory of the active session, never persisted
/// verbatim. The memory is zeroized on drop. Hex (64 lowercase characters)
/// is the interchange form at API boundaries.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; PRIVATE_KEY_LEN]);

impl PrivateKey {
    /// Generate a fresh key from the system CSPRNG.
    pub fn generate() -> Self {
        Self(generate_random_bytes())
    }

    /// Wrap raw seed bytes.
    pub fn from_bytes(bytes: [u8; PRIVATE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its 64-character hex form.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|_| CryptoError::InvalidEncoding("invalid hex private key".to_string()))?;

        let seed: [u8; PRIVATE_KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: PRIVATE_KEY_LEN,
                    got: bytes.len(),
                })?;

        Ok(Self(seed))
    }

    /// The raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.0
    }

    /// Hex form of the seed.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// Never print key material, even in debug output.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}
