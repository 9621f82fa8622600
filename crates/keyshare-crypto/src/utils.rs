//! Common utility functions for keyshare cryptographic operations.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

use crate::errors::{CryptoError, Result};

/// Generate cryptographically secure random bytes.
///
/// Uses the system's CSPRNG to fill a fixed-size array with random bytes.
///
/// # Example
///
/// ```
/// use keyshare_crypto::generate_random_bytes;
///
/// let iv: [u8; 12] = generate_random_bytes();
/// let salt: [u8; 16] = generate_random_bytes();
/// ```
pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Standard base64 encode (with padding), the wire encoding for all binary
/// payload fields.
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Standard base64 decode.
pub fn base64_decode(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data)
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
}
