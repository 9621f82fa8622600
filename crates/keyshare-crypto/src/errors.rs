//! Error types for keyshare cryptographic operations.

use thiserror::Error;

/// Errors produced by the cryptographic core.
///
/// Crypto failures are never swallowed: a silent failure in this layer can
/// cost the user their key, so every fallible operation returns a typed
/// error that callers are expected to propagate.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authenticated decryption failed: wrong password/credential or
    /// corrupted ciphertext. The AEAD tag check guarantees garbage plaintext
    /// is never returned.
    #[error("decryption failed: wrong credential or corrupted ciphertext")]
    Decryption,

    /// Fewer shares than the reconstruction threshold were supplied.
    #[error("need at least {required} shares to reconstruct the key, got {provided}")]
    InsufficientShares {
        /// Shares required (the threshold).
        required: usize,
        /// Shares actually supplied.
        provided: usize,
    },

    /// Two shares with the same index were supplied.
    #[error("duplicate share index: {0}")]
    DuplicateShareIndex(u8),

    /// A share failed structural validation.
    #[error("invalid share format: {0}")]
    InvalidShareFormat(String),

    /// A split produced shares that do not reconstruct the input key.
    ///
    /// `expected`/`got` carry the hex key material for forensics; only the
    /// failing combination is included in the display form.
    #[error("share verification failed for combination {combination}")]
    ShareVerification {
        /// Which share pairing failed, e.g. `"device+auth"`.
        combination: String,
        /// Hex of the key that was split.
        expected: String,
        /// Hex of what the pairing reconstructed.
        got: String,
    },

    /// The Shamir split itself failed.
    #[error("share split failed: {0}")]
    SplitFailed(String),

    /// The Shamir reconstruction itself failed.
    #[error("share reconstruction failed: {0}")]
    ReconstructFailed(String),

    /// A recovery phrase failed structural validation (word count, length).
    #[error("invalid recovery phrase: {0}")]
    PhraseFormat(String),

    /// A word is not part of the fixed word list. Kept distinct from
    /// [`CryptoError::Checksum`] so UIs can point at the bad word.
    #[error("invalid word in recovery phrase: {0}")]
    InvalidWord(String),

    /// The recovery phrase checksum does not match its payload.
    #[error("recovery phrase checksum mismatch")]
    Checksum,

    /// Key-derivation parameters are below the security floor or invalid.
    #[error("invalid KDF parameters: {0}")]
    KdfParams(String),

    /// Symmetric encryption failed.
    #[error("encryption failed")]
    Encryption,

    /// A hex or base64 field could not be decoded.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A key or public-key field has the wrong length.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        got: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CryptoError>;
