//! Constants shared across the keyshare cryptographic core.

/// Total number of shares produced by one Shamir split.
pub const SSS_TOTAL_SHARES: usize = 4;

/// Minimum number of shares required to reconstruct a key.
pub const SSS_THRESHOLD: usize = 2;

/// Length in bytes of a private signing-key seed.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Length in bytes of one share: 1 index byte + 32 data bytes.
pub const SHARE_LEN: usize = 33;

/// Argon2id memory cost in KiB. Floor value; lower settings are rejected.
pub const ARGON2_M_COST: u32 = 65536; // 64 MiB

/// Argon2id time cost (iterations). Floor value.
pub const ARGON2_T_COST: u32 = 3;

/// Argon2id parallelism. Floor value.
pub const ARGON2_P_COST: u32 = 1;

/// Derived-key length for password encryption (AES-256).
pub const ARGON2_OUTPUT_LEN: usize = 32;

/// Salt length for password-based key derivation.
pub const PASSWORD_SALT_LEN: usize = 16;

/// AES-GCM nonce length.
pub const AES_GCM_IV_LEN: usize = 12;

/// Minimum word count accepted by the recovery-phrase decoder.
pub const PHRASE_MIN_WORDS: usize = 12;

/// Maximum word count accepted by the recovery-phrase decoder.
pub const PHRASE_MAX_WORDS: usize = 27;

/// Domain separation for the QR transfer key derivation.
pub const TRANSFER_KDF_INFO: &[u8] = b"keyshare:qr-share-transfer:v1";
