//! # keyshare-crypto
//!
//! Cryptographic core for the keyshare custody engine.
//!
//! A private signing key is never stored whole: it is split with Shamir's
//! Secret Sharing into four shares (device, server, recovery method, email
//! backup) with a 2-of-4 threshold. This crate provides the primitives that
//! make that safe: the split/reconstruct core, Argon2id + AES-256-GCM
//! password encryption for recovery shares, the checksummed recovery-phrase
//! codec, the ephemeral-ECDH transfer envelope used by cross-device login,
//! and `did:key` derivation used as the post-reconstruction integrity check.
//!
//! Everything here is pure computation: no I/O, no async. The client crate
//! composes these primitives with storage and network ports.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod constants;
pub mod did;
pub mod errors;
pub mod keys;
pub mod password;
pub mod phrase;
pub mod shamir;
pub mod transfer;
pub mod utils;

pub use aead::{decrypt_with_key, encrypt_with_key, AeadCiphertext};
pub use constants::*;
pub use did::did_key_from_private_key;
pub use errors::CryptoError;
pub use keys::PrivateKey;
pub use password::{
    decrypt_with_password, derive_key_from_password, encrypt_with_password, EncryptedPayload,
    KdfParams,
};
pub use phrase::{count_words, phrase_to_share, share_to_phrase, validate_recovery_phrase};
pub use shamir::{reconstruct_from_shares, split_private_key, Share, ShareSet};
pub use transfer::{
    decrypt_from_transfer, encrypt_for_transfer, TransferKeypair, TransferPayload,
};
pub use utils::{base64_decode, base64_encode, generate_random_bytes};
