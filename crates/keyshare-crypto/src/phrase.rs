//! Recovery-phrase encoding of shares.
//!
//! A share is encoded directly (not encrypted) as a checksummed word
//! sequence: the share's bits, followed by the first `floor(len/4)` bits of
//! the share's SHA-256 digest, grouped 11 bits per word (the final group is
//! zero-padded) and mapped into the fixed 2048-word English list. A 33-byte
//! share encodes to 25 words. Possession of the phrase alone reconstructs
//! the share; no password involved.
//!
//! Decoding recovers the byte count from the word count alone: the LARGEST
//! byte count whose encoding needs exactly the observed number of words
//! wins. Some word counts admit two candidates; the largest-wins rule is a
//! compatibility contract with previously issued phrases and must not
//! change.

use sha2::{Digest, Sha256};

use crate::constants::{PHRASE_MAX_WORDS, PHRASE_MIN_WORDS};
use crate::errors::{CryptoError, Result};

fn word_list() -> &'static [&'static str; 2048] {
    bip39::Language::English.word_list()
}

/// Encode a hex share as a space-joined recovery phrase.
///
/// Deterministic: the same share always yields the same phrase.
pub fn share_to_phrase(share_hex: &str) -> Result<String> {
    let data = hex::decode(share_hex)
        .map_err(|_| CryptoError::InvalidEncoding("invalid hex share".to_string()))?;

    if data.is_empty() {
        return Err(CryptoError::PhraseFormat("share is empty".to_string()));
    }

    let checksum_bits = data.len() / 4;
    let digest = Sha256::digest(&data);

    let mut bits: Vec<bool> = Vec::with_capacity(data.len() * 8 + checksum_bits + 10);
    for byte in &data {
        for i in (0..8).rev() {
            bits.push(byte >> i & 1 == 1);
        }
    }
    for i in 0..checksum_bits {
        bits.push(digest[i / 8] >> (7 - i % 8) & 1 == 1);
    }

    // Zero-pad the final 11-bit group.
    while bits.len() % 11 != 0 {
        bits.push(false);
    }

    let list = word_list();
    let words: Vec<&str> = bits
        .chunks(11)
        .map(|chunk| {
            let index = chunk.iter().fold(0usize, |acc, &bit| acc << 1 | bit as usize);
            list[index]
        })
        .collect();

    Ok(words.join(" "))
}

/// Decode a recovery phrase back into its hex share.
///
/// Case-insensitive and whitespace-tolerant (runs of whitespace collapse,
/// surrounding whitespace is trimmed).
///
/// # Errors
///
/// - [`CryptoError::PhraseFormat`]: word count outside 12-27, or no byte
///   count encodes to the observed word count.
/// - [`CryptoError::InvalidWord`]: a word is not in the word list.
/// - [`CryptoError::Checksum`]: well-formed words whose checksum does not
///   match the recovered payload (e.g. transposed words). Kept distinct from
///   `InvalidWord` so UIs can tell "typo" from "reordered".
pub fn phrase_to_share(phrase: &str) -> Result<String> {
    let words: Vec<String> = phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();

    let count = words.len();
    if !(PHRASE_MIN_WORDS..=PHRASE_MAX_WORDS).contains(&count) {
        return Err(CryptoError::PhraseFormat(format!(
            "phrase must be {PHRASE_MIN_WORDS}-{PHRASE_MAX_WORDS} words, got {count}"
        )));
    }

    let list = word_list();

    let mut bits: Vec<bool> = Vec::with_capacity(count * 11);
    for word in &words {
        let index = list
            .binary_search(&word.as_str())
            .map_err(|_| CryptoError::InvalidWord(word.clone()))?;

        for i in (0..11).rev() {
            bits.push(index >> i & 1 == 1);
        }
    }

    let byte_len = recover_byte_len(count).ok_or_else(|| {
        CryptoError::PhraseFormat(format!("no share length encodes to {count} words"))
    })?;

    let data_bits = byte_len * 8;
    let checksum_bits = byte_len / 4;

    let mut data = vec![0u8; byte_len];
    for (i, bit) in bits[..data_bits].iter().enumerate() {
        if *bit {
            data[i / 8] |= 1 << (7 - i % 8);
        }
    }

    let digest = Sha256::digest(&data);
    for i in 0..checksum_bits {
        let expected = digest[i / 8] >> (7 - i % 8) & 1 == 1;
        if bits[data_bits + i] != expected {
            return Err(CryptoError::Checksum);
        }
    }

    Ok(hex::encode(data))
}

/// True iff [`phrase_to_share`] would succeed. Never errors.
pub fn validate_recovery_phrase(phrase: &str) -> bool {
    phrase_to_share(phrase).is_ok()
}

/// Count whitespace-separated words in a phrase.
pub fn count_words(phrase: &str) -> usize {
    phrase.split_whitespace().count()
}

/// Largest byte count whose encoding requires exactly `words` words.
///
/// `words` words carry `words * 11` bits; a payload of `n` bytes needs
/// `8n + floor(n/4)` bits before padding. Certain word counts match two
/// byte counts; the largest candidate wins, always.
fn recover_byte_len(words: usize) -> Option<usize> {
    let max_bytes = words * 11 / 8;
    (1..=max_bytes)
        .rev()
        .find(|&n| (8 * n + n / 4).div_ceil(11) == words)
}
