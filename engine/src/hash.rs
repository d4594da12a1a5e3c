use md5::Md5;
use sha2::{Digest, Sha256};

/// Collapse a message to its canonical comparison form: lowercase, runs of
/// whitespace squeezed to a single space, leading/trailing whitespace gone.
pub fn normalize_message(message: &str) -> String {
    message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 hex digest over the event's identifying fields. Two events that
/// differ only in message case or whitespace produce the same fingerprint.
pub fn build_fingerprint(user_id: &str, event_type: &str, message: &str, source: &str) -> String {
    let canonical = format!(
        "{user_id}|{event_type}|{}|{source}",
        normalize_message(message)
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// 64-bit SimHash over the message's word tokens.
///
/// Tokens are word-character runs, lowercased, with tokens of length <= 2
/// dropped. Each token contributes the first 64 bits of its MD5 digest to a
/// per-bit tally; the output sets bit `i` when the tally at `i` is positive.
/// An empty token set hashes to 0.
pub fn simhash(message: &str) -> u64 {
    let tokens = tokenize(message);
    if tokens.is_empty() {
        return 0;
    }

    let mut tally = [0i32; 64];
    for token in tokens {
        let hash = token_hash(&token);
        for (i, slot) in tally.iter_mut().enumerate() {
            if hash >> i & 1 == 1 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }

    let mut out = 0u64;
    for (i, slot) in tally.iter().enumerate() {
        if *slot > 0 {
            out |= 1 << i;
        }
    }
    out
}

/// Popcount of the bitwise XOR; 0 means identical token profiles.
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

fn tokenize(message: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in message.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            for lowered in ch.to_lowercase() {
                current.push(lowered);
            }
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens.retain(|token| token.chars().count() > 2);
    tokens
}

/// First 64 bits of the token's MD5 digest, big-endian.
fn token_hash(token: &str) -> u64 {
    let digest = Md5::digest(token.as_bytes());
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}
