//! Prompt fingerprints, logged so prompt revisions can be told apart.

use sha2::{Digest, Sha256};

/// Compute a stable SHA-256 fingerprint for a prompt string.
pub fn hash_prompt(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// First 12 hex characters of [`hash_prompt`], for log lines.
pub fn short_fingerprint(prompt: &str) -> String {
    let mut hash = hash_prompt(prompt);
    hash.truncate(12);
    hash
}
