use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 over the concatenation of `parts`
pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
