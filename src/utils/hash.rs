use sha2::{Digest, Sha256};

/// Hex SHA-256 of a payload, used to identify thumbnails and models in logs
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// First 12 hex characters of the fingerprint
pub fn short_fingerprint(data: &[u8]) -> String {
    let mut full = fingerprint(data);
    full.truncate(12);
    full
}
