/// Content fingerprints for target files and their backups.
use sha2::{Digest as _, Sha256};

/// A SHA-256 content digest: 64 lowercase hex chars.
/// Newtype prevents mixing with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

impl ContentHash {
    /// First twelve hex chars, enough to tell files apart in a summary line.
    pub fn short(&self) -> &str {
        return self.0.get(..12).unwrap_or(self.0.as_str());
    }
}

/// Hash raw file bytes.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let digest = Sha256::digest(bytes);
    return ContentHash(format!("{digest:x}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_known_digest() {
        let hash = hash_bytes(b"");
        assert_eq!(
            hash.0,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash.short(), "e3b0c44298fc");
    }

    #[test]
    fn one_byte_change_changes_digest() {
        assert_ne!(hash_bytes(b"<p>a</p>"), hash_bytes(b"<p>b</p>"));
    }
}
