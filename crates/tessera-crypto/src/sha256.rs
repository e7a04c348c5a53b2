//! SHA-256 content hashing.
//!
//! Wraps the `sha2` crate so the rest of the system deals only in
//! [`ContentHash`] values.

use sha2::{Digest, Sha256};
use tessera_types::ContentHash;

/// Hashes `data` with SHA-256.
///
/// # Example
/// ```
/// use tessera_crypto::content_hash;
///
/// let a = content_hash(b"hello world");
/// let b = content_hash(b"hello world");
/// assert_eq!(a, b);
/// ```
pub fn content_hash(data: &[u8]) -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Returns true if `data` hashes to `expected`.
pub fn verify_content(data: &[u8], expected: &ContentHash) -> bool {
    content_hash(data) == *expected
}

/// Incremental SHA-256 over input delivered in pieces.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> ContentHash {
        let digest: [u8; 32] = self.inner.finalize().into();
        ContentHash::from_bytes(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    // Known-answer vectors from FIPS 180-2.
    #[test_case(b"", "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855" ; "empty")]
    #[test_case(b"abc", "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad" ; "abc")]
    fn known_answers(input: &[u8], expected_hex: &str) {
        assert_eq!(content_hash(input).to_hex(), expected_hex);
    }

    #[test]
    fn verify_detects_tampering() {
        let hash = content_hash(b"payload");
        assert!(verify_content(b"payload", &hash));
        assert!(!verify_content(b"payl0ad", &hash));
    }

    proptest! {
        #[test]
        fn incremental_matches_one_shot(data in proptest::collection::vec(any::<u8>(), 0..512), split in 0usize..512) {
            let split = split.min(data.len());
            let mut hasher = ContentHasher::new();
            hasher.update(&data[..split]);
            hasher.update(&data[split..]);
            prop_assert_eq!(hasher.finalize(), content_hash(&data));
        }
    }
}
