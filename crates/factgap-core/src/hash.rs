//! Content identity hashing.
//!
//! Every chunk is identified by the SHA-256 of its **original** text, the
//! exact bytes produced by the chunker, before any enrichment header is
//! prepended. The same rule is used by the indexer, the batch embedder,
//! and every store existence check; no call site lower-cases, trims, or
//! otherwise normalizes content before hashing.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const CONTENT_HASH_LEN: usize = 64;

/// Compute the lower-case hex SHA-256 digest of `content`.
///
/// ```rust
/// use factgap_core::hash::{compute_content_hash, CONTENT_HASH_LEN};
///
/// let h = compute_content_hash("fn main() {}");
/// assert_eq!(h.len(), CONTENT_HASH_LEN);
/// assert_eq!(h, compute_content_hash("fn main() {}"));
/// ```
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash an ordered list of key parts into one digest.
///
/// Parts are length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
/// never collide.
pub fn hash_parts<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let a = compute_content_hash("def foo():\n    return 1\n");
        let b = compute_content_hash("def foo():\n    return 1\n");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_is_fixed_length_hex() {
        for input in ["", "a", "a much longer piece of text \u{2603}"] {
            let h = compute_content_hash(input);
            assert_eq!(h.len(), CONTENT_HASH_LEN);
            assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_distinct_inputs_distinct_hashes() {
        let corpus = [
            "fn a() {}",
            "fn a() {} ",
            "fn b() {}",
            "FN A() {}",
            "",
            "\n",
            "import os",
            "import  os",
        ];
        let hashes: std::collections::HashSet<String> =
            corpus.iter().map(|c| compute_content_hash(c)).collect();
        assert_eq!(hashes.len(), corpus.len());
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            compute_content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_parts_length_prefixed() {
        assert_ne!(hash_parts(["ab", "c"]), hash_parts(["a", "bc"]));
        assert_eq!(hash_parts(["x", "y"]), hash_parts(["x", "y"]));
    }
}
