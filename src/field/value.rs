//! Value normalization and content hashing

use sha1::{Digest, Sha1};

/// Trim surrounding whitespace and lowercase
pub fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Lowercase hex SHA-1 of the normalized value
pub fn content_hash(value: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(normalize_value(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Length in UTF-16 code units, the unit the collector stores
pub fn text_length(value: &str) -> usize {
    value.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("  Hello World \n"), "hello world");
        assert_eq!(normalize_value(""), "");
    }

    #[test]
    fn test_known_hashes() {
        assert_eq!(content_hash("field-value"), "9997ef5e83403936ae103c90c66757621c382d21");
        assert_eq!(content_hash(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_hash_is_over_normalized_value() {
        assert_eq!(content_hash("Hello "), content_hash("hello"));
        assert_eq!(content_hash("  HELLO"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hell o"));
    }

    #[test]
    fn test_text_length_counts_utf16_units() {
        assert_eq!(text_length("Hello "), 6);
        assert_eq!(text_length("é"), 1);
        assert_eq!(text_length("😀"), 2);
    }
}
