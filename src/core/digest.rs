use sha2::{Digest, Sha256};

const HEX: &[u8; 16] = b"0123456789abcdef";

/// First 32 hex characters of the SHA-256 digest of `input`.
///
/// Slugs and ETags share this shape, so both satisfy `^[0-9a-f]{32}$`.
pub fn short_digest(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    let mut out = String::with_capacity(32);
    for &b in digest.iter().take(16) {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::is_valid_etag;

    #[test]
    fn test_short_digest() {
        // SHA-256("") = e3b0c442 98fc1c14 9afbf4c8 996fb924 ...
        assert_eq!(short_digest(b""), "e3b0c44298fc1c149afbf4c8996fb924");
        assert!(is_valid_etag(&short_digest(b"anything")));
        assert_ne!(short_digest(b"a"), short_digest(b"b"));
    }
}
