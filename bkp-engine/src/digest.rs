use openssl::hash::{hash, MessageDigest};

/// Chunk object-store key: MD5 hex, matching the ETag an S3-compatible
/// vault returns for a single-part PUT.
pub fn md5_hex(bytes: &[u8]) -> String {
    let digest = hash(MessageDigest::md5(), bytes).expect("md5 digest");
    hex::encode(digest)
}

/// Whole-file digest, taken over the concatenated chunk bytes in offset
/// order.
pub struct Sha256Accumulator {
    hasher: openssl::hash::Hasher,
}

impl Sha256Accumulator {
    pub fn new() -> Self {
        Self {
            hasher: openssl::hash::Hasher::new(MessageDigest::sha256()).expect("sha256 hasher"),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes).expect("sha256 update");
    }

    pub fn finish_hex(mut self) -> String {
        let digest = self.hasher.finish().expect("sha256 finish");
        hex::encode(digest)
    }
}

impl Default for Sha256Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_matches_known_vector() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn sha256_accumulates_across_updates() {
        let mut acc = Sha256Accumulator::new();
        acc.update(b"hello, ");
        acc.update(b"world");
        let whole = {
            let mut acc = Sha256Accumulator::new();
            acc.update(b"hello, world");
            acc.finish_hex()
        };
        assert_eq!(acc.finish_hex(), whole);
    }
}
