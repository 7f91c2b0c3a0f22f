pub use bitcoin::hashes::{sha256d::Hash as Sha256dHash, Hash};

/// Double-SHA256 used for wire message checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChecksumHash(Sha256dHash);

impl ChecksumHash {
    /// Hash the given payload.
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256dHash::hash(data))
    }

    /// First four bytes of the hash, as carried in the frame header.
    pub fn checksum(&self) -> [u8; 4] {
        let bytes = self.0.as_byte_array();
        [bytes[0], bytes[1], bytes[2], bytes[3]]
    }
}

impl From<Sha256dHash> for ChecksumHash {
    fn from(hash: Sha256dHash) -> Self {
        Self(hash)
    }
}

impl AsRef<[u8]> for ChecksumHash {
    fn as_ref(&self) -> &[u8] {
        self.0.as_byte_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_checksum() {
        // sha256d("") starts with 5d f6 e0 e2.
        assert_eq!(ChecksumHash::hash(b"").checksum(), [0x5d, 0xf6, 0xe0, 0xe2]);
    }
}
