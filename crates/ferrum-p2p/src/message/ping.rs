use crate::consensus::{Decodable, Encodable, EncodeDecodeError};
use crate::io::{Error as IoError, Read, Write};
use rand::{rng, RngCore};

/// A liveness probe.
///
/// Peers past BIP 0031 carry a nonce that the matching [`Pong`] echoes;
/// older peers send an empty payload and expect no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ping {
    nonce: Option<u64>,
}

impl Ping {
    /// A ping with a fresh random nonce (drawn from the u32 range, which
    /// is plenty for matching one outstanding probe).
    pub fn new() -> Self {
        Self {
            nonce: Some(u64::from(rng().next_u32())),
        }
    }

    pub fn with_nonce(nonce: u64) -> Self {
        Self { nonce: Some(nonce) }
    }

    /// The pre-BIP0031 form with no nonce.
    pub fn without_nonce() -> Self {
        Self { nonce: None }
    }

    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }
}

impl Default for Ping {
    fn default() -> Self {
        Self::new()
    }
}

impl Encodable for Ping {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        match self.nonce {
            Some(nonce) => nonce.consensus_encode(writer),
            None => Ok(0),
        }
    }
}

/// The reply to a nonce-carrying [`Ping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pong {
    nonce: u64,
}

impl Pong {
    pub fn new(nonce: u64) -> Self {
        Self { nonce }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

impl Encodable for Pong {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        self.nonce.consensus_encode(writer)
    }
}

impl Decodable for Pong {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        Ok(Pong {
            nonce: u64::consensus_decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_nonce_in_u32_range() {
        let ping = Ping::new();
        assert!(ping.nonce().unwrap() <= u64::from(u32::MAX));
    }

    #[test]
    fn ping_encodes_nonce_little_endian() {
        let ping = Ping::with_nonce(0x4dafe211_21109400);
        let mut encoded = Vec::new();
        ping.consensus_encode(&mut encoded).unwrap();
        assert_eq!(hex::encode(&encoded), "0094102111e2af4d");
    }

    #[test]
    fn nonce_less_ping_is_empty() {
        let mut encoded = Vec::new();
        let written = Ping::without_nonce().consensus_encode(&mut encoded).unwrap();
        assert_eq!(written, 0);
        assert!(encoded.is_empty());
    }

    #[test]
    fn pong_roundtrip() {
        let pong = Pong::new(0x123456789abcdef0);
        let mut encoded = Vec::new();
        pong.consensus_encode(&mut encoded).unwrap();
        assert_eq!(encoded.len(), 8);

        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = Pong::consensus_decode(&mut cursor).unwrap();
        assert_eq!(decoded, pong);
    }
}
