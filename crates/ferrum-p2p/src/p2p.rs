use crate::consensus::{Decodable, Encodable};
use crate::io::{Error, Read, Write};
use crate::network::Network;
pub use bitcoin::p2p::ServiceFlags;

/// Network magic bytes identifying which Ferrum network a frame belongs to.
#[derive(Debug, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Magic([u8; 4]);

impl Magic {
    /// Ferrum main network magic bytes.
    pub const MAINNET: Self = Self([0xfd, 0xc2, 0xb7, 0xdc]);
    /// Ferrum test network magic bytes.
    pub const TESTNET: Self = Self([0x0c, 0x12, 0x08, 0x06]);
    /// Ferrum regression test network magic bytes.
    pub const REGTEST: Self = Self([0xfc, 0xb1, 0xa6, 0xdf]);

    pub fn to_bytes(&self) -> [u8; 4] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Magic(bytes)
    }
}

impl From<Network> for Magic {
    fn from(network: Network) -> Self {
        match network {
            Network::Mainnet => Magic::MAINNET,
            Network::Testnet => Magic::TESTNET,
            Network::Regtest => Magic::REGTEST,
        }
    }
}

impl std::fmt::Display for Magic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        hex::encode(self.0).fmt(f)
    }
}

impl Encodable for Magic {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, Error> {
        self.0.consensus_encode(writer)
    }
}

impl Decodable for Magic {
    fn consensus_decode<R: Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, crate::consensus::EncodeDecodeError> {
        Ok(Magic(Decodable::consensus_decode(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_roundtrip() {
        let mut encoded = Vec::new();
        Magic::MAINNET.consensus_encode(&mut encoded).unwrap();
        assert_eq!(encoded, vec![0xfd, 0xc2, 0xb7, 0xdc]);

        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = Magic::consensus_decode(&mut cursor).unwrap();
        assert_eq!(decoded, Magic::MAINNET);
    }

    #[test]
    fn magic_per_network() {
        assert_eq!(Magic::from(Network::Mainnet), Magic::MAINNET);
        assert_eq!(Magic::from(Network::Testnet), Magic::TESTNET);
        assert_eq!(Magic::from(Network::Regtest), Magic::REGTEST);
        assert_ne!(Magic::MAINNET, Magic::TESTNET);
    }
}
