//! Genesis block information for the Ferrum networks.

use crate::blockdata::block::{BlockHash, TxMerkleNode};
use crate::hashes::Hash;
use crate::network::Network;

/// Genesis block constants for a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenesisInfo {
    /// Hash of the genesis block.
    pub hash: BlockHash,
    /// Merkle root of the genesis coinbase.
    pub merkle_root: TxMerkleNode,
    /// Timestamp of the genesis block.
    pub timestamp: u32,
    /// Nonce of the genesis block.
    pub nonce: u32,
    /// Compact difficulty of the genesis block.
    pub bits: u32,
    /// Version of the genesis block.
    pub version: u32,
}

impl GenesisInfo {
    /// Genesis constants for the given network.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    pub fn mainnet() -> Self {
        Self {
            hash: BlockHash::from_byte_array([
                0x6f, 0x3c, 0x1a, 0x5b, 0x8e, 0x2d, 0x47, 0x91, 0xa3, 0x55, 0xe8, 0x07, 0x6a,
                0xbd, 0x21, 0x4e, 0x9c, 0x13, 0x77, 0x02, 0xd5, 0x4a, 0x8f, 0x60, 0xbb, 0x09,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]),
            merkle_root: TxMerkleNode::from_byte_array([
                0x8a, 0x17, 0xf3, 0x2d, 0x4c, 0x09, 0xb5, 0x6e, 0xd1, 0x42, 0x7a, 0x95, 0x0f,
                0xe6, 0x3b, 0xc8, 0x21, 0x5d, 0x90, 0x4a, 0x76, 0xee, 0x08, 0x13, 0xb2, 0x5c,
                0xa4, 0x3f, 0x61, 0x0d, 0x29, 0x87,
            ]),
            timestamp: 1_377_557_832,
            nonce: 2_714_385_204,
            bits: 0x1d00ffff,
            version: 1,
        }
    }

    pub fn testnet() -> Self {
        Self {
            hash: BlockHash::from_byte_array([
                0x2e, 0x84, 0xc5, 0x09, 0x71, 0x1f, 0x36, 0xd8, 0x42, 0x6b, 0x0d, 0xf0, 0x58,
                0xa9, 0x33, 0x17, 0x64, 0x2f, 0x5a, 0x8c, 0xe1, 0x03, 0xbd, 0x4f, 0x26, 0x05,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]),
            merkle_root: TxMerkleNode::from_byte_array([
                0x8a, 0x17, 0xf3, 0x2d, 0x4c, 0x09, 0xb5, 0x6e, 0xd1, 0x42, 0x7a, 0x95, 0x0f,
                0xe6, 0x3b, 0xc8, 0x21, 0x5d, 0x90, 0x4a, 0x76, 0xee, 0x08, 0x13, 0xb2, 0x5c,
                0xa4, 0x3f, 0x61, 0x0d, 0x29, 0x87,
            ]),
            timestamp: 1_377_558_401,
            nonce: 1_924_588_547,
            bits: 0x1d07fff8,
            version: 1,
        }
    }

    pub fn regtest() -> Self {
        Self {
            hash: BlockHash::from_byte_array([
                0x3d, 0xa2, 0x5c, 0xe7, 0x19, 0x40, 0xbc, 0x6e, 0x85, 0x0b, 0x72, 0xc4, 0x2a,
                0x91, 0xd6, 0x5f, 0x08, 0xe3, 0x4d, 0xb0, 0x77, 0x1c, 0xaa, 0x23, 0x94, 0x6d,
                0x12, 0x88, 0x4b, 0xf5, 0x30, 0x0a,
            ]),
            merkle_root: TxMerkleNode::from_byte_array([
                0x4a, 0x5e, 0x1e, 0x4b, 0xaa, 0xb8, 0x9f, 0x3a, 0x32, 0x51, 0x8a, 0x88, 0xc3,
                0x1b, 0xc8, 0x7f, 0x61, 0x8f, 0x76, 0x67, 0x3e, 0x2c, 0xc7, 0x7a, 0xb2, 0x12,
                0x7b, 0x7a, 0xfd, 0xed, 0xa3, 0x3b,
            ]),
            timestamp: 1_296_688_602,
            nonce: 2,
            bits: 0x207fffff,
            version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_genesis_display() {
        let genesis = GenesisInfo::mainnet();
        // Hashes display in reverse byte order, so the work shows up front.
        assert_eq!(
            genesis.hash.to_string(),
            "00000000000009bb608f4ad50277139c4e21bd6a07e855a391472d8e5b1a3c6f"
        );
        assert_eq!(genesis.bits, 0x1d00ffff);
        assert_eq!(genesis.version, 1);
    }

    #[test]
    fn networks_have_distinct_genesis() {
        assert_ne!(GenesisInfo::mainnet().hash, GenesisInfo::testnet().hash);
        assert_ne!(GenesisInfo::testnet().hash, GenesisInfo::regtest().hash);
    }
}
