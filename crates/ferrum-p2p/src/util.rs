use bitcoin::{BlockHash, Txid};
use hex::FromHex;

use crate::hashes::Hash;

/// Convert a hex string (internal byte order) to a Txid.
pub fn hex_to_txid(hex: &str) -> Result<Txid, hex::FromHexError> {
    let bytes = <[u8; 32]>::from_hex(hex)?;
    Ok(Txid::from_byte_array(bytes))
}

/// Convert a hex string (internal byte order) to a BlockHash.
pub fn hex_to_blockhash(hex: &str) -> Result<BlockHash, hex::FromHexError> {
    let bytes = <[u8; 32]>::from_hex(hex)?;
    Ok(BlockHash::from_byte_array(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_txid() {
        let hex = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
        let txid = hex_to_txid(hex).unwrap();
        // Hashes display in reverse byte order.
        assert_eq!(
            txid.to_string(),
            "3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a"
        );
    }

    #[test]
    fn test_invalid_hex() {
        assert!(hex_to_txid("not hex").is_err());
        assert!(hex_to_blockhash("abcd").is_err());
    }
}
