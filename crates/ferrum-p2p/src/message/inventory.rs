//! Inventory vectors: announcements of objects a peer possesses, and the
//! request form (`getdata`) for fetching them.

use crate::blockdata::block::BlockHash;
use crate::blockdata::transaction::Txid;
use crate::consensus::{Decodable, Encodable, EncodeDecodeError, VarInt};
use crate::hashes::Hash;
use crate::io::{Error as IoError, Read, Write};

/// Most entries a single `inv`/`getdata` payload may carry.
const MAX_INV_ENTRIES: u64 = 50_000;

/// One inventory vector: a 4-byte type tag and a 32-byte hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Inventory {
    /// The hash is a transaction id.
    Transaction(Txid),
    /// The hash is a block hash.
    Block(BlockHash),
    /// An unrecognized type tag, kept for reporting.
    Unknown {
        /// The type tag that was not recognized.
        inv_type: u32,
        /// The hash carried with it.
        hash: [u8; 32],
    },
}

impl Inventory {
    fn as_parts(&self) -> (u32, [u8; 32]) {
        match self {
            Inventory::Transaction(txid) => (1, txid.to_byte_array()),
            Inventory::Block(hash) => (2, hash.to_byte_array()),
            Inventory::Unknown { inv_type, hash } => (*inv_type, *hash),
        }
    }
}

impl Encodable for Inventory {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let (inv_type, hash) = self.as_parts();
        let mut len = 0;
        len += inv_type.consensus_encode(writer)?;
        len += hash.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for Inventory {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let inv_type = u32::consensus_decode(reader)?;
        let hash = <[u8; 32]>::consensus_decode(reader)?;
        Ok(match inv_type {
            1 => Inventory::Transaction(Txid::from_byte_array(hash)),
            2 => Inventory::Block(BlockHash::from_byte_array(hash)),
            _ => Inventory::Unknown { inv_type, hash },
        })
    }
}

/// The list form shared by `inv` and `getdata` payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryList(pub Vec<Inventory>);

impl InventoryList {
    pub fn new(entries: Vec<Inventory>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, inventory: Inventory) {
        self.0.push(inventory);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Inventory> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Inventory] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Inventory> {
        self.0
    }
}

impl From<Vec<Inventory>> for InventoryList {
    fn from(entries: Vec<Inventory>) -> Self {
        Self::new(entries)
    }
}

impl IntoIterator for InventoryList {
    type Item = Inventory;
    type IntoIter = std::vec::IntoIter<Inventory>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a InventoryList {
    type Item = &'a Inventory;
    type IntoIter = std::slice::Iter<'a, Inventory>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Encodable for InventoryList {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let mut len = 0;
        len += VarInt::from(self.0.len()).consensus_encode(writer)?;
        for entry in &self.0 {
            len += entry.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl Decodable for InventoryList {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let count = VarInt::consensus_decode(reader)?.0;
        if count > MAX_INV_ENTRIES {
            return Err(EncodeDecodeError::ParseFailed("too many inventory entries"));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(Inventory::consensus_decode(reader)?);
        }
        Ok(InventoryList(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{hex_to_blockhash, hex_to_txid};

    #[test]
    fn inventory_encode() -> Result<(), Box<dyn std::error::Error>> {
        let expected = hex::decode(
            "01000000\
            de55ffd709ac1f5dc509a0925d0b1fc4\
            42ca034f224732e429081da1b621f55a",
        )?;

        let txid = hex_to_txid("de55ffd709ac1f5dc509a0925d0b1fc442ca034f224732e429081da1b621f55a")?;
        let mut encoded = Vec::new();
        Inventory::Transaction(txid).consensus_encode(&mut encoded)?;
        assert_eq!(expected, encoded);
        Ok(())
    }

    #[test]
    fn inventory_list_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let txid = hex_to_txid("de55ffd709ac1f5dc509a0925d0b1fc442ca034f224732e429081da1b621f55a")?;
        let block =
            hex_to_blockhash("00000000000000000007878ec04bb2543ee2c5f9ce6d8b9c8d2d41a5b17db6a6")?;

        let original = InventoryList::new(vec![
            Inventory::Transaction(txid),
            Inventory::Block(block),
        ]);

        let mut encoded = Vec::new();
        original.consensus_encode(&mut encoded)?;

        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = InventoryList::consensus_decode(&mut cursor)?;
        assert_eq!(original, decoded);
        Ok(())
    }

    #[test]
    fn empty_list_is_one_byte() -> Result<(), Box<dyn std::error::Error>> {
        let mut encoded = Vec::new();
        InventoryList::default().consensus_encode(&mut encoded)?;
        assert_eq!(encoded, vec![0x00]);
        Ok(())
    }

    #[test]
    fn unknown_type_preserved() -> Result<(), Box<dyn std::error::Error>> {
        let entry = Inventory::Unknown {
            inv_type: 0x4000_0001,
            hash: [0x5a; 32],
        };
        let mut encoded = Vec::new();
        entry.consensus_encode(&mut encoded)?;

        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = Inventory::consensus_decode(&mut cursor)?;
        assert_eq!(entry, decoded);
        Ok(())
    }
}
