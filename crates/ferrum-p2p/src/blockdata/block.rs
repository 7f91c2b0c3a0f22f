//! Block headers and the merge-mined proof blob.

use crate::blockdata::transaction::{copy_bytes, copy_transaction, copy_varint};
use crate::consensus::{Decodable, Encodable, EncodeDecodeError};
use crate::hashes::{Hash, Sha256dHash};
use crate::io::{Error as IoError, Read, Write};
pub use bitcoin::{BlockHash, TxMerkleNode};

/// Header version bit announcing an appended auxiliary proof-of-work.
pub const VERSION_AUX_POW: u32 = 1 << 8;

/// Longest merkle branch accepted inside an auxiliary proof.
const MAX_MERKLE_BRANCH: u64 = 64;

/// Canonical 80-byte block header: version, previous hash, merkle root,
/// time, bits, nonce. All fields are little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_blockhash: BlockHash,
    pub merkle_root: TxMerkleNode,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialized size of a header.
    pub const SIZE: usize = 80;

    /// Double-SHA256 of the 80-byte serialization.
    pub fn block_hash(&self) -> BlockHash {
        let mut engine = Sha256dHash::engine();
        self.consensus_encode(&mut engine)
            .expect("engines don't error");
        BlockHash::from_byte_array(Sha256dHash::from_engine(engine).to_byte_array())
    }

    /// Whether this header announces an appended auxiliary proof-of-work.
    pub fn has_aux_pow(&self) -> bool {
        self.version & VERSION_AUX_POW != 0
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let mut len = 0;
        len += self.version.consensus_encode(writer)?;
        len += self.prev_blockhash.consensus_encode(writer)?;
        len += self.merkle_root.consensus_encode(writer)?;
        len += self.time.consensus_encode(writer)?;
        len += self.bits.consensus_encode(writer)?;
        len += self.nonce.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        Ok(BlockHeader {
            version: Decodable::consensus_decode(reader)?,
            prev_blockhash: Decodable::consensus_decode(reader)?,
            merkle_root: Decodable::consensus_decode(reader)?,
            time: Decodable::consensus_decode(reader)?,
            bits: Decodable::consensus_decode(reader)?,
            nonce: Decodable::consensus_decode(reader)?,
        })
    }
}

/// Merge-mined auxiliary proof-of-work, carried between a block header and
/// its transaction count on networks that share work with a parent chain.
///
/// The proof is structure-validated on decode (parent coinbase transaction,
/// parent block hash, two merkle branches, parent header) but kept as raw
/// bytes: verifying it against the parent chain is the store's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxPow {
    raw: Vec<u8>,
}

impl AuxPow {
    /// Wrap an already-validated proof blob.
    pub fn from_raw(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Copy one merkle branch (varint count, hashes, u32 side mask) into `out`.
fn copy_branch<R: Read + ?Sized>(
    reader: &mut R,
    out: &mut Vec<u8>,
) -> Result<(), EncodeDecodeError> {
    let count = copy_varint(reader, out)?;
    if count > MAX_MERKLE_BRANCH {
        return Err(EncodeDecodeError::ParseFailed("merkle branch length"));
    }
    copy_bytes(reader, count as usize * 32, out)?;
    copy_bytes(reader, 4, out)?; // side mask
    Ok(())
}

impl Encodable for AuxPow {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        writer.write_all(&self.raw)?;
        Ok(self.raw.len())
    }
}

impl Decodable for AuxPow {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let mut raw = Vec::new();
        copy_transaction(reader, &mut raw)?; // coinbase tx on the parent chain
        copy_bytes(reader, 32, &mut raw)?; // parent block hash
        copy_branch(reader, &mut raw)?; // coinbase merkle branch
        copy_branch(reader, &mut raw)?; // chain merkle branch
        copy_bytes(reader, BlockHeader::SIZE, &mut raw)?; // parent block header
        Ok(AuxPow { raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_header(nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_231_006_505,
            bits: 0x1d00ffff,
            nonce,
        }
    }

    fn minimal_parent_coinbase() -> Vec<u8> {
        let mut tx = Vec::new();
        tx.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]); // version
        tx.push(0x01); // one input
        tx.extend_from_slice(&[0u8; 36]); // outpoint
        tx.push(0x04); // script sig
        tx.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        tx.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]); // sequence
        tx.push(0x01); // one output
        tx.extend_from_slice(&[0u8; 8]); // value
        tx.push(0x00); // empty script
        tx.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // lock time
        tx
    }

    fn minimal_aux_pow_bytes() -> Vec<u8> {
        let mut raw = minimal_parent_coinbase();
        raw.extend_from_slice(&[0x11; 32]); // parent block hash
        raw.push(0x00); // empty coinbase branch
        raw.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        raw.push(0x00); // empty chain branch
        raw.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        let mut parent = Vec::new();
        test_header(7).consensus_encode(&mut parent).unwrap();
        raw.extend_from_slice(&parent); // parent header
        raw
    }

    #[test]
    fn header_is_80_bytes() {
        let mut encoded = Vec::new();
        let written = test_header(0).consensus_encode(&mut encoded).unwrap();
        assert_eq!(written, BlockHeader::SIZE);
        assert_eq!(encoded.len(), BlockHeader::SIZE);
        assert_eq!(&encoded[..4], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn header_roundtrip() {
        let header = test_header(42);
        let mut encoded = Vec::new();
        header.consensus_encode(&mut encoded).unwrap();

        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = BlockHeader::consensus_decode(&mut cursor).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn nonce_changes_block_hash() {
        assert_ne!(test_header(0).block_hash(), test_header(1).block_hash());
    }

    #[test]
    fn aux_pow_version_bit() {
        let mut header = test_header(0);
        assert!(!header.has_aux_pow());
        header.version |= VERSION_AUX_POW;
        assert!(header.has_aux_pow());
    }

    #[test]
    fn aux_pow_roundtrip() {
        let bytes = minimal_aux_pow_bytes();
        let mut trailing = bytes.clone();
        trailing.push(0x00); // the headers message txn count follows

        let mut reader = trailing.as_slice();
        let aux = AuxPow::consensus_decode(&mut reader).unwrap();
        assert_eq!(aux.as_bytes(), bytes.as_slice());
        assert_eq!(reader, &[0x00]);

        let mut encoded = Vec::new();
        aux.consensus_encode(&mut encoded).unwrap();
        assert_eq!(encoded, bytes);
    }

    #[test]
    fn aux_pow_rejects_oversized_branch() {
        let mut raw = minimal_parent_coinbase();
        raw.extend_from_slice(&[0x11; 32]);
        raw.extend_from_slice(&[0xfd, 0xff, 0xff]); // 65535-entry branch
        let mut reader = raw.as_slice();
        assert!(AuxPow::consensus_decode(&mut reader).is_err());
    }
}
