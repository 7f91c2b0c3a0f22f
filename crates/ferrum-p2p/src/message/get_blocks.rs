use crate::blockdata::block::BlockHash;
use crate::consensus::{Decodable, Encodable, EncodeDecodeError, VarInt};
use crate::hashes::Hash;
use crate::io::{Error as IoError, Read, Write};

/// Most locator hashes accepted in one request.
const MAX_LOCATOR: u64 = 101;

fn encode_request<W: Write + ?Sized>(
    writer: &mut W,
    version: u32,
    locator_hashes: &[BlockHash],
    stop_hash: &BlockHash,
) -> Result<usize, IoError> {
    let mut len = 0;
    len += version.consensus_encode(writer)?;
    len += VarInt::from(locator_hashes.len()).consensus_encode(writer)?;
    for hash in locator_hashes {
        len += hash.consensus_encode(writer)?;
    }
    len += stop_hash.consensus_encode(writer)?;
    Ok(len)
}

fn decode_request<R: Read + ?Sized>(
    reader: &mut R,
) -> Result<(u32, Vec<BlockHash>, BlockHash), EncodeDecodeError> {
    let version = u32::consensus_decode(reader)?;
    let count = VarInt::consensus_decode(reader)?.0;
    if count > MAX_LOCATOR {
        return Err(EncodeDecodeError::ParseFailed("locator too long"));
    }
    let mut locator_hashes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        locator_hashes.push(BlockHash::consensus_decode(reader)?);
    }
    let stop_hash = BlockHash::consensus_decode(reader)?;
    Ok((version, locator_hashes, stop_hash))
}

/// Requests `inv` announcements for blocks after the first locator hash
/// found on our main chain. A zero stop hash asks for the full batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GetBlocks {
    /// Protocol version, as in the `version` message.
    pub version: u32,
    /// Block hashes from the requester's tip backwards, highest first.
    pub locator_hashes: Vec<BlockHash>,
    /// Last block requested; all zeroes for "as many as allowed".
    pub stop_hash: BlockHash,
}

impl GetBlocks {
    pub fn new(version: u32, locator_hashes: Vec<BlockHash>, stop_hash: Option<BlockHash>) -> Self {
        Self {
            version,
            locator_hashes,
            stop_hash: stop_hash.unwrap_or_else(BlockHash::all_zeros),
        }
    }
}

impl Encodable for GetBlocks {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        encode_request(writer, self.version, &self.locator_hashes, &self.stop_hash)
    }
}

impl Decodable for GetBlocks {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let (version, locator_hashes, stop_hash) = decode_request(reader)?;
        Ok(GetBlocks {
            version,
            locator_hashes,
            stop_hash,
        })
    }
}

/// The header-mode twin of [`GetBlocks`]: identical body, answered with a
/// `headers` message instead of block `inv`s.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GetHeaders {
    /// Protocol version, as in the `version` message.
    pub version: u32,
    /// Block hashes from the requester's tip backwards, highest first.
    pub locator_hashes: Vec<BlockHash>,
    /// Last header requested; all zeroes for "as many as allowed".
    pub stop_hash: BlockHash,
}

impl GetHeaders {
    pub fn new(version: u32, locator_hashes: Vec<BlockHash>, stop_hash: Option<BlockHash>) -> Self {
        Self {
            version,
            locator_hashes,
            stop_hash: stop_hash.unwrap_or_else(BlockHash::all_zeros),
        }
    }
}

impl Encodable for GetHeaders {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        encode_request(writer, self.version, &self.locator_hashes, &self.stop_hash)
    }
}

impl Decodable for GetHeaders {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let (version, locator_hashes, stop_hash) = decode_request(reader)?;
        Ok(GetHeaders {
            version,
            locator_hashes,
            stop_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex_to_blockhash;

    #[test]
    fn getblocks_encode() -> Result<(), Box<dyn std::error::Error>> {
        let expected = hex::decode(
            "71110100\
            02\
            d39f608a7775b537729884d4e6633bb2\
            105e55a16a14d31b0000000000000000\
            5c3e6403d40837110a2e8afb602b1c01\
            714bda7ce23bea0a0000000000000000\
            00000000000000000000000000000000\
            00000000000000000000000000000000",
        )?;

        let hash1 =
            hex_to_blockhash("d39f608a7775b537729884d4e6633bb2105e55a16a14d31b0000000000000000")?;
        let hash2 =
            hex_to_blockhash("5c3e6403d40837110a2e8afb602b1c01714bda7ce23bea0a0000000000000000")?;

        let message = GetBlocks::new(70001, vec![hash1, hash2], None);
        let mut encoded = Vec::new();
        message.consensus_encode(&mut encoded)?;
        assert_eq!(expected, encoded);
        Ok(())
    }

    #[test]
    fn getblocks_decode() -> Result<(), Box<dyn std::error::Error>> {
        let data = hex::decode(
            "71110100\
            01\
            d39f608a7775b537729884d4e6633bb2\
            105e55a16a14d31b0000000000000000\
            00000000000000000000000000000000\
            00000000000000000000000000000000",
        )?;

        let mut cursor = std::io::Cursor::new(&data);
        let decoded = GetBlocks::consensus_decode(&mut cursor)?;
        assert_eq!(decoded.version, 70001);
        assert_eq!(decoded.locator_hashes.len(), 1);
        assert_eq!(decoded.stop_hash, BlockHash::all_zeros());
        Ok(())
    }

    #[test]
    fn getheaders_same_layout() -> Result<(), Box<dyn std::error::Error>> {
        let hash =
            hex_to_blockhash("d39f608a7775b537729884d4e6633bb2105e55a16a14d31b0000000000000000")?;

        let blocks = GetBlocks::new(70001, vec![hash], None);
        let headers = GetHeaders::new(70001, vec![hash], None);

        let mut a = Vec::new();
        blocks.consensus_encode(&mut a)?;
        let mut b = Vec::new();
        headers.consensus_encode(&mut b)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn locator_length_bounded() -> Result<(), Box<dyn std::error::Error>> {
        let mut data = Vec::new();
        70001u32.consensus_encode(&mut data)?;
        VarInt(MAX_LOCATOR + 1).consensus_encode(&mut data)?;
        let mut cursor = std::io::Cursor::new(&data);
        assert!(GetBlocks::consensus_decode(&mut cursor).is_err());
        Ok(())
    }
}
