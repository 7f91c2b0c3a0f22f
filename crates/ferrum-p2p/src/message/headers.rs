use crate::blockdata::block::{AuxPow, BlockHeader};
use crate::consensus::{Decodable, Encodable, EncodeDecodeError, VarInt};
use crate::io::{Error as IoError, Read, Write};
use crate::MAX_HEADERS_RESULTS;

/// One entry of a `headers` message: the canonical 80-byte header, the
/// merge-mined proof when the header's version bit announces one, and the
/// trailing transaction count, which is always zero since headers carry
/// no bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub header: BlockHeader,
    pub aux_pow: Option<AuxPow>,
}

impl HeaderEntry {
    pub fn new(header: BlockHeader, aux_pow: Option<AuxPow>) -> Self {
        Self { header, aux_pow }
    }
}

impl Encodable for HeaderEntry {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let mut len = 0;
        len += self.header.consensus_encode(writer)?;
        if let Some(aux_pow) = &self.aux_pow {
            len += aux_pow.consensus_encode(writer)?;
        }
        len += VarInt(0).consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for HeaderEntry {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let header = BlockHeader::consensus_decode(reader)?;
        let aux_pow = if header.has_aux_pow() {
            Some(AuxPow::consensus_decode(reader)?)
        } else {
            None
        };
        // The transaction count is read and discarded; some peers echo a
        // nonzero count here even though no bodies follow.
        let _txn_count = VarInt::consensus_decode(reader)?;
        Ok(HeaderEntry { header, aux_pow })
    }
}

/// The `headers` reply to a `getheaders` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    pub headers: Vec<HeaderEntry>,
}

impl Headers {
    pub fn new(headers: Vec<HeaderEntry>) -> Self {
        Self { headers }
    }

    pub fn headers(&self) -> &[HeaderEntry] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl Encodable for Headers {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let mut len = 0;
        len += VarInt::from(self.headers.len()).consensus_encode(writer)?;
        for entry in &self.headers {
            len += entry.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl Decodable for Headers {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let count = VarInt::consensus_decode(reader)?.0;
        if count > MAX_HEADERS_RESULTS as u64 {
            return Err(EncodeDecodeError::ParseFailed("too many headers"));
        }
        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            headers.push(HeaderEntry::consensus_decode(reader)?);
        }
        Ok(Headers { headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdata::block::{BlockHash, TxMerkleNode, VERSION_AUX_POW};
    use crate::hashes::Hash;

    fn test_header(nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_377_557_832,
            bits: 0x1d00ffff,
            nonce,
        }
    }

    #[test]
    fn entry_is_header_plus_zero_count() {
        let entry = HeaderEntry::new(test_header(9), None);
        let mut encoded = Vec::new();
        entry.consensus_encode(&mut encoded).unwrap();
        assert_eq!(encoded.len(), BlockHeader::SIZE + 1);
        assert_eq!(encoded[BlockHeader::SIZE], 0x00);
    }

    #[test]
    fn headers_roundtrip() {
        let original = Headers::new(vec![
            HeaderEntry::new(test_header(1), None),
            HeaderEntry::new(test_header(2), None),
        ]);

        let mut encoded = Vec::new();
        original.consensus_encode(&mut encoded).unwrap();

        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = Headers::consensus_decode(&mut cursor).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn aux_header_without_proof_fails_to_decode() {
        // The version bit promises a proof that is not there.
        let mut header = test_header(3);
        header.version |= VERSION_AUX_POW;
        let mut encoded = Vec::new();
        header.consensus_encode(&mut encoded).unwrap();
        encoded.push(0x00);

        let mut cursor = std::io::Cursor::new(&encoded);
        assert!(HeaderEntry::consensus_decode(&mut cursor).is_err());
    }

    #[test]
    fn headers_count_bounded() {
        let mut encoded = Vec::new();
        VarInt(MAX_HEADERS_RESULTS as u64 + 1)
            .consensus_encode(&mut encoded)
            .unwrap();
        let mut cursor = std::io::Cursor::new(&encoded);
        assert!(Headers::consensus_decode(&mut cursor).is_err());
    }
}
