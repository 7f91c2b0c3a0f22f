//! Transaction payload helpers.
//!
//! Sessions treat transaction payloads as opaque bytes; validation belongs
//! to the chain store. What the wire layer needs is the txid of a raw
//! payload and the ability to walk a serialized transaction of unknown
//! length (the merge-mined proof embeds one).

use crate::consensus::{Decodable, Encodable, EncodeDecodeError, VarInt};
use crate::hashes::{Hash, Sha256dHash};
use crate::io::Read;
pub use bitcoin::Txid;

/// Upper bound on input/output counts while walking a transaction.
const MAX_TX_ITEMS: u64 = 1_000_000;
/// Upper bound on a single script while walking a transaction.
const MAX_SCRIPT_BYTES: u64 = 10_000_000;

/// Compute the txid (double-SHA256) of a raw transaction payload.
pub fn txid(raw: &[u8]) -> Txid {
    Txid::from_byte_array(Sha256dHash::hash(raw).to_byte_array())
}

/// Read exactly `n` bytes from `reader`, appending them to `out`.
pub(crate) fn copy_bytes<R: Read + ?Sized>(
    reader: &mut R,
    n: usize,
    out: &mut Vec<u8>,
) -> Result<(), EncodeDecodeError> {
    let start = out.len();
    out.resize(start + n, 0);
    reader.read_exact(&mut out[start..])?;
    Ok(())
}

/// Read a varint from `reader`, append its canonical encoding to `out`,
/// and return its value.
pub(crate) fn copy_varint<R: Read + ?Sized>(
    reader: &mut R,
    out: &mut Vec<u8>,
) -> Result<u64, EncodeDecodeError> {
    let value = VarInt::consensus_decode(reader)?;
    value.consensus_encode(out)?;
    Ok(value.0)
}

/// Copy one serialized transaction from `reader` into `out`, validating
/// its framing: version, inputs (outpoint, script, sequence), outputs
/// (value, script), lock time.
pub(crate) fn copy_transaction<R: Read + ?Sized>(
    reader: &mut R,
    out: &mut Vec<u8>,
) -> Result<(), EncodeDecodeError> {
    copy_bytes(reader, 4, out)?; // version
    let inputs = copy_varint(reader, out)?;
    if inputs > MAX_TX_ITEMS {
        return Err(EncodeDecodeError::ParseFailed("transaction input count"));
    }
    for _ in 0..inputs {
        copy_bytes(reader, 36, out)?; // previous outpoint
        let script_len = copy_varint(reader, out)?;
        if script_len > MAX_SCRIPT_BYTES {
            return Err(EncodeDecodeError::ParseFailed("input script length"));
        }
        copy_bytes(reader, script_len as usize, out)?;
        copy_bytes(reader, 4, out)?; // sequence
    }
    let outputs = copy_varint(reader, out)?;
    if outputs > MAX_TX_ITEMS {
        return Err(EncodeDecodeError::ParseFailed("transaction output count"));
    }
    for _ in 0..outputs {
        copy_bytes(reader, 8, out)?; // value
        let script_len = copy_varint(reader, out)?;
        if script_len > MAX_SCRIPT_BYTES {
            return Err(EncodeDecodeError::ParseFailed("output script length"));
        }
        copy_bytes(reader, script_len as usize, out)?;
    }
    copy_bytes(reader, 4, out)?; // lock time
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal one-input one-output transaction.
    pub(crate) fn minimal_tx() -> Vec<u8> {
        let mut tx = Vec::new();
        tx.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]); // version
        tx.push(0x01); // one input
        tx.extend_from_slice(&[0u8; 36]); // outpoint
        tx.push(0x00); // empty script sig
        tx.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]); // sequence
        tx.push(0x01); // one output
        tx.extend_from_slice(&[0x00, 0xf2, 0x05, 0x2a, 0x01, 0x00, 0x00, 0x00]); // value
        tx.push(0x01); // one-byte script
        tx.push(0x51); // OP_TRUE
        tx.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // lock time
        tx
    }

    #[test]
    fn copy_transaction_consumes_exact_length() {
        let tx = minimal_tx();
        let mut trailing = tx.clone();
        trailing.extend_from_slice(&[0xaa, 0xbb]);

        let mut reader = trailing.as_slice();
        let mut out = Vec::new();
        copy_transaction(&mut reader, &mut out).unwrap();

        assert_eq!(out, tx);
        assert_eq!(reader, &[0xaa, 0xbb]);
    }

    #[test]
    fn copy_transaction_rejects_truncated_input() {
        let tx = minimal_tx();
        let mut reader = &tx[..tx.len() - 2];
        let mut out = Vec::new();
        assert!(copy_transaction(&mut reader, &mut out).is_err());
    }

    #[test]
    fn txid_is_double_sha256() {
        let raw = minimal_tx();
        let expected = Sha256dHash::hash(&raw);
        assert_eq!(txid(&raw).to_byte_array(), expected.to_byte_array());
    }
}
