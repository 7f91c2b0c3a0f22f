//! The chain store interface the session engine consumes, and an
//! in-memory implementation for tests and regtest.
//!
//! Consensus validation lives behind this boundary: sessions hand raw
//! payloads to the append path and never judge them.

use crate::blockdata::block::{AuxPow, BlockHash, BlockHeader};
use crate::blockdata::transaction::{self, Txid};
use crate::consensus::Decodable;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// A main-chain header row as projected out of the store.
#[derive(Debug, Clone)]
pub struct StoredHeader {
    pub header: BlockHeader,
    pub height: u64,
    pub hash: BlockHash,
    /// Raw merge-mined proof, when the header announces one.
    pub aux_pow: Option<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("malformed block payload: {0}")]
    BadBlock(&'static str),
    #[error("unknown parent block {0}")]
    Orphan(BlockHash),
    #[error("storage failure: {0}")]
    Backend(String),
}

/// The authoritative block/tx repository.
pub trait ChainStore: Send + Sync {
    /// Height of the main-chain tip, -1 when the store is empty.
    fn height(&self) -> i64;

    /// Block locator from the tip backwards with exponentially growing gaps.
    fn locator(&self) -> Vec<BlockHash>;

    /// Raw block payload by hash.
    fn block(&self, hash: &BlockHash) -> Option<Vec<u8>>;

    /// Raw transaction payload by id.
    fn tx(&self, txid: &Txid) -> Option<Vec<u8>>;

    /// Main-chain height of `hash`, if it is on the main chain.
    fn height_of(&self, hash: &BlockHash) -> Option<u64>;

    /// Main-chain block hash at `height`.
    fn block_hash_at(&self, height: u64) -> Option<BlockHash>;

    /// Main-chain headers from `start` (inclusive) upward, at most `count`.
    fn headers_in_range(&self, start: u64, count: usize) -> Vec<StoredHeader>;

    /// Append a raw block. Validation is the implementation's business.
    fn append_block(&self, raw: &[u8]) -> Result<(), StoreError>;

    /// Append a raw transaction.
    fn append_tx(&self, raw: &[u8]) -> Result<(), StoreError>;

    fn has_block(&self, hash: &BlockHash) -> bool {
        self.height_of(hash).is_some() || self.block(hash).is_some()
    }

    fn has_tx(&self, txid: &Txid) -> bool {
        self.tx(txid).is_some()
    }
}

/// Standard locator construction: dense near the tip, then doubling gaps,
/// always ending at genesis.
pub(crate) fn build_locator(
    height: i64,
    hash_at: impl Fn(u64) -> Option<BlockHash>,
) -> Vec<BlockHash> {
    let mut locator = Vec::new();
    if height < 0 {
        return locator;
    }
    let mut step: u64 = 1;
    let mut h = height as u64;
    loop {
        if let Some(hash) = hash_at(h) {
            locator.push(hash);
        }
        if h == 0 {
            break;
        }
        if locator.len() >= 10 {
            step *= 2;
        }
        h = h.saturating_sub(step);
    }
    locator
}

/// Parse the parts of a raw block the store indexes: the header and, on
/// merge-mined networks, the proof blob that follows it.
pub(crate) fn parse_block_parts(
    raw: &[u8],
) -> Result<(BlockHeader, Option<Vec<u8>>), StoreError> {
    let mut reader = raw;
    let header = BlockHeader::consensus_decode(&mut reader)
        .map_err(|_| StoreError::BadBlock("header"))?;
    let aux_pow = if header.has_aux_pow() {
        let aux = AuxPow::consensus_decode(&mut reader)
            .map_err(|_| StoreError::BadBlock("aux proof"))?;
        Some(aux.as_bytes().to_vec())
    } else {
        None
    };
    Ok((header, aux_pow))
}

#[derive(Default)]
struct MemoryInner {
    blocks: HashMap<BlockHash, Vec<u8>>,
    heights: HashMap<BlockHash, u64>,
    chain: Vec<StoredHeader>,
    txs: HashMap<Txid, Vec<u8>>,
}

/// A purely in-memory chain store. Blocks must extend the tip; the first
/// block appended becomes height zero.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ChainStore for MemoryStore {
    fn height(&self) -> i64 {
        let inner = self.lock();
        inner.chain.len() as i64 - 1
    }

    fn locator(&self) -> Vec<BlockHash> {
        let inner = self.lock();
        build_locator(inner.chain.len() as i64 - 1, |h| {
            inner.chain.get(h as usize).map(|row| row.hash)
        })
    }

    fn block(&self, hash: &BlockHash) -> Option<Vec<u8>> {
        self.lock().blocks.get(hash).cloned()
    }

    fn tx(&self, txid: &Txid) -> Option<Vec<u8>> {
        self.lock().txs.get(txid).cloned()
    }

    fn height_of(&self, hash: &BlockHash) -> Option<u64> {
        self.lock().heights.get(hash).copied()
    }

    fn block_hash_at(&self, height: u64) -> Option<BlockHash> {
        let inner = self.lock();
        inner.chain.get(height as usize).map(|row| row.hash)
    }

    fn headers_in_range(&self, start: u64, count: usize) -> Vec<StoredHeader> {
        let inner = self.lock();
        inner
            .chain
            .iter()
            .skip(start as usize)
            .take(count)
            .cloned()
            .collect()
    }

    fn append_block(&self, raw: &[u8]) -> Result<(), StoreError> {
        let (header, aux_pow) = parse_block_parts(raw)?;
        let hash = header.block_hash();

        let mut inner = self.lock();
        if inner.heights.contains_key(&hash) {
            return Ok(());
        }
        let height = match inner.chain.last() {
            None => 0,
            Some(tip) if tip.hash == header.prev_blockhash => tip.height + 1,
            Some(_) => return Err(StoreError::Orphan(header.prev_blockhash)),
        };
        inner.blocks.insert(hash, raw.to_vec());
        inner.heights.insert(hash, height);
        inner.chain.push(StoredHeader {
            header,
            height,
            hash,
            aux_pow,
        });
        Ok(())
    }

    fn append_tx(&self, raw: &[u8]) -> Result<(), StoreError> {
        let txid = transaction::txid(raw);
        self.lock().txs.insert(txid, raw.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdata::block::TxMerkleNode;
    use crate::consensus::Encodable;
    use crate::hashes::Hash;

    fn header_on(prev: BlockHash, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_377_557_832 + nonce,
            bits: 0x207fffff,
            nonce,
        }
    }

    fn block_raw(header: &BlockHeader) -> Vec<u8> {
        let mut raw = Vec::new();
        header.consensus_encode(&mut raw).unwrap();
        raw.push(0x00); // no transactions
        raw
    }

    /// Append `n` linked blocks, returning their hashes by height.
    fn grow_chain(store: &MemoryStore, n: u32) -> Vec<BlockHash> {
        let mut prev = BlockHash::all_zeros();
        let mut hashes = Vec::new();
        for nonce in 0..n {
            let header = header_on(prev, nonce);
            store.append_block(&block_raw(&header)).unwrap();
            prev = header.block_hash();
            hashes.push(prev);
        }
        hashes
    }

    #[test]
    fn empty_store_reports_negative_height() {
        let store = MemoryStore::new();
        assert_eq!(store.height(), -1);
        assert!(store.locator().is_empty());
    }

    #[test]
    fn chain_grows_by_height() {
        let store = MemoryStore::new();
        let hashes = grow_chain(&store, 5);

        assert_eq!(store.height(), 4);
        assert_eq!(store.height_of(&hashes[2]), Some(2));
        assert_eq!(store.block_hash_at(4), Some(hashes[4]));
        assert!(store.has_block(&hashes[0]));
    }

    #[test]
    fn orphan_blocks_rejected() {
        let store = MemoryStore::new();
        grow_chain(&store, 2);

        let stray = header_on(BlockHash::from_byte_array([9u8; 32]), 99);
        assert!(matches!(
            store.append_block(&block_raw(&stray)),
            Err(StoreError::Orphan(_))
        ));
    }

    #[test]
    fn duplicate_append_is_idempotent() {
        let store = MemoryStore::new();
        let genesis = header_on(BlockHash::all_zeros(), 0);
        store.append_block(&block_raw(&genesis)).unwrap();
        store.append_block(&block_raw(&genesis)).unwrap();
        assert_eq!(store.height(), 0);
    }

    #[test]
    fn locator_is_dense_then_exponential() {
        let store = MemoryStore::new();
        let hashes = grow_chain(&store, 40);

        let locator = store.locator();
        // Dense for the first ten entries.
        assert_eq!(locator[0], hashes[39]);
        assert_eq!(locator[9], hashes[30]);
        // Then the gaps double, ending at genesis.
        assert_eq!(*locator.last().unwrap(), hashes[0]);
        assert!(locator.len() < 40);
    }

    #[test]
    fn headers_in_range_ascends() {
        let store = MemoryStore::new();
        let hashes = grow_chain(&store, 6);

        let rows = store.headers_in_range(2, 3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].height, 2);
        assert_eq!(rows[0].hash, hashes[2]);
        assert_eq!(rows[2].height, 4);
    }

    #[test]
    fn tx_append_and_lookup() {
        let store = MemoryStore::new();
        let raw = vec![0xab; 64];
        store.append_tx(&raw).unwrap();

        let txid = transaction::txid(&raw);
        assert!(store.has_tx(&txid));
        assert_eq!(store.tx(&txid), Some(raw));
    }
}
