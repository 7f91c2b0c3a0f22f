//! Persistent chain storage over redb.
//!
//! Blocks and transactions land in plain key-value tables; the main
//! chain is indexed by height with a small serde_json metadata record
//! tracking the tip. This is the durable [`ChainStore`] the binary uses;
//! tests and regtest get by with the in-memory one.

use crate::blockdata::block::{BlockHash, BlockHeader};
use crate::blockdata::transaction::{self, Txid};
use crate::consensus::{Decodable, Encodable};
use crate::hashes::Hash;
use crate::store::{build_locator, parse_block_parts, ChainStore, StoreError, StoredHeader};
use redb::{
    CommitError, Database, DatabaseError as RedbError, ReadableTable, StorageError,
    TableDefinition, TableError, TransactionError,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::error;

/// Raw block payloads by block hash.
const BLOCKS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocks");
/// Raw transaction payloads by txid.
const TXS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("txs");
/// Serialized main-chain header rows by height.
const HEADERS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("headers");
/// Main-chain heights by block hash.
const HEIGHTS_TABLE: TableDefinition<&[u8], u64> = TableDefinition::new("heights");
/// Chain metadata (the tip record).
const CHAIN_STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chain_state");

const META_KEY: &str = "meta";

/// Database error types.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Error from the underlying redb database engine.
    #[error("database error: {0}")]
    Redb(#[from] RedbError),

    /// Error starting or finishing a transaction.
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Error committing a transaction.
    #[error("commit error: {0}")]
    Commit(#[from] CommitError),

    /// Error at the storage layer.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error opening or using a table.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// Corrupt or inconsistent database contents.
    #[error("invalid database state: {0}")]
    InvalidState(String),
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::InvalidState(format!("metadata encoding: {err}"))
    }
}

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// The tip record kept in the chain-state table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainMeta {
    tip_hash: BlockHash,
    height: u64,
}

/// A [`ChainStore`] persisted in a redb file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at `path` and make sure all tables
    /// exist.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(BLOCKS_TABLE)?;
            txn.open_table(TXS_TABLE)?;
            txn.open_table(HEADERS_TABLE)?;
            txn.open_table(HEIGHTS_TABLE)?;
            txn.open_table(CHAIN_STATE_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    fn read_meta(&self) -> DatabaseResult<Option<ChainMeta>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHAIN_STATE_TABLE)?;
        match table.get(META_KEY)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn read_row(&self, height: u64) -> DatabaseResult<Option<StoredHeader>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HEADERS_TABLE)?;
        match table.get(height)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    fn read_rows(&self, start: u64, count: usize) -> DatabaseResult<Vec<StoredHeader>> {
        let Some(end) = start.checked_add(count as u64) else {
            return Ok(Vec::new());
        };
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HEADERS_TABLE)?;
        let mut rows = Vec::new();
        for entry in table.range(start..end)? {
            let (_, value) = entry?;
            rows.push(decode_row(value.value())?);
        }
        Ok(rows)
    }

    fn read_payload(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> DatabaseResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    fn write_block(&self, raw: &[u8]) -> DatabaseResult<Result<(), StoreError>> {
        let (header, aux_pow) = match parse_block_parts(raw) {
            Ok(parts) => parts,
            Err(err) => return Ok(Err(err)),
        };
        let hash = header.block_hash();

        let txn = self.db.begin_write()?;
        {
            let mut heights = txn.open_table(HEIGHTS_TABLE)?;
            if heights.get(hash.as_byte_array().as_slice())?.is_some() {
                return Ok(Ok(())); // already stored
            }

            let mut chain_state = txn.open_table(CHAIN_STATE_TABLE)?;
            let meta = match chain_state.get(META_KEY)? {
                Some(guard) => Some(serde_json::from_slice::<ChainMeta>(guard.value())?),
                None => None,
            };
            let height = match &meta {
                None => 0,
                Some(meta) if meta.tip_hash == header.prev_blockhash => meta.height + 1,
                Some(_) => return Ok(Err(StoreError::Orphan(header.prev_blockhash))),
            };

            let mut blocks = txn.open_table(BLOCKS_TABLE)?;
            blocks.insert(hash.as_byte_array().as_slice(), raw)?;
            heights.insert(hash.as_byte_array().as_slice(), height)?;

            let mut headers = txn.open_table(HEADERS_TABLE)?;
            let row = encode_row(&StoredHeader {
                header,
                height,
                hash,
                aux_pow,
            });
            headers.insert(height, row.as_slice())?;

            let new_meta = ChainMeta {
                tip_hash: hash,
                height,
            };
            chain_state.insert(META_KEY, serde_json::to_vec(&new_meta)?.as_slice())?;
        }
        txn.commit()?;
        Ok(Ok(()))
    }

    fn write_tx(&self, raw: &[u8]) -> DatabaseResult<()> {
        let txid = transaction::txid(raw);
        let txn = self.db.begin_write()?;
        {
            let mut txs = txn.open_table(TXS_TABLE)?;
            txs.insert(txid.as_byte_array().as_slice(), raw)?;
        }
        txn.commit()?;
        Ok(())
    }
}

/// Row layout: height (8 LE) + hash (32) + header (80) + aux proof.
fn encode_row(row: &StoredHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 32 + BlockHeader::SIZE);
    out.extend_from_slice(&row.height.to_le_bytes());
    out.extend_from_slice(row.hash.as_byte_array());
    row.header
        .consensus_encode(&mut out)
        .expect("in-memory writers don't error");
    if let Some(aux) = &row.aux_pow {
        out.extend_from_slice(aux);
    }
    out
}

fn decode_row(bytes: &[u8]) -> DatabaseResult<StoredHeader> {
    if bytes.len() < 8 + 32 + BlockHeader::SIZE {
        return Err(DatabaseError::InvalidState("truncated header row".into()));
    }
    let mut height_bytes = [0u8; 8];
    height_bytes.copy_from_slice(&bytes[..8]);
    let mut hash_bytes = [0u8; 32];
    hash_bytes.copy_from_slice(&bytes[8..40]);

    let mut reader = &bytes[40..];
    let header = BlockHeader::consensus_decode(&mut reader)
        .map_err(|err| DatabaseError::InvalidState(format!("header row: {err}")))?;
    let aux = &bytes[40 + BlockHeader::SIZE..];
    Ok(StoredHeader {
        header,
        height: u64::from_le_bytes(height_bytes),
        hash: BlockHash::from_byte_array(hash_bytes),
        aux_pow: if aux.is_empty() {
            None
        } else {
            Some(aux.to_vec())
        },
    })
}

impl ChainStore for RedbStore {
    fn height(&self) -> i64 {
        match self.read_meta() {
            Ok(Some(meta)) => meta.height as i64,
            Ok(None) => -1,
            Err(err) => {
                error!(error = %err, "failed to read chain tip");
                -1
            }
        }
    }

    fn locator(&self) -> Vec<BlockHash> {
        build_locator(self.height(), |h| self.block_hash_at(h))
    }

    fn block(&self, hash: &BlockHash) -> Option<Vec<u8>> {
        self.read_payload(BLOCKS_TABLE, hash.as_byte_array().as_slice())
            .unwrap_or_else(|err| {
                error!(error = %err, "block lookup failed");
                None
            })
    }

    fn tx(&self, txid: &Txid) -> Option<Vec<u8>> {
        self.read_payload(TXS_TABLE, txid.as_byte_array().as_slice())
            .unwrap_or_else(|err| {
                error!(error = %err, "tx lookup failed");
                None
            })
    }

    fn height_of(&self, hash: &BlockHash) -> Option<u64> {
        let lookup = || -> DatabaseResult<Option<u64>> {
            let txn = self.db.begin_read()?;
            let table = txn.open_table(HEIGHTS_TABLE)?;
            Ok(table
                .get(hash.as_byte_array().as_slice())?
                .map(|guard| guard.value()))
        };
        lookup().unwrap_or_else(|err| {
            error!(error = %err, "height lookup failed");
            None
        })
    }

    fn block_hash_at(&self, height: u64) -> Option<BlockHash> {
        match self.read_row(height) {
            Ok(row) => row.map(|row| row.hash),
            Err(err) => {
                error!(error = %err, "header row lookup failed");
                None
            }
        }
    }

    fn headers_in_range(&self, start: u64, count: usize) -> Vec<StoredHeader> {
        self.read_rows(start, count).unwrap_or_else(|err| {
            error!(error = %err, "header range lookup failed");
            Vec::new()
        })
    }

    fn append_block(&self, raw: &[u8]) -> Result<(), StoreError> {
        match self.write_block(raw) {
            Ok(result) => result,
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    fn append_tx(&self, raw: &[u8]) -> Result<(), StoreError> {
        self.write_tx(raw)
            .map_err(|err| StoreError::Backend(err.to_string()))
    }
}
