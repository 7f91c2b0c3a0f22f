//! The node container: accepts inbound connections, dials configured
//! peers, and runs the workers behind the session engine. The ingest
//! worker feeds the chain store's append path and relays accepted
//! inventory onward; the inventory worker turns queued announcements
//! into `getdata` requests.

use crate::blockdata::transaction;
use crate::config::Config;
use crate::consensus::Decodable;
use crate::message::{Inventory, InventoryList, Message};
use crate::node::{Direction, IngestItem, NodeContext, ObjectKind};
use crate::session::PeerSession;
use crate::store::ChainStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// The running node: shared context plus its background tasks.
pub struct Node {
    ctx: Arc<NodeContext>,
}

impl Node {
    pub fn new(config: Config, store: Arc<dyn ChainStore>) -> Self {
        Self {
            ctx: NodeContext::new(config, store),
        }
    }

    pub fn context(&self) -> Arc<NodeContext> {
        self.ctx.clone()
    }

    /// Start the workers, dial the configured peers, and serve inbound
    /// connections until the listener fails.
    pub async fn run(&self) -> Result<(), std::io::Error> {
        tokio::spawn(ingest_worker(self.ctx.clone()));
        tokio::spawn(inv_worker(self.ctx.clone()));

        for addr in self.ctx.config.connect.clone() {
            tokio::spawn(dial(self.ctx.clone(), addr));
        }

        let listener = TcpListener::bind(self.ctx.config.listen).await?;
        info!(listen = %self.ctx.config.listen, network = %self.ctx.config.network, "node listening");

        loop {
            let (stream, remote) = listener.accept().await?;
            debug!(remote = %remote, "inbound connection");
            spawn_session(self.ctx.clone(), stream, remote, Direction::Inbound);
        }
    }
}

/// Dial one outbound peer and run its session to completion.
async fn dial(ctx: Arc<NodeContext>, addr: SocketAddr) {
    let connect = timeout(ctx.config.connection_timeout, TcpStream::connect(addr)).await;
    match connect {
        Ok(Ok(stream)) => {
            info!(remote = %addr, "outbound connection established");
            spawn_session(ctx, stream, addr, Direction::Outbound);
        }
        Ok(Err(err)) => warn!(remote = %addr, error = %err, "outbound connect failed"),
        Err(_) => warn!(remote = %addr, "outbound connect timed out"),
    }
}

fn spawn_session(
    ctx: Arc<NodeContext>,
    stream: TcpStream,
    remote: SocketAddr,
    direction: Direction,
) {
    let (session, outbox_rx) =
        PeerSession::new(ctx, remote.ip().to_string(), remote.port(), direction);
    tokio::spawn(async move {
        if let Err(err) = session.run(stream, outbox_rx).await {
            debug!(remote = %remote, error = %err, "session ended with error");
        }
    });
}

/// Drain the ingestion queue into the store's append path. Objects the
/// store accepts are announced to every other session.
async fn ingest_worker(ctx: Arc<NodeContext>) {
    let Some(mut rx) = ctx.take_ingest_rx() else {
        return;
    };
    while let Some(item) = rx.recv().await {
        ingest_one(&ctx, item);
    }
}

fn ingest_one(ctx: &Arc<NodeContext>, item: IngestItem) {
    match item.kind {
        ObjectKind::Block => {
            let mut reader = item.payload.as_slice();
            let hash = match crate::blockdata::block::BlockHeader::consensus_decode(&mut reader) {
                Ok(header) => header.block_hash(),
                Err(err) => {
                    debug!(error = %err, "discarding malformed block payload");
                    return;
                }
            };
            match ctx.store.append_block(&item.payload) {
                Ok(()) => ctx.broadcast_inv(Inventory::Block(hash), item.origin),
                Err(err) => debug!(block = %hash, error = %err, "store rejected block"),
            }
        }
        ObjectKind::Tx => {
            let txid = transaction::txid(&item.payload);
            if let Err(err) = ctx.store.append_tx(&item.payload) {
                debug!(tx = %txid, error = %err, "store rejected transaction");
                return;
            }
            ctx.track_relay_tx(txid, item.payload);
            ctx.broadcast_inv(Inventory::Transaction(txid), item.origin);
        }
    }
}

/// Turn queued announcements into `getdata` requests toward the session
/// that announced them, skipping objects we already have.
async fn inv_worker(ctx: Arc<NodeContext>) {
    loop {
        while let Some(item) = ctx.pop_inv() {
            let wanted = match item.inv {
                Inventory::Transaction(txid) => {
                    !ctx.store.has_tx(&txid) && ctx.relay_tx_lookup(&txid).is_none()
                }
                Inventory::Block(hash) => !ctx.store.has_block(&hash),
                Inventory::Unknown { .. } => false,
            };
            if !wanted {
                continue;
            }
            let request = Message::GetData(InventoryList::new(vec![item.inv]));
            if !ctx.send_to(item.origin, request) {
                debug!(origin = item.origin, "announcing session already gone");
            }
        }
        ctx.inv_ready().await;
    }
}
