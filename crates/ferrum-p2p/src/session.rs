//! The peer session engine: one connection, one state machine.
//!
//! A session owns its socket for life. Inbound bytes run through the
//! [`FrameParser`]; parsed messages are dispatched by a single `match`.
//! Outbound messages are pushed onto an unbounded outbox channel and
//! framed by a writer task, so handlers never block. Handshake, ping
//! liveness, and the empty-chain getblocks retry are deadlines polled by
//! the session's `select!` loop.
//!
//! All error recovery is local: a bad frame is logged and skipped, a bad
//! magic or a timeout closes this connection, and nothing a peer sends
//! can take down the node.

use crate::blockdata::block::{AuxPow, BlockHash};
use crate::consensus::{Encodable, Params};
use crate::frame::{encode_message, FrameError, FrameParser};
use crate::message::{
    Addr, AddrRecord, GetBlocks, GetHeaders, HeaderEntry, Headers, Inventory, InventoryList,
    Message, Ping, Pong, Version,
};
use crate::node::{
    ConnectionEventKind, Direction, NodeContext, NodeEvent, ObjectKind, PeerHandle, SessionId,
};
use crate::p2p::ServiceFlags;
use crate::{
    BIP0031_VERSION, GETBLOCKS_RETRY_DELAY, MAX_BLOCKS_RESULTS, MAX_HEADERS_RESULTS,
    MAX_INV_BATCH, PROTOCOL_VERSION,
};
use chrono::Utc;
use rand::{rng, RngCore};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// How many past `getblocks` requests are remembered for replay
/// suppression.
const GETBLOCKS_MEMORY: usize = 3;

/// Read buffer size for the socket loop.
const READ_BUFFER: usize = 16 * 1024;

/// Wakeup period when no deadline is armed.
const IDLE_TICK: Duration = Duration::from_secs(60);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet admitted.
    New,
    /// Version/verack exchange in progress.
    Handshake,
    /// Fully established.
    Connected,
    /// Terminal; never leaves this state.
    Disconnected,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer rejected: {0}")]
    Rejected(&'static str),
    #[error("fatal frame error: {0}")]
    Frame(#[from] FrameError),
}

/// The tuple identifying a `getblocks` request for replay suppression.
type GetBlocksKey = (u32, Vec<BlockHash>, BlockHash);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Handshake,
    PingTimeout,
    PingDue,
    GetBlocksRetry,
}

/// One peer connection and its protocol state.
pub struct PeerSession {
    id: SessionId,
    ctx: Arc<NodeContext>,
    host: String,
    port: u16,
    direction: Direction,
    state: SessionState,
    version: Option<Version>,
    /// Round-trip latency in milliseconds. Starts at the configured
    /// connection timeout, pessimistic until a ping proves otherwise.
    latency_ms: f64,
    last_ping_nonce: Option<u64>,
    last_ping_sent: Option<Instant>,
    started: Instant,
    /// Ring of the last few getblocks requests; replays are dropped.
    last_getblocks: VecDeque<GetBlocksKey>,
    outbox: mpsc::UnboundedSender<Message>,
    addr_record: Option<AddrRecord>,
    handshake_deadline: Option<Instant>,
    ping_deadline: Option<Instant>,
    next_ping_at: Option<Instant>,
    getblocks_retry_at: Option<Instant>,
}

impl PeerSession {
    /// Create a session for a peer at `host:port`. Returns the session
    /// and the receiving end of its outbox, which [`PeerSession::run`]
    /// (or a test) drains.
    pub fn new(
        ctx: Arc<NodeContext>,
        host: String,
        port: u16,
        direction: Direction,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let latency_ms = ctx.config.connection_timeout_ms();
        let id = ctx.next_session_id();
        let session = PeerSession {
            id,
            ctx,
            host,
            port,
            direction,
            state: SessionState::New,
            version: None,
            latency_ms,
            last_ping_nonce: None,
            last_ping_sent: None,
            started: Instant::now(),
            last_getblocks: VecDeque::with_capacity(GETBLOCKS_MEMORY),
            outbox,
            addr_record: None,
            handshake_deadline: None,
            ping_deadline: None,
            next_ping_at: None,
            getblocks_retry_at: None,
        };
        (session, outbox_rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    /// Time since the connection was (re)established.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// The peer's address-book record, available once the handshake
    /// completed.
    pub fn addr_record(&self) -> Option<&AddrRecord> {
        self.addr_record.as_ref()
    }

    /// Admit the connection: enforce the inbound accept policy, register
    /// with the node, arm the handshake timeout, and open with our
    /// `version`.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.direction == Direction::Inbound
            && !self.ctx.config.accept_connections
            && !self.ctx.config.is_whitelisted(&self.host, self.port)
        {
            return Err(SessionError::Rejected("not accepting connections"));
        }

        self.state = SessionState::Handshake;
        self.ctx.register(
            self.id,
            PeerHandle {
                host: self.host.clone(),
                port: self.port,
                direction: self.direction,
                outbox: self.outbox.clone(),
            },
        );
        self.handshake_deadline = Some(Instant::now() + self.ctx.config.connection_timeout);
        self.send_version();
        debug!(host = %self.host, port = self.port, direction = ?self.direction, "handshake started");
        Ok(())
    }

    /// Idempotent promotion to `Connected`. Only acts in `Handshake`:
    /// records the handshake round-trip as the first latency sample,
    /// restarts the uptime clock, announces the connection, and files the
    /// peer in the address book.
    pub fn complete_handshake(&mut self) {
        if self.state != SessionState::Handshake {
            return;
        }
        self.state = SessionState::Connected;
        self.latency_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        self.started = Instant::now();
        self.handshake_deadline = None;
        self.next_ping_at = Some(Instant::now() + self.ctx.config.ping_interval);

        let services = self
            .version
            .as_ref()
            .map(|v| v.services)
            .unwrap_or(ServiceFlags::NONE);
        let record = AddrRecord::new(&self.peer_socket_addr(), services, unix_time_now());
        self.addr_record = Some(record.clone());
        self.ctx.insert_addr(record);

        self.ctx.publish(NodeEvent::Connection {
            kind: ConnectionEventKind::Connected,
            host: self.host.clone(),
            port: self.port,
        });
        info!(host = %self.host, port = self.port, latency_ms = self.latency_ms, "peer connected");

        if self.ctx.config.announce {
            let own = self.own_addr_record();
            self.send(Message::Addr(Addr::new(vec![own])));
        }
        if self.direction == Direction::Outbound {
            self.send_getblocks(None);
        }
    }

    /// The single destruction hook: transition to `Disconnected` exactly
    /// once, deregister, and notify.
    pub fn unbind(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Disconnected;
        if self.ctx.deregister(self.id) {
            self.ctx.publish(NodeEvent::Connection {
                kind: ConnectionEventKind::Disconnected,
                host: self.host.clone(),
                port: self.port,
            });
        }
        info!(host = %self.host, port = self.port, "peer disconnected");
    }

    // ----- inbound dispatch -----

    /// Dispatch one parsed message.
    pub fn handle(&mut self, message: Message) {
        if self.state == SessionState::Disconnected {
            return;
        }
        trace!(host = %self.host, command = %message.command(), "message received");
        match message {
            Message::Version(version) => self.on_version(version),
            Message::Verack => self.on_verack(),
            Message::Ping(ping) => self.on_ping(ping),
            Message::Pong(pong) => self.on_pong(pong),
            Message::Addr(addr) => self.on_addr(addr),
            Message::Inv(list) => self.on_inv(list),
            Message::GetData(list) => self.on_get_data(list),
            Message::GetBlocks(request) => self.on_getblocks(
                request.version,
                request.locator_hashes,
                request.stop_hash,
                false,
            ),
            Message::GetHeaders(request) => self.on_getblocks(
                request.version,
                request.locator_hashes,
                request.stop_hash,
                true,
            ),
            Message::Headers(headers) => self.on_headers(headers),
            Message::Block(raw) => self.on_block(raw),
            Message::Tx(raw) => self.on_tx(raw),
            Message::GetAddr => self.on_getaddr(),
            Message::Alert(raw) => self.on_alert(&raw),
        }
    }

    /// Report a non-fatal frame problem; the session continues.
    pub fn on_frame_error(&self, err: &FrameError) {
        warn!(host = %self.host, error = %err, "dropped frame");
    }

    fn on_version(&mut self, version: Version) {
        if self.version.is_some() {
            warn!(host = %self.host, "duplicate version message");
            return;
        }
        // What the peer claims we appear as; votes for our advertised
        // `from` address.
        if let Some(addr) = version.receiver_addr() {
            self.ctx.note_external_ip(addr.ip());
        }
        debug!(
            host = %self.host,
            version = version.version,
            user_agent = %version.user_agent,
            start_height = version.start_height,
            "version received"
        );
        self.version = Some(version);
        if self.state == SessionState::Handshake {
            self.send(Message::Verack);
            // Complete on version-plus-own-verack: some peers never send
            // their verack, and waiting for it gains nothing.
            self.complete_handshake();
        }
    }

    fn on_verack(&mut self) {
        // Only an outbound handshake completes on the peer's verack.
        // Inbound sessions complete in `on_version`; a bare verack from
        // an inbound peer must not connect a session with no version.
        if self.direction == Direction::Outbound {
            self.complete_handshake();
        }
    }

    fn on_ping(&mut self, ping: Ping) {
        // Pre-BIP0031 pings carry no nonce and expect no reply.
        if let Some(nonce) = ping.nonce() {
            self.send(Message::Pong(Pong::new(nonce)));
        }
    }

    fn on_pong(&mut self, pong: Pong) {
        if self.last_ping_nonce == Some(pong.nonce()) {
            if let Some(sent) = self.last_ping_sent {
                self.latency_ms = sent.elapsed().as_secs_f64() * 1000.0;
                debug!(host = %self.host, latency_ms = self.latency_ms, "pong matched");
            }
            self.last_ping_nonce = None;
            self.last_ping_sent = None;
            self.ping_deadline = None;
        }
        // Unmatched pongs are ignored.
    }

    fn on_addr(&mut self, addr: Addr) {
        for record in addr.0 {
            self.ctx.insert_addr(record.clone());
            self.ctx.publish(NodeEvent::Addr(record));
        }
    }

    fn on_inv(&mut self, list: InventoryList) {
        for inv in list {
            match inv {
                Inventory::Transaction(txid) => {
                    self.ctx.bump_propagation(&txid);
                    if !self.ctx.push_inv(inv, self.id) {
                        trace!(host = %self.host, "inv queue full, tx announcement dropped");
                    }
                }
                Inventory::Block(_) => {
                    if !self.ctx.push_inv(inv, self.id) {
                        trace!(host = %self.host, "inv queue full, block announcement dropped");
                    }
                }
                Inventory::Unknown { inv_type, .. } => {
                    warn!(host = %self.host, inv_type, "unknown inventory type");
                }
            }
        }
    }

    fn on_get_data(&mut self, list: InventoryList) {
        for inv in list {
            match inv {
                Inventory::Transaction(txid) => {
                    let raw = self
                        .ctx
                        .store
                        .tx(&txid)
                        .or_else(|| self.ctx.relay_tx_lookup(&txid));
                    if let Some(raw) = raw {
                        self.send(Message::Tx(raw));
                    }
                    // Missing hashes are silently ignored.
                }
                Inventory::Block(hash) => {
                    if let Some(raw) = self.ctx.store.block(&hash) {
                        self.send(Message::Block(raw));
                    }
                }
                Inventory::Unknown { .. } => {}
            }
        }
    }

    fn on_tx(&mut self, raw: Vec<u8>) {
        self.ctx.enqueue_object(ObjectKind::Tx, raw, self.id);
    }

    fn on_block(&mut self, raw: Vec<u8>) {
        self.ctx.enqueue_object(ObjectKind::Block, raw, self.id);
    }

    fn on_headers(&mut self, headers: Headers) {
        // Each announced header becomes a body-less block on the
        // ingestion queue; the entry encoding is exactly that form.
        for entry in headers.headers {
            let mut raw = Vec::new();
            match entry.consensus_encode(&mut raw) {
                Ok(_) => self.ctx.enqueue_object(ObjectKind::Block, raw, self.id),
                Err(err) => {
                    error!(host = %self.host, error = %err, "failed to requeue header");
                }
            }
        }
    }

    fn on_getblocks(
        &mut self,
        version: u32,
        locator: Vec<BlockHash>,
        stop_hash: BlockHash,
        headers_only: bool,
    ) {
        let key = (version, locator.clone(), stop_hash);
        if self.last_getblocks.contains(&key) {
            trace!(host = %self.host, "duplicate getblocks dropped");
            return;
        }
        self.last_getblocks.push_back(key);
        if self.last_getblocks.len() > GETBLOCKS_MEMORY {
            self.last_getblocks.pop_front();
        }

        let Some(first) = locator.first() else {
            return;
        };
        // Only the first locator entry is consulted. Walking the rest to
        // find a shared ancestor is a known limitation.
        let Some(height) = self.ctx.store.height_of(first) else {
            debug!(host = %self.host, "getblocks locator unknown to us");
            return;
        };
        if height as i64 > self.ctx.store.height() {
            return;
        }

        let count = if headers_only {
            MAX_HEADERS_RESULTS
        } else {
            MAX_BLOCKS_RESULTS
        };
        let rows = self.ctx.store.headers_in_range(height + 1, count);

        if headers_only {
            let entries = rows
                .into_iter()
                .map(|row| HeaderEntry::new(row.header, row.aux_pow.map(AuxPow::from_raw)))
                .collect();
            self.send(Message::Headers(Headers::new(entries)));
        } else {
            let invs: Vec<Inventory> =
                rows.into_iter().map(|row| Inventory::Block(row.hash)).collect();
            self.send_inv(invs);
        }
    }

    fn on_getaddr(&mut self) {
        let mut records = Vec::new();
        if self.ctx.config.announce {
            records.push(self.own_addr_record());
        }
        records.extend(self.ctx.sample_addrs(
            250,
            Duration::from_secs(3 * 60 * 60),
            unix_time_now(),
        ));
        self.send(Message::Addr(Addr::new(records)));
    }

    fn on_alert(&self, raw: &[u8]) {
        info!(host = %self.host, len = raw.len(), "alert received and discarded");
    }

    // ----- outbound helpers -----

    fn send(&self, message: Message) {
        trace!(host = %self.host, command = %message.command(), "queueing message");
        // A closed outbox means the connection is going away; the run
        // loop will notice on its own.
        let _ = self.outbox.send(message);
    }

    fn send_version(&mut self) {
        let version = Version::new(
            &self.peer_socket_addr(),
            &self.ctx.external_addr(),
            &self.ctx.config.user_agent,
            self.ctx.store.height() as i32,
        );
        self.send(Message::Version(version));
    }

    /// Announce inventory, batched in slices of up to 251 entries.
    pub fn send_inv(&mut self, entries: Vec<Inventory>) {
        for chunk in entries.chunks(MAX_INV_BATCH) {
            self.send(Message::Inv(InventoryList::new(chunk.to_vec())));
        }
    }

    pub fn send_getdata_tx(&mut self, txid: crate::blockdata::transaction::Txid) {
        self.send(Message::GetData(InventoryList::new(vec![
            Inventory::Transaction(txid),
        ])));
    }

    pub fn send_getdata_block(&mut self, hash: BlockHash) {
        self.send(Message::GetData(InventoryList::new(vec![Inventory::Block(
            hash,
        )])));
    }

    /// Request block announcements from the peer. On an empty chain this
    /// asks for the genesis block instead and retries shortly after.
    pub fn send_getblocks(&mut self, locator: Option<Vec<BlockHash>>) {
        if let Some(locator) = self.locator_or_genesis(locator) {
            self.send(Message::GetBlocks(GetBlocks::new(
                PROTOCOL_VERSION,
                locator,
                None,
            )));
        }
    }

    /// Header-mode twin of [`PeerSession::send_getblocks`].
    pub fn send_getheaders(&mut self, locator: Option<Vec<BlockHash>>) {
        if let Some(locator) = self.locator_or_genesis(locator) {
            self.send(Message::GetHeaders(GetHeaders::new(
                PROTOCOL_VERSION,
                locator,
                None,
            )));
        }
    }

    fn locator_or_genesis(&mut self, locator: Option<Vec<BlockHash>>) -> Option<Vec<BlockHash>> {
        if self.ctx.store.height() == -1 {
            self.get_genesis_block();
            self.getblocks_retry_at = Some(Instant::now() + GETBLOCKS_RETRY_DELAY);
            return None;
        }
        Some(locator.unwrap_or_else(|| self.ctx.store.locator()))
    }

    /// Request the network's genesis block by its configured hash.
    pub fn get_genesis_block(&mut self) {
        let genesis = Params::for_network(self.ctx.config.network).genesis_hash();
        debug!(host = %self.host, "requesting genesis block");
        self.send_getdata_block(genesis);
    }

    /// Probe liveness. Nonce-carrying for modern peers, with a disconnect
    /// deadline if no pong refreshes the latency in time; the legacy form
    /// for BIP0031-and-older peers, whose latency stays at the ceiling.
    pub fn send_ping(&mut self) {
        let peer_version = self.version.as_ref().map(|v| v.version).unwrap_or(0);
        if peer_version > BIP0031_VERSION {
            let nonce = u64::from(rng().next_u32());
            self.last_ping_nonce = Some(nonce);
            self.last_ping_sent = Some(Instant::now());
            self.ping_deadline = Some(Instant::now() + self.ctx.config.connection_timeout);
            self.send(Message::Ping(Ping::with_nonce(nonce)));
        } else {
            self.latency_ms = self.ctx.config.connection_timeout_ms();
            self.send(Message::Ping(Ping::without_nonce()));
        }
        self.next_ping_at = Some(Instant::now() + self.ctx.config.ping_interval);
    }

    fn own_addr_record(&self) -> AddrRecord {
        AddrRecord::new(
            &self.ctx.external_addr(),
            ServiceFlags::NETWORK,
            unix_time_now(),
        )
    }

    fn peer_socket_addr(&self) -> SocketAddr {
        let ip = self
            .host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }

    // ----- timers -----

    fn next_deadline(&self) -> Option<(Instant, TimerKind)> {
        let candidates = [
            (self.handshake_deadline, TimerKind::Handshake),
            (self.ping_deadline, TimerKind::PingTimeout),
            (self.next_ping_at, TimerKind::PingDue),
            (self.getblocks_retry_at, TimerKind::GetBlocksRetry),
        ];
        candidates
            .into_iter()
            .filter_map(|(when, kind)| when.map(|when| (when, kind)))
            .min_by_key(|(when, _)| *when)
    }

    /// Handle a fired deadline. Returns whether the session stays up.
    fn on_timer(&mut self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Handshake => {
                self.handshake_deadline = None;
                if self.state != SessionState::Connected {
                    warn!(host = %self.host, "handshake timed out");
                    return false;
                }
                true
            }
            TimerKind::PingTimeout => {
                self.ping_deadline = None;
                warn!(host = %self.host, "ping timed out");
                false
            }
            TimerKind::PingDue => {
                self.next_ping_at = None;
                self.send_ping();
                true
            }
            TimerKind::GetBlocksRetry => {
                self.getblocks_retry_at = None;
                self.send_getblocks(None);
                true
            }
        }
    }

    // ----- socket loop -----

    /// Drive the session over `stream` until the peer goes away, a
    /// timeout fires, or the stream turns out not to speak our protocol.
    pub async fn run<S>(
        mut self,
        stream: S,
        mut outbox_rx: mpsc::UnboundedReceiver<Message>,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if let Err(err) = self.begin() {
            debug!(host = %self.host, error = %err, "connection refused");
            return Ok(());
        }

        let magic = self.ctx.config.network.magic();
        let (mut reader, mut writer) = tokio::io::split(stream);

        let writer_host = self.host.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(message) = outbox_rx.recv().await {
                let bytes = match encode_message(magic, &message) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(host = %writer_host, error = %err, "failed to frame message");
                        continue;
                    }
                };
                if writer.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let mut parser = FrameParser::new(magic);
        let mut buf = vec![0u8; READ_BUFFER];
        let result = loop {
            let (when, kind) = match self.next_deadline() {
                Some((when, kind)) => (when, Some(kind)),
                None => (Instant::now() + IDLE_TICK, None),
            };

            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!(host = %self.host, "peer closed connection");
                        break Ok(());
                    }
                    Ok(n) => {
                        let mut fatal = None;
                        for event in parser.receive(&buf[..n]) {
                            match event {
                                Ok(message) => self.handle(message),
                                Err(err) if err.is_fatal() => {
                                    warn!(host = %self.host, error = %err, "fatal frame error");
                                    fatal = Some(err);
                                    break;
                                }
                                Err(err) => self.on_frame_error(&err),
                            }
                        }
                        if let Some(err) = fatal {
                            break Err(SessionError::Frame(err));
                        }
                    }
                    Err(err) => {
                        warn!(host = %self.host, error = %err, "socket read failed");
                        break Err(SessionError::Io(err));
                    }
                },
                _ = tokio::time::sleep_until(when) => {
                    if let Some(kind) = kind {
                        if !self.on_timer(kind) {
                            break Ok(());
                        }
                    }
                }
            }
        };

        self.unbind();
        writer_task.abort();
        result
    }
}

fn unix_time_now() -> u32 {
    Utc::now().timestamp().max(0) as u32
}
