//! Process-wide state shared by every peer session.
//!
//! A single [`NodeContext`] is held by `Arc` across all session tasks.
//! Mutation happens in short lock scopes that never cross an await point,
//! which is the Rust replacement for the original single-reactor-thread
//! discipline. Notifications fan out over a bounded broadcast channel;
//! slow subscribers lose the oldest events.

use crate::config::Config;
use crate::message::{AddrRecord, Inventory, Message};
use crate::store::ChainStore;
use bitcoin::Txid;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::Instant;

/// Capacity of the notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long a relayed transaction stays in the relay cache.
const RELAY_TTL: Duration = Duration::from_secs(900);

pub type SessionId = u64;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// What kind of object a payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Tx,
    Block,
}

/// An inventory announcement awaiting a `getdata` decision.
#[derive(Debug, Clone)]
pub struct InvItem {
    pub inv: Inventory,
    pub origin: SessionId,
}

/// A payload queued for ingestion by the chain store worker.
#[derive(Debug, Clone)]
pub struct IngestItem {
    pub kind: ObjectKind,
    pub payload: Vec<u8>,
    pub origin: SessionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventKind {
    Connected,
    Disconnected,
}

/// Events published to subscribers.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Connection {
        kind: ConnectionEventKind,
        host: String,
        port: u16,
    },
    Addr(AddrRecord),
}

/// A registered session as the rest of the node sees it.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub host: String,
    pub port: u16,
    pub direction: Direction,
    pub outbox: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct SharedState {
    connections: HashMap<SessionId, PeerHandle>,
    addrs: Vec<AddrRecord>,
    inv_queue: VecDeque<InvItem>,
    relay_tx: HashMap<Txid, (Instant, Vec<u8>)>,
    relay_propagation: HashMap<Txid, u32>,
    external_ips: Vec<IpAddr>,
}

/// Process-wide state shared by all peer sessions.
pub struct NodeContext {
    pub config: Config,
    pub store: Arc<dyn ChainStore>,
    state: Mutex<SharedState>,
    ingest_tx: mpsc::UnboundedSender<IngestItem>,
    ingest_rx: Mutex<Option<mpsc::UnboundedReceiver<IngestItem>>>,
    inv_notify: Notify,
    events: broadcast::Sender<NodeEvent>,
    next_session_id: AtomicU64,
}

impl NodeContext {
    pub fn new(config: Config, store: Arc<dyn ChainStore>) -> Arc<Self> {
        let (ingest_tx, ingest_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            config,
            store,
            state: Mutex::new(SharedState::default()),
            ingest_tx,
            ingest_rx: Mutex::new(Some(ingest_rx)),
            inv_notify: Notify::new(),
            events,
            next_session_id: AtomicU64::new(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to connection and address events.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: NodeEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    pub fn next_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    // ----- connection registry -----

    pub fn register(&self, id: SessionId, handle: PeerHandle) {
        self.lock().connections.insert(id, handle);
    }

    /// Remove a session from the registry. Idempotent; returns whether it
    /// was still registered.
    pub fn deregister(&self, id: SessionId) -> bool {
        self.lock().connections.remove(&id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Send a message to a registered session, if it is still there.
    pub fn send_to(&self, id: SessionId, message: Message) -> bool {
        let state = self.lock();
        match state.connections.get(&id) {
            Some(handle) => handle.outbox.send(message).is_ok(),
            None => false,
        }
    }

    /// Forward an inventory announcement to every session except `except`.
    pub fn broadcast_inv(&self, inv: Inventory, except: SessionId) {
        let state = self.lock();
        for (id, handle) in &state.connections {
            if *id == except {
                continue;
            }
            let _ = handle
                .outbox
                .send(Message::Inv(vec![inv].into()));
        }
    }

    // ----- inventory work queue -----

    /// Enqueue an announcement unless the queue is full. Check-then-push
    /// is race-free enough here: the bound is advisory and a handful of
    /// extra entries would not matter, but the lock makes it exact anyway.
    pub fn push_inv(&self, inv: Inventory, origin: SessionId) -> bool {
        {
            let mut state = self.lock();
            if state.inv_queue.len() >= self.config.max_inv {
                return false;
            }
            state.inv_queue.push_back(InvItem { inv, origin });
        }
        self.inv_notify.notify_one();
        true
    }

    pub fn pop_inv(&self) -> Option<InvItem> {
        self.lock().inv_queue.pop_front()
    }

    pub fn inv_queue_len(&self) -> usize {
        self.lock().inv_queue.len()
    }

    /// Wait until an announcement may be available.
    pub async fn inv_ready(&self) {
        self.inv_notify.notified().await;
    }

    // ----- ingestion queue -----

    pub fn enqueue_object(&self, kind: ObjectKind, payload: Vec<u8>, origin: SessionId) {
        let _ = self.ingest_tx.send(IngestItem {
            kind,
            payload,
            origin,
        });
    }

    /// Hand the ingestion receiver to the worker. Yields `None` after the
    /// first call.
    pub fn take_ingest_rx(&self) -> Option<mpsc::UnboundedReceiver<IngestItem>> {
        self.ingest_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    // ----- address book -----

    /// Insert into the bounded address book, evicting the oldest record
    /// when full.
    pub fn insert_addr(&self, record: AddrRecord) {
        let mut state = self.lock();
        if state.addrs.len() >= self.config.max_addrs {
            state.addrs.remove(0);
        }
        state.addrs.push(record);
    }

    pub fn addr_count(&self) -> usize {
        self.lock().addrs.len()
    }

    /// A random sample of at most `max` records last seen within
    /// `max_age` of `now`.
    pub fn sample_addrs(&self, max: usize, max_age: Duration, now: u32) -> Vec<AddrRecord> {
        use rand::seq::IndexedRandom;

        let state = self.lock();
        let cutoff = now.saturating_sub(max_age.as_secs() as u32);
        let fresh: Vec<&AddrRecord> = state
            .addrs
            .iter()
            .filter(|record| record.time >= cutoff)
            .collect();
        fresh
            .choose_multiple(&mut rand::rng(), max)
            .map(|record| (*record).clone())
            .collect()
    }

    // ----- relay caches -----

    /// Remember a transaction for relay without store persistence, and
    /// start counting how many peers announce it back.
    pub fn track_relay_tx(&self, txid: Txid, raw: Vec<u8>) {
        let now = Instant::now();
        let mut state = self.lock();
        state
            .relay_tx
            .retain(|_, (stored, _)| now.duration_since(*stored) < RELAY_TTL);
        state.relay_tx.insert(txid, (now, raw));
        state.relay_propagation.entry(txid).or_insert(0);
    }

    pub fn relay_tx_lookup(&self, txid: &Txid) -> Option<Vec<u8>> {
        self.lock().relay_tx.get(txid).map(|(_, raw)| raw.clone())
    }

    /// Bump the propagation counter for a tracked transaction. Returns
    /// whether the hash was tracked.
    pub fn bump_propagation(&self, txid: &Txid) -> bool {
        match self.lock().relay_propagation.get_mut(txid) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub fn propagation_count(&self, txid: &Txid) -> Option<u32> {
        self.lock().relay_propagation.get(txid).copied()
    }

    // ----- external address voting -----

    /// Record the address a peer claims we appear as. Kept as a multiset:
    /// repeated claims are votes.
    pub fn note_external_ip(&self, ip: IpAddr) {
        self.lock().external_ips.push(ip);
    }

    /// The address to advertise as `from`: the most frequently claimed
    /// external IP on the configured listen port, falling back to the
    /// listen address itself.
    pub fn external_addr(&self) -> std::net::SocketAddr {
        let state = self.lock();
        let mut counts: HashMap<IpAddr, usize> = HashMap::new();
        let mut best: Option<(IpAddr, usize)> = None;
        for ip in &state.external_ips {
            let count = counts.entry(*ip).or_insert(0);
            *count += 1;
            match best {
                Some((_, best_count)) if *count <= best_count => {}
                _ => best = Some((*ip, *count)),
            }
        }
        match best {
            Some((ip, _)) => std::net::SocketAddr::new(ip, self.config.listen.port()),
            None => self.config.listen,
        }
    }
}
