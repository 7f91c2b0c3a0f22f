pub mod blockdata;
pub mod config;
pub mod consensus;
pub mod database;
pub mod frame;
pub mod hashes;
pub mod io;
pub mod message;
pub mod network;
pub mod node;
pub mod p2p;
pub mod service;
pub mod session;
pub mod store;
pub mod util;

pub use network::Network;

use std::time::Duration;

/// Protocol version advertised in outbound `version` messages.
pub const PROTOCOL_VERSION: u32 = 70001;

/// Protocol versions above this threshold carry a nonce in ping/pong (BIP 0031).
pub const BIP0031_VERSION: u32 = 60000;

/// Hard cap on a single wire payload.
pub const MAX_PROTOCOL_MESSAGE_LENGTH: usize = 32 * 1024 * 1024; // 32 MB

/// User agent token sent to peers.
pub const USER_AGENT: &str = "/ferrum:0.1.0/";

/// Interval between liveness pings on a connected session.
pub const PING_INTERVAL: Duration = Duration::from_secs(60);

/// Delay before retrying `getblocks` while the chain is still empty.
pub const GETBLOCKS_RETRY_DELAY: Duration = Duration::from_secs(3);

/// `inv` payloads are batched in slices of at most this many entries.
pub const MAX_INV_BATCH: usize = 251;

/// Maximum header count in a `headers` reply.
pub const MAX_HEADERS_RESULTS: usize = 2000;

/// Maximum block hashes announced for one `getblocks` request.
pub const MAX_BLOCKS_RESULTS: usize = 500;
