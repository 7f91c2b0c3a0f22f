use crate::consensus::{Decodable, Encodable, EncodeDecodeError};
use crate::io::{Error as IoError, Read, Write};
use crate::p2p::ServiceFlags;
use crate::PROTOCOL_VERSION;
use bitcoin::p2p::address::Address as NetAddress;
use chrono::Utc;
use rand::{rng, RngCore};
use std::net::SocketAddr;

/// The `version` message opening a handshake.
///
/// Carries the speaker's protocol version, service bits, clock, both
/// endpoint addresses as the speaker sees them, a connection nonce, the
/// user agent token, and the speaker's best block height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Protocol version of the sending node.
    pub version: u32,
    /// Services supported by the sending node.
    pub services: ServiceFlags,
    /// Unix timestamp at the sending node.
    pub timestamp: i64,
    /// The receiving node's address, as seen by the sender.
    pub addr_recv: NetAddress,
    /// The sending node's own address.
    pub addr_from: NetAddress,
    /// Random nonce distinguishing connections to self.
    pub nonce: u64,
    /// User agent token.
    pub user_agent: String,
    /// Best block height known to the sender.
    pub start_height: i32,
    /// Whether the sender wants relayed transactions.
    pub relay: bool,
}

impl Version {
    /// Build an outbound version message advertising `start_height`,
    /// with the peer as receiver and our external address as sender.
    pub fn new(
        addr_recv: &SocketAddr,
        addr_from: &SocketAddr,
        user_agent: &str,
        start_height: i32,
    ) -> Self {
        Version {
            version: PROTOCOL_VERSION,
            services: ServiceFlags::NETWORK,
            timestamp: Utc::now().timestamp(),
            addr_recv: NetAddress::new(addr_recv, ServiceFlags::NETWORK),
            addr_from: NetAddress::new(addr_from, ServiceFlags::NETWORK),
            nonce: rng().next_u64(),
            user_agent: user_agent.to_string(),
            start_height,
            relay: true,
        }
    }

    /// The address the peer claims we appear as, when representable.
    pub fn receiver_addr(&self) -> Option<SocketAddr> {
        self.addr_recv.socket_addr().ok()
    }
}

impl Encodable for Version {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let mut len = 0;
        len += self.version.consensus_encode(writer)?;
        len += self.services.consensus_encode(writer)?;
        len += self.timestamp.consensus_encode(writer)?;
        len += self.addr_recv.consensus_encode(writer)?;
        len += self.addr_from.consensus_encode(writer)?;
        len += self.nonce.consensus_encode(writer)?;
        len += self.user_agent.consensus_encode(writer)?;
        len += self.start_height.consensus_encode(writer)?;
        len += self.relay.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for Version {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let version = u32::consensus_decode(reader)?;
        let services = ServiceFlags::consensus_decode(reader)?;
        let timestamp = i64::consensus_decode(reader)?;
        let addr_recv = NetAddress::consensus_decode(reader)?;
        let addr_from = NetAddress::consensus_decode(reader)?;
        let nonce = u64::consensus_decode(reader)?;
        let user_agent = String::consensus_decode(reader)?;
        let start_height = i32::consensus_decode(reader)?;
        // Peers older than BIP 37 omit the relay flag.
        let relay = bool::consensus_decode(reader).unwrap_or(true);
        Ok(Version {
            version,
            services,
            timestamp,
            addr_recv,
            addr_from,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}
