use crate::consensus::{Decodable, Encodable, EncodeDecodeError, VarInt};
use crate::io::{Error as IoError, Read, Write};
use crate::p2p::ServiceFlags;
use bitcoin::p2p::address::Address as NetAddress;
use std::net::SocketAddr;

/// Most records an `addr` message may carry.
const MAX_ADDR: u64 = 1000;

/// One address-book entry on the wire: last-seen time, service bits,
/// IP and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrRecord {
    /// Unix time the address was last seen.
    pub time: u32,
    /// The advertised endpoint.
    pub address: NetAddress,
}

impl AddrRecord {
    pub fn new(addr: &SocketAddr, services: ServiceFlags, time: u32) -> Self {
        Self {
            time,
            address: NetAddress::new(addr, services),
        }
    }

    /// The endpoint as a socket address, when representable.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.address.socket_addr().ok()
    }
}

impl Encodable for AddrRecord {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let mut len = 0;
        len += self.time.consensus_encode(writer)?;
        len += self.address.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for AddrRecord {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        Ok(AddrRecord {
            time: Decodable::consensus_decode(reader)?,
            address: Decodable::consensus_decode(reader)?,
        })
    }
}

/// The `addr` gossip message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addr(pub Vec<AddrRecord>);

impl Addr {
    pub fn new(records: Vec<AddrRecord>) -> Self {
        Self(records)
    }

    pub fn records(&self) -> &[AddrRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Encodable for Addr {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, IoError> {
        let mut len = 0;
        len += VarInt::from(self.0.len()).consensus_encode(writer)?;
        for record in &self.0 {
            len += record.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl Decodable for Addr {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodeDecodeError> {
        let count = VarInt::consensus_decode(reader)?.0;
        if count > MAX_ADDR {
            return Err(EncodeDecodeError::ParseFailed("too many addr records"));
        }
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            records.push(AddrRecord::consensus_decode(reader)?);
        }
        Ok(Addr(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn record(port: u16, time: u32) -> AddrRecord {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), port);
        AddrRecord::new(&addr, ServiceFlags::NETWORK, time)
    }

    #[test]
    fn record_is_thirty_bytes() {
        let mut encoded = Vec::new();
        record(9333, 1).consensus_encode(&mut encoded).unwrap();
        // 4 time + 8 services + 16 ip + 2 port
        assert_eq!(encoded.len(), 30);
    }

    #[test]
    fn addr_roundtrip() {
        let original = Addr::new(vec![record(9333, 100), record(9334, 200)]);
        let mut encoded = Vec::new();
        original.consensus_encode(&mut encoded).unwrap();

        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = Addr::consensus_decode(&mut cursor).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.records()[0].socket_addr(), record(9333, 100).socket_addr());
    }

    #[test]
    fn addr_rejects_oversized_count() {
        let mut encoded = Vec::new();
        VarInt(MAX_ADDR + 1).consensus_encode(&mut encoded).unwrap();
        let mut cursor = std::io::Cursor::new(&encoded);
        assert!(Addr::consensus_decode(&mut cursor).is_err());
    }
}
