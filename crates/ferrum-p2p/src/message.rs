//! Typed wire messages.
//!
//! The frame parser yields values of [`Message`]; the session engine
//! dispatches on the variant. Command names are the 12-byte null-padded
//! ASCII strings of the baseline Bitcoin P2P protocol.

pub mod addr;
pub mod get_blocks;
pub mod headers;
pub mod inventory;
pub mod ping;
pub mod version;

use crate::consensus::{Decodable, Encodable, EncodeDecodeError};
use crate::io::Error as IoError;
use thiserror::Error;

pub use addr::{Addr, AddrRecord};
pub use get_blocks::{GetBlocks, GetHeaders};
pub use headers::{HeaderEntry, Headers};
pub use inventory::{Inventory, InventoryList};
pub use ping::{Ping, Pong};
pub use version::Version;

/// A command name that is not part of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

/// The command field of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    Addr,
    Inv,
    GetData,
    GetBlocks,
    GetHeaders,
    Headers,
    Block,
    Tx,
    GetAddr,
    Alert,
}

impl Command {
    /// Width of the command field on the wire.
    pub const SIZE: usize = 12;

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::Addr => "addr",
            Command::Inv => "inv",
            Command::GetData => "getdata",
            Command::GetBlocks => "getblocks",
            Command::GetHeaders => "getheaders",
            Command::Headers => "headers",
            Command::Block => "block",
            Command::Tx => "tx",
            Command::GetAddr => "getaddr",
            Command::Alert => "alert",
        }
    }

    /// The null-padded wire form.
    pub fn to_wire(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let name = self.as_str().as_bytes();
        out[..name.len()].copy_from_slice(name);
        out
    }

    /// Parse a wire command field. The name must be followed only by NUL
    /// padding; anything else is reported as unknown so the caller can
    /// skip the frame.
    pub fn from_wire(bytes: &[u8; Self::SIZE]) -> Result<Self, UnknownCommand> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(Self::SIZE);
        let lossy = || String::from_utf8_lossy(&bytes[..end]).into_owned();
        if bytes[end..].iter().any(|&b| b != 0) {
            return Err(UnknownCommand(lossy()));
        }
        let name = std::str::from_utf8(&bytes[..end]).map_err(|_| UnknownCommand(lossy()))?;
        match name {
            "version" => Ok(Command::Version),
            "verack" => Ok(Command::Verack),
            "ping" => Ok(Command::Ping),
            "pong" => Ok(Command::Pong),
            "addr" => Ok(Command::Addr),
            "inv" => Ok(Command::Inv),
            "getdata" => Ok(Command::GetData),
            "getblocks" => Ok(Command::GetBlocks),
            "getheaders" => Ok(Command::GetHeaders),
            "headers" => Ok(Command::Headers),
            "block" => Ok(Command::Block),
            "tx" => Ok(Command::Tx),
            "getaddr" => Ok(Command::GetAddr),
            "alert" => Ok(Command::Alert),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(Version),
    Verack,
    Ping(Ping),
    Pong(Pong),
    Addr(Addr),
    Inv(InventoryList),
    GetData(InventoryList),
    GetBlocks(GetBlocks),
    GetHeaders(GetHeaders),
    Headers(Headers),
    /// A raw block payload; validation happens off-session.
    Block(Vec<u8>),
    /// A raw transaction payload.
    Tx(Vec<u8>),
    GetAddr,
    /// Legacy alert payload; logged and discarded.
    Alert(Vec<u8>),
}

fn encode_to_vec<T: Encodable>(value: &T) -> Result<Vec<u8>, IoError> {
    let mut buf = Vec::new();
    value.consensus_encode(&mut buf)?;
    Ok(buf)
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version(_) => Command::Version,
            Message::Verack => Command::Verack,
            Message::Ping(_) => Command::Ping,
            Message::Pong(_) => Command::Pong,
            Message::Addr(_) => Command::Addr,
            Message::Inv(_) => Command::Inv,
            Message::GetData(_) => Command::GetData,
            Message::GetBlocks(_) => Command::GetBlocks,
            Message::GetHeaders(_) => Command::GetHeaders,
            Message::Headers(_) => Command::Headers,
            Message::Block(_) => Command::Block,
            Message::Tx(_) => Command::Tx,
            Message::GetAddr => Command::GetAddr,
            Message::Alert(_) => Command::Alert,
        }
    }

    /// Serialize the message body (the frame header is the codec's job).
    pub fn encode_payload(&self) -> Result<Vec<u8>, IoError> {
        match self {
            Message::Version(v) => encode_to_vec(v),
            Message::Verack | Message::GetAddr => Ok(Vec::new()),
            Message::Ping(p) => encode_to_vec(p),
            Message::Pong(p) => encode_to_vec(p),
            Message::Addr(a) => encode_to_vec(a),
            Message::Inv(list) | Message::GetData(list) => encode_to_vec(list),
            Message::GetBlocks(g) => encode_to_vec(g),
            Message::GetHeaders(g) => encode_to_vec(g),
            Message::Headers(h) => encode_to_vec(h),
            Message::Block(raw) | Message::Tx(raw) | Message::Alert(raw) => Ok(raw.clone()),
        }
    }

    /// Decode a message body for `command` from `payload`.
    pub fn decode_payload(command: Command, payload: &[u8]) -> Result<Self, EncodeDecodeError> {
        let mut reader = payload;
        Ok(match command {
            Command::Version => Message::Version(Version::consensus_decode(&mut reader)?),
            Command::Verack => Message::Verack,
            Command::Ping if payload.is_empty() => Message::Ping(Ping::without_nonce()),
            Command::Ping => Message::Ping(Ping::with_nonce(u64::consensus_decode(&mut reader)?)),
            Command::Pong => Message::Pong(Pong::new(u64::consensus_decode(&mut reader)?)),
            Command::Addr => Message::Addr(Addr::consensus_decode(&mut reader)?),
            Command::Inv => Message::Inv(InventoryList::consensus_decode(&mut reader)?),
            Command::GetData => Message::GetData(InventoryList::consensus_decode(&mut reader)?),
            Command::GetBlocks => Message::GetBlocks(GetBlocks::consensus_decode(&mut reader)?),
            Command::GetHeaders => {
                Message::GetHeaders(GetHeaders::consensus_decode(&mut reader)?)
            }
            Command::Headers => Message::Headers(Headers::consensus_decode(&mut reader)?),
            Command::Block => Message::Block(payload.to_vec()),
            Command::Tx => Message::Tx(payload.to_vec()),
            Command::GetAddr => Message::GetAddr,
            Command::Alert => Message::Alert(payload.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_roundtrip() {
        for command in [
            Command::Version,
            Command::Verack,
            Command::Ping,
            Command::Pong,
            Command::Addr,
            Command::Inv,
            Command::GetData,
            Command::GetBlocks,
            Command::GetHeaders,
            Command::Headers,
            Command::Block,
            Command::Tx,
            Command::GetAddr,
            Command::Alert,
        ] {
            let wire = command.to_wire();
            assert_eq!(Command::from_wire(&wire).unwrap(), command);
        }
    }

    #[test]
    fn command_rejects_unknown_names() {
        let mut wire = [0u8; Command::SIZE];
        wire[..9].copy_from_slice(b"sendcmpct");
        assert_eq!(
            Command::from_wire(&wire),
            Err(UnknownCommand("sendcmpct".to_string()))
        );
    }

    #[test]
    fn command_rejects_garbage_after_padding() {
        let mut wire = Command::Ping.to_wire();
        wire[11] = 0x41;
        assert!(Command::from_wire(&wire).is_err());
    }

    #[test]
    fn empty_payload_messages() {
        assert_eq!(
            Message::Verack.encode_payload().unwrap(),
            Vec::<u8>::new()
        );
        assert_eq!(
            Message::decode_payload(Command::Verack, &[]).unwrap(),
            Message::Verack
        );
        assert_eq!(
            Message::decode_payload(Command::GetAddr, &[]).unwrap(),
            Message::GetAddr
        );
    }

    #[test]
    fn nonce_less_ping_decodes() {
        let msg = Message::decode_payload(Command::Ping, &[]).unwrap();
        assert_eq!(msg, Message::Ping(Ping::without_nonce()));
    }
}
