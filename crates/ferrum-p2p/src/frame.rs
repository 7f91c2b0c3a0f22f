//! Wire framing: 4-byte magic, 12-byte command, 4-byte length, 4-byte
//! double-SHA256 checksum, payload.
//!
//! [`FrameParser`] consumes append-only byte chunks from the socket and
//! yields whole messages or typed errors. A frame with the wrong magic
//! (or an absurd length) poisons the stream: the peer is speaking some
//! other protocol and the session must disconnect. A bad checksum, an
//! unknown command, or a malformed body only skips that frame; the
//! session keeps going.

use crate::consensus::{EncodeDecodeError, Encodable};
use crate::hashes::ChecksumHash;
use crate::io::Error as IoError;
use crate::message::{Command, Message, UnknownCommand};
use crate::p2p::Magic;
use crate::MAX_PROTOCOL_MESSAGE_LENGTH;
use thiserror::Error;

/// Serialized size of a frame header.
pub const HEADER_SIZE: usize = 24; // 4 magic + 12 command + 4 length + 4 checksum

/// What went wrong with one frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream is not speaking our network's protocol. Fatal.
    #[error("bad network magic: expected {expected}, got {actual}")]
    BadMagic { expected: Magic, actual: Magic },

    /// Advertised payload length is beyond the protocol limit. Fatal.
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    Oversize { size: u32, max: usize },

    /// Checksum mismatch; the frame is dropped.
    #[error("bad checksum for {command:?} frame")]
    BadChecksum { command: String },

    /// A command name we do not implement; the frame is dropped.
    #[error("{0}")]
    UnknownCommand(#[from] UnknownCommand),

    /// The body did not parse as its command promises; dropped.
    #[error("malformed {command} payload: {source}")]
    Malformed {
        command: Command,
        source: EncodeDecodeError,
    },
}

impl FrameError {
    /// Whether the session should disconnect rather than continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameError::BadMagic { .. } | FrameError::Oversize { .. }
        )
    }
}

/// Frame a message for the wire.
pub fn encode_message(magic: Magic, message: &Message) -> Result<Vec<u8>, IoError> {
    let payload = message.encode_payload()?;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    magic.consensus_encode(&mut out)?;
    out.extend_from_slice(&message.command().to_wire());
    (payload.len() as u32).consensus_encode(&mut out)?;
    out.extend_from_slice(&ChecksumHash::hash(&payload).checksum());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Incremental frame parser over an append-only byte stream.
#[derive(Debug)]
pub struct FrameParser {
    magic: Magic,
    buf: Vec<u8>,
    /// Set after a fatal framing error; further input is discarded.
    dead: bool,
}

impl FrameParser {
    pub fn new(magic: Magic) -> Self {
        Self {
            magic,
            buf: Vec::new(),
            dead: false,
        }
    }

    /// Bytes buffered but not yet framed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Feed a chunk and collect the outcomes of every frame it completes.
    pub fn receive(&mut self, chunk: &[u8]) -> Vec<Result<Message, FrameError>> {
        if self.dead {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            if self.buf.len() < HEADER_SIZE {
                break;
            }

            let mut magic_bytes = [0u8; 4];
            magic_bytes.copy_from_slice(&self.buf[..4]);
            let actual = Magic::from_bytes(magic_bytes);
            if actual != self.magic {
                events.push(Err(FrameError::BadMagic {
                    expected: self.magic,
                    actual,
                }));
                self.poison();
                break;
            }

            let mut length_bytes = [0u8; 4];
            length_bytes.copy_from_slice(&self.buf[16..20]);
            let length = u32::from_le_bytes(length_bytes);
            if length as usize > MAX_PROTOCOL_MESSAGE_LENGTH {
                events.push(Err(FrameError::Oversize {
                    size: length,
                    max: MAX_PROTOCOL_MESSAGE_LENGTH,
                }));
                self.poison();
                break;
            }

            let frame_len = HEADER_SIZE + length as usize;
            if self.buf.len() < frame_len {
                break; // wait for the rest of the payload
            }

            let mut command_bytes = [0u8; Command::SIZE];
            command_bytes.copy_from_slice(&self.buf[4..16]);
            let mut checksum = [0u8; 4];
            checksum.copy_from_slice(&self.buf[20..24]);
            let payload = &self.buf[HEADER_SIZE..frame_len];

            let event = if ChecksumHash::hash(payload).checksum() != checksum {
                let end = command_bytes
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(Command::SIZE);
                Err(FrameError::BadChecksum {
                    command: String::from_utf8_lossy(&command_bytes[..end]).into_owned(),
                })
            } else {
                match Command::from_wire(&command_bytes) {
                    Err(unknown) => Err(FrameError::UnknownCommand(unknown)),
                    Ok(command) => match Message::decode_payload(command, payload) {
                        Ok(message) => Ok(message),
                        Err(source) => Err(FrameError::Malformed { command, source }),
                    },
                }
            };
            events.push(event);
            self.buf.drain(..frame_len);
        }
        events
    }

    fn poison(&mut self) {
        self.dead = true;
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Ping;
    use crate::network::Network;

    fn magic() -> Magic {
        Network::Regtest.magic()
    }

    #[test]
    fn verack_frame_layout() {
        let bytes = encode_message(magic(), &Message::Verack).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..4], &magic().to_bytes());
        assert_eq!(&bytes[4..10], b"verack");
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0]);
        // Checksum of the empty payload.
        assert_eq!(&bytes[20..24], &[0x5d, 0xf6, 0xe0, 0xe2]);
    }

    #[test]
    fn parse_across_chunk_boundaries() {
        let message = Message::Ping(Ping::with_nonce(0xfeed));
        let bytes = encode_message(magic(), &message).unwrap();

        let mut parser = FrameParser::new(magic());
        for byte in &bytes[..bytes.len() - 1] {
            assert!(parser.receive(std::slice::from_ref(byte)).is_empty());
        }
        let events = parser.receive(&bytes[bytes.len() - 1..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &message);
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn bad_checksum_skips_frame_and_continues() {
        let first = encode_message(magic(), &Message::Ping(Ping::with_nonce(1))).unwrap();
        let second = encode_message(magic(), &Message::Verack).unwrap();

        let mut corrupted = first.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        corrupted.extend_from_slice(&second);

        let mut parser = FrameParser::new(magic());
        let events = parser.receive(&corrupted);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            Err(FrameError::BadChecksum { ref command }) if command == "ping"
        ));
        assert!(!events[0].as_ref().unwrap_err().is_fatal());
        assert_eq!(events[1].as_ref().unwrap(), &Message::Verack);
    }

    #[test]
    fn wrong_magic_is_fatal() {
        let frame = encode_message(Magic::MAINNET, &Message::Verack).unwrap();

        let mut parser = FrameParser::new(magic());
        let events = parser.receive(&frame);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(FrameError::BadMagic { .. })));
        assert!(events[0].as_ref().unwrap_err().is_fatal());

        // The stream is poisoned; later valid frames are not parsed.
        let valid = encode_message(magic(), &Message::Verack).unwrap();
        assert!(parser.receive(&valid).is_empty());
    }

    #[test]
    fn unknown_command_skips_frame() {
        let payload = [0x00u8, 0x01];
        let mut frame = Vec::new();
        frame.extend_from_slice(&magic().to_bytes());
        let mut command = [0u8; 12];
        command[..9].copy_from_slice(b"sendcmpct");
        frame.extend_from_slice(&command);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&ChecksumHash::hash(&payload).checksum());
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&encode_message(magic(), &Message::Verack).unwrap());

        let mut parser = FrameParser::new(magic());
        let events = parser.receive(&frame);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Err(FrameError::UnknownCommand(_))));
        assert_eq!(events[1].as_ref().unwrap(), &Message::Verack);
    }

    #[test]
    fn malformed_body_skips_frame() {
        let payload = [0x01u8, 0x02, 0x03]; // pong wants 8 bytes
        let mut frame = Vec::new();
        frame.extend_from_slice(&magic().to_bytes());
        frame.extend_from_slice(&Command::Pong.to_wire());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&ChecksumHash::hash(&payload).checksum());
        frame.extend_from_slice(&payload);

        let mut parser = FrameParser::new(magic());
        let events = parser.receive(&frame);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Err(FrameError::Malformed {
                command: Command::Pong,
                ..
            })
        ));
        assert!(!events[0].as_ref().unwrap_err().is_fatal());
    }

    #[test]
    fn oversize_length_is_fatal() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&magic().to_bytes());
        frame.extend_from_slice(&Command::Block.to_wire());
        frame.extend_from_slice(&(MAX_PROTOCOL_MESSAGE_LENGTH as u32 + 1).to_le_bytes());
        frame.extend_from_slice(&[0u8; 4]);

        let mut parser = FrameParser::new(magic());
        let events = parser.receive(&frame);
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap_err().is_fatal());
    }
}
