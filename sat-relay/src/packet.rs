//! Datagram framing for the UDP transport.
//!
//! UDP has no notion of topics, so every datagram carries one framed
//! [`Packet`]: the topic name, the opaque message payload, and a trailing
//! CRC-32 over everything before it.  This module is responsible for:
//! - Defining the on-wire layout.
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw datagram back into a [`Packet`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Topic Length          |        Topic (UTF-8) ...      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload Length                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      CRC-32 of all above                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Fixed overhead: [`FRAME_OVERHEAD`] = 10 bytes plus the topic.

use thiserror::Error;

use crate::integrity;
use crate::transport::Message;

/// topic_len(2) + payload_len(4) + crc(4).
pub const FRAME_OVERHEAD: usize = 10;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM: usize = 65_507;

const TOPIC_LEN: usize = 2;
const PAYLOAD_LEN: usize = 4;
const CRC_LEN: usize = 4;

/// One framed datagram: a topic and its message bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("buffer too short to contain a frame")]
    BufferTooShort,
    #[error("length fields do not match the datagram size")]
    LengthMismatch,
    #[error("frame checksum verification failed")]
    ChecksumFailed,
    #[error("topic is not valid UTF-8")]
    InvalidTopic,
    #[error("topic of {0} bytes does not fit the length field")]
    TopicTooLong(usize),
}

impl Packet {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Bytes this packet occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.topic.len() + self.payload.len()
    }

    /// Serialise into a newly allocated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let topic = self.topic.as_bytes();
        let topic_len =
            u16::try_from(topic.len()).map_err(|_| PacketError::TopicTooLong(topic.len()))?;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&topic_len.to_be_bytes());
        buf.extend_from_slice(topic);
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);

        let crc = integrity::checksum(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        Ok(buf)
    }

    /// Parse a [`Packet`] from one datagram.
    ///
    /// Returns [`Err`] if the buffer is truncated, the length fields disagree
    /// with the buffer size, the CRC does not verify, or the topic is not
    /// UTF-8.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < FRAME_OVERHEAD {
            return Err(PacketError::BufferTooShort);
        }

        let (body, crc_bytes) = buf.split_at(buf.len() - CRC_LEN);
        let stored = u32::from_be_bytes(read_array(crc_bytes)?);
        if integrity::checksum(body) != stored {
            return Err(PacketError::ChecksumFailed);
        }

        let topic_len = u16::from_be_bytes(read_array(&body[..TOPIC_LEN])?) as usize;
        let topic_end = TOPIC_LEN + topic_len;
        if body.len() < topic_end + PAYLOAD_LEN {
            return Err(PacketError::LengthMismatch);
        }
        let topic = std::str::from_utf8(&body[TOPIC_LEN..topic_end])
            .map_err(|_| PacketError::InvalidTopic)?;

        let payload_len =
            u32::from_be_bytes(read_array(&body[topic_end..topic_end + PAYLOAD_LEN])?) as usize;
        let payload = &body[topic_end + PAYLOAD_LEN..];
        if payload.len() != payload_len {
            return Err(PacketError::LengthMismatch);
        }

        Ok(Packet::new(topic, payload.to_vec()))
    }
}

impl From<Message> for Packet {
    fn from(m: Message) -> Self {
        Packet::new(m.topic, m.payload)
    }
}

impl From<Packet> for Message {
    fn from(p: Packet) -> Self {
        Message::new(p.topic, p.payload)
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], PacketError> {
    bytes.try_into().map_err(|_| PacketError::BufferTooShort)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::new("sat/image/chunk", b"hello".to_vec());
        let bytes = pkt.encode().unwrap();
        assert_eq!(bytes.len(), pkt.encoded_len());
        assert_eq!(Packet::decode(&bytes).unwrap(), pkt);
    }

    #[test]
    fn empty_payload_roundtrip() {
        let pkt = Packet::new("sat/status", Vec::new());
        assert_eq!(Packet::decode(&pkt.encode().unwrap()).unwrap(), pkt);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort));
    }

    #[test]
    fn decode_short_frame_returns_error() {
        assert_eq!(
            Packet::decode(&[0u8; FRAME_OVERHEAD - 1]),
            Err(PacketError::BufferTooShort)
        );
    }

    #[test]
    fn decode_corrupt_byte_returns_checksum_error() {
        let mut bytes = Packet::new("t", b"test".to_vec()).encode().unwrap();
        bytes[3] ^= 0xff;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::ChecksumFailed));
    }

    #[test]
    fn decode_truncated_payload_returns_error() {
        let pkt = Packet::new("t", b"data".to_vec());
        let mut bytes = pkt.encode().unwrap();
        // Drop one payload byte and re-seal so only the length check can fail.
        let body_len = bytes.len() - CRC_LEN - 1;
        bytes.truncate(body_len);
        let crc = integrity::checksum(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        assert_eq!(Packet::decode(&bytes), Err(PacketError::LengthMismatch));
    }

    #[test]
    fn invalid_topic_utf8_is_rejected() {
        let mut body = vec![0x00, 0x02, 0xc3, 0x28];
        body.extend_from_slice(&0u32.to_be_bytes());
        let crc = integrity::checksum(&body);
        body.extend_from_slice(&crc.to_be_bytes());
        assert_eq!(Packet::decode(&body), Err(PacketError::InvalidTopic));
    }

    #[test]
    fn lengths_are_big_endian_on_wire() {
        let bytes = Packet::new("ab", vec![0u8; 0x0102]).encode().unwrap();
        assert_eq!(&bytes[..2], &[0x00, 0x02]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn oversized_topic_is_rejected() {
        let pkt = Packet::new("x".repeat(70_000), Vec::new());
        assert_eq!(pkt.encode(), Err(PacketError::TopicTooLong(70_000)));
    }

    #[test]
    fn default_chunk_fits_one_datagram() {
        // 60 KiB payload + CBOR envelope + frame stays under the UDP limit.
        let payload = vec![0u8; crate::chunk::DEFAULT_CHUNK_SIZE];
        let chunk = crate::chunk::Chunk::new("0".repeat(32), 0, 1, payload);
        let pkt = Packet::new("sat/image/chunk", chunk.encode().unwrap());
        assert!(pkt.encoded_len() <= MAX_DATAGRAM);
    }
}
