//! Single-datagram packet codec.
//!
//! Every datagram is a 4 byte header followed by the payload:
//! `magic_value:u16 payload_hash:u16`, both little-endian. The hash covers the
//! payload bytes only and is the low 16 bits of xxh3 with seed 0.

use crate::{NET_MAX_PAYLOAD_SIZE, NET_PACKET_HEADER_SIZE};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64_with_seed;

pub const PACKET_MAGIC: u16 = 0x5C7A;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload of {0} bytes exceeds the {} byte limit", NET_MAX_PAYLOAD_SIZE)]
    PayloadTooLarge(usize),
    #[error("payload is empty")]
    EmptyPayload,
    #[error("datagram of {0} bytes is shorter than the packet header")]
    Truncated(usize),
    #[error("bad magic value {0:#06x}")]
    BadMagic(u16),
    #[error("payload hash mismatch: header {expected:#06x}, computed {actual:#06x}")]
    HashMismatch { expected: u16, actual: u16 },
    #[error("chain of {0} packets exceeds the chain length limit")]
    ChainTooLong(usize),
    #[error("fragment {packet_id} out of range for a chain of {packet_count}")]
    BadFragment { packet_id: u8, packet_count: u8 },
}

/// Header placed in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic_value: u16,
    pub payload_hash: u16,
}

impl PacketHeader {
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            magic_value: PACKET_MAGIC,
            payload_hash: payload_hash(payload),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic_value.to_le_bytes());
        out.extend_from_slice(&self.payload_hash.to_le_bytes());
    }

    pub fn read(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < NET_PACKET_HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic_value: u16::from_le_bytes([bytes[0], bytes[1]]),
            payload_hash: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// Low 16 bits of the seed-0 content hash of `payload`.
pub fn payload_hash(payload: &[u8]) -> u16 {
    xxh3_64_with_seed(payload, 0) as u16
}

/// Builds one datagram carrying `payload`.
pub fn encode_packet(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if payload.len() > NET_MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let mut packet = Vec::with_capacity(NET_PACKET_HEADER_SIZE + payload.len());
    PacketHeader::for_payload(payload).write(&mut packet);
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Validates a received datagram and returns its payload.
pub fn decode_packet(datagram: &[u8]) -> Result<&[u8], CodecError> {
    let header = PacketHeader::read(datagram).ok_or(CodecError::Truncated(datagram.len()))?;
    let payload = &datagram[NET_PACKET_HEADER_SIZE..];

    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if header.magic_value != PACKET_MAGIC {
        return Err(CodecError::BadMagic(header.magic_value));
    }

    let actual = payload_hash(payload);
    if actual != header.payload_hash {
        return Err(CodecError::HashMismatch {
            expected: header.payload_hash,
            actual,
        });
    }

    Ok(payload)
}
