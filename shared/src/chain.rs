//! Chained packets for payloads that do not fit in one datagram.
//!
//! Each fragment carries its own header
//! `magic:u16 payload_hash:u16 tick_id:u64 packet_count:u8 packet_id:u8`
//! where the hash covers that fragment's bytes. Fragments sharing a tick id
//! are reassembled into one payload by [`ChainAssembler`].

use crate::codec::{payload_hash, CodecError, PACKET_MAGIC};
use crate::{NET_MAX_CHAINS, NET_MAX_PACKET_CHAIN_LENGTH, NET_MAX_PACKET_SIZE};
use log::debug;

pub const CHAIN_HEADER_SIZE: usize = 14;
pub const CHAIN_MAX_FRAGMENT_SIZE: usize = NET_MAX_PACKET_SIZE - CHAIN_HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHeader {
    pub magic_value: u16,
    pub payload_hash: u16,
    pub tick_id: u64,
    pub packet_count: u8,
    pub packet_id: u8,
}

impl ChainHeader {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic_value.to_le_bytes());
        out.extend_from_slice(&self.payload_hash.to_le_bytes());
        out.extend_from_slice(&self.tick_id.to_le_bytes());
        out.push(self.packet_count);
        out.push(self.packet_id);
    }

    pub fn read(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..CHAIN_HEADER_SIZE)?;
        let mut tick = [0u8; 8];
        tick.copy_from_slice(&header[4..12]);
        Some(Self {
            magic_value: u16::from_le_bytes([header[0], header[1]]),
            payload_hash: u16::from_le_bytes([header[2], header[3]]),
            tick_id: u64::from_le_bytes(tick),
            packet_count: header[12],
            packet_id: header[13],
        })
    }
}

/// Splits `payload` into at most `NET_MAX_PACKET_CHAIN_LENGTH` datagrams.
pub fn split_chain(tick_id: u64, payload: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }

    let count = payload.len().div_ceil(CHAIN_MAX_FRAGMENT_SIZE);
    if count > NET_MAX_PACKET_CHAIN_LENGTH {
        return Err(CodecError::ChainTooLong(count));
    }

    Ok(payload
        .chunks(CHAIN_MAX_FRAGMENT_SIZE)
        .enumerate()
        .map(|(id, fragment)| {
            let mut packet = Vec::with_capacity(CHAIN_HEADER_SIZE + fragment.len());
            ChainHeader {
                magic_value: PACKET_MAGIC,
                payload_hash: payload_hash(fragment),
                tick_id,
                packet_count: count as u8,
                packet_id: id as u8,
            }
            .write(&mut packet);
            packet.extend_from_slice(fragment);
            packet
        })
        .collect())
}

#[derive(Debug)]
struct Chain {
    tick_id: u64,
    packet_count: u8,
    received: usize,
    fragments: Vec<Option<Vec<u8>>>,
}

impl Chain {
    fn new(tick_id: u64, packet_count: u8) -> Self {
        Self {
            tick_id,
            packet_count,
            received: 0,
            fragments: vec![None; packet_count as usize],
        }
    }
}

/// Reassembles chains for a handful of in-flight ticks.
#[derive(Debug, Default)]
pub struct ChainAssembler {
    slots: [Option<Chain>; NET_MAX_CHAINS],
}

impl ChainAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chains currently waiting for fragments.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Feeds one datagram; returns `(tick_id, payload)` once a chain completes.
    pub fn accept(&mut self, datagram: &[u8]) -> Result<Option<(u64, Vec<u8>)>, CodecError> {
        let header = ChainHeader::read(datagram).ok_or(CodecError::Truncated(datagram.len()))?;
        let fragment = &datagram[CHAIN_HEADER_SIZE..];

        if fragment.is_empty() {
            return Err(CodecError::EmptyPayload);
        }
        if header.magic_value != PACKET_MAGIC {
            return Err(CodecError::BadMagic(header.magic_value));
        }
        let actual = payload_hash(fragment);
        if actual != header.payload_hash {
            return Err(CodecError::HashMismatch {
                expected: header.payload_hash,
                actual,
            });
        }
        if header.packet_count as usize > NET_MAX_PACKET_CHAIN_LENGTH {
            return Err(CodecError::ChainTooLong(header.packet_count as usize));
        }
        if header.packet_id >= header.packet_count {
            return Err(CodecError::BadFragment {
                packet_id: header.packet_id,
                packet_count: header.packet_count,
            });
        }

        let Some(index) = self.slot_for(header.tick_id, header.packet_count) else {
            debug!("Dropping fragment for stale tick {}", header.tick_id);
            return Ok(None);
        };
        let Some(chain) = self.slots[index].as_mut() else {
            return Ok(None);
        };
        if chain.packet_count != header.packet_count {
            return Err(CodecError::BadFragment {
                packet_id: header.packet_id,
                packet_count: header.packet_count,
            });
        }

        let entry = &mut chain.fragments[header.packet_id as usize];
        if entry.is_none() {
            *entry = Some(fragment.to_vec());
            chain.received += 1;
        }
        if chain.received < chain.packet_count as usize {
            return Ok(None);
        }

        let Some(chain) = self.slots[index].take() else {
            return Ok(None);
        };
        let payload = chain.fragments.into_iter().flatten().flatten().collect();
        Ok(Some((chain.tick_id, payload)))
    }

    /// Finds or allocates the slot for `tick_id`, evicting the oldest chain
    /// when every slot belongs to another tick.
    fn slot_for(&mut self, tick_id: u64, packet_count: u8) -> Option<usize> {
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|c| c.tick_id == tick_id))
        {
            return Some(index);
        }

        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                let (oldest, oldest_tick) = self
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, slot)| slot.as_ref().map(|c| (i, c.tick_id)))
                    .min_by_key(|(_, tick)| *tick)?;
                if tick_id < oldest_tick {
                    return None;
                }
                debug!("Evicting incomplete chain for tick {}", oldest_tick);
                oldest
            }
        };

        self.slots[index] = Some(Chain::new(tick_id, packet_count));
        Some(index)
    }
}
