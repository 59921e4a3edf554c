//! # Shared Netcode Library
//!
//! Everything both the authoritative server and the clients have to agree on:
//! protocol constants, the replicated object data model, the packet codec,
//! the replication message set, and the small building blocks (ring buffers,
//! tick delta tracking, the fixed-step clock) that the synchronization layer
//! is assembled from.
//!
//! ## Wire Overview
//!
//! ```text
//! Packet  := Header Payload
//! Header  := magic_value:u16 payload_hash:u16
//! Payload := Message*
//! Message := tick_id:u64 kind:u32 body
//! ```
//!
//! Integers are fixed width and little-endian. The protocol makes no promise
//! of compatibility between different builds; server and clients are expected
//! to run the same binary version.
//!
//! ## Module Organization
//!
//! - [`object`]: replicated sync state, client-only local state, object keys, tick inputs
//! - [`ring`]: FIFO ring queue and tick-indexed ring
//! - [`codec`]: single-datagram packet header, hashing and validation
//! - [`chain`]: multi-datagram chains for payloads larger than one packet
//! - [`protocol`]: message kinds, payload builder and dispatch loop
//! - [`tick_delta`]: arrival spacing statistics and catch-up recommendation
//! - [`clock`]: fixed-step accumulator
//! - [`transport`]: datagram transport trait, UDP socket adapter, endpoint with error latch
//! - [`loopback`]: in-memory lossy network for tests and local demos

pub mod chain;
pub mod clock;
pub mod codec;
pub mod loopback;
pub mod object;
pub mod protocol;
pub mod ring;
pub mod tick_delta;
pub mod transport;

pub use codec::{decode_packet, encode_packet, payload_hash, CodecError};
pub use object::{CollisionShape, ObjectKey, ObjectLocalState, ObjectSyncState, TickInput};
pub use protocol::{dispatch_payload, MessageBody, NetMessage, PayloadWriter, ProtocolError};
pub use tick_delta::TickDeltaTracker;

/// Simulation updates per second, shared by server and clients.
pub const TICK_RATE: u64 = 64;
/// Seconds covered by one simulation tick.
pub const TIME_STEP: f32 = 1.0 / TICK_RATE as f32;
/// Upper bound of ticks drained from the accumulator in a single frame.
pub const MAX_TICKS_PER_FRAME: u32 = 8;

pub const NET_DEFAULT_PORT: u16 = 21037;
/// Conservative datagram size that stays below common path MTUs.
pub const NET_MAX_PACKET_SIZE: usize = 1200;
pub const NET_PACKET_HEADER_SIZE: usize = 4;
pub const NET_MAX_PAYLOAD_SIZE: usize = NET_MAX_PACKET_SIZE - NET_PACKET_HEADER_SIZE;
/// Length of the client's input window and of the server's per-player FIFO.
pub const NET_MAX_INPUT_TICKS: usize = 32;
/// One second of snapshot history per network object.
pub const NET_CLIENT_MAX_SNAPSHOTS: usize = TICK_RATE as usize;
pub const NET_MAX_PACKET_CHAIN_LENGTH: usize = 8;
pub const NET_MAX_CHAINS: usize = 4;
/// Ticks during which a freshly spawned player's key is re-sent to its user.
pub const NET_ASSIGN_KEY_RESEND_TICKS: u64 = TICK_RATE;
/// Largest forward jump in tick id accepted from a peer; anything further is garbage.
pub const NET_MAX_TICK_JUMP: u64 = u32::MAX as u64;
/// Number of arrival deltas remembered by a [`TickDeltaTracker`].
pub const TICK_DELTA_WINDOW: usize = 64;

pub const OBJ_MAX_NETWORK_OBJECTS: usize = 64;
pub const COLLISION_MAX_VERTICES: usize = 8;
pub const COLLISION_MAX_ITERATIONS: usize = 8;

pub const PLAYER_SPEED: f32 = 220.0;
pub const PLAYER_HALF_SIZE: f32 = 12.0;
pub const ANIMATION_FRAME_COUNT: u32 = 8;
pub const WORLD_WIDTH: f32 = 1280.0;
pub const WORLD_HEIGHT: f32 = 720.0;
