//! # Tick-Sync Server Library
//!
//! The authoritative side of the tick-synchronized replication model. The
//! server owns the canonical object pool, advances it on a fixed tick, and
//! replicates the full state of every network slot to every connected user
//! once per frame.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every tick consumes exactly one input per player, moves players by their
//! input or toward their pathing destination, and pushes them out of static
//! geometry with separating-axis collision resolution. Clients never simulate;
//! they only interpolate what the server sends.
//!
//! ### User Management
//! A user exists from its first valid packet until it has been silent for the
//! configured timeout. Each user gets a player object on arrival and loses it
//! on timeout. The player key is re-sent for one second of ticks so a single
//! lost packet does not leave a client without its key.
//!
//! ### Input Buffering
//! Clients send the full window of their most recent inputs on every tick.
//! The per-player buffer keeps only ticks it has not seen, tracks how far
//! ahead of consumption the client is running, and consumes an extra input
//! now and then to drain excess delay.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Frame Loop
//! Receive, simulate and broadcast run in strict sequence inside one task, so
//! none of the state needs synchronization. The frame loop is written against
//! the [`Transport`](shared::transport::Transport) trait and can be driven
//! frame by frame over an in-memory network in tests.
//!
//! ### Unreliable Datagrams Only
//! Nothing is acknowledged or retransmitted. Full-state replication every
//! frame and redundant input windows make individual losses harmless.
//!
//! ## Module Organization
//!
//! - [`client_manager`]: user registry, timeouts, key resend, window layout cells
//! - [`input_buffer`]: per-player input FIFO with catch-up
//! - [`pool`]: fixed-size object pool addressed by serial-checked keys
//! - [`physics`]: input application, integration, SAT collision, animation
//! - [`game`]: world setup and the fixed-step tick
//! - [`network`]: server configuration and the receive/tick/broadcast loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut server = Server::bind(ServerConfig::default()).await;
//!     server.run().await;
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod input_buffer;
pub mod network;
pub mod physics;
pub mod pool;
