//! # Tick-Sync Client Library
//!
//! The client half of the tick-synchronized replication model. The client
//! never simulates gameplay; it samples one input per tick, streams its recent
//! input window to the server, and plays back the server's replicated object
//! states a few ticks behind real time so that late or lost updates can be
//! smoothed over by interpolation.
//!
//! ## Architecture Overview
//!
//! ### Snapshot History
//! Every network slot has its own bounded, tick-indexed history. Updates are
//! accepted in any order within the history window; ticks that never arrive
//! are reconstructed by interpolating between their nearest received
//! neighbours.
//!
//! ### Playback
//! A single playback tick advances through the range every populated slot can
//! answer. Its distance behind the newest data is tracked against recent
//! arrival jitter, and playback runs one extra step per client tick while it
//! trails too far.
//!
//! ### Inputs
//! Inputs come from an [`InputSource`](input::InputSource). The last
//! `NET_MAX_INPUT_TICKS` of them go out with every tick, so a lost packet costs
//! nothing as long as a later one arrives.
//!
//! ## Module Organization
//!
//! - [`snapshot`]: per-slot snapshot store with interpolation and bracket locking
//! - [`playback`]: playback tick driver and display-only local state
//! - [`input`]: input sources (wandering bot, constant input)
//! - [`network`]: client configuration and the receive/tick/send loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::WanderInput;
//! use client::network::{ClientConfig, ClientSession};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = ClientConfig::default();
//!     let mut session = ClientSession::connect(&config, Box::new(WanderInput::new(1))).await;
//!     session.run(config.frame).await;
//! }
//! ```

pub mod input;
pub mod network;
pub mod playback;
pub mod snapshot;
