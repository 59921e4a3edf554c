//! Connected users for the authoritative server
//!
//! A user is created on the first valid packet from an unknown address and is
//! dropped once nothing has arrived from it for the configured timeout. Each
//! user owns:
//! - the key of the player object spawned for it
//! - its input FIFO and arrival statistics
//! - the tick at which its player key was first sent, which bounds how long
//!   the key keeps being re-sent

use crate::input_buffer::PlayerInputBuffer;
use log::info;
use shared::protocol::WindowLayout;
use shared::{ObjectKey, NET_ASSIGN_KEY_RESEND_TICKS};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Virtual desktop tiled by the window layout hint.
pub const LAYOUT_DESKTOP_WIDTH: i32 = 1920;
pub const LAYOUT_DESKTOP_HEIGHT: i32 = 1080;

#[derive(Debug)]
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    pub player_key: ObjectKey,
    /// Server tick of the first `AssignPlayerKey` for this user.
    pub key_first_sent_tick: Option<u64>,
    pub inputs: PlayerInputBuffer,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, player_key: ObjectKey, now: Instant) -> Self {
        Self {
            id,
            addr,
            last_seen: now,
            player_key,
            key_first_sent_tick: None,
            inputs: PlayerInputBuffer::new(),
        }
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }

    /// Whether the player key still goes out with this tick's packet.
    pub fn should_send_key(&mut self, tick: u64) -> bool {
        if self.player_key.is_none() {
            return false;
        }
        let first = *self.key_first_sent_tick.get_or_insert(tick);
        tick < first + NET_ASSIGN_KEY_RESEND_TICKS
    }
}

pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Registers a user; returns its id, or `None` when at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, player_key: ObjectKey, now: Instant) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let id = self.next_client_id;
        self.next_client_id += 1;
        info!("User {} connected from {}", id, addr);
        self.clients.insert(id, Client::new(id, addr, player_key, now));
        Some(id)
    }

    pub fn remove_client(&mut self, id: u32) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        info!("User {} disconnected", client.id);
        Some(client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    pub fn get(&self, id: u32) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    /// Removes and returns every user that has been silent past the timeout.
    pub fn drain_timed_out(&mut self, now: Instant) -> Vec<Client> {
        let timeout = self.timeout;
        let expired: Vec<u32> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(now, timeout))
            .map(|client| client.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                let client = self.clients.remove(&id)?;
                info!("User {} timed out", id);
                Some(client)
            })
            .collect()
    }

    /// User ids in connection order.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.values_mut()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Screen cell for the `slot`-th of `user_count` windows on the virtual desktop.
///
/// Cells form a grid with as many columns as needed to keep it roughly square.
pub fn window_cell(slot: usize, user_count: usize) -> WindowLayout {
    let count = user_count.max(1);
    let columns = (1..=count).find(|c| c * c >= count).unwrap_or(count);
    let rows = count.div_ceil(columns);

    let w = LAYOUT_DESKTOP_WIDTH / columns as i32;
    let h = LAYOUT_DESKTOP_HEIGHT / rows as i32;
    let slot = slot.min(count - 1);
    WindowLayout {
        user_count: user_count as u32,
        px: (slot % columns) as i32 * w,
        py: (slot / columns) as i32 * h,
        w,
        h,
    }
}
