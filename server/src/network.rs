//! Server frame loop: receive, simulate, broadcast
//!
//! Each frame drains every queued datagram into the users' input buffers, runs
//! as many fixed-step ticks as real time allows, then sends one batch
//! describing the latest tick:
//! - one packet per user with a `Ping`, its `AssignPlayerKey` while the
//!   resend window is open, and its `WindowLayout` cell if enabled
//! - one packet per network slot (`ObjUpdate` or `ObjEmpty`) to every user
//!
//! The three phases never overlap, so the state needs no locking: receive only
//! appends to input buffers, the tick only reads inputs and writes object
//! state, and the broadcast only reads object state.

use crate::client_manager::{window_cell, ClientManager};
use crate::game::SimulationState;
use log::{debug, info, warn};
use shared::clock::FixedStep;
use shared::transport::{NetEndpoint, Transport};
use shared::{
    dispatch_payload, MessageBody, ObjectKey, PayloadWriter, TickInput, NET_DEFAULT_PORT,
    NET_MAX_INPUT_TICKS, OBJ_MAX_NETWORK_OBJECTS, TICK_RATE,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};

/// Ticks between periodic statistics logs.
const STATS_INTERVAL_TICKS: u64 = TICK_RATE * 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_users: usize,
    /// Silence after which a user is dropped.
    pub user_timeout: Duration,
    /// Send each user its cell of a tiled virtual desktop.
    pub window_layout: bool,
    /// Poll interval of the frame loop.
    pub frame: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: NET_DEFAULT_PORT,
            max_users: 16,
            user_timeout: Duration::from_millis(5000),
            window_layout: false,
            frame: Duration::from_millis(2),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct Server<T> {
    endpoint: NetEndpoint<T>,
    clients: ClientManager,
    sim: SimulationState,
    step: FixedStep,
    config: ServerConfig,
}

impl Server<UdpSocket> {
    /// Binds the UDP socket; on failure the server runs with networking disabled.
    pub async fn bind(config: ServerConfig) -> Self {
        let addr = config.bind_addr();
        let endpoint = match UdpSocket::bind(&addr).await {
            Ok(socket) => {
                info!("Server listening on {}", addr);
                NetEndpoint::new(socket)
            }
            Err(e) => NetEndpoint::disabled(&format!("failed to bind {}: {}", addr, e)),
        };
        Self::with_endpoint(endpoint, config)
    }
}

impl<T: Transport> Server<T> {
    pub fn with_transport(transport: T, config: ServerConfig) -> Self {
        Self::with_endpoint(NetEndpoint::new(transport), config)
    }

    pub fn with_endpoint(endpoint: NetEndpoint<T>, config: ServerConfig) -> Self {
        Self {
            endpoint,
            clients: ClientManager::new(config.max_users, config.user_timeout),
            sim: SimulationState::new(),
            step: FixedStep::new(),
            config,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn simulation(&self) -> &SimulationState {
        &self.sim
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn endpoint(&self) -> &NetEndpoint<T> {
        &self.endpoint
    }

    /// Runs the frame loop until the task is dropped.
    pub async fn run(&mut self) {
        let mut frame_interval = interval(self.config.frame);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        info!("Server running at {} ticks per second", TICK_RATE);
        loop {
            frame_interval.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(last_frame);
            last_frame = now;
            self.frame_at(now, elapsed);
        }
    }

    pub fn frame(&mut self, elapsed: Duration) -> u32 {
        self.frame_at(Instant::now(), elapsed)
    }

    /// One frame at wall-clock time `now`; returns the number of ticks simulated.
    pub fn frame_at(&mut self, now: Instant, elapsed: Duration) -> u32 {
        self.receive(now);
        self.drop_timed_out(now);

        let ticks = self.step.advance(elapsed);
        for _ in 0..ticks {
            self.tick();
        }
        if ticks > 0 {
            self.broadcast();
        }
        ticks
    }

    fn receive(&mut self, now: Instant) {
        while let Some((payload, from)) = self.endpoint.poll() {
            self.handle_payload(&payload, from, now);
        }
    }

    fn handle_payload(&mut self, payload: &[u8], from: SocketAddr, now: Instant) {
        let id = match self.clients.find_client_by_addr(from) {
            Some(id) => id,
            None => match self.connect(from, now) {
                Some(id) => id,
                None => return,
            },
        };
        let Some(client) = self.clients.get_mut(id) else {
            return;
        };

        client.last_seen = now;
        dispatch_payload(payload, |message| match message.body {
            MessageBody::Ping => {}
            MessageBody::Inputs {
                inputs,
                input_count,
            } => {
                let count = (input_count as usize).min(NET_MAX_INPUT_TICKS);
                client.inputs.insert_batch(&inputs[..count], message.tick_id);
            }
            other => debug!("Ignoring {} from user {}", other.kind_name(), id),
        });
    }

    fn connect(&mut self, addr: SocketAddr, now: Instant) -> Option<u32> {
        if self.clients.is_full() {
            warn!(
                "Rejecting {}: server full ({} users)",
                addr,
                self.clients.len()
            );
            return None;
        }
        let Some(player_key) = self.sim.spawn_player() else {
            warn!("Rejecting {}: no free object slot", addr);
            return None;
        };

        let id = self.clients.add_client(addr, player_key, now);
        if id.is_none() {
            self.sim.despawn(player_key);
        }
        id
    }

    fn drop_timed_out(&mut self, now: Instant) {
        for client in self.clients.drain_timed_out(now) {
            self.sim.despawn(client.player_key);
        }
    }

    fn tick(&mut self) {
        let inputs: Vec<(ObjectKey, TickInput)> = self
            .clients
            .iter_mut()
            .map(|client| (client.player_key, client.inputs.get_input_for_tick()))
            .collect();
        self.sim.tick(&inputs);

        if self.sim.tick % STATS_INTERVAL_TICKS == 0 && !self.clients.is_empty() {
            let stats = self.endpoint.stats();
            debug!(
                "Tick {}: {} users, {} packets sent, {} received, {} dropped",
                self.sim.tick,
                self.clients.len(),
                stats.packets_sent,
                stats.packets_received,
                stats.packets_dropped
            );
        }
    }

    fn broadcast(&mut self) {
        let tick_id = self.sim.tick;
        let ids = self.clients.ids();
        let user_count = ids.len();

        let mut addrs = Vec::with_capacity(user_count);
        for (slot, id) in ids.into_iter().enumerate() {
            let Some(client) = self.clients.get_mut(id) else {
                continue;
            };

            let mut bodies = vec![MessageBody::Ping];
            if client.should_send_key(tick_id) {
                bodies.push(MessageBody::AssignPlayerKey {
                    player_key: client.player_key,
                });
            }
            if self.config.window_layout {
                bodies.push(MessageBody::WindowLayout(window_cell(slot, user_count)));
            }

            let mut writer = PayloadWriter::new();
            for body in &bodies {
                if let Err(e) = writer.push(tick_id, body) {
                    warn!("Dropping {} for user {}: {}", body.kind_name(), id, e);
                }
            }
            addrs.push(client.addr);
            self.endpoint.send_payload(client.addr, writer.as_bytes());
        }

        if addrs.is_empty() {
            return;
        }
        for net_index in 0..OBJ_MAX_NETWORK_OBJECTS {
            let body = match self.sim.objects.sync_at(net_index) {
                Some(sync) => MessageBody::ObjUpdate {
                    net_index: net_index as u32,
                    sync: *sync,
                },
                None => MessageBody::ObjEmpty {
                    net_index: net_index as u32,
                },
            };

            let mut writer = PayloadWriter::new();
            if let Err(e) = writer.push(tick_id, &body) {
                warn!("Skipping broadcast of slot {}: {}", net_index, e);
                continue;
            }
            for addr in &addrs {
                self.endpoint.send_payload(*addr, writer.as_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use shared::clock::TICK_DURATION;
    use shared::loopback::{LoopbackConfig, LoopbackNetwork, LoopbackSocket};
    use shared::{NetMessage, NET_ASSIGN_KEY_RESEND_TICKS};

    fn setup(config: ServerConfig) -> (LoopbackNetwork, Server<LoopbackSocket>) {
        let net = LoopbackNetwork::new(LoopbackConfig::default());
        let server = Server::with_transport(net.socket(), config);
        (net, server)
    }

    fn send(endpoint: &mut NetEndpoint<LoopbackSocket>, to: SocketAddr, tick_id: u64, body: MessageBody) {
        let mut writer = PayloadWriter::new();
        writer.push(tick_id, &MessageBody::Ping).unwrap();
        writer.push(tick_id, &body).unwrap();
        assert!(endpoint.send_payload(to, writer.as_bytes()));
    }

    fn received(endpoint: &mut NetEndpoint<LoopbackSocket>) -> Vec<NetMessage> {
        let mut messages = Vec::new();
        while let Some((payload, _)) = endpoint.poll() {
            dispatch_payload(&payload, |m| messages.push(m));
        }
        messages
    }

    #[test]
    fn test_first_packet_registers_user_and_spawns_player() {
        let (net, mut server) = setup(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let mut client = NetEndpoint::new(net.socket());
        let objects_before = server.simulation().objects.len();

        send(&mut client, server_addr, 1, MessageBody::Ping);
        net.pump();
        server.frame(TICK_DURATION);

        assert_eq!(server.clients().len(), 1);
        assert_eq!(server.simulation().objects.len(), objects_before + 1);

        net.pump();
        let messages = received(&mut client);
        let key = messages.iter().find_map(|m| match m.body {
            MessageBody::AssignPlayerKey { player_key } => Some(player_key),
            _ => None,
        });
        let key = key.expect("no player key sent");
        assert!(server.simulation().objects.get(key).is_some());

        let slots = messages
            .iter()
            .filter(|m| {
                matches!(
                    m.body,
                    MessageBody::ObjUpdate { .. } | MessageBody::ObjEmpty { .. }
                )
            })
            .count();
        assert_eq!(slots, OBJ_MAX_NETWORK_OBJECTS);
        assert!(messages.iter().all(|m| m.tick_id == 1));
    }

    #[test]
    fn test_key_resend_stops_after_window() {
        let (net, mut server) = setup(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let mut client = NetEndpoint::new(net.socket());

        let mut key_ticks = Vec::new();
        for tick in 1..=(NET_ASSIGN_KEY_RESEND_TICKS + 10) {
            send(&mut client, server_addr, tick, MessageBody::Ping);
            net.pump();
            server.frame(TICK_DURATION);
            net.pump();
            for message in received(&mut client) {
                if matches!(message.body, MessageBody::AssignPlayerKey { .. }) {
                    key_ticks.push(message.tick_id);
                }
            }
        }

        assert_eq!(key_ticks.len() as u64, NET_ASSIGN_KEY_RESEND_TICKS);
        assert_eq!(key_ticks[0], 1);
    }

    #[test]
    fn test_full_server_rejects_new_users() {
        let (net, mut server) = setup(ServerConfig {
            max_users: 1,
            ..ServerConfig::default()
        });
        let server_addr = server.local_addr().unwrap();
        let mut first = NetEndpoint::new(net.socket());
        let mut second = NetEndpoint::new(net.socket());

        send(&mut first, server_addr, 1, MessageBody::Ping);
        send(&mut second, server_addr, 1, MessageBody::Ping);
        net.pump();
        server.frame(TICK_DURATION);

        assert_eq!(server.clients().len(), 1);
        net.pump();
        assert!(received(&mut second).is_empty());
    }

    #[test]
    fn test_timed_out_user_despawned() {
        let (net, mut server) = setup(ServerConfig {
            user_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        });
        let server_addr = server.local_addr().unwrap();
        let mut client = NetEndpoint::new(net.socket());
        let objects_before = server.simulation().objects.len();

        let start = Instant::now();
        send(&mut client, server_addr, 1, MessageBody::Ping);
        net.pump();
        server.frame_at(start, TICK_DURATION);
        assert_eq!(server.clients().len(), 1);

        server.frame_at(start + Duration::from_millis(200), TICK_DURATION);
        assert!(server.clients().is_empty());
        assert_eq!(server.simulation().objects.len(), objects_before);
    }

    #[test]
    fn test_inputs_move_player() {
        let (net, mut server) = setup(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let mut client = NetEndpoint::new(net.socket());

        send(&mut client, server_addr, 1, MessageBody::Ping);
        net.pump();
        server.frame(TICK_DURATION);
        let key = server.clients.get(1).unwrap().player_key;
        let start = server.simulation().objects.get(key).unwrap().p;

        let window = vec![TickInput::moving(Vec2::Y); 4];
        for tick in 2..12u64 {
            send(&mut client, server_addr, tick, MessageBody::inputs_from(&window));
            net.pump();
            server.frame(TICK_DURATION);
        }

        let end = server.simulation().objects.get(key).unwrap().p;
        assert!(end.y > start.y);
        assert_eq!(end.x, start.x);
    }

    #[test]
    fn test_window_layout_sent_when_enabled() {
        let (net, mut server) = setup(ServerConfig {
            window_layout: true,
            ..ServerConfig::default()
        });
        let server_addr = server.local_addr().unwrap();
        let mut client = NetEndpoint::new(net.socket());

        send(&mut client, server_addr, 1, MessageBody::Ping);
        net.pump();
        server.frame(TICK_DURATION);
        net.pump();

        let layout = received(&mut client).into_iter().find_map(|m| match m.body {
            MessageBody::WindowLayout(layout) => Some(layout),
            _ => None,
        });
        assert_eq!(layout, Some(window_cell(0, 1)));
    }

    #[test]
    fn test_no_ticks_no_broadcast() {
        let (net, mut server) = setup(ServerConfig::default());
        let server_addr = server.local_addr().unwrap();
        let mut client = NetEndpoint::new(net.socket());

        send(&mut client, server_addr, 1, MessageBody::Ping);
        net.pump();
        assert_eq!(server.frame(Duration::ZERO), 0);
        net.pump();
        assert!(received(&mut client).is_empty());
    }
}
