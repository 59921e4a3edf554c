//! Client frame loop: receive, tick, send
//!
//! Each frame drains the server's datagrams into per-slot snapshot stores and
//! picks up the player key and window layout, then runs the fixed-step ticks.
//! Every tick samples one input into the sliding window, advances playback
//! and sends a `Ping` plus the whole input window to the server in one packet.

use crate::input::InputSource;
use crate::playback::Playback;
use log::{debug, info, warn};
use shared::clock::FixedStep;
use shared::protocol::WindowLayout;
use shared::ring::RingQueue;
use shared::transport::{NetEndpoint, Transport};
use shared::{
    dispatch_payload, MessageBody, NetMessage, ObjectKey, ObjectSyncState, PayloadWriter,
    TickInput, NET_DEFAULT_PORT, NET_MAX_INPUT_TICKS, OBJ_MAX_NETWORK_OBJECTS, TICK_RATE,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{interval, MissedTickBehavior};

const STATS_INTERVAL_TICKS: u64 = TICK_RATE * 5;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_host: String,
    pub port: u16,
    /// Poll interval of the frame loop.
    pub frame: Duration,
    /// Seed for the wandering input source; random when unset.
    pub seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "localhost".to_string(),
            port: NET_DEFAULT_PORT,
            frame: Duration::from_millis(2),
            seed: None,
        }
    }
}

pub struct ClientSession<T> {
    endpoint: NetEndpoint<T>,
    server_addr: Option<SocketAddr>,

    playback: Playback,
    input: Box<dyn InputSource>,
    inputs: RingQueue<TickInput, NET_MAX_INPUT_TICKS>,
    tick: u64,
    step: FixedStep,

    player_key: Option<ObjectKey>,
    player_key_tick: u64,
    layout: Option<WindowLayout>,
    rejected_snapshots: u64,
}

impl ClientSession<UdpSocket> {
    /// Resolves the server and opens a socket; failures disable networking
    /// but still return a session.
    pub async fn connect(config: &ClientConfig, input: Box<dyn InputSource>) -> Self {
        let target = format!("{}:{}", config.server_host, config.port);
        let resolved: Vec<SocketAddr> = match lookup_host(&target).await {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                let endpoint = NetEndpoint::disabled(&format!("cannot resolve {}: {}", target, e));
                return Self::with_endpoint(endpoint, None, input);
            }
        };

        let Some(server_addr) = resolved
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| resolved.first())
            .copied()
        else {
            let endpoint = NetEndpoint::disabled(&format!("no address found for {}", target));
            return Self::with_endpoint(endpoint, None, input);
        };

        let bind = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        match UdpSocket::bind(bind).await {
            Ok(socket) => {
                info!("Talking to server at {}", server_addr);
                Self::with_endpoint(NetEndpoint::new(socket), Some(server_addr), input)
            }
            Err(e) => {
                let endpoint = NetEndpoint::disabled(&format!("failed to bind {}: {}", bind, e));
                Self::with_endpoint(endpoint, Some(server_addr), input)
            }
        }
    }
}

impl<T: Transport> ClientSession<T> {
    pub fn with_transport(transport: T, server_addr: SocketAddr, input: Box<dyn InputSource>) -> Self {
        Self::with_endpoint(NetEndpoint::new(transport), Some(server_addr), input)
    }

    pub fn with_endpoint(
        endpoint: NetEndpoint<T>,
        server_addr: Option<SocketAddr>,
        input: Box<dyn InputSource>,
    ) -> Self {
        Self {
            endpoint,
            server_addr,
            playback: Playback::new(),
            input,
            inputs: RingQueue::new(),
            tick: 0,
            step: FixedStep::new(),
            player_key: None,
            player_key_tick: 0,
            layout: None,
            rejected_snapshots: 0,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn endpoint(&self) -> &NetEndpoint<T> {
        &self.endpoint
    }

    /// Last completed client tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn player_key(&self) -> Option<ObjectKey> {
        self.player_key
    }

    /// Interpolated state of the local player, once known and active.
    pub fn player_state(&self) -> Option<&ObjectSyncState> {
        let key = self.player_key?;
        self.playback
            .state(key.index as usize)
            .filter(|state| state.is_active)
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn layout(&self) -> Option<WindowLayout> {
        self.layout
    }

    pub fn rejected_snapshots(&self) -> u64 {
        self.rejected_snapshots
    }

    /// Runs the frame loop until the task is dropped.
    pub async fn run(&mut self, frame: Duration) {
        let mut frame_interval = interval(frame);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        loop {
            frame_interval.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(last_frame);
            last_frame = now;
            self.frame(elapsed);
        }
    }

    /// One frame: drain the socket, then run the client ticks `elapsed` allows.
    pub fn frame(&mut self, elapsed: Duration) -> u32 {
        self.receive();

        let ticks = self.step.advance(elapsed);
        for _ in 0..ticks {
            self.client_tick();
        }
        self.playback.update_local(elapsed.as_secs_f32());
        ticks
    }

    fn receive(&mut self) {
        while let Some((payload, from)) = self.endpoint.poll() {
            if Some(from) != self.server_addr {
                debug!("Ignoring packet from {}", from);
                continue;
            }
            dispatch_payload(&payload, |message| self.handle_message(message));
        }
    }

    fn handle_message(&mut self, message: NetMessage) {
        let tick_id = message.tick_id;
        match message.body {
            MessageBody::Ping => {}
            MessageBody::ObjUpdate { net_index, mut sync } => {
                sync.init = true;
                self.store_snapshot(net_index, tick_id, sync);
            }
            MessageBody::ObjEmpty { net_index } => {
                self.store_snapshot(net_index, tick_id, ObjectSyncState::empty());
            }
            MessageBody::AssignPlayerKey { player_key } => {
                if tick_id <= self.player_key_tick {
                    return;
                }
                if self.player_key != Some(player_key) {
                    info!(
                        "Assigned player object {} (serial {})",
                        player_key.index, player_key.serial
                    );
                }
                self.player_key = Some(player_key);
                self.player_key_tick = tick_id;
            }
            MessageBody::WindowLayout(layout) => {
                if self.layout.map(|l| l.user_count) != Some(layout.user_count) {
                    info!(
                        "Window layout for {} users: {}x{} at ({}, {})",
                        layout.user_count, layout.w, layout.h, layout.px, layout.py
                    );
                    self.layout = Some(layout);
                }
            }
            other => debug!("Ignoring {} from server", other.kind_name()),
        }
    }

    fn store_snapshot(&mut self, net_index: u32, tick_id: u64, sync: ObjectSyncState) {
        let index = net_index as usize;
        if index >= OBJ_MAX_NETWORK_OBJECTS {
            warn!("Dropping update for out-of-range slot {}", net_index);
            return;
        }
        if let Err(e) = self.playback.insert(index, tick_id, sync) {
            self.rejected_snapshots += 1;
            debug!("Snapshot for slot {} rejected: {}", index, e);
        }
    }

    fn client_tick(&mut self) {
        self.tick += 1;

        let player = self.player_state().copied();
        let input = self.input.sample(self.tick, player.as_ref());
        self.inputs.push(input);

        self.playback.playback_tick();
        self.send_inputs();

        if self.tick % STATS_INTERVAL_TICKS == 0 {
            let stats = self.endpoint.stats();
            debug!(
                "Tick {}: playback at {}, {} packets received, {} dropped, {} snapshots rejected",
                self.tick,
                self.playback.next_playback_tick(),
                stats.packets_received,
                stats.packets_dropped,
                self.rejected_snapshots
            );
        }
    }

    fn send_inputs(&mut self) {
        let Some(server_addr) = self.server_addr else {
            return;
        };

        let mut writer = PayloadWriter::new();
        let bodies = [MessageBody::Ping, MessageBody::inputs_from(self.inputs.iter())];
        for body in &bodies {
            if let Err(e) = writer.push(self.tick, body) {
                warn!("Not sending {}: {}", body.kind_name(), e);
                return;
            }
        }
        self.endpoint.send_payload(server_addr, writer.as_bytes());
    }
}
