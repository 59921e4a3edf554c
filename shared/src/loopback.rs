//! In-memory lossy datagram network.
//!
//! Sockets created from one [`LoopbackNetwork`] exchange datagrams through a
//! shared queue. Delivery happens in discrete steps: a datagram sent now
//! becomes readable after one or more calls to [`LoopbackNetwork::pump`].
//! Loss, duplication and reordering are drawn from a seeded RNG, so a run is
//! reproducible for a given seed and call sequence.

use crate::transport::Transport;
use log::trace;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const FIRST_PORT: u16 = 40000;

#[derive(Debug, Clone, Copy)]
pub struct LoopbackConfig {
    /// Percentage of datagrams dropped, `0.0..=100.0`.
    pub loss: f64,
    /// Percentage of datagrams delivered twice.
    pub duplicate: f64,
    /// Extra delivery delay in pump steps, drawn uniformly from `0..=max_delay_steps`.
    pub max_delay_steps: u32,
    pub seed: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            loss: 0.0,
            duplicate: 0.0,
            max_delay_steps: 0,
            seed: 0,
        }
    }
}

impl LoopbackConfig {
    fn delivery<R: Rng + ?Sized>(&self, rng: &mut R, step: u64) -> Option<u64> {
        if self.loss > Uniform::new(0.0, 100.0).sample(rng) {
            return None;
        }
        Some(step + 1 + rng.gen_range(0..=self.max_delay_steps) as u64)
    }

    fn duplicate<R: Rng + ?Sized>(&self, rng: &mut R, step: u64) -> Option<u64> {
        if self.duplicate > Uniform::new(0.0, 100.0).sample(rng) {
            Some(step + 1 + rng.gen_range(0..=self.max_delay_steps) as u64)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct InFlight {
    deliver_at: u64,
    from: SocketAddr,
    to: SocketAddr,
    data: Vec<u8>,
}

#[derive(Debug)]
struct Inner {
    config: LoopbackConfig,
    rng: StdRng,
    step: u64,
    next_port: u16,
    in_flight: Vec<InFlight>,
    inboxes: HashMap<SocketAddr, VecDeque<(SocketAddr, Vec<u8>)>>,
    delivered: u64,
    dropped: u64,
}

#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    inner: Arc<Mutex<Inner>>,
}

impl LoopbackNetwork {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                config,
                rng: StdRng::seed_from_u64(config.seed),
                step: 0,
                next_port: FIRST_PORT,
                in_flight: Vec::new(),
                inboxes: HashMap::new(),
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds a socket on the next free loopback port.
    pub fn socket(&self) -> LoopbackSocket {
        let addr = {
            let mut inner = self.lock();
            let port = inner.next_port;
            inner.next_port = inner.next_port.wrapping_add(1);
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
        };
        self.bind(addr)
    }

    /// Binds a socket at `addr`, replacing any earlier socket there.
    pub fn bind(&self, addr: SocketAddr) -> LoopbackSocket {
        self.lock().inboxes.insert(addr, VecDeque::new());
        LoopbackSocket {
            inner: Arc::clone(&self.inner),
            addr,
        }
    }

    /// Changes loss and delay settings for datagrams sent from now on.
    pub fn set_config(&self, config: LoopbackConfig) {
        self.lock().config = config;
    }

    /// Advances one step, moving due datagrams into their receivers' inboxes.
    pub fn pump(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.step += 1;
        let step = inner.step;

        let (due, pending): (Vec<InFlight>, Vec<InFlight>) = inner
            .in_flight
            .drain(..)
            .partition(|datagram| datagram.deliver_at <= step);
        inner.in_flight = pending;

        for datagram in due {
            match inner.inboxes.get_mut(&datagram.to) {
                Some(inbox) => {
                    inbox.push_back((datagram.from, datagram.data));
                    inner.delivered += 1;
                }
                None => {
                    trace!("No socket bound at {}, dropping datagram", datagram.to);
                    inner.dropped += 1;
                }
            }
        }
    }

    /// Datagrams not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

#[derive(Debug)]
pub struct LoopbackSocket {
    inner: Arc<Mutex<Inner>>,
    addr: SocketAddr,
}

impl LoopbackSocket {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Transport for LoopbackSocket {
    fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;
        let (config, step) = (inner.config, inner.step);

        let deliveries = [
            config.delivery(&mut inner.rng, step),
            config.duplicate(&mut inner.rng, step),
        ];
        let mut sent = false;
        for deliver_at in deliveries.into_iter().flatten() {
            inner.in_flight.push(InFlight {
                deliver_at,
                from: self.addr,
                to: dest,
                data: datagram.to_vec(),
            });
            sent = true;
        }
        if !sent {
            inner.dropped += 1;
        }

        Ok(datagram.len())
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((from, data)) = inner
            .inboxes
            .get_mut(&self.addr)
            .and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };

        // UDP semantics: excess bytes are discarded
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(Some((len, from)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(socket: &LoopbackSocket) -> Vec<Vec<u8>> {
        let mut buf = [0u8; 64];
        let mut out = Vec::new();
        while let Ok(Some((len, _))) = socket.try_recv_from(&mut buf) {
            out.push(buf[..len].to_vec());
        }
        out
    }

    #[test]
    fn test_delivery_after_pump() {
        let net = LoopbackNetwork::new(LoopbackConfig::default());
        let a = net.socket();
        let b = net.socket();

        a.send_to(b"one", b.addr()).unwrap();
        assert!(drain(&b).is_empty());
        net.pump();
        assert_eq!(drain(&b), vec![b"one".to_vec()]);
    }

    #[test]
    fn test_full_loss() {
        let net = LoopbackNetwork::new(LoopbackConfig {
            loss: 100.0,
            ..LoopbackConfig::default()
        });
        let a = net.socket();
        let b = net.socket();
        for _ in 0..10 {
            a.send_to(b"x", b.addr()).unwrap();
        }
        net.pump();
        assert!(drain(&b).is_empty());
        assert_eq!(net.dropped(), 10);
    }

    #[test]
    fn test_full_duplication() {
        let net = LoopbackNetwork::new(LoopbackConfig {
            duplicate: 100.0,
            ..LoopbackConfig::default()
        });
        let a = net.socket();
        let b = net.socket();
        a.send_to(b"x", b.addr()).unwrap();
        net.pump();
        assert_eq!(drain(&b).len(), 2);
    }

    #[test]
    fn test_delay_reorders() {
        let net = LoopbackNetwork::new(LoopbackConfig {
            max_delay_steps: 5,
            seed: 3,
            ..LoopbackConfig::default()
        });
        let a = net.socket();
        let b = net.socket();
        for i in 0..50u8 {
            a.send_to(&[i], b.addr()).unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..6 {
            net.pump();
            received.extend(drain(&b).into_iter().map(|d| d[0]));
        }

        assert_eq!(received.len(), 50);
        let mut sorted = received.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<u8>>());
        assert_ne!(received, sorted);
    }

    #[test]
    fn test_unbound_destination_dropped() {
        let net = LoopbackNetwork::new(LoopbackConfig::default());
        let a = net.socket();
        let nowhere = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9);
        a.send_to(b"x", nowhere).unwrap();
        net.pump();
        assert_eq!(net.dropped(), 1);
        assert_eq!(net.in_flight(), 0);
    }
}
