//! Datagram transport and the packet-level endpoint built on it.
//!
//! [`Transport`] is the thin seam over the OS socket: non-blocking send and
//! receive of opaque datagrams. [`NetEndpoint`] adds the packet codec on top,
//! drops anything that fails validation, and carries the persistent error flag
//! that disables networking after a fatal failure.

use crate::codec::{decode_packet, encode_packet};
use crate::NET_MAX_PACKET_SIZE;
use log::{debug, error, warn};
use std::io;
use std::net::SocketAddr;

/// Receive buffer size; anything longer than a packet is rejected after reading.
const RECV_BUFFER_SIZE: usize = 2048;

/// Non-blocking datagram socket.
pub trait Transport {
    fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize>;

    /// Returns `Ok(None)` when no datagram is queued.
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for tokio::net::UdpSocket {
    fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.try_send_to(datagram, dest)
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match tokio::net::UdpSocket::try_recv_from(self, buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        tokio::net::UdpSocket::local_addr(self)
    }
}

/// Running packet counters, logged periodically by the frame loops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

pub struct NetEndpoint<T> {
    transport: Option<T>,
    err: bool,
    recv_buf: Vec<u8>,
    stats: EndpointStats,
}

impl<T: Transport> NetEndpoint<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            err: false,
            recv_buf: vec![0; RECV_BUFFER_SIZE],
            stats: EndpointStats::default(),
        }
    }

    /// An endpoint whose socket could not be created. Every operation is a no-op.
    pub fn disabled(reason: &str) -> Self {
        error!("Networking disabled: {}", reason);
        Self {
            transport: None,
            err: true,
            recv_buf: Vec::new(),
            stats: EndpointStats::default(),
        }
    }

    /// Latches the error flag; networking stays off for the rest of the process.
    pub fn fail(&mut self, reason: &str) {
        if !self.err {
            error!("Networking disabled: {}", reason);
        }
        self.err = true;
    }

    pub fn failed(&self) -> bool {
        self.err
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref()?.local_addr().ok()
    }

    /// Encodes `payload` into one packet and sends it to `dest`.
    pub fn send_payload(&mut self, dest: SocketAddr, payload: &[u8]) -> bool {
        if self.err {
            return false;
        }
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };

        let packet = match encode_packet(payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Not sending packet to {}: {}", dest, e);
                return false;
            }
        };

        match transport.send_to(&packet, dest) {
            Ok(_) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += packet.len() as u64;
                true
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Send buffer full, dropping packet to {}", dest);
                false
            }
            Err(e) => {
                warn!("Failed to send packet to {}: {}", dest, e);
                false
            }
        }
    }

    /// Returns the next valid payload, discarding corrupt or foreign datagrams.
    ///
    /// Returns `None` once the socket has nothing more queued.
    pub fn poll(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        if self.err {
            return None;
        }
        let transport = self.transport.as_ref()?;

        loop {
            let (len, from) = match transport.try_recv_from(&mut self.recv_buf) {
                Ok(Some(received)) => received,
                Ok(None) => return None,
                // ICMP errors from an earlier send surface on some platforms
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    debug!("Ignoring receive error: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Receive failed: {}", e);
                    return None;
                }
            };

            self.stats.bytes_received += len as u64;
            if len > NET_MAX_PACKET_SIZE {
                self.stats.packets_dropped += 1;
                warn!("Dropping oversize datagram of {} bytes from {}", len, from);
                continue;
            }

            match decode_packet(&self.recv_buf[..len]) {
                Ok(payload) => {
                    self.stats.packets_received += 1;
                    return Some((payload.to_vec(), from));
                }
                Err(e) => {
                    self.stats.packets_dropped += 1;
                    warn!("Dropping packet from {}: {}", from, e);
                }
            }
        }
    }
}
