//! Datagram transport: one ephemeral unicast socket for everything
//! addressed, one shared-port socket joined to the multicast group for
//! announcements and discovery probes.
//!
//! Multicast sends go out through the unicast socket, so receivers see the
//! sender's real unicast endpoint as the datagram source and can reply to it
//! directly. The multicast socket only ever receives.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::Sender;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace, warn};

use garter_wire::{GameMessage, MAX_DATAGRAM, MULTICAST_GROUP, multicast_endpoint};

use crate::NetError;

/// How long a receive loop blocks before re-checking the shutdown flag.
const RECV_POLL: Duration = Duration::from_millis(100);

/// Which socket a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    Unicast,
    Multicast,
}

/// A decoded inbound datagram.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub msg: GameMessage,
    pub from: SocketAddr,
    pub via: Via,
}

/// The node's pair of sockets.
pub struct Transport {
    unicast: UdpSocket,
    multicast: UdpSocket,
    local_addr: SocketAddr,
}

impl Transport {
    /// Bind both sockets. The unicast socket takes any ephemeral port; the
    /// multicast socket shares the group port (`SO_REUSEADDR`, so several
    /// peers on one host can coexist) and joins the group on every
    /// interface the OS default routes through.
    pub fn bind() -> Result<Self, NetError> {
        let unicast =
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(NetError::BindUnicast)?;
        let port = unicast.local_addr().map_err(NetError::BindUnicast)?.port();
        let local_addr = SocketAddr::new(IpAddr::V4(local_ipv4()), port);

        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(NetError::BindMulticast)?;
        raw.set_reuse_address(true).map_err(NetError::BindMulticast)?;
        let group = multicast_endpoint();
        raw.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port()).into())
            .map_err(NetError::BindMulticast)?;
        let multicast: UdpSocket = raw.into();
        multicast
            .join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)
            .map_err(NetError::JoinGroup)?;

        debug!(%local_addr, "transport bound");
        Ok(Self {
            unicast,
            multicast,
            local_addr,
        })
    }

    /// The unicast endpoint this node advertises in its player record.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one envelope to a unicast endpoint. Failures are logged and
    /// swallowed: for reliable kinds the retransmission loop tries again,
    /// for the rest losing a datagram is the contract anyway.
    pub fn send_unicast(&self, msg: &GameMessage, to: SocketAddr) {
        self.send_to(msg, to);
    }

    /// Send one envelope to the multicast group (through the unicast socket,
    /// so replies come straight back to us).
    pub fn send_multicast(&self, msg: &GameMessage) {
        self.send_to(msg, SocketAddr::V4(multicast_endpoint()));
    }

    fn send_to(&self, msg: &GameMessage, to: SocketAddr) {
        let bytes = match garter_wire::encode_datagram(msg) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, %to, "dropping unencodable datagram");
                return;
            }
        };
        if let Err(err) = self.unicast.send_to(&bytes, to) {
            warn!(%err, %to, "send failed");
        }
    }

    /// Spawn the two receive loops. Each decoded datagram is pushed into
    /// `inbound`; frames from our own endpoint are dropped. The loops exit
    /// once `running` clears (sockets poll with [`RECV_POLL`] timeouts).
    pub fn spawn_receivers(
        &self,
        running: Arc<AtomicBool>,
        inbound: Sender<Inbound>,
    ) -> Result<Vec<JoinHandle<()>>, NetError> {
        let mut handles = Vec::with_capacity(2);
        for (name, via, socket) in [
            ("garter-rx-uni", Via::Unicast, &self.unicast),
            ("garter-rx-mc", Via::Multicast, &self.multicast),
        ] {
            let socket = socket.try_clone().map_err(NetError::CloneSocket)?;
            socket
                .set_read_timeout(Some(RECV_POLL))
                .map_err(NetError::CloneSocket)?;
            let running = Arc::clone(&running);
            let inbound = inbound.clone();
            let local_addr = self.local_addr;
            let handle = std::thread::Builder::new()
                .name(name.to_string())
                .spawn(move || recv_loop(socket, via, local_addr, running, inbound))
                .map_err(NetError::CloneSocket)?;
            handles.push(handle);
        }
        Ok(handles)
    }
}

fn recv_loop(
    socket: UdpSocket,
    via: Via,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    inbound: Sender<Inbound>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    while running.load(Ordering::Relaxed) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(got) => got,
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => {
                if running.load(Ordering::Relaxed) {
                    debug!(%err, ?via, "receive error");
                }
                continue;
            }
        };
        if from == local_addr {
            // Our own multicast traffic looping back.
            continue;
        }
        match garter_wire::decode_datagram(&buf[..len]) {
            Ok(msg) => {
                trace!(kind = msg.body.as_ref().map(|b| b.kind()), %from, ?via, "recv");
                if inbound.send(Inbound { msg, from, via }).is_err() {
                    return;
                }
            }
            Err(err) => warn!(%err, %from, ?via, "dropping malformed frame"),
        }
    }
}

/// Resolve the IPv4 address this host would use to reach the LAN, once at
/// startup. A connected UDP socket makes the OS pick the outbound
/// interface without sending anything; loopback means the host has no
/// usable interface and we fall back to 127.0.0.1 (single-host play still
/// works).
pub fn local_ipv4() -> Ipv4Addr {
    fn probe() -> io::Result<Ipv4Addr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(SocketAddr::V4(multicast_endpoint()))?;
        match socket.local_addr()?.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(ip),
            other => Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no routable ipv4 interface (got {other})"),
            )),
        }
    }
    match probe() {
        Ok(ip) => ip,
        Err(err) => {
            warn!(%err, "falling back to loopback address");
            Ipv4Addr::LOCALHOST
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use garter_wire::{Body, Ping};

    fn ping(seq: i64) -> GameMessage {
        GameMessage {
            msg_seq: seq,
            sender_id: Some(1),
            receiver_id: None,
            body: Some(Body::Ping(Ping {})),
        }
    }

    #[test]
    fn unicast_datagram_reaches_peer() {
        let a = Transport::bind().unwrap();
        let b = Transport::bind().unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = unbounded();
        let handles = b.spawn_receivers(Arc::clone(&running), tx).unwrap();

        a.send_unicast(&ping(3), b.local_addr());

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got.msg, ping(3));
        assert_eq!(got.via, Via::Unicast);
        assert_eq!(got.from.port(), a.local_addr().port());

        running.store(false, Ordering::Relaxed);
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn local_ipv4_is_not_unspecified() {
        assert!(!local_ipv4().is_unspecified());
    }
}
