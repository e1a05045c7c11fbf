use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::peer_connection::EndpointRole;
use crate::peer_connection::transport::TaggedBytesMut;

/// In-process datagram network between the two endpoints of a session.
///
/// Every candidate address an endpoint announces is bound to it. Datagrams
/// addressed to an unbound address vanish, the rest arrive after a fixed
/// latency unless dropped by the configured loss rate.
pub(crate) struct LoopbackNetwork {
    latency: Duration,
    packet_loss: f64,
    bindings: HashMap<SocketAddr, EndpointRole>,
    in_flight: VecDeque<(Instant, EndpointRole, TaggedBytesMut)>,
    sent: usize,
    dropped: usize,
}

impl LoopbackNetwork {
    pub(crate) fn new(latency: Duration, packet_loss: f64) -> Self {
        Self {
            latency,
            packet_loss,
            bindings: HashMap::new(),
            in_flight: VecDeque::new(),
            sent: 0,
            dropped: 0,
        }
    }

    pub(crate) fn bind(&mut self, addr: SocketAddr, role: EndpointRole) {
        if self.bindings.insert(addr, role).is_none() {
            log::trace!("network: bound {addr} to {role}");
        }
    }

    /// Queues `msg` for delivery to whoever owns its destination.
    pub(crate) fn send(&mut self, mut msg: TaggedBytesMut, now: Instant) {
        self.sent += 1;
        let destination = msg.transport.peer_addr;
        let Some(role) = self.bindings.get(&destination).copied() else {
            log::trace!("network: no endpoint bound to {destination}, dropping datagram");
            self.dropped += 1;
            return;
        };
        if self.packet_loss > 0.0 && rand::rng().random_bool(self.packet_loss) {
            log::trace!(
                "network: lost datagram {} -> {}",
                msg.transport.local_addr,
                destination
            );
            self.dropped += 1;
            return;
        }

        // the receiver sees the datagram arriving on its own address
        std::mem::swap(&mut msg.transport.local_addr, &mut msg.transport.peer_addr);
        let deliver_at = now.max(msg.now) + self.latency;
        self.in_flight.push_back((deliver_at, role, msg));
    }

    pub(crate) fn poll_timeout(&self) -> Option<Instant> {
        self.in_flight.iter().map(|(at, _, _)| *at).min()
    }

    /// Pops the next datagram due at `now`, with the role it is addressed to.
    pub(crate) fn poll_deliver(&mut self, now: Instant) -> Option<(EndpointRole, TaggedBytesMut)> {
        let index = self.in_flight.iter().position(|(at, _, _)| *at <= now)?;
        let (_, role, mut msg) = self.in_flight.remove(index)?;
        msg.now = now;
        Some((role, msg))
    }

    /// `(sent, dropped)` datagram counters.
    pub(crate) fn stats(&self) -> (usize, usize) {
        (self.sent, self.dropped)
    }

    pub(crate) fn close(&mut self) {
        self.bindings.clear();
        self.in_flight.clear();
    }
}
