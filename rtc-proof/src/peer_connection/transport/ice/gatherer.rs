use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use rand::Rng;

use super::candidate::RTCIceCandidate;
use super::candidate_type::RTCIceCandidateType;
use super::server::IceUrl;
use crate::peer_connection::configuration::setting_engine::SettingEngine;
use crate::peer_connection::state::RTCIceGatheringState;

const HOST_NETWORK: [u8; 3] = [10, 0, 0];
// RFC 5737 documentation ranges stand in for NAT and TURN allocations.
const SRFLX_NETWORK: [u8; 3] = [203, 0, 113];
const RELAY_NETWORK: [u8; 3] = [198, 51, 100];
const RELAY_BASE_PORT: u16 = 50000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GathererEvent {
    Candidate(RTCIceCandidate),
    Complete,
}

/// Discovers local candidates on a timer.
///
/// A host candidate is found first, then one server reflexive candidate if
/// any STUN or TURN server is configured (every server sees the same NAT
/// mapping), then one relay candidate per TURN server.
pub(crate) struct Gatherer {
    name: String,
    octet: u8,
    urls: Vec<IceUrl>,
    host_delay: Duration,
    srflx_delay: Duration,
    relay_delay: Duration,

    state: RTCIceGatheringState,
    scheduled: VecDeque<(Instant, RTCIceCandidate)>,
    complete_at: Option<Instant>,
    events: VecDeque<GathererEvent>,
}

impl Gatherer {
    /// `octet` picks the last byte of every address this gatherer hands out,
    /// which keeps two gatherers on the same simulated network apart.
    pub(crate) fn new(
        name: String,
        octet: u8,
        urls: Vec<IceUrl>,
        setting_engine: &SettingEngine,
    ) -> Self {
        Self {
            name,
            octet,
            urls,
            host_delay: setting_engine.host_gather_delay(),
            srflx_delay: setting_engine.srflx_gather_delay(),
            relay_delay: setting_engine.relay_gather_delay(),
            state: RTCIceGatheringState::New,
            scheduled: VecDeque::new(),
            complete_at: None,
            events: VecDeque::new(),
        }
    }

    pub(crate) fn state(&self) -> RTCIceGatheringState {
        self.state
    }

    /// Starts gathering. Returns false if gathering already ran.
    pub(crate) fn gather(&mut self, now: Instant) -> bool {
        if self.state != RTCIceGatheringState::New {
            return false;
        }
        self.state = RTCIceGatheringState::Gathering;

        let port = rand::rng().random_range(49152..=65535u16);
        let host = SocketAddr::new(self.ip(HOST_NETWORK), port);
        let mut scheduled = vec![(
            now + self.host_delay,
            RTCIceCandidate::new(RTCIceCandidateType::Host, host, None, None),
        )];

        let mut base = host;
        if let Some(url) = self.urls.first() {
            let srflx = SocketAddr::new(self.ip(SRFLX_NETWORK), port);
            scheduled.push((
                now + self.srflx_delay,
                RTCIceCandidate::new(
                    RTCIceCandidateType::Srflx,
                    srflx,
                    Some(host),
                    Some(url.to_string()),
                ),
            ));
            base = srflx;
        }

        for (i, url) in self
            .urls
            .iter()
            .filter(|url| url.scheme.is_turn())
            .enumerate()
        {
            let relay = SocketAddr::new(self.ip(RELAY_NETWORK), RELAY_BASE_PORT + i as u16);
            scheduled.push((
                now + self.relay_delay,
                RTCIceCandidate::new(
                    RTCIceCandidateType::Relay,
                    relay,
                    Some(base),
                    Some(url.to_string()),
                ),
            ));
        }

        scheduled.sort_by_key(|(at, _)| *at);
        self.complete_at = scheduled.last().map(|(at, _)| *at);
        self.scheduled = scheduled.into();

        log::debug!(
            "[{}]: gathering {} candidates from {} servers",
            self.name,
            self.scheduled.len(),
            self.urls.len()
        );
        true
    }

    fn ip(&self, network: [u8; 3]) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(network[0], network[1], network[2], self.octet))
    }

    pub(crate) fn handle_timeout(&mut self, now: Instant) {
        while let Some((at, _)) = self.scheduled.front() {
            if *at > now {
                break;
            }
            if let Some((_, candidate)) = self.scheduled.pop_front() {
                log::trace!("[{}]: gathered {}", self.name, candidate);
                self.events.push_back(GathererEvent::Candidate(candidate));
            }
        }

        if self.state == RTCIceGatheringState::Gathering
            && self.scheduled.is_empty()
            && self.complete_at.is_none_or(|at| at <= now)
        {
            log::debug!("[{}]: gathering complete", self.name);
            self.state = RTCIceGatheringState::Complete;
            self.complete_at = None;
            self.events.push_back(GathererEvent::Complete);
        }
    }

    pub(crate) fn poll_timeout(&self) -> Option<Instant> {
        if self.state != RTCIceGatheringState::Gathering {
            return None;
        }
        self.scheduled
            .front()
            .map(|(at, _)| *at)
            .or(self.complete_at)
    }

    pub(crate) fn poll_event(&mut self) -> Option<GathererEvent> {
        self.events.pop_front()
    }

    /// Drops everything not yet discovered.
    pub(crate) fn close(&mut self) {
        self.scheduled.clear();
        self.complete_at = None;
        self.events.clear();
        if self.state == RTCIceGatheringState::Gathering {
            self.state = RTCIceGatheringState::Complete;
        }
    }
}
