use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::candidate::RTCIceCandidate;
use super::candidate_pair::{CandidatePair, CandidatePairState};
use super::candidate_type::RTCIceCandidateType;
use super::message::{BindingClass, BindingMessage, IceRoleAttr, TransactionId};
use crate::error::{Error, Result};
use crate::peer_connection::configuration::setting_engine::SettingEngine;
use crate::peer_connection::state::RTCIceConnectionState;
use crate::peer_connection::transport::{
    TaggedBytesMut, TransportContext, TransportMessage, TransportProtocol,
};

/// Binding requests older than this are forgotten, per RFC 8445 appendix B.1.
const MAX_BINDING_REQUEST_TIMEOUT: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone)]
struct AgentCandidate {
    candidate: RTCIceCandidate,
    addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub(crate) struct BindingRequest {
    timestamp: Instant,
    transaction_id: TransactionId,
    destination: SocketAddr,
    pair_index: usize,
}

#[derive(Default, Debug, Clone)]
struct UfragPwd {
    local_ufrag: String,
    local_pwd: String,
    remote_credentials: Option<(String, String)>,
}

/// A full ICE agent over simplified binding checks.
///
/// Candidates are paired as soon as both sides of a pair are known, but
/// checks only run once [`start_connectivity_checks`](Agent::start_connectivity_checks)
/// has provided the remote credentials and the role.
pub(crate) struct Agent {
    name: String,
    is_controlling: bool,
    tie_breaker: u64,
    started: bool,

    ufrag_pwd: UfragPwd,

    local_candidates: Vec<AgentCandidate>,
    remote_candidates: Vec<AgentCandidate>,
    candidate_pairs: Vec<CandidatePair>,
    selected_pair: Option<usize>,

    pending_binding_requests: Vec<BindingRequest>,

    connection_state: RTCIceConnectionState,
    local_gathering_complete: bool,
    remote_end_of_candidates: bool,

    max_binding_requests: u16,
    check_interval: Duration,
    last_checking_time: Option<Instant>,

    transmits: VecDeque<TaggedBytesMut>,
    events: VecDeque<RTCIceConnectionState>,
}

impl Agent {
    pub(crate) fn new(
        name: String,
        local_ufrag: String,
        local_pwd: String,
        setting_engine: &SettingEngine,
    ) -> Self {
        Self {
            name,
            is_controlling: false,
            tie_breaker: rand::random::<u64>(),
            started: false,

            ufrag_pwd: UfragPwd {
                local_ufrag,
                local_pwd,
                remote_credentials: None,
            },

            local_candidates: vec![],
            remote_candidates: vec![],
            candidate_pairs: vec![],
            selected_pair: None,

            pending_binding_requests: vec![],

            connection_state: RTCIceConnectionState::New,
            local_gathering_complete: false,
            remote_end_of_candidates: false,

            max_binding_requests: setting_engine.ice_max_binding_requests(),
            check_interval: setting_engine.ice_check_interval(),
            last_checking_time: None,

            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub(crate) fn get_name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) fn get_local_user_credentials(&self) -> (&str, &str) {
        (
            self.ufrag_pwd.local_ufrag.as_str(),
            self.ufrag_pwd.local_pwd.as_str(),
        )
    }

    pub(crate) fn connection_state(&self) -> RTCIceConnectionState {
        self.connection_state
    }

    pub(crate) fn is_controlling(&self) -> bool {
        self.is_controlling
    }

    pub(crate) fn local_candidates(&self) -> impl Iterator<Item = &RTCIceCandidate> {
        self.local_candidates.iter().map(|c| &c.candidate)
    }

    pub(crate) fn remote_candidates(&self) -> impl Iterator<Item = &RTCIceCandidate> {
        self.remote_candidates.iter().map(|c| &c.candidate)
    }

    pub(crate) fn candidate_pairs(&self) -> &[CandidatePair] {
        &self.candidate_pairs
    }

    /// The local and remote candidate of the selected pair.
    pub(crate) fn get_selected_candidate_pair(
        &self,
    ) -> Option<(&RTCIceCandidate, &RTCIceCandidate)> {
        let pair = &self.candidate_pairs[self.selected_pair?];
        Some((
            &self.local_candidates[pair.local_index].candidate,
            &self.remote_candidates[pair.remote_index].candidate,
        ))
    }

    /// Adds a new local candidate. Returns false if one with the same
    /// address is already known.
    pub(crate) fn add_local_candidate(&mut self, candidate: RTCIceCandidate) -> Result<bool> {
        let addr = candidate.addr()?;
        if self.local_candidates.iter().any(|c| c.addr == addr) {
            return Ok(false);
        }

        self.local_candidates.push(AgentCandidate { candidate, addr });
        let local_index = self.local_candidates.len() - 1;
        for remote_index in 0..self.remote_candidates.len() {
            self.add_pair(local_index, remote_index);
        }
        self.update_checking();

        Ok(true)
    }

    /// Adds a new remote candidate. Returns false if one with the same
    /// address is already known.
    pub(crate) fn add_remote_candidate(&mut self, candidate: RTCIceCandidate) -> Result<bool> {
        let addr = candidate.addr()?;
        if self.remote_candidates.iter().any(|c| c.addr == addr) {
            log::trace!(
                "[{}]: ignore duplicate remote candidate {}",
                self.get_name(),
                candidate
            );
            return Ok(false);
        }

        self.remote_candidates.push(AgentCandidate { candidate, addr });
        let remote_index = self.remote_candidates.len() - 1;
        for local_index in 0..self.local_candidates.len() {
            self.add_pair(local_index, remote_index);
        }
        self.update_checking();

        Ok(true)
    }

    pub(crate) fn set_local_gathering_complete(&mut self) {
        self.local_gathering_complete = true;
        self.update_terminal_state();
    }

    pub(crate) fn set_remote_end_of_candidates(&mut self) {
        if !self.remote_end_of_candidates {
            log::debug!("[{}]: remote end of candidates", self.get_name());
        }
        self.remote_end_of_candidates = true;
        self.update_terminal_state();
    }

    pub(crate) fn start_connectivity_checks(
        &mut self,
        is_controlling: bool,
        remote_ufrag: String,
        remote_pwd: String,
        now: Instant,
    ) -> Result<()> {
        if remote_ufrag.is_empty() {
            return Err(Error::ErrRemoteUfragEmpty);
        } else if remote_pwd.is_empty() {
            return Err(Error::ErrRemotePwdEmpty);
        }
        if self.started {
            log::debug!("[{}]: connectivity checks already running", self.get_name());
            return Ok(());
        }

        log::debug!(
            "[{}]: Started agent: isControlling? {}, remoteUfrag: {}",
            self.get_name(),
            is_controlling,
            remote_ufrag,
        );
        self.ufrag_pwd.remote_credentials = Some((remote_ufrag, remote_pwd));
        self.is_controlling = is_controlling;
        for pair in &mut self.candidate_pairs {
            pair.ice_role_controlling = is_controlling;
        }
        self.started = true;

        self.update_checking();
        self.contact(now);

        Ok(())
    }

    fn add_pair(&mut self, local_index: usize, remote_index: usize) {
        let pair = CandidatePair::new(
            local_index,
            remote_index,
            self.local_candidates[local_index].candidate.priority,
            self.remote_candidates[remote_index].candidate.priority,
            self.is_controlling,
        );
        log::trace!("[{}]: add pair {}", self.get_name(), pair);
        self.candidate_pairs.push(pair);
    }

    fn find_pair(&self, local_index: usize, remote_index: usize) -> Option<usize> {
        self.candidate_pairs
            .iter()
            .position(|p| p.local_index == local_index && p.remote_index == remote_index)
    }

    fn find_local_candidate(&self, addr: SocketAddr) -> Option<usize> {
        self.local_candidates.iter().position(|c| c.addr == addr)
    }

    fn find_remote_candidate(&self, addr: SocketAddr) -> Option<usize> {
        self.remote_candidates.iter().position(|c| c.addr == addr)
    }

    fn update_checking(&mut self) {
        if self.started
            && !self.candidate_pairs.is_empty()
            && self.connection_state == RTCIceConnectionState::New
        {
            self.update_connection_state(RTCIceConnectionState::Checking);
        }
    }

    /// Resolves `completed` for the controlling agent and `failed` for
    /// either agent, once neither side has candidates left to offer.
    fn update_terminal_state(&mut self) {
        if !self.started
            || matches!(
                self.connection_state,
                RTCIceConnectionState::Failed | RTCIceConnectionState::Closed
            )
        {
            return;
        }

        let pending = self.candidate_pairs.iter().any(|p| p.state.is_pending());
        let finished = self.local_gathering_complete && self.remote_end_of_candidates;
        if pending || !finished {
            return;
        }

        if self.selected_pair.is_some() {
            if self.is_controlling && self.connection_state == RTCIceConnectionState::Connected {
                self.update_connection_state(RTCIceConnectionState::Completed);
            }
        } else if self
            .candidate_pairs
            .iter()
            .all(|p| p.state == CandidatePairState::Failed)
        {
            log::warn!(
                "[{}]: all {} candidate pairs failed",
                self.get_name(),
                self.candidate_pairs.len()
            );
            self.update_connection_state(RTCIceConnectionState::Failed);
        }
    }

    pub(crate) fn update_connection_state(&mut self, new_state: RTCIceConnectionState) {
        if !self.connection_state.can_transition_to(new_state) {
            return;
        }
        log::info!(
            "[{}]: Setting new connection state: {}",
            self.get_name(),
            new_state
        );
        self.connection_state = new_state;
        self.events.push_back(new_state);
    }

    fn set_selected_pair(&mut self, pair_index: usize) {
        if self.selected_pair.is_some() {
            return;
        }
        log::trace!(
            "[{}]: Set selected candidate pair: {}",
            self.get_name(),
            self.candidate_pairs[pair_index]
        );
        self.candidate_pairs[pair_index].nominated = true;
        self.selected_pair = Some(pair_index);
        if !self.connection_state.is_connected() {
            self.update_connection_state(RTCIceConnectionState::Connected);
        }
    }

    fn contact(&mut self, now: Instant) {
        if matches!(
            self.connection_state,
            RTCIceConnectionState::Failed | RTCIceConnectionState::Closed
        ) {
            return;
        }
        self.invalidate_pending_binding_requests(now);
        self.last_checking_time = Some(now);
        self.ping_all_candidates(now);
        self.update_terminal_state();
    }

    fn ping_all_candidates(&mut self, now: Instant) {
        let mut pairs = vec![];
        {
            let name = self.name.as_str();
            for (index, p) in self.candidate_pairs.iter_mut().enumerate() {
                if p.state == CandidatePairState::Waiting {
                    p.state = CandidatePairState::InProgress;
                } else if p.state != CandidatePairState::InProgress {
                    continue;
                }

                if p.binding_request_count >= self.max_binding_requests {
                    log::trace!(
                        "[{}]: max requests reached for pair {}, marking it as failed",
                        name,
                        *p
                    );
                    p.state = CandidatePairState::Failed;
                } else {
                    p.binding_request_count += 1;
                    pairs.push(index);
                }
            }
        }

        for pair_index in pairs {
            self.ping_candidate(pair_index, now);
        }
    }

    fn ping_candidate(&mut self, pair_index: usize, now: Instant) {
        let Some((remote_ufrag, _)) = &self.ufrag_pwd.remote_credentials else {
            return;
        };
        let username = format!("{}:{}", remote_ufrag, self.ufrag_pwd.local_ufrag);
        let role = if self.is_controlling {
            IceRoleAttr::Controlling(self.tie_breaker)
        } else {
            IceRoleAttr::Controlled(self.tie_breaker)
        };

        let pair = self.candidate_pairs[pair_index];
        let local = &self.local_candidates[pair.local_index];
        let remote_addr = self.remote_candidates[pair.remote_index].addr;
        let local_addr = local.addr;
        let m = BindingMessage::request(
            username,
            local.candidate.priority,
            role,
            self.is_controlling,
        );

        log::trace!(
            "[{}]: ping STUN from {} to {}",
            self.get_name(),
            local_addr,
            remote_addr
        );
        self.pending_binding_requests.push(BindingRequest {
            timestamp: now,
            transaction_id: m.transaction_id,
            destination: remote_addr,
            pair_index,
        });
        self.send_binding(&m, local_addr, remote_addr, now);
    }

    fn send_binding(
        &mut self,
        m: &BindingMessage,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        now: Instant,
    ) {
        self.transmits.push_back(TransportMessage {
            now,
            transport: TransportContext {
                local_addr,
                peer_addr,
                transport_protocol: TransportProtocol::UDP,
            },
            message: m.marshal(),
        });
    }

    fn invalidate_pending_binding_requests(&mut self, filter_time: Instant) {
        let initial_size = self.pending_binding_requests.len();
        self.pending_binding_requests.retain(|binding_request| {
            filter_time
                .checked_duration_since(binding_request.timestamp)
                .map(|duration| duration < MAX_BINDING_REQUEST_TIMEOUT)
                .unwrap_or(true)
        });

        let bind_requests_removed = initial_size - self.pending_binding_requests.len();
        if bind_requests_removed > 0 {
            log::trace!(
                "[{}]: Discarded {} binding requests because they expired",
                self.get_name(),
                bind_requests_removed
            );
        }
    }

    fn handle_inbound(
        &mut self,
        m: BindingMessage,
        local_index: usize,
        remote_addr: SocketAddr,
        now: Instant,
    ) {
        match m.class {
            BindingClass::Request => self.handle_binding_request(m, local_index, remote_addr, now),
            BindingClass::SuccessResponse => {
                self.handle_success_response(m, local_index, remote_addr, now)
            }
        }
    }

    fn handle_binding_request(
        &mut self,
        m: BindingMessage,
        local_index: usize,
        remote_addr: SocketAddr,
        now: Instant,
    ) {
        let expected_prefix = format!("{}:", self.ufrag_pwd.local_ufrag);
        if !m
            .username
            .as_deref()
            .is_some_and(|username| username.starts_with(&expected_prefix))
        {
            log::warn!(
                "[{}]: discard message from ({}), username mismatch {:?}",
                self.get_name(),
                remote_addr,
                m.username
            );
            return;
        }

        if self.started {
            match m.role {
                Some(IceRoleAttr::Controlling(_)) if self.is_controlling => {
                    log::debug!(
                        "[{}]: inbound isControlling && a.isControlling == true",
                        self.get_name(),
                    );
                    return;
                }
                Some(IceRoleAttr::Controlled(_)) if !self.is_controlling => {
                    log::debug!(
                        "[{}]: inbound isControlled && a.isControlling == false",
                        self.get_name(),
                    );
                    return;
                }
                _ => {}
            }
        }

        log::trace!(
            "[{}]: inbound STUN (Request) from {} to {}",
            self.get_name(),
            remote_addr,
            local_index
        );
        let local_addr = self.local_candidates[local_index].addr;
        let success = BindingMessage::success(&m, remote_addr);
        self.send_binding(&success, local_addr, remote_addr, now);

        let remote_index = match self.find_remote_candidate(remote_addr) {
            Some(remote_index) => remote_index,
            None => {
                let mut prflx =
                    RTCIceCandidate::new(RTCIceCandidateType::Prflx, remote_addr, None, None);
                if let Some(priority) = m.priority {
                    prflx.priority = priority;
                }
                log::debug!(
                    "[{}]: adding a new peer-reflexive candidate: {}",
                    self.get_name(),
                    remote_addr
                );
                self.remote_candidates.push(AgentCandidate {
                    candidate: prflx,
                    addr: remote_addr,
                });
                let remote_index = self.remote_candidates.len() - 1;
                for local_index in 0..self.local_candidates.len() {
                    self.add_pair(local_index, remote_index);
                }
                self.update_checking();
                remote_index
            }
        };

        if m.use_candidate && !self.is_controlling {
            if let Some(pair_index) = self.find_pair(local_index, remote_index) {
                let pair = &mut self.candidate_pairs[pair_index];
                pair.nominated = true;
                if pair.state == CandidatePairState::Succeeded {
                    self.set_selected_pair(pair_index);
                }
            }
        }
    }

    fn handle_success_response(
        &mut self,
        m: BindingMessage,
        local_index: usize,
        remote_addr: SocketAddr,
        now: Instant,
    ) {
        self.invalidate_pending_binding_requests(now);
        let Some(position) = self
            .pending_binding_requests
            .iter()
            .position(|r| r.transaction_id == m.transaction_id)
        else {
            log::warn!(
                "[{}]: discard success message from ({}), unknown TransactionID",
                self.get_name(),
                remote_addr
            );
            return;
        };
        let binding_request = self.pending_binding_requests.remove(position);

        if binding_request.destination != remote_addr {
            log::debug!(
                "[{}]: discard message: transaction source and destination does not match expected({}), actual({})",
                self.get_name(),
                binding_request.destination,
                remote_addr
            );
            return;
        }

        let pair_index = binding_request.pair_index;
        log::trace!(
            "[{}]: inbound STUN (SuccessResponse) from {} to {}, mapped {:?}",
            self.get_name(),
            remote_addr,
            local_index,
            m.xor_mapped_address
        );

        let pair = &mut self.candidate_pairs[pair_index];
        pair.state = CandidatePairState::Succeeded;
        if self.is_controlling || pair.nominated {
            self.set_selected_pair(pair_index);
        }
        self.update_terminal_state();
    }
}

impl sansio::Protocol<TaggedBytesMut, (), ()> for Agent {
    type Rout = ();
    type Wout = TaggedBytesMut;
    type Eout = RTCIceConnectionState;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> std::result::Result<(), Self::Error> {
        let Some(local_index) = self.find_local_candidate(msg.transport.local_addr) else {
            log::warn!(
                "[{}]: Discarded message, not a valid local candidate from {:?}:{}",
                self.get_name(),
                msg.transport.transport_protocol,
                msg.transport.local_addr,
            );
            return Err(Error::ErrNoSuchLocalCandidate(
                msg.transport.local_addr.to_string(),
            ));
        };
        if self.connection_state == RTCIceConnectionState::Closed {
            return Ok(());
        }

        let m = BindingMessage::unmarshal(&msg.message)?;
        self.handle_inbound(m, local_index, msg.transport.peer_addr, msg.now);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.transmits.pop_front()
    }

    fn handle_event(&mut self, _evt: ()) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> std::result::Result<(), Self::Error> {
        if self.started
            && self
                .last_checking_time
                .is_none_or(|last| last + self.check_interval <= now)
        {
            self.contact(now);
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        if !self.started
            || matches!(
                self.connection_state,
                RTCIceConnectionState::Failed | RTCIceConnectionState::Closed
            )
            || !self.candidate_pairs.iter().any(|p| p.state.is_pending())
        {
            return None;
        }
        Some(
            self.last_checking_time
                .map_or_else(Instant::now, |last| last + self.check_interval),
        )
    }

    fn close(&mut self) -> std::result::Result<(), Self::Error> {
        self.selected_pair = None;
        self.pending_binding_requests.clear();
        self.transmits.clear();
        self.update_connection_state(RTCIceConnectionState::Closed);
        Ok(())
    }
}
