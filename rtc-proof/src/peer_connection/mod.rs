//! One side of a negotiated connection.
//!
//! [`RTCPeerConnection`] is a sans-I/O endpoint: description and candidate
//! operations are plain method calls, while datagrams and timers flow
//! through the [`sansio::Protocol`] implementation. The caller owns the
//! clock and the network.
//!
//! ```
//! use rtc_proof::peer_connection::configuration::RTCConfigurationBuilder;
//! use rtc_proof::peer_connection::{EndpointRole, RTCPeerConnection};
//! use rtc_proof::peer_connection::state::RTCSignalingState;
//!
//! # fn main() -> rtc_proof::Result<()> {
//! let mut local = RTCPeerConnection::new(RTCConfigurationBuilder::new().build(), EndpointRole::Local)?;
//! let mut remote = RTCPeerConnection::new(RTCConfigurationBuilder::new().build(), EndpointRole::Remote)?;
//!
//! let offer = local.create_offer()?;
//! local.set_local_description(offer.clone())?;
//! remote.set_remote_description(offer)?;
//!
//! let answer = remote.create_answer()?;
//! remote.set_local_description(answer.clone())?;
//! local.set_remote_description(answer)?;
//!
//! assert_eq!(local.signaling_state(), RTCSignalingState::Stable);
//! assert_eq!(remote.signaling_state(), RTCSignalingState::Stable);
//! # Ok(())
//! # }
//! ```

pub mod configuration;
pub mod event;
pub mod sdp;
pub mod state;
pub mod transport;

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use sansio::Protocol;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::media_stream::{MediaStreamTrack, MediaStreamTrackKind};
use configuration::RTCConfiguration;
use event::RTCPeerConnectionEvent;
use event::ice_event::RTCPeerConnectionIceEvent;
use sdp::description::ATTR_KEY_END_OF_CANDIDATES;
use sdp::{
    ConnectionRole, MediaSection, MediaSectionKind, PopulateSdpParams, RTCSdpType,
    RTCSessionDescription, populate_local_candidates, populate_sdp,
};
use state::signaling_state::{StateChangeOp, next_signaling_state};
use state::{
    RTCIceConnectionState, RTCIceGatheringState, RTCPeerConnectionState, RTCSignalingState,
};
use transport::TaggedBytesMut;
use transport::ice::agent::Agent;
use transport::ice::candidate::{RTCIceCandidate, RTCIceCandidateInit, unmarshal_candidate};
use transport::ice::gatherer::{Gatherer, GathererEvent};
use transport::ice::rand::{generate_pwd, generate_ufrag};

/// Which side of the proof an endpoint plays. The local endpoint offers,
/// the remote endpoint answers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum EndpointRole {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "remote")]
    Remote,
}

impl EndpointRole {
    /// Last address byte of every candidate this endpoint gathers.
    pub(crate) fn octet(self) -> u8 {
        match self {
            EndpointRole::Local => 1,
            EndpointRole::Remote => 2,
        }
    }

    pub fn peer(self) -> Self {
        match self {
            EndpointRole::Local => EndpointRole::Remote,
            EndpointRole::Remote => EndpointRole::Local,
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EndpointRole::Local => write!(f, "local"),
            EndpointRole::Remote => write!(f, "remote"),
        }
    }
}

/// Observer invoked synchronously for every event, in registration order.
pub type OnEventHdlrFn = Box<dyn FnMut(&RTCPeerConnectionEvent) + Send + 'static>;

/// PeerConnection represents one endpoint of a peer-to-peer connection.
pub struct RTCPeerConnection {
    role: EndpointRole,
    configuration: RTCConfiguration,

    local_description: Option<RTCSessionDescription>,
    current_local_description: Option<RTCSessionDescription>,
    remote_description: Option<RTCSessionDescription>,
    current_remote_description: Option<RTCSessionDescription>,
    remote_credentials: Option<(String, String)>,

    signaling_state: RTCSignalingState,
    ice_gathering_state: RTCIceGatheringState,
    ice_connection_state: RTCIceConnectionState,
    peer_connection_state: RTCPeerConnectionState,
    is_closed: bool,

    sdp_session_id: u64,
    sdp_session_version: u64,
    last_offer: Option<RTCSessionDescription>,
    last_answer: Option<RTCSessionDescription>,

    tracks: Vec<MediaStreamTrack>,
    local_candidates: Vec<RTCIceCandidate>,
    remote_candidates: Vec<RTCIceCandidate>,
    pending_remote_candidates: Vec<RTCIceCandidateInit>,

    gatherer: Gatherer,
    agent: Agent,

    handlers: Vec<OnEventHdlrFn>,
    events: VecDeque<RTCPeerConnectionEvent>,
}

impl RTCPeerConnection {
    /// creates a PeerConnection with RTCConfiguration, failing if any ICE
    /// server is invalid
    pub fn new(configuration: RTCConfiguration, role: EndpointRole) -> Result<Self> {
        configuration.validate()?;
        let urls = configuration.get_ice_urls()?;

        let setting_engine = &configuration.setting_engine;
        let ufrag = if setting_engine.ice_username_fragment.is_empty() {
            generate_ufrag()
        } else {
            setting_engine.ice_username_fragment.clone()
        };
        let pwd = if setting_engine.ice_password.is_empty() {
            generate_pwd()
        } else {
            setting_engine.ice_password.clone()
        };

        let name = role.to_string();
        let gatherer = Gatherer::new(name.clone(), role.octet(), urls, setting_engine);
        let agent = Agent::new(name, ufrag, pwd, setting_engine);

        log::debug!(
            "[{role}]: created endpoint with {} ice servers",
            configuration.ice_servers.len()
        );

        Ok(Self {
            role,
            configuration,

            local_description: None,
            current_local_description: None,
            remote_description: None,
            current_remote_description: None,
            remote_credentials: None,

            signaling_state: RTCSignalingState::Stable,
            ice_gathering_state: RTCIceGatheringState::New,
            ice_connection_state: RTCIceConnectionState::New,
            peer_connection_state: RTCPeerConnectionState::New,
            is_closed: false,

            sdp_session_id: rand::random::<u64>() & (i64::MAX as u64),
            sdp_session_version: 0,
            last_offer: None,
            last_answer: None,

            tracks: vec![],
            local_candidates: vec![],
            remote_candidates: vec![],
            pending_remote_candidates: vec![],

            gatherer,
            agent,

            handlers: vec![],
            events: VecDeque::new(),
        })
    }

    /// Registers an event observer. While no observer is registered, events
    /// are buffered for [`poll_event`](Protocol::poll_event).
    pub fn on_event(&mut self, handler: OnEventHdlrFn) {
        self.handlers.push(handler);
    }

    fn emit(&mut self, event: RTCPeerConnectionEvent) {
        if self.handlers.is_empty() {
            self.events.push_back(event);
        } else {
            for handler in self.handlers.iter_mut() {
                handler(&event);
            }
        }
    }

    /// Attaches a local media track. Adding the same track twice does
    /// nothing.
    pub fn add_track(&mut self, track: MediaStreamTrack) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        if self.tracks.iter().any(|t| t == &track) {
            return Ok(());
        }
        log::debug!(
            "[{}]: add {} track {}",
            self.role,
            track.kind(),
            track.track_id()
        );
        self.tracks.push(track);
        Ok(())
    }

    fn section_tracks(&self, kind: MediaStreamTrackKind) -> Vec<(String, String)> {
        self.tracks
            .iter()
            .filter(|track| track.kind() == kind)
            .map(|track| (track.stream_id().to_owned(), track.track_id().clone()))
            .collect()
    }

    fn populate(
        &mut self,
        sdp_type: RTCSdpType,
        connection_role: ConnectionRole,
        sections: &[MediaSection],
    ) -> RTCSessionDescription {
        self.sdp_session_version += 1;
        let (ufrag, pwd) = self.agent.get_local_user_credentials();
        let params = PopulateSdpParams {
            session_id: self.sdp_session_id,
            session_version: self.sdp_session_version,
            ice_ufrag: ufrag,
            ice_pwd: pwd,
            connection_role,
            trickle: self.configuration.setting_engine.trickle(),
        };
        RTCSessionDescription::from_parsed(sdp_type, populate_sdp(&params, sections))
    }

    /// create_offer starts the PeerConnection and generates the localDescription
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-createoffer>
    pub fn create_offer(&mut self) -> Result<RTCSessionDescription> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        if self.local_description.is_some() {
            return Err(Error::ErrLocalDescriptionAlreadySet);
        }

        let mut sections = vec![];
        for kind in [MediaStreamTrackKind::Audio, MediaStreamTrackKind::Video] {
            let tracks = self.section_tracks(kind);
            if !tracks.is_empty() {
                sections.push(MediaSection {
                    mid: sections.len().to_string(),
                    kind: if kind == MediaStreamTrackKind::Audio {
                        MediaSectionKind::Audio
                    } else {
                        MediaSectionKind::Video
                    },
                    tracks,
                });
            }
        }
        sections.push(MediaSection {
            mid: sections.len().to_string(),
            kind: MediaSectionKind::Application,
            tracks: vec![],
        });

        let offer = self.populate(RTCSdpType::Offer, ConnectionRole::Actpass, &sections);
        log::debug!(
            "[{}]: created offer with {} media sections",
            self.role,
            sections.len()
        );
        self.last_offer = Some(offer.clone());
        Ok(offer)
    }

    /// create_answer starts the PeerConnection and generates the localDescription
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-createanswer>
    pub fn create_answer(&mut self) -> Result<RTCSessionDescription> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        let Some(remote_description) = &self.remote_description else {
            return Err(Error::ErrNoRemoteDescription);
        };
        if self.signaling_state != RTCSignalingState::HaveRemoteOffer {
            return Err(Error::ErrIncorrectSignalingState);
        }

        let parsed = remote_description.parsed()?;
        if parsed.media_descriptions.is_empty() {
            return Err(Error::ErrNoMediaSections);
        }

        let mut audio_used = false;
        let mut video_used = false;
        let mut sections = vec![];
        for (index, media) in parsed.media_descriptions.iter().enumerate() {
            let mid = media
                .attribute(sdp::description::ATTR_KEY_MID)
                .map_or_else(|| index.to_string(), str::to_owned);
            let kind = MediaSectionKind::from_media(media);
            let tracks = match kind {
                MediaSectionKind::Audio if !audio_used => {
                    audio_used = true;
                    self.section_tracks(MediaStreamTrackKind::Audio)
                }
                MediaSectionKind::Video if !video_used => {
                    video_used = true;
                    self.section_tracks(MediaStreamTrackKind::Video)
                }
                _ => vec![],
            };
            sections.push(MediaSection { mid, kind, tracks });
        }

        let answer = self.populate(RTCSdpType::Answer, ConnectionRole::Active, &sections);
        log::debug!(
            "[{}]: created answer with {} media sections",
            self.role,
            sections.len()
        );
        self.last_answer = Some(answer.clone());
        Ok(answer)
    }

    /// set_local_description sets the SessionDescription of the local peer
    /// and starts gathering candidates. An empty `sdp` stands for the last
    /// offer or answer this endpoint created.
    pub fn set_local_description(&mut self, mut description: RTCSessionDescription) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        if description.sdp.is_empty() {
            let last = match description.sdp_type {
                RTCSdpType::Offer => self.last_offer.clone(),
                RTCSdpType::Answer => self.last_answer.clone(),
                RTCSdpType::Unspecified => None,
            };
            description = last.ok_or(Error::ErrNoPendingDescription)?;
        }
        if description.parsed.is_none() {
            description.parsed = Some(description.unmarshal()?);
        }

        let next_state = next_signaling_state(
            self.signaling_state,
            StateChangeOp::SetLocal,
            description.sdp_type,
        )?;

        let sdp_type = description.sdp_type;
        self.local_description = Some(description);
        if next_state == RTCSignalingState::Stable {
            self.current_local_description = self.local_description.clone();
            self.current_remote_description = self.remote_description.clone();
        }
        self.update_signaling_state(next_state);

        if self.gatherer.gather(Instant::now()) {
            self.update_ice_gathering_state(RTCIceGatheringState::Gathering);
        }

        if sdp_type == RTCSdpType::Answer {
            self.start_transports(false)?;
        }
        Ok(())
    }

    /// set_remote_description sets the SessionDescription of the remote peer,
    /// applies the candidates it carries and then any candidates that arrived
    /// ahead of it.
    pub fn set_remote_description(&mut self, mut description: RTCSessionDescription) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        let parsed = description.parsed()?;
        let next_state = next_signaling_state(
            self.signaling_state,
            StateChangeOp::SetRemote,
            description.sdp_type,
        )?;

        let (remote_ufrag, remote_pwd) = match parsed.ice_credentials() {
            (None, _) | (Some(""), _) => return Err(Error::ErrRemoteUfragEmpty),
            (_, None) | (_, Some("")) => return Err(Error::ErrRemotePwdEmpty),
            (Some(ufrag), Some(pwd)) => (ufrag.to_owned(), pwd.to_owned()),
        };
        if parsed.media_descriptions.is_empty() {
            return Err(Error::ErrNoMediaSections);
        }

        let sdp_type = description.sdp_type;
        description.parsed = Some(parsed.clone());
        self.remote_description = Some(description);
        self.remote_credentials = Some((remote_ufrag, remote_pwd));
        if next_state == RTCSignalingState::Stable {
            self.current_local_description = self.local_description.clone();
            self.current_remote_description = self.remote_description.clone();
        }
        self.update_signaling_state(next_state);

        for (_, _, raw) in parsed.candidates() {
            match unmarshal_candidate(&raw) {
                Ok(candidate) => self.apply_remote_candidate(candidate)?,
                Err(err) => log::warn!(
                    "[{}]: skip unparsable candidate in remote description: {err}",
                    self.role
                ),
            }
        }
        if parsed
            .media_descriptions
            .iter()
            .any(|media| media.has_attribute(ATTR_KEY_END_OF_CANDIDATES))
        {
            self.agent.set_remote_end_of_candidates();
            self.drain_agent_events();
        }

        let pending = std::mem::take(&mut self.pending_remote_candidates);
        if !pending.is_empty() {
            log::debug!(
                "[{}]: applying {} queued remote candidates",
                self.role,
                pending.len()
            );
        }
        for init in pending {
            if let Err(err) = self.add_ice_candidate(init) {
                log::warn!("[{}]: drop queued remote candidate: {err}", self.role);
            }
        }

        if sdp_type == RTCSdpType::Answer {
            self.start_transports(true)?;
        }
        Ok(())
    }

    fn start_transports(&mut self, is_controlling: bool) -> Result<()> {
        let Some((remote_ufrag, remote_pwd)) = self.remote_credentials.clone() else {
            return Err(Error::ErrNoRemoteDescription);
        };
        self.agent.start_connectivity_checks(
            is_controlling,
            remote_ufrag,
            remote_pwd,
            Instant::now(),
        )?;
        self.drain_agent_events();
        Ok(())
    }

    /// Accepts a remote candidate. Before the remote description is set the
    /// candidate is queued; an empty candidate marks the end of the remote
    /// candidates.
    pub fn add_ice_candidate(&mut self, candidate: RTCIceCandidateInit) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        if candidate.is_end_of_candidates() {
            if self.remote_description.is_none() {
                self.pending_remote_candidates.push(candidate);
            } else {
                self.agent.set_remote_end_of_candidates();
                self.drain_agent_events();
            }
            return Ok(());
        }

        let parsed = unmarshal_candidate(&candidate.candidate)?;

        let Some((remote_ufrag, _)) = &self.remote_credentials else {
            log::debug!(
                "[{}]: queue remote candidate {parsed} until the remote description is set",
                self.role
            );
            self.pending_remote_candidates.push(candidate);
            return Ok(());
        };
        if let Some(ufrag) = candidate.username_fragment.as_deref() {
            if !ufrag.is_empty() && ufrag != remote_ufrag {
                return Err(Error::ErrCandidateUfragMismatch(ufrag.to_owned()));
            }
        }

        self.apply_remote_candidate(parsed)
    }

    fn apply_remote_candidate(&mut self, candidate: RTCIceCandidate) -> Result<()> {
        if self.agent.add_remote_candidate(candidate.clone())? {
            log::trace!("[{}]: add remote candidate {candidate}", self.role);
            self.remote_candidates.push(candidate);
        }
        self.drain_agent_events();
        Ok(())
    }

    /// Closes the endpoint. Every state moves to closed and track references
    /// are released; closing twice does nothing.
    pub fn close(&mut self) -> Result<()> {
        self.do_close()
    }

    fn do_close(&mut self) -> Result<()> {
        if self.is_closed {
            return Ok(());
        }
        log::debug!("[{}]: closing", self.role);
        self.is_closed = true;

        self.gatherer.close();
        self.agent.close()?;
        self.pending_remote_candidates.clear();
        self.tracks.clear();

        self.update_signaling_state(RTCSignalingState::Closed);
        self.drain_agent_events();
        self.update_ice_connection_state(RTCIceConnectionState::Closed);
        Ok(())
    }

    fn drain_agent_events(&mut self) {
        while let Some(state) = self.agent.poll_event() {
            self.update_ice_connection_state(state);
        }
    }

    fn update_signaling_state(&mut self, new_state: RTCSignalingState) {
        if self.signaling_state != new_state {
            log::debug!(
                "[{}]: signaling state changed to {}",
                self.role,
                new_state
            );
            self.signaling_state = new_state;
            self.emit(RTCPeerConnectionEvent::OnSignalingStateChangeEvent(
                new_state,
            ));
        }
    }

    fn update_ice_gathering_state(&mut self, new_state: RTCIceGatheringState) {
        if self.ice_gathering_state != new_state {
            log::debug!(
                "[{}]: ICE gathering state changed to {}",
                self.role,
                new_state
            );
            self.ice_gathering_state = new_state;
            self.emit(RTCPeerConnectionEvent::OnIceGatheringStateChangeEvent(
                new_state,
            ));
        }
    }

    fn update_ice_connection_state(&mut self, new_state: RTCIceConnectionState) {
        if !self.ice_connection_state.can_transition_to(new_state) {
            return;
        }
        log::info!(
            "[{}]: ICE connection state changed: {}",
            self.role,
            new_state
        );
        self.ice_connection_state = new_state;
        self.emit(RTCPeerConnectionEvent::OnIceConnectionStateChangeEvent(
            new_state,
        ));

        self.update_connection_state(RTCPeerConnectionState::from_ice(new_state));
    }

    fn update_connection_state(&mut self, new_state: RTCPeerConnectionState) {
        if !self.peer_connection_state.can_transition_to(new_state) {
            return;
        }
        log::info!(
            "[{}]: peer connection state changed: {}",
            self.role,
            new_state
        );
        self.peer_connection_state = new_state;
        self.emit(RTCPeerConnectionEvent::OnConnectionStateChangeEvent(
            new_state,
        ));
    }

    fn handle_gatherer_events(&mut self) -> Result<()> {
        while let Some(event) = self.gatherer.poll_event() {
            let username_fragment = self.agent.get_local_user_credentials().0.to_owned();
            match event {
                GathererEvent::Candidate(candidate) => {
                    if !self.agent.add_local_candidate(candidate.clone())? {
                        continue;
                    }
                    self.local_candidates.push(candidate.clone());
                    self.drain_agent_events();
                    self.emit(RTCPeerConnectionEvent::OnIceCandidateEvent(
                        RTCPeerConnectionIceEvent {
                            url: candidate.url.clone().unwrap_or_default(),
                            candidate: Some(candidate),
                            username_fragment,
                        },
                    ));
                }
                GathererEvent::Complete => {
                    self.update_ice_gathering_state(RTCIceGatheringState::Complete);
                    self.agent.set_local_gathering_complete();
                    self.drain_agent_events();
                    self.emit(RTCPeerConnectionEvent::OnIceCandidateEvent(
                        RTCPeerConnectionIceEvent {
                            candidate: None,
                            url: String::new(),
                            username_fragment,
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    pub fn get_configuration(&self) -> &RTCConfiguration {
        &self.configuration
    }

    /// The local description, including every candidate gathered so far.
    pub fn local_description(&self) -> Option<RTCSessionDescription> {
        let description = self.local_description.as_ref()?;
        let Ok(mut parsed) = description.parsed() else {
            return Some(description.clone());
        };
        let candidates: Vec<String> = self
            .local_candidates
            .iter()
            .map(RTCIceCandidate::marshal)
            .collect();
        populate_local_candidates(
            &mut parsed,
            &candidates,
            self.ice_gathering_state == RTCIceGatheringState::Complete,
        );
        Some(RTCSessionDescription::from_parsed(
            description.sdp_type,
            parsed,
        ))
    }

    /// The local description exactly as it was set.
    pub fn pending_local_description(&self) -> Option<&RTCSessionDescription> {
        self.local_description.as_ref()
    }

    /// The local description of the last completed offer/answer exchange.
    pub fn current_local_description(&self) -> Option<&RTCSessionDescription> {
        self.current_local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&RTCSessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn current_remote_description(&self) -> Option<&RTCSessionDescription> {
        self.current_remote_description.as_ref()
    }

    pub fn local_description_set(&self) -> bool {
        self.local_description.is_some()
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description.is_some()
    }

    pub fn signaling_state(&self) -> RTCSignalingState {
        self.signaling_state
    }

    pub fn ice_gathering_state(&self) -> RTCIceGatheringState {
        self.ice_gathering_state
    }

    pub fn ice_connection_state(&self) -> RTCIceConnectionState {
        self.ice_connection_state
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.peer_connection_state
    }

    /// Gathered candidates in discovery order.
    pub fn local_candidates(&self) -> &[RTCIceCandidate] {
        &self.local_candidates
    }

    /// Signaled remote candidates in the order they were applied.
    pub fn remote_candidates(&self) -> &[RTCIceCandidate] {
        &self.remote_candidates
    }

    /// Remote candidates waiting for the remote description.
    pub fn pending_remote_candidate_count(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    pub fn tracks(&self) -> &[MediaStreamTrack] {
        &self.tracks
    }

    /// `(local, remote)` candidates of the selected pair, once connected.
    pub fn selected_candidate_pair(&self) -> Option<(RTCIceCandidate, RTCIceCandidate)> {
        self.agent
            .get_selected_candidate_pair()
            .map(|(local, remote)| (local.clone(), remote.clone()))
    }

    pub fn is_ice_controlling(&self) -> bool {
        self.agent.is_controlling()
    }
}

impl Protocol<TaggedBytesMut, (), ()> for RTCPeerConnection {
    type Rout = ();
    type Wout = TaggedBytesMut;
    type Eout = RTCPeerConnectionEvent;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.is_closed {
            return Ok(());
        }
        self.agent.handle_read(msg)?;
        self.drain_agent_events();
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.agent.poll_write()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<()> {
        if self.is_closed {
            return Ok(());
        }
        self.gatherer.handle_timeout(now);
        self.handle_gatherer_events()?;
        self.agent.handle_timeout(now)?;
        self.drain_agent_events();
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        if self.is_closed {
            return None;
        }
        match (self.gatherer.poll_timeout(), self.agent.poll_timeout()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.do_close()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::media_stream::MediaStreamTrack;
    use crate::peer_connection::configuration::RTCConfigurationBuilder;
    use crate::peer_connection::transport::ice::RTCIceCandidateType;

    fn endpoint(role: EndpointRole) -> RTCPeerConnection {
        RTCPeerConnection::new(RTCConfigurationBuilder::new().build(), role).expect("endpoint")
    }

    fn negotiate(local: &mut RTCPeerConnection, remote: &mut RTCPeerConnection) {
        let offer = local.create_offer().expect("offer");
        local.set_local_description(offer.clone()).expect("local offer");
        remote.set_remote_description(offer).expect("remote offer");
        let answer = remote.create_answer().expect("answer");
        remote
            .set_local_description(answer.clone())
            .expect("local answer");
        local.set_remote_description(answer).expect("remote answer");
    }

    fn received(mut t: TaggedBytesMut) -> TaggedBytesMut {
        std::mem::swap(&mut t.transport.local_addr, &mut t.transport.peer_addr);
        t
    }

    /// Forwards candidates and datagrams from `from` to `to`.
    fn forward(from: &mut RTCPeerConnection, to: &mut RTCPeerConnection) {
        while let Some(event) = from.poll_event() {
            if let RTCPeerConnectionEvent::OnIceCandidateEvent(ice_event) = event {
                to.add_ice_candidate(ice_event.to_init())
                    .expect("add candidate");
            }
        }
        while let Some(t) = from.poll_write() {
            to.handle_read(received(t)).expect("read");
        }
    }

    fn run(local: &mut RTCPeerConnection, remote: &mut RTCPeerConnection, start: Instant) {
        for i in 0..200u64 {
            let now = start + Duration::from_millis(10 * i);
            local.handle_timeout(now).expect("timeout");
            remote.handle_timeout(now).expect("timeout");
            forward(local, remote);
            forward(remote, local);
            if local.ice_connection_state() == RTCIceConnectionState::Completed
                && remote.ice_connection_state() == RTCIceConnectionState::Connected
            {
                return;
            }
        }
    }

    #[test]
    fn test_endpoint_role() {
        let tests = vec![
            (EndpointRole::Local, "local", 1, EndpointRole::Remote),
            (EndpointRole::Remote, "remote", 2, EndpointRole::Local),
        ];

        for (role, expected_string, expected_octet, expected_peer) in tests {
            assert_eq!(role.to_string(), expected_string);
            assert_eq!(role.octet(), expected_octet);
            assert_eq!(role.peer(), expected_peer);
        }
    }

    #[test]
    fn test_offer_answer_signaling_states() {
        let mut local = endpoint(EndpointRole::Local);
        let mut remote = endpoint(EndpointRole::Remote);

        let offer = local.create_offer().expect("offer");
        assert_eq!(offer.sdp_type, RTCSdpType::Offer);
        local.set_local_description(offer.clone()).expect("local offer");
        assert_eq!(local.signaling_state(), RTCSignalingState::HaveLocalOffer);
        assert!(local.current_local_description().is_none());

        remote.set_remote_description(offer).expect("remote offer");
        assert_eq!(remote.signaling_state(), RTCSignalingState::HaveRemoteOffer);

        let answer = remote.create_answer().expect("answer");
        assert_eq!(answer.sdp_type, RTCSdpType::Answer);
        remote
            .set_local_description(answer.clone())
            .expect("local answer");
        local.set_remote_description(answer).expect("remote answer");

        for endpoint in [&local, &remote] {
            assert_eq!(endpoint.signaling_state(), RTCSignalingState::Stable);
            assert!(endpoint.local_description_set());
            assert!(endpoint.remote_description_set());
            assert!(endpoint.current_local_description().is_some());
            assert!(endpoint.current_remote_description().is_some());
        }
        assert!(local.is_ice_controlling());
        assert!(!remote.is_ice_controlling());
    }

    #[test]
    fn test_offer_sections_follow_tracks() {
        let tests = vec![
            (vec![], vec!["application"]),
            (vec![MediaStreamTrackKind::Audio], vec!["audio", "application"]),
            (
                vec![MediaStreamTrackKind::Video, MediaStreamTrackKind::Audio],
                vec!["audio", "video", "application"],
            ),
        ];

        for (kinds, expected) in tests {
            let mut local = endpoint(EndpointRole::Local);
            for (i, kind) in kinds.iter().enumerate() {
                local
                    .add_track(MediaStreamTrack::new(
                        "stream".to_owned(),
                        format!("track-{i}"),
                        *kind,
                        format!("{kind} {i}"),
                    ))
                    .expect("add track");
            }
            let offer = local.create_offer().expect("offer");
            let parsed = offer.parsed().expect("parsed");
            let media: Vec<&str> = parsed
                .media_descriptions
                .iter()
                .map(|m| m.media.as_str())
                .collect();
            assert_eq!(media, expected, "testCase: {kinds:?}");
        }
    }

    #[test]
    fn test_negotiation_errors() {
        let mut fresh = endpoint(EndpointRole::Remote);
        assert_eq!(fresh.create_answer(), Err(Error::ErrNoRemoteDescription));
        assert_eq!(
            fresh.set_local_description(RTCSessionDescription {
                sdp_type: RTCSdpType::Answer,
                ..Default::default()
            }),
            Err(Error::ErrNoPendingDescription)
        );

        let mut local = endpoint(EndpointRole::Local);
        let offer = local.create_offer().expect("offer");
        local.set_local_description(offer.clone()).expect("local offer");
        assert_eq!(local.create_offer(), Err(Error::ErrLocalDescriptionAlreadySet));

        let answer_typed = RTCSessionDescription {
            sdp_type: RTCSdpType::Answer,
            sdp: offer.sdp.clone(),
            parsed: None,
        };
        assert!(matches!(
            fresh.set_remote_description(answer_typed),
            Err(Error::ErrSignalingStateProposedTransitionInvalid(_))
        ));

        let no_credentials = RTCSessionDescription::offer(
            "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n".to_owned(),
        )
        .expect("offer");
        assert_eq!(
            fresh.set_remote_description(no_credentials),
            Err(Error::ErrRemoteUfragEmpty)
        );
        assert_eq!(fresh.signaling_state(), RTCSignalingState::Stable);
    }

    #[test]
    fn test_set_local_description_with_empty_sdp_uses_last_offer() {
        let mut local = endpoint(EndpointRole::Local);
        let offer = local.create_offer().expect("offer");
        local
            .set_local_description(RTCSessionDescription {
                sdp_type: RTCSdpType::Offer,
                ..Default::default()
            })
            .expect("implicit offer");
        assert_eq!(local.pending_local_description(), Some(&offer));
    }

    #[test]
    fn test_remote_candidates_queue_until_remote_description() {
        let mut local = endpoint(EndpointRole::Local);
        let mut remote = endpoint(EndpointRole::Remote);
        let offer = local.create_offer().expect("offer");
        local.set_local_description(offer.clone()).expect("local offer");

        let (ufrag, _) = local.agent.get_local_user_credentials();
        let mut init = RTCIceCandidate::new(
            RTCIceCandidateType::Host,
            "10.0.0.1:50000".parse().expect("addr"),
            None,
            None,
        )
        .to_json();
        init.username_fragment = Some(ufrag.to_owned());

        remote.add_ice_candidate(init.clone()).expect("queued");
        remote
            .add_ice_candidate(RTCIceCandidateInit::default())
            .expect("queued end");
        assert_eq!(remote.pending_remote_candidate_count(), 2);
        assert!(remote.remote_candidates().is_empty());

        remote.set_remote_description(offer).expect("remote offer");
        assert_eq!(remote.pending_remote_candidate_count(), 0);
        assert_eq!(remote.remote_candidates().len(), 1);
        assert_eq!(remote.remote_candidates()[0].address, "10.0.0.1");

        // duplicates are ignored
        remote.add_ice_candidate(init.clone()).expect("duplicate");
        assert_eq!(remote.remote_candidates().len(), 1);

        init.username_fragment = Some("someone-else".to_owned());
        assert_eq!(
            remote.add_ice_candidate(init),
            Err(Error::ErrCandidateUfragMismatch("someone-else".to_owned()))
        );

        assert!(matches!(
            remote.add_ice_candidate(RTCIceCandidateInit {
                candidate: "candidate:garbage".to_owned(),
                ..Default::default()
            }),
            Err(Error::ErrAttributeTooShortIceCandidate(_))
        ));
    }

    #[test]
    fn test_endpoints_connect() {
        env_logger::builder().is_test(true).try_init().ok();

        let start = Instant::now();
        let mut local = endpoint(EndpointRole::Local);
        let mut remote = endpoint(EndpointRole::Remote);
        negotiate(&mut local, &mut remote);
        run(&mut local, &mut remote, start);

        assert_eq!(
            local.ice_connection_state(),
            RTCIceConnectionState::Completed
        );
        assert_eq!(
            remote.ice_connection_state(),
            RTCIceConnectionState::Connected
        );
        assert_eq!(local.connection_state(), RTCPeerConnectionState::Connected);
        assert_eq!(remote.connection_state(), RTCPeerConnectionState::Connected);
        for endpoint in [&local, &remote] {
            assert_eq!(
                endpoint.ice_gathering_state(),
                RTCIceGatheringState::Complete
            );
            assert_eq!(endpoint.local_candidates().len(), 1);
            assert_eq!(endpoint.remote_candidates().len(), 1);
        }

        let (selected_local, selected_remote) =
            local.selected_candidate_pair().expect("selected pair");
        assert_eq!(selected_local.address, "10.0.0.1");
        assert_eq!(selected_remote.address, "10.0.0.2");

        let description = local.local_description().expect("local description");
        assert!(description.sdp.contains("a=candidate:"));
        assert!(description.sdp.contains("a=end-of-candidates"));
    }

    #[test]
    fn test_event_handlers_run_in_order() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut local = endpoint(EndpointRole::Local);
        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            local.on_event(Box::new(move |event| {
                if let RTCPeerConnectionEvent::OnSignalingStateChangeEvent(state) = event {
                    seen.lock().expect("lock").push((name, *state));
                }
            }));
        }

        let offer = local.create_offer().expect("offer");
        local.set_local_description(offer).expect("local offer");

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![
                ("first", RTCSignalingState::HaveLocalOffer),
                ("second", RTCSignalingState::HaveLocalOffer),
            ]
        );
        assert!(local.poll_event().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut local = endpoint(EndpointRole::Local);
        local
            .add_track(MediaStreamTrack::new(
                "stream".to_owned(),
                "audio".to_owned(),
                MediaStreamTrackKind::Audio,
                "mic".to_owned(),
            ))
            .expect("add track");
        let offer = local.create_offer().expect("offer");
        local.set_local_description(offer).expect("local offer");

        local.close().expect("close");
        local.close().expect("close twice");

        assert_eq!(local.signaling_state(), RTCSignalingState::Closed);
        assert_eq!(local.ice_connection_state(), RTCIceConnectionState::Closed);
        assert_eq!(local.connection_state(), RTCPeerConnectionState::Closed);
        assert!(local.tracks().is_empty());
        assert_eq!(local.poll_timeout(), None);
        assert_eq!(local.create_offer(), Err(Error::ErrConnectionClosed));
        assert_eq!(
            local.add_ice_candidate(RTCIceCandidateInit::default()),
            Err(Error::ErrConnectionClosed)
        );

        let closed_events = std::iter::from_fn(|| local.poll_event())
            .filter(|event| {
                matches!(
                    event,
                    RTCPeerConnectionEvent::OnConnectionStateChangeEvent(
                        RTCPeerConnectionState::Closed
                    )
                )
            })
            .count();
        assert_eq!(closed_events, 1);
    }
}
