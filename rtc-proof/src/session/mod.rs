//! The two-endpoint negotiation session.
//!
//! A [`NegotiationSession`] exclusively owns a local (offering) and a remote
//! (answering) endpoint together with the in-process plumbing between them:
//! a signaling channel that carries trickled candidates and a loopback
//! network that carries connectivity checks. Handlers registered on both
//! endpoints forward every emitted candidate into the signaling channel and
//! raise the `proven` flag when an ICE connection state reports connected.

pub(crate) mod coordinator;
pub(crate) mod monitor;
pub(crate) mod network;
pub mod signaling;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use sansio::Protocol;
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::media_stream::MediaStreamTrack;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::event::RTCPeerConnectionEvent;
use crate::peer_connection::transport::ice::unmarshal_candidate;
use crate::peer_connection::{EndpointRole, RTCPeerConnection};
use network::LoopbackNetwork;

pub use coordinator::NegotiationStep;
pub use monitor::ResolvedBy;
pub(crate) use monitor::MonitorOutcome;
pub use signaling::SignalingMessage;

type Envelope = (EndpointRole, SignalingMessage);

pub struct NegotiationSession {
    local: RTCPeerConnection,
    remote: RTCPeerConnection,
    network: LoopbackNetwork,

    signaling_tx: mpsc::UnboundedSender<Envelope>,
    signaling_rx: mpsc::UnboundedReceiver<Envelope>,
    signaling_log: Vec<SignalingMessage>,

    proven_tx: Arc<watch::Sender<bool>>,
    proven_rx: watch::Receiver<bool>,

    local_candidates_emitted: Arc<AtomicUsize>,
    remote_candidates_emitted: Arc<AtomicUsize>,
    local_candidates_exchanged: usize,
    remote_candidates_exchanged: usize,

    start_time: Instant,
    closed: bool,
}

impl NegotiationSession {
    /// Creates both endpoints from the same configuration and attaches
    /// `tracks` to the local one.
    pub(crate) fn new(
        configuration: &RTCConfiguration,
        tracks: &[MediaStreamTrack],
    ) -> Result<Self> {
        let mut local = RTCPeerConnection::new(configuration.clone(), EndpointRole::Local)?;
        let remote = RTCPeerConnection::new(configuration.clone(), EndpointRole::Remote)?;
        log::info!("local and remote endpoints created");

        for track in tracks {
            local.add_track(track.clone())?;
        }
        if !tracks.is_empty() {
            log::info!("{} media tracks added to local endpoint", tracks.len());
        }

        let setting_engine = configuration.setting_engine();
        let network = LoopbackNetwork::new(
            setting_engine.network_latency(),
            setting_engine.packet_loss(),
        );
        let (signaling_tx, signaling_rx) = mpsc::unbounded_channel();
        let (proven_tx, proven_rx) = watch::channel(false);

        Ok(Self {
            local,
            remote,
            network,

            signaling_tx,
            signaling_rx,
            signaling_log: vec![],

            proven_tx: Arc::new(proven_tx),
            proven_rx,

            local_candidates_emitted: Arc::new(AtomicUsize::new(0)),
            remote_candidates_emitted: Arc::new(AtomicUsize::new(0)),
            local_candidates_exchanged: 0,
            remote_candidates_exchanged: 0,

            start_time: Instant::now(),
            closed: false,
        })
    }

    /// Registers the candidate forwarding and connection handlers on both
    /// endpoints.
    pub(crate) fn attach_handlers(&mut self) {
        for role in [EndpointRole::Local, EndpointRole::Remote] {
            let signaling_tx = self.signaling_tx.clone();
            let proven_tx = Arc::clone(&self.proven_tx);
            let emitted = Arc::clone(match role {
                EndpointRole::Local => &self.local_candidates_emitted,
                EndpointRole::Remote => &self.remote_candidates_emitted,
            });

            self.endpoint_mut(role).on_event(Box::new(move |event| match event {
                RTCPeerConnectionEvent::OnIceCandidateEvent(ice_event) => {
                    if ice_event.candidate.is_some() {
                        emitted.fetch_add(1, Ordering::SeqCst);
                    }
                    if signaling_tx
                        .send((role, SignalingMessage::Candidate(ice_event.to_init())))
                        .is_err()
                    {
                        log::warn!("[{role}]: signaling channel closed, candidate dropped");
                    }
                }
                RTCPeerConnectionEvent::OnIceConnectionStateChangeEvent(state) => {
                    log::info!("[{role}]: ICE connection state: {state}");
                    if state.is_connected() && !*proven_tx.borrow() {
                        log::info!("[{role}]: connection established");
                        proven_tx.send_replace(true);
                    }
                }
                RTCPeerConnectionEvent::OnConnectionStateChangeEvent(state) => {
                    log::info!("[{role}]: connection state: {state}");
                }
                _ => {}
            }));
        }
        log::info!("connection handlers configured");
    }

    fn endpoint_mut(&mut self, role: EndpointRole) -> &mut RTCPeerConnection {
        match role {
            EndpointRole::Local => &mut self.local,
            EndpointRole::Remote => &mut self.remote,
        }
    }

    pub fn local(&self) -> &RTCPeerConnection {
        &self.local
    }

    pub fn remote(&self) -> &RTCPeerConnection {
        &self.remote
    }

    /// Every offer, answer and candidate that crossed the signaling channel,
    /// in order.
    pub fn signaling_log(&self) -> &[SignalingMessage] {
        &self.signaling_log
    }

    /// Candidates handed to a peer's `add_ice_candidate`, both directions.
    pub fn candidates_exchanged(&self) -> usize {
        self.local_candidates_exchanged + self.remote_candidates_exchanged
    }

    /// `(local, remote)` candidates delivered to the peer.
    pub fn candidates_exchanged_by_side(&self) -> (usize, usize) {
        (
            self.local_candidates_exchanged,
            self.remote_candidates_exchanged,
        )
    }

    /// `(local, remote)` candidates emitted by the endpoints.
    pub fn candidates_emitted(&self) -> (usize, usize) {
        (
            self.local_candidates_emitted.load(Ordering::SeqCst),
            self.remote_candidates_emitted.load(Ordering::SeqCst),
        )
    }

    pub fn proven(&self) -> bool {
        *self.proven_rx.borrow()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// `(sent, dropped)` datagrams on the loopback network.
    pub fn network_stats(&self) -> (usize, usize) {
        self.network.stats()
    }

    pub(crate) fn is_established(&self) -> bool {
        self.proven()
            || self.local.connection_state()
                == crate::peer_connection::state::RTCPeerConnectionState::Connected
            || self.local.ice_connection_state().is_connected()
            || self.remote.ice_connection_state().is_connected()
    }

    /// Runs one round: fires due endpoint timers, forwards queued signaling,
    /// then moves datagrams until nothing more is due.
    pub(crate) fn drive(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let now = Instant::now();
        self.local.handle_timeout(now)?;
        self.remote.handle_timeout(now)?;
        self.route_signaling()?;

        loop {
            let mut moved = false;
            for role in [EndpointRole::Local, EndpointRole::Remote] {
                while let Some(msg) = self.endpoint_mut(role).poll_write() {
                    self.network.send(msg, now);
                    moved = true;
                }
            }
            while let Some((role, msg)) = self.network.poll_deliver(now) {
                if let Err(err) = self.endpoint_mut(role).handle_read(msg) {
                    log::warn!("[{role}]: discarded datagram: {err}");
                }
                moved = true;
            }
            self.route_signaling()?;
            if !moved {
                break;
            }
        }
        Ok(())
    }

    fn route_signaling(&mut self) -> Result<()> {
        while let Ok((from, message)) = self.signaling_rx.try_recv() {
            self.signaling_log.push(message.clone());
            let SignalingMessage::Candidate(init) = message else {
                continue;
            };

            let end_of_candidates = init.is_end_of_candidates();
            if !end_of_candidates {
                match unmarshal_candidate(&init.candidate).and_then(|c| c.addr()) {
                    Ok(addr) => self.network.bind(addr, from),
                    Err(err) => log::warn!("[{from}]: unroutable candidate: {err}"),
                }
            }

            let to = from.peer();
            self.endpoint_mut(to)
                .add_ice_candidate(init)
                .map_err(|err| err.at(NegotiationStep::AddIceCandidate))?;
            if !end_of_candidates {
                let exchanged = match from {
                    EndpointRole::Local => &mut self.local_candidates_exchanged,
                    EndpointRole::Remote => &mut self.remote_candidates_exchanged,
                };
                *exchanged += 1;
                log::debug!(
                    "ICE candidate exchanged {from} -> {to} ({})",
                    self.candidates_exchanged()
                );
            }
        }
        Ok(())
    }

    /// Earliest instant at which an endpoint or the network needs driving.
    pub(crate) fn next_timeout(&mut self) -> Option<Instant> {
        [
            self.local.poll_timeout(),
            self.remote.poll_timeout(),
            self.network.poll_timeout(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Closes both endpoints and the network. Errors are logged, never
    /// returned; closing twice does nothing.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for role in [EndpointRole::Local, EndpointRole::Remote] {
            if let Err(err) = self.endpoint_mut(role).close() {
                log::warn!("[{role}]: close failed: {err}");
            }
        }
        self.network.close();
        self.signaling_rx.close();
        self.proven_tx.send_replace(false);
        log::debug!("session closed");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::media_stream::MediaStreamTrackKind;
    use crate::peer_connection::configuration::RTCConfigurationBuilder;
    use crate::peer_connection::state::{RTCIceConnectionState, RTCSignalingState};

    fn session(tracks: &[MediaStreamTrack]) -> NegotiationSession {
        let mut session =
            NegotiationSession::new(&RTCConfigurationBuilder::new().build(), tracks)
                .expect("session");
        session.attach_handlers();
        session
    }

    #[tokio::test]
    async fn test_session_negotiates_and_connects() {
        env_logger::builder().is_test(true).try_init().ok();

        let mut session = session(&[]);
        session.negotiate().await.expect("negotiate");

        assert_eq!(session.local().signaling_state(), RTCSignalingState::Stable);
        assert_eq!(session.remote().signaling_state(), RTCSignalingState::Stable);
        assert_eq!(
            session.local().pending_local_description(),
            session.remote().remote_description()
        );
        assert_eq!(
            session.remote().pending_local_description(),
            session.local().remote_description()
        );

        let outcome = session
            .monitor(Duration::from_millis(100), 50)
            .await
            .expect("monitor");
        assert!(outcome.established);
        assert!(!outcome.timed_out);
        assert!(session.proven());
        assert!(
            session.local().ice_connection_state().is_connected()
                || session.remote().ice_connection_state().is_connected()
        );

        let (local_emitted, remote_emitted) = session.candidates_emitted();
        assert!(local_emitted >= 1 && remote_emitted >= 1);
        assert_eq!(
            session.candidates_exchanged(),
            local_emitted + remote_emitted
        );
    }

    #[tokio::test]
    async fn test_session_times_out_when_network_drops_everything() {
        let mut setting_engine =
            crate::peer_connection::configuration::setting_engine::SettingEngine::default();
        setting_engine.set_packet_loss(1.0);
        let configuration = RTCConfigurationBuilder::new()
            .with_setting_engine(setting_engine)
            .build();
        let mut session = NegotiationSession::new(&configuration, &[]).expect("session");
        session.attach_handlers();
        session.negotiate().await.expect("negotiate");

        let outcome = session
            .monitor(Duration::from_millis(10), 5)
            .await
            .expect("monitor");
        assert_eq!(
            outcome,
            MonitorOutcome {
                established: false,
                timed_out: true,
                attempts: 5,
                resolved_by: ResolvedBy::None,
            }
        );
        assert!(!session.proven());
        assert!(session.network_stats().1 > 0);
    }

    #[tokio::test]
    async fn test_session_poll_resolves_without_state_events() {
        let mut session =
            NegotiationSession::new(&RTCConfigurationBuilder::new().build(), &[]).expect("session");
        // candidates still flow, but nothing raises the proven flag
        for role in [EndpointRole::Local, EndpointRole::Remote] {
            let signaling_tx = session.signaling_tx.clone();
            session.endpoint_mut(role).on_event(Box::new(move |event| {
                if let RTCPeerConnectionEvent::OnIceCandidateEvent(ice_event) = event {
                    let message = SignalingMessage::Candidate(ice_event.to_init());
                    let _ = signaling_tx.send((role, message));
                }
            }));
        }
        session.negotiate().await.expect("negotiate");

        let outcome = session
            .monitor(Duration::from_millis(100), 50)
            .await
            .expect("monitor");
        assert!(outcome.established);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.resolved_by, ResolvedBy::Poll);
        assert!(outcome.attempts >= 1 && outcome.attempts < 50);
        assert!(!session.proven());
    }

    #[tokio::test]
    async fn test_session_state_event_cuts_polling_short() {
        let mut session = session(&[]);
        session.negotiate().await.expect("negotiate");

        let started = Instant::now();
        let outcome = session
            .monitor(Duration::from_secs(10), 50)
            .await
            .expect("monitor");
        assert_eq!(
            outcome,
            MonitorOutcome {
                established: true,
                timed_out: false,
                attempts: 1,
                resolved_by: ResolvedBy::Event,
            }
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(session.proven());
    }

    #[tokio::test]
    async fn test_session_close_is_idempotent() {
        let track = MediaStreamTrack::new(
            "stream".to_owned(),
            "track".to_owned(),
            MediaStreamTrackKind::Audio,
            "mic".to_owned(),
        );
        let mut session = session(&[track]);
        assert_eq!(session.local().tracks().len(), 1);

        session.close();
        session.close();
        assert_eq!(
            session.local().ice_connection_state(),
            RTCIceConnectionState::Closed
        );
        assert_eq!(
            session.remote().ice_connection_state(),
            RTCIceConnectionState::Closed
        );
        assert!(session.local().tracks().is_empty());
        assert!(session.drive().is_ok());
    }
}
