//! The caller-owned connection proof.
//!
//! [`ConnectionProof::start`] runs the whole sequence: capability check,
//! optional media acquisition, endpoint creation, handler registration,
//! description exchange and monitoring. [`ConnectionProof::cleanup`] tears
//! everything down again and may be called at any time.
//!
//! ```no_run
//! use rtc_proof::platform::SimulatedPlatform;
//! use rtc_proof::proof::{ConnectionProof, ProofConfiguration};
//!
//! # async fn run() -> rtc_proof::Result<()> {
//! let mut proof = ConnectionProof::new(
//!     ProofConfiguration::default(),
//!     Box::new(SimulatedPlatform::new()),
//! );
//! let result = proof.start().await?;
//! println!("{result}");
//! proof.cleanup();
//! # Ok(())
//! # }
//! ```

pub mod configuration;
pub mod report;

use std::fmt;

use crate::capability::CapabilityProbe;
use crate::error::Result;
use crate::media_stream::{MediaStream, MediaStreamTrack};
use crate::platform::{MediaAcquirer, Platform, SimulatedPlatform};
use crate::session::NegotiationSession;

pub use configuration::{ProofConfiguration, ProofConfigurationBuilder};
pub use report::ProofResult;

/// Progress of a proof run. `Proven`, `TimedOut` and `Failed` are terminal
/// until [`ConnectionProof::cleanup`].
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProofState {
    #[default]
    Idle,
    CapabilityChecked,
    MediaAcquired,
    EndpointsCreated,
    HandlersAttached,
    DescriptionsExchanged,
    Monitoring,
    Proven,
    TimedOut,
    Failed,
}

impl ProofState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProofState::Proven | ProofState::TimedOut | ProofState::Failed
        )
    }
}

impl fmt::Display for ProofState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ProofState::Idle => "idle",
            ProofState::CapabilityChecked => "capability-checked",
            ProofState::MediaAcquired => "media-acquired",
            ProofState::EndpointsCreated => "endpoints-created",
            ProofState::HandlersAttached => "handlers-attached",
            ProofState::DescriptionsExchanged => "descriptions-exchanged",
            ProofState::Monitoring => "monitoring",
            ProofState::Proven => "proven",
            ProofState::TimedOut => "timed-out",
            ProofState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

pub struct ConnectionProof {
    configuration: ProofConfiguration,
    platform: Box<dyn Platform>,
    state: ProofState,
    stream: Option<MediaStream>,
    session: Option<NegotiationSession>,
}

impl Default for ConnectionProof {
    fn default() -> Self {
        ConnectionProof::new(
            ProofConfiguration::default(),
            Box::new(SimulatedPlatform::new()),
        )
    }
}

impl ConnectionProof {
    pub fn new(configuration: ProofConfiguration, platform: Box<dyn Platform>) -> Self {
        Self {
            configuration,
            platform,
            state: ProofState::Idle,
            stream: None,
            session: None,
        }
    }

    pub fn state(&self) -> ProofState {
        self.state
    }

    pub fn configuration(&self) -> &ProofConfiguration {
        &self.configuration
    }

    /// The running or finished session, until cleanup.
    pub fn session(&self) -> Option<&NegotiationSession> {
        self.session.as_ref()
    }

    pub fn media_stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    /// Runs the proof. A timeout is a normal result with
    /// `connection_established == false`; only an unsupported platform or a
    /// rejected negotiation step is an error. Starting again cleans up the
    /// previous run first.
    pub async fn start(&mut self) -> Result<ProofResult> {
        if self.state != ProofState::Idle {
            self.cleanup();
        }
        log::info!("starting connection proof");

        match self.run().await {
            Ok(result) => Ok(result),
            Err(err) => {
                log::error!("proof failed in state {}: {err}", self.state);
                self.state = ProofState::Failed;
                Err(err)
            }
        }
    }

    async fn run(&mut self) -> Result<ProofResult> {
        log::info!("step 1: checking platform support");
        CapabilityProbe::new(&*self.platform).check()?;
        self.state = ProofState::CapabilityChecked;

        log::info!("step 2: getting user media");
        self.stream = MediaAcquirer::new(&mut *self.platform).acquire(&self.configuration.media);
        let tracks: Vec<MediaStreamTrack> = self
            .stream
            .as_ref()
            .map(|stream| stream.get_tracks().cloned().collect())
            .unwrap_or_default();
        self.state = ProofState::MediaAcquired;

        log::info!("step 3: creating endpoints");
        let session = self.session.insert(NegotiationSession::new(
            &self.configuration.rtc_configuration(),
            &tracks,
        )?);
        self.state = ProofState::EndpointsCreated;

        log::info!("step 4: setting up connection handlers");
        session.attach_handlers();
        self.state = ProofState::HandlersAttached;

        log::info!("step 5: exchanging descriptions");
        session.negotiate().await?;
        self.state = ProofState::DescriptionsExchanged;

        log::info!("step 6: waiting for connection establishment");
        self.state = ProofState::Monitoring;
        let outcome = session
            .monitor(
                self.configuration.poll_interval(),
                self.configuration.max_attempts(),
            )
            .await?;
        self.state = if outcome.established {
            ProofState::Proven
        } else {
            ProofState::TimedOut
        };

        let result = ProofResult::new(session, outcome, tracks.len());
        log::info!("connection proof complete: {}", result.verdict());
        Ok(result)
    }

    /// Closes both endpoints, stops acquired media and returns to
    /// [`ProofState::Idle`]. Never fails; safe to repeat and to call before
    /// [`start`](Self::start).
    pub fn cleanup(&mut self) {
        if let Some(mut session) = self.session.take() {
            log::info!("cleaning up endpoints");
            session.close();
        }
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
        if self.state != ProofState::Idle {
            log::info!("cleanup complete");
        }
        self.state = ProofState::Idle;
    }
}
