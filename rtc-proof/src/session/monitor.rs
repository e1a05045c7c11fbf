use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::NegotiationSession;
use crate::error::Result;

/// Which trigger settled the monitor.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedBy {
    /// An ICE connection state change reported the connection.
    Event,
    /// A poll tick sampled a connected state.
    Poll,
    /// The attempt budget ran out.
    #[default]
    None,
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ResolvedBy::Event => write!(f, "event"),
            ResolvedBy::Poll => write!(f, "poll"),
            ResolvedBy::None => write!(f, "none"),
        }
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct MonitorOutcome {
    pub(crate) established: bool,
    pub(crate) timed_out: bool,
    pub(crate) attempts: u32,
    pub(crate) resolved_by: ResolvedBy,
}

impl NegotiationSession {
    /// Waits for the connection with two triggers, whichever fires first:
    /// the proven flag raised by an ICE state handler, or a poll tick every
    /// `poll_interval` that samples the endpoint states. After `max_attempts`
    /// ticks without success the monitor gives up and reports a timeout.
    ///
    /// Endpoint timers and the network keep being driven while waiting.
    pub(crate) async fn monitor(
        &mut self,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<MonitorOutcome> {
        let mut proven = self.proven_rx.clone();
        let mut event_closed = false;
        // the first tick completes immediately, so attempt 1 samples right away
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut attempts = 0u32;

        loop {
            self.drive()?;

            let eto = self
                .next_timeout()
                .unwrap_or_else(|| Instant::now() + poll_interval);
            let delay_from_now = eto
                .checked_duration_since(Instant::now())
                .unwrap_or(Duration::from_secs(0));
            let timer = tokio::time::sleep(delay_from_now);
            tokio::pin!(timer);

            tokio::select! {
                biased;

                res = proven.wait_for(|proven| *proven), if !event_closed => {
                    if res.is_ok() {
                        log::info!("connection proven by state change after {attempts} attempts");
                        return Ok(MonitorOutcome {
                            established: true,
                            timed_out: false,
                            attempts,
                            resolved_by: ResolvedBy::Event,
                        });
                    }
                    event_closed = true;
                }
                _ = ticker.tick() => {
                    attempts += 1;
                    if self.is_established() {
                        log::info!(
                            "connection established after {}ms",
                            u128::from(attempts) * poll_interval.as_millis()
                        );
                        return Ok(MonitorOutcome {
                            established: true,
                            timed_out: false,
                            attempts,
                            resolved_by: ResolvedBy::Poll,
                        });
                    }
                    if attempts >= max_attempts {
                        log::warn!("connection timeout after {attempts} attempts, but handshake completed");
                        return Ok(MonitorOutcome {
                            established: false,
                            timed_out: true,
                            attempts,
                            resolved_by: ResolvedBy::None,
                        });
                    }
                    log::trace!("poll attempt {attempts}/{max_attempts}: not connected yet");
                }
                _ = timer.as_mut() => {}
            }
        }
    }
}
