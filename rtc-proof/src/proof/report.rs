use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::peer_connection::state::{RTCIceConnectionState, RTCPeerConnectionState};
use crate::session::{MonitorOutcome, NegotiationSession, ResolvedBy};

const VERDICT_ESTABLISHED: &str = "connection established";
const VERDICT_PENDING: &str = "handshake completed but connection pending";

/// Snapshot of a finished proof run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResult {
    pub connection_established: bool,
    pub local_connection_state: RTCPeerConnectionState,
    pub remote_connection_state: RTCPeerConnectionState,
    pub ice_connection_state: RTCIceConnectionState,
    pub remote_ice_connection_state: RTCIceConnectionState,
    pub media_track_count: usize,
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
    pub timed_out: bool,
    pub candidates_exchanged: usize,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub resolved_by: ResolvedBy,
}

impl ProofResult {
    pub(crate) fn new(
        session: &NegotiationSession,
        outcome: MonitorOutcome,
        media_track_count: usize,
    ) -> Self {
        ProofResult {
            connection_established: outcome.established,
            local_connection_state: session.local().connection_state(),
            remote_connection_state: session.remote().connection_state(),
            ice_connection_state: session.local().ice_connection_state(),
            remote_ice_connection_state: session.remote().ice_connection_state(),
            media_track_count,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            timed_out: outcome.timed_out,
            candidates_exchanged: session.candidates_exchanged(),
            attempts: outcome.attempts,
            elapsed_ms: u64::try_from(session.elapsed().as_millis()).unwrap_or(u64::MAX),
            resolved_by: outcome.resolved_by,
        }
    }

    /// One-line conclusion of the run.
    pub fn verdict(&self) -> &'static str {
        if self.connection_established
            || self.local_connection_state == RTCPeerConnectionState::Connected
        {
            VERDICT_ESTABLISHED
        } else {
            VERDICT_PENDING
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| Error::Other(err.to_string()))
    }
}

impl fmt::Display for ProofResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: [(&str, String); 12] = [
            ("connectionEstablished", self.connection_established.to_string()),
            ("localConnectionState", self.local_connection_state.to_string()),
            ("remoteConnectionState", self.remote_connection_state.to_string()),
            ("iceConnectionState", self.ice_connection_state.to_string()),
            (
                "remoteIceConnectionState",
                self.remote_ice_connection_state.to_string(),
            ),
            ("mediaTrackCount", self.media_track_count.to_string()),
            ("candidatesExchanged", self.candidates_exchanged.to_string()),
            ("attempts", self.attempts.to_string()),
            ("elapsedMs", self.elapsed_ms.to_string()),
            ("resolvedBy", self.resolved_by.to_string()),
            ("timedOut", self.timed_out.to_string()),
            ("timestamp", self.timestamp.clone()),
        ];
        let key_width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        let value_width = rows.iter().map(|(_, value)| value.len()).max().unwrap_or(0);
        let border = format!(
            "+-{}-+-{}-+",
            "-".repeat(key_width),
            "-".repeat(value_width)
        );

        writeln!(f, "PROOF SUMMARY")?;
        writeln!(f, "{border}")?;
        for (key, value) in &rows {
            writeln!(f, "| {key:<key_width$} | {value:<value_width$} |")?;
        }
        writeln!(f, "{border}")?;
        write!(f, "PROOF: {}", self.verdict())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn result(established: bool, local: RTCPeerConnectionState) -> ProofResult {
        ProofResult {
            connection_established: established,
            local_connection_state: local,
            remote_connection_state: RTCPeerConnectionState::Connected,
            ice_connection_state: RTCIceConnectionState::Completed,
            remote_ice_connection_state: RTCIceConnectionState::Connected,
            media_track_count: 2,
            timestamp: "2026-01-02T03:04:05.678Z".to_owned(),
            timed_out: !established,
            candidates_exchanged: 4,
            attempts: 1,
            elapsed_ms: 42,
            resolved_by: if established {
                ResolvedBy::Event
            } else {
                ResolvedBy::None
            },
        }
    }

    #[test]
    fn test_proof_result_verdict() {
        let tests = vec![
            (true, RTCPeerConnectionState::Connected, VERDICT_ESTABLISHED),
            (false, RTCPeerConnectionState::Connected, VERDICT_ESTABLISHED),
            (false, RTCPeerConnectionState::Connecting, VERDICT_PENDING),
        ];

        for (established, local, expected) in tests {
            let result = result(established, local);
            assert_eq!(result.verdict(), expected);
            assert!(result.to_string().ends_with(expected));
        }
    }

    #[test]
    fn test_proof_result_json() {
        let json = result(true, RTCPeerConnectionState::Connected)
            .to_json()
            .expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");

        let tests = vec![
            ("connectionEstablished", serde_json::json!(true)),
            ("localConnectionState", serde_json::json!("connected")),
            ("iceConnectionState", serde_json::json!("completed")),
            ("remoteIceConnectionState", serde_json::json!("connected")),
            ("mediaTrackCount", serde_json::json!(2)),
            ("timestamp", serde_json::json!("2026-01-02T03:04:05.678Z")),
            ("timedOut", serde_json::json!(false)),
            ("candidatesExchanged", serde_json::json!(4)),
            ("resolvedBy", serde_json::json!("event")),
        ];
        for (key, expected) in tests {
            assert_eq!(value[key], expected, "testCase: {key}");
        }
    }

    #[test]
    fn test_timestamp_format() {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let parsed = chrono::DateTime::parse_from_rfc3339(&timestamp).expect("rfc3339");
        assert!(timestamp.ends_with('Z'));
        assert_eq!(timestamp.len(), "2026-01-02T03:04:05.678Z".len());
        assert_eq!(parsed.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
