use super::UNSPECIFIED_STR;
use serde::Serialize;
use std::fmt;

/// Indicates the state of the ICE connection.
///
/// The agent starts in `New`, moves to `Checking` once it has a remote
/// candidate, remote credentials and a local candidate to pair, and reaches
/// `Connected` when the first binding check succeeds. The controlling agent
/// moves on to `Completed` once every pair has been resolved.
///
/// ## Specifications
///
/// * [W3C]
///
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-peerconnection-ice-connection-state
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum RTCIceConnectionState {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,

    /// Waiting for remote candidates or credentials.
    #[serde(rename = "new")]
    New,

    /// Candidate pairs are being checked.
    #[serde(rename = "checking")]
    Checking,

    /// At least one candidate pair succeeded.
    #[serde(rename = "connected")]
    Connected,

    /// Every candidate pair has been resolved and one of them succeeded.
    #[serde(rename = "completed")]
    Completed,

    /// Connectivity was lost after being established.
    #[serde(rename = "disconnected")]
    Disconnected,

    /// Every candidate pair failed.
    #[serde(rename = "failed")]
    Failed,

    /// The endpoint has been closed.
    #[serde(rename = "closed")]
    Closed,
}

const ICE_CONNECTION_STATE_NEW_STR: &str = "new";
const ICE_CONNECTION_STATE_CHECKING_STR: &str = "checking";
const ICE_CONNECTION_STATE_CONNECTED_STR: &str = "connected";
const ICE_CONNECTION_STATE_COMPLETED_STR: &str = "completed";
const ICE_CONNECTION_STATE_DISCONNECTED_STR: &str = "disconnected";
const ICE_CONNECTION_STATE_FAILED_STR: &str = "failed";
const ICE_CONNECTION_STATE_CLOSED_STR: &str = "closed";

/// takes a string and converts it to iceconnection_state
impl From<&str> for RTCIceConnectionState {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_CONNECTION_STATE_NEW_STR => RTCIceConnectionState::New,
            ICE_CONNECTION_STATE_CHECKING_STR => RTCIceConnectionState::Checking,
            ICE_CONNECTION_STATE_CONNECTED_STR => RTCIceConnectionState::Connected,
            ICE_CONNECTION_STATE_COMPLETED_STR => RTCIceConnectionState::Completed,
            ICE_CONNECTION_STATE_DISCONNECTED_STR => RTCIceConnectionState::Disconnected,
            ICE_CONNECTION_STATE_FAILED_STR => RTCIceConnectionState::Failed,
            ICE_CONNECTION_STATE_CLOSED_STR => RTCIceConnectionState::Closed,
            _ => RTCIceConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCIceConnectionState::New => ICE_CONNECTION_STATE_NEW_STR,
            RTCIceConnectionState::Checking => ICE_CONNECTION_STATE_CHECKING_STR,
            RTCIceConnectionState::Connected => ICE_CONNECTION_STATE_CONNECTED_STR,
            RTCIceConnectionState::Completed => ICE_CONNECTION_STATE_COMPLETED_STR,
            RTCIceConnectionState::Disconnected => ICE_CONNECTION_STATE_DISCONNECTED_STR,
            RTCIceConnectionState::Failed => ICE_CONNECTION_STATE_FAILED_STR,
            RTCIceConnectionState::Closed => ICE_CONNECTION_STATE_CLOSED_STR,
            RTCIceConnectionState::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RTCIceConnectionState {
    /// `connected` or `completed`: a usable pair exists.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            RTCIceConnectionState::Connected | RTCIceConnectionState::Completed
        )
    }

    pub(crate) fn can_transition_to(self, next: RTCIceConnectionState) -> bool {
        if self == next || next == RTCIceConnectionState::Unspecified {
            return false;
        }
        match self {
            RTCIceConnectionState::Closed => false,
            RTCIceConnectionState::Failed => next == RTCIceConnectionState::Closed,
            RTCIceConnectionState::Unspecified => true,
            RTCIceConnectionState::New | RTCIceConnectionState::Checking => {
                next != RTCIceConnectionState::New
            }
            // once connected, never back to new or checking
            RTCIceConnectionState::Connected | RTCIceConnectionState::Disconnected => !matches!(
                next,
                RTCIceConnectionState::New | RTCIceConnectionState::Checking
            ),
            RTCIceConnectionState::Completed => matches!(
                next,
                RTCIceConnectionState::Disconnected
                    | RTCIceConnectionState::Failed
                    | RTCIceConnectionState::Closed
            ),
        }
    }
}
