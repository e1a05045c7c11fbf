use super::UNSPECIFIED_STR;
use crate::peer_connection::state::RTCIceConnectionState;
use serde::Serialize;
use std::fmt;

/// Indicates the overall state of the peer connection.
///
/// There is no DTLS layer in the proof engine, so the aggregate state is
/// derived from the ICE connection state alone (see
/// [`RTCPeerConnectionState::from_ice`]).
///
/// ## Specifications
///
/// * [W3C]
///
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-peerconnection-connection-state
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum RTCPeerConnectionState {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,

    #[serde(rename = "new")]
    New,

    #[serde(rename = "connecting")]
    Connecting,

    #[serde(rename = "connected")]
    Connected,

    #[serde(rename = "disconnected")]
    Disconnected,

    #[serde(rename = "failed")]
    Failed,

    #[serde(rename = "closed")]
    Closed,
}

const PEER_CONNECTION_STATE_NEW_STR: &str = "new";
const PEER_CONNECTION_STATE_CONNECTING_STR: &str = "connecting";
const PEER_CONNECTION_STATE_CONNECTED_STR: &str = "connected";
const PEER_CONNECTION_STATE_DISCONNECTED_STR: &str = "disconnected";
const PEER_CONNECTION_STATE_FAILED_STR: &str = "failed";
const PEER_CONNECTION_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCPeerConnectionState {
    fn from(raw: &str) -> Self {
        match raw {
            PEER_CONNECTION_STATE_NEW_STR => RTCPeerConnectionState::New,
            PEER_CONNECTION_STATE_CONNECTING_STR => RTCPeerConnectionState::Connecting,
            PEER_CONNECTION_STATE_CONNECTED_STR => RTCPeerConnectionState::Connected,
            PEER_CONNECTION_STATE_DISCONNECTED_STR => RTCPeerConnectionState::Disconnected,
            PEER_CONNECTION_STATE_FAILED_STR => RTCPeerConnectionState::Failed,
            PEER_CONNECTION_STATE_CLOSED_STR => RTCPeerConnectionState::Closed,
            _ => RTCPeerConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for RTCPeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCPeerConnectionState::New => PEER_CONNECTION_STATE_NEW_STR,
            RTCPeerConnectionState::Connecting => PEER_CONNECTION_STATE_CONNECTING_STR,
            RTCPeerConnectionState::Connected => PEER_CONNECTION_STATE_CONNECTED_STR,
            RTCPeerConnectionState::Disconnected => PEER_CONNECTION_STATE_DISCONNECTED_STR,
            RTCPeerConnectionState::Failed => PEER_CONNECTION_STATE_FAILED_STR,
            RTCPeerConnectionState::Closed => PEER_CONNECTION_STATE_CLOSED_STR,
            RTCPeerConnectionState::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RTCPeerConnectionState {
    /// Maps an ICE connection state onto the aggregate connection state.
    pub(crate) fn from_ice(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::New => RTCPeerConnectionState::New,
            RTCIceConnectionState::Checking => RTCPeerConnectionState::Connecting,
            RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                RTCPeerConnectionState::Connected
            }
            RTCIceConnectionState::Disconnected => RTCPeerConnectionState::Disconnected,
            RTCIceConnectionState::Failed => RTCPeerConnectionState::Failed,
            RTCIceConnectionState::Closed => RTCPeerConnectionState::Closed,
            RTCIceConnectionState::Unspecified => RTCPeerConnectionState::Unspecified,
        }
    }

    pub(crate) fn can_transition_to(self, next: RTCPeerConnectionState) -> bool {
        if self == next || next == RTCPeerConnectionState::Unspecified {
            return false;
        }
        match self {
            RTCPeerConnectionState::Closed => false,
            RTCPeerConnectionState::Failed => next == RTCPeerConnectionState::Closed,
            RTCPeerConnectionState::Unspecified => true,
            _ => next != RTCPeerConnectionState::New,
        }
    }
}
