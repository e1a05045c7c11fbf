use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer_connection::state::UNSPECIFIED_STR;

/// Represents the type of the ICE candidate used.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCIceCandidateType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,

    /// An actual IP address of the host.
    #[serde(rename = "host")]
    Host,

    /// The public address of the host as seen by a STUN server.
    #[serde(rename = "srflx")]
    Srflx,

    /// An address learned from a connectivity check.
    #[serde(rename = "prflx")]
    Prflx,

    /// An address allocated on a TURN server.
    #[serde(rename = "relay")]
    Relay,
}

const ICE_CANDIDATE_TYPE_HOST_STR: &str = "host";
const ICE_CANDIDATE_TYPE_SRFLX_STR: &str = "srflx";
const ICE_CANDIDATE_TYPE_PRFLX_STR: &str = "prflx";
const ICE_CANDIDATE_TYPE_RELAY_STR: &str = "relay";

impl From<&str> for RTCIceCandidateType {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_CANDIDATE_TYPE_HOST_STR => RTCIceCandidateType::Host,
            ICE_CANDIDATE_TYPE_SRFLX_STR => RTCIceCandidateType::Srflx,
            ICE_CANDIDATE_TYPE_PRFLX_STR => RTCIceCandidateType::Prflx,
            ICE_CANDIDATE_TYPE_RELAY_STR => RTCIceCandidateType::Relay,
            _ => RTCIceCandidateType::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceCandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCIceCandidateType::Host => write!(f, "{ICE_CANDIDATE_TYPE_HOST_STR}"),
            RTCIceCandidateType::Srflx => write!(f, "{ICE_CANDIDATE_TYPE_SRFLX_STR}"),
            RTCIceCandidateType::Prflx => write!(f, "{ICE_CANDIDATE_TYPE_PRFLX_STR}"),
            RTCIceCandidateType::Relay => write!(f, "{ICE_CANDIDATE_TYPE_RELAY_STR}"),
            _ => write!(f, "{UNSPECIFIED_STR}"),
        }
    }
}

impl RTCIceCandidateType {
    /// Type preference used in the candidate priority.
    ///
    /// RFC 8445 4.1.2.2 recommends 126 for host candidates, 110 for peer
    /// reflexive, 100 for server reflexive and 0 for relayed candidates.
    pub const fn preference(self) -> u16 {
        match self {
            RTCIceCandidateType::Host => 126,
            RTCIceCandidateType::Prflx => 110,
            RTCIceCandidateType::Srflx => 100,
            RTCIceCandidateType::Relay | RTCIceCandidateType::Unspecified => 0,
        }
    }
}

/// Transport protocol of a candidate.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCIceProtocol {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,

    #[serde(rename = "udp")]
    Udp,

    #[serde(rename = "tcp")]
    Tcp,
}

const ICE_PROTOCOL_UDP_STR: &str = "udp";
const ICE_PROTOCOL_TCP_STR: &str = "tcp";

impl From<&str> for RTCIceProtocol {
    fn from(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case(ICE_PROTOCOL_UDP_STR) {
            RTCIceProtocol::Udp
        } else if raw.eq_ignore_ascii_case(ICE_PROTOCOL_TCP_STR) {
            RTCIceProtocol::Tcp
        } else {
            RTCIceProtocol::Unspecified
        }
    }
}

impl fmt::Display for RTCIceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCIceProtocol::Udp => write!(f, "{ICE_PROTOCOL_UDP_STR}"),
            RTCIceProtocol::Tcp => write!(f, "{ICE_PROTOCOL_TCP_STR}"),
            _ => write!(f, "{UNSPECIFIED_STR}"),
        }
    }
}
