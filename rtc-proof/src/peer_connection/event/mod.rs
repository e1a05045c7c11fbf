use crate::peer_connection::event::ice_event::RTCPeerConnectionIceEvent;
use crate::peer_connection::state::{
    RTCIceConnectionState, RTCIceGatheringState, RTCPeerConnectionState, RTCSignalingState,
};

pub mod ice_event;

/// Everything an endpoint reports to its observers.
#[allow(clippy::enum_variant_names)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RTCPeerConnectionEvent {
    OnIceCandidateEvent(RTCPeerConnectionIceEvent),
    OnSignalingStateChangeEvent(RTCSignalingState),
    OnIceConnectionStateChangeEvent(RTCIceConnectionState),
    OnIceGatheringStateChangeEvent(RTCIceGatheringState),
    OnConnectionStateChangeEvent(RTCPeerConnectionState),
}
