//! Peer connection state types.
//!
//! An endpoint runs four independent state machines:
//!
//! - **[`RTCIceConnectionState`]** - connectivity of the ICE agent
//! - **[`RTCIceGatheringState`]** - progress of local candidate gathering
//! - **[`RTCPeerConnectionState`]** - aggregate connection state
//! - **[`RTCSignalingState`]** - offer/answer progress
//!
//! Changes are reported through
//! [`RTCPeerConnectionEvent`](crate::peer_connection::event::RTCPeerConnectionEvent)
//! to the handlers registered on the endpoint.
//!
//! ```
//! use rtc_proof::peer_connection::state::{RTCIceConnectionState, RTCSignalingState};
//!
//! let state: RTCIceConnectionState = "completed".into();
//! assert!(state.is_connected());
//!
//! let state: RTCSignalingState = "have-local-offer".into();
//! assert_eq!(state.to_string(), "have-local-offer");
//! ```
//!
//! ## ICE connection states
//!
//! ```text
//! New → Checking → Connected → Completed
//!   ↓       ↓          ↓
//!   ↓       ↓      Disconnected → Failed
//!   ↓       ↓          ↓           ↓
//!   └───────┴──────────┴───────────┴→ Closed
//! ```
//!
//! `Closed` is absorbing and `Failed` may only move to `Closed`. Once connected,
//! a state never returns to `New` or `Checking`.

pub(crate) mod ice_connection_state;
pub(crate) mod ice_gathering_state;
pub(crate) mod peer_connection_state;
pub(crate) mod signaling_state;

pub use ice_connection_state::RTCIceConnectionState;
pub use ice_gathering_state::RTCIceGatheringState;
pub use peer_connection_state::RTCPeerConnectionState;
pub use signaling_state::RTCSignalingState;

pub(crate) const UNSPECIFIED_STR: &str = "unspecified";
