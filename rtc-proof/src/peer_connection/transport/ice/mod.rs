//! ICE: candidates, server urls, gathering and connectivity checks.

pub(crate) mod agent;
pub mod candidate;
pub(crate) mod candidate_pair;
pub mod candidate_type;
pub(crate) mod gatherer;
pub(crate) mod message;
pub(crate) mod rand;
pub mod server;

pub use candidate::{RTCIceCandidate, RTCIceCandidateInit, unmarshal_candidate};
pub use candidate_pair::CandidatePairState;
pub use candidate_type::{RTCIceCandidateType, RTCIceProtocol};
pub use server::RTCIceServer;
