//! # rtc-proof - Sans-I/O Peer Connection Negotiation Proof
//!
//! Drives two in-process endpoints through capability checking, offer/answer
//! exchange, trickled ICE candidates and connectivity checks, then reports
//! whether a peer-to-peer connection was established within a bounded
//! polling budget.
//!
//! ## Layers
//!
//! - [`peer_connection`]: a sans-I/O endpoint ([`RTCPeerConnection`]) with
//!   SDP generation, candidate gathering and an ICE agent. Datagrams and
//!   timers flow through the [`sansio::Protocol`] trait, so the endpoint can
//!   be driven by any runtime.
//! - [`session`]: two endpoints wired together by an in-process signaling
//!   channel and a loopback network, plus the negotiation coordinator and
//!   the connection monitor.
//! - [`proof`]: the caller-owned [`ConnectionProof`] with `start()` and
//!   `cleanup()`, its configuration and the [`ProofResult`] report.
//! - [`capability`] and [`platform`]: the environment the proof runs in.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rtc_proof::proof::{ConnectionProof, ProofConfigurationBuilder};
//! use rtc_proof::media_stream::MediaStreamConstraints;
//! use rtc_proof::platform::SimulatedPlatform;
//!
//! #[tokio::main]
//! async fn main() -> rtc_proof::Result<()> {
//!     let configuration = ProofConfigurationBuilder::new()
//!         .with_media_constraints(MediaStreamConstraints::none())
//!         .build();
//!     let mut proof = ConnectionProof::new(configuration, Box::new(SimulatedPlatform::new()));
//!
//!     let result = proof.start().await?;
//!     println!("{result}");
//!     println!("{}", result.to_json()?);
//!
//!     proof.cleanup();
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with the crate-wide
//! [`Error`]. An unsupported platform and a rejected negotiation step end a
//! proof with an error; a denied media request and an exhausted polling
//! budget do not.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub use sansio;

pub mod capability;
mod error;
pub mod media_stream;
pub mod peer_connection;
pub mod platform;
pub mod proof;
pub mod session;

pub use error::{Error, Result};
pub use peer_connection::{EndpointRole, RTCPeerConnection};
pub use proof::{ConnectionProof, ProofConfiguration, ProofResult};
