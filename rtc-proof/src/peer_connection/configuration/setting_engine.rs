//! Setting engine for the simulated ICE stack.
//!
//! The [`SettingEngine`] carries the knobs that are not part of the W3C
//! configuration dictionary: how often connectivity checks run, how long
//! each gathering phase takes and how the in-process network behaves.
//!
//! # Examples
//!
//! ```
//! use rtc_proof::peer_connection::configuration::setting_engine::SettingEngine;
//! use std::time::Duration;
//!
//! let mut setting_engine = SettingEngine::default();
//! setting_engine.set_ice_check_interval(Duration::from_millis(10));
//! setting_engine.set_network_latency(Duration::from_millis(1));
//! setting_engine.set_packet_loss(0.25);
//!
//! assert_eq!(setting_engine.packet_loss(), 0.25);
//! ```
//!
//! The setting engine deserializes from JSON with every field optional:
//!
//! ```
//! use rtc_proof::peer_connection::configuration::setting_engine::SettingEngine;
//!
//! let setting_engine: SettingEngine =
//!     serde_json::from_str(r#"{"iceCheckIntervalMs": 50, "trickle": false}"#).unwrap();
//! assert_eq!(setting_engine.ice_check_interval().as_millis(), 50);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_ICE_CHECK_INTERVAL_MS: u64 = 20;
pub(crate) const DEFAULT_MAX_BINDING_REQUESTS: u16 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingEngine {
    pub(crate) ice_check_interval_ms: u64,
    pub(crate) ice_max_binding_requests: u16,
    pub(crate) host_gather_delay_ms: u64,
    pub(crate) srflx_gather_delay_ms: u64,
    pub(crate) relay_gather_delay_ms: u64,
    pub(crate) network_latency_ms: u64,
    pub(crate) packet_loss: f64,
    pub(crate) trickle: bool,
    pub(crate) ice_username_fragment: String,
    pub(crate) ice_password: String,
}

impl Default for SettingEngine {
    fn default() -> Self {
        SettingEngine {
            ice_check_interval_ms: DEFAULT_ICE_CHECK_INTERVAL_MS,
            ice_max_binding_requests: DEFAULT_MAX_BINDING_REQUESTS,
            host_gather_delay_ms: 0,
            srflx_gather_delay_ms: 20,
            relay_gather_delay_ms: 40,
            network_latency_ms: 5,
            packet_loss: 0.0,
            trickle: true,
            ice_username_fragment: String::new(),
            ice_password: String::new(),
        }
    }
}

impl SettingEngine {
    /// Sets how often pending candidate pairs are checked. Zero restores
    /// the default.
    pub fn set_ice_check_interval(&mut self, interval: Duration) {
        self.ice_check_interval_ms = interval.as_millis() as u64;
    }

    /// Sets how many binding requests a pair may send before it is
    /// considered failed.
    pub fn set_ice_max_binding_requests(&mut self, max_binding_requests: u16) {
        self.ice_max_binding_requests = max_binding_requests;
    }

    /// Sets the time from the start of gathering until host, server
    /// reflexive and relay candidates are discovered.
    pub fn set_gather_delays(&mut self, host: Duration, srflx: Duration, relay: Duration) {
        self.host_gather_delay_ms = host.as_millis() as u64;
        self.srflx_gather_delay_ms = srflx.as_millis() as u64;
        self.relay_gather_delay_ms = relay.as_millis() as u64;
    }

    /// Sets the one-way delay of the simulated network.
    pub fn set_network_latency(&mut self, latency: Duration) {
        self.network_latency_ms = latency.as_millis() as u64;
    }

    /// Sets the probability, clamped to `[0, 1]`, that the simulated network
    /// drops a datagram.
    pub fn set_packet_loss(&mut self, packet_loss: f64) {
        self.packet_loss = if packet_loss.is_nan() {
            0.0
        } else {
            packet_loss.clamp(0.0, 1.0)
        };
    }

    /// Controls whether descriptions advertise `a=ice-options:trickle`.
    pub fn set_trickle(&mut self, trickle: bool) {
        self.trickle = trickle;
    }

    /// Sets the local ICE credentials instead of generating random ones.
    /// Mostly useful for tests.
    pub fn set_ice_credentials(&mut self, username_fragment: String, password: String) {
        self.ice_username_fragment = username_fragment;
        self.ice_password = password;
    }

    pub fn ice_check_interval(&self) -> Duration {
        if self.ice_check_interval_ms == 0 {
            Duration::from_millis(DEFAULT_ICE_CHECK_INTERVAL_MS)
        } else {
            Duration::from_millis(self.ice_check_interval_ms)
        }
    }

    pub fn ice_max_binding_requests(&self) -> u16 {
        if self.ice_max_binding_requests == 0 {
            DEFAULT_MAX_BINDING_REQUESTS
        } else {
            self.ice_max_binding_requests
        }
    }

    pub(crate) fn host_gather_delay(&self) -> Duration {
        Duration::from_millis(self.host_gather_delay_ms)
    }

    pub(crate) fn srflx_gather_delay(&self) -> Duration {
        Duration::from_millis(self.srflx_gather_delay_ms)
    }

    pub(crate) fn relay_gather_delay(&self) -> Duration {
        Duration::from_millis(self.relay_gather_delay_ms)
    }

    pub fn network_latency(&self) -> Duration {
        Duration::from_millis(self.network_latency_ms)
    }

    pub fn packet_loss(&self) -> f64 {
        self.packet_loss.clamp(0.0, 1.0)
    }

    pub fn trickle(&self) -> bool {
        self.trickle
    }
}
