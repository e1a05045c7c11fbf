use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::media_stream::MediaStreamConstraints;
use crate::peer_connection::configuration::setting_engine::SettingEngine;
use crate::peer_connection::configuration::{RTCConfiguration, RTCConfigurationBuilder};
use crate::peer_connection::transport::ice::RTCIceServer;

pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 50;

fn default_ice_servers() -> Vec<RTCIceServer> {
    vec![
        RTCIceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_owned()],
            ..Default::default()
        },
        RTCIceServer {
            urls: vec!["stun:stun1.l.google.com:19302".to_owned()],
            ..Default::default()
        },
    ]
}

/// Everything a connection proof run is parameterised by.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use rtc_proof::proof::ProofConfiguration;
///
/// let configuration = ProofConfiguration::from_json(
///     r#"{"iceServers": [{"urls": ["stun:stun.example.org"]}], "maxAttempts": 10}"#,
/// )?;
/// assert_eq!(configuration.max_attempts(), 10);
/// assert_eq!(configuration.poll_interval().as_millis(), 100);
/// # Ok::<(), rtc_proof::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProofConfiguration {
    pub(crate) ice_servers: Vec<RTCIceServer>,
    pub(crate) media: MediaStreamConstraints,
    pub(crate) poll_interval_ms: u64,
    pub(crate) max_attempts: u32,
    pub(crate) setting_engine: SettingEngine,
}

impl Default for ProofConfiguration {
    fn default() -> Self {
        ProofConfiguration {
            ice_servers: default_ice_servers(),
            media: MediaStreamConstraints::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            setting_engine: SettingEngine::default(),
        }
    }
}

impl ProofConfiguration {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| Error::Other(format!("configuration: {err}")))
    }

    pub fn ice_servers(&self) -> &[RTCIceServer] {
        &self.ice_servers
    }

    pub fn media(&self) -> &MediaStreamConstraints {
        &self.media
    }

    /// Time between two poll attempts, never zero.
    pub fn poll_interval(&self) -> Duration {
        if self.poll_interval_ms == 0 {
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        } else {
            Duration::from_millis(self.poll_interval_ms)
        }
    }

    /// Number of poll attempts before the monitor gives up, at least one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }

    /// The endpoint configuration shared by both sides.
    pub(crate) fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfigurationBuilder::new()
            .with_ice_servers(self.ice_servers.clone())
            .with_setting_engine(self.setting_engine.clone())
            .build()
    }
}

#[derive(Default)]
pub struct ProofConfigurationBuilder {
    configuration: ProofConfiguration,
}

impl ProofConfigurationBuilder {
    pub fn new() -> Self {
        ProofConfigurationBuilder::default()
    }

    pub fn with_ice_servers(mut self, ice_servers: Vec<RTCIceServer>) -> Self {
        self.configuration.ice_servers = ice_servers;
        self
    }

    pub fn with_media_constraints(mut self, media: MediaStreamConstraints) -> Self {
        self.configuration.media = media;
        self
    }

    /// Rounded up to whole milliseconds; a zero interval selects the default.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        let millis = poll_interval.as_nanos().div_ceil(1_000_000);
        self.configuration.poll_interval_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.configuration.max_attempts = max_attempts;
        self
    }

    pub fn with_setting_engine(mut self, setting_engine: SettingEngine) -> Self {
        self.configuration.setting_engine = setting_engine;
        self
    }

    pub fn build(self) -> ProofConfiguration {
        self.configuration
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_proof_configuration_defaults() {
        let configuration = ProofConfiguration::default();
        let urls: Vec<&str> = configuration
            .ice_servers()
            .iter()
            .flat_map(|server| server.urls.iter().map(String::as_str))
            .collect();
        assert_eq!(
            urls,
            vec!["stun:stun.l.google.com:19302", "stun:stun1.l.google.com:19302"]
        );
        assert_eq!(configuration.poll_interval(), Duration::from_millis(100));
        assert_eq!(configuration.max_attempts(), 50);
        assert!(configuration.media().audio);
        assert!(configuration.rtc_configuration().validate().is_ok());
    }

    #[test]
    fn test_proof_configuration_from_json() {
        let tests = vec![
            ("{}", Some((2, 100, 50, true))),
            (
                r#"{"iceServers": [], "pollIntervalMs": 0, "maxAttempts": 0, "media": {"audio": false, "video": null}}"#,
                Some((0, 100, 1, false)),
            ),
            (
                r#"{"pollIntervalMs": 20, "settingEngine": {"packetLoss": 0.5}}"#,
                Some((2, 20, 50, true)),
            ),
            (r#"{"maxAttempts": "many"}"#, None),
        ];

        for (raw, expected) in tests {
            let result = ProofConfiguration::from_json(raw);
            match expected {
                Some((servers, poll_ms, attempts, audio)) => {
                    let configuration = result.expect("configuration");
                    assert_eq!(configuration.ice_servers().len(), servers, "testCase: {raw}");
                    assert_eq!(
                        configuration.poll_interval(),
                        Duration::from_millis(poll_ms)
                    );
                    assert_eq!(configuration.max_attempts(), attempts);
                    assert_eq!(configuration.media().audio, audio);
                }
                None => assert!(matches!(result, Err(Error::Other(_))), "testCase: {raw}"),
            }
        }
    }

    #[test]
    fn test_proof_configuration_builder() {
        let configuration = ProofConfigurationBuilder::new()
            .with_ice_servers(vec![])
            .with_media_constraints(MediaStreamConstraints::none())
            .with_poll_interval(Duration::from_millis(25))
            .with_max_attempts(4)
            .build();
        assert!(configuration.ice_servers().is_empty());
        assert!(configuration.media().is_empty());
        assert_eq!(configuration.poll_interval(), Duration::from_millis(25));
        assert_eq!(configuration.max_attempts(), 4);
    }

    #[test]
    fn test_proof_configuration_poll_interval_rounds_up() {
        let tests = vec![
            (Duration::from_micros(200), Duration::from_millis(1)),
            (Duration::from_micros(1500), Duration::from_millis(2)),
            (Duration::from_millis(30), Duration::from_millis(30)),
            (Duration::ZERO, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
        ];

        for (requested, expected) in tests {
            let configuration = ProofConfigurationBuilder::new()
                .with_poll_interval(requested)
                .build();
            assert_eq!(
                configuration.poll_interval(),
                expected,
                "testCase: {requested:?}"
            );
        }
    }
}
