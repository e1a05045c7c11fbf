use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::platform::Platform;

/// A platform primitive the proof depends on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Capability {
    #[serde(rename = "RTCPeerConnection")]
    PeerConnection,
    #[serde(rename = "getUserMedia")]
    MediaCapture,
    #[serde(rename = "RTCDataChannel")]
    DataChannel,
}

const CAPABILITY_PEER_CONNECTION_STR: &str = "RTCPeerConnection";
const CAPABILITY_MEDIA_CAPTURE_STR: &str = "getUserMedia";
const CAPABILITY_DATA_CHANNEL_STR: &str = "RTCDataChannel";

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::PeerConnection,
        Capability::MediaCapture,
        Capability::DataChannel,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Capability::PeerConnection => CAPABILITY_PEER_CONNECTION_STR,
            Capability::MediaCapture => CAPABILITY_MEDIA_CAPTURE_STR,
            Capability::DataChannel => CAPABILITY_DATA_CHANNEL_STR,
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityCheck {
    pub name: Capability,
    pub available: bool,
}

/// Read-only query of the platform's primitives.
pub struct CapabilityProbe<'a> {
    platform: &'a dyn Platform,
}

impl<'a> CapabilityProbe<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }

    /// Lists every required capability with its availability.
    pub fn checks(&self) -> Vec<CapabilityCheck> {
        Capability::ALL
            .into_iter()
            .map(|name| CapabilityCheck {
                name,
                available: match name {
                    Capability::PeerConnection => self.platform.has_peer_connection(),
                    Capability::MediaCapture => self.platform.has_media_capture(),
                    Capability::DataChannel => self.platform.has_data_channel(),
                },
            })
            .collect()
    }

    /// Same list as [`checks`](Self::checks), but fails with
    /// [`Error::ErrUnsupportedPlatform`] naming every missing capability.
    pub fn check(&self) -> Result<Vec<CapabilityCheck>> {
        let checks = self.checks();
        for check in &checks {
            log::info!(
                "  {}: {}",
                check.name,
                if check.available {
                    "supported"
                } else {
                    "not supported"
                }
            );
        }

        let missing: Vec<String> = checks
            .iter()
            .filter(|check| !check.available)
            .map(|check| check.name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::ErrUnsupportedPlatform(missing.join(", ")));
        }
        log::info!("platform support verified");
        Ok(checks)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::SimulatedPlatform;

    #[test]
    fn test_capability_string() {
        let tests = vec![
            (Capability::PeerConnection, "RTCPeerConnection"),
            (Capability::MediaCapture, "getUserMedia"),
            (Capability::DataChannel, "RTCDataChannel"),
        ];

        for (capability, expected_string) in tests {
            assert_eq!(capability.to_string(), expected_string);
            assert_eq!(
                serde_json::to_string(&capability).expect("json"),
                format!("\"{expected_string}\"")
            );
        }
    }

    #[test]
    fn test_capability_probe_check() {
        let tests = vec![
            (SimulatedPlatform::new(), Ok(())),
            (
                SimulatedPlatform::new().with_data_channel(false),
                Err(Error::ErrUnsupportedPlatform("RTCDataChannel".to_owned())),
            ),
            (
                SimulatedPlatform::new()
                    .with_peer_connection(false)
                    .with_media_capture(false),
                Err(Error::ErrUnsupportedPlatform(
                    "RTCPeerConnection, getUserMedia".to_owned(),
                )),
            ),
        ];

        for (platform, expected) in tests {
            let probe = CapabilityProbe::new(&platform);
            assert_eq!(probe.checks().len(), 3);
            assert_eq!(probe.check().map(|_| ()), expected, "testCase: {platform:?}");
        }
    }
}
