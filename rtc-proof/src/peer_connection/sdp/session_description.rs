use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::description::SessionDescription;
use super::sdp_type::RTCSdpType;
use crate::error::Result;

/// A session description together with its offer/answer type.
///
/// Equality compares the type and the raw text, so a description received
/// from the peer equals the one the peer created.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCSessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: RTCSdpType,

    pub sdp: String,

    /// Parsed form of `sdp`, filled by the constructors.
    #[serde(skip)]
    pub(crate) parsed: Option<SessionDescription>,
}

impl PartialEq for RTCSessionDescription {
    fn eq(&self, other: &Self) -> bool {
        self.sdp_type == other.sdp_type && self.sdp == other.sdp
    }
}

impl Display for RTCSessionDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type: {}, sdp:\n{}",
            self.sdp_type,
            self.sdp.replace("\r\n", "\n")
        )
    }
}

impl RTCSessionDescription {
    /// Creates an answer from raw text, failing if it does not parse.
    pub fn answer(sdp: String) -> Result<RTCSessionDescription> {
        Self::with_type(RTCSdpType::Answer, sdp)
    }

    /// Creates an offer from raw text, failing if it does not parse.
    pub fn offer(sdp: String) -> Result<RTCSessionDescription> {
        Self::with_type(RTCSdpType::Offer, sdp)
    }

    fn with_type(sdp_type: RTCSdpType, sdp: String) -> Result<RTCSessionDescription> {
        let mut desc = RTCSessionDescription {
            sdp_type,
            sdp,
            parsed: None,
        };
        desc.parsed = Some(desc.unmarshal()?);
        Ok(desc)
    }

    pub(crate) fn from_parsed(sdp_type: RTCSdpType, parsed: SessionDescription) -> Self {
        RTCSessionDescription {
            sdp_type,
            sdp: parsed.marshal(),
            parsed: Some(parsed),
        }
    }

    /// Parses `sdp`.
    pub fn unmarshal(&self) -> Result<SessionDescription> {
        SessionDescription::unmarshal(&self.sdp)
    }

    /// Returns the parsed form, parsing on demand for descriptions built
    /// through deserialization.
    pub(crate) fn parsed(&self) -> Result<SessionDescription> {
        match &self.parsed {
            Some(parsed) => Ok(parsed.clone()),
            None => self.unmarshal(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;

    const MINIMAL: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n";

    #[test]
    fn test_session_description_json() {
        let tests = vec![
            (
                RTCSessionDescription {
                    sdp_type: RTCSdpType::Offer,
                    sdp: "sdp".to_owned(),
                    parsed: None,
                },
                r#"{"type":"offer","sdp":"sdp"}"#,
            ),
            (
                RTCSessionDescription {
                    sdp_type: RTCSdpType::Answer,
                    sdp: "sdp".to_owned(),
                    parsed: None,
                },
                r#"{"type":"answer","sdp":"sdp"}"#,
            ),
        ];

        for (desc, expected_string) in tests {
            let result = serde_json::to_string(&desc);
            assert!(result.is_ok(), "testCase: marshal err: {result:?}");
            let desc_data = result.unwrap();
            assert_eq!(desc_data, expected_string, "string is not expected");

            let result = serde_json::from_str::<RTCSessionDescription>(&desc_data);
            assert!(result.is_ok(), "testCase: unmarshal err: {result:?}");
            if let Ok(sd) = result {
                assert_eq!(sd, desc);
            }
        }
    }

    #[test]
    fn test_session_description_constructors() {
        let offer = RTCSessionDescription::offer(MINIMAL.to_owned()).expect("offer");
        assert_eq!(offer.sdp_type, RTCSdpType::Offer);
        assert!(offer.parsed.is_some());

        let answer = RTCSessionDescription::answer(MINIMAL.to_owned()).expect("answer");
        assert_eq!(answer.sdp_type, RTCSdpType::Answer);
        assert_ne!(offer, answer);

        assert!(matches!(
            RTCSessionDescription::offer("garbage".to_owned()),
            Err(Error::ErrSdpInvalidSyntax(_))
        ));
    }
}
