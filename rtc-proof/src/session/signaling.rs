use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::peer_connection::sdp::RTCSessionDescription;
use crate::peer_connection::transport::ice::RTCIceCandidateInit;

/// A message on the in-process signaling channel.
///
/// Serializes as `{"type": "offer" | "answer" | "candidate", "payload": ...}`
/// where offers and answers carry the raw SDP text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum SignalingMessage {
    Offer(String),
    Answer(String),
    Candidate(RTCIceCandidateInit),
}

impl SignalingMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer(_) => "offer",
            SignalingMessage::Answer(_) => "answer",
            SignalingMessage::Candidate(_) => "candidate",
        }
    }

    /// Rebuilds the description carried by an offer or answer, as the
    /// receiving side would.
    pub fn description(&self) -> Option<Result<RTCSessionDescription>> {
        match self {
            SignalingMessage::Offer(sdp) => Some(RTCSessionDescription::offer(sdp.clone())),
            SignalingMessage::Answer(sdp) => Some(RTCSessionDescription::answer(sdp.clone())),
            SignalingMessage::Candidate(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_signaling_message_json() {
        let tests = vec![
            (
                SignalingMessage::Offer("v=0".to_owned()),
                r#"{"type":"offer","payload":"v=0"}"#,
            ),
            (
                SignalingMessage::Answer("v=0".to_owned()),
                r#"{"type":"answer","payload":"v=0"}"#,
            ),
            (
                SignalingMessage::Candidate(RTCIceCandidateInit {
                    candidate: "candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host".to_owned(),
                    sdp_mid: Some("0".to_owned()),
                    sdp_mline_index: Some(0),
                    username_fragment: None,
                    url: None,
                }),
                r#"{"type":"candidate","payload":{"candidate":"candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":null}}"#,
            ),
        ];

        for (message, expected) in tests {
            let data = serde_json::to_string(&message).expect("marshal");
            assert_eq!(data, expected, "testCase: {}", message.kind());
            let parsed: SignalingMessage = serde_json::from_str(&data).expect("unmarshal");
            assert_eq!(parsed, message);
        }
    }
}
