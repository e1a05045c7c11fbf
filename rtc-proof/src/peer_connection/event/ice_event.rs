use crate::peer_connection::transport::ice::candidate::{RTCIceCandidate, RTCIceCandidateInit};

/// A locally gathered candidate, or the end of gathering when `candidate`
/// is `None`.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct RTCPeerConnectionIceEvent {
    pub candidate: Option<RTCIceCandidate>,
    pub url: String,
    pub username_fragment: String,
}

impl RTCPeerConnectionIceEvent {
    /// The init dictionary to signal to the peer. The end of gathering maps
    /// to an empty candidate string.
    pub fn to_init(&self) -> RTCIceCandidateInit {
        let mut init = match &self.candidate {
            Some(candidate) => candidate.to_json(),
            None => RTCIceCandidateInit {
                sdp_mid: Some("0".to_owned()),
                sdp_mline_index: Some(0),
                ..Default::default()
            },
        };
        init.username_fragment = Some(self.username_fragment.clone());
        init
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_event_to_init() {
        let end = RTCPeerConnectionIceEvent {
            candidate: None,
            url: String::new(),
            username_fragment: "ufrag".to_owned(),
        };
        let init = end.to_init();
        assert!(init.is_end_of_candidates());
        assert_eq!(init.username_fragment.as_deref(), Some("ufrag"));

        let candidate = RTCIceCandidate::new(
            crate::peer_connection::transport::ice::RTCIceCandidateType::Host,
            "10.0.0.1:5000".parse().expect("addr"),
            None,
            None,
        );
        let event = RTCPeerConnectionIceEvent {
            candidate: Some(candidate.clone()),
            url: String::new(),
            username_fragment: "ufrag".to_owned(),
        };
        let init = event.to_init();
        assert!(!init.is_end_of_candidates());
        assert_eq!(init.candidate, format!("candidate:{}", candidate.marshal()));
    }
}
