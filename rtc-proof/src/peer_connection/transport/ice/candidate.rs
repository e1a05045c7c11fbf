use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use super::candidate_type::{RTCIceCandidateType, RTCIceProtocol};
use crate::error::{Error, Result};

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;
pub(crate) const COMPONENT_RTP: u16 = 1;

const CANDIDATE_PREFIX: &str = "candidate:";

/// One transport address a peer can be reached on.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub address: String,
    pub protocol: RTCIceProtocol,
    pub port: u16,
    pub typ: RTCIceCandidateType,
    pub component: u16,
    pub related_address: String,
    pub related_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl fmt::Display for RTCIceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}",
            self.protocol, self.typ, self.address, self.port
        )?;
        if !self.related_address.is_empty() {
            write!(
                f,
                " related {}:{}",
                self.related_address, self.related_port
            )?;
        }
        Ok(())
    }
}

impl RTCIceCandidate {
    /// Builds a UDP candidate of component 1 with the default priority for
    /// its type.
    pub(crate) fn new(
        typ: RTCIceCandidateType,
        addr: SocketAddr,
        related: Option<SocketAddr>,
        url: Option<String>,
    ) -> Self {
        let (related_address, related_port) = match related {
            Some(related) => (related.ip().to_string(), related.port()),
            None => (String::new(), 0),
        };
        RTCIceCandidate {
            foundation: foundation(typ, addr.ip()),
            priority: candidate_priority(typ, DEFAULT_LOCAL_PREFERENCE, COMPONENT_RTP),
            address: addr.ip().to_string(),
            protocol: RTCIceProtocol::Udp,
            port: addr.port(),
            typ,
            component: COMPONENT_RTP,
            related_address,
            related_port,
            url,
        }
    }

    /// Transport address of the candidate.
    pub fn addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|_| Error::ErrInvalidCandidateAddress(self.address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Renders the candidate in the `a=candidate` attribute grammar,
    /// without the `candidate:` prefix.
    pub fn marshal(&self) -> String {
        let mut val = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.port,
            self.typ
        );

        if !self.related_address.is_empty() {
            val += format!(
                " raddr {} rport {}",
                self.related_address, self.related_port,
            )
            .as_str();
        }

        val
    }

    /// The init dictionary handed to the signaling channel.
    pub fn to_json(&self) -> RTCIceCandidateInit {
        RTCIceCandidateInit {
            candidate: format!("{CANDIDATE_PREFIX}{}", self.marshal()),
            sdp_mid: Some("0".to_owned()),
            sdp_mline_index: Some(0u16),
            username_fragment: None,
            url: self.url.clone(),
        }
    }
}

/// Used to serialize ice candidates.
///
/// An empty `candidate` marks the end of the candidate stream.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RTCIceCandidateInit {
    /// Reports whether this init carries no candidate, i.e. signals the end
    /// of the candidate stream.
    pub fn is_end_of_candidates(&self) -> bool {
        strip_candidate_prefix(&self.candidate).trim().is_empty()
    }
}

fn strip_candidate_prefix(raw: &str) -> &str {
    raw.strip_prefix(CANDIDATE_PREFIX).unwrap_or(raw)
}

/// RFC 8445 5.1.2.1:
/// priority = (2^24)*(type preference) + (2^8)*(local preference) + (256 - component ID)
pub(crate) fn candidate_priority(
    typ: RTCIceCandidateType,
    local_preference: u16,
    component: u16,
) -> u32 {
    (1 << 24) * u32::from(typ.preference())
        + (1 << 8) * u32::from(local_preference)
        + (256 - u32::from(component))
}

fn foundation(typ: RTCIceCandidateType, ip: IpAddr) -> String {
    let mut hash: u32 = 2166136261;
    for byte in format!("{typ}{ip}udp").bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16777619);
    }
    hash.to_string()
}

/// Parses a candidate from its `a=candidate` attribute form, with or
/// without the `candidate:` prefix.
pub fn unmarshal_candidate(raw: &str) -> Result<RTCIceCandidate> {
    let split: Vec<&str> = strip_candidate_prefix(raw).split_whitespace().collect();
    if split.len() < 8 {
        return Err(Error::ErrAttributeTooShortIceCandidate(split.len()));
    }

    // Foundation
    let foundation = split[0].to_owned();

    // Component
    let component: u16 = split[1].parse()?;

    // Network
    let protocol = RTCIceProtocol::from(split[2]);
    if protocol == RTCIceProtocol::Unspecified {
        return Err(Error::ErrUnknownCandidateNetwork(split[2].to_owned()));
    }

    // Priority
    let priority: u32 = split[3].parse()?;

    // Address
    let address = split[4].to_owned();
    if address.parse::<IpAddr>().is_err() {
        return Err(Error::ErrInvalidCandidateAddress(address));
    }

    // Port
    let port: u16 = split[5].parse()?;

    let typ = RTCIceCandidateType::from(split[7]);
    if typ == RTCIceCandidateType::Unspecified {
        return Err(Error::ErrUnknownCandidateType(split[7].to_owned()));
    }

    let mut related_address = String::new();
    let mut related_port = 0;

    if split.len() > 8 {
        let split2 = &split[8..];

        if split2[0] == "raddr" {
            if split2.len() < 4 {
                return Err(Error::ErrParseRelatedAddr);
            }

            // RelatedAddress
            related_address = split2[1].to_owned();

            // RelatedPort
            related_port = split2[3].parse()?;
        }
    }

    Ok(RTCIceCandidate {
        foundation,
        priority,
        address,
        protocol,
        port,
        typ,
        component,
        related_address,
        related_port,
        url: None,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unmarshal_candidate() {
        let tests = vec![
            (
                "1052353102 1 udp 2130706431 192.168.1.10 50001 typ host",
                RTCIceCandidateType::Host,
                "192.168.1.10:50001",
                "",
            ),
            (
                "candidate:647372371 1 udp 1694498815 203.0.113.1 50001 typ srflx raddr 192.168.1.10 rport 50001",
                RTCIceCandidateType::Srflx,
                "203.0.113.1:50001",
                "192.168.1.10",
            ),
            (
                "848194626 1 udp 16777215 198.51.100.1 50000 typ relay raddr 203.0.113.1 rport 50001",
                RTCIceCandidateType::Relay,
                "198.51.100.1:50000",
                "203.0.113.1",
            ),
            (
                "4207374051 1 tcp 1518280447 192.168.1.10 9 typ host tcptype active",
                RTCIceCandidateType::Host,
                "192.168.1.10:9",
                "",
            ),
        ];

        for (raw, expected_type, expected_addr, expected_related) in tests {
            let candidate = unmarshal_candidate(raw).expect("candidate");
            assert_eq!(candidate.typ, expected_type, "testCase: {raw}");
            assert_eq!(
                candidate.addr().map(|a| a.to_string()),
                Ok(expected_addr.to_owned())
            );
            assert_eq!(candidate.related_address, expected_related);
        }
    }

    #[test]
    fn test_unmarshal_candidate_errors() {
        let tests = vec![
            ("", Error::ErrAttributeTooShortIceCandidate(0)),
            (
                "1 1 udp 2130706431 10.0.0.1 5000 typ",
                Error::ErrAttributeTooShortIceCandidate(7),
            ),
            (
                "1 1 sctp 2130706431 10.0.0.1 5000 typ host",
                Error::ErrUnknownCandidateNetwork("sctp".to_owned()),
            ),
            (
                "1 1 udp 2130706431 not-an-ip 5000 typ host",
                Error::ErrInvalidCandidateAddress("not-an-ip".to_owned()),
            ),
            (
                "1 1 udp 2130706431 10.0.0.1 5000 typ bogus",
                Error::ErrUnknownCandidateType("bogus".to_owned()),
            ),
            (
                "1 1 udp 2130706431 10.0.0.1 5000 typ srflx raddr 10.0.0.2",
                Error::ErrParseRelatedAddr,
            ),
        ];

        for (raw, expected) in tests {
            assert_eq!(unmarshal_candidate(raw), Err(expected), "testCase: {raw}");
        }

        assert!(matches!(
            unmarshal_candidate("1 one udp 2130706431 10.0.0.1 5000 typ host"),
            Err(Error::ParseInt(_))
        ));
        assert!(matches!(
            unmarshal_candidate("1 1 udp 2130706431 10.0.0.1 99999 typ host"),
            Err(Error::ParseInt(_))
        ));
    }

    #[test]
    fn test_candidate_marshal_unmarshal() {
        let host: SocketAddr = "10.0.0.1:50001".parse().expect("addr");
        let srflx: SocketAddr = "203.0.113.1:50001".parse().expect("addr");
        let candidate = RTCIceCandidate::new(
            RTCIceCandidateType::Srflx,
            srflx,
            Some(host),
            Some("stun:stun.l.google.com:19302".to_owned()),
        );

        let parsed = unmarshal_candidate(&candidate.marshal()).expect("parse");
        assert_eq!(
            parsed,
            RTCIceCandidate {
                url: None,
                ..candidate.clone()
            }
        );

        let init = candidate.to_json();
        assert!(init.candidate.starts_with("candidate:"));
        assert!(!init.is_end_of_candidates());
        assert!(RTCIceCandidateInit::default().is_end_of_candidates());
    }

    #[test]
    fn test_candidate_priority() {
        let tests = vec![
            (RTCIceCandidateType::Host, 2130706431),
            (RTCIceCandidateType::Prflx, 1862270975),
            (RTCIceCandidateType::Srflx, 1694498815),
            (RTCIceCandidateType::Relay, 16777215),
        ];

        for (typ, expected) in tests {
            assert_eq!(
                candidate_priority(typ, DEFAULT_LOCAL_PREFERENCE, COMPONENT_RTP),
                expected,
                "testCase: {typ}"
            );
        }
    }

    #[test]
    fn test_candidate_init_json() {
        let init = RTCIceCandidateInit {
            candidate: "candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host".to_owned(),
            sdp_mid: Some("0".to_owned()),
            sdp_mline_index: Some(0),
            username_fragment: Some("ufrag".to_owned()),
            url: None,
        };

        let json = serde_json::to_string(&init).expect("json");
        assert_eq!(
            json,
            r#"{"candidate":"candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":"ufrag"}"#
        );
        let back: RTCIceCandidateInit = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, init);
    }
}
