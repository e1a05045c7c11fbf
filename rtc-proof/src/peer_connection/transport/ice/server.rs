use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 3478;
const DEFAULT_TLS_PORT: u16 = 5349;

/// Describes a single STUN and TURN server that can be used by
/// the ICE agent to establish a connection with a peer.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl RTCIceServer {
    pub(crate) fn parse_url(&self, url_str: &str) -> Result<IceUrl> {
        IceUrl::parse_url(url_str)
    }

    /// Parses every url of the server, checking TURN credentials.
    pub(crate) fn urls(&self) -> Result<Vec<IceUrl>> {
        let mut urls = vec![];

        for url_str in &self.urls {
            let url = self.parse_url(url_str)?;
            if url.scheme.is_turn() && (self.username.is_empty() || self.credential.is_empty()) {
                return Err(Error::ErrNoTurnCredentials);
            }
            urls.push(url);
        }

        Ok(urls)
    }

    /// Validates the server, for use before any endpoint is built.
    pub fn validate(&self) -> Result<()> {
        self.urls().map(|_| ())
    }
}

/// The scheme of an ICE server url.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SchemeType {
    Stun,
    Stuns,
    Turn,
    Turns,
}

impl SchemeType {
    fn from_scheme(raw: &str) -> Option<Self> {
        match raw {
            "stun" => Some(SchemeType::Stun),
            "stuns" => Some(SchemeType::Stuns),
            "turn" => Some(SchemeType::Turn),
            "turns" => Some(SchemeType::Turns),
            _ => None,
        }
    }

    pub(crate) fn is_turn(self) -> bool {
        matches!(self, SchemeType::Turn | SchemeType::Turns)
    }

    fn is_secure(self) -> bool {
        matches!(self, SchemeType::Stuns | SchemeType::Turns)
    }
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SchemeType::Stun => "stun",
            SchemeType::Stuns => "stuns",
            SchemeType::Turn => "turn",
            SchemeType::Turns => "turns",
        };
        write!(f, "{s}")
    }
}

/// A parsed STUN or TURN url (RFC 7064, RFC 7065).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IceUrl {
    pub(crate) scheme: SchemeType,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) tcp: bool,
}

impl fmt::Display for IceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.scheme.is_turn() {
            let transport = if self.tcp { "tcp" } else { "udp" };
            write!(
                f,
                "{}:{}:{}?transport={}",
                self.scheme, host, self.port, transport
            )
        } else {
            write!(f, "{}:{}:{}", self.scheme, host, self.port)
        }
    }
}

impl IceUrl {
    pub(crate) fn parse_url(raw: &str) -> Result<Self> {
        if raw.contains("//") {
            return Err(Error::ErrInvalidIceServerUrl(raw.to_owned()));
        }

        let Some(pos) = raw.find(':') else {
            return Err(Error::ErrInvalidIceServerUrl(raw.to_owned()));
        };
        let scheme_str = &raw[..pos];
        let scheme = SchemeType::from_scheme(scheme_str)
            .ok_or_else(|| Error::ErrUnknownIceServerScheme(scheme_str.to_owned()))?;

        // stun:host:port is an opaque url, rewrite it so the authority parses
        let mut s = raw.to_owned();
        s.replace_range(pos..=pos, "://");
        let raw_parts = url::Url::parse(&s)
            .map_err(|err| Error::ErrInvalidIceServerUrl(format!("{raw}: {err}")))?;

        let host = match raw_parts.host_str() {
            Some(host) if !host.trim().is_empty() => host
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_owned(),
            _ => return Err(Error::ErrInvalidIceServerUrl(raw.to_owned())),
        };

        let port = raw_parts.port().unwrap_or(if scheme.is_secure() {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PORT
        });

        let mut tcp = scheme == SchemeType::Turns;
        for (key, value) in raw_parts.query_pairs() {
            if !scheme.is_turn() || key != "transport" {
                return Err(Error::ErrInvalidIceServerUrl(raw.to_owned()));
            }
            tcp = match value.as_ref() {
                "udp" => false,
                "tcp" => true,
                _ => return Err(Error::ErrInvalidIceServerUrl(raw.to_owned())),
            };
        }

        Ok(IceUrl {
            scheme,
            host,
            port,
            tcp,
        })
    }
}
