//! A line-oriented model of the session description protocol.
//!
//! Only the parts the proof handshake reads or writes are modelled: the
//! origin, session and media level attributes, and media lines. Unknown
//! lines are accepted and dropped.

use std::fmt;

use crate::error::{Error, Result};

pub const ATTR_KEY_GROUP: &str = "group";
pub const ATTR_KEY_MID: &str = "mid";
pub const ATTR_KEY_ICE_UFRAG: &str = "ice-ufrag";
pub const ATTR_KEY_ICE_PWD: &str = "ice-pwd";
pub const ATTR_KEY_ICE_OPTIONS: &str = "ice-options";
pub const ATTR_KEY_CANDIDATE: &str = "candidate";
pub const ATTR_KEY_END_OF_CANDIDATES: &str = "end-of-candidates";
pub const ATTR_KEY_SETUP: &str = "setup";
pub const ATTR_KEY_RTCP_MUX: &str = "rtcp-mux";
pub const ATTR_KEY_RTPMAP: &str = "rtpmap";
pub const ATTR_KEY_MSID: &str = "msid";
pub const ATTR_KEY_SCTP_PORT: &str = "sctp-port";
pub const ATTR_KEY_SEND_RECV: &str = "sendrecv";
pub const ATTR_KEY_RECV_ONLY: &str = "recvonly";

const CRLF: &str = "\r\n";

/// `a=<key>` or `a=<key>:<value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(key: &str, value: Option<String>) -> Self {
        Attribute {
            key: key.to_owned(),
            value,
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((key, value)) => Attribute::new(key, Some(value.to_owned())),
            None => Attribute::new(raw, None),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}:{}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

/// `o=<username> <sess-id> <sess-version> IN IP4 <unicast-address>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub network_type: String,
    pub address_type: String,
    pub unicast_address: String,
}

impl Default for Origin {
    fn default() -> Self {
        Origin {
            username: "-".to_owned(),
            session_id: 0,
            session_version: 0,
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            unicast_address: "0.0.0.0".to_owned(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.network_type,
            self.address_type,
            self.unicast_address
        )
    }
}

impl Origin {
    fn parse(raw: &str) -> Result<Self> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(Error::ErrSdpInvalidValue(format!("o={raw}")));
        }
        Ok(Origin {
            username: fields[0].to_owned(),
            session_id: parse_number(fields[1], raw)?,
            session_version: parse_number(fields[2], raw)?,
            network_type: fields[3].to_owned(),
            address_type: fields[4].to_owned(),
            unicast_address: fields[5].to_owned(),
        })
    }
}

/// One `m=` section and the lines that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<String>,
    pub connection: Option<String>,
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    pub fn new(media: &str, protocol: &str, formats: Vec<String>) -> Self {
        MediaDescription {
            media: media.to_owned(),
            port: 9,
            protocol: protocol.to_owned(),
            formats,
            connection: Some("IN IP4 0.0.0.0".to_owned()),
            attributes: vec![],
        }
    }

    pub fn with_value_attribute(mut self, key: &str, value: String) -> Self {
        self.attributes.push(Attribute::new(key, Some(value)));
        self
    }

    pub fn with_property_attribute(mut self, key: &str) -> Self {
        self.attributes.push(Attribute::new(key, None));
        self
    }

    pub fn with_ice_credentials(self, ufrag: &str, pwd: &str) -> Self {
        self.with_value_attribute(ATTR_KEY_ICE_UFRAG, ufrag.to_owned())
            .with_value_attribute(ATTR_KEY_ICE_PWD, pwd.to_owned())
    }

    pub fn with_candidate(self, candidate: String) -> Self {
        self.with_value_attribute(ATTR_KEY_CANDIDATE, candidate)
    }

    /// Value of the first attribute named `key`; flags yield `Some("")`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        find_attribute(&self.attributes, key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.iter().any(|a| a.key == key)
    }

    fn marshal_into(&self, out: &mut String) {
        let mut line = format!("m={} {} {}", self.media, self.port, self.protocol);
        for format in &self.formats {
            line.push(' ');
            line.push_str(format);
        }
        push_line(out, &line);
        if let Some(connection) = &self.connection {
            push_line(out, &format!("c={connection}"));
        }
        for attribute in &self.attributes {
            push_line(out, &format!("a={attribute}"));
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(Error::ErrSdpInvalidValue(format!("m={raw}")));
        }
        Ok(MediaDescription {
            media: fields[0].to_owned(),
            port: parse_number(fields[1], raw)?,
            protocol: fields[2].to_owned(),
            formats: fields[3..].iter().map(|f| (*f).to_owned()).collect(),
            connection: None,
            attributes: vec![],
        })
    }
}

/// A parsed session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: u32,
    pub origin: Origin,
    pub session_name: String,
    pub connection: Option<String>,
    pub timing: String,
    pub attributes: Vec<Attribute>,
    pub media_descriptions: Vec<MediaDescription>,
}

impl Default for SessionDescription {
    fn default() -> Self {
        SessionDescription {
            version: 0,
            origin: Origin::default(),
            session_name: "-".to_owned(),
            connection: None,
            timing: "0 0".to_owned(),
            attributes: vec![],
            media_descriptions: vec![],
        }
    }
}

impl SessionDescription {
    pub fn new(session_id: u64, session_version: u64) -> Self {
        SessionDescription {
            origin: Origin {
                session_id,
                session_version,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_value_attribute(mut self, key: &str, value: String) -> Self {
        self.attributes.push(Attribute::new(key, Some(value)));
        self
    }

    pub fn with_media(mut self, media: MediaDescription) -> Self {
        self.media_descriptions.push(media);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        find_attribute(&self.attributes, key)
    }

    /// ICE credentials from the session level, falling back to the first
    /// media section that carries them.
    pub fn ice_credentials(&self) -> (Option<&str>, Option<&str>) {
        let lookup = |key: &str| {
            self.attribute(key).or_else(|| {
                self.media_descriptions
                    .iter()
                    .find_map(|media| media.attribute(key))
            })
        };
        (lookup(ATTR_KEY_ICE_UFRAG), lookup(ATTR_KEY_ICE_PWD))
    }

    /// `(m-line index, mid, candidate value)` for every `a=candidate` line.
    pub fn candidates(&self) -> Vec<(u16, Option<String>, String)> {
        let mut candidates = vec![];
        for (index, media) in self.media_descriptions.iter().enumerate() {
            let mid = media.attribute(ATTR_KEY_MID).map(str::to_owned);
            for attribute in &media.attributes {
                if attribute.key == ATTR_KEY_CANDIDATE {
                    if let Some(value) = &attribute.value {
                        candidates.push((index as u16, mid.clone(), value.clone()));
                    }
                }
            }
        }
        candidates
    }

    pub fn marshal(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, &format!("v={}", self.version));
        push_line(&mut out, &format!("o={}", self.origin));
        push_line(&mut out, &format!("s={}", self.session_name));
        if let Some(connection) = &self.connection {
            push_line(&mut out, &format!("c={connection}"));
        }
        push_line(&mut out, &format!("t={}", self.timing));
        for attribute in &self.attributes {
            push_line(&mut out, &format!("a={attribute}"));
        }
        for media in &self.media_descriptions {
            media.marshal_into(&mut out);
        }
        out
    }

    pub fn unmarshal(raw: &str) -> Result<Self> {
        let mut desc = SessionDescription::default();
        let mut seen_version = false;
        let mut seen_origin = false;

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((key, value)) if key.len() == 1 => (key, value),
                _ => return Err(Error::ErrSdpInvalidSyntax(line.to_owned())),
            };
            if !seen_version && key != "v" {
                return Err(Error::ErrSdpInvalidSyntax(line.to_owned()));
            }

            match key {
                "v" => {
                    desc.version = parse_number(value, line)?;
                    seen_version = true;
                }
                "o" => {
                    desc.origin = Origin::parse(value)?;
                    seen_origin = true;
                }
                "s" => desc.session_name = value.to_owned(),
                "t" => desc.timing = value.to_owned(),
                "m" => desc
                    .media_descriptions
                    .push(MediaDescription::parse(value)?),
                "c" => match desc.media_descriptions.last_mut() {
                    Some(media) => media.connection = Some(value.to_owned()),
                    None => desc.connection = Some(value.to_owned()),
                },
                "a" => {
                    let attribute = Attribute::parse(value);
                    match desc.media_descriptions.last_mut() {
                        Some(media) => media.attributes.push(attribute),
                        None => desc.attributes.push(attribute),
                    }
                }
                _ => {}
            }
        }

        if !seen_version || !seen_origin {
            return Err(Error::ErrSdpInvalidSyntax(
                "missing v= or o= line".to_owned(),
            ));
        }

        Ok(desc)
    }
}

fn find_attribute<'a>(attributes: &'a [Attribute], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.key == key)
        .map(|a| a.value.as_deref().unwrap_or_default())
}

fn parse_number<T: std::str::FromStr>(field: &str, line: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| Error::ErrSdpInvalidValue(line.to_owned()))
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str(CRLF);
}
