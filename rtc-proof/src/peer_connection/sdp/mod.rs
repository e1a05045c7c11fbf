//! Session descriptions exchanged during the offer/answer handshake.

pub mod description;
pub(crate) mod sdp_type;
pub(crate) mod session_description;

pub use description::{Attribute, MediaDescription, Origin, SessionDescription};
pub use sdp_type::RTCSdpType;
pub use session_description::RTCSessionDescription;

use description::*;

const MEDIA_PROTOCOL_RTP: &str = "UDP/TLS/RTP/SAVPF";
const MEDIA_PROTOCOL_SCTP: &str = "UDP/DTLS/SCTP";
const DATA_CHANNEL_FORMAT: &str = "webrtc-datachannel";
const SCTP_PORT: u16 = 5000;

pub(crate) const PAYLOAD_TYPE_OPUS: u8 = 111;
pub(crate) const PAYLOAD_TYPE_VP8: u8 = 96;

/// What an `m=` section carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MediaSectionKind {
    Audio,
    Video,
    Application,
    /// Anything else in a remote offer; answered with port 0.
    Unsupported {
        media: String,
        protocol: String,
        formats: Vec<String>,
    },
}

impl MediaSectionKind {
    pub(crate) fn from_media(media: &MediaDescription) -> Self {
        match media.media.as_str() {
            "audio" => MediaSectionKind::Audio,
            "video" => MediaSectionKind::Video,
            "application" => MediaSectionKind::Application,
            _ => MediaSectionKind::Unsupported {
                media: media.media.clone(),
                protocol: media.protocol.clone(),
                formats: media.formats.clone(),
            },
        }
    }
}

/// One section to render, with the local tracks sent on it as
/// `(stream id, track id)`.
#[derive(Debug, Clone)]
pub(crate) struct MediaSection {
    pub(crate) mid: String,
    pub(crate) kind: MediaSectionKind,
    pub(crate) tracks: Vec<(String, String)>,
}

/// DTLS role advertised through `a=setup`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionRole {
    Actpass,
    Active,
}

impl ConnectionRole {
    fn as_str(self) -> &'static str {
        match self {
            ConnectionRole::Actpass => "actpass",
            ConnectionRole::Active => "active",
        }
    }
}

pub(crate) struct PopulateSdpParams<'a> {
    pub(crate) session_id: u64,
    pub(crate) session_version: u64,
    pub(crate) ice_ufrag: &'a str,
    pub(crate) ice_pwd: &'a str,
    pub(crate) connection_role: ConnectionRole,
    pub(crate) trickle: bool,
}

/// Renders the local media sections into a session description, bundled
/// over a single transport.
pub(crate) fn populate_sdp(
    params: &PopulateSdpParams<'_>,
    sections: &[MediaSection],
) -> SessionDescription {
    let mids: Vec<&str> = sections
        .iter()
        .filter(|section| !matches!(section.kind, MediaSectionKind::Unsupported { .. }))
        .map(|section| section.mid.as_str())
        .collect();

    let mut desc = SessionDescription::new(params.session_id, params.session_version)
        .with_value_attribute(ATTR_KEY_GROUP, format!("BUNDLE {}", mids.join(" ")));
    if params.trickle {
        desc = desc.with_value_attribute(ATTR_KEY_ICE_OPTIONS, "trickle".to_owned());
    }

    for section in sections {
        desc = desc.with_media(populate_media(params, section));
    }
    desc
}

fn populate_media(params: &PopulateSdpParams<'_>, section: &MediaSection) -> MediaDescription {
    let (media, protocol, formats) = match &section.kind {
        MediaSectionKind::Audio => ("audio", MEDIA_PROTOCOL_RTP, vec![PAYLOAD_TYPE_OPUS]),
        MediaSectionKind::Video => ("video", MEDIA_PROTOCOL_RTP, vec![PAYLOAD_TYPE_VP8]),
        MediaSectionKind::Application => {
            return MediaDescription::new(
                "application",
                MEDIA_PROTOCOL_SCTP,
                vec![DATA_CHANNEL_FORMAT.to_owned()],
            )
            .with_ice_credentials(params.ice_ufrag, params.ice_pwd)
            .with_value_attribute(ATTR_KEY_SETUP, params.connection_role.as_str().to_owned())
            .with_value_attribute(ATTR_KEY_MID, section.mid.clone())
            .with_value_attribute(ATTR_KEY_SCTP_PORT, SCTP_PORT.to_string());
        }
        MediaSectionKind::Unsupported {
            media,
            protocol,
            formats,
        } => {
            let mut rejected = MediaDescription::new(media, protocol, formats.clone())
                .with_value_attribute(ATTR_KEY_MID, section.mid.clone());
            rejected.port = 0;
            return rejected;
        }
    };

    let mut m = MediaDescription::new(
        media,
        protocol,
        formats.iter().map(|pt| pt.to_string()).collect(),
    )
    .with_ice_credentials(params.ice_ufrag, params.ice_pwd)
    .with_value_attribute(ATTR_KEY_SETUP, params.connection_role.as_str().to_owned())
    .with_value_attribute(ATTR_KEY_MID, section.mid.clone())
    .with_property_attribute(ATTR_KEY_RTCP_MUX);

    m = match section.kind {
        MediaSectionKind::Audio => m.with_value_attribute(
            ATTR_KEY_RTPMAP,
            format!("{PAYLOAD_TYPE_OPUS} opus/48000/2"),
        ),
        _ => m.with_value_attribute(ATTR_KEY_RTPMAP, format!("{PAYLOAD_TYPE_VP8} VP8/90000")),
    };

    if section.tracks.is_empty() {
        m = m.with_property_attribute(ATTR_KEY_RECV_ONLY);
    } else {
        m = m.with_property_attribute(ATTR_KEY_SEND_RECV);
        for (stream_id, track_id) in &section.tracks {
            m = m.with_value_attribute(ATTR_KEY_MSID, format!("{stream_id} {track_id}"));
        }
    }
    m
}

/// Appends gathered candidates to the first bundled section, followed by
/// `a=end-of-candidates` once gathering has finished.
pub(crate) fn populate_local_candidates(
    desc: &mut SessionDescription,
    candidates: &[String],
    gathering_complete: bool,
) {
    let Some(media) = desc
        .media_descriptions
        .iter_mut()
        .find(|media| media.port != 0)
    else {
        return;
    };
    for candidate in candidates {
        media
            .attributes
            .push(Attribute::new(ATTR_KEY_CANDIDATE, Some(candidate.clone())));
    }
    if gathering_complete {
        media
            .attributes
            .push(Attribute::new(ATTR_KEY_END_OF_CANDIDATES, None));
    }
}
