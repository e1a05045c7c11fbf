use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::track_state::MediaStreamTrackState;
use crate::peer_connection::state::UNSPECIFIED_STR;

pub type MediaStreamTrackId = String;

/// Kind of media a track carries.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaStreamTrackKind {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "video")]
    Video,
}

const MEDIA_STREAM_TRACK_KIND_AUDIO_STR: &str = "audio";
const MEDIA_STREAM_TRACK_KIND_VIDEO_STR: &str = "video";

impl From<&str> for MediaStreamTrackKind {
    fn from(raw: &str) -> Self {
        match raw {
            MEDIA_STREAM_TRACK_KIND_AUDIO_STR => MediaStreamTrackKind::Audio,
            MEDIA_STREAM_TRACK_KIND_VIDEO_STR => MediaStreamTrackKind::Video,
            _ => MediaStreamTrackKind::Unspecified,
        }
    }
}

impl fmt::Display for MediaStreamTrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            MediaStreamTrackKind::Audio => MEDIA_STREAM_TRACK_KIND_AUDIO_STR,
            MediaStreamTrackKind::Video => MEDIA_STREAM_TRACK_KIND_VIDEO_STR,
            MediaStreamTrackKind::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

/// A single media track handed out by the platform.
///
/// Clones share the ready state, so a track stopped through one handle reads
/// as ended through every other handle, including the one held by the
/// endpoint it was added to.
#[derive(Debug, Clone)]
pub struct MediaStreamTrack {
    stream_id: String,
    track_id: MediaStreamTrackId,
    kind: MediaStreamTrackKind,
    label: String,
    ended: Arc<AtomicBool>,
}

impl PartialEq for MediaStreamTrack {
    fn eq(&self, other: &Self) -> bool {
        self.track_id == other.track_id
    }
}

impl MediaStreamTrack {
    pub fn new(
        stream_id: String,
        track_id: MediaStreamTrackId,
        kind: MediaStreamTrackKind,
        label: String,
    ) -> Self {
        Self {
            stream_id,
            track_id,
            kind,
            label,
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn track_id(&self) -> &MediaStreamTrackId {
        &self.track_id
    }

    pub fn kind(&self) -> MediaStreamTrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ready_state(&self) -> MediaStreamTrackState {
        if self.ended.load(Ordering::SeqCst) {
            MediaStreamTrackState::Ended
        } else {
            MediaStreamTrackState::Live
        }
    }

    /// Ends the track. Stopping an ended track does nothing.
    pub fn stop(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            log::debug!("track {} ({}) stopped", self.track_id, self.kind);
        }
    }
}
