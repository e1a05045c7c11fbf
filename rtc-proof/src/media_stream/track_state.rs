//! MediaStreamTrack State
//!
//! Lifecycle state of a [`MediaStreamTrack`](super::track::MediaStreamTrack).
//! A track starts `live` and ends once [`stop`](super::track::MediaStreamTrack::stop)
//! is called on any handle to it.

use std::fmt;

use serde::Serialize;

use crate::peer_connection::state::UNSPECIFIED_STR;

/// Represents the lifecycle state of a media stream track.
///
/// ```
/// use rtc_proof::media_stream::MediaStreamTrackState;
///
/// assert_eq!(MediaStreamTrackState::Live.to_string(), "live");
/// assert_eq!(MediaStreamTrackState::from("ended"), MediaStreamTrackState::Ended);
/// ```
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum MediaStreamTrackState {
    #[serde(rename = "unspecified")]
    Unspecified,

    /// The track is active and providing media data.
    #[default]
    #[serde(rename = "live")]
    Live,

    /// The track has permanently ended.
    #[serde(rename = "ended")]
    Ended,
}

const MEDIA_STREAM_TRACK_STATE_LIVE_STR: &str = "live";
const MEDIA_STREAM_TRACK_STATE_ENDED_STR: &str = "ended";

impl From<&str> for MediaStreamTrackState {
    fn from(raw: &str) -> Self {
        match raw {
            MEDIA_STREAM_TRACK_STATE_LIVE_STR => MediaStreamTrackState::Live,
            MEDIA_STREAM_TRACK_STATE_ENDED_STR => MediaStreamTrackState::Ended,
            _ => MediaStreamTrackState::Unspecified,
        }
    }
}

impl fmt::Display for MediaStreamTrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            MediaStreamTrackState::Live => MEDIA_STREAM_TRACK_STATE_LIVE_STR,
            MediaStreamTrackState::Ended => MEDIA_STREAM_TRACK_STATE_ENDED_STR,
            MediaStreamTrackState::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
