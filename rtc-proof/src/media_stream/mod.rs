//! Local media handed out by the platform.
//!
//! Media is optional for a connectivity proof: tracks only shape the offer's
//! audio/video sections, no samples ever flow.

pub mod track;
pub mod track_state;

use serde::{Deserialize, Serialize};

pub use track::{MediaStreamTrack, MediaStreamTrackId, MediaStreamTrackKind};
pub use track_state::MediaStreamTrackState;

pub type MediaStreamId = String;

/// A group of tracks acquired together.
#[derive(Default, Debug, Clone)]
pub struct MediaStream {
    stream_id: MediaStreamId,
    tracks: Vec<MediaStreamTrack>,
}

impl MediaStream {
    pub fn new(stream_id: MediaStreamId, tracks: Vec<MediaStreamTrack>) -> Self {
        Self { stream_id, tracks }
    }

    pub fn stream_id(&self) -> &MediaStreamId {
        &self.stream_id
    }

    /// A stream is active while at least one of its tracks is live.
    pub fn active(&self) -> bool {
        self.tracks
            .iter()
            .any(|track| track.ready_state() == MediaStreamTrackState::Live)
    }

    pub fn get_audio_tracks(&self) -> impl Iterator<Item = &MediaStreamTrack> {
        self.tracks
            .iter()
            .filter(|track| track.kind() == MediaStreamTrackKind::Audio)
    }

    pub fn get_video_tracks(&self) -> impl Iterator<Item = &MediaStreamTrack> {
        self.tracks
            .iter()
            .filter(|track| track.kind() == MediaStreamTrackKind::Video)
    }

    pub fn get_tracks(&self) -> impl Iterator<Item = &MediaStreamTrack> {
        self.tracks.iter()
    }

    pub fn get_track_by_id(&self, track_id: &str) -> Option<&MediaStreamTrack> {
        self.tracks.iter().find(|track| track.track_id() == track_id)
    }

    pub fn add_track(&mut self, track: MediaStreamTrack) {
        if self.get_track_by_id(track.track_id()).is_none() {
            self.tracks.push(track);
        }
    }

    /// Stops every track of the stream.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Requested video resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        VideoConstraints {
            width: 640,
            height: 480,
        }
    }
}

/// What to ask the platform for when acquiring media.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaStreamConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
}

impl Default for MediaStreamConstraints {
    fn default() -> Self {
        MediaStreamConstraints {
            audio: true,
            video: Some(VideoConstraints::default()),
        }
    }
}

impl MediaStreamConstraints {
    /// Constraints that request nothing.
    pub fn none() -> Self {
        MediaStreamConstraints {
            audio: false,
            video: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.audio && self.video.is_none()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn track(id: &str, kind: MediaStreamTrackKind) -> MediaStreamTrack {
        MediaStreamTrack::new("stream".to_owned(), id.to_owned(), kind, id.to_owned())
    }

    #[test]
    fn test_media_stream_tracks_by_kind() {
        let mut stream = MediaStream::new(
            "stream".to_owned(),
            vec![
                track("mic", MediaStreamTrackKind::Audio),
                track("cam", MediaStreamTrackKind::Video),
            ],
        );
        stream.add_track(track("mic", MediaStreamTrackKind::Audio));

        assert_eq!(stream.get_tracks().count(), 2);
        assert_eq!(stream.get_audio_tracks().count(), 1);
        assert_eq!(stream.get_video_tracks().count(), 1);
        assert!(stream.get_track_by_id("cam").is_some());
    }

    #[test]
    fn test_media_stream_stop() {
        let stream = MediaStream::new(
            "stream".to_owned(),
            vec![track("mic", MediaStreamTrackKind::Audio)],
        );
        assert!(stream.active());
        stream.stop();
        assert!(!stream.active());
    }

    #[test]
    fn test_media_stream_constraints_json() {
        let tests = vec![
            ("{}", MediaStreamConstraints::default()),
            (
                r#"{"audio": false, "video": null}"#,
                MediaStreamConstraints::none(),
            ),
            (
                r#"{"video": {"width": 1280, "height": 720}}"#,
                MediaStreamConstraints {
                    audio: true,
                    video: Some(VideoConstraints {
                        width: 1280,
                        height: 720,
                    }),
                },
            ),
        ];

        for (raw, expected) in tests {
            let constraints: MediaStreamConstraints = serde_json::from_str(raw).expect("json");
            assert_eq!(constraints, expected, "testCase: {raw}");
        }
        assert!(MediaStreamConstraints::none().is_empty());
    }
}
