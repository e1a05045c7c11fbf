//! The environment a proof runs in.
//!
//! [`Platform`] exposes the capability flags the probe checks and the media
//! capture primitive. [`SimulatedPlatform`] is the in-process implementation
//! used by the demo and the tests. [`MediaAcquirer`] turns a capture failure
//! into an empty track list.

use crate::error::{Error, Result};
use crate::media_stream::track::{MediaStreamTrack, MediaStreamTrackKind};
use crate::media_stream::{MediaStream, MediaStreamConstraints};
use crate::peer_connection::transport::ice::rand::generate_id;

pub trait Platform: Send {
    fn has_peer_connection(&self) -> bool;
    fn has_media_capture(&self) -> bool;
    fn has_data_channel(&self) -> bool;

    /// Captures a stream satisfying `constraints`, or fails with
    /// [`Error::ErrMediaAccessDenied`].
    fn get_user_media(&mut self, constraints: &MediaStreamConstraints) -> Result<MediaStream>;
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum MediaAccess {
    #[default]
    Granted,
    Denied,
}

/// A platform with every primitive present and fake capture devices.
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    peer_connection: bool,
    media_capture: bool,
    data_channel: bool,
    media_access: MediaAccess,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self {
            peer_connection: true,
            media_capture: true,
            data_channel: true,
            media_access: MediaAccess::Granted,
        }
    }
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer_connection(mut self, available: bool) -> Self {
        self.peer_connection = available;
        self
    }

    pub fn with_media_capture(mut self, available: bool) -> Self {
        self.media_capture = available;
        self
    }

    pub fn with_data_channel(mut self, available: bool) -> Self {
        self.data_channel = available;
        self
    }

    pub fn with_media_access(mut self, media_access: MediaAccess) -> Self {
        self.media_access = media_access;
        self
    }
}

impl Platform for SimulatedPlatform {
    fn has_peer_connection(&self) -> bool {
        self.peer_connection
    }

    fn has_media_capture(&self) -> bool {
        self.media_capture
    }

    fn has_data_channel(&self) -> bool {
        self.data_channel
    }

    fn get_user_media(&mut self, constraints: &MediaStreamConstraints) -> Result<MediaStream> {
        if !self.media_capture {
            return Err(Error::ErrMediaAccessDenied("NotSupportedError".to_owned()));
        }
        if self.media_access == MediaAccess::Denied {
            return Err(Error::ErrMediaAccessDenied("NotAllowedError".to_owned()));
        }

        let stream_id = generate_id(16);
        let mut tracks = vec![];
        if constraints.audio {
            tracks.push(MediaStreamTrack::new(
                stream_id.clone(),
                generate_id(16),
                MediaStreamTrackKind::Audio,
                "Simulated Microphone".to_owned(),
            ));
        }
        if let Some(video) = &constraints.video {
            tracks.push(MediaStreamTrack::new(
                stream_id.clone(),
                generate_id(16),
                MediaStreamTrackKind::Video,
                format!("Simulated Camera ({}x{})", video.width, video.height),
            ));
        }
        Ok(MediaStream::new(stream_id, tracks))
    }
}

/// Optional media acquisition step. Never fails the proof.
pub struct MediaAcquirer<'a> {
    platform: &'a mut dyn Platform,
}

impl<'a> MediaAcquirer<'a> {
    pub fn new(platform: &'a mut dyn Platform) -> Self {
        Self { platform }
    }

    /// Returns the captured stream, or `None` when nothing was requested or
    /// access was refused.
    pub fn acquire(&mut self, constraints: &MediaStreamConstraints) -> Option<MediaStream> {
        if constraints.is_empty() {
            log::info!("no media requested");
            return None;
        }
        match self.platform.get_user_media(constraints) {
            Ok(stream) => {
                let count = stream.get_tracks().count();
                log::info!("got {count} media tracks");
                for track in stream.get_tracks() {
                    log::info!("  {} track: {}", track.kind(), track.label());
                }
                Some(stream)
            }
            Err(err) => {
                log::warn!("media access denied, continuing without media: {err}");
                None
            }
        }
    }
}
