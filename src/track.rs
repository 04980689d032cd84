// Track and playback status model

use std::fmt;
use std::time::Duration;

/// A music track, identified by its (title, artist, album) tuple
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Playback state reported by a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

/// One observation of a player's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub track: Track,
    /// Total length of the track, `None` when the player did not report a usable one
    pub duration: Option<Duration>,
    pub elapsed: Duration,
    pub state: PlaybackState,
}

impl Status {
    pub fn playing(track: Track, duration: Duration) -> Self {
        Self {
            track,
            duration: Some(duration),
            elapsed: Duration::ZERO,
            state: PlaybackState::Playing,
        }
    }

    pub fn stopped() -> Self {
        Self {
            track: Track::default(),
            duration: None,
            elapsed: Duration::ZERO,
            state: PlaybackState::Stopped,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}
