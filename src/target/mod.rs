// Target capability
// Contains the submission contract and implementations for the scrobbling services

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

use crate::config::Config;
use crate::track::Track;

pub mod lastfm;
pub mod lastfm_auth;
pub mod listenbrainz;

use lastfm::LastFm;
use listenbrainz::ListenBrainz;

/// Upper bound on how long a track has to play before it counts as a listen
pub const MAX_SUBMISSION_TIME: Duration = Duration::from_secs(240);

/// Half the track or four minutes, whichever is lower
///
/// See <https://listenbrainz.readthedocs.io/en/latest/users/api/core.html>.
pub fn submission_time(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs() / 2).min(MAX_SUBMISSION_TIME)
}

/// Common trait for all scrobbling services
pub trait Target: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Update "now playing" status
    fn submit_playing_now(&self, track: &Track) -> impl Future<Output = Result<()>> + Send;

    /// Record a completed listen
    fn submit_listen(&self, track: &Track) -> impl Future<Output = Result<()>> + Send;

    /// How long after playback starts a listen is earned
    fn submission_time(&self, duration: Duration) -> Duration {
        submission_time(duration)
    }
}

/// Scrobbling service
pub enum Service {
    LastFm(LastFm),
    ListenBrainz(ListenBrainz),
}

impl Service {
    /// Build every enabled service from the configuration
    pub fn from_config(config: &Config) -> Result<Vec<Self>> {
        let mut services = Vec::new();

        if let Some(lastfm) = config.lastfm.as_ref().filter(|l| l.enabled) {
            services.push(Self::LastFm(LastFm::new(lastfm)));
        }

        for lb in config.listenbrainz.iter().filter(|l| l.enabled) {
            services.push(Self::ListenBrainz(ListenBrainz::new(lb)?));
        }

        Ok(services)
    }
}

impl Target for Service {
    fn name(&self) -> &str {
        match self {
            Self::LastFm(lastfm) => lastfm.name(),
            Self::ListenBrainz(lb) => lb.name(),
        }
    }

    async fn submit_playing_now(&self, track: &Track) -> Result<()> {
        match self {
            Self::LastFm(lastfm) => lastfm.submit_playing_now(track).await,
            Self::ListenBrainz(lb) => lb.submit_playing_now(track).await,
        }
    }

    async fn submit_listen(&self, track: &Track) -> Result<()> {
        match self {
            Self::LastFm(lastfm) => lastfm.submit_listen(track).await,
            Self::ListenBrainz(lb) => lb.submit_listen(track).await,
        }
    }
}
