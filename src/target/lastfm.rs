// Last.fm target
// rustfm-scrobble-proxy is blocking, so every call runs on the blocking pool

use std::sync::Arc;

use anyhow::{Context, Result};
use rustfm_scrobble_proxy::{Scrobble, Scrobbler as LastFmScrobbler};

use super::Target;
use crate::config::LastFmConfig;
use crate::track::Track;

pub struct LastFm {
    client: Arc<LastFmScrobbler>,
}

impl LastFm {
    pub fn new(config: &LastFmConfig) -> Self {
        let mut client = LastFmScrobbler::new(&config.api_key, &config.api_secret);
        client.authenticate_with_session_key(&config.session_key);
        Self {
            client: Arc::new(client),
        }
    }
}

fn scrobble_for(track: &Track) -> Scrobble {
    let album = Some(track.album.as_str()).filter(|album| !album.is_empty());
    Scrobble::new(&track.artist, &track.title, album)
}

impl Target for LastFm {
    fn name(&self) -> &str {
        "Last.fm"
    }

    async fn submit_playing_now(&self, track: &Track) -> Result<()> {
        let client = Arc::clone(&self.client);
        let scrobble = scrobble_for(track);

        tokio::task::spawn_blocking(move || client.now_playing(&scrobble))
            .await
            .context("Last.fm worker panicked")?
            .context("Failed to update now playing on Last.fm")?;

        log::info!("Last.fm: Now playing updated");
        Ok(())
    }

    async fn submit_listen(&self, track: &Track) -> Result<()> {
        let client = Arc::clone(&self.client);
        let mut scrobble = scrobble_for(track);
        scrobble.with_timestamp(chrono::Utc::now().timestamp() as u64);

        tokio::task::spawn_blocking(move || client.scrobble(&scrobble))
            .await
            .context("Last.fm worker panicked")?
            .context("Failed to scrobble to Last.fm")?;

        log::info!("Last.fm: Scrobbled successfully");
        Ok(())
    }
}
