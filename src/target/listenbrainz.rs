// ListenBrainz target
// API Documentation: https://listenbrainz.readthedocs.io/

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use backoff::ExponentialBackoff;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::Target;
use crate::config::ListenBrainzConfig;
use crate::track::Track;

/// Give up retrying a submission after this long
const RETRY_WINDOW: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum ListenType {
    PlayingNow,
    Single,
}

#[derive(Debug, Serialize)]
struct Submission<'a> {
    listen_type: ListenType,
    payload: [Payload<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    listened_at: Option<i64>,
    track_metadata: TrackMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct TrackMetadata<'a> {
    track_name: &'a str,
    artist_name: &'a str,
    release_name: &'a str,
}

impl<'a> Submission<'a> {
    fn playing_now(track: &'a Track) -> Self {
        Self::new(ListenType::PlayingNow, None, track)
    }

    fn single(track: &'a Track, listened_at: i64) -> Self {
        Self::new(ListenType::Single, Some(listened_at), track)
    }

    fn new(listen_type: ListenType, listened_at: Option<i64>, track: &'a Track) -> Self {
        Self {
            listen_type,
            payload: [Payload {
                listened_at,
                track_metadata: TrackMetadata {
                    track_name: &track.title,
                    artist_name: &track.artist,
                    release_name: &track.album,
                },
            }],
        }
    }
}

pub struct ListenBrainz {
    name: String,
    token: String,
    endpoint: String,
    client: Client,
}

impl ListenBrainz {
    pub fn new(config: &ListenBrainzConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("libra/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: format!("ListenBrainz ({})", config.name),
            token: config.token.clone(),
            endpoint: format!("{}/1/submit-listens", config.api_url.trim_end_matches('/')),
            client,
        })
    }

    /// POST a submission, retrying while the failure looks temporary
    async fn submit(&self, submission: &Submission<'_>) -> Result<()> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(RETRY_WINDOW),
            ..ExponentialBackoff::default()
        };

        let client = &self.client;
        let endpoint = self.endpoint.as_str();
        let authorization = format!("Token {}", self.token);
        let authorization = authorization.as_str();

        backoff::future::retry(policy, || async move {
            let response = client
                .post(endpoint)
                .header(AUTHORIZATION, authorization)
                .json(submission)
                .send()
                .await
                .context("Failed to send request to ListenBrainz")
                .map_err(backoff::Error::transient)?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            let err = anyhow!("ListenBrainz API error ({}): {}", status, body);
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                log::debug!("{}", err);
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            }
        })
        .await
    }
}

impl Target for ListenBrainz {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_playing_now(&self, track: &Track) -> Result<()> {
        log::debug!("Sending now playing to {}: {}", self.name, track);

        self.submit(&Submission::playing_now(track))
            .await
            .context("Failed to update now playing on ListenBrainz")?;

        log::info!("{}: Now playing updated", self.name);
        Ok(())
    }

    async fn submit_listen(&self, track: &Track) -> Result<()> {
        log::debug!("Submitting listen to {}: {}", self.name, track);

        let listened_at = chrono::Utc::now().timestamp();
        self.submit(&Submission::single(track, listened_at))
            .await
            .context("Failed to submit listen to ListenBrainz")?;

        log::info!("{}: Listen submitted", self.name);
        Ok(())
    }
}
