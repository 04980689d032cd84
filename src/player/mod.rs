// Player capability
// A player yields a live stream of status observations and answers "what is playing now"

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::PlayerError;
use crate::track::{Status, Track};

pub mod mpd;

/// The two streams returned by [`Player::subscribe`]
///
/// A terminal error (see [`PlayerError::is_terminal`]) is the last value sent
/// before both streams close.
#[derive(Debug)]
pub struct Subscription {
    pub statuses: mpsc::Receiver<Status>,
    pub errors: mpsc::Receiver<PlayerError>,
}

pub trait Player: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Start watching the player
    fn subscribe(&self) -> impl Future<Output = Result<Subscription, PlayerError>> + Send;

    /// The track currently loaded in the player, `None` if it is stopped
    fn now_playing(&self) -> impl Future<Output = Result<Option<Track>, PlayerError>> + Send;
}
