//! Watches music players and reports what you listen to.
//!
//! Every configured [`Player`](player::Player) is paired with every configured
//! [`Target`](target::Target). Each pair runs its own [`Scheduler`](scheduler::Scheduler),
//! which sends a "now playing" notification as soon as a new track starts and
//! submits a listen once the track has played for half its length or four
//! minutes, whichever comes first. A track that changes or stops before then
//! never gets a listen.

pub mod config;
pub mod driver;
pub mod error;
pub mod player;
pub mod scheduler;
pub mod target;
pub mod text_cleanup;
pub mod track;

#[cfg(test)]
mod testing;

pub use driver::Driver;
pub use error::{Error, PairError, PlayerError};
pub use track::{PlaybackState, Status, Track};
