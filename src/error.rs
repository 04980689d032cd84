// Error types shared by players, targets and the scheduler

use std::fmt;
use std::io;

use thiserror::Error;

use crate::track::Track;

/// Errors produced by a player connection
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("connection lost: {0}")]
    Disconnected(#[source] io::Error),
    #[error("player rejected `{command}`: {message}")]
    Ack { command: String, message: String },
    #[error("malformed reply: {0}")]
    Protocol(String),
    #[error("player unavailable: {0}")]
    Unavailable(String),
}

impl PlayerError {
    /// Whether the subscription that produced this error has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Disconnected(_))
    }
}

/// Which kind of submission failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    PlayingNow,
    Listen,
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayingNow => f.write_str("now playing"),
            Self::Listen => f.write_str("listen"),
        }
    }
}

/// Errors observed while driving a player/target pair
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error("{kind} submission of {track} failed: {cause:#}")]
    Submission {
        kind: SubmissionKind,
        track: Track,
        cause: anyhow::Error,
    },
    #[error("cannot schedule a listen for {0}: track duration is unknown")]
    UnknownDuration(Track),
}

/// An [`Error`] tagged with the pair it came from
#[derive(Debug)]
pub struct PairError {
    pub player: String,
    pub target: String,
    pub error: Error,
}

impl fmt::Display for PairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} -> {}] {}", self.player, self.target, self.error)
    }
}
