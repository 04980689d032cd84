// Submission scheduler
// Turns one player's status stream into "now playing" and "listen" submissions for one target

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Sleep;

use crate::error::{Error, PairError, SubmissionKind};
use crate::player::Player;
use crate::target::Target;
use crate::track::{Status, Track};

/// Where a pair sends the errors it runs into
pub type ErrorSink = mpsc::UnboundedSender<PairError>;

#[derive(Debug)]
enum Submission {
    PlayingNow(Track),
    Listen(Track),
}

type Queue = mpsc::UnboundedSender<Submission>;

/// A deferred listen; dropping it cancels the submission
struct SubmissionTimer {
    sleep: Pin<Box<Sleep>>,
}

impl SubmissionTimer {
    fn new(delay: Duration) -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(delay)),
        }
    }
}

enum State {
    Idle,
    /// `timer` is `None` once it fired, or when no listen can be scheduled
    Playing {
        track: Track,
        timer: Option<SubmissionTimer>,
    },
}

impl State {
    /// Resolves when the armed timer is due, never if there is none
    async fn deadline(&mut self) {
        match self {
            Self::Playing {
                timer: Some(timer), ..
            } => timer.sleep.as_mut().await,
            _ => std::future::pending().await,
        }
    }
}

/// Drives a single player/target pair
pub struct Scheduler<P, T> {
    player: Arc<P>,
    target: Arc<T>,
    errors: ErrorSink,
    state: State,
}

impl<P: Player, T: Target> Scheduler<P, T> {
    pub fn new(player: Arc<P>, target: Arc<T>, errors: ErrorSink) -> Self {
        Self {
            player,
            target,
            errors,
            state: State::Idle,
        }
    }

    /// Process `statuses` until the player closes the stream
    ///
    /// Submissions run on a separate task so a slow target never holds up
    /// the status stream; they are made in the order they were decided.
    pub async fn run(mut self, mut statuses: mpsc::Receiver<Status>) {
        let (queue, pending) = mpsc::unbounded_channel();
        let submitter = tokio::spawn(submit_all(
            Arc::clone(&self.target),
            self.player.name().to_string(),
            pending,
            self.errors.clone(),
        ));

        loop {
            tokio::select! {
                // a pending status may cancel the timer, so it goes first
                biased;
                status = statuses.recv() => match status {
                    Some(status) => self.observe(status, &queue),
                    None => break,
                },
                () = self.state.deadline() => self.fire(&queue).await,
            }
        }

        drop(queue);
        if let Err(e) = submitter.await {
            if e.is_panic() {
                log::error!(
                    "{} -> {}: submission worker panicked: {}",
                    self.player.name(),
                    self.target.name(),
                    e
                );
            }
        }
    }

    fn observe(&mut self, status: Status, queue: &Queue) {
        if !status.is_playing() {
            if let State::Playing { track, timer } = &self.state {
                if timer.is_some() {
                    log::debug!("{}: {} interrupted, no listen", self.player.name(), track);
                }
            }
            self.state = State::Idle;
            return;
        }

        if let State::Playing { track, .. } = &self.state {
            if *track == status.track {
                return;
            }
        }

        // Replacing the state drops the previous timer before anything else happens
        let previous = std::mem::replace(&mut self.state, State::Idle);
        if let State::Playing {
            track,
            timer: Some(_),
        } = previous
        {
            log::debug!(
                "{}: {} replaced before its listen was earned",
                self.player.name(),
                track
            );
        }

        log::info!(
            "{} -> {}: now playing {}",
            self.player.name(),
            self.target.name(),
            status.track
        );
        let _ = queue.send(Submission::PlayingNow(status.track.clone()));

        let timer = match status.duration {
            Some(duration) => {
                let delay = self.target.submission_time(duration);
                log::debug!(
                    "{}: listen for {} due in {}s",
                    self.target.name(),
                    status.track,
                    delay.as_secs()
                );
                Some(SubmissionTimer::new(delay))
            }
            None => {
                self.report(Error::UnknownDuration(status.track.clone()));
                None
            }
        };

        self.state = State::Playing {
            track: status.track,
            timer,
        };
    }

    async fn fire(&mut self, queue: &Queue) {
        let State::Playing { track, timer } = &mut self.state else {
            return;
        };
        if timer.take().is_none() {
            return;
        }
        let track = track.clone();

        // The track may have changed without a status reaching us yet
        match self.player.now_playing().await {
            Ok(Some(current)) if current == track => {
                log::info!(
                    "{} -> {}: listen earned for {}",
                    self.player.name(),
                    self.target.name(),
                    track
                );
                let _ = queue.send(Submission::Listen(track));
            }
            Ok(_) => {
                log::debug!(
                    "{}: {} is no longer playing, skipping listen",
                    self.player.name(),
                    track
                );
            }
            Err(e) => self.report(e.into()),
        }
    }

    fn report(&self, error: Error) {
        let _ = self.errors.send(PairError {
            player: self.player.name().to_string(),
            target: self.target.name().to_string(),
            error,
        });
    }
}

/// Make queued submissions one at a time; failures are reported, never retried
async fn submit_all<T: Target>(
    target: Arc<T>,
    player: String,
    mut pending: mpsc::UnboundedReceiver<Submission>,
    errors: ErrorSink,
) {
    while let Some(submission) = pending.recv().await {
        let (kind, result, track) = match submission {
            Submission::PlayingNow(track) => (
                SubmissionKind::PlayingNow,
                target.submit_playing_now(&track).await,
                track,
            ),
            Submission::Listen(track) => (
                SubmissionKind::Listen,
                target.submit_listen(&track).await,
                track,
            ),
        };

        if let Err(cause) = result {
            let _ = errors.send(PairError {
                player: player.clone(),
                target: target.name().to_string(),
                error: Error::Submission { kind, track, cause },
            });
        }
    }
}
