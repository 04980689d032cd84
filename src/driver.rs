// Driver
// Runs one scheduler for every player/target pair and funnels their errors to a sink

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::error::{Error, PairError, PlayerError};
use crate::player::{Player, Subscription};
use crate::scheduler::{ErrorSink, Scheduler};
use crate::target::Target;

pub struct Driver<P, T> {
    players: Vec<Arc<P>>,
    targets: Vec<Arc<T>>,
}

impl<P: Player, T: Target> Driver<P, T> {
    pub fn new(players: Vec<P>, targets: Vec<T>) -> Self {
        Self::from_shared(
            players.into_iter().map(Arc::new).collect(),
            targets.into_iter().map(Arc::new).collect(),
        )
    }

    /// Build from players and targets that are also used elsewhere
    pub fn from_shared(players: Vec<Arc<P>>, targets: Vec<Arc<T>>) -> Self {
        Self { players, targets }
    }

    /// Run every pair, logging their errors, until `shutdown` resolves or every player is down
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let (sink, errors) = mpsc::unbounded_channel();
        tokio::spawn(log_errors(errors));
        self.run_with_sink(sink, shutdown).await;
    }

    /// Like [`Driver::run`], but errors go to `sink`
    pub async fn run_with_sink(self, sink: ErrorSink, shutdown: impl Future<Output = ()>) {
        let mut pairs = JoinSet::new();
        for player in &self.players {
            for target in &self.targets {
                pairs.spawn(drive_pair(
                    Arc::clone(player),
                    Arc::clone(target),
                    sink.clone(),
                ));
            }
        }
        drop(sink);

        if pairs.is_empty() {
            log::warn!("No player/target pairs to run");
            return;
        }
        log::info!("Running {} player/target pair(s)", pairs.len());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    log::info!("Shutting down");
                    pairs.shutdown().await;
                    break;
                }
                joined = pairs.join_next() => match joined {
                    Some(Err(e)) if e.is_panic() => log::error!("A pair panicked: {}", e),
                    Some(_) => {}
                    None => {
                        log::error!("Every player is down, nothing left to watch");
                        break;
                    }
                },
            }
        }
    }
}

async fn drive_pair<P: Player, T: Target>(player: Arc<P>, target: Arc<T>, sink: ErrorSink) {
    let report = |error: Error| {
        let _ = sink.send(PairError {
            player: player.name().to_string(),
            target: target.name().to_string(),
            error,
        });
    };

    let Subscription { statuses, mut errors } = match player.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            report(e.into());
            return;
        }
    };
    log::info!("{} -> {}: started", player.name(), target.name());

    let forward_errors = async {
        while let Some(error) = errors.recv().await {
            report(error.into());
        }
    };
    let scheduler = Scheduler::new(Arc::clone(&player), Arc::clone(&target), sink.clone());

    tokio::join!(scheduler.run(statuses), forward_errors);
    log::error!(
        "{} -> {}: player is down, stopped submitting",
        player.name(),
        target.name()
    );
}

async fn log_errors(mut errors: mpsc::UnboundedReceiver<PairError>) {
    while let Some(error) = errors.recv().await {
        match &error.error {
            Error::Player(e) if e.is_terminal() => log::error!("{}", error),
            Error::Player(PlayerError::Unavailable(_)) => log::error!("{}", error),
            _ => log::warn!("{}", error),
        }
    }
}
