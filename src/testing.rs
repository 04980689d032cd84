// In-memory players and targets for driving the scheduler in tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::PlayerError;
use crate::player::{Player, Subscription};
use crate::target::Target;
use crate::track::{Status, Track};

/// A player whose statuses are pushed by the test
pub struct MockPlayer {
    name: String,
    current: Mutex<Option<Track>>,
    subscribers: Mutex<Vec<(mpsc::Sender<Status>, mpsc::Sender<PlayerError>)>>,
    refuse_subscriptions: AtomicBool,
    fail_queries: AtomicBool,
}

impl MockPlayer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            current: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            refuse_subscriptions: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
        }
    }

    pub fn refusing_subscriptions(name: &str) -> Self {
        let player = Self::new(name);
        player.refuse_subscriptions.store(true, Ordering::SeqCst);
        player
    }

    /// Change what `now_playing` answers without telling subscribers
    pub fn set_current(&self, track: Option<Track>) {
        *self.current.lock().unwrap() = track;
    }

    pub fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub async fn emit(&self, status: Status) {
        let subscribers: Vec<_> = self.subscribers.lock().unwrap().iter().map(|(s, _)| s.clone()).collect();
        for subscriber in subscribers {
            let _ = subscriber.send(status.clone()).await;
        }
    }

    /// Start playing `track` and tell subscribers about it
    pub async fn play(&self, track: &Track, seconds: u64) {
        self.set_current(Some(track.clone()));
        self.emit(Status::playing(track.clone(), Duration::from_secs(seconds)))
            .await;
    }

    pub async fn stop(&self) {
        self.set_current(None);
        self.emit(Status::stopped()).await;
    }

    pub async fn fail(&self, message: &str) {
        let subscribers: Vec<_> = self.subscribers.lock().unwrap().iter().map(|(_, e)| e.clone()).collect();
        for subscriber in subscribers {
            let _ = subscriber.send(PlayerError::Protocol(message.to_string())).await;
        }
    }

    /// Close every subscription
    pub fn disconnect(&self) {
        self.subscribers.lock().unwrap().clear();
    }
}

impl Player for MockPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self) -> Result<Subscription, PlayerError> {
        if self.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(PlayerError::Unavailable("refused".to_string()));
        }

        let (status_tx, statuses) = mpsc::channel(16);
        let (error_tx, errors) = mpsc::channel(16);
        self.subscribers.lock().unwrap().push((status_tx, error_tx));
        Ok(Subscription { statuses, errors })
    }

    async fn now_playing(&self) -> Result<Option<Track>, PlayerError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(PlayerError::Protocol("query failed".to_string()));
        }
        Ok(self.current.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PlayingNow(Track),
    Listen(Track),
}

/// A target that records what it was asked to submit
pub struct MockTarget {
    name: String,
    failing: bool,
    panicking: bool,
    started: Instant,
    calls: Mutex<Vec<(Duration, Call)>>,
}

impl MockTarget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failing: false,
            panicking: false,
            started: Instant::now(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Records every call, then fails it
    pub fn failing(name: &str) -> Self {
        Self {
            failing: true,
            ..Self::new(name)
        }
    }

    /// Records every call, then panics
    pub fn panicking(name: &str) -> Self {
        Self {
            panicking: true,
            ..Self::new(name)
        }
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((self.started.elapsed(), call));
        if self.panicking {
            panic!("{} blew up", self.name);
        }
        if self.failing {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn playing_now(&self) -> Vec<Track> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::PlayingNow(track) => Some(track),
                Call::Listen(_) => None,
            })
            .collect()
    }

    /// Listens with the time they were submitted, relative to creation
    pub fn listens(&self) -> Vec<(Track, Duration)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(at, call)| match call {
                Call::Listen(track) => Some((track.clone(), *at)),
                Call::PlayingNow(_) => None,
            })
            .collect()
    }
}

impl Target for MockTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_playing_now(&self, track: &Track) -> Result<()> {
        self.record(Call::PlayingNow(track.clone()))
    }

    async fn submit_listen(&self, track: &Track) -> Result<()> {
        self.record(Call::Listen(track.clone()))
    }
}

pub fn secs(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}

/// Sleep until `seconds` after `start` in (paused) test time
pub async fn advance_to(start: Instant, seconds: u64) {
    tokio::time::sleep_until(start + secs(seconds)).await;
}
