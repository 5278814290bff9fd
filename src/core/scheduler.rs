//! Timer capability used by the playback engine
//!
//! The engine never sleeps. It hands each [`StepToken`] to a [`Scheduler`] and
//! expects the token back through [`PlaybackEngine::fire`](super::PlaybackEngine::fire)
//! once the delay has elapsed.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::session::StepToken;

/// Deferred, individually cancellable callbacks
pub trait Scheduler: Send {
    /// Deliver `token` after `delay`
    fn schedule(&mut self, delay: Duration, token: StepToken);

    /// Make sure `token` is never delivered
    fn cancel(&mut self, token: StepToken);

    /// Called by the engine when a delivered token is processed
    fn acknowledge(&mut self, _token: StepToken) {}
}

/// Virtual-clock scheduler
///
/// Nothing happens until the owner advances the clock, which makes timer
/// behavior fully deterministic in tests.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    seq: u64,
    queue: BTreeMap<(Duration, u64), StepToken>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of timers waiting to fire
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Remove the earliest timer due at or before `until`, moving the clock to it
    pub fn pop_due(&mut self, until: Duration) -> Option<StepToken> {
        let (&(due, seq), _) = self.queue.iter().next()?;
        if due > until {
            return None;
        }
        self.now = self.now.max(due);
        self.queue.remove(&(due, seq))
    }

    /// Move the clock forward without firing anything
    pub fn set_now(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, token: StepToken) {
        self.seq += 1;
        self.queue.insert((self.now + delay, self.seq), token);
    }

    fn cancel(&mut self, token: StepToken) {
        self.queue.retain(|_, t| *t != token);
    }
}

/// Scheduler backed by tokio timers
///
/// Each step gets its own sleeping task. Fired tokens are sent on a channel so a
/// single driver task can feed them back into the engine one at a time.
#[derive(Debug)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<StepToken>,
    timers: HashMap<StepToken, AbortHandle>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StepToken>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                timers: HashMap::new(),
            },
            rx,
        )
    }

    /// Number of timers still running
    pub fn in_flight(&self) -> usize {
        self.timers.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, token: StepToken) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the server is shutting down
            let _ = tx.send(token);
        });
        if let Some(previous) = self.timers.insert(token, handle.abort_handle()) {
            previous.abort();
        }
    }

    fn cancel(&mut self, token: StepToken) {
        if let Some(handle) = self.timers.remove(&token) {
            handle.abort();
        }
    }

    fn acknowledge(&mut self, token: StepToken) {
        self.timers.remove(&token);
    }
}
