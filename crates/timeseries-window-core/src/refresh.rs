//! Background refresh of the current month's shards.
//!
//! The refresh timer is the only source of `HEAD` requests. Each tick
//! refreshes the shard of the current month for every watched entity and
//! broadcasts what it found.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    session::{RefreshOutcome, ShardSession},
    shard::{EntityId, MonthKey, ShardKey},
};

const EVENT_CAPACITY: usize = 64;

/// What one refresh of one shard found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// The shard was refreshed.
    Refreshed {
        /// Shard.
        key: ShardKey,
        /// Result.
        outcome: RefreshOutcome,
    },
    /// The refresh failed; the next tick tries again.
    Failed {
        /// Shard.
        key: ShardKey,
        /// Rendered error.
        error: String,
    },
}

impl RefreshEvent {
    /// Shard the event is about.
    pub fn key(&self) -> &ShardKey {
        match self {
            RefreshEvent::Refreshed { key, .. } | RefreshEvent::Failed { key, .. } => key,
        }
    }

    /// True if the shard gained rows.
    pub fn grew(&self) -> bool {
        matches!(
            self,
            RefreshEvent::Refreshed {
                outcome: RefreshOutcome::Grew { .. },
                ..
            }
        )
    }
}

/// Refreshes the current month of a fixed set of entities.
#[derive(Debug)]
pub struct RefreshController {
    session: Arc<ShardSession>,
    entities: Vec<EntityId>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<RefreshEvent>,
}

impl RefreshController {
    /// Controller over `entities`.
    pub fn new(session: Arc<ShardSession>, entities: Vec<EntityId>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session,
            entities,
            clock,
            events,
        }
    }

    /// Receive events from subsequent ticks.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Refresh every entity's current-month shard once.
    pub async fn tick(&self) -> Vec<RefreshEvent> {
        let month = MonthKey::of(self.clock.now());
        let mut out = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            let key = ShardKey::new(entity.clone(), month);
            let event = match self.session.refresh(&key).await {
                Ok(outcome) => RefreshEvent::Refreshed { key, outcome },
                Err(e) => {
                    tracing::warn!(%key, error = %e, "Refresh failed");
                    RefreshEvent::Failed {
                        key,
                        error: e.to_string(),
                    }
                }
            };
            // No receivers is fine.
            let _ = self.events.send(event.clone());
            out.push(event);
        }
        out
    }

    /// Run [`tick`](Self::tick) every `period` on a background task.
    ///
    /// The first tick fires after one full period.
    pub fn spawn(session: Arc<ShardSession>, entities: Vec<EntityId>, period: Duration, clock: Arc<dyn Clock>) -> RefreshHandle {
        Self::new(session, entities, clock).start(period)
    }

    /// Start the timer for this controller.
    pub fn start(self, period: Duration) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let events = self.events.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately.
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            events = self.tick() => {
                                tracing::debug!(shards = events.len(), "Refresh tick complete");
                            }
                        }
                    }
                }
            }
            tracing::debug!("Refresh stopped");
        });

        RefreshHandle {
            cancel,
            task: Some(task),
            events,
        }
    }
}

/// Handle to a running refresh timer. Dropping it stops the timer.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    events: broadcast::Sender<RefreshEvent>,
}

impl RefreshHandle {
    /// Receive refresh events.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// True until the task exits.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the timer and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Refresh task ended abnormally");
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
