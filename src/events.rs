// src/events.rs

//! Status event fan-out.
//!
//! Runners publish one [`ScriptStatusEvent`] per status transition. The
//! [`EventBroadcaster`] hands each event to every subscriber with a
//! non-blocking `try_send`: a subscriber whose buffer is full misses that
//! event, and the publisher moves on. Consumers that cannot afford to miss
//! anything should read the log store instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::types::ScriptStatus;

/// One status transition of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStatusEvent {
    pub script_name: String,
    pub status: ScriptStatus,
    pub exit_code: i32,
    /// Milliseconds spent so far; `0` for `starting` / `running`.
    pub duration: u64,
    pub timestamp: DateTime<Utc>,
}

impl ScriptStatusEvent {
    pub fn new(
        script_name: impl Into<String>,
        status: ScriptStatus,
        exit_code: i32,
        duration: u64,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            status,
            exit_code,
            duration,
            timestamp: Utc::now(),
        }
    }

    pub fn starting(script_name: impl Into<String>) -> Self {
        Self::new(script_name, ScriptStatus::Starting, 0, 0)
    }

    pub fn running(script_name: impl Into<String>) -> Self {
        Self::new(script_name, ScriptStatus::Running, 0, 0)
    }

    /// `completed` for exit code 0 without an execution error, `failed`
    /// otherwise.
    pub fn finished(
        script_name: impl Into<String>,
        success: bool,
        exit_code: i32,
        duration: u64,
    ) -> Self {
        let status = if success {
            ScriptStatus::Completed
        } else {
            ScriptStatus::Failed
        };
        Self::new(script_name, status, exit_code, duration)
    }
}

type Subscribers = Mutex<Vec<(u64, mpsc::Sender<ScriptStatusEvent>)>>;

/// Non-blocking publish/subscribe hub. Cheap to clone; clones share the
/// subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventBroadcaster {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
}

/// Handle returned by [`EventBroadcaster::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`], or
/// drop the receiver and the sender is pruned on the next broadcast.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Remove the subscriber. Safe to call more than once, from any thread,
    /// including while a broadcast is in progress.
    pub fn unsubscribe(&self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        let mut list = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        list.retain(|(id, _)| *id != self.id);
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. The caller picks its capacity and therefore how
    /// much lag it tolerates before events are dropped.
    pub fn subscribe(&self, tx: mpsc::Sender<ScriptStatusEvent>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, tx));
        debug!(subscriber = id, "event subscriber added");
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to every subscriber without waiting on any of them.
    pub fn broadcast(&self, event: &ScriptStatusEvent) {
        // Snapshot so that the lock is not held while sending.
        let targets: Vec<(u64, mpsc::Sender<ScriptStatusEvent>)> = self.lock().clone();

        let mut closed = Vec::new();
        for (id, tx) in &targets {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!(
                        subscriber = id,
                        script = %event.script_name,
                        status = %event.status,
                        "subscriber buffer full; event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        if !closed.is_empty() {
            self.lock().retain(|(id, _)| !closed.contains(id));
            debug!(pruned = closed.len(), "removed closed event subscribers");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(u64, mpsc::Sender<ScriptStatusEvent>)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
