// src/exec/context.rs

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::ExecError;

/// Bounds a single execution: a cancellation scope plus an optional deadline.
///
/// Cancellation composes from three sources: the caller's token (manual run
/// or shutdown), the runner's own stop token (a child of the former), and the
/// per-script timeout added with [`ExecContext::with_timeout`].
#[derive(Debug, Clone)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl ExecContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Add a deadline `timeout` from now. An earlier existing deadline wins.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        match self.deadline {
            Some(existing) if existing.at <= at => {}
            _ => {
                self.deadline = Some(Deadline { at, limit: timeout });
            }
        }
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The configured limit, if a deadline is set.
    pub fn timeout(&self) -> Option<Duration> {
        self.deadline.map(|d| d.limit)
    }

    /// True once the token is cancelled or the deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d.at)
    }

    /// The reason the context is done, if it is.
    pub fn done_reason(&self) -> Option<ExecError> {
        if let Some(d) = self.deadline {
            if Instant::now() >= d.at {
                return Some(ExecError::Timeout(d.limit));
            }
        }
        self.token.is_cancelled().then_some(ExecError::Cancelled)
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ExecError {
        match self.deadline {
            Some(d) => tokio::select! {
                _ = self.token.cancelled() => ExecError::Cancelled,
                _ = tokio::time::sleep_until(d.at) => ExecError::Timeout(d.limit),
            },
            None => {
                self.token.cancelled().await;
                ExecError::Cancelled
            }
        }
    }
}
