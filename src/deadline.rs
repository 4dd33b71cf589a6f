//! Request deadlines.
//!
//! A [`Deadline`] is created once per request and passed to every stage.
//! Each stage checks it before starting (cooperative cancellation at stage
//! boundaries) and the blocking codec work itself is raced against the time
//! left: the work runs on the engine's shared worker pool while the request
//! thread waits on a channel with a timeout. When the deadline wins, the
//! in-flight work is abandoned and its result dropped when it eventually
//! arrives.

use crate::error::{EngineError, Result};
use rayon::ThreadPool;
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Suspension points of a request, used to label timeouts and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Decode,
    Transform,
    Encode,
    Metrics,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Decode => "decode",
            Self::Transform => "transform",
            Self::Encode => "encode",
            Self::Metrics => "metrics",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Fail with [`EngineError::Timeout`] if no time is left before `stage`.
    pub fn check(&self, stage: Stage) -> Result<()> {
        if self.is_expired() {
            Err(self.timeout(stage))
        } else {
            Ok(())
        }
    }

    fn timeout(&self, stage: Stage) -> EngineError {
        EngineError::Timeout {
            stage,
            limit: self.limit,
        }
    }
}

/// Run `job` on `pool`, giving up when `deadline` expires.
///
/// The stage boundary check happens first, so an already-expired deadline
/// never schedules any work.
pub fn race<T, F>(pool: &ThreadPool, deadline: &Deadline, stage: Stage, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    deadline.check(stage)?;
    let (tx, rx) = mpsc::sync_channel(1);
    pool.spawn(move || {
        // The receiver is gone once the deadline fired; nothing to report.
        let _ = tx.send(job());
    });
    match rx.recv_timeout(deadline.remaining()) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            tracing::debug!(%stage, limit_ms = deadline.limit().as_millis() as u64, "stage abandoned");
            Err(deadline.timeout(stage))
        }
        Err(RecvTimeoutError::Disconnected) => Err(EngineError::conversion(
            stage.to_string(),
            "worker stopped before producing a result",
        )),
    }
}
