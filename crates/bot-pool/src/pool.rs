//! Fixed-size pool of bot sessions
//!
//! Pool membership is decided once at startup from the credential
//! file; sessions recover from faults on their own but are never added
//! or removed at runtime. Selection prefers the ready session with the
//! fewest completed calls, so work spreads evenly even when sessions
//! spend different amounts of time faulted.

use std::sync::Arc;

use gc_auth::credentials::Credential;
use gc_session::session::{AcquiredSession, Session, SessionConfig, SessionState};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::info;

use crate::error::PoolError;

/// What to do when every session is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Wait (up to the deadline) for a session to free up.
    Block,
    /// Report `NoCapacity` immediately.
    FailFast,
}

/// Aggregate pool condition for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// Every session is ready or serving a call.
    Healthy,
    /// Some sessions are down but capacity remains.
    Degraded,
    /// No session can take a call.
    Unhealthy,
}

/// Per-session health snapshot.
#[derive(Debug, Serialize)]
pub struct SessionHealth {
    pub account_id: String,
    pub state: &'static str,
    pub completed: u64,
    pub credentials_rejected: bool,
}

/// Point-in-time pool health report.
#[derive(Debug, Serialize)]
pub struct PoolHealth {
    pub status: PoolStatus,
    pub total: usize,
    pub ready: usize,
    pub busy: usize,
    pub sessions: Vec<SessionHealth>,
}

/// Owns the bot sessions and arbitrates access to them.
pub struct SessionPool {
    sessions: Vec<Session>,
    availability: Arc<Notify>,
}

impl SessionPool {
    /// Spawn one session per credential. Sessions authenticate in the
    /// background; the pool is usable immediately and hands out work as
    /// they come up.
    pub fn spawn(credentials: &[Credential], config: SessionConfig) -> gc_auth::Result<Self> {
        let availability = Arc::new(Notify::new());
        let sessions = credentials
            .iter()
            .map(|c| Session::spawn(c, config.clone(), Arc::clone(&availability)))
            .collect::<gc_auth::Result<Vec<_>>>()?;

        info!(sessions = sessions.len(), "session pool spawned");
        Ok(Self {
            sessions,
            availability,
        })
    }

    /// Number of configured sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the pool has no sessions at all.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Pick the ready session with the fewest completed calls.
    /// Acquisition is a compare-and-swap on the session itself, so a
    /// concurrent caller racing for the same session just makes us
    /// pick again; each lost race removes that session from the ready
    /// set, so the loop runs out of candidates rather than spinning.
    fn try_acquire_least_used(&self) -> Option<AcquiredSession<'_>> {
        loop {
            let candidate = self
                .sessions
                .iter()
                .filter(|s| s.state() == SessionState::Ready)
                .min_by_key(|s| s.completed())?;
            if let Some(guard) = candidate.try_acquire() {
                return Some(guard);
            }
        }
    }

    /// Borrow a session for one call.
    ///
    /// `Block` waits for capacity until `deadline`; `FailFast` returns
    /// `NoCapacity` if no session is free right now.
    pub async fn acquire(
        &self,
        mode: WaitMode,
        deadline: Instant,
    ) -> Result<AcquiredSession<'_>, PoolError> {
        loop {
            if let Some(guard) = self.try_acquire_least_used() {
                return Ok(guard);
            }
            match mode {
                WaitMode::FailFast => return Err(PoolError::NoCapacity),
                WaitMode::Block => {
                    // Register for the wakeup before re-checking, so a
                    // release between the check and the await is not lost.
                    let notified = self.availability.notified();
                    if let Some(guard) = self.try_acquire_least_used() {
                        return Ok(guard);
                    }
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(PoolError::Deadline);
                    }
                }
            }
        }
    }

    /// Snapshot session states for the health endpoint.
    pub fn health(&self) -> PoolHealth {
        let sessions: Vec<SessionHealth> = self
            .sessions
            .iter()
            .map(|s| SessionHealth {
                account_id: s.account_id().to_string(),
                state: s.state().label(),
                completed: s.completed(),
                credentials_rejected: s.credentials_rejected(),
            })
            .collect();

        let ready = sessions.iter().filter(|s| s.state == "ready").count();
        let busy = sessions.iter().filter(|s| s.state == "busy").count();
        let usable = ready + busy;
        let status = if !sessions.is_empty() && usable == sessions.len() {
            PoolStatus::Healthy
        } else if usable > 0 {
            PoolStatus::Degraded
        } else {
            PoolStatus::Unhealthy
        };

        PoolHealth {
            status,
            total: sessions.len(),
            ready,
            busy,
            sessions,
        }
    }

    #[cfg(test)]
    pub(crate) fn sessions(&self) -> &[Session] {
        &self.sessions
    }
}

// Sessions never move between states on the pool's behalf; the pool
// only observes them. Keep that property if extending this type.
impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
