//! Resolution coordinator
//!
//! The one entry point callers use: inspect link in, resolved item or
//! a taxonomy error out. Orchestration only — parsing lives in
//! `inspect-core`, the exchange in `gc-session`, selection in the pool.

use std::sync::Arc;

use gc_session::error::SessionError;
use inspect_core::{InspectRequest, ResolvedItem, ResolutionError, normalize_payload};
use inspect_core::link::parse_inspect_link;
use tokio::time::Instant;
use tracing::debug;

use crate::error::PoolError;
use crate::pool::{SessionPool, WaitMode};

/// Resolves inspect links against the session pool.
#[derive(Debug, Clone)]
pub struct Resolver {
    pool: Arc<SessionPool>,
}

impl Resolver {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Resolve a raw inspect link.
    ///
    /// Unparseable links fail before any session is consulted, so a
    /// flood of junk input cannot tie up capacity.
    pub async fn resolve_link(
        &self,
        link: &str,
        mode: WaitMode,
        deadline: Instant,
    ) -> Result<ResolvedItem, ResolutionError> {
        let request = parse_inspect_link(link)?;
        self.resolve_request(&request, mode, deadline).await
    }

    /// Resolve an already-parsed request.
    pub async fn resolve_request(
        &self,
        request: &InspectRequest,
        mode: WaitMode,
        deadline: Instant,
    ) -> Result<ResolvedItem, ResolutionError> {
        if self.pool.is_empty() {
            return Err(ResolutionError::ConfigurationFault(
                "no bot accounts configured".into(),
            ));
        }

        // Both pool failures mean the same thing to the caller: no
        // session had capacity within the deadline.
        let guard = self.pool.acquire(mode, deadline).await.map_err(|e| match e {
            PoolError::NoCapacity | PoolError::Deadline => ResolutionError::Busy,
        })?;

        debug!(asset_id = %request.asset_id, "dispatching inspect to a session");
        let payload = guard.inspect(request, deadline).await.map_err(|e| match e {
            SessionError::NotReady => {
                ResolutionError::TransientFailure("session lost before the request was issued".into())
            }
            SessionError::DeadlineExceeded => {
                ResolutionError::TransientFailure("coordinator did not reply before the deadline".into())
            }
            SessionError::ConnectionLost(reason) => {
                ResolutionError::TransientFailure(format!("connection lost: {reason}"))
            }
            SessionError::Rejected(reason) => {
                ResolutionError::MalformedResponse(format!("coordinator rejected the request: {reason}"))
            }
        })?;

        normalize_payload(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use gc_auth::credentials::Credential;
    use gc_session::backoff::BackoffConfig;
    use gc_session::session::{SessionConfig, SessionState};
    use gc_session::testing::{InspectMode, MockCoordinator, wait_for_state};
    use inspect_core::{ItemPayload, Rarity};
    use std::time::Duration;

    const PASSWORD: &str = "pw-secret";
    const SHARED_SECRET: &str = "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=";
    const LINK: &str =
        "steam://rungame/730/1/+csgo_econ_action_preview S76561198320430286A44803380965D4631504492215634113";

    fn credentials(n: usize) -> Vec<Credential> {
        (1..=n)
            .map(|i| Credential {
                account_id: format!("bot-{i}"),
                password: Secret::new(PASSWORD.into()),
                shared_secret: Secret::new(SHARED_SECRET.into()),
            })
            .collect()
    }

    fn config(addr: &str) -> SessionConfig {
        SessionConfig {
            coordinator_addr: addr.into(),
            connect_timeout: Duration::from_secs(2),
            backoff: BackoffConfig {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(40),
            },
        }
    }

    async fn ready_resolver(mock: &MockCoordinator, n: usize) -> Resolver {
        let pool = SessionPool::spawn(&credentials(n), config(mock.addr())).unwrap();
        for session in pool.sessions() {
            wait_for_state(session, SessionState::Ready, Duration::from_secs(2)).await;
        }
        Resolver::new(Arc::new(pool))
    }

    fn deadline(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[tokio::test]
    async fn resolves_a_link_end_to_end() {
        let mock = MockCoordinator::start(PASSWORD).await;
        let resolver = ready_resolver(&mock, 1).await;

        let item = resolver
            .resolve_link(LINK, WaitMode::Block, deadline(2000))
            .await
            .unwrap();
        assert_eq!(item.display_name, MockCoordinator::sample_item().name);
        assert_eq!(item.rarity, Rarity::Classified);
        assert_eq!(item.pattern_seed, 661);
    }

    #[tokio::test]
    async fn bad_link_fails_without_touching_the_pool() {
        let mock = MockCoordinator::start(PASSWORD).await;
        let resolver = ready_resolver(&mock, 1).await;

        let err = resolver
            .resolve_link("https://example.com/not-an-inspect-link", WaitMode::Block, deadline(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidLink(_)));
        assert_eq!(mock.inspect_count(), 0);
    }

    #[tokio::test]
    async fn saturated_pool_is_busy_in_fail_fast_mode() {
        let mock = MockCoordinator::start(PASSWORD).await;
        let resolver = ready_resolver(&mock, 1).await;

        let _held = resolver
            .pool()
            .acquire(WaitMode::FailFast, deadline(2000))
            .await
            .unwrap();
        let err = resolver
            .resolve_link(LINK, WaitMode::FailFast, deadline(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Busy));
    }

    #[tokio::test]
    async fn pool_wait_deadline_is_busy() {
        let mock = MockCoordinator::start(PASSWORD).await;
        let resolver = ready_resolver(&mock, 1).await;

        let _held = resolver
            .pool()
            .acquire(WaitMode::FailFast, deadline(2000))
            .await
            .unwrap();
        // Waiting out the deadline is still a capacity failure, not a
        // session fault.
        let err = resolver
            .resolve_link(LINK, WaitMode::Block, deadline(100))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, ResolutionError::Busy));
    }

    #[tokio::test]
    async fn slow_coordinator_is_transient_and_session_survives() {
        let mock = MockCoordinator::start(PASSWORD).await;
        mock.set_inspect_mode(InspectMode::ReplyAfter(Duration::from_millis(300)));
        let resolver = ready_resolver(&mock, 1).await;

        let err = resolver
            .resolve_link(LINK, WaitMode::Block, deadline(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::TransientFailure(_)));

        // Same session answers the next call once the mock speeds up.
        mock.set_inspect_mode(InspectMode::Reply);
        tokio::time::sleep(Duration::from_millis(350)).await;
        resolver
            .resolve_link(LINK, WaitMode::Block, deadline(2000))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_connection_is_transient() {
        let mock = MockCoordinator::start(PASSWORD).await;
        mock.set_inspect_mode(InspectMode::DropConnection);
        let resolver = ready_resolver(&mock, 1).await;

        let err = resolver
            .resolve_link(LINK, WaitMode::Block, deadline(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::TransientFailure(_)));
    }

    #[tokio::test]
    async fn coordinator_rejection_is_malformed_response() {
        let mock = MockCoordinator::start(PASSWORD).await;
        mock.set_inspect_mode(InspectMode::Fail("no such asset".into()));
        let resolver = ready_resolver(&mock, 1).await;

        let err = resolver
            .resolve_link(LINK, WaitMode::Block, deadline(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedResponse(_)));
        assert!(err.to_string().contains("no such asset"));
    }

    #[tokio::test]
    async fn out_of_range_payload_is_malformed_response() {
        let mock = MockCoordinator::start(PASSWORD).await;
        mock.set_item(ItemPayload {
            name: "Broken".into(),
            paint_wear: 2.0,
            paint_seed: 1,
            rarity: 3,
            stickers: vec![],
        });
        let resolver = ready_resolver(&mock, 1).await;

        let err = resolver
            .resolve_link(LINK, WaitMode::Block, deadline(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn empty_pool_is_a_configuration_fault() {
        let pool = SessionPool::spawn(&[], config("127.0.0.1:1")).unwrap();
        let resolver = Resolver::new(Arc::new(pool));

        let err = resolver
            .resolve_link(LINK, WaitMode::Block, deadline(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::ConfigurationFault(_)));
    }
}
