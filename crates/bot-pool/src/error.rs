//! Pool-level error types

/// Failure to borrow a session from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Every session is busy or down and the caller asked not to wait.
    #[error("no session available")]
    NoCapacity,

    /// The caller's deadline expired before any session freed up.
    #[error("deadline expired waiting for a free session")]
    Deadline,
}
