//! Error types for session and wire operations

/// Errors from the frame codec and connection I/O.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("frame of {0} bytes exceeds the frame limit")]
    Oversized(usize),
}

/// Typed failures from a single inspect call against one session.
///
/// The pool converts these at its boundary; no session fault ever
/// propagates as a panic or terminates the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session was not connected when the call arrived. No outbound
    /// request was made and no deadline was consumed.
    #[error("session is not ready")]
    NotReady,

    /// The caller's deadline expired while waiting for the coordinator.
    /// The session slot is freed and the session remains usable.
    #[error("deadline expired waiting for the coordinator")]
    DeadlineExceeded,

    /// The connection dropped or violated the protocol mid-call. The
    /// session is Faulted and will reconnect on its own.
    #[error("connection lost mid-call: {0}")]
    ConnectionLost(String),

    /// The coordinator answered with an explicit failure for this
    /// request. Session health is unaffected.
    #[error("coordinator rejected the request: {0}")]
    Rejected(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
