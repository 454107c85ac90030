//! Bot session layer for the game coordinator
//!
//! One [`Session`] owns one authenticated coordinator connection and
//! runs the connect/logon/reconnect state machine on a driver task.
//! Event-driven notifications from the remote side are re-expressed as
//! explicit state transitions, with channels handing results back to
//! whichever inspect call is awaiting them: "suspend until event" is
//! always a wait-with-deadline here, never an open-ended callback.
//!
//! Session lifecycle:
//! 1. `Session::spawn()` decodes the shared secret and starts the driver
//! 2. Driver connects, logs on with the current one-time code
//! 3. A code rejection is retried once with the previous window's code
//! 4. Ready sessions are handed out via `try_acquire()` (CAS Ready→Busy)
//! 5. Faults trigger capped, jittered reconnect backoff — forever
//! 6. Rejected credentials park the session permanently (operator fix)

pub mod backoff;
pub mod error;
pub mod session;
pub mod wire;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backoff::{Backoff, BackoffConfig};
pub use error::{SessionError, WireError};
pub use session::{AcquiredSession, Session, SessionConfig, SessionState};
pub use wire::{GcMessage, LogonResult, OwnerKind};
