//! Bot session state machine and driver
//!
//! A session owns exactly one coordinator connection and allows at most
//! one in-flight inspect call. The state machine:
//!
//! - Disconnected → Authenticating: driver starts, opens the connection
//!   and submits credentials with the current one-time code
//! - Authenticating → Ready: logon acknowledged
//! - Authenticating → Disconnected (parked): credentials or code
//!   rejected after the adjacent-window retry — operator must fix the
//!   credential file, the driver never retries this on its own
//! - Ready → Busy: `try_acquire` (pool-side compare-and-swap)
//! - Busy → Ready: reply arrived or the call timed out cleanly
//! - Busy/Ready/Authenticating → Faulted: connection drop, codec
//!   violation, or a Disconnect push
//! - Faulted → Authenticating: after jittered backoff, forever
//!
//! The pool never touches session state directly; it goes through
//! `try_acquire`, the returned guard, and the read-only accessors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use common::Secret;
use gc_auth::credentials::Credential;
use gc_auth::totp;
use inspect_core::{InspectRequest, ItemPayload};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::error::{SessionError, WireError};
use crate::wire::{self, GcMessage, LogonResult};

/// Connection state of one bot session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    Ready,
    Busy,
    Faulted,
}

impl SessionState {
    /// State label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Busy => "busy",
            SessionState::Faulted => "faulted",
        }
    }
}

/// Connection settings shared by all sessions of a pool.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `host:port` of the coordinator entry point.
    pub coordinator_addr: String,
    /// Bound on connecting and on each logon round-trip.
    pub connect_timeout: Duration,
    pub backoff: BackoffConfig,
}

/// In-flight inspect call handed to the driver.
struct InspectCommand {
    request: InspectRequest,
    deadline: Instant,
    reply: oneshot::Sender<Result<ItemPayload, SessionError>>,
}

struct Shared {
    account_id: String,
    state: watch::Sender<SessionState>,
    /// Released calls since spawn; the pool's load-balancing key.
    completed: AtomicU64,
    /// Set once when the coordinator permanently rejects credentials.
    credentials_rejected: AtomicBool,
    /// Pinged whenever the session becomes Ready, so pool callers
    /// blocked on capacity can re-check.
    availability: Arc<Notify>,
}

impl Shared {
    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(
                account_id = %self.account_id,
                from = state.label(),
                to = next.label(),
                "session state transition"
            );
            *state = next;
            true
        });
        if next == SessionState::Ready {
            self.availability.notify_waiters();
        }
    }
}

/// Handle to one authenticated bot session.
///
/// Dropping the handle stops the driver task once it next reaches a
/// quiescent point; in-flight reconnect sleeps finish first.
pub struct Session {
    shared: Arc<Shared>,
    cmd_tx: mpsc::Sender<InspectCommand>,
}

impl Session {
    /// Decode the shared secret and start the session driver.
    ///
    /// `availability` is shared across a pool: it is notified every
    /// time this session (re)enters Ready.
    pub fn spawn(
        credential: &Credential,
        config: SessionConfig,
        availability: Arc<Notify>,
    ) -> gc_auth::Result<Self> {
        let secret = totp::decode_shared_secret(credential.shared_secret.expose())?;
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let shared = Arc::new(Shared {
            account_id: credential.account_id.clone(),
            state: state_tx,
            completed: AtomicU64::new(0),
            credentials_rejected: AtomicBool::new(false),
            availability,
        });

        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let driver = DriverCredential {
            account_id: credential.account_id.clone(),
            password: credential.password.clone(),
            secret,
        };
        tokio::spawn(run_driver(Arc::clone(&shared), driver, config, cmd_rx));

        Ok(Self { shared, cmd_tx })
    }

    pub fn account_id(&self) -> &str {
        &self.shared.account_id
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Calls released by this session since spawn.
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Whether the coordinator permanently rejected this bot's
    /// credentials (the session is parked; a human must fix the file).
    pub fn credentials_rejected(&self) -> bool {
        self.shared.credentials_rejected.load(Ordering::Relaxed)
    }

    /// Atomically claim the session for one inspect call.
    ///
    /// Succeeds only while Ready; the returned guard holds the Busy
    /// slot and frees it on drop. Two concurrent callers can never both
    /// succeed for the same session.
    pub fn try_acquire(&self) -> Option<AcquiredSession<'_>> {
        let acquired = self.shared.state.send_if_modified(|state| {
            if *state == SessionState::Ready {
                *state = SessionState::Busy;
                true
            } else {
                false
            }
        });
        acquired.then(|| AcquiredSession {
            session: self,
            finished: false,
        })
    }
}

/// RAII claim on a session's Busy slot.
///
/// The slot is freed exactly once: by `inspect` on completion or by
/// Drop if the guard is abandoned. A session that faulted mid-call is
/// left Faulted for its driver to recover.
pub struct AcquiredSession<'a> {
    session: &'a Session,
    finished: bool,
}

impl std::fmt::Debug for AcquiredSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredSession")
            .field("account_id", &self.session.shared.account_id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl AcquiredSession<'_> {
    /// Issue the inspect exchange and wait for reply, deadline, or
    /// fault, whichever comes first.
    pub async fn inspect(
        mut self,
        request: &InspectRequest,
        deadline: Instant,
    ) -> Result<ItemPayload, SessionError> {
        // The driver may have faulted between acquisition and now; in
        // that case nothing was sent and the deadline is not consumed.
        if self.session.state() != SessionState::Busy {
            self.abandon();
            return Err(SessionError::NotReady);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = InspectCommand {
            request: request.clone(),
            deadline,
            reply: reply_tx,
        };
        if self.session.cmd_tx.try_send(command).is_err() {
            self.abandon();
            return Err(SessionError::NotReady);
        }

        match tokio::time::timeout_at(deadline, reply_rx).await {
            // Clean timeout: free the slot, session stays usable.
            Err(_) => {
                self.release();
                Err(SessionError::DeadlineExceeded)
            }
            // Driver went away without answering: connection fault.
            Ok(Err(_)) => {
                self.abandon();
                Err(SessionError::ConnectionLost(
                    "session driver dropped the call".into(),
                ))
            }
            Ok(Ok(Ok(item))) => {
                self.release();
                Ok(item)
            }
            Ok(Ok(Err(err))) => {
                match err {
                    SessionError::ConnectionLost(_) => self.abandon(),
                    _ => self.release(),
                }
                Err(err)
            }
        }
    }

    /// Busy → Ready (if the driver has not moved the state elsewhere)
    /// and count the call for load balancing.
    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let released = self.session.shared.state.send_if_modified(|state| {
            if *state == SessionState::Busy {
                *state = SessionState::Ready;
                true
            } else {
                false
            }
        });
        self.session.shared.completed.fetch_add(1, Ordering::Relaxed);
        if released {
            self.session.shared.availability.notify_waiters();
        }
    }

    /// Give the slot up without touching state; the driver owns the
    /// Faulted recovery from here.
    fn abandon(&mut self) {
        self.finished = true;
    }
}

impl Drop for AcquiredSession<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

struct DriverCredential {
    account_id: String,
    password: Secret<String>,
    secret: Vec<u8>,
}

enum LogonFailure {
    /// Credentials or shared secret are wrong; park the session.
    Fatal(String),
    /// Network or protocol trouble; back off and retry.
    Transient(String),
}

enum ServeOutcome {
    Fault(String),
    HandleDropped,
}

async fn run_driver(
    shared: Arc<Shared>,
    credential: DriverCredential,
    config: SessionConfig,
    mut cmd_rx: mpsc::Receiver<InspectCommand>,
) {
    let mut backoff = Backoff::new(config.backoff);

    loop {
        if cmd_rx.is_closed() {
            debug!(account_id = %shared.account_id, "session handle dropped, stopping driver");
            shared.set_state(SessionState::Disconnected);
            return;
        }

        shared.set_state(SessionState::Authenticating);
        match connect_and_logon(&shared, &credential, &config).await {
            Ok(stream) => {
                backoff.reset();
                let (read_half, write_half) = stream.into_split();
                let (frame_tx, frame_rx) = mpsc::channel(16);
                let reader = tokio::spawn(read_frames(read_half, frame_tx));

                shared.set_state(SessionState::Ready);
                info!(account_id = %shared.account_id, "session authenticated and ready");

                let outcome = serve_ready(&shared, write_half, frame_rx, &mut cmd_rx).await;
                reader.abort();
                match outcome {
                    ServeOutcome::Fault(reason) => {
                        warn!(account_id = %shared.account_id, reason = %reason, "session faulted");
                        shared.set_state(SessionState::Faulted);
                    }
                    ServeOutcome::HandleDropped => {
                        shared.set_state(SessionState::Disconnected);
                        return;
                    }
                }
            }
            Err(LogonFailure::Fatal(reason)) => {
                error!(
                    account_id = %shared.account_id,
                    reason = %reason,
                    "credentials rejected, session parked until the credential file is fixed"
                );
                shared
                    .credentials_rejected
                    .store(true, Ordering::Relaxed);
                shared.set_state(SessionState::Disconnected);
                return;
            }
            Err(LogonFailure::Transient(reason)) => {
                warn!(account_id = %shared.account_id, reason = %reason, "logon attempt failed");
                shared.set_state(SessionState::Faulted);
            }
        }

        let delay = backoff.next_delay();
        debug!(
            account_id = %shared.account_id,
            delay_ms = delay.as_millis() as u64,
            "reconnecting after backoff"
        );
        tokio::time::sleep(delay).await;
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

async fn connect_and_logon(
    shared: &Shared,
    credential: &DriverCredential,
    config: &SessionConfig,
) -> Result<TcpStream, LogonFailure> {
    let mut stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect(&config.coordinator_addr),
    )
    .await
    .map_err(|_| LogonFailure::Transient("connect timed out".into()))?
    .map_err(|e| LogonFailure::Transient(format!("connect failed: {e}")))?;

    let now = unix_now();
    let first = attempt_logon(
        &mut stream,
        credential,
        totp::code_at(&credential.secret, now),
        config,
    )
    .await?;

    match first {
        LogonResult::Ok => Ok(stream),
        LogonResult::InvalidCredentials => {
            Err(LogonFailure::Fatal("account or password rejected".into()))
        }
        LogonResult::InvalidCode => {
            // Possibly clock skew; one retry with the previous window.
            debug!(
                account_id = %shared.account_id,
                "one-time code rejected, retrying with adjacent window"
            );
            let retry = attempt_logon(
                &mut stream,
                credential,
                totp::code_at(&credential.secret, now.saturating_sub(totp::WINDOW_SECS)),
                config,
            )
            .await?;
            match retry {
                LogonResult::Ok => Ok(stream),
                LogonResult::InvalidCode => Err(LogonFailure::Fatal(
                    "one-time code rejected in adjacent windows, shared secret is likely wrong"
                        .into(),
                )),
                LogonResult::InvalidCredentials => {
                    Err(LogonFailure::Fatal("account or password rejected".into()))
                }
            }
        }
    }
}

async fn attempt_logon(
    stream: &mut TcpStream,
    credential: &DriverCredential,
    code: String,
    config: &SessionConfig,
) -> Result<LogonResult, LogonFailure> {
    let logon = GcMessage::Logon {
        account_id: credential.account_id.clone(),
        password: credential.password.expose().clone(),
        code,
    };
    wire::write_message(stream, &logon)
        .await
        .map_err(|e| LogonFailure::Transient(format!("logon write failed: {e}")))?;

    let ack = tokio::time::timeout(config.connect_timeout, wire::read_message(stream))
        .await
        .map_err(|_| LogonFailure::Transient("logon ack timed out".into()))?
        .map_err(|e| LogonFailure::Transient(format!("logon ack read failed: {e}")))?;

    match ack {
        GcMessage::LogonAck { result } => Ok(result),
        GcMessage::Disconnect { reason } => Err(LogonFailure::Transient(format!(
            "disconnected during logon: {reason}"
        ))),
        other => Err(LogonFailure::Transient(format!(
            "unexpected message during logon: {other:?}"
        ))),
    }
}

/// Pump frames off the read half onto a channel. Runs as its own task
/// because the frame read is not cancel-safe (see `wire::read_message`).
async fn read_frames(
    mut reader: OwnedReadHalf,
    frames: mpsc::Sender<Result<GcMessage, WireError>>,
) {
    loop {
        match wire::read_message(&mut reader).await {
            Ok(msg) => {
                if frames.send(Ok(msg)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = frames.send(Err(e)).await;
                return;
            }
        }
    }
}

async fn serve_ready(
    shared: &Shared,
    mut writer: OwnedWriteHalf,
    mut frame_rx: mpsc::Receiver<Result<GcMessage, WireError>>,
    cmd_rx: &mut mpsc::Receiver<InspectCommand>,
) -> ServeOutcome {
    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                let Some(command) = command else {
                    return ServeOutcome::HandleDropped;
                };
                // A command can sit in the channel across a fault; never
                // replay it against the coordinator once the caller gave up.
                if command.reply.is_closed() || Instant::now() >= command.deadline {
                    debug!(account_id = %shared.account_id, "discarding stale inspect command");
                    continue;
                }
                if let Err(reason) = handle_inspect(shared, &mut writer, &mut frame_rx, command).await {
                    return ServeOutcome::Fault(reason);
                }
            }
            frame = frame_rx.recv() => {
                match frame {
                    None => return ServeOutcome::Fault("reader task ended".into()),
                    Some(Err(e)) => return ServeOutcome::Fault(format!("connection error: {e}")),
                    Some(Ok(GcMessage::Disconnect { reason })) => {
                        return ServeOutcome::Fault(format!("coordinator disconnect: {reason}"));
                    }
                    Some(Ok(msg)) => {
                        // Late reply for an abandoned job, or noise.
                        debug!(account_id = %shared.account_id, ?msg, "discarding unsolicited frame");
                    }
                }
            }
        }
    }
}

/// One inspect exchange. `Err` carries a fault reason that tears the
/// connection down; `Ok` means the session can keep serving.
async fn handle_inspect(
    shared: &Shared,
    writer: &mut OwnedWriteHalf,
    frame_rx: &mut mpsc::Receiver<Result<GcMessage, WireError>>,
    command: InspectCommand,
) -> Result<(), String> {
    let InspectCommand {
        request,
        deadline,
        reply,
    } = command;
    let job_id = uuid::Uuid::new_v4().simple().to_string();

    debug!(
        account_id = %shared.account_id,
        job_id = %job_id,
        asset_id = %request.asset_id,
        "issuing inspect request"
    );

    let message = GcMessage::inspect(job_id.clone(), &request);
    if let Err(e) = wire::write_message(writer, &message).await {
        let reason = format!("inspect write failed: {e}");
        let _ = reply.send(Err(SessionError::ConnectionLost(reason.clone())));
        return Err(reason);
    }

    let mut reply = Some(reply);
    loop {
        match tokio::time::timeout_at(deadline, frame_rx.recv()).await {
            Err(_) => {
                // Caller's deadline expired; it has already released the
                // slot. The late reply for this job id gets discarded by
                // the ready loop.
                debug!(
                    account_id = %shared.account_id,
                    job_id = %job_id,
                    "inspect deadline expired before the coordinator replied"
                );
                if let Some(tx) = reply.take() {
                    let _ = tx.send(Err(SessionError::DeadlineExceeded));
                }
                return Ok(());
            }
            Ok(None) => {
                let reason = "reader task ended".to_string();
                if let Some(tx) = reply.take() {
                    let _ = tx.send(Err(SessionError::ConnectionLost(reason.clone())));
                }
                return Err(reason);
            }
            Ok(Some(Err(e))) => {
                let reason = format!("connection error: {e}");
                if let Some(tx) = reply.take() {
                    let _ = tx.send(Err(SessionError::ConnectionLost(reason.clone())));
                }
                return Err(reason);
            }
            Ok(Some(Ok(GcMessage::InspectReply { job_id: jid, item }))) if jid == job_id => {
                if let Some(tx) = reply.take() {
                    let _ = tx.send(Ok(item));
                }
                return Ok(());
            }
            Ok(Some(Ok(GcMessage::InspectFailed { job_id: jid, reason }))) if jid == job_id => {
                if let Some(tx) = reply.take() {
                    let _ = tx.send(Err(SessionError::Rejected(reason)));
                }
                return Ok(());
            }
            Ok(Some(Ok(GcMessage::Disconnect { reason }))) => {
                let reason = format!("coordinator disconnect: {reason}");
                if let Some(tx) = reply.take() {
                    let _ = tx.send(Err(SessionError::ConnectionLost(reason.clone())));
                }
                return Err(reason);
            }
            Ok(Some(Ok(msg))) => {
                debug!(
                    account_id = %shared.account_id,
                    ?msg,
                    "discarding stale frame while awaiting inspect reply"
                );
            }
        }
    }
}
