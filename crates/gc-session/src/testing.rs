//! In-process mock coordinator for session and pool tests
//!
//! Speaks the real frame dialect over a loopback TCP listener, so
//! everything above the socket — logon, retry, inspect correlation,
//! fault recovery — is exercised unmodified. Behavior is switchable at
//! runtime via [`LogonMode`] and [`InspectMode`].

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use inspect_core::{ItemPayload, StickerPayload};
use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::task::JoinHandle;

use crate::session::{Session, SessionState};
use crate::wire::{self, GcMessage, LogonResult};

/// How the mock answers logon attempts.
#[derive(Debug, Clone, Copy)]
pub enum LogonMode {
    /// Accept any logon carrying the configured password.
    Accept,
    /// Reject the first code seen, then behave like `Accept`.
    RejectFirstCode,
    /// Reject every code; the client should give up after one retry.
    RejectAllCodes,
    /// Reject the account outright.
    RejectCredentials,
}

/// How the mock answers inspect requests.
#[derive(Debug, Clone)]
pub enum InspectMode {
    /// Answer immediately with the canned item.
    Reply,
    /// Answer with the canned item after a delay.
    ReplyAfter(Duration),
    /// Answer with an explicit failure.
    Fail(String),
    /// Sever the connection without answering.
    DropConnection,
}

struct MockShared {
    password: String,
    logon_mode: Mutex<LogonMode>,
    inspect_mode: Mutex<InspectMode>,
    item: Mutex<ItemPayload>,
    logon_count: AtomicU64,
    inspect_count: AtomicU64,
    code_rejected_once: AtomicBool,
    overlap_detected: AtomicBool,
}

/// Loopback stand-in for the game coordinator.
pub struct MockCoordinator {
    addr: String,
    shared: Arc<MockShared>,
    accept_task: JoinHandle<()>,
}

impl MockCoordinator {
    /// Bind on an ephemeral loopback port and start accepting.
    pub async fn start(password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener
            .local_addr()
            .expect("listener local addr")
            .to_string();

        let shared = Arc::new(MockShared {
            password: password.to_string(),
            logon_mode: Mutex::new(LogonMode::Accept),
            inspect_mode: Mutex::new(InspectMode::Reply),
            item: Mutex::new(Self::sample_item()),
            logon_count: AtomicU64::new(0),
            inspect_count: AtomicU64::new(0),
            code_rejected_once: AtomicBool::new(false),
            overlap_detected: AtomicBool::new(false),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(handle_connection(stream, Arc::clone(&accept_shared)));
            }
        });

        Self {
            addr,
            shared,
            accept_task,
        }
    }

    /// The canned item every successful inspect returns by default.
    pub fn sample_item() -> ItemPayload {
        ItemPayload {
            name: "AK-47 | Redline (Field-Tested)".into(),
            paint_wear: 0.216_572,
            paint_seed: 661,
            rarity: 5,
            stickers: vec![StickerPayload {
                slot: 0,
                sticker_id: 4693,
                wear: Some(0.12),
                name: Some("Crown (Foil)".into()),
            }],
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn set_logon_mode(&self, mode: LogonMode) {
        *self.shared.logon_mode.lock().unwrap() = mode;
    }

    pub fn set_inspect_mode(&self, mode: InspectMode) {
        *self.shared.inspect_mode.lock().unwrap() = mode;
    }

    pub fn set_item(&self, item: ItemPayload) {
        *self.shared.item.lock().unwrap() = item;
    }

    /// Logon attempts seen across all connections.
    pub fn logon_count(&self) -> u64 {
        self.shared.logon_count.load(Ordering::Relaxed)
    }

    /// Inspect requests seen across all connections.
    pub fn inspect_count(&self) -> u64 {
        self.shared.inspect_count.load(Ordering::Relaxed)
    }

    /// Whether any single connection ever had two inspects in flight.
    pub fn overlap_detected(&self) -> bool {
        self.shared.overlap_detected.load(Ordering::Relaxed)
    }
}

impl Drop for MockCoordinator {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_connection(stream: TcpStream, shared: Arc<MockShared>) {
    let (mut read_half, write_half) = stream.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(write_half));
    // Per-connection in-flight inspect count; >1 means the client broke
    // its one-call-per-session promise.
    let pending = Arc::new(AtomicU64::new(0));

    loop {
        let message = match wire::read_message(&mut read_half).await {
            Ok(message) => message,
            Err(_) => return,
        };

        match message {
            GcMessage::Logon { password, .. } => {
                shared.logon_count.fetch_add(1, Ordering::Relaxed);
                let mode = *shared.logon_mode.lock().unwrap();
                let accepted = password == shared.password;
                let result = match mode {
                    LogonMode::Accept => {
                        if accepted {
                            LogonResult::Ok
                        } else {
                            LogonResult::InvalidCredentials
                        }
                    }
                    LogonMode::RejectFirstCode => {
                        if shared.code_rejected_once.swap(true, Ordering::Relaxed) {
                            if accepted {
                                LogonResult::Ok
                            } else {
                                LogonResult::InvalidCredentials
                            }
                        } else {
                            LogonResult::InvalidCode
                        }
                    }
                    LogonMode::RejectAllCodes => LogonResult::InvalidCode,
                    LogonMode::RejectCredentials => LogonResult::InvalidCredentials,
                };
                let mut w = writer.lock().await;
                if wire::write_message(&mut *w, &GcMessage::LogonAck { result })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            GcMessage::Inspect { job_id, .. } => {
                shared.inspect_count.fetch_add(1, Ordering::Relaxed);
                if pending.fetch_add(1, Ordering::SeqCst) > 0 {
                    shared.overlap_detected.store(true, Ordering::Relaxed);
                }
                let mode = shared.inspect_mode.lock().unwrap().clone();
                match mode {
                    InspectMode::DropConnection => return,
                    InspectMode::Fail(reason) => {
                        let mut w = writer.lock().await;
                        let _ = wire::write_message(
                            &mut *w,
                            &GcMessage::InspectFailed { job_id, reason },
                        )
                        .await;
                        pending.fetch_sub(1, Ordering::SeqCst);
                    }
                    InspectMode::Reply => {
                        let item = shared.item.lock().unwrap().clone();
                        reply_after(
                            Arc::clone(&writer),
                            Arc::clone(&pending),
                            job_id,
                            item,
                            Duration::ZERO,
                        );
                    }
                    InspectMode::ReplyAfter(delay) => {
                        let item = shared.item.lock().unwrap().clone();
                        reply_after(
                            Arc::clone(&writer),
                            Arc::clone(&pending),
                            job_id,
                            item,
                            delay,
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

fn reply_after(
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    pending: Arc<AtomicU64>,
    job_id: String,
    item: ItemPayload,
    delay: Duration,
) {
    tokio::spawn(async move {
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        let mut w = writer.lock().await;
        let _ = wire::write_message(&mut *w, &GcMessage::InspectReply { job_id, item }).await;
        pending.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Block until the session reaches `target`, or panic after `timeout`.
pub async fn wait_for_state(session: &Session, target: SessionState, timeout: Duration) {
    let mut rx = session.watch_state();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if *rx.borrow() == target {
            return;
        }
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => continue,
            _ => panic!(
                "session did not reach {target:?} within {timeout:?}, last state {:?}",
                *rx.borrow()
            ),
        }
    }
}
