//! Bot authentication library
//!
//! Provides per-bot credential loading and time-based one-time-code
//! generation for game-coordinator logons. This crate is a standalone
//! library with no dependency on the gateway binary — it can be tested
//! and used independently.
//!
//! Credential flow:
//! 1. Operator provisions the credential file (one record per bot)
//! 2. Gateway calls `CredentialSet::load()` once at startup
//! 3. Each bot session decodes its shared secret via
//!    `totp::decode_shared_secret()`
//! 4. At logon time the session calls `totp::current_code()` (and
//!    `totp::code_at()` with the previous window on a code rejection)
//!
//! The set is immutable after load; sessions only ever read from it.

pub mod credentials;
pub mod totp;

pub use common::{Error, Result};
pub use credentials::{Credential, CredentialSet};
pub use totp::{code_at, current_code, decode_shared_secret};
