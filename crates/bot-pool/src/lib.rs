//! Session pool and resolution coordinator
//!
//! [`SessionPool`] owns the fixed set of bot sessions and hands out
//! exclusive claims, preferring the least-used ready session.
//! [`Resolver`] sits on top: it parses inspect links, borrows a
//! session, runs the exchange, and normalizes the reply — every failure
//! mapped into the [`inspect_core::ResolutionError`] taxonomy the HTTP
//! boundary understands.

pub mod error;
pub mod pool;
pub mod resolver;

pub use error::PoolError;
pub use pool::{PoolHealth, PoolStatus, SessionHealth, SessionPool, WaitMode};
pub use resolver::Resolver;
