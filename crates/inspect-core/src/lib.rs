//! Domain types for inspect-link resolution
//!
//! Pure crate with no I/O: the inspect-link parser, the resolved item
//! model with payload normalization, and the resolution error taxonomy
//! the HTTP boundary maps to status codes. Everything here is
//! deterministic and safe to call from any context.

pub mod error;
pub mod item;
pub mod link;

pub use error::{ParseError, ResolutionError};
pub use item::{ItemPayload, Rarity, ResolvedItem, Sticker, StickerPayload, normalize_payload};
pub use link::{InspectRequest, LinkOwner, parse_inspect_link};
