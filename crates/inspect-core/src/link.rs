//! Inspect-link parsing
//!
//! An inspect link is an opaque `steam://` string carrying a
//! `+csgo_econ_action_preview` action whose parameter blob encodes the
//! owner, asset id, and access token: `S<digits>A<digits>D<digits>` for
//! items sitting in an inventory, or `M<digits>A<digits>D<digits>` for
//! market listings (no owning account). Parsing is pure and idempotent:
//! the same input always yields the same result.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;

/// Action marker preceding the parameter blob in every inspect link.
pub const PREVIEW_MARKER: &str = "+csgo_econ_action_preview";

static INVENTORY_BLOB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S(\d+)A(\d+)D(\d+)$").expect("inventory blob pattern"));

static MARKET_BLOB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^M(\d+)A(\d+)D(\d+)$").expect("market blob pattern"));

/// Where the inspected item lives, and the id of that context.
///
/// Inventory links carry the owning account id (`S` segment); market
/// links carry the listing id instead (`M` segment). The coordinator
/// request encodes them differently, so the distinction is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOwner {
    Inventory(String),
    Market(String),
}

impl LinkOwner {
    /// The raw digit string for the owner position, regardless of variant.
    pub fn id(&self) -> &str {
        match self {
            LinkOwner::Inventory(id) | LinkOwner::Market(id) => id,
        }
    }
}

/// Parsed inspect request, ready to hand to a bot session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectRequest {
    pub owner: LinkOwner,
    pub asset_id: String,
    pub access_token: String,
}

/// Parse an inspect-link string into an [`InspectRequest`].
///
/// The input is expected to be URL-decoded already, but a literal
/// `%20` between the marker and the blob is tolerated since callers
/// frequently paste links straight out of an address bar.
pub fn parse_inspect_link(link: &str) -> Result<InspectRequest, ParseError> {
    let Some(idx) = link.find(PREVIEW_MARKER) else {
        return Err(ParseError::NotAnInspectLink);
    };

    let blob = link[idx + PREVIEW_MARKER.len()..]
        .trim_start_matches("%20")
        .trim();
    if blob.is_empty() {
        return Err(ParseError::Malformed);
    }

    if let Some(caps) = INVENTORY_BLOB.captures(blob) {
        return Ok(InspectRequest {
            owner: LinkOwner::Inventory(caps[1].to_string()),
            asset_id: caps[2].to_string(),
            access_token: caps[3].to_string(),
        });
    }

    if let Some(caps) = MARKET_BLOB.captures(blob) {
        return Ok(InspectRequest {
            owner: LinkOwner::Market(caps[1].to_string()),
            asset_id: caps[2].to_string(),
            access_token: caps[3].to_string(),
        });
    }

    Err(ParseError::UnrecognizedFormat)
}
