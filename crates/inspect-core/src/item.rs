//! Resolved item model and payload normalization
//!
//! [`ItemPayload`] is what a bot session decodes off the wire;
//! [`ResolvedItem`] is the validated, immutable result handed to
//! callers (and onward to storage/rendering layers). Normalization is
//! strict: values outside expected semantic ranges are rejected, never
//! clamped.

use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;

/// Cosmetic rarity tier, mapped from the coordinator's numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Stock,
    Consumer,
    Industrial,
    MilSpec,
    Restricted,
    Classified,
    Covert,
    Contraband,
}

impl Rarity {
    /// Map the coordinator's rarity id to the closed enum.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Rarity::Stock),
            1 => Some(Rarity::Consumer),
            2 => Some(Rarity::Industrial),
            3 => Some(Rarity::MilSpec),
            4 => Some(Rarity::Restricted),
            5 => Some(Rarity::Classified),
            6 => Some(Rarity::Covert),
            7 => Some(Rarity::Contraband),
            _ => None,
        }
    }

    /// Lowercase label for logs and API responses.
    pub fn label(&self) -> &'static str {
        match self {
            Rarity::Stock => "stock",
            Rarity::Consumer => "consumer",
            Rarity::Industrial => "industrial",
            Rarity::MilSpec => "mil_spec",
            Rarity::Restricted => "restricted",
            Rarity::Classified => "classified",
            Rarity::Covert => "covert",
            Rarity::Contraband => "contraband",
        }
    }
}

/// Sticker or charm attachment as decoded off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickerPayload {
    pub slot: u32,
    pub sticker_id: u32,
    #[serde(default)]
    pub wear: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Raw item data decoded from a coordinator inspect reply.
///
/// Field ranges are not trusted here; normalization validates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub name: String,
    pub paint_wear: f64,
    pub paint_seed: i64,
    pub rarity: u32,
    #[serde(default)]
    pub stickers: Vec<StickerPayload>,
}

/// Validated attachment record, order preserved from the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sticker {
    pub slot: u32,
    pub sticker_id: u32,
    pub wear: Option<f64>,
    pub name: Option<String>,
}

/// Authoritative item metadata produced exactly once per successful
/// resolution. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedItem {
    pub display_name: String,
    /// Wear value in [0, 1] determining the condition tier.
    pub wear_float: f64,
    /// Deterministic visual pattern variant.
    pub pattern_seed: u32,
    pub rarity: Rarity,
    pub stickers: Vec<Sticker>,
    /// Original payload, retained for downstream consumers.
    pub raw: serde_json::Value,
}

/// Normalize a decoded payload into a [`ResolvedItem`].
///
/// Rejections are `MalformedResponse`: wear outside [0, 1] (clamping
/// is forbidden), a negative pattern seed, or an unknown rarity id.
/// Session state is never touched here.
pub fn normalize_payload(payload: &ItemPayload) -> Result<ResolvedItem, ResolutionError> {
    if !payload.paint_wear.is_finite() || !(0.0..=1.0).contains(&payload.paint_wear) {
        return Err(ResolutionError::MalformedResponse(format!(
            "wear float {} outside [0, 1]",
            payload.paint_wear
        )));
    }

    let pattern_seed = u32::try_from(payload.paint_seed).map_err(|_| {
        ResolutionError::MalformedResponse(format!("negative pattern seed {}", payload.paint_seed))
    })?;

    let rarity = Rarity::from_id(payload.rarity).ok_or_else(|| {
        ResolutionError::MalformedResponse(format!("unknown rarity id {}", payload.rarity))
    })?;

    let raw = serde_json::to_value(payload)
        .map_err(|e| ResolutionError::MalformedResponse(format!("unserializable payload: {e}")))?;

    Ok(ResolvedItem {
        display_name: payload.name.clone(),
        wear_float: payload.paint_wear,
        pattern_seed,
        rarity,
        stickers: payload
            .stickers
            .iter()
            .map(|s| Sticker {
                slot: s.slot,
                sticker_id: s.sticker_id,
                wear: s.wear,
                name: s.name.clone(),
            })
            .collect(),
        raw,
    })
}
