//! Coordinator wire dialect
//!
//! The remote protocol is external and versioned; its exact on-wire
//! encoding is an integration detail validated against the live
//! service. This module fixes the dialect spoken by this client and by
//! the test coordinator: length-prefixed (u32 big-endian) JSON frames
//! carrying a tagged [`GcMessage`]. The session state machine does not
//! depend on the framing and survives swapping this codec out.

use bytes::{BufMut, BytesMut};
use inspect_core::{InspectRequest, ItemPayload, LinkOwner};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;

/// Upper bound on a single frame body. Inspect replies are small; a
/// larger frame indicates a desynchronized or hostile peer.
pub const MAX_FRAME_LEN: usize = 256 * 1024;

/// Outcome of a logon attempt, as reported by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogonResult {
    Ok,
    /// The one-time code did not match; possibly clock skew.
    InvalidCode,
    /// Account or password rejected outright.
    InvalidCredentials,
}

/// Whether the owner segment of an inspect request names an inventory
/// account or a market listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Inventory,
    Market,
}

/// Messages exchanged with the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcMessage {
    Logon {
        account_id: String,
        password: String,
        code: String,
    },
    LogonAck {
        result: LogonResult,
    },
    Inspect {
        job_id: String,
        owner_kind: OwnerKind,
        owner_id: String,
        asset_id: String,
        access_token: String,
    },
    InspectReply {
        job_id: String,
        item: ItemPayload,
    },
    InspectFailed {
        job_id: String,
        reason: String,
    },
    Disconnect {
        reason: String,
    },
}

impl GcMessage {
    /// Build the outbound inspect message for a parsed request.
    pub fn inspect(job_id: String, request: &InspectRequest) -> Self {
        let (owner_kind, owner_id) = match &request.owner {
            LinkOwner::Inventory(id) => (OwnerKind::Inventory, id.clone()),
            LinkOwner::Market(id) => (OwnerKind::Market, id.clone()),
        };
        GcMessage::Inspect {
            job_id,
            owner_kind,
            owner_id,
            asset_id: request.asset_id.clone(),
            access_token: request.access_token.clone(),
        }
    }
}

/// Write one framed message.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &GcMessage,
) -> Result<(), WireError> {
    let body = serde_json::to_vec(message)
        .map_err(|e| WireError::Codec(format!("encoding frame: {e}")))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::Oversized(body.len()));
    }

    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message.
///
/// Not cancel-safe: dropping the future mid-frame desynchronizes the
/// stream. The session keeps reads on a dedicated task for this reason.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<GcMessage, WireError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::Oversized(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body).map_err(|e| WireError::Codec(format!("decoding frame: {e}")))
}
