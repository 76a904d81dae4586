//! Frame — the wire envelope exchanged with drawing clients.
//!
//! ARCHITECTURE
//! ============
//! Every message in either direction is a JSON text frame shaped as
//! `{"type": <string>, "payload": <any>}`. Inbound frames are decoded
//! into [`Inbound`] and validated here; outbound traffic is the [`Frame`]
//! enum, which serializes to the same envelope via serde's adjacent
//! tagging.
//!
//! DESIGN
//! ======
//! - A stroke is the unit of replication. It is validated completely
//!   before anything downstream sees it, so the room never stores a
//!   half-formed gesture.
//! - Decoding never fails the connection. Callers log the returned
//!   `CodecError` and move on to the next frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// LIMITS
// =============================================================================

/// Minimum points in a stroke. A single point is not a gesture.
pub const MIN_STROKE_POINTS: usize = 2;

/// Upper bound on the length of a stroke's color string.
pub const MAX_COLOR_LEN: usize = 64;

/// Frame data key stamped onto relayed cursor payloads.
pub const FRAME_CLIENT_ID: &str = "client_id";

/// Decoder knobs taken from `Config`.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_points: usize,
    /// Accept `cursor` / `draw_progress`. Otherwise they are unknown types.
    pub relay_ephemeral: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_points: crate::config::DEFAULT_MAX_STROKE_POINTS, relay_ephemeral: false }
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Object payload. Alias to reduce noise in signatures.
pub type Data = serde_json::Map<String, Value>;

/// A surface coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
}

/// One completed drawing gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub color: String,
    pub size: f64,
    #[serde(default)]
    pub tool: Tool,
}

/// Payload of `clear`. Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Payload of `user_joined` / `user_left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Members in the room after the transition.
    pub count: usize,
    /// Connection whose admission or eviction caused the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Outbound frame. `type` is the variant name in `snake_case`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Frame {
    /// Full room snapshot, sent once right after admission.
    Init(Vec<Stroke>),
    Draw(Stroke),
    Clear(Empty),
    UserJoined(Presence),
    UserLeft(Presence),
    Cursor(Data),
    DrawProgress(Data),
}

/// A decoded, validated client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Draw(Stroke),
    Clear,
    Cursor(Data),
    DrawProgress(Data),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown frame type: {0}")]
    UnknownType(String),
    #[error("invalid stroke: {0}")]
    InvalidStroke(&'static str),
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode and validate one inbound text frame.
///
/// # Errors
///
/// Returns a `CodecError` for anything that should be dropped: bad JSON,
/// a missing or unrecognized `type`, or a payload that fails validation.
pub fn decode(text: &str, limits: Limits) -> Result<Inbound, CodecError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.kind.as_str() {
        "draw" => {
            let stroke: Stroke = serde_json::from_value(envelope.payload)?;
            validate_stroke(&stroke, limits.max_points)?;
            Ok(Inbound::Draw(stroke))
        }
        // The payload of clear carries nothing; whatever the client sent is ignored.
        "clear" => Ok(Inbound::Clear),
        "cursor" if limits.relay_ephemeral => Ok(Inbound::Cursor(into_object(envelope.payload)?)),
        "draw_progress" if limits.relay_ephemeral => Ok(Inbound::DrawProgress(into_object(envelope.payload)?)),
        _ => Err(CodecError::UnknownType(envelope.kind)),
    }
}

/// Check the structural rules a stroke must satisfy before it can be logged.
///
/// # Errors
///
/// Returns `CodecError::InvalidStroke` naming the first rule violated.
pub fn validate_stroke(stroke: &Stroke, max_points: usize) -> Result<(), CodecError> {
    if stroke.points.len() < MIN_STROKE_POINTS {
        return Err(CodecError::InvalidStroke("fewer than 2 points"));
    }
    if stroke.points.len() > max_points {
        return Err(CodecError::InvalidStroke("too many points"));
    }
    if stroke.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(CodecError::InvalidStroke("non-finite coordinate"));
    }
    if stroke.color.is_empty() || stroke.color.len() > MAX_COLOR_LEN {
        return Err(CodecError::InvalidStroke("color length out of range"));
    }
    if !stroke.size.is_finite() || stroke.size <= 0.0 {
        return Err(CodecError::InvalidStroke("size must be positive"));
    }
    Ok(())
}

fn into_object(payload: Value) -> Result<Data, CodecError> {
    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(CodecError::InvalidPayload("expected an object")),
    }
}

// =============================================================================
// ENCODE
// =============================================================================

impl Frame {
    #[must_use]
    pub fn clear() -> Self {
        Self::Clear(Empty {})
    }

    /// Wire name of the frame, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Draw(_) => "draw",
            Self::Clear(_) => "clear",
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
            Self::Cursor(_) => "cursor",
            Self::DrawProgress(_) => "draw_progress",
        }
    }

    /// Serialize to the JSON text sent over the socket.
    ///
    /// # Errors
    ///
    /// Returns a serde error if the payload cannot be represented as JSON.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
