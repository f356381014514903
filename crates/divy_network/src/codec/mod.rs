//! Envelope codec: runtime invocations to and from the wire format.
//!
//! An envelope is one JSON object: the message (or reply) fields at the top
//! level plus the reserved [`META_KEY`] slot holding the invocation's
//! [`Meta`]. Reply envelopes carry either result fields or error fields,
//! never both; `meta$.error` tells them apart.
//!
//! Malformed wire data never panics. It surfaces as a [`DecodeError`] that
//! keeps the raw text, and callers turn it into an ordinary action failure.

pub mod compat;

use divy_runtime::{ActionError, ActionResult, Message, Meta, Reply};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Reserved top-level key carrying invocation metadata.
pub const META_KEY: &str = "meta$";

/// Wire container for one request or reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Whether the reserved metadata slot is present.
    pub fn has_meta(&self) -> bool {
        self.0.contains_key(META_KEY)
    }

    /// Parse a request or reply body. The body must be a JSON object.
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        let raw = || String::from_utf8_lossy(body).into_owned();
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Ok(Self(fields)),
            Ok(other) => Err(DecodeError::new(
                format!("expected a JSON object, got {}", json_kind(&other)),
                raw(),
            )),
            Err(e) => Err(DecodeError::new(format!("invalid JSON: {e}"), raw())),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Wire data that could not be decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("decode error: {reason}")]
pub struct DecodeError {
    pub reason: String,
    /// The original text that failed to decode.
    pub raw: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// The decode failure as an action failure, raw text included.
    pub fn into_action_error(self) -> ActionError {
        ActionError::new(ActionError::DECODE, self.reason).with_detail("raw", self.raw)
    }
}

/// Envelope for an outbound request. Every message field is kept; a
/// `meta$` field already in the message is replaced.
pub fn externalize_request(message: Message, meta: &Meta) -> Envelope {
    let mut fields = message;
    fields.insert(META_KEY.to_string(), meta_to_value(meta));
    Envelope(fields)
}

/// Split a request envelope into message and metadata. A missing (or null)
/// `meta$` means the peer supplied none.
pub fn internalize_request(envelope: Envelope) -> Result<(Message, Option<Meta>), DecodeError> {
    let mut fields = envelope.0;
    let meta = match fields.remove(META_KEY) {
        None | Some(Value::Null) => None,
        Some(value) => Some(meta_from_value(value)?),
    };
    Ok((fields, meta))
}

/// Parse and internalize a request body in one step.
pub fn decode_request(body: &[u8]) -> Result<(Message, Option<Meta>), DecodeError> {
    internalize_request(Envelope::from_slice(body)?)
}

/// Envelope for a reply. An error carries only error fields and sets
/// `meta$.error`; a result carries its fields and sets `meta$.empty` when it
/// has none.
pub fn externalize_reply(outcome: ActionResult, meta: &Meta) -> Envelope {
    let mut meta = meta.clone();
    meta.error = false;
    meta.empty = false;

    let mut fields = match outcome {
        Ok(out) => {
            meta.empty = out.is_empty();
            out
        }
        Err(err) => {
            meta.error = true;
            error_to_fields(err)
        }
    };
    fields.insert(META_KEY.to_string(), meta_to_value(&meta));
    Envelope(fields)
}

/// Decode a reply envelope. `invocation_id` is the id of the invocation the
/// reply answers; it seeds metadata for peers that omit it (see
/// [`compat::backfill_meta`]). Reply metadata is marked remote.
pub fn internalize_reply(envelope: Envelope, invocation_id: &str) -> Result<Reply, DecodeError> {
    let mut fields = compat::backfill_meta(envelope, invocation_id).0;

    let mut meta = match fields.remove(META_KEY) {
        Some(value) => meta_from_value(value)?,
        None => Meta::with_id(invocation_id),
    };
    meta.remote = true;

    let outcome = if meta.error {
        Err(error_from_fields(fields))
    } else {
        Ok(fields)
    };
    Ok(Reply { outcome, meta })
}

fn meta_to_value(meta: &Meta) -> Value {
    serde_json::to_value(meta).unwrap_or_else(|e| {
        warn!("Cannot serialize metadata {}: {e}", meta.id);
        Value::Null
    })
}

fn meta_from_value(value: Value) -> Result<Meta, DecodeError> {
    let raw = value.to_string();
    serde_json::from_value(value)
        .map_err(|e| DecodeError::new(format!("invalid {META_KEY}: {e}"), raw))
}

fn error_to_fields(err: ActionError) -> Map<String, Value> {
    let mut fields = err.details;
    fields.insert("code".into(), Value::String(err.code));
    fields.insert("message".into(), Value::String(err.message));
    fields
}

/// Rebuild an error from reply fields. Peers are not required to send a
/// `code`; non-string values are kept as their JSON text.
fn error_from_fields(mut fields: Map<String, Value>) -> ActionError {
    let mut take_text = |key: &str| {
        fields.remove(key).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    };
    let code = take_text("code").unwrap_or_else(|| "remote_error".into());
    let message = take_text("message").unwrap_or_else(|| "remote action failed".into());
    ActionError {
        code,
        message,
        details: fields,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
