//! Runtime error types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors raised by the runtime's own configuration surface.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A pattern string could not be parsed.
    #[error("Invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A remote dispatch strategy has already been installed.
    #[error("Remote dispatch strategy already installed")]
    RemoteDispatchInstalled,

    /// The listen capability is owned by an installed layer.
    #[error("Listen is owned by {owner}: {reason}")]
    ListenClaimed { owner: String, reason: String },

    /// No listen strategy has been installed.
    #[error("No listen transport configured")]
    NoListenTransport,

    /// The runtime has been closed.
    #[error("Runtime closed")]
    Closed,
}

/// Failure result of an action.
///
/// Every failure a caller can observe has this shape, whether it came from a
/// local handler, a remote peer, or the transport in between. It serializes
/// as a flat object (`code`, `message`, plus any extra detail fields) so it
/// can travel inside a reply envelope unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ActionError {
    /// Machine-readable failure kind.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Additional structured detail.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ActionError {
    pub const NOT_FOUND: &'static str = "act_not_found";
    pub const TRANSPORT: &'static str = "transport";
    pub const UPSTREAM_STATUS: &'static str = "upstream_status";
    pub const DECODE: &'static str = "decode";
    pub const BODY_REJECTED: &'static str = "body_rejected";
    pub const REPLY_DROPPED: &'static str = "reply_dropped";
    pub const CLOSED: &'static str = "runtime_closed";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach a detail field.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}
