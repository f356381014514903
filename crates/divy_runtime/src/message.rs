//! Action messages and invocation metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An action message: a flat JSON object of named arguments.
pub type Message = Map<String, Value>;

/// Build a [`Message`] from a `serde_json::json!` object literal.
///
/// Non-object values produce an empty message.
pub fn message_from(value: Value) -> Message {
    match value {
        Value::Object(map) => map,
        _ => Message::new(),
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Identity of one action invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Unique id of this invocation (UUID v4).
    #[serde(default)]
    pub id: String,
    /// Correlation id shared by every invocation in one call tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
    /// Pattern the invocation was matched against, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Ids of ancestor invocations, nearest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    /// Set when the invocation or reply crossed a network hop.
    #[serde(default, skip_serializing_if = "is_false")]
    pub remote: bool,
    /// Set on reply metadata when the reply carries an error.
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
    /// Set on reply metadata when the result had no fields.
    #[serde(default, skip_serializing_if = "is_false")]
    pub empty: bool,
    /// Unrecognised fields, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    /// Metadata for a fresh root invocation.
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            tx: Some(id.clone()),
            id,
            ..Default::default()
        }
    }

    /// Metadata carrying only an id. Used when a peer omitted metadata.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Metadata for an invocation made from within this one.
    pub fn child(&self) -> Self {
        let mut parents = Vec::with_capacity(self.parents.len() + 1);
        parents.push(self.id.clone());
        parents.extend(self.parents.iter().cloned());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tx: Some(self.correlation_id().to_string()),
            parents,
            ..Default::default()
        }
    }

    /// The id replies are correlated by: `tx` when set, otherwise `id`.
    pub fn correlation_id(&self) -> &str {
        self.tx.as_deref().unwrap_or(&self.id)
    }
}
