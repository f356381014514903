//! Pin table: the resolved list of action patterns this node serves.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// How a listener consumes the actions matching its pin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinModel {
    /// Each message is handled by exactly one consumer.
    #[default]
    Consume,
    /// Every listener observes the message.
    Observe,
}

/// Transport kind used when a listener does not name one.
pub const DEFAULT_PIN_TYPE: &str = "http";

/// A listener declaration from configuration.
///
/// Any field other than `pin`/`pins` is an override applied to every entry
/// the declaration produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListenerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pins: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<PinModel>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ListenerSpec {
    /// A declaration for a single pin with no overrides.
    pub fn pin(pin: impl Into<String>) -> Self {
        Self {
            pin: Some(pin.into()),
            ..Default::default()
        }
    }

    /// A declaration for several pins with no overrides.
    pub fn pins<I, S>(pins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pins: Some(pins.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: PinModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Pins in declaration order: `pin` first, then `pins`.
    fn declared_pins(&self) -> impl Iterator<Item = &str> {
        self.pin
            .iter()
            .chain(self.pins.iter().flatten())
            .map(String::as_str)
    }
}

/// One resolved row of the pin table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinTableEntry {
    pub pin: String,
    pub model: PinModel,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Flatten listener declarations into pin table entries.
///
/// Order is declaration order. A declaration without pins contributes
/// nothing; empty pin strings are skipped.
pub fn resolve(listeners: &[ListenerSpec]) -> Vec<PinTableEntry> {
    let mut table = Vec::new();

    for spec in listeners {
        for pin in spec.declared_pins() {
            if pin.is_empty() {
                debug!("Skipping empty pin in listener declaration");
                continue;
            }
            table.push(PinTableEntry {
                pin: pin.to_string(),
                model: spec.model.unwrap_or_default(),
                kind: spec
                    .kind
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PIN_TYPE.to_string()),
                extra: spec.extra.clone(),
            });
        }
    }

    table
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
