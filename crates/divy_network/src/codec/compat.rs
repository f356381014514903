//! Compatibility with peers that reply without metadata.
//!
//! Older transport peers answer with a bare result object and no `meta$`
//! slot. Without metadata the reply cannot be tied back to its invocation,
//! so a minimal slot is filled in from the id the caller already knows.
//! Remove once every upstream sends `meta$`.

use divy_runtime::Meta;
use serde_json::Value;
use tracing::debug;

use super::{Envelope, META_KEY};

/// Fill in `meta$ = { id: invocation_id }` when the slot is absent or null.
/// Envelopes that already carry metadata pass through untouched.
pub fn backfill_meta(envelope: Envelope, invocation_id: &str) -> Envelope {
    if !needs_backfill(&envelope) {
        return envelope;
    }

    debug!("Reply for {invocation_id} has no {META_KEY}; synthesizing one");
    let mut fields = envelope.into_fields();
    let meta = serde_json::to_value(Meta::with_id(invocation_id))
        .unwrap_or_else(|_| serde_json::json!({ "id": invocation_id }));
    fields.insert(META_KEY.to_string(), meta);
    Envelope::from_fields(fields)
}

/// Whether `envelope` would be altered by [`backfill_meta`].
pub fn needs_backfill(envelope: &Envelope) -> bool {
    !matches!(envelope.fields().get(META_KEY), Some(v) if !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backfill_adds_minimal_meta() {
        let envelope = Envelope::from_slice(br#"{"ok": true}"#).unwrap();
        assert!(needs_backfill(&envelope));

        let filled = backfill_meta(envelope, "inv-1");
        assert_eq!(
            serde_json::to_value(&filled).unwrap(),
            json!({"ok": true, "meta$": {"id": "inv-1"}})
        );
        assert!(!needs_backfill(&filled));
    }

    #[test]
    fn test_backfill_keeps_existing_meta() {
        let envelope =
            Envelope::from_slice(br#"{"ok": true, "meta$": {"id": "peer-7", "tx": "t"}}"#).unwrap();
        let filled = backfill_meta(envelope.clone(), "inv-1");
        assert_eq!(filled, envelope);
    }

    #[test]
    fn test_backfill_replaces_null_meta() {
        let envelope = Envelope::from_slice(br#"{"ok": true, "meta$": null}"#).unwrap();
        let filled = backfill_meta(envelope, "inv-2");
        assert_eq!(filled.fields()[META_KEY], json!({"id": "inv-2"}));
    }
}
