//! Action patterns and the registry that matches messages against them.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::RuntimeError;
use crate::message::Message;

/// A set of `key:value` pairs a message must carry to match.
///
/// Parsed from strings such as `"role:math,cmd:sum"`. Pairs are kept sorted
/// by key so two patterns with the same pairs compare equal regardless of
/// the order they were written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    pairs: BTreeMap<String, String>,
}

impl Pattern {
    pub fn parse(input: &str) -> Result<Self, RuntimeError> {
        let invalid = |reason: &str| RuntimeError::InvalidPattern {
            pattern: input.to_string(),
            reason: reason.to_string(),
        };

        let mut pairs = BTreeMap::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once(':')
                .ok_or_else(|| invalid("expected key:value"))?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() {
                return Err(invalid("empty key"));
            }
            pairs.insert(key.to_string(), value.to_string());
        }

        if pairs.is_empty() {
            return Err(invalid("no pairs"));
        }
        Ok(Self { pairs })
    }

    /// Whether every pair of this pattern is present in `message`.
    pub fn matches(&self, message: &Message) -> bool {
        self.pairs.iter().all(|(key, expected)| {
            message
                .get(key)
                .and_then(pattern_text)
                .is_some_and(|actual| actual == *expected)
        })
    }

    /// Number of pairs. More pairs means a more specific pattern.
    pub fn specificity(&self) -> usize {
        self.pairs.len()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.pairs {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{key}:{value}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::str::FromStr for Pattern {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Textual form of a message value for pattern comparison. Objects, arrays
/// and null never match.
fn pattern_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Ordered collection of pattern → entry registrations.
#[derive(Debug)]
pub struct PatternRegistry<H> {
    entries: Vec<(Pattern, H)>,
}

impl<H> PatternRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `entry` under `pattern`. An identical pattern is replaced in
    /// place and the previous entry returned.
    pub fn insert(&mut self, pattern: Pattern, entry: H) -> Option<H> {
        if let Some(slot) = self.entries.iter_mut().find(|(p, _)| *p == pattern) {
            return Some(std::mem::replace(&mut slot.1, entry));
        }
        self.entries.push((pattern, entry));
        None
    }

    /// Most specific registration matching `message`. Ties go to the
    /// earliest registration.
    pub fn find(&self, message: &Message) -> Option<(&Pattern, &H)> {
        let mut best: Option<&(Pattern, H)> = None;
        for candidate in &self.entries {
            if !candidate.0.matches(message) {
                continue;
            }
            match best {
                Some(current) if current.0.specificity() >= candidate.0.specificity() => {}
                _ => best = Some(candidate),
            }
        }
        best.map(|(p, h)| (p, h))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H> Default for PatternRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
