//! Inbound frame classification.
//!
//! Incoming frames share one connection but belong to different logical
//! channels: private account events, public stream data, and request/reply
//! correlation frames. [`Classifier`] decides a frame's logical type by
//! evaluating an ordered list of [`ClassificationRule`]s against the frame's
//! shape, so diffs can be routed before any payload decoding happens.
//!
//! Classification is a pure function of (frame, rule set) and never fails;
//! a frame no rule matches is simply unclassified.

use std::collections::BTreeSet;

use serde_json::Value;

/// How a matching rule derives the frame's type tag.
#[derive(Debug, Clone)]
pub enum TagSource {
    /// Use the matched field's string value verbatim (e.g. the stream name).
    MatchedValue,
    /// Use a fixed tag regardless of the field's value.
    Fixed(String),
}

/// A single type-detection rule.
///
/// The rule looks up `field` at `depth` nesting levels below the frame root
/// (depth 0 = top level, depth 1 = inside an envelope member). An absent
/// field skips the rule; a present field matches unless `allowed` is set and
/// excludes the field's value.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    field: String,
    depth: usize,
    allowed: Option<BTreeSet<String>>,
    force: bool,
    tag: TagSource,
}

impl ClassificationRule {
    #[must_use]
    pub fn new(field: impl Into<String>, depth: usize, tag: TagSource) -> Self {
        Self {
            field: field.into(),
            depth,
            allowed: None,
            force: false,
            tag,
        }
    }

    /// Restricts the rule to a known set of field values.
    #[must_use]
    pub fn with_allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Marks the rule as a catch-all matching on field presence alone.
    ///
    /// Ordinary rules require a string-valued field; a forcing rule accepts
    /// any value type. Used for reply frames, whose only identifying field
    /// is a numeric correlation id.
    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Evaluates the rule against a frame, returning the type tag on a match.
    fn evaluate(&self, frame: &Value) -> Option<String> {
        let value = lookup(frame, &self.field, self.depth)?;

        if let Some(allowed) = &self.allowed {
            let text = value.as_str()?;
            if !allowed.contains(text) {
                return None;
            }
        }

        // Only string fields carry classification signal unless the rule
        // forces a match on presence.
        if !self.force && !value.is_string() {
            return None;
        }

        match &self.tag {
            TagSource::MatchedValue => value.as_str().map(String::from),
            TagSource::Fixed(tag) => Some(tag.clone()),
        }
    }
}

/// Ordered rule set applied to every inbound frame.
///
/// Rules are evaluated in priority order; the first match determines the
/// type. The rule set is fixed at construction.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

/// Private account event names recognized by the default rule set.
///
/// Public payloads also carry an event-name field (`depthUpdate`, `trade`,
/// ...), so the private rule must be value-constrained or it would shadow
/// the stream rule for every public frame.
const PRIVATE_EVENT_NAMES: [&str; 4] = [
    "executionReport",
    "outboundAccountPosition",
    "balanceUpdate",
    "listStatus",
];

/// Type tag assigned to request/reply correlation frames.
pub const REPLY_TAG: &str = "reply";

impl Classifier {
    #[must_use]
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Builds the default rule set, in priority order:
    ///
    /// 1. private account events — event name nested one level inside the
    ///    envelope, constrained to [`PRIVATE_EVENT_NAMES`];
    /// 2. public stream data — top-level `stream` field, value used verbatim
    ///    as the routing key;
    /// 3. replies — top-level numeric `id`, forcing catch-all.
    #[must_use]
    pub fn with_default_rules() -> Self {
        Self::new(vec![
            ClassificationRule::new("e", 1, TagSource::MatchedValue)
                .with_allowed(PRIVATE_EVENT_NAMES),
            ClassificationRule::new("stream", 0, TagSource::MatchedValue),
            ClassificationRule::new("id", 0, TagSource::Fixed(REPLY_TAG.to_string())).force(),
        ])
    }

    /// Classifies a frame, returning its type tag or `None` if no rule
    /// matches.
    #[must_use]
    pub fn classify(&self, frame: &Value) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.evaluate(frame))
    }
}

/// Depth-bounded field lookup.
///
/// Depth 0 reads a field of the frame itself; deeper levels descend through
/// object members and array elements, returning the first occurrence found.
fn lookup<'a>(frame: &'a Value, field: &str, depth: usize) -> Option<&'a Value> {
    if depth == 0 {
        return frame.get(field);
    }
    match frame {
        Value::Object(map) => map.values().find_map(|v| lookup(v, field, depth - 1)),
        Value::Array(items) => items.iter().find_map(|v| lookup(v, field, depth - 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_at_top_level() {
        let frame = json!({"stream": "btcusdt@depth"});
        assert_eq!(
            lookup(&frame, "stream", 0).and_then(Value::as_str),
            Some("btcusdt@depth")
        );
    }

    #[test]
    fn lookup_one_level_down() {
        let frame = json!({"stream": "x", "data": {"e": "depthUpdate"}});
        assert_eq!(
            lookup(&frame, "e", 1).and_then(Value::as_str),
            Some("depthUpdate")
        );
    }

    #[test]
    fn lookup_does_not_cross_depth() {
        let frame = json!({"data": {"e": "depthUpdate"}});
        assert!(lookup(&frame, "e", 0).is_none());
        assert!(lookup(&frame, "data", 1).is_none());
    }

    #[test]
    fn lookup_descends_arrays() {
        let frame = json!({"batch": [{"e": "executionReport"}]});
        assert_eq!(
            lookup(&frame, "e", 2).and_then(Value::as_str),
            Some("executionReport")
        );
    }
}
