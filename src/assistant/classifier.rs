//! Intent Classifier
//!
//! Scans the rule registry in registration order and returns the first
//! pattern match, with its capture groups turned into named parameters.
//! When nothing matches the result is the `Unmatched` sentinel, which the
//! pipeline hands to the context analyzer.
//!
//! Classification is pure: the same text against the same registry always
//! yields the same `ParsedIntent`.

use std::sync::Arc;

use regex::Captures;
use serde_json::Value;
use tracing::debug;

use super::registry::{IntentRule, RuleRegistry};
use super::types::{ParsedIntent, Parameters, Resolution, RULE_CONFIDENCE};

pub struct IntentClassifier {
    registry: Arc<RuleRegistry>,
}

impl IntentClassifier {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    /// Trim and collapse internal whitespace.
    ///
    /// Case folding happens in the patterns themselves (they are compiled
    /// case-insensitive), so captured values keep the caller's casing.
    pub fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn classify(&self, text: &str) -> ParsedIntent {
        let normalized = Self::normalize(text);

        for rule in self.registry.rules() {
            for pattern in &rule.patterns {
                if let Some(captures) = pattern.regex().captures(&normalized) {
                    debug!(
                        intent = %rule.intent,
                        pattern = pattern.source(),
                        "rule matched"
                    );
                    return ParsedIntent {
                        intent: rule.intent,
                        action: rule.action,
                        parameters: extract_parameters(rule, &captures),
                        confidence: RULE_CONFIDENCE,
                        raw_match: captures
                            .get(0)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default(),
                        resolution: Resolution::Rule,
                    };
                }
            }
        }

        debug!(text = %normalized, "no rule matched");
        ParsedIntent::unmatched(&normalized)
    }
}

/// Defaults first, then positional captures by declared name.
///
/// Empty captures leave the default in place. Parameters named `*_id`
/// become integers when they parse as one.
pub(crate) fn extract_parameters(rule: &IntentRule, captures: &Captures<'_>) -> Parameters {
    let mut parameters = rule.defaults.clone();

    for (index, name) in rule.params.iter().enumerate() {
        let Some(value) = captures.get(index + 1).map(|m| clean_fragment(m.as_str())) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let value = if name.ends_with("_id") {
            value
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(value))
        } else {
            Value::String(value)
        };
        parameters.insert(name.clone(), value);
    }

    parameters
}

/// Strip surrounding quotes and trailing sentence punctuation
fn clean_fragment(fragment: &str) -> String {
    fragment
        .trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .trim_matches(['"', '\'', '`'])
        .trim()
        .to_string()
}
