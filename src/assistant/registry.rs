//! Rule Registry
//!
//! Ordered table of intents and their match patterns, loaded from YAML and
//! compiled once at startup. The registry is immutable after construction
//! and shared read-only (behind an `Arc`) by every request.
//!
//! Registration order is classifier priority: earlier intents win, and
//! within an intent earlier patterns win.

use std::collections::HashSet;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::info;

use super::context::HEURISTIC_TARGETS;
use super::types::{Action, Capability, Intent, Parameters};
use crate::config::AssistantConfig;
use crate::error::RegistryError;

/// Rule table shipped with the crate
const BUILTIN_RULES: &str = include_str!("rules.yaml");

// ============================================================================
// YAML shape
// ============================================================================

#[derive(Debug, Deserialize)]
struct RuleFile {
    version: String,
    #[serde(default)]
    description: Option<String>,
    intents: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    intent: String,
    action: String,
    #[serde(default)]
    capability: Option<String>,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default)]
    defaults: Parameters,
    patterns: Vec<String>,
}

// ============================================================================
// Compiled registry
// ============================================================================

/// A compiled pattern for matching
#[derive(Debug)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl CompiledPattern {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

/// One registered intent
#[derive(Debug)]
pub struct IntentRule {
    pub intent: Intent,
    pub action: Action,
    /// Capability required before the action may run; `None` for
    /// template-only intents
    pub capability: Option<Capability>,
    /// Names for positional capture groups
    pub params: Vec<String>,
    /// Constant parameters, overridden by non-empty captures
    pub defaults: Parameters,
    pub patterns: Vec<CompiledPattern>,
}

#[derive(Debug)]
pub struct RuleRegistry {
    version: String,
    description: Option<String>,
    rules: Vec<IntentRule>,
}

impl RuleRegistry {
    /// Registry built from the embedded rule table
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml(BUILTIN_RULES)
    }

    /// Load from `config.rules_path` when set, otherwise the embedded table
    pub fn from_config(config: &AssistantConfig) -> Result<Self, RegistryError> {
        match &config.rules_path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML rule table.
    ///
    /// Every problem here is a misconfiguration and fails construction:
    /// unknown intents, handlers or capabilities, bad regexes, capture groups
    /// without parameter names, and missing fallback targets.
    pub fn from_yaml(yaml: &str) -> Result<Self, RegistryError> {
        let file: RuleFile = serde_yaml::from_str(yaml)?;

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(file.intents.len());
        for spec in file.intents {
            let rule = Self::compile_rule(spec)?;
            if !seen.insert(rule.intent) {
                return Err(RegistryError::DuplicateIntent {
                    intent: rule.intent.to_string(),
                });
            }
            rules.push(rule);
        }

        for target in HEURISTIC_TARGETS {
            if !seen.contains(&target) {
                return Err(RegistryError::MissingIntent {
                    intent: target.to_string(),
                });
            }
        }

        info!(
            version = %file.version,
            intents = rules.len(),
            patterns = rules.iter().map(|r| r.patterns.len()).sum::<usize>(),
            "Rule registry compiled"
        );

        Ok(Self {
            version: file.version,
            description: file.description,
            rules,
        })
    }

    fn compile_rule(spec: RuleSpec) -> Result<IntentRule, RegistryError> {
        let intent: Intent = spec
            .intent
            .parse()
            .ok()
            .filter(Intent::is_registrable)
            .ok_or_else(|| RegistryError::UnknownIntent {
                name: spec.intent.clone(),
            })?;

        let action = Action::handler(&spec.action).ok_or_else(|| RegistryError::UnknownAction {
            intent: spec.intent.clone(),
            action: spec.action.clone(),
        })?;

        let capability = spec
            .capability
            .as_deref()
            .map(|c| {
                c.parse::<Capability>()
                    .map_err(|_| RegistryError::UnknownCapability {
                        intent: spec.intent.clone(),
                        capability: c.to_string(),
                    })
            })
            .transpose()?;

        if action.touches_store() && capability.is_none() {
            return Err(RegistryError::MissingCapability {
                intent: spec.intent.clone(),
                action: spec.action.clone(),
            });
        }

        if spec.patterns.is_empty() {
            return Err(RegistryError::EmptyPatterns {
                intent: spec.intent.clone(),
            });
        }

        let mut patterns = Vec::with_capacity(spec.patterns.len());
        for source in spec.patterns {
            let regex = RegexBuilder::new(&source)
                .case_insensitive(true)
                .build()
                .map_err(|e| RegistryError::InvalidPattern {
                    intent: spec.intent.clone(),
                    pattern: source.clone(),
                    reason: e.to_string(),
                })?;

            // captures_len counts the implicit whole-match group
            let groups = regex.captures_len() - 1;
            if groups > spec.params.len() {
                return Err(RegistryError::CaptureMismatch {
                    intent: spec.intent.clone(),
                    pattern: source,
                    declared: spec.params.len(),
                    groups,
                });
            }

            patterns.push(CompiledPattern { source, regex });
        }

        Ok(IntentRule {
            intent,
            action,
            capability,
            params: spec.params,
            defaults: spec.defaults,
            patterns,
        })
    }

    /// Rules in registration (priority) order
    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    pub fn rule(&self, intent: Intent) -> Option<&IntentRule> {
        self.rules.iter().find(|r| r.intent == intent)
    }

    pub fn required_capability(&self, intent: Intent) -> Option<Capability> {
        self.rule(intent).and_then(|r| r.capability)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version: "test"
intents:
  - intent: greeting
    action: respond
    patterns: ['^hello']
  - intent: critical_search
    action: search_critical
    capability: view_report
    patterns: ['urgent']
  - intent: stats
    action: get_stats
    capability: view_stats
    patterns: ['stats']
"#;

    #[test]
    fn test_builtin_registry_compiles() {
        let registry = RuleRegistry::builtin().unwrap();
        assert_eq!(registry.version(), "1.0");
        assert_eq!(registry.rules()[0].intent, Intent::Greeting);
        assert_eq!(
            registry.required_capability(Intent::CreateReport),
            Some(Capability::CreateReport)
        );
        assert_eq!(registry.required_capability(Intent::Greeting), None);
        assert_eq!(registry.required_capability(Intent::GeneralFallback), None);
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = RuleRegistry::from_yaml(MINIMAL).unwrap();
        let order: Vec<Intent> = registry.rules().iter().map(|r| r.intent).collect();
        assert_eq!(
            order,
            vec![Intent::Greeting, Intent::CriticalSearch, Intent::Stats]
        );
    }

    #[test]
    fn test_unknown_capability_is_fatal() {
        let yaml = MINIMAL.replace("view_stats", "view_everything");
        let err = RuleRegistry::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownCapability { .. }));
    }

    #[test]
    fn test_unknown_action_is_fatal() {
        let yaml = MINIMAL.replace("get_stats", "get_everything");
        let err = RuleRegistry::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAction { .. }));
    }

    #[test]
    fn test_pseudo_intents_not_registrable() {
        let yaml = MINIMAL.replace("intent: greeting", "intent: general_fallback");
        let err = RuleRegistry::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownIntent { .. }));
    }

    #[test]
    fn test_missing_fallback_target_is_fatal() {
        let yaml = r#"
version: "test"
intents:
  - intent: greeting
    action: respond
    patterns: ['^hello']
"#;
        let err = RuleRegistry::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, RegistryError::MissingIntent { .. }));
    }

    #[test]
    fn test_store_action_requires_capability() {
        let yaml = MINIMAL.replace("    capability: view_stats\n", "");
        let err = RuleRegistry::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, RegistryError::MissingCapability { .. }));
    }

    #[test]
    fn test_unnamed_capture_group_is_fatal() {
        let yaml = MINIMAL.replace("['stats']", "['stats (\\w+)']");
        let err = RuleRegistry::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, RegistryError::CaptureMismatch { groups: 1, .. }));
    }

    #[test]
    fn test_invalid_regex_is_fatal() {
        let yaml = MINIMAL.replace("['urgent']", "['urgent(']");
        let err = RuleRegistry::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern { .. }));
    }

    #[test]
    fn test_duplicate_intent_is_fatal() {
        let yaml = format!(
            "{}  - intent: stats\n    action: get_stats\n    capability: view_stats\n    patterns: ['totals']\n",
            MINIMAL
        );
        let err = RuleRegistry::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateIntent { .. }));
    }
}
