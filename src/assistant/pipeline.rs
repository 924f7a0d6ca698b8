//! Assistant pipeline
//!
//! One call to `process` runs a query through every stage in order:
//! classify, fall back to heuristics, gate, dispatch, synthesize. The
//! pipeline holds no per-request state, so a single instance is shared
//! across concurrent requests.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::actions::{ActionService, ActionSettings};
use super::classifier::IntentClassifier;
use super::context::ContextAnalyzer;
use super::permission::{PermissionDecision, PermissionGate};
use super::registry::RuleRegistry;
use super::store::{DataStore, InteractionRecord};
use super::synthesizer::ResponseSynthesizer;
use super::types::{
    ActionResult, ParsedIntent, Query, Resolution, ResponseEnvelope, HEURISTIC_CONFIDENCE,
};
use crate::config::AssistantConfig;
use crate::error::RegistryError;

pub struct AssistantPipeline {
    registry: Arc<RuleRegistry>,
    classifier: IntentClassifier,
    analyzer: ContextAnalyzer,
    gate: PermissionGate,
    actions: ActionService,
    synthesizer: ResponseSynthesizer,
    store: Arc<dyn DataStore>,
    audit_enabled: bool,
}

impl AssistantPipeline {
    pub fn new(registry: Arc<RuleRegistry>, store: Arc<dyn DataStore>, config: &AssistantConfig) -> Self {
        Self {
            classifier: IntentClassifier::new(registry.clone()),
            analyzer: ContextAnalyzer::new(),
            gate: PermissionGate::new(registry.clone()),
            actions: ActionService::new(store.clone(), ActionSettings::from(config)),
            synthesizer: ResponseSynthesizer::new(),
            registry,
            store,
            audit_enabled: config.audit_enabled,
        }
    }

    /// Build the registry from config and wire it to `store`.
    ///
    /// Fails when the rule table is misconfigured.
    pub fn from_config(store: Arc<dyn DataStore>, config: &AssistantConfig) -> Result<Self, RegistryError> {
        let registry = Arc::new(RuleRegistry::from_config(config)?);
        Ok(Self::new(registry, store, config))
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Classify `text` without dispatching anything.
    ///
    /// Rule match first; when no rule matches, the context heuristics may
    /// pick a secondary intent; otherwise the generic clarification.
    pub fn resolve(&self, text: &str) -> ParsedIntent {
        let parsed = self.classifier.classify(text);
        if !parsed.is_unmatched() {
            return parsed;
        }

        let signals = self.analyzer.analyze_context(&parsed.raw_match);
        debug!(?signals, "context signals");

        let heuristic = self
            .analyzer
            .select_fallback(&signals)
            .and_then(|intent| self.registry.rule(intent));

        match heuristic {
            Some(rule) => ParsedIntent {
                intent: rule.intent,
                action: rule.action,
                parameters: rule.defaults.clone(),
                confidence: HEURISTIC_CONFIDENCE,
                raw_match: parsed.raw_match,
                resolution: Resolution::Heuristic,
            },
            None => ParsedIntent::general_fallback(&parsed.raw_match),
        }
    }

    /// Run one query end to end. Never fails; every problem is reported in
    /// the envelope.
    #[instrument(skip(self, query), fields(request_id, caller = %query.caller_id))]
    pub async fn process(&self, query: &Query) -> ResponseEnvelope {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let parsed = self.resolve(&query.text);

        let (parsed, result) = match self.gate.decide(parsed.intent, &query.caller_permissions) {
            PermissionDecision::Allowed => {
                let result = self.actions.execute(&parsed, &query.caller_id).await;
                (parsed, result)
            }
            PermissionDecision::Denied { missing } => {
                let result = ActionResult::failure(
                    format!("This requires the '{}' permission.", missing),
                    format!("caller '{}' lacks capability '{}'", query.caller_id, missing),
                );
                (parsed.denied(), Some(result))
            }
        };

        let natural_response = self.synthesizer.synthesize(&parsed, result.as_ref());

        info!(
            intent = %parsed.intent,
            action = %parsed.action,
            confidence = parsed.confidence,
            success = result.as_ref().map(ActionResult::success),
            "query processed"
        );

        if self.audit_enabled {
            self.record(request_id, query, &parsed, result.as_ref());
        }

        ResponseEnvelope {
            request_id,
            natural_response,
            intent: parsed.intent,
            action: parsed.action,
            parameters: parsed.parameters,
            confidence: parsed.confidence,
            resolution: parsed.resolution,
            result,
        }
    }

    /// Write the interaction audit row in the background; failures are logged only
    fn record(&self, request_id: Uuid, query: &Query, parsed: &ParsedIntent, result: Option<&ActionResult>) {
        let record = InteractionRecord {
            request_id,
            caller_id: query.caller_id.clone(),
            text: query.text.clone(),
            intent: parsed.intent,
            action: parsed.action,
            success: result.map(ActionResult::success),
            created_at: Utc::now(),
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.record_interaction(record).await {
                warn!(%request_id, error = %e, "failed to record interaction");
            }
        });
    }
}
