//! Natural-language assistant for the operations dashboard
//!
//! Pipeline stages, in order:
//! - `registry`: ordered intent rules compiled from YAML
//! - `classifier`: first-match rule classification
//! - `context`: keyword heuristics for unmatched text
//! - `permission`: capability gate in front of every data action
//! - `actions`: data operations against a `DataStore`
//! - `synthesizer`: user-facing response text
//!
//! `AssistantPipeline` wires them together.

pub mod actions;
pub mod classifier;
pub mod context;
pub mod permission;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod synthesizer;
pub mod types;

pub use actions::{ActionService, ActionSettings};
pub use classifier::IntentClassifier;
pub use context::{ContextAnalyzer, ContextSignals, HEURISTIC_TARGETS};
pub use permission::{
    parse_capabilities, CallerContext, PermissionDecision, PermissionGate, PermissionProvider,
    StaticPermissionProvider,
};
pub use pipeline::AssistantPipeline;
pub use registry::{IntentRule, RuleRegistry};
pub use store::{DataStore, InMemoryDataStore, InteractionRecord, LocationQuery, Priority, Report, ReportFilter};
pub use synthesizer::ResponseSynthesizer;
pub use types::{
    Action, ActionData, ActionResult, Capability, Intent, ParsedIntent, Query, Resolution,
    ResponseEnvelope,
};
