//! Core assistant types
//!
//! Everything that flows through the pipeline: the inbound `Query`, the
//! classifier's `ParsedIntent`, the action service's `ActionResult`, and the
//! outbound `ResponseEnvelope`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::{Category, Report};

/// Named parameters extracted for an intent
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Confidence reported whenever a registry rule matches
pub const RULE_CONFIDENCE: f32 = 0.9;
/// Confidence reported for an intent chosen by the context heuristics
pub const HEURISTIC_CONFIDENCE: f32 = 0.6;
/// Confidence reported for the generic clarification response
pub const FALLBACK_CONFIDENCE: f32 = 0.4;

// ============================================================================
// Capabilities
// ============================================================================

/// Authorization token required to run an intent's action.
///
/// The set is fixed; it mirrors the capabilities handed out by the
/// permission provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CreateReport,
    ViewReport,
    UpdateReport,
    AssignReport,
    CreateCategory,
    ViewStats,
    ManageUsers,
    ManageRoles,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::CreateReport,
        Capability::ViewReport,
        Capability::UpdateReport,
        Capability::AssignReport,
        Capability::CreateCategory,
        Capability::ViewStats,
        Capability::ManageUsers,
        Capability::ManageRoles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CreateReport => "create_report",
            Capability::ViewReport => "view_report",
            Capability::UpdateReport => "update_report",
            Capability::AssignReport => "assign_report",
            Capability::CreateCategory => "create_category",
            Capability::ViewStats => "view_stats",
            Capability::ManageUsers => "manage_users",
            Capability::ManageRoles => "manage_roles",
        }
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Intents and actions
// ============================================================================

/// Classified purpose of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Help,
    CreateCategory,
    CreateReport,
    CriticalSearch,
    UpdateStatus,
    AssignReport,
    StatsBreakdown,
    Stats,
    LocationSearch,
    SearchReports,
    /// Generic clarification when neither rules nor heuristics apply
    GeneralFallback,
    /// Classifier sentinel; never leaves the pipeline
    Unmatched,
}

impl Intent {
    const REGISTRABLE: [Intent; 11] = [
        Intent::Greeting,
        Intent::Help,
        Intent::CreateCategory,
        Intent::CreateReport,
        Intent::CriticalSearch,
        Intent::UpdateStatus,
        Intent::AssignReport,
        Intent::StatsBreakdown,
        Intent::Stats,
        Intent::LocationSearch,
        Intent::SearchReports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::Help => "help",
            Intent::CreateCategory => "create_category",
            Intent::CreateReport => "create_report",
            Intent::CriticalSearch => "critical_search",
            Intent::UpdateStatus => "update_status",
            Intent::AssignReport => "assign_report",
            Intent::StatsBreakdown => "stats_breakdown",
            Intent::Stats => "stats",
            Intent::LocationSearch => "location_search",
            Intent::SearchReports => "search_reports",
            Intent::GeneralFallback => "general_fallback",
            Intent::Unmatched => "unmatched",
        }
    }

    /// Whether the intent may appear in the rule registry
    pub fn is_registrable(&self) -> bool {
        Self::REGISTRABLE.contains(self)
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::REGISTRABLE
            .into_iter()
            .chain([Intent::GeneralFallback, Intent::Unmatched])
            .find(|i| i.as_str() == needle)
            .ok_or_else(|| format!("unknown intent '{}'", s))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation dispatched for an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Template-only response, no data access
    Respond,
    CreateReport,
    CreateCategory,
    SearchReports,
    SearchCritical,
    UpdateReportState,
    AssignReport,
    GetStats,
    AggregateBreakdown,
    SearchByLocation,
    /// Caller lacked the intent's capability; nothing was dispatched
    PermissionDenied,
    /// Generic clarification; nothing was dispatched
    Clarify,
}

impl Action {
    const HANDLERS: [Action; 10] = [
        Action::Respond,
        Action::CreateReport,
        Action::CreateCategory,
        Action::SearchReports,
        Action::SearchCritical,
        Action::UpdateReportState,
        Action::AssignReport,
        Action::GetStats,
        Action::AggregateBreakdown,
        Action::SearchByLocation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Respond => "respond",
            Action::CreateReport => "create_report",
            Action::CreateCategory => "create_category",
            Action::SearchReports => "search_reports",
            Action::SearchCritical => "search_critical",
            Action::UpdateReportState => "update_report_state",
            Action::AssignReport => "assign_report",
            Action::GetStats => "get_stats",
            Action::AggregateBreakdown => "aggregate_breakdown",
            Action::SearchByLocation => "search_by_location",
            Action::PermissionDenied => "permission_denied",
            Action::Clarify => "clarify",
        }
    }

    /// Look up an action handler by name. Only dispatchable actions resolve;
    /// `permission_denied` and `clarify` are pipeline outcomes.
    pub fn handler(name: &str) -> Option<Action> {
        let needle = name.trim().to_lowercase();
        Self::HANDLERS.into_iter().find(|a| a.as_str() == needle)
    }

    /// Whether the action touches the data store
    pub fn touches_store(&self) -> bool {
        !matches!(
            self,
            Action::Respond | Action::PermissionDenied | Action::Clarify
        )
    }

    /// Writes are not idempotent and must never be retried by this layer
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Action::CreateReport
                | Action::CreateCategory
                | Action::UpdateReportState
                | Action::AssignReport
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage of the pipeline resolved the intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Rule,
    Heuristic,
    Fallback,
    Unmatched,
}

// ============================================================================
// Query / ParsedIntent
// ============================================================================

/// One inbound instruction and the caller it came from
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub caller_id: String,
    pub caller_permissions: HashSet<Capability>,
}

impl Query {
    pub fn new(
        text: impl Into<String>,
        caller_id: impl Into<String>,
        caller_permissions: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            text: text.into(),
            caller_id: caller_id.into(),
            caller_permissions: caller_permissions.into_iter().collect(),
        }
    }
}

/// Result of classifying a single instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedIntent {
    pub intent: Intent,
    pub action: Action,
    pub parameters: Parameters,
    /// Fixed per resolution stage; reported, never used to gate execution
    pub confidence: f32,
    /// Text fragment the winning pattern matched (or the whole input)
    pub raw_match: String,
    pub resolution: Resolution,
}

impl ParsedIntent {
    pub fn unmatched(text: &str) -> Self {
        Self {
            intent: Intent::Unmatched,
            action: Action::Clarify,
            parameters: Parameters::new(),
            confidence: 0.0,
            raw_match: text.to_string(),
            resolution: Resolution::Unmatched,
        }
    }

    pub fn general_fallback(text: &str) -> Self {
        Self {
            intent: Intent::GeneralFallback,
            action: Action::Clarify,
            parameters: Parameters::new(),
            confidence: FALLBACK_CONFIDENCE,
            raw_match: text.to_string(),
            resolution: Resolution::Fallback,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        self.intent == Intent::Unmatched
    }

    /// Copy of this intent redirected to the `permission_denied` outcome
    pub fn denied(&self) -> Self {
        Self {
            action: Action::PermissionDenied,
            ..self.clone()
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

// ============================================================================
// Action results
// ============================================================================

/// Uniform outcome of every action service operation.
///
/// Fields are private so the invariant holds by construction:
/// `success == false` exactly when `error` is set and non-empty, and
/// `message` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<ActionData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>, data: Option<ActionData>) -> Self {
        Self {
            success: true,
            message: non_empty(message.into(), "Done"),
            data,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: non_empty(message.into(), "The operation failed"),
            data: None,
            error: Some(non_empty(error.into(), "unknown error")),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&ActionData> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Typed payload carried by a successful `ActionResult`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ActionData {
    Created(CreatedEntity),
    SearchResults(SearchResults),
    UpdatedReport(Report),
    Stats(ReportStats),
    AggregateBreakdown(AggregateBreakdown),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum CreatedEntity {
    Report(Report),
    Category(Category),
}

/// Bounded list of reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub reports: Vec<Report>,
    pub limit: usize,
    /// More rows matched than `limit` allowed
    pub truncated: bool,
}

impl SearchResults {
    pub fn count(&self) -> usize {
        self.reports.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStats {
    pub total: i64,
    pub open: i64,
    pub resolved: i64,
    pub critical_open: i64,
    pub by_state: Vec<BreakdownRow>,
}

/// Grouped counts keyed by a joined label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBreakdown {
    pub dimension: Dimension,
    pub rows: Vec<BreakdownRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub label: String,
    pub count: i64,
}

/// Grouping dimension for aggregate counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Category,
    State,
    Priority,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Category => "category",
            Dimension::State => "state",
            Dimension::Priority => "priority",
        }
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "category" | "categories" | "type" | "types" => Ok(Dimension::Category),
            "state" | "states" | "status" | "statuses" => Ok(Dimension::State),
            "priority" | "priorities" => Ok(Dimension::Priority),
            other => Err(format!("unknown dimension '{}'", other)),
        }
    }
}

// ============================================================================
// Response envelope
// ============================================================================

/// Externally visible output of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub request_id: Uuid,
    pub natural_response: String,
    pub intent: Intent,
    pub action: Action,
    pub parameters: Parameters,
    pub confidence: f32,
    pub resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
}
