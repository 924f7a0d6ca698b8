//! Action Service
//!
//! One operation per dispatchable action. Each performs a single logical
//! unit of work against the data store and always returns an
//! `ActionResult`; store failures are caught here and never cross above.
//!
//! Reads (searches, stats, location queries) are safe to retry. Writes
//! (create, update, assign) are not idempotent and are never retried here.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::store::{DataStore, LocationQuery, NewCategory, NewReport, Priority, ReportFilter};
use super::types::{
    Action, ActionData, ActionResult, AggregateBreakdown, CreatedEntity, Dimension, ParsedIntent,
    Parameters, SearchResults,
};
use crate::config::AssistantConfig;
use crate::error::StoreError;

/// Operation-level failure, turned into `ActionResult::failure` at the boundary
#[derive(Error, Debug)]
enum ActionError {
    #[error("missing parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid {name} '{value}'")]
    InvalidParameter { name: &'static str, value: String },

    #[error("no workflow state named '{0}'")]
    UnknownState(String),

    #[error("no user named '{0}'")]
    UnknownUser(String),

    #[error("default {kind} '{name}' is not configured in the data store")]
    MissingDefault { kind: &'static str, name: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ActionError {
    /// Short description safe to show an end user
    fn user_message(&self) -> String {
        match self {
            ActionError::MissingParameter(name) => format!("I need a {} to do that", name.replace('_', " ")),
            ActionError::InvalidParameter { name, value } => {
                format!("'{}' is not a valid {}", value, name.replace('_', " "))
            }
            ActionError::UnknownState(state) => format!("there is no status called '{}'", state),
            ActionError::UnknownUser(user) => format!("I couldn't find a user called '{}'", user),
            ActionError::MissingDefault { .. } => "the system is missing its default settings".to_string(),
            ActionError::Store(StoreError::NotFound { entity, key }) => {
                format!("{} {} was not found", entity, key)
            }
            ActionError::Store(StoreError::Constraint(_)) => {
                "the data service rejected the change".to_string()
            }
            ActionError::Store(StoreError::Transport(_)) => {
                "the data service is not reachable right now".to_string()
            }
        }
    }
}

type ActionOutcome = Result<ActionResult, ActionError>;

/// Settings the operations need from `AssistantConfig`
#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub max_results: usize,
    pub default_category: String,
    pub default_state: String,
    pub nearby_radius_km: f64,
}

impl From<&AssistantConfig> for ActionSettings {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            max_results: config.max_results,
            default_category: config.default_category.clone(),
            default_state: config.default_state.clone(),
            nearby_radius_km: config.nearby_radius_km,
        }
    }
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self::from(&AssistantConfig::default())
    }
}

pub struct ActionService {
    store: Arc<dyn DataStore>,
    settings: ActionSettings,
}

impl ActionService {
    pub fn new(store: Arc<dyn DataStore>, settings: ActionSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ActionSettings {
        &self.settings
    }

    /// Run the operation for `parsed.action`.
    ///
    /// Returns `None` for actions that never touch the store (template-only
    /// responses, clarification, permission denial).
    pub async fn execute(&self, parsed: &ParsedIntent, caller_id: &str) -> Option<ActionResult> {
        let params = &parsed.parameters;
        let result = match parsed.action {
            Action::Respond | Action::Clarify | Action::PermissionDenied => return None,
            Action::CreateReport => self.create_report(params, caller_id).await,
            Action::CreateCategory => self.create_category(params).await,
            Action::SearchReports => self.search_reports(params).await,
            Action::SearchCritical => self.search_critical(params).await,
            Action::UpdateReportState => self.update_report_state(params).await,
            Action::AssignReport => self.assign_report(params).await,
            Action::GetStats => self.get_stats().await,
            Action::AggregateBreakdown => self.aggregate_breakdown(params).await,
            Action::SearchByLocation => self.search_by_location(params).await,
        };
        Some(result)
    }

    pub async fn create_report(&self, params: &Parameters, caller_id: &str) -> ActionResult {
        boundary(Action::CreateReport, self.try_create_report(params, caller_id).await)
    }

    pub async fn create_category(&self, params: &Parameters) -> ActionResult {
        boundary(Action::CreateCategory, self.try_create_category(params).await)
    }

    pub async fn search_reports(&self, params: &Parameters) -> ActionResult {
        boundary(Action::SearchReports, self.try_search(params, false).await)
    }

    pub async fn search_critical(&self, params: &Parameters) -> ActionResult {
        boundary(Action::SearchCritical, self.try_search(params, true).await)
    }

    pub async fn update_report_state(&self, params: &Parameters) -> ActionResult {
        boundary(Action::UpdateReportState, self.try_update_state(params).await)
    }

    pub async fn assign_report(&self, params: &Parameters) -> ActionResult {
        boundary(Action::AssignReport, self.try_assign(params).await)
    }

    pub async fn get_stats(&self) -> ActionResult {
        boundary(Action::GetStats, self.try_stats().await)
    }

    pub async fn aggregate_breakdown(&self, params: &Parameters) -> ActionResult {
        boundary(Action::AggregateBreakdown, self.try_breakdown(params).await)
    }

    pub async fn search_by_location(&self, params: &Parameters) -> ActionResult {
        boundary(Action::SearchByLocation, self.try_location(params).await)
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    async fn try_create_report(&self, params: &Parameters, caller_id: &str) -> ActionOutcome {
        let title = required_str(params, "title")?;
        let priority = match optional_str(params, "priority") {
            Some(raw) => raw.parse::<Priority>().map_err(|_| ActionError::InvalidParameter {
                name: "priority",
                value: raw.to_string(),
            })?,
            None => Priority::Medium,
        };

        let requested = optional_str(params, "category");
        let mut note = None;
        let category = match requested {
            Some(name) => match self.store.find_category(name).await? {
                Some(category) => category,
                None => {
                    note = Some(format!(
                        "Category '{}' doesn't exist, so I filed it under {}.",
                        name, self.settings.default_category
                    ));
                    self.default_category().await?
                }
            },
            None => self.default_category().await?,
        };

        let state = self
            .store
            .find_state(&self.settings.default_state)
            .await?
            .ok_or_else(|| ActionError::MissingDefault {
                kind: "state",
                name: self.settings.default_state.clone(),
            })?;

        let report = self
            .store
            .insert_report(NewReport {
                title: title.to_string(),
                description: optional_str(params, "description").map(str::to_string),
                category_id: category.id,
                state_id: state.id,
                priority,
                address: optional_str(params, "address").map(str::to_string),
                created_by: caller_id.to_string(),
            })
            .await?;

        info!(report_id = report.id, caller_id, "report created");
        let mut message = format!("Created report #{} \"{}\"", report.id, report.title);
        if let Some(note) = note {
            message = format!("{}. {}", message, note);
        }
        Ok(ActionResult::ok(
            message,
            Some(ActionData::Created(CreatedEntity::Report(report))),
        ))
    }

    async fn default_category(&self) -> Result<super::store::Category, ActionError> {
        self.store
            .find_category(&self.settings.default_category)
            .await?
            .ok_or_else(|| ActionError::MissingDefault {
                kind: "category",
                name: self.settings.default_category.clone(),
            })
    }

    async fn try_create_category(&self, params: &Parameters) -> ActionOutcome {
        let name = required_str(params, "name")?;
        let category = self
            .store
            .insert_category(NewCategory {
                name: name.to_string(),
                description: optional_str(params, "description").map(str::to_string),
            })
            .await?;
        info!(category_id = category.id, "category created");
        Ok(ActionResult::ok(
            format!("Created category \"{}\"", category.name),
            Some(ActionData::Created(CreatedEntity::Category(category))),
        ))
    }

    async fn try_search(&self, params: &Parameters, critical: bool) -> ActionOutcome {
        let priority = if critical {
            Some(Priority::HIGHEST)
        } else {
            optional_str(params, "priority")
                .map(|raw| {
                    raw.parse::<Priority>().map_err(|_| ActionError::InvalidParameter {
                        name: "priority",
                        value: raw.to_string(),
                    })
                })
                .transpose()?
        };
        let filter = ReportFilter {
            text: optional_str(params, "text").map(str::to_string),
            priority,
            category: optional_str(params, "category").map(str::to_string),
            state: optional_str(params, "state").map(str::to_string),
            open_only: params
                .get("open_only")
                .and_then(|v| v.as_bool())
                .unwrap_or(critical),
        };
        let results = self.bounded(
            self.store
                .search_reports(&filter, self.settings.max_results.saturating_add(1))
                .await?,
        );
        Ok(ActionResult::ok(
            format!("Found {} report(s)", results.count()),
            Some(ActionData::SearchResults(results)),
        ))
    }

    async fn try_update_state(&self, params: &Parameters) -> ActionOutcome {
        let report_id = required_id(params, "report_id")?;
        let state_name = required_str(params, "state")?;
        let state = self
            .store
            .find_state(state_name)
            .await?
            .ok_or_else(|| ActionError::UnknownState(state_name.to_string()))?;
        let report = self.store.update_report_state(report_id, state.id).await?;
        info!(report_id, state = %state.name, "report state updated");
        Ok(ActionResult::ok(
            format!("Report #{} is now {}", report.id, report.state),
            Some(ActionData::UpdatedReport(report)),
        ))
    }

    async fn try_assign(&self, params: &Parameters) -> ActionOutcome {
        let report_id = required_id(params, "report_id")?;
        let assignee = required_str(params, "assignee")?;
        let user = self
            .store
            .find_user(assignee)
            .await?
            .ok_or_else(|| ActionError::UnknownUser(assignee.to_string()))?;
        let report = self.store.assign_report(report_id, user.id).await?;
        info!(report_id, user_id = user.id, "report assigned");
        Ok(ActionResult::ok(
            format!("Report #{} assigned to {}", report.id, user.name),
            Some(ActionData::UpdatedReport(report)),
        ))
    }

    async fn try_stats(&self) -> ActionOutcome {
        let stats = self.store.report_stats().await?;
        Ok(ActionResult::ok(
            format!("{} report(s) in total", stats.total),
            Some(ActionData::Stats(stats)),
        ))
    }

    async fn try_breakdown(&self, params: &Parameters) -> ActionOutcome {
        let raw = optional_str(params, "dimension").unwrap_or("category");
        let dimension: Dimension = raw.parse().map_err(|_| ActionError::InvalidParameter {
            name: "dimension",
            value: raw.to_string(),
        })?;
        let rows = self.store.count_by(dimension).await?;
        Ok(ActionResult::ok(
            format!("Report counts by {}", dimension.as_str()),
            Some(ActionData::AggregateBreakdown(AggregateBreakdown { dimension, rows })),
        ))
    }

    async fn try_location(&self, params: &Parameters) -> ActionOutcome {
        let raw = required_str(params, "location")?;
        let location = LocationQuery::parse(raw, self.settings.nearby_radius_km);
        let results = self.bounded(
            self.store
                .reports_near(&location, self.settings.max_results.saturating_add(1))
                .await?,
        );
        Ok(ActionResult::ok(
            format!("Found {} report(s) near {}", results.count(), location.describe()),
            Some(ActionData::SearchResults(results)),
        ))
    }

    /// Cap rows at `max_results`; the store is asked for one extra row so
    /// truncation can be reported.
    fn bounded(&self, mut reports: Vec<super::store::Report>) -> SearchResults {
        let limit = self.settings.max_results;
        let truncated = reports.len() > limit;
        reports.truncate(limit);
        SearchResults {
            reports,
            limit,
            truncated,
        }
    }
}

/// Convert an operation outcome into the uniform result envelope
fn boundary(action: Action, outcome: ActionOutcome) -> ActionResult {
    match outcome {
        Ok(result) => result,
        Err(err) => {
            warn!(%action, error = %err, "action failed");
            ActionResult::failure(capitalize(&err.user_message()), err.to_string())
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn optional_str<'a>(params: &'a Parameters, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required_str<'a>(params: &'a Parameters, key: &'static str) -> Result<&'a str, ActionError> {
    optional_str(params, key).ok_or(ActionError::MissingParameter(key))
}

fn required_id(params: &Parameters, key: &'static str) -> Result<i64, ActionError> {
    match params.get(key) {
        None => Err(ActionError::MissingParameter(key)),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().trim_start_matches('#').parse().ok()))
            .filter(|id| *id > 0)
            .ok_or_else(|| ActionError::InvalidParameter {
                name: key,
                value: value.to_string(),
            }),
    }
}
