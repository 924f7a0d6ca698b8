//! Data Store collaborator
//!
//! The assistant treats the report database as a capability-agnostic data
//! service. `DataStore` is the seam; the Postgres implementation lives in
//! `crate::database` and `InMemoryDataStore` backs tests and the CLI.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::types::{Action, BreakdownRow, Dimension, Intent, ReportStats};
use crate::error::StoreError;

// ============================================================================
// Domain rows
// ============================================================================

/// Report priority, ordered lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub const HIGHEST: Priority = Priority::Critical;

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn level(&self) -> i16 {
        *self as i16
    }

    pub fn from_level(level: i16) -> Option<Priority> {
        match level {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            4 => Some(Priority::Critical),
            _ => None,
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" | "urgent" | "emergency" => Ok(Priority::Critical),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// A citizen/incident report joined with its category and state labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub state: String,
    pub priority: Priority,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Workflow state a report can be in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportState {
    pub id: i64,
    pub name: String,
    /// Terminal states count as resolved
    pub is_terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub title: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub state_id: i64,
    pub priority: Priority,
    pub address: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

/// Filter predicate for report searches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    /// Case-insensitive match on title or description
    pub text: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub state: Option<String>,
    /// Exclude reports in terminal states
    pub open_only: bool,
}

/// Location predicate for area queries
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    Coordinates {
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    },
    /// Free-text area matched against the report address
    Area(String),
}

impl LocationQuery {
    /// Parse `"lat, lng"` into a coordinate query, anything else is an area.
    pub fn parse(text: &str, radius_km: f64) -> LocationQuery {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if let [lat, lng] = parts.as_slice() {
            if let (Ok(latitude), Ok(longitude)) = (lat.parse::<f64>(), lng.parse::<f64>()) {
                if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
                    return LocationQuery::Coordinates {
                        latitude,
                        longitude,
                        radius_km,
                    };
                }
            }
        }
        LocationQuery::Area(text.trim().to_string())
    }

    /// (min_lat, max_lat, min_lng, max_lng) for coordinate queries
    pub fn bounding_box(&self) -> Option<(f64, f64, f64, f64)> {
        match self {
            LocationQuery::Coordinates {
                latitude,
                longitude,
                radius_km,
            } => {
                let lat_delta = radius_km / 111.0;
                let lng_delta = radius_km / (111.0 * latitude.to_radians().cos().abs().max(0.01));
                Some((
                    latitude - lat_delta,
                    latitude + lat_delta,
                    longitude - lng_delta,
                    longitude + lng_delta,
                ))
            }
            LocationQuery::Area(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            LocationQuery::Coordinates {
                latitude,
                longitude,
                radius_km,
            } => format!("{:.4}, {:.4} (within {} km)", latitude, longitude, radius_km),
            LocationQuery::Area(area) => area.clone(),
        }
    }
}

/// Audit row written after each interaction
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub request_id: Uuid,
    pub caller_id: String,
    pub text: String,
    pub intent: Intent,
    pub action: Action,
    pub success: Option<bool>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Store trait
// ============================================================================

/// Data service consumed by the action service.
///
/// Each method is one logical unit of work. Implementations report every
/// failure as a `StoreError`; nothing panics across this boundary.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn find_category(&self, name: &str) -> Result<Option<Category>, StoreError>;

    async fn insert_category(&self, category: NewCategory) -> Result<Category, StoreError>;

    async fn find_state(&self, name: &str) -> Result<Option<ReportState>, StoreError>;

    /// Look a user up by display name or email, case-insensitively
    async fn find_user(&self, name_or_email: &str) -> Result<Option<User>, StoreError>;

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError>;

    /// Newest first, at most `limit` rows
    async fn search_reports(
        &self,
        filter: &ReportFilter,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError>;

    /// Newest first, at most `limit` rows
    async fn reports_near(
        &self,
        location: &LocationQuery,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError>;

    async fn update_report_state(&self, report_id: i64, state_id: i64)
        -> Result<Report, StoreError>;

    async fn assign_report(&self, report_id: i64, user_id: i64) -> Result<Report, StoreError>;

    async fn report_stats(&self) -> Result<ReportStats, StoreError>;

    /// Report counts grouped by the dimension's label, largest first
    async fn count_by(&self, dimension: Dimension) -> Result<Vec<BreakdownRow>, StoreError>;

    async fn record_interaction(&self, record: InteractionRecord) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Entries kept in the call log and the interaction log; older ones are dropped
pub const MEMORY_LOG_CAPACITY: usize = 1000;

fn push_capped<T>(log: &mut Vec<T>, entry: T) {
    if log.len() >= MEMORY_LOG_CAPACITY {
        log.remove(0);
    }
    log.push(entry);
}

#[derive(Debug, Default)]
struct MemoryTables {
    categories: Vec<Category>,
    states: Vec<ReportState>,
    users: Vec<User>,
    reports: Vec<StoredReport>,
    interactions: Vec<InteractionRecord>,
}

#[derive(Debug, Clone)]
struct StoredReport {
    id: i64,
    title: String,
    description: Option<String>,
    category_id: i64,
    state_id: i64,
    priority: Priority,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    assigned_to: Option<i64>,
    created_by: String,
    created_at: DateTime<Utc>,
}

/// In-process `DataStore` with call accounting.
///
/// Every data call (everything except `record_interaction`) is counted and
/// logged by method name so tests can assert on what the pipeline touched.
/// `fail_with` makes subsequent data calls fail until `clear_failure`;
/// `fail_audit_with` does the same for `record_interaction` alone.
///
/// The call log and the interaction log keep the newest
/// `MEMORY_LOG_CAPACITY` entries, so a long REPL session stays bounded.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    tables: Mutex<MemoryTables>,
    calls: AtomicUsize,
    call_log: Mutex<Vec<&'static str>>,
    failure: Mutex<Option<StoreError>>,
    audit_failure: Mutex<Option<StoreError>>,
    audit_attempts: AtomicUsize,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with the dashboard's reference data and a few reports
    pub fn seeded() -> Self {
        let store = Self::new();
        {
            let mut t = store.lock();
            t.categories = ["General", "Roads", "Lighting", "Sanitation", "Parks"]
                .iter()
                .enumerate()
                .map(|(i, name)| Category {
                    id: i as i64 + 1,
                    name: name.to_string(),
                    description: None,
                })
                .collect();
            t.states = [
                ("pending", false),
                ("in_progress", false),
                ("resolved", true),
                ("rejected", true),
            ]
            .iter()
            .enumerate()
            .map(|(i, (name, is_terminal))| ReportState {
                id: i as i64 + 1,
                name: name.to_string(),
                is_terminal: *is_terminal,
            })
            .collect();
            t.users = vec![
                User {
                    id: 1,
                    name: "Dana Ortiz".into(),
                    email: "dana.ortiz@city.example".into(),
                    role: "operator".into(),
                },
                User {
                    id: 2,
                    name: "Sam Lee".into(),
                    email: "sam.lee@city.example".into(),
                    role: "operator".into(),
                },
                User {
                    id: 3,
                    name: "Avery Admin".into(),
                    email: "admin@city.example".into(),
                    role: "admin".into(),
                },
            ];

            let base = Utc::now() - Duration::days(7);
            let seed = [
                ("Gas leak smell on Elm Street", 1, 1, Priority::Critical, "12 Elm Street", Some((40.7130, -74.0062))),
                ("Fallen tree blocking Oak Avenue", 2, 2, Priority::Critical, "300 Oak Avenue", Some((40.7200, -74.0100))),
                ("Streetlight out near Central Park", 3, 1, Priority::Medium, "Central Park West", Some((40.7812, -73.9665))),
                ("Overflowing bins at Market Square", 4, 2, Priority::High, "Market Square", None),
                ("Pothole on 5th Street", 2, 3, Priority::High, "5th Street and Main", Some((40.7128, -74.0060))),
                ("Broken bench in Riverside Park", 5, 3, Priority::Low, "Riverside Park", None),
            ];
            t.reports = seed
                .iter()
                .enumerate()
                .map(|(i, (title, category_id, state_id, priority, address, coords))| StoredReport {
                    id: i as i64 + 1,
                    title: title.to_string(),
                    description: None,
                    category_id: *category_id,
                    state_id: *state_id,
                    priority: *priority,
                    address: Some(address.to_string()),
                    latitude: coords.map(|c| c.0),
                    longitude: coords.map(|c| c.1),
                    assigned_to: None,
                    created_by: "seed".into(),
                    created_at: base + Duration::hours(i as i64),
                })
                .collect();
        }
        store
    }

    /// Number of data calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Method names of data calls, in order
    pub fn call_log(&self) -> Vec<&'static str> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn interactions(&self) -> Vec<InteractionRecord> {
        self.lock().interactions.clone()
    }

    pub fn report_count(&self) -> usize {
        self.lock().reports.len()
    }

    pub fn fail_with(&self, error: StoreError) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(error);
        }
    }

    pub fn clear_failure(&self) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = None;
        }
    }

    pub fn fail_audit_with(&self, error: StoreError) {
        if let Ok(mut failure) = self.audit_failure.lock() {
            *failure = Some(error);
        }
    }

    /// `record_interaction` calls received, failed ones included
    pub fn audit_attempts(&self) -> usize {
        self.audit_attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTables> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, method: &'static str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.call_log.lock() {
            push_capped(&mut log, method);
        }
        debug!(method, "in-memory store call");
        match self.failure.lock() {
            Ok(failure) => match failure.as_ref() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }

    fn hydrate(t: &MemoryTables, r: &StoredReport) -> Report {
        Report {
            id: r.id,
            title: r.title.clone(),
            description: r.description.clone(),
            category: t
                .categories
                .iter()
                .find(|c| c.id == r.category_id)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            state: t
                .states
                .iter()
                .find(|s| s.id == r.state_id)
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            priority: r.priority,
            address: r.address.clone(),
            latitude: r.latitude,
            longitude: r.longitude,
            assigned_to: r
                .assigned_to
                .and_then(|uid| t.users.iter().find(|u| u.id == uid))
                .map(|u| u.name.clone()),
            created_by: r.created_by.clone(),
            created_at: r.created_at,
        }
    }

    fn is_terminal(t: &MemoryTables, state_id: i64) -> bool {
        t.states
            .iter()
            .any(|s| s.id == state_id && s.is_terminal)
    }

    fn newest_first(t: &MemoryTables, mut rows: Vec<&StoredReport>, limit: usize) -> Vec<Report> {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.into_iter()
            .take(limit)
            .map(|r| Self::hydrate(t, r))
            .collect()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn find_category(&self, name: &str) -> Result<Option<Category>, StoreError> {
        self.enter("find_category")?;
        let t = self.lock();
        Ok(t.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
            .cloned())
    }

    async fn insert_category(&self, category: NewCategory) -> Result<Category, StoreError> {
        self.enter("insert_category")?;
        let mut t = self.lock();
        if t.categories
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&category.name))
        {
            return Err(StoreError::Constraint(format!(
                "category '{}' already exists",
                category.name
            )));
        }
        let created = Category {
            id: t.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1,
            name: category.name,
            description: category.description,
        };
        t.categories.push(created.clone());
        Ok(created)
    }

    async fn find_state(&self, name: &str) -> Result<Option<ReportState>, StoreError> {
        self.enter("find_state")?;
        let t = self.lock();
        let wanted = name.trim().replace(' ', "_");
        Ok(t.states
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(&wanted))
            .cloned())
    }

    async fn find_user(&self, name_or_email: &str) -> Result<Option<User>, StoreError> {
        self.enter("find_user")?;
        let t = self.lock();
        let wanted = name_or_email.trim();
        Ok(t.users
            .iter()
            .find(|u| u.name.eq_ignore_ascii_case(wanted) || u.email.eq_ignore_ascii_case(wanted))
            .cloned())
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError> {
        self.enter("insert_report")?;
        let mut t = self.lock();
        if !t.categories.iter().any(|c| c.id == report.category_id) {
            return Err(StoreError::Constraint(format!(
                "category {} does not exist",
                report.category_id
            )));
        }
        if !t.states.iter().any(|s| s.id == report.state_id) {
            return Err(StoreError::Constraint(format!(
                "state {} does not exist",
                report.state_id
            )));
        }
        let stored = StoredReport {
            id: t.reports.iter().map(|r| r.id).max().unwrap_or(0) + 1,
            title: report.title,
            description: report.description,
            category_id: report.category_id,
            state_id: report.state_id,
            priority: report.priority,
            address: report.address,
            latitude: None,
            longitude: None,
            assigned_to: None,
            created_by: report.created_by,
            created_at: Utc::now(),
        };
        let hydrated = Self::hydrate(&t, &stored);
        t.reports.push(stored);
        Ok(hydrated)
    }

    async fn search_reports(
        &self,
        filter: &ReportFilter,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError> {
        self.enter("search_reports")?;
        let t = self.lock();
        let rows: Vec<&StoredReport> = t
            .reports
            .iter()
            .filter(|r| {
                let text_ok = filter.text.as_deref().map_or(true, |text| {
                    contains_ci(&r.title, text)
                        || r.description.as_deref().map_or(false, |d| contains_ci(d, text))
                });
                let priority_ok = filter.priority.map_or(true, |p| r.priority == p);
                let hydrated = Self::hydrate(&t, r);
                let category_ok = filter
                    .category
                    .as_deref()
                    .map_or(true, |c| hydrated.category.eq_ignore_ascii_case(c));
                let state_ok = filter
                    .state
                    .as_deref()
                    .map_or(true, |s| hydrated.state.eq_ignore_ascii_case(s));
                let open_ok = !filter.open_only || !Self::is_terminal(&t, r.state_id);
                text_ok && priority_ok && category_ok && state_ok && open_ok
            })
            .collect();
        Ok(Self::newest_first(&t, rows, limit))
    }

    async fn reports_near(
        &self,
        location: &LocationQuery,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError> {
        self.enter("reports_near")?;
        let t = self.lock();
        let rows: Vec<&StoredReport> = match location {
            LocationQuery::Area(area) => t
                .reports
                .iter()
                .filter(|r| r.address.as_deref().map_or(false, |a| contains_ci(a, area)))
                .collect(),
            coords @ LocationQuery::Coordinates { .. } => {
                let Some((min_lat, max_lat, min_lng, max_lng)) = coords.bounding_box() else {
                    return Ok(Vec::new());
                };
                t.reports
                    .iter()
                    .filter(|r| match (r.latitude, r.longitude) {
                        (Some(lat), Some(lng)) => {
                            (min_lat..=max_lat).contains(&lat) && (min_lng..=max_lng).contains(&lng)
                        }
                        _ => false,
                    })
                    .collect()
            }
        };
        Ok(Self::newest_first(&t, rows, limit))
    }

    async fn update_report_state(
        &self,
        report_id: i64,
        state_id: i64,
    ) -> Result<Report, StoreError> {
        self.enter("update_report_state")?;
        let mut t = self.lock();
        if !t.states.iter().any(|s| s.id == state_id) {
            return Err(StoreError::Constraint(format!("state {} does not exist", state_id)));
        }
        let report = t
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| StoreError::not_found("report", report_id))?;
        report.state_id = state_id;
        let updated = report.clone();
        Ok(Self::hydrate(&t, &updated))
    }

    async fn assign_report(&self, report_id: i64, user_id: i64) -> Result<Report, StoreError> {
        self.enter("assign_report")?;
        let mut t = self.lock();
        if !t.users.iter().any(|u| u.id == user_id) {
            return Err(StoreError::not_found("user", user_id));
        }
        let report = t
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| StoreError::not_found("report", report_id))?;
        report.assigned_to = Some(user_id);
        let updated = report.clone();
        Ok(Self::hydrate(&t, &updated))
    }

    async fn report_stats(&self) -> Result<ReportStats, StoreError> {
        self.enter("report_stats")?;
        let t = self.lock();
        let total = t.reports.len() as i64;
        let resolved = t
            .reports
            .iter()
            .filter(|r| Self::is_terminal(&t, r.state_id))
            .count() as i64;
        let critical_open = t
            .reports
            .iter()
            .filter(|r| r.priority == Priority::Critical && !Self::is_terminal(&t, r.state_id))
            .count() as i64;
        let mut by_state: Vec<BreakdownRow> = t
            .states
            .iter()
            .map(|s| BreakdownRow {
                label: s.name.clone(),
                count: t.reports.iter().filter(|r| r.state_id == s.id).count() as i64,
            })
            .filter(|row| row.count > 0)
            .collect();
        by_state.sort_by(|a, b| b.count.cmp(&a.count).then(a.label.cmp(&b.label)));
        Ok(ReportStats {
            total,
            open: total - resolved,
            resolved,
            critical_open,
            by_state,
        })
    }

    async fn count_by(&self, dimension: Dimension) -> Result<Vec<BreakdownRow>, StoreError> {
        self.enter("count_by")?;
        let t = self.lock();
        let mut rows: Vec<BreakdownRow> = Vec::new();
        for report in &t.reports {
            let hydrated = Self::hydrate(&t, report);
            let label = match dimension {
                Dimension::Category => hydrated.category,
                Dimension::State => hydrated.state,
                Dimension::Priority => hydrated.priority.as_str().to_string(),
            };
            match rows.iter_mut().find(|row| row.label == label) {
                Some(row) => row.count += 1,
                None => rows.push(BreakdownRow { label, count: 1 }),
            }
        }
        rows.sort_by(|a, b| b.count.cmp(&a.count).then(a.label.cmp(&b.label)));
        Ok(rows)
    }

    async fn record_interaction(&self, record: InteractionRecord) -> Result<(), StoreError> {
        self.audit_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.audit_failure.lock().ok().and_then(|f| f.clone()) {
            return Err(err);
        }
        push_capped(&mut self.lock().interactions, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parse() {
        assert!(matches!(
            LocationQuery::parse("40.7128, -74.0060", 1.0),
            LocationQuery::Coordinates { .. }
        ));
        assert_eq!(
            LocationQuery::parse("Elm Street", 1.0),
            LocationQuery::Area("Elm Street".into())
        );
        // Out of range latitude is treated as text
        assert!(matches!(
            LocationQuery::parse("123.0, 10.0", 1.0),
            LocationQuery::Area(_)
        ));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert_eq!(Priority::HIGHEST, Priority::Critical);
        assert_eq!(Priority::from_level(Priority::Low.level()), Some(Priority::Low));
        assert_eq!("urgent".parse::<Priority>(), Ok(Priority::Critical));
    }

    #[tokio::test]
    async fn test_logs_keep_newest_entries() {
        let store = InMemoryDataStore::seeded();
        for _ in 0..MEMORY_LOG_CAPACITY + 5 {
            store.report_stats().await.unwrap();
            store
                .record_interaction(InteractionRecord {
                    request_id: Uuid::new_v4(),
                    caller_id: "repl".into(),
                    text: "show stats".into(),
                    intent: Intent::Stats,
                    action: Action::GetStats,
                    success: Some(true),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        assert_eq!(store.call_log().len(), MEMORY_LOG_CAPACITY);
        assert_eq!(store.interactions().len(), MEMORY_LOG_CAPACITY);
        assert_eq!(store.call_count(), MEMORY_LOG_CAPACITY + 5);
    }

    #[tokio::test]
    async fn test_audit_failure_is_separate_from_data_failure() {
        let store = InMemoryDataStore::seeded();
        store.fail_audit_with(StoreError::Transport("audit table locked".into()));
        let record = InteractionRecord {
            request_id: Uuid::new_v4(),
            caller_id: "c".into(),
            text: "hello".into(),
            intent: Intent::Greeting,
            action: Action::Respond,
            success: None,
            created_at: Utc::now(),
        };
        assert!(store.record_interaction(record).await.is_err());
        assert!(store.report_stats().await.is_ok());
        assert_eq!(store.audit_attempts(), 1);
        assert!(store.interactions().is_empty());
    }

    #[tokio::test]
    async fn test_search_is_bounded_and_newest_first() {
        let store = InMemoryDataStore::seeded();
        let rows = store
            .search_reports(&ReportFilter::default(), 3)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].created_at >= rows[1].created_at);
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn test_critical_open_filter() {
        let store = InMemoryDataStore::seeded();
        let filter = ReportFilter {
            priority: Some(Priority::Critical),
            open_only: true,
            ..Default::default()
        };
        let rows = store.search_reports(&filter, 20).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.priority == Priority::Critical));
    }

    #[tokio::test]
    async fn test_nearby_coordinates() {
        let store = InMemoryDataStore::seeded();
        let query = LocationQuery::parse("40.7128, -74.0060", 0.5);
        let rows = store.reports_near(&query, 20).await.unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert!(titles.contains(&"Pothole on 5th Street"));
        assert!(titles.contains(&"Gas leak smell on Elm Street"));
        assert!(!titles.contains(&"Streetlight out near Central Park"));
    }

    #[tokio::test]
    async fn test_update_missing_report_is_not_found() {
        let store = InMemoryDataStore::seeded();
        let err = store.update_report_state(999, 3).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryDataStore::seeded();
        store.fail_with(StoreError::Transport("connection reset".into()));
        assert!(store.report_stats().await.is_err());
        store.clear_failure();
        let stats = store.report_stats().await.unwrap();
        assert_eq!(stats.total, 6);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.critical_open, 2);
        assert_eq!(store.call_log(), vec!["report_stats", "report_stats"]);
    }

    #[tokio::test]
    async fn test_breakdown_groups_by_label() {
        let store = InMemoryDataStore::seeded();
        let rows = store.count_by(Dimension::Category).await.unwrap();
        let roads = rows.iter().find(|r| r.label == "Roads").unwrap();
        assert_eq!(roads.count, 2);
        assert_eq!(rows.iter().map(|r| r.count).sum::<i64>(), 6);
    }
}
