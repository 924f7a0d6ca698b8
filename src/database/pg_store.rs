//! Postgres report store
//!
//! `DataStore` over the `ops` schema. Every method is a single statement, so
//! each call is its own unit of work; writes return the joined row they
//! produced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use crate::assistant::store::{
    Category, DataStore, InteractionRecord, LocationQuery, NewCategory, NewReport, Priority,
    Report, ReportFilter, ReportState, User,
};
use crate::assistant::types::{BreakdownRow, Dimension, ReportStats};
use crate::error::StoreError;

/// Projection shared by every query that returns reports. `{source}` is the
/// reports relation: the table itself or a CTE over a write.
const REPORT_PROJECTION: &str = r#"
    SELECT r.id, r.title, r.description, c.name AS category, s.name AS state,
           r.priority, r.address, r.latitude, r.longitude,
           u.name AS assigned_to, r.created_by, r.created_at
    FROM {source} r
    JOIN ops.categories c ON c.id = r.category_id
    JOIN ops.report_states s ON s.id = r.state_id
    LEFT JOIN ops.users u ON u.id = r.assigned_to
"#;

fn report_query(source: &str, tail: &str) -> String {
    format!("{}{}", REPORT_PROJECTION.replace("{source}", source), tail)
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: i64,
    title: String,
    description: Option<String>,
    category: String,
    state: String,
    priority: i16,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    assigned_to: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = StoreError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let priority = Priority::from_level(row.priority).ok_or_else(|| {
            StoreError::Transport(format!("report {} has invalid priority {}", row.id, row.priority))
        })?;
        Ok(Report {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            state: row.state,
            priority,
            address: row.address,
            latitude: row.latitude,
            longitude: row.longitude,
            assigned_to: row.assigned_to,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    description: Option<String>,
}

#[derive(Debug, FromRow)]
struct StateRow {
    id: i64,
    name: String,
    is_terminal: bool,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    role: String,
}

#[derive(Debug, FromRow)]
struct CountRow {
    label: String,
    count: i64,
}

#[derive(Debug, FromRow)]
struct TotalsRow {
    total: i64,
    resolved: i64,
    critical_open: i64,
}

/// `ILIKE` pattern matching `text` anywhere, with wildcards in `text` taken literally
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn sql_limit(limit: usize) -> Result<i64, StoreError> {
    i64::try_from(limit)
        .map_err(|_| StoreError::Constraint(format!("row limit {} is out of range", limit)))
}

fn to_reports(rows: Vec<ReportRow>) -> Result<Vec<Report>, StoreError> {
    rows.into_iter().map(Report::try_from).collect()
}

fn breakdown(rows: Vec<CountRow>) -> Vec<BreakdownRow> {
    rows.into_iter()
        .map(|r| BreakdownRow {
            label: r.label,
            count: r.count,
        })
        .collect()
}

/// Report store over a shared connection pool
#[derive(Clone)]
pub struct PgDataStore {
    pool: PgPool,
}

impl PgDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_report(&self, sql: &str, report_id: i64, bind: i64) -> Result<Report, StoreError> {
        let row = sqlx::query_as::<_, ReportRow>(sql)
            .bind(report_id)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::not_found("report", report_id)),
        }
    }
}

#[async_trait]
impl DataStore for PgDataStore {
    async fn find_category(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            SELECT id, name, description
            FROM ops.categories
            WHERE lower(name) = lower($1)
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Category {
            id: r.id,
            name: r.name,
            description: r.description,
        }))
    }

    async fn insert_category(&self, category: NewCategory) -> Result<Category, StoreError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            INSERT INTO ops.categories (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description
            "#,
        )
        .bind(&category.name)
        .bind(&category.description)
        .fetch_one(&self.pool)
        .await?;

        info!(category_id = row.id, name = %row.name, "Created category");
        Ok(Category {
            id: row.id,
            name: row.name,
            description: row.description,
        })
    }

    async fn find_state(&self, name: &str) -> Result<Option<ReportState>, StoreError> {
        let wanted = name.trim().replace(' ', "_");
        let row = sqlx::query_as::<_, StateRow>(
            r#"
            SELECT id, name, is_terminal
            FROM ops.report_states
            WHERE lower(name) = lower($1)
            "#,
        )
        .bind(wanted)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ReportState {
            id: r.id,
            name: r.name,
            is_terminal: r.is_terminal,
        }))
    }

    async fn find_user(&self, name_or_email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, role
            FROM ops.users
            WHERE lower(name) = lower($1) OR lower(email) = lower($1)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(name_or_email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| User {
            id: r.id,
            name: r.name,
            email: r.email,
            role: r.role,
        }))
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError> {
        let sql = format!(
            r#"
            WITH inserted AS (
                INSERT INTO ops.reports (title, description, category_id, state_id, priority, address, created_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            )
            {}
            "#,
            report_query("inserted", "")
        );
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(&report.title)
            .bind(&report.description)
            .bind(report.category_id)
            .bind(report.state_id)
            .bind(report.priority.level())
            .bind(&report.address)
            .bind(&report.created_by)
            .fetch_one(&self.pool)
            .await?;

        info!(report_id = row.id, "Created report");
        row.try_into()
    }

    async fn search_reports(
        &self,
        filter: &ReportFilter,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError> {
        let sql = report_query(
            "ops.reports",
            r#"
            WHERE ($1::text IS NULL OR r.title ILIKE $1 ESCAPE '\' OR r.description ILIKE $1 ESCAPE '\')
              AND ($2::smallint IS NULL OR r.priority = $2)
              AND ($3::text IS NULL OR lower(c.name) = lower($3))
              AND ($4::text IS NULL OR lower(s.name) = lower($4))
              AND (NOT $5 OR NOT s.is_terminal)
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT $6
            "#,
        );
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(filter.text.as_deref().map(contains_pattern))
            .bind(filter.priority.map(|p| p.level()))
            .bind(filter.category.as_deref())
            .bind(filter.state.as_deref())
            .bind(filter.open_only)
            .bind(sql_limit(limit)?)
            .fetch_all(&self.pool)
            .await?;

        debug!(rows = rows.len(), ?filter, "search_reports");
        to_reports(rows)
    }

    async fn reports_near(
        &self,
        location: &LocationQuery,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError> {
        let limit = sql_limit(limit)?;
        let rows = match location {
            LocationQuery::Area(area) => {
                let sql = report_query(
                    "ops.reports",
                    r#"
                    WHERE r.address ILIKE $1 ESCAPE '\'
                    ORDER BY r.created_at DESC, r.id DESC
                    LIMIT $2
                    "#,
                );
                sqlx::query_as::<_, ReportRow>(&sql)
                    .bind(contains_pattern(area))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            coords @ LocationQuery::Coordinates { .. } => {
                let Some((min_lat, max_lat, min_lng, max_lng)) = coords.bounding_box() else {
                    return Ok(Vec::new());
                };
                let sql = report_query(
                    "ops.reports",
                    r#"
                    WHERE r.latitude BETWEEN $1 AND $2
                      AND r.longitude BETWEEN $3 AND $4
                    ORDER BY r.created_at DESC, r.id DESC
                    LIMIT $5
                    "#,
                );
                sqlx::query_as::<_, ReportRow>(&sql)
                    .bind(min_lat)
                    .bind(max_lat)
                    .bind(min_lng)
                    .bind(max_lng)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        debug!(rows = rows.len(), location = %location.describe(), "reports_near");
        to_reports(rows)
    }

    async fn update_report_state(
        &self,
        report_id: i64,
        state_id: i64,
    ) -> Result<Report, StoreError> {
        let sql = format!(
            r#"
            WITH updated AS (
                UPDATE ops.reports SET state_id = $2 WHERE id = $1
                RETURNING *
            )
            {}
            "#,
            report_query("updated", "")
        );
        let report = self.fetch_report(&sql, report_id, state_id).await?;
        info!(report_id, state = %report.state, "Updated report state");
        Ok(report)
    }

    async fn assign_report(&self, report_id: i64, user_id: i64) -> Result<Report, StoreError> {
        let sql = format!(
            r#"
            WITH updated AS (
                UPDATE ops.reports SET assigned_to = $2 WHERE id = $1
                RETURNING *
            )
            {}
            "#,
            report_query("updated", "")
        );
        let report = self.fetch_report(&sql, report_id, user_id).await?;
        info!(report_id, user_id, "Assigned report");
        Ok(report)
    }

    async fn report_stats(&self) -> Result<ReportStats, StoreError> {
        let totals = sqlx::query_as::<_, TotalsRow>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE s.is_terminal) AS resolved,
                   COUNT(*) FILTER (WHERE r.priority = 4 AND NOT s.is_terminal) AS critical_open
            FROM ops.reports r
            JOIN ops.report_states s ON s.id = r.state_id
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let by_state = sqlx::query_as::<_, CountRow>(
            r#"
            SELECT s.name AS label, COUNT(r.id) AS count
            FROM ops.report_states s
            JOIN ops.reports r ON r.state_id = s.id
            GROUP BY s.name
            ORDER BY count DESC, label
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ReportStats {
            total: totals.total,
            open: totals.total - totals.resolved,
            resolved: totals.resolved,
            critical_open: totals.critical_open,
            by_state: breakdown(by_state),
        })
    }

    async fn count_by(&self, dimension: Dimension) -> Result<Vec<BreakdownRow>, StoreError> {
        let label = match dimension {
            Dimension::Category => "c.name",
            Dimension::State => "s.name",
            Dimension::Priority => {
                "CASE r.priority WHEN 1 THEN 'low' WHEN 2 THEN 'medium' WHEN 3 THEN 'high' ELSE 'critical' END"
            }
        };
        let sql = format!(
            r#"
            SELECT {label} AS label, COUNT(*) AS count
            FROM ops.reports r
            JOIN ops.categories c ON c.id = r.category_id
            JOIN ops.report_states s ON s.id = r.state_id
            GROUP BY 1
            ORDER BY count DESC, label
            "#
        );
        let rows = sqlx::query_as::<_, CountRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(breakdown(rows))
    }

    async fn record_interaction(&self, record: InteractionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ops.assistant_interactions
                (request_id, caller_id, text, intent, action, success, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (request_id) DO NOTHING
            "#,
        )
        .bind(record.request_id)
        .bind(&record.caller_id)
        .bind(&record.text)
        .bind(record.intent.as_str())
        .bind(record.action.as_str())
        .bind(record.success)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_query_substitutes_source() {
        let sql = report_query("updated", "WHERE r.id = $1");
        assert!(sql.contains("FROM updated r"));
        assert!(sql.trim_end().ends_with("WHERE r.id = $1"));
        assert!(!sql.contains("{source}"));
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("pothole"), "%pothole%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(contains_pattern("c:\\x"), "%c:\\\\x%");
    }

    #[test]
    fn test_sql_limit_rejects_out_of_range() {
        assert_eq!(sql_limit(21).unwrap(), 21);
        assert!(matches!(sql_limit(usize::MAX), Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_invalid_priority_is_transport_error() {
        let row = ReportRow {
            id: 9,
            title: "x".into(),
            description: None,
            category: "General".into(),
            state: "pending".into(),
            priority: 7,
            address: None,
            latitude: None,
            longitude: None,
            assigned_to: None,
            created_by: "t".into(),
            created_at: Utc::now(),
        };
        assert!(matches!(Report::try_from(row), Err(StoreError::Transport(_))));
    }
}
