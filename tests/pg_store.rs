//! Postgres store integration tests.
//!
//! Requires a database with `sql/schema.sql` applied.
//! Run with: DATABASE_URL="postgresql:///ops_dashboard" cargo test --features database --test pg_store -- --ignored --nocapture

#![cfg(feature = "database")]

use std::sync::Arc;

use ops_assistant::assistant::{
    ActionData, AssistantPipeline, Capability, DataStore, LocationQuery, Query, ReportFilter,
};
use ops_assistant::config::AssistantConfig;
use ops_assistant::database::{DatabaseConfig, DatabaseManager, PgDataStore};
use ops_assistant::error::StoreError;

async fn connect() -> DatabaseManager {
    let config = DatabaseConfig {
        database_url: std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for integration tests"),
        max_connections: 5,
        ..DatabaseConfig::default()
    };
    DatabaseManager::new(config)
        .await
        .expect("failed to connect to test database")
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn test_schema_is_applied() {
    let db = connect().await;
    db.test_connection().await.unwrap();
    db.verify_schema().await.unwrap();
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn test_reference_lookups() {
    let store = connect().await.data_store();

    let general = store.find_category("general").await.unwrap();
    assert_eq!(general.map(|c| c.name), Some("General".to_string()));

    let state = store.find_state("in progress").await.unwrap();
    assert_eq!(state.map(|s| s.name), Some("in_progress".to_string()));

    let user = store.find_user("SAM.LEE@CITY.EXAMPLE").await.unwrap();
    assert_eq!(user.map(|u| u.name), Some("Sam Lee".to_string()));
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn test_search_is_bounded() {
    let store = connect().await.data_store();
    let rows = store
        .search_reports(&ReportFilter::default(), 2)
        .await
        .unwrap();
    assert!(rows.len() <= 2);
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn test_search_text_wildcards_are_literal() {
    let store = connect().await.data_store();
    let filter = ReportFilter {
        text: Some("%".to_string()),
        ..ReportFilter::default()
    };
    let rows = store.search_reports(&filter, 50).await.unwrap();
    assert!(rows.iter().all(|r| r.title.contains('%')
        || r.description.as_deref().is_some_and(|d| d.contains('%'))));

    let err = store
        .search_reports(&ReportFilter::default(), usize::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn test_coordinate_query_finds_nearby_report() {
    let store = connect().await.data_store();
    let location = LocationQuery::parse("40.7128, -74.0060", 1.0);
    let rows = store.reports_near(&location, 20).await.unwrap();
    assert!(rows.iter().any(|r| r.title == "Pothole on 5th Street"));
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn test_update_missing_report_is_not_found() {
    let store = connect().await.data_store();
    let err = store.update_report_state(i64::MAX, 1).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn test_pipeline_over_postgres() {
    let store: Arc<dyn DataStore> = Arc::new(PgDataStore::new(connect().await.pool().clone()));
    let pipeline = AssistantPipeline::from_config(store, &AssistantConfig::default()).unwrap();

    let envelope = pipeline
        .process(&Query::new("reports by category", "pg-test", [Capability::ViewStats]))
        .await;

    let result = envelope.result.expect("breakdown dispatches");
    assert!(result.success(), "{:?}", result);
    assert!(matches!(result.data(), Some(ActionData::AggregateBreakdown(_))));
}
