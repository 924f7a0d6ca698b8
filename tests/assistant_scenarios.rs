//! End-to-end pipeline tests over the seeded in-memory store

use std::sync::Arc;
use std::time::Duration;

use ops_assistant::assistant::{
    Action, ActionData, AssistantPipeline, Capability, DataStore, InMemoryDataStore, Intent,
    Query, Resolution, ResponseEnvelope,
};
use ops_assistant::config::AssistantConfig;
use ops_assistant::error::StoreError;

fn setup() -> (Arc<InMemoryDataStore>, AssistantPipeline) {
    let store = Arc::new(InMemoryDataStore::seeded());
    let dyn_store: Arc<dyn DataStore> = store.clone();
    let pipeline = AssistantPipeline::from_config(dyn_store, &AssistantConfig::default())
        .expect("builtin rules compile");
    (store, pipeline)
}

async fn ask(pipeline: &AssistantPipeline, text: &str, caps: &[Capability]) -> ResponseEnvelope {
    pipeline
        .process(&Query::new(text, "test-caller", caps.iter().copied()))
        .await
}

/// The audit row is written by a background task
async fn wait_for_interactions(store: &InMemoryDataStore, expected: usize) {
    for _ in 0..100 {
        if store.interactions().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} interaction(s), found {}",
        expected,
        store.interactions().len()
    );
}

#[tokio::test]
async fn test_create_report_with_permission() {
    let (store, pipeline) = setup();
    let before = store.report_count();

    let envelope = ask(&pipeline, r#"create report "pothole on 5th""#, &[Capability::CreateReport]).await;

    assert_eq!(envelope.intent, Intent::CreateReport);
    assert_eq!(envelope.action, Action::CreateReport);
    let result = envelope.result.as_ref().expect("create dispatches");
    assert!(result.success(), "{:?}", result);
    assert!(envelope.natural_response.contains("pothole on 5th"));
    assert!(envelope.natural_response.contains('✅'));
    assert_eq!(store.report_count(), before + 1);
}

#[tokio::test]
async fn test_create_report_without_permission_makes_no_store_call() {
    let (store, pipeline) = setup();

    let envelope = ask(&pipeline, r#"create report "pothole on 5th""#, &[Capability::ViewReport]).await;

    assert_eq!(envelope.intent, Intent::CreateReport);
    assert_eq!(envelope.action, Action::PermissionDenied);
    let result = envelope.result.as_ref().expect("denial carries a result");
    assert!(!result.success());
    assert!(result.error().is_some_and(|e| !e.is_empty()));
    assert!(envelope.natural_response.contains("create_report"));
    assert_eq!(store.call_count(), 0);
    assert!(store.call_log().is_empty());
}

#[tokio::test]
async fn test_urgent_reports_lists_critical_open() {
    let (store, pipeline) = setup();

    let envelope = ask(&pipeline, "urgent reports", &[Capability::ViewReport]).await;

    assert_eq!(envelope.intent, Intent::CriticalSearch);
    assert_eq!(envelope.action, Action::SearchCritical);
    let result = envelope.result.as_ref().expect("search dispatches");
    let Some(ActionData::SearchResults(results)) = result.data() else {
        panic!("expected search results, got {:?}", result.data());
    };
    assert_eq!(results.count(), 2);
    assert!(results.count() <= results.limit);
    assert!(results.reports.iter().all(|r| r.priority.as_str() == "critical"));
    assert!(envelope.natural_response.contains("Found 2"));
    assert_eq!(store.call_log(), vec!["search_reports"]);
}

#[tokio::test]
async fn test_greeting_never_touches_store() {
    let (store, pipeline) = setup();

    let envelope = ask(&pipeline, "hello", &[]).await;

    assert_eq!(envelope.intent, Intent::Greeting);
    assert_eq!(envelope.action, Action::Respond);
    assert!(envelope.result.is_none());
    assert!(envelope.natural_response.starts_with("Hello"));
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_gibberish_gets_general_fallback() {
    let (store, pipeline) = setup();

    let envelope = ask(&pipeline, "asdkjhasdkjh", &Capability::ALL).await;

    assert_eq!(envelope.intent, Intent::GeneralFallback);
    assert_eq!(envelope.action, Action::Clarify);
    assert_eq!(envelope.resolution, Resolution::Fallback);
    assert!((envelope.confidence - 0.4).abs() < 1e-6);
    assert!(envelope.natural_response.contains("asdkjhasdkjh"));
    assert!(envelope.natural_response.matches('•').count() >= 3);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_count_question_resolves_to_stats() {
    let (store, pipeline) = setup();

    let envelope = ask(&pipeline, "how many reports are there", &[Capability::ViewStats]).await;

    assert_eq!(envelope.intent, Intent::Stats);
    assert_eq!(envelope.action, Action::GetStats);
    assert_eq!(envelope.resolution, Resolution::Heuristic);
    assert_eq!(store.call_log(), vec!["report_stats"]);
    assert!(envelope.natural_response.contains("currently 6 reports"));
}

#[tokio::test]
async fn test_heuristic_intent_is_still_gated() {
    let (store, pipeline) = setup();

    let envelope = ask(&pipeline, "how many reports are there", &[]).await;

    assert_eq!(envelope.intent, Intent::Stats);
    assert_eq!(envelope.action, Action::PermissionDenied);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_classification_is_idempotent() {
    let (_store, pipeline) = setup();
    let caps = [Capability::ViewReport, Capability::UpdateReport];

    let first = ask(&pipeline, "mark report 1 as in progress", &caps).await;
    let second = ask(&pipeline, "mark report 1 as in progress", &caps).await;

    assert_eq!(first.intent, second.intent);
    assert_eq!(first.action, second.action);
    assert_eq!(first.parameters, second.parameters);
    assert_ne!(first.request_id, second.request_id);
}

#[tokio::test]
async fn test_store_failure_becomes_apology() {
    let (store, pipeline) = setup();
    store.fail_with(StoreError::Transport("connection reset by 10.1.2.3".into()));

    let envelope = ask(&pipeline, "show stats", &[Capability::ViewStats]).await;

    let result = envelope.result.as_ref().expect("stats dispatches");
    assert!(!result.success());
    assert!(result.error().is_some_and(|e| e.contains("10.1.2.3")));
    assert!(envelope.natural_response.starts_with("Sorry"));
    assert!(!envelope.natural_response.contains("10.1.2.3"));
}

#[tokio::test]
async fn test_update_and_assign_flow() {
    let (_store, pipeline) = setup();
    let caps = [Capability::UpdateReport, Capability::AssignReport];

    let updated = ask(&pipeline, "mark report 3 as in progress", &caps).await;
    let Some(ActionData::UpdatedReport(report)) = updated.result.as_ref().and_then(|r| r.data()) else {
        panic!("expected updated report");
    };
    assert_eq!(report.state, "in_progress");

    let assigned = ask(&pipeline, "assign report 3 to Sam Lee", &caps).await;
    let Some(ActionData::UpdatedReport(report)) = assigned.result.as_ref().and_then(|r| r.data()) else {
        panic!("expected assigned report");
    };
    assert_eq!(report.assigned_to.as_deref(), Some("Sam Lee"));

    let missing = ask(&pipeline, "resolve report 404", &caps).await;
    assert!(missing.result.as_ref().is_some_and(|r| !r.success()));
    assert!(missing.natural_response.contains("404"));
}

#[tokio::test]
async fn test_interaction_is_audited_in_background() {
    let (store, pipeline) = setup();

    let envelope = ask(&pipeline, "urgent reports", &[Capability::ViewReport]).await;

    wait_for_interactions(&store, 1).await;
    let record = &store.interactions()[0];
    assert_eq!(record.request_id, envelope.request_id);
    assert_eq!(record.intent, Intent::CriticalSearch);
    assert_eq!(record.success, Some(true));
}

#[tokio::test]
async fn test_failed_audit_leaves_response_unchanged() {
    let (_, healthy) = setup();
    let (broken_store, broken) = setup();
    broken_store.fail_audit_with(StoreError::Transport("audit table unavailable".into()));

    let caps = [Capability::ViewStats];
    let expected = ask(&healthy, "show stats", &caps).await;
    let actual = ask(&broken, "show stats", &caps).await;

    for _ in 0..100 {
        if broken_store.audit_attempts() >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(broken_store.audit_attempts(), 1);
    assert!(broken_store.interactions().is_empty());

    let strip_id = |envelope: &ResponseEnvelope| {
        let mut value = serde_json::to_value(envelope).expect("envelope serializes");
        if let Some(map) = value.as_object_mut() {
            map.remove("request_id");
        }
        value
    };
    assert_eq!(strip_id(&actual), strip_id(&expected));
    assert!(actual.result.as_ref().is_some_and(|r| r.success()));

    // The pipeline keeps serving after the failure
    let again = ask(&broken, "hello", &[]).await;
    assert_eq!(again.intent, Intent::Greeting);
}

#[tokio::test]
async fn test_audit_can_be_disabled() {
    let store = Arc::new(InMemoryDataStore::seeded());
    let config = AssistantConfig {
        audit_enabled: false,
        ..AssistantConfig::default()
    };
    let pipeline = AssistantPipeline::from_config(store.clone(), &config).expect("builtin rules compile");

    ask(&pipeline, "hello", &[]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.interactions().is_empty());
}

#[tokio::test]
async fn test_concurrent_queries_share_one_pipeline() {
    let (store, pipeline) = setup();
    let pipeline = Arc::new(pipeline);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .process(&Query::new("urgent reports", "load", [Capability::ViewReport]))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let envelope = handle.await.expect("task completes");
        assert_eq!(envelope.intent, Intent::CriticalSearch);
    }
    assert_eq!(store.call_count(), 8);
}
