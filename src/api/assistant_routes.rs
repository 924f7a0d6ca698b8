//! Assistant HTTP routes
//!
//! The caller is taken from request headers:
//! - `x-caller-id`: opaque caller identity (default `anonymous`)
//! - `x-caller-permissions`: comma-separated capabilities granted directly
//! - `x-caller-roles`: comma-separated roles, expanded by the permission provider
//!
//! A caller with neither header holds no capabilities.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assistant::{
    parse_capabilities, AssistantPipeline, CallerContext, Capability, PermissionProvider, Query,
    ResponseEnvelope,
};

const CALLER_ID_HEADER: &str = "x-caller-id";
const CALLER_PERMISSIONS_HEADER: &str = "x-caller-permissions";
const CALLER_ROLES_HEADER: &str = "x-caller-roles";

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct IntentSummary {
    pub intent: String,
    pub action: String,
    pub capability: Option<String>,
    pub params: Vec<String>,
    pub patterns: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IntentsResponse {
    pub version: String,
    pub intents: Vec<IntentSummary>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub rules_version: String,
    pub intent_count: usize,
}

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<AssistantPipeline>,
    pub permissions: Arc<dyn PermissionProvider>,
}

impl ApiState {
    pub fn new(pipeline: Arc<AssistantPipeline>, permissions: Arc<dyn PermissionProvider>) -> Self {
        Self {
            pipeline,
            permissions,
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_assistant_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/assistant/query", post(process_query))
        .route("/api/assistant/intents", get(list_intents))
        .route("/api/health", get(health_check))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/assistant/query - Run one instruction
async fn process_query(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ResponseEnvelope>, (StatusCode, Json<ErrorResponse>)> {
    if req.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "text must not be empty".to_string(),
            }),
        ));
    }

    let (caller_id, capabilities) = caller_from_headers(&headers, state.permissions.as_ref());
    let query = Query::new(req.text, caller_id, capabilities);
    Ok(Json(state.pipeline.process(&query).await))
}

/// GET /api/assistant/intents - Registered intents in priority order
async fn list_intents(State(state): State<ApiState>) -> Json<IntentsResponse> {
    let registry = state.pipeline.registry();
    let intents = registry
        .rules()
        .iter()
        .map(|rule| IntentSummary {
            intent: rule.intent.to_string(),
            action: rule.action.to_string(),
            capability: rule.capability.map(|c| c.to_string()),
            params: rule.params.clone(),
            patterns: rule.patterns.iter().map(|p| p.source().to_string()).collect(),
        })
        .collect();

    Json(IntentsResponse {
        version: registry.version().to_string(),
        intents,
    })
}

/// GET /api/health - Health check
async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let registry = state.pipeline.registry();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rules_version: registry.version().to_string(),
        intent_count: registry.len(),
    })
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolve caller identity and capabilities from request headers.
///
/// Directly granted capabilities and role capabilities are unioned.
pub fn caller_from_headers(
    headers: &HeaderMap,
    permissions: &dyn PermissionProvider,
) -> (String, HashSet<Capability>) {
    let caller_id = headers
        .get(CALLER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous")
        .to_string();

    let mut capabilities = headers
        .get(CALLER_PERMISSIONS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(parse_capabilities)
        .unwrap_or_default();

    let roles: Vec<String> = headers
        .get(CALLER_ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|r| {
            r.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if !roles.is_empty() {
        let caller = CallerContext::new(caller_id.clone(), roles);
        capabilities.extend(permissions.capabilities(&caller));
    }

    debug!(caller = %caller_id, capabilities = capabilities.len(), "resolved caller");
    (caller_id, capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::StaticPermissionProvider;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_defaults_to_anonymous_without_capabilities() {
        let (caller, caps) = caller_from_headers(&HeaderMap::new(), &StaticPermissionProvider::new());
        assert_eq!(caller, "anonymous");
        assert!(caps.is_empty());
    }

    #[test]
    fn test_caller_unions_permissions_and_roles() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_ID_HEADER, HeaderValue::from_static("dana"));
        headers.insert(CALLER_PERMISSIONS_HEADER, HeaderValue::from_static("assign_report, bogus"));
        headers.insert(CALLER_ROLES_HEADER, HeaderValue::from_static("viewer"));

        let (caller, caps) = caller_from_headers(&headers, &StaticPermissionProvider::new());
        assert_eq!(caller, "dana");
        assert!(caps.contains(&Capability::AssignReport));
        assert!(caps.contains(&Capability::ViewStats));
        assert!(!caps.contains(&Capability::CreateReport));
    }
}
