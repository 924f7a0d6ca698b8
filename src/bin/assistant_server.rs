//! Ops Assistant REST API Server
//!
//! ## Usage
//!
//! ```bash
//! # Apply the schema, then start the server
//! psql "$DATABASE_URL" -f sql/schema.sql
//! DATABASE_URL=postgresql://localhost/ops_dashboard cargo run --bin assistant_server --features server
//!
//! curl -X POST http://localhost:3000/api/assistant/query \
//!   -H "Content-Type: application/json" \
//!   -H "x-caller-id: dana" -H "x-caller-roles: operator" \
//!   -d '{"text": "urgent reports"}'
//!
//! curl http://localhost:3000/api/assistant/intents
//! curl http://localhost:3000/api/health
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use ops_assistant::api::{create_assistant_router, ApiState};
use ops_assistant::assistant::{AssistantPipeline, DataStore, StaticPermissionProvider};
use ops_assistant::config::AssistantConfig;
use ops_assistant::database::{DatabaseConfig, DatabaseManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ops_assistant=debug,tower_http=debug".into()),
        )
        .init();

    let config = AssistantConfig::from_env().context("invalid assistant configuration")?;

    let db_config = DatabaseConfig::from_env().context("invalid database configuration")?;
    let db = DatabaseManager::new(db_config)
        .await
        .context("failed to connect to database")?;
    db.verify_schema()
        .await
        .context("database schema check failed")?;

    let store: Arc<dyn DataStore> = Arc::new(db.data_store());
    let pipeline = AssistantPipeline::from_config(store, &config)
        .context("rule registry misconfigured")?;
    info!(
        rules_version = pipeline.registry().version(),
        intents = pipeline.registry().len(),
        "Assistant pipeline ready"
    );

    let state = ApiState::new(Arc::new(pipeline), Arc::new(StaticPermissionProvider::new()));
    let app = create_assistant_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let bind_addr =
        std::env::var("ASSISTANT_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Ops assistant listening on {}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
