//! REST API for the assistant
//!
//! - POST /api/assistant/query   - Run one instruction through the pipeline
//! - GET  /api/assistant/intents - Registered intents in priority order
//! - GET  /api/health            - Health check

pub mod assistant_routes;

pub use assistant_routes::{caller_from_headers, create_assistant_router, ApiState};
