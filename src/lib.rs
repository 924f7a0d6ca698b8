//! Ops Assistant - natural-language front end for the operations dashboard
//!
//! Staff type short instructions ("urgent reports", "assign report 3 to
//! Dana Ortiz"); the assistant classifies them against an ordered rule
//! table, checks the caller's capabilities, runs the matching data
//! operation and answers in plain language.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ops_assistant::assistant::{AssistantPipeline, Capability, InMemoryDataStore, Query};
//! use ops_assistant::config::AssistantConfig;
//!
//! # async fn run() -> ops_assistant::error::Result<()> {
//! let store = Arc::new(InMemoryDataStore::seeded());
//! let pipeline = AssistantPipeline::from_config(store, &AssistantConfig::default())?;
//! let query = Query::new("urgent reports", "dana", [Capability::ViewReport]);
//! let envelope = pipeline.process(&query).await;
//! println!("{}", envelope.natural_response);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Environment-driven configuration
pub mod config;

// Intent pipeline
pub mod assistant;

// Postgres-backed data store (when enabled)
#[cfg(feature = "database")]
pub mod database;

// REST API (when enabled)
#[cfg(feature = "server")]
pub mod api;

pub use assistant::{AssistantPipeline, Query, ResponseEnvelope};
pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
