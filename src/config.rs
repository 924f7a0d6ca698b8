//! Assistant configuration
//!
//! Loaded once at startup from environment variables. Binaries call
//! `dotenvy::dotenv()` first so a local `.env` file is honoured.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Largest accepted `ASSISTANT_MAX_RESULTS`
pub const MAX_RESULTS_CEILING: usize = 1000;

/// Runtime configuration for the assistant pipeline
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Upper bound on unranked result sets returned by search operations
    pub max_results: usize,
    /// Category attached to reports created without one
    pub default_category: String,
    /// Workflow state assigned to newly created reports
    pub default_state: String,
    /// Radius used for coordinate-based location queries
    pub nearby_radius_km: f64,
    /// Optional YAML rule file replacing the embedded rule table
    pub rules_path: Option<PathBuf>,
    /// Record each interaction in the background after responding
    pub audit_enabled: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_results: 20,
            default_category: "General".to_string(),
            default_state: "pending".to_string(),
            nearby_radius_km: 1.0,
            rules_path: None,
            audit_enabled: true,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_results: usize = parse_or("ASSISTANT_MAX_RESULTS", &lookup, defaults.max_results)?;
        if !(1..=MAX_RESULTS_CEILING).contains(&max_results) {
            return Err(ConfigError::InvalidValue {
                key: "ASSISTANT_MAX_RESULTS".into(),
                value: max_results.to_string(),
                reason: format!("must be between 1 and {}", MAX_RESULTS_CEILING),
            });
        }

        let nearby_radius_km: f64 = parse_or(
            "ASSISTANT_NEARBY_RADIUS_KM",
            &lookup,
            defaults.nearby_radius_km,
        )?;
        if !(nearby_radius_km.is_finite() && nearby_radius_km > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "ASSISTANT_NEARBY_RADIUS_KM".into(),
                value: nearby_radius_km.to_string(),
                reason: "must be a positive number".into(),
            });
        }

        Ok(Self {
            max_results,
            default_category: lookup("ASSISTANT_DEFAULT_CATEGORY")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_category),
            default_state: lookup("ASSISTANT_DEFAULT_STATE")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_state),
            nearby_radius_km,
            rules_path: lookup("ASSISTANT_RULES_PATH").map(PathBuf::from),
            audit_enabled: match lookup("ASSISTANT_AUDIT") {
                Some(v) => env_bool("ASSISTANT_AUDIT", &v)?,
                None => defaults.audit_enabled,
            },
        })
    }
}

pub(crate) fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

fn env_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true/false".into(),
        }),
    }
}
