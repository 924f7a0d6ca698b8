//! Error handling for the assistant
//!
//! Only startup paths (rule loading, configuration) and the data-store seam
//! produce errors. The per-request pipeline never returns `Err`: store
//! failures are folded into `ActionResult` by the action service.

use thiserror::Error;

/// Top-level error type, used at startup and by the binaries
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Registry misconfiguration: {0}")]
    Registry(#[from] RegistryError),

    #[error("Data store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rule registry construction failures. Always fatal at startup.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to parse rule file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Failed to read rule file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown intent '{name}'")]
    UnknownIntent { name: String },

    #[error("Intent '{intent}' references unknown action handler '{action}'")]
    UnknownAction { intent: String, action: String },

    #[error("Intent '{intent}' references unknown capability '{capability}'")]
    UnknownCapability { intent: String, capability: String },

    #[error("Intent '{intent}' has invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        intent: String,
        pattern: String,
        reason: String,
    },

    #[error("Pattern '{pattern}' of intent '{intent}' has {groups} capture groups but only {declared} parameters are declared")]
    CaptureMismatch {
        intent: String,
        pattern: String,
        declared: usize,
        groups: usize,
    },

    #[error("Intent '{intent}' dispatches '{action}' but declares no capability")]
    MissingCapability { intent: String, action: String },

    #[error("Intent '{intent}' has no patterns")]
    EmptyPatterns { intent: String },

    #[error("Intent '{intent}' is registered more than once")]
    DuplicateIntent { intent: String },

    #[error("Intent '{intent}' is required by the fallback path but not registered")]
    MissingIntent { intent: String },
}

/// Failures surfaced by a `DataStore` implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} '{key}' not found")]
    NotFound { entity: String, key: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transport failure: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity: "row".to_string(),
                key: "query".to_string(),
            },
            sqlx::Error::Database(db) => {
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation()
                {
                    StoreError::Constraint(db.message().to_string())
                } else {
                    StoreError::Transport(db.message().to_string())
                }
            }
            other => StoreError::Transport(other.to_string()),
        }
    }
}

/// Invalid configuration values
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::not_found("report", 42);
        assert_eq!(err.to_string(), "report '42' not found");
    }

    #[test]
    fn test_registry_error_wraps_into_assistant_error() {
        let err: AssistantError = RegistryError::MissingIntent {
            intent: "stats".into(),
        }
        .into();
        assert!(err.to_string().contains("stats"));
        assert!(matches!(err, AssistantError::Registry(_)));
    }
}
