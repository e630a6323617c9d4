//! Error types for the deployment timing crate.
//!
//! The estimator and the step state machine never fail; these errors only
//! surface at the edges (configuration, scenario files, fetch and cache
//! collaborators).

use thiserror::Error;

/// Errors that can occur at the edges of the timing subsystem.
#[derive(Debug, Error)]
pub enum TimingError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Scenario file could not be read
    #[error("Failed to read scenario file {path}: {source}")]
    ScenarioRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Scenario offsets or sampling range cannot be replayed
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Config file is not valid TOML for [`crate::TimingConfig`]
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A config value is out of range or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A timestamp could not be parsed as RFC 3339
    #[error("Invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A deployment snapshot could not be fetched
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The cache layer rejected an invalidation request
    #[error("Cache invalidation failed: {0}")]
    Invalidation(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, TimingError>;

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|source| TimingError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_normalises_offset() {
        let ts = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }
}
