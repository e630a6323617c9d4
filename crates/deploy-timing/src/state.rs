//! Deployment identifiers, server-reported states and their classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque deployment identifier.
///
/// Servers hand out either integers or strings; both are normalised to a
/// string so `42` and `"42"` name the same deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "IdRepr", into = "String")]
pub struct DeploymentId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(u64),
    Str(String),
}

impl From<IdRepr> for DeploymentId {
    fn from(repr: IdRepr) -> Self {
        match repr {
            IdRepr::Int(n) => Self(n.to_string()),
            IdRepr::Str(s) => Self(s),
        }
    }
}

impl From<DeploymentId> for String {
    fn from(id: DeploymentId) -> Self {
        id.0
    }
}

impl From<&str> for DeploymentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeploymentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for DeploymentId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl DeploymentId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a deployment as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Requested,
    Pending,
    InProgress,
    Queued,
    Waiting,
    Success,
    Error,
    Failure,
    Inactive,
    /// Anything the server reports that we do not recognise
    #[serde(other)]
    Unknown,
}

impl DeploymentState {
    /// Whether no further transition is expected from this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Failure)
    }

    /// Badge classification used by the rendering layer.
    #[must_use]
    pub const fn classify(self) -> TerminalClass {
        match self {
            Self::Success => TerminalClass::Success,
            Self::Error | Self::Failure => TerminalClass::Error,
            Self::Requested | Self::Pending | Self::InProgress => TerminalClass::InProgress,
            Self::Queued | Self::Waiting | Self::Inactive | Self::Unknown => TerminalClass::Unknown,
        }
    }

    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Queued => "QUEUED",
            Self::Waiting => "WAITING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Failure => "FAILURE",
            Self::Inactive => "INACTIVE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a deployment for badge styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalClass {
    Success,
    Error,
    Unknown,
    InProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_accepts_integer_and_string() {
        let a: DeploymentId = serde_json::from_str("42").unwrap();
        let b: DeploymentId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"42\"");
    }

    #[test]
    fn test_unrecognised_state_decodes_as_unknown() {
        let state: DeploymentState = serde_json::from_str("\"ROLLING_BACK\"").unwrap();
        assert_eq!(state, DeploymentState::Unknown);

        let state: DeploymentState = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(state, DeploymentState::InProgress);
    }

    #[test]
    fn test_terminal_states() {
        assert!(DeploymentState::Success.is_terminal());
        assert!(DeploymentState::Error.is_terminal());
        assert!(DeploymentState::Failure.is_terminal());
        assert!(!DeploymentState::Inactive.is_terminal());
        assert!(!DeploymentState::Queued.is_terminal());
    }

    #[test]
    fn test_classification() {
        assert_eq!(DeploymentState::Failure.classify(), TerminalClass::Error);
        assert_eq!(DeploymentState::Pending.classify(), TerminalClass::InProgress);
        assert_eq!(DeploymentState::Waiting.classify(), TerminalClass::Unknown);
        assert_eq!(
            serde_json::to_string(&TerminalClass::InProgress).unwrap(),
            "\"in-progress\""
        );
    }
}
