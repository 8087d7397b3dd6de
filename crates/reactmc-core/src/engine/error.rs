use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::change::ChangeError;
use crate::core::models::space::SpaceError;
use crate::core::models::topology::TopologyError;
use crate::core::utils::geometry::GeometryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Topology error: {source}")]
    Topology {
        #[from]
        source: TopologyError,
    },

    #[error("Unknown species '{0}'")]
    UnknownSpecies(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invariant violated at step {step}{}: {message}", group_suffix(.group))]
    Invariant {
        step: u64,
        group: Option<usize>,
        message: String,
    },

    #[error("Replica exchange failed: {0}")]
    Exchange(String),

    #[error("Replica exchange protocol error: {0}")]
    Protocol(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

fn group_suffix(group: &Option<usize>) -> String {
    group.map(|g| format!(" in group {}", g)).unwrap_or_default()
}

impl EngineError {
    pub fn invariant(step: u64, group: Option<usize>, message: impl Into<String>) -> Self {
        Self::Invariant {
            step,
            group,
            message: message.into(),
        }
    }

    /// Stamps the simulation step on invariant violations raised by code that
    /// does not know it.
    pub fn at_step(self, step: u64) -> Self {
        match self {
            Self::Invariant { group, message, .. } => Self::Invariant {
                step,
                group,
                message,
            },
            other => other,
        }
    }

    /// Maps a configuration-state failure found by an invariant check.
    pub fn from_space(step: u64, error: SpaceError) -> Self {
        let group = match &error {
            SpaceError::Group { group, .. }
            | SpaceError::MassCenter { group, .. }
            | SpaceError::Corrupted { group, .. } => Some(*group),
            _ => None,
        };
        Self::invariant(step, group, error.to_string())
    }
}

impl From<GeometryError> for EngineError {
    fn from(error: GeometryError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<ChangeError> for EngineError {
    fn from(error: ChangeError) -> Self {
        let group = match &error {
            ChangeError::UnknownGroup { group, .. } | ChangeError::AtomOutOfRange { group, .. } => *group,
        };
        Self::invariant(0, Some(group), error.to_string())
    }
}

impl From<SpaceError> for EngineError {
    fn from(error: SpaceError) -> Self {
        Self::Initialization(error.to_string())
    }
}
