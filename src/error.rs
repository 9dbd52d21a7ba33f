//! Error types for the namespace suspender

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("RDS API error: {0}")]
    RdsError(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid time value {value:?}: {source}")]
    TimeParseError {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid replica count {value:?}: {source}")]
    ReplicasParseError {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Desired state {0:?} is not a supported state")]
    UnknownDesiredState(String),

    #[error("Conflict retries exhausted after {0} attempts")]
    ConflictRetriesExhausted(usize),
}

impl Error {
    /// Check whether this is an optimistic-concurrency conflict (HTTP 409).
    ///
    /// Conflicts are the only errors the write retry loop swallows; anything
    /// else surfaces to the caller immediately.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(resp)) if resp.code == 409)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
