//! Controller-owned annotation keys and the desired-state vocabulary
//!
//! All durable state lives as annotations on the namespace and on the
//! workloads themselves; nothing survives a process restart in memory.
//! Every key the controller owns carries the deployment-configured prefix
//! so several instances can share a cluster without stepping on each other.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Suffix of the opt-in annotation; its value must equal the configured
/// controller name for a namespace to be managed at all.
pub const CONTROLLER_NAME: &str = "controllerName";

/// Suffix of the target lifecycle state annotation.
pub const DESIRED_STATE: &str = "desiredState";

/// Suffix of the daily wall-clock suspension time annotation (kitchen
/// format, e.g. `9:00PM`, evaluated in the configured timezone).
pub const DAILY_SUSPEND_TIME: &str = "dailySuspendTime";

/// Suffix of the manual-resume extension expiry annotation (RFC 2822).
pub const NEXT_SUSPEND_TIME: &str = "nextSuspendTime";

/// Suffix of the replica-memory annotation written on workloads when they
/// are scaled to zero.
pub const ORIGINAL_REPLICAS: &str = "originalReplicas";

/// Target lifecycle state of a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Running,
    Suspended,
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesiredState::Running => write!(f, "Running"),
            DesiredState::Suspended => write!(f, "Suspended"),
        }
    }
}

impl FromStr for DesiredState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(DesiredState::Running),
            "Suspended" => Ok(DesiredState::Suspended),
            other => Err(Error::UnknownDesiredState(other.to_string())),
        }
    }
}

/// Fully-prefixed annotation keys, computed once from the configured prefix.
#[derive(Debug, Clone)]
pub struct AnnotationKeys {
    pub controller_name: String,
    pub desired_state: String,
    pub daily_suspend_time: String,
    pub next_suspend_time: String,
    pub original_replicas: String,
}

impl AnnotationKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            controller_name: format!("{prefix}{CONTROLLER_NAME}"),
            desired_state: format!("{prefix}{DESIRED_STATE}"),
            daily_suspend_time: format!("{prefix}{DAILY_SUSPEND_TIME}"),
            next_suspend_time: format!("{prefix}{NEXT_SUSPEND_TIME}"),
            original_replicas: format!("{prefix}{ORIGINAL_REPLICAS}"),
        }
    }

    /// Parse the desired state recorded on a namespace, if any.
    pub fn desired_state_of(
        &self,
        annotations: &BTreeMap<String, String>,
    ) -> Option<Result<DesiredState, Error>> {
        annotations
            .get(&self.desired_state)
            .map(|v| v.parse::<DesiredState>())
    }
}
