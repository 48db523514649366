//! Run state of a service started by a provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a provider recorded about a service it started.
///
/// Stored under `service_run_states.<VAR>` in the local state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRunState {
    /// Port the service listens on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Commands (argv lists) that stop the service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shutdown_commands: Vec<Vec<String>>,

    /// When the service was started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ServiceRunState {
    /// Check whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.port.is_none() && self.shutdown_commands.is_empty() && self.started_at.is_none()
    }

    /// Forget everything recorded.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
