use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{job_id::JobId, Job, JobError};

/// Serializable description of the work a job performs.
///
/// Holds the registered job type name and its JSON arguments. How a worker
/// turns this back into a call is outside the state machine's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    job_type: String,
    arguments: serde_json::Value,
}

impl Invocation {
    /// Create an invocation from a job type name and its arguments.
    ///
    /// Fails with [`JobError::MissingArgument`] when the type name is blank.
    pub fn new(
        job_type: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Result<Self, JobError> {
        let job_type = job_type.into();
        if job_type.trim().is_empty() {
            return Err(JobError::MissingArgument("job_type"));
        }

        Ok(Self {
            job_type,
            arguments,
        })
    }

    /// Capture an invocation of a typed [`Job`].
    pub fn of<J: Job>(arguments: &J::Arguments) -> Result<Self, JobError> {
        Self::new(J::name(), serde_json::to_value(arguments)?)
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub const fn arguments(&self) -> &serde_json::Value {
        &self.arguments
    }
}

/// A job as persisted by storage.
#[derive(Debug, Clone, PartialEq)]
pub struct JobData {
    pub id: JobId,
    pub invocation: Invocation,
    pub created_at: DateTime<Utc>,
}
