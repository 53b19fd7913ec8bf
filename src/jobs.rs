pub mod background_job_client;
pub mod client_api;
pub mod invocation;
pub mod job_id;
pub mod state_handler;
pub mod states;
pub mod transaction;

use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;
use job_id::JobId;

#[derive(Debug, Error)]
pub enum JobError {
    /// A required value was empty or consisted of whitespace only.
    #[error("Value cannot be empty or whitespace: `{0}`")]
    MissingArgument(&'static str),
    /// A value was supplied but violates a domain rule.
    #[error("Malformed argument `{argument}`: {message}")]
    InvalidArgument {
        argument: &'static str,
        message: String,
    },
    /// Handlers were wired up incorrectly. Never retryable.
    #[error("State handler configuration error: {0}")]
    Configuration(String),
    #[error("Job {0} does not exist")]
    JobNotFound(JobId),
    #[error("Failed to serialize job arguments: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A type of background work that can be put through the state machine.
///
/// The arguments are serialized into the job's [`invocation::Invocation`];
/// executing them is up to whatever worker later picks the job up.
pub trait Job: Send + Sync {
    type Arguments: Serialize + Send + Sync;

    fn name() -> &'static str;
}
