pub mod database;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::jobs::{
    invocation::{Invocation, JobData},
    job_id::JobId,
    states::StateRecord,
    transaction::WriteOp,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Job {0} is not stored")]
    JobMissing(JobId),
    #[error("Corrupt record for job {job_id}: {message}")]
    CorruptRecord { job_id: JobId, message: String },
    #[error("Failed to encode record: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A job about to be persisted. Storage assigns its id.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub invocation: Invocation,
    pub created_at: DateTime<Utc>,
    /// Jobs start out expiring so that one whose first state never commits
    /// is eventually reclaimed.
    pub expire_at: DateTime<Utc>,
}

/// A persisted job together with its current state.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetails {
    pub job: JobData,
    pub state: Option<StateRecord>,
    pub expire_at: Option<DateTime<Utc>>,
}

/// Durable home of jobs and everything state handlers write.
///
/// [`JobStorage::commit`] must apply a batch of operations all-or-nothing.
/// The read helpers exist for transitions and inspection, not for handlers:
/// handlers only ever see a [`Transaction`](crate::jobs::transaction::Transaction).
#[async_trait]
pub trait JobStorage: Send + Sync {
    async fn create_job(&self, job: NewJob) -> Result<JobId, StorageError>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobDetails>, StorageError>;

    async fn commit(&self, operations: Vec<WriteOp>) -> Result<(), StorageError>;

    /// Job ids waiting in a queue, oldest first.
    async fn queued_job_ids(&self, queue: &str) -> Result<Vec<JobId>, StorageError>;

    /// History of a job's states, oldest first.
    async fn state_history(&self, job_id: JobId) -> Result<Vec<StateRecord>, StorageError>;

    /// Members of a set with their scores, lowest score first.
    async fn set_entries(&self, key: &str) -> Result<Vec<(String, f64)>, StorageError>;

    async fn counter_value(&self, key: &str) -> Result<i64, StorageError>;
}
