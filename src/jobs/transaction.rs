use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::{job_id::JobId, states::StateRecord};
use crate::storage::{JobStorage, StorageError};

/// A single buffered write. Storage applies a whole batch of these atomically.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    AddToQueue {
        queue: String,
        job_id: JobId,
    },
    /// Point the job at its current state.
    SetJobState {
        job_id: JobId,
        state: StateRecord,
    },
    /// Append an entry to the job's state history.
    AddJobState {
        job_id: JobId,
        state: StateRecord,
    },
    AddToSet {
        key: String,
        value: String,
        score: f64,
    },
    RemoveFromSet {
        key: String,
        value: String,
    },
    IncrementCounter {
        key: String,
    },
    DecrementCounter {
        key: String,
    },
    ExpireJob {
        job_id: JobId,
        expire_at: DateTime<Utc>,
    },
    PersistJob {
        job_id: JobId,
    },
}

impl WriteOp {
    /// The job this operation writes to, if it targets one.
    pub const fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::AddToQueue { job_id, .. }
            | Self::SetJobState { job_id, .. }
            | Self::AddJobState { job_id, .. }
            | Self::ExpireJob { job_id, .. }
            | Self::PersistJob { job_id } => Some(job_id),
            Self::AddToSet { .. }
            | Self::RemoveFromSet { .. }
            | Self::IncrementCounter { .. }
            | Self::DecrementCounter { .. } => None,
        }
    }
}

/// Write-only batch of storage operations for one state transition.
///
/// Operations are only buffered until [`Transaction::commit`] hands the whole
/// batch to storage. A transaction dropped without committing discards
/// everything it collected.
pub struct Transaction<'a> {
    storage: &'a dyn JobStorage,
    operations: Vec<WriteOp>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(storage: &'a dyn JobStorage) -> Self {
        Self {
            storage,
            operations: Vec::new(),
            committed: false,
        }
    }

    pub fn add_to_queue(&mut self, queue: &str, job_id: JobId) {
        self.push(WriteOp::AddToQueue {
            queue: queue.to_string(),
            job_id,
        });
    }

    pub fn set_job_state(&mut self, job_id: JobId, state: StateRecord) {
        self.push(WriteOp::SetJobState { job_id, state });
    }

    pub fn add_job_state(&mut self, job_id: JobId, state: StateRecord) {
        self.push(WriteOp::AddJobState { job_id, state });
    }

    pub fn add_to_set(&mut self, key: &str, value: &str, score: f64) {
        self.push(WriteOp::AddToSet {
            key: key.to_string(),
            value: value.to_string(),
            score,
        });
    }

    pub fn remove_from_set(&mut self, key: &str, value: &str) {
        self.push(WriteOp::RemoveFromSet {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn increment_counter(&mut self, key: &str) {
        self.push(WriteOp::IncrementCounter {
            key: key.to_string(),
        });
    }

    pub fn decrement_counter(&mut self, key: &str) {
        self.push(WriteOp::DecrementCounter {
            key: key.to_string(),
        });
    }

    pub fn expire_job(&mut self, job_id: JobId, expire_at: DateTime<Utc>) {
        self.push(WriteOp::ExpireJob { job_id, expire_at });
    }

    pub fn persist_job(&mut self, job_id: JobId) {
        self.push(WriteOp::PersistJob { job_id });
    }

    /// Operations collected so far, in the order they were added.
    pub fn operations(&self) -> &[WriteOp] {
        &self.operations
    }

    /// Hand the batch to storage. Either every operation becomes visible or
    /// none does; storage errors are returned as they are.
    pub async fn commit(mut self) -> Result<(), StorageError> {
        let operations = std::mem::take(&mut self.operations);
        self.committed = true;

        debug!("Committing transaction with {} operation(s)", operations.len());
        self.storage.commit(operations).await
    }

    fn push(&mut self, operation: WriteOp) {
        trace!("Transaction queued {:?}", operation);
        self.operations.push(operation);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.operations.is_empty() {
            debug!(
                "Discarding uncommitted transaction with {} operation(s)",
                self.operations.len()
            );
        }
    }
}
