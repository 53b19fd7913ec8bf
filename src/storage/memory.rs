use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{JobDetails, JobStorage, NewJob, StorageError};
use crate::jobs::{invocation::JobData, job_id::JobId, states::StateRecord, transaction::WriteOp};

/// In-process storage. Every batch is applied under a single lock, so a
/// commit is visible either completely or not at all.
///
/// Keeps a log of committed batches so tests can assert exactly what a
/// transition wrote.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<MemoryData>>,
    fail_next_commit: Arc<AtomicBool>,
}

#[derive(Default)]
struct MemoryData {
    jobs: HashMap<JobId, StoredJob>,
    queues: HashMap<String, Vec<JobId>>,
    sets: HashMap<String, HashMap<String, f64>>,
    counters: HashMap<String, i64>,
    committed: Vec<Vec<WriteOp>>,
}

struct StoredJob {
    job: JobData,
    state: Option<StateRecord>,
    history: Vec<StateRecord>,
    expire_at: Option<DateTime<Utc>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with [`StorageError::Unavailable`] without
    /// applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Every batch committed so far, in commit order.
    pub fn committed_batches(&self) -> Vec<Vec<WriteOp>> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .committed
            .clone()
    }

    /// Ids of all stored jobs, including those whose first state never
    /// committed.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .keys()
            .copied()
            .collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryData>, StorageError> {
        self.data
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".to_string()))
    }
}

impl MemoryData {
    fn apply(&mut self, operation: &WriteOp) {
        match operation {
            WriteOp::AddToQueue { queue, job_id } => {
                self.queues.entry(queue.clone()).or_default().push(*job_id);
            }
            WriteOp::SetJobState { job_id, state } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    job.state = Some(state.clone());
                }
            }
            WriteOp::AddJobState { job_id, state } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    job.history.push(state.clone());
                }
            }
            WriteOp::AddToSet { key, value, score } => {
                self.sets
                    .entry(key.clone())
                    .or_default()
                    .insert(value.clone(), *score);
            }
            WriteOp::RemoveFromSet { key, value } => {
                if let Some(set) = self.sets.get_mut(key) {
                    set.remove(value);
                }
            }
            WriteOp::IncrementCounter { key } => {
                *self.counters.entry(key.clone()).or_default() += 1;
            }
            WriteOp::DecrementCounter { key } => {
                *self.counters.entry(key.clone()).or_default() -= 1;
            }
            WriteOp::ExpireJob { job_id, expire_at } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    job.expire_at = Some(*expire_at);
                }
            }
            WriteOp::PersistJob { job_id } => {
                if let Some(job) = self.jobs.get_mut(job_id) {
                    job.expire_at = None;
                }
            }
        }
    }
}

#[async_trait]
impl JobStorage for MemoryStorage {
    async fn create_job(&self, job: NewJob) -> Result<JobId, StorageError> {
        let job_id = JobId::new();

        self.lock()?.jobs.insert(
            job_id,
            StoredJob {
                job: JobData {
                    id: job_id,
                    invocation: job.invocation,
                    created_at: job.created_at,
                },
                state: None,
                history: Vec::new(),
                expire_at: Some(job.expire_at),
            },
        );

        debug!("Stored job {} in memory", job_id);
        Ok(job_id)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobDetails>, StorageError> {
        Ok(self.lock()?.jobs.get(&job_id).map(|stored| JobDetails {
            job: stored.job.clone(),
            state: stored.state.clone(),
            expire_at: stored.expire_at,
        }))
    }

    async fn commit(&self, operations: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut data = self.lock()?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            warn!("Rejecting commit of {} operation(s)", operations.len());
            return Err(StorageError::Unavailable(
                "commit rejected by memory storage".to_string(),
            ));
        }

        // Check every target before touching anything
        if let Some(missing) = operations
            .iter()
            .filter_map(WriteOp::job_id)
            .find(|job_id| !data.jobs.contains_key(*job_id))
        {
            return Err(StorageError::JobMissing(*missing));
        }

        for operation in &operations {
            data.apply(operation);
        }
        data.committed.push(operations);

        Ok(())
    }

    async fn queued_job_ids(&self, queue: &str) -> Result<Vec<JobId>, StorageError> {
        Ok(self.lock()?.queues.get(queue).cloned().unwrap_or_default())
    }

    async fn state_history(&self, job_id: JobId) -> Result<Vec<StateRecord>, StorageError> {
        Ok(self
            .lock()?
            .jobs
            .get(&job_id)
            .map(|stored| stored.history.clone())
            .unwrap_or_default())
    }

    async fn set_entries(&self, key: &str) -> Result<Vec<(String, f64)>, StorageError> {
        let mut entries: Vec<(String, f64)> = self
            .lock()?
            .sets
            .get(key)
            .map(|set| set.iter().map(|(value, score)| (value.clone(), *score)).collect())
            .unwrap_or_default();

        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(entries)
    }

    async fn counter_value(&self, key: &str) -> Result<i64, StorageError> {
        Ok(self.lock()?.counters.get(key).copied().unwrap_or_default())
    }
}
