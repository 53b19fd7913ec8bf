use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tracing::{debug, info, trace};

use super::{
    invocation::Invocation,
    job_id::JobId,
    state_handler::{ApplyStateContext, StateHandlerRegistry},
    states::{State, StateRecord},
    transaction::Transaction,
    JobError,
};
use crate::storage::{JobStorage, NewJob};

/// How long a freshly persisted job lives if its first state never commits.
const CREATED_JOB_EXPIRATION_SECS: i64 = 3600;

/// Default retention of jobs that reached a final state.
const DEFAULT_JOB_EXPIRATION_SECS: i64 = 86_400;

/// The narrow interface every job creation and transition goes through.
///
/// [`BackgroundJobClientExt`](super::client_api::BackgroundJobClientExt)
/// builds its conveniences on top of these two operations only.
#[async_trait]
pub trait JobCreator: Send + Sync {
    /// Persist a new job and move it into its first state.
    ///
    /// The job is stored before its first state is applied. If applying or
    /// committing that state fails, the job is left without a state and
    /// expires an hour after creation.
    async fn create(&self, invocation: Invocation, state: Box<dyn State>)
        -> Result<JobId, JobError>;

    /// Move an existing job into `state`.
    ///
    /// When `expected_states` is non-empty the transition only happens if the
    /// job currently is in one of them; otherwise `Ok(false)` is returned and
    /// nothing is written.
    async fn change_state(
        &self,
        job_id: JobId,
        state: Box<dyn State>,
        expected_states: &[&str],
    ) -> Result<bool, JobError>;
}

/// Creates jobs and drives their state transitions against a storage.
///
/// Cheap to clone; clones share the storage and the handler registry.
#[derive(Clone)]
pub struct BackgroundJobClient {
    storage: Arc<dyn JobStorage>,
    handlers: Arc<StateHandlerRegistry>,
    job_expiration: TimeDelta,
}

impl Debug for BackgroundJobClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundJobClient")
            .field("states_with_handlers", &self.handlers.state_names().count())
            .field("job_expiration", &self.job_expiration)
            .finish_non_exhaustive()
    }
}

impl BackgroundJobClient {
    pub fn new(
        storage: Arc<dyn JobStorage>,
        handlers: impl Into<Arc<StateHandlerRegistry>>,
    ) -> Self {
        Self {
            storage,
            handlers: handlers.into(),
            job_expiration: TimeDelta::seconds(DEFAULT_JOB_EXPIRATION_SECS),
        }
    }

    /// Retention of jobs once they reach a final state.
    ///
    /// Negative retentions and ones that push expiry dates past the
    /// representable range are a [`JobError::Configuration`] error.
    pub fn with_job_expiration(self, job_expiration: TimeDelta) -> Result<Self, JobError> {
        if job_expiration < TimeDelta::zero()
            || Utc::now().checked_add_signed(job_expiration).is_none()
        {
            return Err(JobError::Configuration(format!(
                "job expiration of {job_expiration} is out of range"
            )));
        }

        Ok(Self {
            job_expiration,
            ..self
        })
    }

    pub fn storage(&self) -> &dyn JobStorage {
        self.storage.as_ref()
    }

    pub const fn job_expiration(&self) -> TimeDelta {
        self.job_expiration
    }

    /// Append everything entering `context.new_state()` writes: the old
    /// state's unapply, the new state's apply, the history entry, the
    /// current-state pointer and the job's expiration.
    fn apply_state(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError> {
        let job_id = context.job_id();
        let new_state = context.new_state();

        if let Some(old_state) = context.old_state() {
            if let Some(handler) = self.handlers.get(&old_state.name) {
                trace!("Unapplying `{}` for job {}", old_state.name, job_id);
                handler.unapply(context, transaction)?;
            }
        }

        if let Some(handler) = self.handlers.get(new_state.name()) {
            trace!("Applying `{}` for job {}", new_state.name(), job_id);
            handler.apply(context, transaction)?;
        }

        let now = Utc::now();
        let record = StateRecord::from_state(new_state, now);
        transaction.add_job_state(job_id, record.clone());
        transaction.set_job_state(job_id, record);

        if new_state.is_final() {
            let expire_at = now.checked_add_signed(self.job_expiration).ok_or_else(|| {
                JobError::Configuration(format!(
                    "job expiration of {} is out of range",
                    self.job_expiration
                ))
            })?;
            transaction.expire_job(job_id, expire_at);
        } else {
            transaction.persist_job(job_id);
        }

        Ok(())
    }
}

#[async_trait]
impl JobCreator for BackgroundJobClient {
    async fn create(
        &self,
        invocation: Invocation,
        state: Box<dyn State>,
    ) -> Result<JobId, JobError> {
        let created_at = Utc::now();
        let job_type = invocation.job_type().to_string();

        let job_id = self
            .storage
            .create_job(NewJob {
                invocation,
                created_at,
                expire_at: created_at + TimeDelta::seconds(CREATED_JOB_EXPIRATION_SECS),
            })
            .await?;

        let context = ApplyStateContext::new(job_id, None, state.as_ref());
        let mut transaction = Transaction::new(self.storage.as_ref());
        self.apply_state(&context, &mut transaction)?;
        transaction.commit().await?;

        info!(
            "Created job {}({}) in state `{}`",
            job_type,
            job_id,
            state.name()
        );
        Ok(job_id)
    }

    async fn change_state(
        &self,
        job_id: JobId,
        state: Box<dyn State>,
        expected_states: &[&str],
    ) -> Result<bool, JobError> {
        let details = self
            .storage
            .get_job(job_id)
            .await?
            .ok_or(JobError::JobNotFound(job_id))?;
        let current = details.state.as_ref();

        if !expected_states.is_empty()
            && !current.is_some_and(|current| expected_states.contains(&current.name.as_str()))
        {
            debug!(
                "Job {} is in state {:?}, expected one of {:?}; not moving it to `{}`",
                job_id,
                current.map(|current| current.name.as_str()),
                expected_states,
                state.name()
            );
            return Ok(false);
        }

        let context = ApplyStateContext::new(job_id, current, state.as_ref());
        let mut transaction = Transaction::new(self.storage.as_ref());
        self.apply_state(&context, &mut transaction)?;
        transaction.commit().await?;

        info!(
            "Moved job {} from {:?} to `{}`",
            job_id,
            current.map(|current| current.name.as_str()),
            state.name()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use futures_util::future::join_all;
    use serde_json::json;

    use super::*;
    use crate::jobs::{
        client_api::BackgroundJobClientExt,
        state_handler::StateHandler,
        states::{DeletedState, EnqueuedState, ScheduledState, SucceededState, SCHEDULE_SET},
        transaction::WriteOp,
    };
    use crate::storage::{memory::MemoryStorage, StorageError};
    use crate::tests::setup_test::setup_test;

    fn invocation() -> Invocation {
        Invocation::new("send_report", json!({ "report_id": 1 }))
            .expect("Failed to build invocation")
    }

    fn queue_adds(batch: &[WriteOp]) -> Vec<(&str, JobId)> {
        batch
            .iter()
            .filter_map(|operation| match operation {
                WriteOp::AddToQueue { queue, job_id } => Some((queue.as_str(), *job_id)),
                _ => None,
            })
            .collect()
    }

    /// Wired into the Scheduled slot while expecting Enqueued states.
    struct MisregisteredHandler;

    impl StateHandler for MisregisteredHandler {
        fn state_name(&self) -> &'static str {
            ScheduledState::NAME
        }

        fn apply(
            &self,
            context: &ApplyStateContext<'_>,
            transaction: &mut Transaction<'_>,
        ) -> Result<(), JobError> {
            let state = context.new_state_as::<EnqueuedState>()?;
            transaction.add_to_queue(state.queue(), context.job_id());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct ArchivedState;

    impl State for ArchivedState {
        fn name(&self) -> &'static str {
            "Archived"
        }

        fn serialize(&self) -> crate::jobs::states::StateData {
            crate::jobs::states::StateData::from([(
                "Shelf".to_string(),
                "cold".to_string(),
            )])
        }
    }

    #[tokio::test]
    async fn test_create_enqueued_job_writes_one_queue_add_with_state_record() {
        let test = setup_test();

        let job_id = test
            .client
            .create(
                invocation(),
                Box::new(EnqueuedState::with_queue("default").expect("valid queue")),
            )
            .await
            .expect("Failed to create job");

        let batches = test.storage.committed_batches();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(queue_adds(batch), vec![("default", job_id)]);
        assert!(batch.iter().any(|operation| matches!(
            operation,
            WriteOp::SetJobState { job_id: id, state } if *id == job_id && state.name == "Enqueued"
        )));
        assert!(batch.iter().any(|operation| matches!(
            operation,
            WriteOp::AddJobState { job_id: id, state } if *id == job_id && state.name == "Enqueued"
        )));

        let details = test
            .storage
            .get_job(job_id)
            .await
            .expect("Failed to load job")
            .expect("job should exist");
        let state = details.state.expect("state should be set");
        assert_eq!(state.name, "Enqueued");
        assert_eq!(state.data.get("Queue").map(String::as_str), Some("default"));
        assert!(details.expire_at.is_none());
        assert_eq!(
            test.storage
                .queued_job_ids("default")
                .await
                .expect("Failed to read queue"),
            vec![job_id]
        );
    }

    #[tokio::test]
    async fn test_state_without_handler_only_writes_state_record() {
        let test = setup_test();

        let job_id = test
            .client
            .create(invocation(), Box::new(ArchivedState))
            .await
            .expect("Failed to create job");

        let batches = test.storage.committed_batches();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 3);
        assert!(queue_adds(batch).is_empty());
        assert!(matches!(
            &batch[0],
            WriteOp::AddJobState { job_id: id, state }
                if *id == job_id && state.name == "Archived" && state.data["Shelf"] == "cold"
        ));
        assert!(matches!(
            &batch[1],
            WriteOp::SetJobState { job_id: id, state } if *id == job_id && state.name == "Archived"
        ));
        assert_eq!(batch[2], WriteOp::PersistJob { job_id });
    }

    #[tokio::test]
    async fn test_misregistered_handler_fails_without_writing_state() {
        let storage = MemoryStorage::new();
        let mut handlers = StateHandlerRegistry::new();
        handlers
            .register(MisregisteredHandler)
            .expect("Failed to register handler");
        let client = BackgroundJobClient::new(Arc::new(storage.clone()), handlers);

        let result = client
            .create(
                invocation(),
                Box::new(ScheduledState::after(TimeDelta::minutes(1)).expect("valid delay")),
            )
            .await;

        assert!(matches!(result, Err(JobError::Configuration(_))));
        assert!(storage.committed_batches().is_empty());

        // The job row outlives the failed transition but expires
        let job_ids = storage.job_ids();
        assert_eq!(job_ids.len(), 1);
        let details = storage
            .get_job(job_ids[0])
            .await
            .expect("Failed to load job")
            .expect("job should exist");
        assert!(details.state.is_none());
        assert!(details.expire_at.is_some());
    }

    #[test]
    fn test_out_of_range_job_expiration_is_rejected() {
        let test = setup_test();

        for expiration in [TimeDelta::MAX, TimeDelta::seconds(-1)] {
            let result = test.client.clone().with_job_expiration(expiration);

            assert!(
                matches!(result, Err(JobError::Configuration(_))),
                "{expiration} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_final_state_with_unrepresentable_expiry_fails_without_commit() {
        let test = setup_test();
        let client = BackgroundJobClient {
            job_expiration: TimeDelta::MAX,
            ..test.client.clone()
        };

        let result = client
            .create(
                invocation(),
                Box::new(SucceededState::new(
                    std::time::Duration::ZERO,
                    std::time::Duration::ZERO,
                )),
            )
            .await;

        assert!(matches!(result, Err(JobError::Configuration(_))));
        assert!(test.storage.committed_batches().is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_is_propagated_and_nothing_is_visible() {
        let test = setup_test();
        test.storage.fail_next_commit();

        let result = test.client.enqueue_invocation(invocation()).await;

        assert!(matches!(
            result,
            Err(JobError::Storage(StorageError::Unavailable(_)))
        ));
        assert!(test.storage.committed_batches().is_empty());
        assert!(test
            .storage
            .queued_job_ids("default")
            .await
            .expect("Failed to read queue")
            .is_empty());

        // The orphaned job is left to expire
        let orphan = test.storage.job_ids()[0];
        let details = test
            .storage
            .get_job(orphan)
            .await
            .expect("Failed to load job")
            .expect("job should exist");
        assert!(details.state.is_none());
        assert!(details.expire_at.is_some());
    }

    #[tokio::test]
    async fn test_final_state_expires_job() {
        let test = setup_test();
        let expiration = TimeDelta::hours(2);
        let client = test
            .client
            .clone()
            .with_job_expiration(expiration)
            .expect("valid expiration");

        let before = Utc::now();
        let job_id = client
            .create(
                invocation(),
                Box::new(SucceededState::new(
                    std::time::Duration::ZERO,
                    std::time::Duration::from_millis(15),
                )),
            )
            .await
            .expect("Failed to create job");

        let expire_at = test
            .storage
            .get_job(job_id)
            .await
            .expect("Failed to load job")
            .and_then(|details| details.expire_at)
            .expect("job should expire");
        assert!(expire_at >= before + expiration);
        assert_eq!(
            test.storage
                .counter_value("stats:succeeded")
                .await
                .expect("Failed to read counter"),
            1
        );
    }

    #[tokio::test]
    async fn test_change_state_unapplies_old_state() {
        let test = setup_test();
        let job_id = test
            .client
            .create(
                invocation(),
                Box::new(ScheduledState::after(TimeDelta::minutes(10)).expect("valid delay")),
            )
            .await
            .expect("Failed to create job");
        assert_eq!(
            test.storage
                .set_entries(SCHEDULE_SET)
                .await
                .expect("Failed to read set")
                .len(),
            1
        );

        let changed = test
            .client
            .change_state(
                job_id,
                Box::new(EnqueuedState::with_queue("critical").expect("valid queue")),
                &[ScheduledState::NAME],
            )
            .await
            .expect("Failed to change state");

        assert!(changed);
        assert!(test
            .storage
            .set_entries(SCHEDULE_SET)
            .await
            .expect("Failed to read set")
            .is_empty());
        assert_eq!(
            test.storage
                .queued_job_ids("critical")
                .await
                .expect("Failed to read queue"),
            vec![job_id]
        );
        let history: Vec<String> = test
            .storage
            .state_history(job_id)
            .await
            .expect("Failed to read history")
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(history, vec!["Scheduled", "Enqueued"]);
    }

    #[tokio::test]
    async fn test_change_state_respects_expected_states() {
        let test = setup_test();
        let job_id = test
            .client
            .enqueue_invocation(invocation())
            .await
            .expect("Failed to create job");

        let changed = test
            .client
            .change_state(
                job_id,
                Box::new(DeletedState::new()),
                &[ScheduledState::NAME],
            )
            .await
            .expect("Failed to change state");

        assert!(!changed);
        assert_eq!(test.storage.committed_batches().len(), 1);
        let details = test
            .storage
            .get_job(job_id)
            .await
            .expect("Failed to load job")
            .expect("job should exist");
        assert_eq!(details.state.map(|state| state.name).as_deref(), Some("Enqueued"));
    }

    #[tokio::test]
    async fn test_change_state_of_unknown_job() {
        let test = setup_test();
        let unknown = JobId::new();

        let result = test
            .client
            .change_state(unknown, Box::new(DeletedState::new()), &[])
            .await;

        assert!(matches!(result, Err(JobError::JobNotFound(id)) if id == unknown));
    }

    #[tokio::test]
    async fn test_concurrent_creates_are_isolated() {
        let test = setup_test();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let client = test.client.clone();
                tokio::spawn(async move {
                    let queue = if i % 2 == 0 { "even" } else { "odd" };
                    client
                        .enqueue_invocation_to(invocation(), queue)
                        .await
                        .expect("Failed to create job")
                })
            })
            .collect();

        let job_ids: HashSet<JobId> = join_all(handles)
            .await
            .into_iter()
            .map(|result| result.expect("task panicked"))
            .collect();
        assert_eq!(job_ids.len(), 32);

        let batches = test.storage.committed_batches();
        assert_eq!(batches.len(), 32);
        for batch in &batches {
            let targets: HashSet<JobId> =
                batch.iter().filter_map(WriteOp::job_id).copied().collect();
            assert_eq!(targets.len(), 1, "batch mixes jobs: {batch:?}");
            assert!(job_ids.contains(targets.iter().next().expect("one target")));
            assert_eq!(queue_adds(batch).len(), 1);
        }
    }
}
