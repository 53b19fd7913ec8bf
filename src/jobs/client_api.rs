use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use super::{
    background_job_client::JobCreator,
    invocation::Invocation,
    job_id::JobId,
    states::{DeletedState, EnqueuedState, ScheduledState},
    Job, JobError,
};

/// Shorthands for the common transitions.
///
/// Every method builds an [`Invocation`] and a state and hands them to
/// [`JobCreator::create`] or [`JobCreator::change_state`]; errors come back
/// exactly as those return them.
#[async_trait]
pub trait BackgroundJobClientExt: JobCreator {
    /// Enqueue to the default queue.
    async fn enqueue_invocation(&self, invocation: Invocation) -> Result<JobId, JobError> {
        self.create(invocation, Box::new(EnqueuedState::new())).await
    }

    async fn enqueue_invocation_to(
        &self,
        invocation: Invocation,
        queue: &str,
    ) -> Result<JobId, JobError> {
        let state = EnqueuedState::with_queue(queue)?;
        self.create(invocation, Box::new(state)).await
    }

    async fn schedule_invocation(
        &self,
        invocation: Invocation,
        delay: TimeDelta,
    ) -> Result<JobId, JobError> {
        let state = ScheduledState::after(delay)?;
        self.create(invocation, Box::new(state)).await
    }

    async fn schedule_invocation_at(
        &self,
        invocation: Invocation,
        enqueue_at: DateTime<Utc>,
    ) -> Result<JobId, JobError> {
        self.create(invocation, Box::new(ScheduledState::at(enqueue_at)))
            .await
    }

    async fn enqueue<J: Job>(&self, arguments: &J::Arguments) -> Result<JobId, JobError> {
        self.enqueue_invocation(Invocation::of::<J>(arguments)?)
            .await
    }

    async fn enqueue_to<J: Job>(
        &self,
        queue: &str,
        arguments: &J::Arguments,
    ) -> Result<JobId, JobError> {
        let state = EnqueuedState::with_queue(queue)?;
        self.create(Invocation::of::<J>(arguments)?, Box::new(state))
            .await
    }

    async fn schedule<J: Job>(
        &self,
        delay: TimeDelta,
        arguments: &J::Arguments,
    ) -> Result<JobId, JobError> {
        self.schedule_invocation(Invocation::of::<J>(arguments)?, delay)
            .await
    }

    async fn schedule_at<J: Job>(
        &self,
        enqueue_at: DateTime<Utc>,
        arguments: &J::Arguments,
    ) -> Result<JobId, JobError> {
        self.schedule_invocation_at(Invocation::of::<J>(arguments)?, enqueue_at)
            .await
    }

    /// Put a job back onto the default queue, whatever state it is in.
    async fn requeue(&self, job_id: JobId) -> Result<bool, JobError> {
        self.change_state(job_id, Box::new(EnqueuedState::new()), &[])
            .await
    }

    async fn delete(&self, job_id: JobId) -> Result<bool, JobError> {
        self.change_state(job_id, Box::new(DeletedState::new()), &[])
            .await
    }
}

impl<C: JobCreator + ?Sized> BackgroundJobClientExt for C {}
