use chrono::{DateTime, Utc};

use super::{serialize_timestamp, validate_queue_name, State, StateData};
use crate::jobs::{
    state_handler::{ApplyStateContext, StateHandler},
    transaction::Transaction,
    JobError,
};

pub const DEFAULT_QUEUE: &str = "default";

/// The job sits in a queue waiting for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedState {
    queue: String,
    enqueued_at: DateTime<Utc>,
    reason: Option<String>,
}

impl EnqueuedState {
    pub const NAME: &'static str = "Enqueued";

    /// Enqueue to the [`DEFAULT_QUEUE`].
    pub fn new() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            enqueued_at: Utc::now(),
            reason: None,
        }
    }

    /// Enqueue to a named queue. The name is validated before the state
    /// exists and stored exactly as given.
    pub fn with_queue(queue: impl Into<String>) -> Result<Self, JobError> {
        let queue = queue.into();
        validate_queue_name(&queue)?;

        Ok(Self {
            queue,
            enqueued_at: Utc::now(),
            reason: None,
        })
    }

    #[must_use]
    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..self
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub const fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}

impl Default for EnqueuedState {
    fn default() -> Self {
        Self::new()
    }
}

impl State for EnqueuedState {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn serialize(&self) -> StateData {
        StateData::from([
            (
                "EnqueuedAt".to_string(),
                serialize_timestamp(&self.enqueued_at),
            ),
            ("Queue".to_string(), self.queue.clone()),
        ])
    }

    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Puts the job id onto the state's queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueuedStateHandler;

impl StateHandler for EnqueuedStateHandler {
    fn state_name(&self) -> &'static str {
        EnqueuedState::NAME
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
