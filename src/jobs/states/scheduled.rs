use chrono::{DateTime, TimeDelta, Utc};

use super::{serialize_timestamp, State, StateData};
use crate::jobs::{
    state_handler::{ApplyStateContext, StateHandler},
    transaction::Transaction,
    JobError,
};

/// Set holding scheduled job ids, scored by the unix time they are due.
pub const SCHEDULE_SET: &str = "schedule";

/// The job waits until `enqueue_at` before it is moved to a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledState {
    enqueue_at: DateTime<Utc>,
    scheduled_at: DateTime<Utc>,
    reason: Option<String>,
}

impl ScheduledState {
    pub const NAME: &'static str = "Scheduled";

    /// Due `delay` from now.
    ///
    /// Fails with [`JobError::InvalidArgument`] when the due time falls
    /// outside the representable range.
    pub fn after(delay: TimeDelta) -> Result<Self, JobError> {
        let scheduled_at = Utc::now();
        let enqueue_at = scheduled_at
            .checked_add_signed(delay)
            .ok_or_else(|| JobError::InvalidArgument {
                argument: "delay",
                message: format!("{delay} from now is out of range"),
            })?;

        Ok(Self {
            enqueue_at,
            scheduled_at,
            reason: None,
        })
    }

    /// Due at an explicit instant.
    pub fn at(enqueue_at: DateTime<Utc>) -> Self {
        Self {
            enqueue_at,
            scheduled_at: Utc::now(),
            reason: None,
        }
    }

    #[must_use]
    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..self
        }
    }

    pub const fn enqueue_at(&self) -> DateTime<Utc> {
        self.enqueue_at
    }

    pub const fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }
}

impl State for ScheduledState {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn serialize(&self) -> StateData {
        StateData::from([
            ("EnqueueAt".to_string(), serialize_timestamp(&self.enqueue_at)),
            (
                "ScheduledAt".to_string(),
                serialize_timestamp(&self.scheduled_at),
            ),
        ])
    }

    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Tracks scheduled jobs in [`SCHEDULE_SET`] so a poller can find the ones
/// that are due.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduledStateHandler;

impl StateHandler for ScheduledStateHandler {
    fn state_name(&self) -> &'static str {
        ScheduledState::NAME
    }

    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError> {
        let state = context.new_state_as::<ScheduledState>()?;

        #[allow(clippy::cast_precision_loss)]
        let score = state.enqueue_at().timestamp() as f64;
        transaction.add_to_set(SCHEDULE_SET, &context.job_id().to_string(), score);
        Ok(())
    }

    fn unapply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError> {
        transaction.remove_from_set(SCHEDULE_SET, &context.job_id().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{job_id::JobId, states::EnqueuedState, transaction::WriteOp};
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_after_delay_is_relative_to_now() {
        let before = Utc::now();
        let state = ScheduledState::after(TimeDelta::minutes(5)).expect("valid delay");
        let after = Utc::now();

        assert!(state.enqueue_at() >= before + TimeDelta::minutes(5));
        assert!(state.enqueue_at() <= after + TimeDelta::minutes(5));
        assert_eq!(
            state.enqueue_at() - state.scheduled_at(),
            TimeDelta::minutes(5)
        );
    }

    #[test]
    fn test_out_of_range_delay_is_rejected() {
        for delay in [TimeDelta::MAX, TimeDelta::MIN] {
            let result = ScheduledState::after(delay);

            assert!(
                matches!(result, Err(JobError::InvalidArgument { argument: "delay", .. })),
                "{delay} should be rejected: {result:?}"
            );
        }
    }

    #[test]
    fn test_serialize_has_both_timestamps() {
        let enqueue_at = DateTime::parse_from_rfc3339("2030-06-01T12:00:00Z")
            .expect("Failed to parse timestamp")
            .with_timezone(&Utc);
        let state = ScheduledState::at(enqueue_at);

        let data = state.serialize();

        assert_eq!(data.len(), 2);
        assert_eq!(
            data.get("EnqueueAt").map(String::as_str),
            Some("2030-06-01T12:00:00.000Z")
        );
        assert!(data.contains_key("ScheduledAt"));
    }

    #[test]
    fn test_handler_adds_to_schedule_set() {
        let storage = MemoryStorage::new();
        let mut transaction = Transaction::new(&storage);
        let enqueue_at = DateTime::from_timestamp(1_900_000_000, 0).expect("valid timestamp");
        let state = ScheduledState::at(enqueue_at);
        let job_id = JobId::new();

        ScheduledStateHandler
            .apply(
                &ApplyStateContext::new(job_id, None, &state),
                &mut transaction,
            )
            .expect("Failed to apply state");

        assert_eq!(
            transaction.operations(),
            &[WriteOp::AddToSet {
                key: SCHEDULE_SET.to_string(),
                value: job_id.to_string(),
                score: 1_900_000_000.0,
            }]
        );
    }

    #[test]
    fn test_handler_unapply_removes_from_schedule_set() {
        let storage = MemoryStorage::new();
        let mut transaction = Transaction::new(&storage);
        let state = EnqueuedState::new();
        let job_id = JobId::new();

        ScheduledStateHandler
            .unapply(
                &ApplyStateContext::new(job_id, None, &state),
                &mut transaction,
            )
            .expect("Failed to unapply state");

        assert_eq!(
            transaction.operations(),
            &[WriteOp::RemoveFromSet {
                key: SCHEDULE_SET.to_string(),
                value: job_id.to_string(),
            }]
        );
    }

    #[test]
    fn test_handler_rejects_foreign_state() {
        let storage = MemoryStorage::new();
        let mut transaction = Transaction::new(&storage);
        let state = EnqueuedState::new();

        let result = ScheduledStateHandler.apply(
            &ApplyStateContext::new(JobId::new(), None, &state),
            &mut transaction,
        );

        assert!(matches!(result, Err(JobError::Configuration(_))));
    }
}
