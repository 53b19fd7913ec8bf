use chrono::{DateTime, Utc};

use super::{serialize_timestamp, State, StateData};
use crate::jobs::{
    state_handler::{ApplyStateContext, StateHandler},
    transaction::Transaction,
    JobError,
};

const DELETED_COUNTER: &str = "stats:deleted";

/// The job was cancelled and will not run. Final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedState {
    deleted_at: DateTime<Utc>,
    reason: Option<String>,
}

impl DeletedState {
    pub const NAME: &'static str = "Deleted";

    pub fn new() -> Self {
        Self {
            deleted_at: Utc::now(),
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

    pub const fn deleted_at(&self) -> DateTime<Utc> {
        self.deleted_at
    }
}

impl Default for DeletedState {
    fn default() -> Self {
        Self::new()
    }
}

impl State for DeletedState {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn serialize(&self) -> StateData {
        StateData::from([(
            "DeletedAt".to_string(),
            serialize_timestamp(&self.deleted_at),
        )])
    }

    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    fn is_final(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeletedStateHandler;

impl StateHandler for DeletedStateHandler {
    fn state_name(&self) -> &'static str {
        DeletedState::NAME
    }

    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError> {
        context.new_state_as::<DeletedState>()?;
        transaction.increment_counter(DELETED_COUNTER);
        Ok(())
    }

    fn unapply(
        &self,
        _context: &ApplyStateContext<'_>,
        transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError> {
        transaction.decrement_counter(DELETED_COUNTER);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{job_id::JobId, states::EnqueuedState, transaction::WriteOp};
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_deleted_state_is_final() {
        let state = DeletedState::new().with_reason("Cancelled by admin");

        assert!(state.is_final());
        assert_eq!(state.reason(), Some("Cancelled by admin"));
        assert_eq!(state.serialize().len(), 1);
    }

    #[test]
    fn test_handler_counts_deletions() {
        let storage = MemoryStorage::new();
        let mut transaction = Transaction::new(&storage);
        let state = DeletedState::new();
        let context = ApplyStateContext::new(JobId::new(), None, &state);

        DeletedStateHandler
            .apply(&context, &mut transaction)
            .expect("Failed to apply state");
        DeletedStateHandler
            .unapply(&context, &mut transaction)
            .expect("Failed to unapply state");

        assert_eq!(
            transaction.operations(),
            &[
                WriteOp::IncrementCounter {
                    key: DELETED_COUNTER.to_string(),
                },
                WriteOp::DecrementCounter {
                    key: DELETED_COUNTER.to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_handler_rejects_foreign_state() {
        let storage = MemoryStorage::new();
        let mut transaction = Transaction::new(&storage);
        let state = EnqueuedState::new();

        let result = DeletedStateHandler.apply(
            &ApplyStateContext::new(JobId::new(), None, &state),
            &mut transaction,
        );

        assert!(matches!(result, Err(JobError::Configuration(_))));
        assert!(transaction.operations().is_empty());
    }
}
