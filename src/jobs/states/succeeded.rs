use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{serialize_timestamp, State, StateData};
use crate::jobs::{
    state_handler::{ApplyStateContext, StateHandler},
    transaction::Transaction,
    JobError,
};

const SUCCEEDED_COUNTER: &str = "stats:succeeded";

/// The job ran to completion. Final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SucceededState {
    succeeded_at: DateTime<Utc>,
    latency: Duration,
    performance_duration: Duration,
    result: Option<String>,
}

impl SucceededState {
    pub const NAME: &'static str = "Succeeded";

    /// `latency` is the time the job waited before running,
    /// `performance_duration` the time it took to run.
    pub fn new(latency: Duration, performance_duration: Duration) -> Self {
        Self {
            succeeded_at: Utc::now(),
            latency,
            performance_duration,
            result: None,
        }
    }

    /// Attach the serialized return value of the job.
    #[must_use]
    pub fn with_result(self, result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
            ..self
        }
    }

    pub const fn succeeded_at(&self) -> DateTime<Utc> {
        self.succeeded_at
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }
}

impl State for SucceededState {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn serialize(&self) -> StateData {
        let mut data = StateData::from([
            (
                "SucceededAt".to_string(),
                serialize_timestamp(&self.succeeded_at),
            ),
            (
                "PerformanceDuration".to_string(),
                self.performance_duration.as_millis().to_string(),
            ),
            ("Latency".to_string(), self.latency.as_millis().to_string()),
        ]);

        if let Some(result) = &self.result {
            data.insert("Result".to_string(), result.clone());
        }

        data
    }

    fn is_final(&self) -> bool {
        true
    }
}

/// Keeps the succeeded jobs statistic up to date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SucceededStateHandler;

impl StateHandler for SucceededStateHandler {
    fn state_name(&self) -> &'static str {
        SucceededState::NAME
    }

    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError> {
        context.new_state_as::<SucceededState>()?;
        transaction.increment_counter(SUCCEEDED_COUNTER);
        Ok(())
    }

    fn unapply(
        &self,
        _context: &ApplyStateContext<'_>,
        transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError> {
        transaction.decrement_counter(SUCCEEDED_COUNTER);
        Ok(())
    }
}
