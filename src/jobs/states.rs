mod deleted;
mod enqueued;
mod failed;
mod processing;
mod scheduled;
mod succeeded;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::JobError;

pub use deleted::{DeletedState, DeletedStateHandler};
pub use enqueued::{EnqueuedState, EnqueuedStateHandler, DEFAULT_QUEUE};
pub use failed::FailedState;
pub use processing::ProcessingState;
pub use scheduled::{ScheduledState, ScheduledStateHandler, SCHEDULE_SET};
pub use succeeded::{SucceededState, SucceededStateHandler};

/// Flat durable representation of a state. Ordered so that serializing the
/// same state twice always yields the same record.
pub type StateData = BTreeMap<String, String>;

static QUEUE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("queue name pattern is valid"));

/// Upcast helper so handlers can recover the concrete state type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One lifecycle stage of a job.
///
/// Implementations are immutable values validated at construction. The name
/// is a per-type constant and is the key used to look up the [`StateHandler`]
/// for the state.
///
/// [`StateHandler`]: crate::jobs::state_handler::StateHandler
pub trait State: AsAny + Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn serialize(&self) -> StateData;

    /// Human-readable explanation of why the job entered this state.
    fn reason(&self) -> Option<&str> {
        None
    }

    /// Jobs in a final state are expired by storage after the configured
    /// retention period.
    fn is_final(&self) -> bool {
        false
    }
}

/// A state as written to storage: the job's current-state pointer and every
/// history entry use this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub name: String,
    pub reason: Option<String>,
    pub data: StateData,
    pub created_at: DateTime<Utc>,
}

impl StateRecord {
    pub fn from_state(state: &dyn State, created_at: DateTime<Utc>) -> Self {
        Self {
            name: state.name().to_string(),
            reason: state.reason().map(ToString::to_string),
            data: state.serialize(),
            created_at,
        }
    }
}

/// Check a queue name: non-blank, lowercase letters, digits and underscores.
pub fn validate_queue_name(queue: &str) -> Result<(), JobError> {
    if queue.trim().is_empty() {
        return Err(JobError::MissingArgument("queue"));
    }

    if !QUEUE_NAME.is_match(queue) {
        return Err(JobError::InvalidArgument {
            argument: "queue",
            message: format!(
                "The queue name '{queue}' may only contain lowercase letters, digits and underscores"
            ),
        });
    }

    Ok(())
}

pub(crate) fn require_non_blank(argument: &'static str, value: &str) -> Result<(), JobError> {
    if value.trim().is_empty() {
        Err(JobError::MissingArgument(argument))
    } else {
        Ok(())
    }
}

pub(crate) fn serialize_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
