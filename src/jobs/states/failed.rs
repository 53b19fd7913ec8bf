use chrono::{DateTime, Utc};

use super::{require_non_blank, serialize_timestamp, State, StateData};
use crate::jobs::JobError;

/// Running the job raised an error. Not final: the job can be retried,
/// requeued or deleted from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedState {
    failed_at: DateTime<Utc>,
    error_type: String,
    error_message: String,
    error_details: Option<String>,
}

impl FailedState {
    pub const NAME: &'static str = "Failed";

    pub fn new(
        error_type: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Result<Self, JobError> {
        let error_type = error_type.into();
        require_non_blank("error_type", &error_type)?;

        Ok(Self {
            failed_at: Utc::now(),
            error_type,
            error_message: error_message.into(),
            error_details: None,
        })
    }

    /// Build from any error, recording its source chain as details.
    pub fn from_error<E: std::error::Error + 'static>(error: &E) -> Self {
        let mut details = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            details.push(cause.to_string());
            source = cause.source();
        }

        Self {
            failed_at: Utc::now(),
            error_type: std::any::type_name::<E>().to_string(),
            error_message: error.to_string(),
            error_details: (!details.is_empty()).then(|| details.join("\n")),
        }
    }

    #[must_use]
    pub fn with_details(self, details: impl Into<String>) -> Self {
        Self {
            error_details: Some(details.into()),
            ..self
        }
    }

    pub const fn failed_at(&self) -> DateTime<Utc> {
        self.failed_at
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }
}

impl State for FailedState {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn serialize(&self) -> StateData {
        let mut data = StateData::from([
            ("FailedAt".to_string(), serialize_timestamp(&self.failed_at)),
            ("ExceptionType".to_string(), self.error_type.clone()),
            ("ExceptionMessage".to_string(), self.error_message.clone()),
        ]);

        if let Some(details) = &self.error_details {
            data.insert("ExceptionDetails".to_string(), details.clone());
        }

        data
    }

    fn reason(&self) -> Option<&str> {
        Some("An error occurred during job execution")
    }
}
