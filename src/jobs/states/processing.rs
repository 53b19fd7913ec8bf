use chrono::{DateTime, Utc};

use super::{require_non_blank, serialize_timestamp, State, StateData};
use crate::jobs::JobError;

/// A worker has picked the job up and is running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingState {
    server_id: String,
    worker_id: String,
    started_at: DateTime<Utc>,
}

impl ProcessingState {
    pub const NAME: &'static str = "Processing";

    pub fn new(
        server_id: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Result<Self, JobError> {
        let server_id = server_id.into();
        let worker_id = worker_id.into();
        require_non_blank("server_id", &server_id)?;
        require_non_blank("worker_id", &worker_id)?;

        Ok(Self {
            server_id,
            worker_id,
            started_at: Utc::now(),
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl State for ProcessingState {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn serialize(&self) -> StateData {
        StateData::from([
            ("StartedAt".to_string(), serialize_timestamp(&self.started_at)),
            ("ServerId".to_string(), self.server_id.clone()),
            ("WorkerId".to_string(), self.worker_id.clone()),
        ])
    }
}
