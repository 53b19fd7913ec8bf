pub mod counter;
pub mod job;
pub mod job_state;
pub mod queued_job;
pub mod set_entry;
