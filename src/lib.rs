//! Jobflow - background job state machine
//!
//! This crate drives background jobs through named lifecycle states. Every
//! transition resolves the handler registered for the target state, lets it
//! append its side effects to a storage transaction and commits those effects
//! together with the job's new state record.

#![allow(missing_docs)]

pub mod boot;
pub mod config;
pub mod database;
pub mod environment;
pub mod jobs;
pub mod setup_tracing;
pub mod storage;


pub use jobs::{
    background_job_client::{BackgroundJobClient, JobCreator},
    client_api::BackgroundJobClientExt,
    invocation::Invocation,
    job_id::JobId,
    state_handler::{ApplyStateContext, StateHandler, StateHandlerRegistry},
    states::{
        DeletedState, EnqueuedState, FailedState, ProcessingState, ScheduledState, State,
        StateData, StateRecord, SucceededState,
    },
    transaction::{Transaction, WriteOp},
    Job, JobError,
};
pub use storage::{memory::MemoryStorage, JobStorage, StorageError};
