use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    job_id::JobId,
    states::{
        DeletedStateHandler, EnqueuedStateHandler, ScheduledStateHandler, State, StateRecord,
        SucceededStateHandler,
    },
    transaction::Transaction,
    JobError,
};

/// Everything a handler gets to know about the transition it takes part in.
#[derive(Debug, Clone, Copy)]
pub struct ApplyStateContext<'a> {
    job_id: JobId,
    old_state: Option<&'a StateRecord>,
    new_state: &'a dyn State,
}

impl<'a> ApplyStateContext<'a> {
    pub const fn new(
        job_id: JobId,
        old_state: Option<&'a StateRecord>,
        new_state: &'a dyn State,
    ) -> Self {
        Self {
            job_id,
            old_state,
            new_state,
        }
    }

    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// The state the job is leaving. `None` when the job is being created.
    pub const fn old_state(&self) -> Option<&'a StateRecord> {
        self.old_state
    }

    pub const fn new_state(&self) -> &'a dyn State {
        self.new_state
    }

    /// Recover the concrete type of the new state.
    ///
    /// A mismatch means a handler sits in the wrong registry slot, which is
    /// reported as [`JobError::Configuration`].
    pub fn new_state_as<T: State + 'static>(&self) -> Result<&'a T, JobError> {
        self.new_state
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| {
                JobError::Configuration(format!(
                    "handler expected a `{}` but job {} is entering `{}` ({:?})",
                    std::any::type_name::<T>(),
                    self.job_id,
                    self.new_state.name(),
                    self.new_state,
                ))
            })
    }
}

/// Storage side effects of entering (and leaving) one state.
///
/// Handlers only ever write through the transaction they are given so that
/// their effects commit together with the job's state record.
pub trait StateHandler: Send + Sync {
    /// Name of the state this handler is registered under.
    fn state_name(&self) -> &'static str;

    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError>;

    /// Undo the side effects of [`StateHandler::apply`] when a job leaves the
    /// state. Called with the context of the transition away from it.
    fn unapply(
        &self,
        _context: &ApplyStateContext<'_>,
        _transaction: &mut Transaction<'_>,
    ) -> Result<(), JobError> {
        Ok(())
    }
}

/// Handlers keyed by state name. Built once during setup and shared
/// read-only between clients afterwards.
#[derive(Clone, Default)]
pub struct StateHandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn StateHandler>>,
}

impl StateHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the handlers of every built-in state.
    pub fn with_default_handlers() -> Self {
        let defaults: [Arc<dyn StateHandler>; 4] = [
            Arc::new(EnqueuedStateHandler),
            Arc::new(ScheduledStateHandler),
            Arc::new(SucceededStateHandler),
            Arc::new(DeletedStateHandler),
        ];

        Self {
            handlers: defaults
                .into_iter()
                .map(|handler| (handler.state_name(), handler))
                .collect(),
        }
    }

    /// Register a handler under its state name.
    ///
    /// Each state has at most one handler; registering a second one for the
    /// same name is a [`JobError::Configuration`].
    pub fn register<H: StateHandler + 'static>(&mut self, handler: H) -> Result<(), JobError> {
        let name = handler.state_name();
        if self.handlers.contains_key(name) {
            return Err(JobError::Configuration(format!(
                "a handler for state `{name}` is already registered"
            )));
        }

        debug!("Registering state handler for `{}`", name);
        self.handlers.insert(name, Arc::new(handler));
        Ok(())
    }

    /// Drop the handler for a state, e.g. to replace a built-in one.
    pub fn unregister(&mut self, state_name: &str) -> bool {
        self.handlers.remove(state_name).is_some()
    }

    pub fn get(&self, state_name: &str) -> Option<&dyn StateHandler> {
        self.handlers.get(state_name).map(|handler| handler.as_ref())
    }

    pub fn state_names(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::states::{DeletedState, EnqueuedState, ScheduledState, SucceededState};
    use crate::storage::memory::MemoryStorage;

    struct AuditHandler;

    impl StateHandler for AuditHandler {
        fn state_name(&self) -> &'static str {
            "Enqueued"
        }

        fn apply(
            &self,
            context: &ApplyStateContext<'_>,
            transaction: &mut Transaction<'_>,
        ) -> Result<(), JobError> {
            transaction.add_to_set("audit", &context.job_id().to_string(), 0.0);
            Ok(())
        }
    }

    #[test]
    fn test_default_registry_covers_built_in_states() {
        let registry = StateHandlerRegistry::with_default_handlers();

        for name in [
            EnqueuedState::NAME,
            ScheduledState::NAME,
            SucceededState::NAME,
            DeletedState::NAME,
        ] {
            let handler = registry.get(name).expect("handler should be registered");
            assert_eq!(handler.state_name(), name);
        }

        assert!(registry.get("Processing").is_none());
        assert!(registry.get("Failed").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_a_configuration_error() {
        let mut registry = StateHandlerRegistry::with_default_handlers();

        let result = registry.register(AuditHandler);

        assert!(matches!(result, Err(JobError::Configuration(_))));
    }

    #[test]
    fn test_handler_can_be_replaced_after_unregistering() {
        let mut registry = StateHandlerRegistry::with_default_handlers();

        assert!(registry.unregister(EnqueuedState::NAME));
        registry
            .register(AuditHandler)
            .expect("Failed to register handler");

        let storage = MemoryStorage::new();
        let mut transaction = Transaction::new(&storage);
        let state = EnqueuedState::new();
        let context = ApplyStateContext::new(JobId::new(), None, &state);

        registry
            .get(EnqueuedState::NAME)
            .expect("handler should be registered")
            .apply(&context, &mut transaction)
            .expect("Failed to apply state");

        assert_eq!(transaction.operations().len(), 1);
    }

    #[test]
    fn test_new_state_as_reports_mismatch() {
        let state = ScheduledState::after(chrono::Duration::minutes(1)).expect("valid delay");
        let context = ApplyStateContext::new(JobId::new(), None, &state);

        assert!(context.new_state_as::<ScheduledState>().is_ok());
        assert!(matches!(
            context.new_state_as::<EnqueuedState>(),
            Err(JobError::Configuration(_))
        ));
    }
}
