use std::{env, str::FromStr as _, sync::Arc};

use config_rs::Config as ConfigRs;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::{
    config::{Config, StorageConfig},
    database::setup_database,
    environment::Environment,
    jobs::{
        background_job_client::BackgroundJobClient, state_handler::StateHandlerRegistry, JobError,
    },
    setup_tracing::setup_tracing,
    storage::{database::DatabaseStorage, memory::MemoryStorage, JobStorage},
};

const ENVIRONMENT_VARIABLE: &str = "APP_ENVIRONMENT";

#[derive(Debug, Error)]
pub enum BootError {
    #[error("Failed to read configuration: {0}")]
    Config(#[from] config_rs::ConfigError),
    #[error("Failed to set up database: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Invalid job settings: {0}")]
    Jobs(#[from] JobError),
}

/// Read the configuration of the current environment, install tracing and
/// build a client with the built-in state handlers.
pub async fn boot() -> Result<BackgroundJobClient, BootError> {
    let environment = set_environment();
    let config = read_config(&environment)?;

    setup_tracing(&config.tracing.log_level);

    debug!("Environment set to: {:?}", environment);
    trace!("Configuration loaded: {:?}", config);

    build_client(&config, StateHandlerRegistry::with_default_handlers()).await
}

#[must_use]
pub fn set_environment() -> Environment {
    env::var(ENVIRONMENT_VARIABLE)
        .ok()
        .and_then(|s| Environment::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn read_config(environment: &Environment) -> Result<Config, config_rs::ConfigError> {
    let config_file_name = environment.config_file();

    trace!("Reading configuration from: {}", config_file_name);

    ConfigRs::builder()
        .add_source(config_rs::File::with_name(&config_file_name))
        .add_source(config_rs::Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()
}

/// Connect the configured storage and wrap it in a client.
pub async fn build_client(
    config: &Config,
    handlers: StateHandlerRegistry,
) -> Result<BackgroundJobClient, BootError> {
    let job_expiration = config.jobs.job_expiration().ok_or_else(|| {
        JobError::Configuration(format!(
            "job expiration of {}s is out of range",
            config.jobs.job_expiration_seconds
        ))
    })?;

    let storage: Arc<dyn JobStorage> = match &config.storage {
        StorageConfig::Memory => {
            info!("Using in-memory job storage");
            Arc::new(MemoryStorage::new())
        }
        StorageConfig::Database(db_config) => {
            let connection = setup_database(db_config).await?;
            info!("Using database job storage");
            Arc::new(DatabaseStorage::new(connection))
        }
    };

    Ok(BackgroundJobClient::new(storage, handlers).with_job_expiration(job_expiration)?)
}
