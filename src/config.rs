use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tracing: TracingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TracingConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process storage, lost when the process exits
    Memory,
    /// Tables managed through `SeaORM`
    Database(DatabaseConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    /// Create or update the job tables on startup (default: true)
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How long jobs in a final state are kept, in seconds (default: 86400 = 1 day)
    #[serde(default = "default_job_expiration")]
    pub job_expiration_seconds: u64,
}

impl JobsConfig {
    /// `None` when the configured number of seconds does not fit a
    /// [`TimeDelta`].
    pub fn job_expiration(&self) -> Option<TimeDelta> {
        i64::try_from(self.job_expiration_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            job_expiration_seconds: default_job_expiration(),
        }
    }
}

const fn default_run_migrations() -> bool {
    true
}

const fn default_job_expiration() -> u64 {
    86_400 // 1 day
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_expiration_defaults_to_one_day() {
        assert_eq!(
            JobsConfig::default().job_expiration(),
            Some(TimeDelta::days(1))
        );
    }

    #[test]
    fn test_oversized_job_expiration_is_not_representable() {
        let config = JobsConfig {
            job_expiration_seconds: u64::MAX,
        };
        assert_eq!(config.job_expiration(), None);
    }

    #[test]
    fn test_storage_config_is_tagged() {
        let config: StorageConfig = serde_json::from_value(serde_json::json!({
            "type": "database",
            "url": "sqlite::memory:",
            "pool_size": 1
        }))
        .expect("Failed to parse storage config");

        match config {
            StorageConfig::Database(database) => {
                assert_eq!(database.url, "sqlite::memory:");
                assert!(database.run_migrations);
            }
            StorageConfig::Memory => panic!("expected database storage"),
        }
    }
}
