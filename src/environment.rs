use strum::{Display, EnumString};

/// Deployment environment, read from `APP_ENVIRONMENT`.
///
/// Each variant has its own file under `config/`; unknown or missing values
/// fall back to [`Environment::Development`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Path of the configuration file, without extension.
    pub fn config_file(&self) -> String {
        format!("config/{self}")
    }
}
