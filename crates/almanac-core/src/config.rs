use anyhow::Result;
use config::Config;
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub query: QueryConfig,
    pub expansion: ExpansionConfig,
    pub logging: LoggingConfig,
}

/// Limits applied to a single calendar-query or calendar-multiget evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Maximum number of objects whose calendar data may be returned by one query.
    pub max_results_with_data: usize,
    /// Maximum number of hrefs a multiget may name when calendar data is requested.
    pub max_multiget_hrefs_with_data: usize,
    /// Number of objects evaluated concurrently.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpansionConfig {
    /// Upper bound on occurrences collected for one component when the
    /// queried window has no end.
    pub max_instances: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            query: QueryConfig {
                max_results_with_data: 1000,
                max_multiget_hrefs_with_data: 5000,
                concurrency: 8,
            },
            expansion: ExpansionConfig {
                max_instances: 10_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `.env` file and environment variables into a `Settings`.
    /// Environment variables take precedence over `config.toml` values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails,
    /// or if a loaded limit is zero.
    pub fn load() -> Result<Self> {
        Self::from_sources(
            config::File::with_name("config.toml").required(false),
            Self::environment(),
        )
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("ALMANAC")
            .prefix_separator("_")
            .separator("__")
            .convert_case(config::Case::Snake)
            .ignore_empty(true)
            .try_parsing(true)
    }

    fn from_sources<F>(file: F, environment: config::Environment) -> Result<Self>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let defaults = Self::default();
        let settings = Config::builder()
            .set_default(
                "query.max_results_with_data",
                u64::try_from(defaults.query.max_results_with_data)?,
            )?
            .set_default(
                "query.max_multiget_hrefs_with_data",
                u64::try_from(defaults.query.max_multiget_hrefs_with_data)?,
            )?
            .set_default("query.concurrency", u64::try_from(defaults.query.concurrency)?)?
            .set_default(
                "expansion.max_instances",
                u64::try_from(defaults.expansion.max_instances)?,
            )?
            .set_default("logging.level", defaults.logging.level)?
            // TOML file
            .add_source(file)
            // Environment last, so it wins
            .add_source(environment)
            .build()?
            .try_deserialize::<Settings>()?;

        settings.validate()?;
        Ok(settings)
    }

    /// ## Summary
    /// Checks that every limit is usable.
    ///
    /// ## Errors
    /// Returns `CoreError::ConfigError` when a limit is zero.
    pub fn validate(&self) -> CoreResult<()> {
        if self.query.concurrency == 0 {
            return Err(CoreError::ConfigError(
                "query.concurrency must be at least 1".to_string(),
            ));
        }
        if self.expansion.max_instances == 0 {
            return Err(CoreError::ConfigError(
                "expansion.max_instances must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}
