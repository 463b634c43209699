//! YAML configuration parsing.
//!
//! Parses the scheduler configuration and its job definitions.

use std::collections::HashSet;
use std::path::Path;

use crate::core::misfire::{CronMisfirePolicy, IntervalMisfirePolicy};

use super::error::ConfigError;
use super::types::SchedulerConfig;

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load scheduler configuration from a file.
    pub fn load_config(path: impl AsRef<Path>) -> Result<SchedulerConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SchedulerConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Parse scheduler configuration from a YAML string.
    pub fn parse_config(yaml: &str) -> Result<SchedulerConfig, ConfigError> {
        let config: SchedulerConfig = serde_yaml::from_str(yaml)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Validate a scheduler configuration.
    ///
    /// Unknown misfire policy names are not an error: the resolver falls
    /// back to the family default, so they only get a warning here.
    fn validate_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
        config.tz()?;

        if let Some(name) = &config.misfire.cron
            && name.parse::<CronMisfirePolicy>().is_err()
        {
            tracing::warn!(policy = %name, "Unknown cron misfire policy, using smart default");
        }
        if let Some(name) = &config.misfire.repeating
            && name.parse::<IntervalMisfirePolicy>().is_err()
        {
            tracing::warn!(policy = %name, "Unknown repeating misfire policy, using default");
        }

        let mut keys = HashSet::new();
        for job in &config.jobs {
            if job.subject.trim().is_empty() {
                return Err(ConfigError::MissingField("subject".into()));
            }
            if job.job_id.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "job_id (subject '{}')",
                    job.subject
                )));
            }

            let key = job.identity()?.key();
            if !keys.insert(key.clone()) {
                return Err(ConfigError::DuplicateJob(key));
            }
        }

        Ok(())
    }
}
