//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::schedule::ScheduleError;
use crate::core::types::{IdentityError, JobKey};

/// Errors that can occur when loading a scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Failed to parse YAML from a specific file.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configured timezone is not an IANA name.
    #[error(transparent)]
    InvalidTimezone(ScheduleError),

    /// Two jobs encode to the same key.
    #[error("duplicate job: {0}")]
    DuplicateJob(JobKey),

    #[error(transparent)]
    InvalidIdentity(#[from] IdentityError),

    /// A job parameter has no JSON representation.
    #[error("parameter '{key}' of job '{job}': {source}")]
    InvalidParameter {
        job: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(String),
}
