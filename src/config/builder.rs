//! Job requests from YAML configuration.
//!
//! Converts [`JobDefinition`]s into the payload and trigger spec pairs the
//! scheduling engine accepts.

use std::collections::HashMap;

use crate::core::payload::EventPayload;
use crate::core::trigger::TriggerSpec;

use super::error::ConfigError;
use super::types::{JobDefinition, SchedulerConfig};

/// A job ready to be handed to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub payload: EventPayload,
    pub spec: TriggerSpec,
}

/// Builder for creating job requests from configuration.
pub struct JobRequestBuilder;

impl JobRequestBuilder {
    /// Build a request from one job definition.
    pub fn build(definition: &JobDefinition) -> Result<JobRequest, ConfigError> {
        // Reject blank components before they reach the key codec
        definition.identity()?;

        let mut parameters = HashMap::new();
        for (key, value) in &definition.parameters {
            // Convert serde_yaml::Value to serde_json::Value
            let json_value =
                serde_json::to_value(value).map_err(|source| ConfigError::InvalidParameter {
                    job: format!("{}-{}", definition.subject, definition.job_id),
                    key: key.clone(),
                    source,
                })?;
            parameters.insert(key.clone(), json_value);
        }

        let payload = EventPayload {
            subject: definition.subject.clone(),
            parameters,
        }
        .with_job_id(&definition.job_id);

        Ok(JobRequest {
            payload,
            spec: definition.schedule.clone(),
        })
    }

    /// Build requests for every job in the configuration, in file order.
    pub fn build_all(config: &SchedulerConfig) -> Result<Vec<JobRequest>, ConfigError> {
        config.jobs.iter().map(Self::build).collect()
    }
}
