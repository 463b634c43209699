//! Event payloads redelivered when a trigger fires.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Parameter key carrying the caller-supplied job id.
pub const JOB_ID_KEY: &str = "JobID";

/// Parameter key carrying the event subject once flattened into the store.
pub const EVENT_TYPE_KEY: &str = "eventType";

/// Subject plus parameters of the event raised on each fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub subject: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

impl EventPayload {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            parameters: HashMap::new(),
        }
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set the reserved job id parameter.
    pub fn with_job_id(self, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        self.with_parameter(JOB_ID_KEY, job_id)
    }

    /// The job id parameter, if present. Numbers are accepted as well as strings.
    pub fn job_id(&self) -> Option<String> {
        match self.parameters.get(JOB_ID_KEY)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Flatten into the parameter map kept by the trigger store.
    pub fn to_job_data(&self) -> HashMap<String, Value> {
        let mut data = self.parameters.clone();
        data.insert(EVENT_TYPE_KEY.to_string(), Value::String(self.subject.clone()));
        data
    }

    /// Rebuild the payload delivered on fire. The job id stays in the
    /// parameters so listeners can correlate.
    pub fn from_job_data(data: &HashMap<String, Value>, fallback_subject: &str) -> Self {
        let subject = data
            .get(EVENT_TYPE_KEY)
            .and_then(Value::as_str)
            .unwrap_or(fallback_subject)
            .to_string();
        let parameters = data
            .iter()
            .filter(|(k, _)| k.as_str() != EVENT_TYPE_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            subject,
            parameters,
        }
    }

    /// Rebuild the payload for display, with all bookkeeping keys removed.
    pub fn for_display(data: &HashMap<String, Value>, fallback_subject: &str) -> Self {
        let mut payload = Self::from_job_data(data, fallback_subject);
        payload.parameters.remove(JOB_ID_KEY);
        payload
    }
}
