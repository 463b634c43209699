//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the scheduler and its
//! jobs, and the [`SettingsSource`] the engine reads misfire policies from.

mod builder;
mod error;
mod types;
mod yaml;

pub use builder::{JobRequest, JobRequestBuilder};
pub use error::ConfigError;
pub use types::{JobDefinition, MisfireConfig, SchedulerConfig};
pub use yaml::YamlLoader;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::misfire::{CRON_MISFIRE_POLICY_KEY, REPEATING_MISFIRE_POLICY_KEY};

/// Key/value settings the scheduler consults at registration time.
pub trait SettingsSource: Send + Sync {
    /// Value of `key`, if set.
    fn property(&self, key: &str) -> Option<String>;
}

impl SettingsSource for SchedulerConfig {
    fn property(&self, key: &str) -> Option<String> {
        match key {
            CRON_MISFIRE_POLICY_KEY => self.misfire.cron.clone(),
            REPEATING_MISFIRE_POLICY_KEY => self.misfire.repeating.clone(),
            _ => None,
        }
    }
}

impl SettingsSource for HashMap<String, String> {
    fn property(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Settings that can change while the scheduler runs.
impl SettingsSource for RwLock<HashMap<String, String>> {
    fn property(&self, key: &str) -> Option<String> {
        let map = self.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).cloned()
    }
}
