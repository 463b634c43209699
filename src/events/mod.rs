//! Lifecycle events and event handling.
//!
//! The scheduling engine emits an event for every change it makes to the
//! trigger store. Whoever drives the store's firing emits
//! [`Event::TriggerFired`] with the payload that came due.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::payload::EventPayload;
use crate::core::types::{JobKey, JobKind};

/// Lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A job was registered (or replaced) in the trigger store.
    JobScheduled {
        key: JobKey,
        kind: JobKind,
        first_fire_time: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },

    /// A job was removed from the trigger store.
    JobUnscheduled {
        key: JobKey,
        timestamp: DateTime<Utc>,
    },

    /// A cron job got a new recurrence expression.
    JobRescheduled {
        key: JobKey,
        expression: String,
        timestamp: DateTime<Utc>,
    },

    /// A trigger came due.
    TriggerFired {
        key: JobKey,
        fire_time: DateTime<Utc>,
        payload: EventPayload,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::JobScheduled { timestamp, .. } => *timestamp,
            Event::JobUnscheduled { timestamp, .. } => *timestamp,
            Event::JobRescheduled { timestamp, .. } => *timestamp,
            Event::TriggerFired { timestamp, .. } => *timestamp,
        }
    }

    /// Key of the job the event is about.
    pub fn key(&self) -> &JobKey {
        match self {
            Event::JobScheduled { key, .. }
            | Event::JobUnscheduled { key, .. }
            | Event::JobRescheduled { key, .. }
            | Event::TriggerFired { key, .. } => key,
        }
    }

    pub fn job_scheduled(
        key: JobKey,
        first_fire_time: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Event::JobScheduled {
            kind: key.kind(),
            key,
            first_fire_time,
            timestamp,
        }
    }

    pub fn job_unscheduled(key: JobKey, timestamp: DateTime<Utc>) -> Self {
        Event::JobUnscheduled { key, timestamp }
    }

    pub fn job_rescheduled(key: JobKey, expression: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Event::JobRescheduled {
            key,
            expression: expression.into(),
            timestamp,
        }
    }

    pub fn trigger_fired(
        key: JobKey,
        fire_time: DateTime<Utc>,
        payload: EventPayload,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Event::TriggerFired {
            key,
            fire_time,
            payload,
            timestamp,
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all registered handlers, in registration order.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
