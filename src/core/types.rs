//! Job identity types and the key codec.
//!
//! Every job lives in a single flat key space. The key multiplexes the
//! event subject, the caller's external id and the job kind:
//!
//! ```text
//! <subject>-<externalId>            cron
//! <subject>-<externalId>-repeat     repeating
//! <subject>-<externalId>-runonce    run once
//! ```
//!
//! The kind is recovered from the key by suffix, so an external id that
//! itself ends in `-repeat` or `-runonce` is misclassified. The format is
//! kept as is for compatibility with keys already held by trigger stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of the single job group every key belongs to.
pub const JOB_GROUP_NAME: &str = "default";

const REPEAT_SUFFIX: &str = "-repeat";
const RUN_ONCE_SUFFIX: &str = "-runonce";

/// Returned when a job identity is built from blank components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job identity: {0} cannot be blank")]
pub struct IdentityError(pub &'static str);

/// The kind of trigger a job key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// Cron-like recurrence (weekly patterns are lowered to this kind).
    Cron,
    /// Fixed interval repetition.
    Repeating,
    /// A single future instant.
    #[serde(rename = "RUNONCE")]
    RunOnce,
}

impl JobKind {
    /// Suffix appended to the key for this kind.
    pub fn suffix(&self) -> &'static str {
        match self {
            JobKind::Cron => "",
            JobKind::Repeating => REPEAT_SUFFIX,
            JobKind::RunOnce => RUN_ONCE_SUFFIX,
        }
    }

    /// Decode the kind from an encoded key.
    ///
    /// Suffixes are checked in order: run once, repeating, otherwise cron.
    pub fn from_key(key: &str) -> Self {
        if key.ends_with(RUN_ONCE_SUFFIX) {
            JobKind::RunOnce
        } else if key.ends_with(REPEAT_SUFFIX) {
            JobKind::Repeating
        } else {
            JobKind::Cron
        }
    }

    /// Upper-case label used in job listings.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Cron => "CRON",
            JobKind::Repeating => "REPEATING",
            JobKind::RunOnce => "RUNONCE",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// An encoded job key, as held by the trigger store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey(String);

impl JobKey {
    /// Wrap an already encoded key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind decoded from the key suffix.
    pub fn kind(&self) -> JobKind {
        JobKind::from_key(&self.0)
    }

    /// Substring match used by the bulk operations.
    ///
    /// Not anchored: `"barfoo-1"` matches the pattern `"foo"`. An empty
    /// pattern matches nothing.
    pub fn matches_prefix(&self, pattern: &str) -> bool {
        !pattern.is_empty() && self.0.contains(pattern)
    }

    /// Everything before the first `-`, used as the subject when the stored
    /// parameters don't carry one.
    pub fn subject_hint(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl From<&str> for JobKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subject, external id and kind of one logical job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobIdentity {
    subject: String,
    external_id: String,
    kind: JobKind,
}

impl JobIdentity {
    /// Create an identity, rejecting blank components.
    pub fn new(
        subject: impl Into<String>,
        external_id: impl Into<String>,
        kind: JobKind,
    ) -> Result<Self, IdentityError> {
        let subject = subject.into();
        let external_id = external_id.into();
        if subject.trim().is_empty() {
            return Err(IdentityError("subject"));
        }
        if external_id.trim().is_empty() {
            return Err(IdentityError("external id"));
        }
        Ok(Self {
            subject,
            external_id,
            kind,
        })
    }

    /// Identity of a cron job.
    pub fn cron(
        subject: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        Self::new(subject, external_id, JobKind::Cron)
    }

    /// Identity of a repeating job.
    pub fn repeating(
        subject: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        Self::new(subject, external_id, JobKind::Repeating)
    }

    /// Identity of a run-once job.
    pub fn run_once(
        subject: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        Self::new(subject, external_id, JobKind::RunOnce)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Encode into the store key.
    pub fn key(&self) -> JobKey {
        JobKey(format!(
            "{}-{}{}",
            self.subject,
            self.external_id,
            self.kind.suffix()
        ))
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
