//! Core types: job identity, payloads, triggers and misfire policies.

pub mod clock;
pub mod misfire;
pub mod payload;
pub mod schedule;
pub mod trigger;
pub mod types;
