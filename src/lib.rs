//! Turnstile - Sliding Window Admission Control
//!
//! This crate decides, per client and per resource, whether a request may
//! proceed so that no client exceeds the configured rate on any resource.
//! Limits are enforced over a sliding time window and resolved from a
//! registry of per-resource rules with a process-wide default.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
