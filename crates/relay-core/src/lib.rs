//! Relay Core — orchestration and health routing for lifecycle engines.
//!
//! This crate holds everything the coordinator does, independent of how it
//! is driven:
//!
//! - endpoint registry and TTL-cached health monitoring
//! - workflow selection (remote or keyword classifier)
//! - pipeline execution with retries, backoff and partial-failure handling
//! - fallback responses and a bounded alert store
//!
//! The `relay` CLI (via `relay-cli`) is one front end; anything that can hold
//! an `Arc<Coordinator>` is another.

pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod health;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod selector;
pub mod sessions;
pub mod snapshot;

// Convenience re-exports
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, ProcessResponse};
pub use error::{ConfigError, EngineError, FailureReason, StepErrorKind};
