//! Streaming task orchestration and result aggregation.
//!
//! The engine tracks concurrently running generation tasks for one session,
//! supervises timeouts and orphans, retries and falls back when the
//! underlying generation call fails, and converts the raw streamed output
//! into an ordered set of classified phases with cleaned content and
//! confidence scores.

pub mod aggregate;
pub mod cache;
pub mod controller;
pub mod error;
pub mod event_bus;
pub mod orchestrator;
pub mod quick;
pub mod registry;
pub mod supervisor;

#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod testutil;

pub use aggregate::{Aggregator, ScoringConfig};
pub use cache::ResponseCache;
pub use controller::{ControllerConfig, SessionController, StreamState};
pub use error::{Result, SchemaflowError};
pub use event_bus::EventBus;
pub use orchestrator::{
    DesignOrchestrator, DesignOutcome, DesignOutput, GeneratedPhase, OrchestratorConfig,
};
pub use quick::QuickDesignClient;
pub use registry::TaskRegistry;
pub use supervisor::{OrphanSweeper, SupervisorConfig};
