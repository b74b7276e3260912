//! # chainfuse-runtime
//!
//! Async, concurrent fusion runs for chainfuse.
//!
//! `chainfuse-core` runs models one after another through a synchronous
//! `Model` trait. This crate runs the same chains against async
//! [`ModelClient`]s, several models at once, while keeping results in
//! registration order.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chainfuse_runtime::{FusionOrchestrator, RuntimeConfig};
//!
//! let orchestrator = FusionOrchestrator::builder()
//!     .model("fast", fast_client)
//!     .model("careful", careful_client)
//!     .config(RuntimeConfig::from_yaml_file("runtime.yaml")?)
//!     .build()?;
//!
//! let outcome = orchestrator.run(&context, &chain, &evaluator).await?;
//! println!("{}", outcome.result.to_json_pretty()?);
//! ```

pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod usage;

pub use config::{ConfigError, RuntimeConfig};
pub use orchestrator::{FusionOrchestrator, FusionOrchestratorBuilder, RuntimeError, RuntimeResult};
pub use providers::{Completion, ModelClient, ModelError, ModelRegistry, TokenUsage};
pub use usage::{ModelUsage, UsageTracker};
