//! # chainfuse-core
//!
//! Deterministic prompt-chain resolution and multi-model fusion.
//!
//! A chain is an ordered list of prompt templates. Each step is resolved
//! against a context and the outputs of earlier steps, sent to a model, and
//! its response recorded (as parsed JSON when the model returned JSON). A
//! fusion run executes the same chain on several models and lets an
//! evaluator pick a winner.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same context, chain and collaborators always produce the same result
//! 2. **No I/O**: Models and evaluators are supplied by the caller
//! 3. **Isolated**: A model only ever sees its own history
//! 4. **All-or-nothing**: A failing step fails the run; no partial results
//!
//! ## Example
//!
//! ```rust
//! use chainfuse_core::{run_chain, Context, ExternalError, StepOutput};
//!
//! let context = Context::new().with("topic", "tides");
//! let model = |prompt: &str| -> Result<String, ExternalError> {
//!     if prompt.starts_with("Outline") {
//!         Ok(r#"{"title": "Why tides happen"}"#.to_string())
//!     } else {
//!         Ok(format!("Draft for: {}", prompt))
//!     }
//! };
//!
//! let run = run_chain(
//!     &context,
//!     &model,
//!     &["Outline an essay on {{topic}}", "Write {{output[-1].title}}"],
//! )?;
//!
//! assert!(run.outputs[0].is_structured());
//! assert_eq!(run.outputs[1], StepOutput::text("Draft for: Write Why tides happen"));
//! # Ok::<(), chainfuse_core::ChainError>(())
//! ```

pub mod chain;
pub mod definition;
pub mod fusion;
pub mod output;
pub mod render;
pub mod result;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use chain::{Chain, ChainError, ChainRun, ChainRunner, Model};
pub use definition::{ChainDefinition, DefinitionError};
pub use fusion::{Evaluation, Evaluator, FusionError, FusionRunner};
pub use output::parse_output;
pub use render::render_delimited;
pub use result::FusionChainResult;
pub use template::{resolve, ResolutionError, Template};
pub use types::{Context, StepOutput};

/// Error raised by a caller-supplied model, evaluator or name resolver.
///
/// Passed through unchanged so callers can downcast to their own type.
pub type ExternalError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Run a list of prompt templates against one model.
///
/// Templates are parsed before the first model call.
pub fn run_chain<M, S>(context: &Context, model: &M, prompts: &[S]) -> Result<ChainRun, ChainError>
where
    M: Model + ?Sized,
    S: AsRef<str>,
{
    let chain = Chain::new(prompts)?;
    ChainRunner::new().run(context, model, &chain)
}

/// Run a list of prompt templates across several models and aggregate.
///
/// # Arguments
///
/// * `context` - Variables for `{{name}}` placeholders
/// * `models` - Models to run, in result order
/// * `prompts` - Prompt templates in execution order
/// * `evaluator` - Scores the final outputs and picks the top response
/// * `model_name` - Display name for each model
pub fn run_fusion<M, S, E, N, NE>(
    context: &Context,
    models: &[M],
    prompts: &[S],
    evaluator: &E,
    model_name: N,
) -> Result<FusionChainResult, FusionError>
where
    M: Model,
    S: AsRef<str>,
    E: Evaluator + ?Sized,
    N: Fn(&M) -> Result<String, NE>,
    NE: Into<ExternalError>,
{
    let chain = Chain::new(prompts).map_err(FusionError::InvalidChain)?;
    FusionRunner::new().run(context, models, &chain, evaluator, model_name)
}
