//! Multi-model fusion.
//!
//! The same chain runs once per model, each model seeing only its own
//! history. The final output of every model is handed to an [`Evaluator`]
//! exactly once, and everything is bundled into a [`FusionChainResult`].
//!
//! Models are independent, so callers may run them concurrently (see
//! `chainfuse-runtime`); this runner executes them in order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::{Chain, ChainError, ChainRun, ChainRunner, Model};
use crate::result::FusionChainResult;
use crate::types::{Context, StepOutput};
use crate::ExternalError;

/// Verdict returned by an evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// The winning response
    pub top_response: StepOutput,

    /// One score per model, in model order
    pub scores: Vec<f64>,
}

impl Evaluation {
    pub fn new(top_response: StepOutput, scores: Vec<f64>) -> Self {
        Self {
            top_response,
            scores,
        }
    }
}

/// Scores the final output of each model and names a winner.
///
/// Implementations should be pure functions of their input; inject any
/// randomness explicitly. Scores are not normalized here.
pub trait Evaluator {
    fn evaluate(&self, final_outputs: &[StepOutput]) -> Result<Evaluation, ExternalError>;
}

impl<F> Evaluator for F
where
    F: Fn(&[StepOutput]) -> Result<Evaluation, ExternalError>,
{
    fn evaluate(&self, final_outputs: &[StepOutput]) -> Result<Evaluation, ExternalError> {
        self(final_outputs)
    }
}

/// Errors that abort a fusion run. No partial aggregate is ever returned.
#[derive(Error, Debug)]
pub enum FusionError {
    #[error("no models to run")]
    NoModels,

    #[error("chain has no prompts")]
    EmptyChain,

    #[error("invalid chain: {0}")]
    InvalidChain(#[source] ChainError),

    #[error("model {index}: {source}")]
    Chain {
        index: usize,
        #[source]
        source: ChainError,
    },

    #[error(transparent)]
    Evaluator(ExternalError),

    #[error(transparent)]
    ModelName(ExternalError),

    #[error("evaluator returned {scores} scores for {models} models")]
    ScoreCountMismatch { scores: usize, models: usize },
}

/// Reject inputs that leave the aggregate undefined.
pub fn check_inputs(model_count: usize, chain: &Chain) -> Result<(), FusionError> {
    if model_count == 0 {
        return Err(FusionError::NoModels);
    }
    if chain.is_empty() {
        return Err(FusionError::EmptyChain);
    }
    Ok(())
}

/// Call the evaluator once over the final output of every run.
pub fn evaluate_runs<E>(runs: &[ChainRun], evaluator: &E) -> Result<Evaluation, FusionError>
where
    E: Evaluator + ?Sized,
{
    let final_outputs = runs
        .iter()
        .map(|run| run.final_output().cloned().ok_or(FusionError::EmptyChain))
        .collect::<Result<Vec<_>, _>>()?;

    let evaluation = evaluator.evaluate(&final_outputs).map_err(|e| {
        tracing::warn!(error = %e, "Evaluator failed");
        FusionError::Evaluator(e)
    })?;

    if evaluation.scores.len() != final_outputs.len() {
        return Err(FusionError::ScoreCountMismatch {
            scores: evaluation.scores.len(),
            models: final_outputs.len(),
        });
    }

    Ok(evaluation)
}

/// Runs one chain across several models and aggregates the results.
pub struct FusionRunner {
    chain_runner: ChainRunner,
}

impl FusionRunner {
    pub fn new() -> Self {
        Self {
            chain_runner: ChainRunner::new(),
        }
    }

    /// Run `chain` on every model, evaluate, and aggregate.
    ///
    /// `model_name` labels each model in the result; it has no effect on
    /// execution.
    pub fn run<M, E, N, NE>(
        &self,
        context: &Context,
        models: &[M],
        chain: &Chain,
        evaluator: &E,
        model_name: N,
    ) -> Result<FusionChainResult, FusionError>
    where
        M: Model,
        E: Evaluator + ?Sized,
        N: Fn(&M) -> Result<String, NE>,
        NE: Into<ExternalError>,
    {
        check_inputs(models.len(), chain)?;

        let runs = models
            .iter()
            .enumerate()
            .map(|(index, model)| {
                tracing::debug!(index, "Running chain for model");
                self.chain_runner
                    .run(context, model, chain)
                    .map_err(|source| FusionError::Chain { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.finish(runs, models, evaluator, model_name)
    }

    /// Like [`run`](Self::run) but with a `(model, prompt) -> response`
    /// function shared by all models.
    pub fn run_with<M, F, PE, E, N, NE>(
        &self,
        context: &Context,
        models: &[M],
        prompt_fn: F,
        chain: &Chain,
        evaluator: &E,
        model_name: N,
    ) -> Result<FusionChainResult, FusionError>
    where
        F: Fn(&M, &str) -> Result<String, PE>,
        PE: Into<ExternalError>,
        E: Evaluator + ?Sized,
        N: Fn(&M) -> Result<String, NE>,
        NE: Into<ExternalError>,
    {
        check_inputs(models.len(), chain)?;

        let runs = models
            .iter()
            .enumerate()
            .map(|(index, model)| {
                tracing::debug!(index, "Running chain for model");
                self.chain_runner
                    .run_with(context, model, &prompt_fn, chain)
                    .map_err(|source| FusionError::Chain { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.finish(runs, models, evaluator, model_name)
    }

    fn finish<M, E, N, NE>(
        &self,
        runs: Vec<ChainRun>,
        models: &[M],
        evaluator: &E,
        model_name: N,
    ) -> Result<FusionChainResult, FusionError>
    where
        E: Evaluator + ?Sized,
        N: Fn(&M) -> Result<String, NE>,
        NE: Into<ExternalError>,
    {
        let evaluation = evaluate_runs(&runs, evaluator)?;

        let names = models
            .iter()
            .map(|model| model_name(model).map_err(|e| FusionError::ModelName(e.into())))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(models = names.len(), steps = runs[0].len(), "Fusion run complete");

        Ok(FusionChainResult::from_runs(runs, names, evaluation))
    }
}

impl Default for FusionRunner {
    fn default() -> Self {
        Self::new()
    }
}
