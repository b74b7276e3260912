//! Single-model sequential chain execution.
//!
//! Each step resolves its template against the context and the outputs the
//! same model has produced so far, calls the model, and records both the
//! filled prompt and the parsed response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::output::parse_output;
use crate::template::{ResolutionError, Template};
use crate::types::{Context, StepOutput};
use crate::ExternalError;

/// A text-generation capability.
///
/// Closures of the form `Fn(&str) -> Result<String, ExternalError>` implement
/// this directly.
pub trait Model {
    /// Send a fully resolved prompt and return the raw response.
    fn invoke(&self, prompt: &str) -> Result<String, ExternalError>;
}

impl<F> Model for F
where
    F: Fn(&str) -> Result<String, ExternalError>,
{
    fn invoke(&self, prompt: &str) -> Result<String, ExternalError> {
        self(prompt)
    }
}

/// Errors that abort a chain run.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("step {step}: {source}")]
    Resolution {
        step: usize,
        #[source]
        source: ResolutionError,
    },

    /// The model call failed; the original error is passed through.
    #[error(transparent)]
    External(ExternalError),
}

/// An ordered list of parsed prompt templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    steps: Vec<Template>,
}

impl Chain {
    /// Parse every prompt up front so a malformed template fails before any
    /// model is called.
    pub fn new<I, S>(prompts: I) -> Result<Self, ChainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let steps = prompts
            .into_iter()
            .enumerate()
            .map(|(step, prompt)| {
                Template::parse(prompt.as_ref())
                    .map_err(|source| ChainError::Resolution { step, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { steps })
    }

    pub fn from_templates(steps: Vec<Template>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Template] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// First step whose history reference can never be satisfied, as
    /// `(step, back)`. Step `i` has exactly `i` earlier outputs.
    pub fn unreachable_reference(&self) -> Option<(usize, usize)> {
        self.steps
            .iter()
            .enumerate()
            .map(|(step, template)| (step, template.history_depth()))
            .find(|&(step, depth)| depth > step)
    }
}

/// Histories produced by one model over one chain.
///
/// Both vectors are index-aligned with the chain's steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainRun {
    /// Parsed response of each step
    pub outputs: Vec<StepOutput>,

    /// Prompt actually sent at each step
    pub filled_prompts: Vec<String>,
}

impl ChainRun {
    pub fn with_capacity(steps: usize) -> Self {
        Self {
            outputs: Vec::with_capacity(steps),
            filled_prompts: Vec::with_capacity(steps),
        }
    }

    /// Output of the last completed step.
    pub fn final_output(&self) -> Option<&StepOutput> {
        self.outputs.last()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Record a completed step.
    pub fn push(&mut self, filled_prompt: String, output: StepOutput) {
        self.filled_prompts.push(filled_prompt);
        self.outputs.push(output);
    }
}

/// Drives one model through a chain.
pub struct ChainRunner;

impl ChainRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run every step of `chain` against `model`.
    ///
    /// A resolution error or a failed model call aborts the run; no partial
    /// history is returned.
    pub fn run<M>(&self, context: &Context, model: &M, chain: &Chain) -> Result<ChainRun, ChainError>
    where
        M: Model + ?Sized,
    {
        let mut run = ChainRun::with_capacity(chain.len());

        for (step, template) in chain.steps().iter().enumerate() {
            let prompt = template.render(context, &run.outputs).map_err(|source| {
                tracing::warn!(step, error = %source, "Failed to resolve chain step");
                ChainError::Resolution { step, source }
            })?;

            tracing::debug!(step, prompt_len = prompt.len(), "Invoking model");

            let raw = model.invoke(&prompt).map_err(|e| {
                tracing::warn!(step, error = %e, "Model call failed");
                ChainError::External(e)
            })?;

            let output = parse_output(&raw);
            tracing::debug!(step, structured = output.is_structured(), "Recorded step output");

            run.push(prompt, output);
        }

        Ok(run)
    }

    /// Run with a `(model, prompt) -> response` function instead of a
    /// [`Model`] implementation.
    pub fn run_with<M, F, E>(
        &self,
        context: &Context,
        model: &M,
        prompt_fn: F,
        chain: &Chain,
    ) -> Result<ChainRun, ChainError>
    where
        M: ?Sized,
        F: Fn(&M, &str) -> Result<String, E>,
        E: Into<ExternalError>,
    {
        let bound = |prompt: &str| -> Result<String, ExternalError> {
            prompt_fn(model, prompt).map_err(Into::into)
        };
        self.run(context, &bound, chain)
    }
}

impl Default for ChainRunner {
    fn default() -> Self {
        Self::new()
    }
}
