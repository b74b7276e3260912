//! The aggregate produced by a fusion run.

use serde::{Deserialize, Serialize};

use crate::chain::ChainRun;
use crate::fusion::Evaluation;
use crate::types::StepOutput;

/// Per-model histories, scores and names plus the evaluator's winner.
///
/// Every per-model vector is index-aligned with the models passed to the run.
/// The value is immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionChainResult {
    all_prompt_responses: Vec<Vec<StepOutput>>,
    all_context_filled_prompts: Vec<Vec<String>>,
    performance_scores: Vec<f64>,
    model_names: Vec<String>,
    top_response: StepOutput,
}

impl FusionChainResult {
    pub fn new(
        all_prompt_responses: Vec<Vec<StepOutput>>,
        all_context_filled_prompts: Vec<Vec<String>>,
        performance_scores: Vec<f64>,
        model_names: Vec<String>,
        top_response: StepOutput,
    ) -> Self {
        Self {
            all_prompt_responses,
            all_context_filled_prompts,
            performance_scores,
            model_names,
            top_response,
        }
    }

    /// Assemble from per-model runs (in model order), their display names and
    /// the evaluator's verdict.
    pub fn from_runs(runs: Vec<ChainRun>, model_names: Vec<String>, evaluation: Evaluation) -> Self {
        let (all_prompt_responses, all_context_filled_prompts) = runs
            .into_iter()
            .map(|run| (run.outputs, run.filled_prompts))
            .unzip();

        Self::new(
            all_prompt_responses,
            all_context_filled_prompts,
            evaluation.scores,
            model_names,
            evaluation.top_response,
        )
    }

    /// Output history of each model.
    pub fn all_prompt_responses(&self) -> &[Vec<StepOutput>] {
        &self.all_prompt_responses
    }

    /// Filled-prompt history of each model.
    pub fn all_context_filled_prompts(&self) -> &[Vec<String>] {
        &self.all_context_filled_prompts
    }

    pub fn performance_scores(&self) -> &[f64] {
        &self.performance_scores
    }

    pub fn model_names(&self) -> &[String] {
        &self.model_names
    }

    pub fn top_response(&self) -> &StepOutput {
        &self.top_response
    }

    /// Number of models in the run.
    pub fn model_count(&self) -> usize {
        self.model_names.len()
    }

    /// Compact JSON rendering.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
