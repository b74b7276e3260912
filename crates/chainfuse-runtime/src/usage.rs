//! Token usage accounting across concurrent model runs.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::providers::TokenUsage;

/// Accumulated usage for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Total tokens used
    pub total_tokens: u64,

    /// Prompt/input tokens
    pub prompt_tokens: u64,

    /// Completion/output tokens
    pub completion_tokens: u64,

    /// Number of model calls made
    pub calls: u32,
}

impl ModelUsage {
    /// Add token usage from a single completion.
    pub fn add(&mut self, usage: &TokenUsage) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.calls += 1;
    }

    /// Fold another tally into this one.
    pub fn merge(&mut self, other: &ModelUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.calls += other.calls;
    }
}

/// Usage tracker shared by every in-flight chain of an orchestrator.
#[derive(Debug, Default)]
pub struct UsageTracker {
    per_model: RwLock<BTreeMap<String, ModelUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record usage after a call.
    pub fn record(&self, model: &str, usage: &TokenUsage) {
        self.per_model
            .write()
            .entry(model.to_string())
            .or_default()
            .add(usage);
    }

    /// Usage so far for one model.
    pub fn get(&self, model: &str) -> ModelUsage {
        self.per_model.read().get(model).copied().unwrap_or_default()
    }

    /// Usage so far for every model that has been called.
    pub fn snapshot(&self) -> BTreeMap<String, ModelUsage> {
        self.per_model.read().clone()
    }

    /// Usage summed over all models.
    pub fn total(&self) -> ModelUsage {
        self.per_model
            .read()
            .values()
            .fold(ModelUsage::default(), |mut total, usage| {
                total.merge(usage);
                total
            })
    }

    pub fn reset(&self) {
        self.per_model.write().clear();
    }
}
