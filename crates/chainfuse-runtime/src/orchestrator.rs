//! Runtime orchestrator for concurrent fusion runs.
//!
//! The orchestrator runs the same chain against every registered model:
//! - Fan-out: one chain per model, at most `max_concurrent_models` in flight
//! - Order-preserving collection: results line up with registration order
//! - Fan-in: a single evaluator call through `chainfuse-core`
//!
//! Steps within a chain stay strictly sequential.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tokio::time::Instant;

use chainfuse_core::fusion::{check_inputs, evaluate_runs};
use chainfuse_core::{
    parse_output, Chain, ChainRun, Context, Evaluator, FusionChainResult, FusionError,
    ResolutionError,
};

use crate::config::{ConfigError, RuntimeConfig};
use crate::providers::{ModelClient, ModelError, ModelRegistry};
use crate::usage::{ModelUsage, UsageTracker};

/// Errors from the runtime orchestrator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("step {step}: {source}")]
    Resolution {
        step: usize,
        #[source]
        source: ResolutionError,
    },

    #[error("step {step}: model call failed: {source}")]
    Model {
        step: usize,
        #[source]
        source: ModelError,
    },

    #[error("step {step} timed out after {}", humantime::format_duration(*timeout))]
    StepTimeout { step: usize, timeout: Duration },

    #[error("model '{model}': {source}")]
    ModelRun {
        model: String,
        #[source]
        source: Box<RuntimeError>,
    },

    #[error(transparent)]
    Registry(ModelError),

    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// The innermost error, looking through per-model wrapping.
    pub fn root(&self) -> &RuntimeError {
        match self {
            RuntimeError::ModelRun { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), RuntimeError::StepTimeout { .. })
    }
}

/// Result from a concurrent fusion run.
#[derive(Debug, Clone)]
pub struct RuntimeResult {
    /// The aggregate, index-aligned with the registry
    pub result: FusionChainResult,

    /// Token usage of this run, per model name
    pub usage: BTreeMap<String, ModelUsage>,

    /// Wall-clock time of the whole run
    pub elapsed: Duration,

    /// When the aggregate was produced
    pub completed_at: DateTime<Utc>,
}

/// The orchestrator drives chains through async model clients.
pub struct FusionOrchestrator {
    registry: ModelRegistry,
    config: RuntimeConfig,
    usage: UsageTracker,
}

impl FusionOrchestrator {
    /// Create a new orchestrator.
    pub fn new(registry: ModelRegistry, config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        Ok(Self {
            registry,
            config,
            usage: UsageTracker::new(),
        })
    }

    pub fn builder() -> FusionOrchestratorBuilder {
        FusionOrchestratorBuilder::new()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run `chain` against the model registered as `model`.
    ///
    /// Semantics match the synchronous chain runner: each step sees the
    /// context and this model's earlier outputs, and the first failure
    /// aborts the run.
    pub async fn run_chain(
        &self,
        context: &Context,
        model: &str,
        chain: &Chain,
    ) -> Result<ChainRun, RuntimeError> {
        let client = self.registry.get(model).map_err(RuntimeError::Registry)?;
        let (run, _) = self.execute_chain(context, model, client.as_ref(), chain).await?;
        Ok(run)
    }

    /// Run `chain` on every registered model, evaluate, and aggregate.
    ///
    /// At most `max_concurrent_models` chains are in flight. Results are
    /// collected in registration order regardless of completion order. The
    /// first failing model fails the whole run.
    pub async fn run<E>(
        &self,
        context: &Context,
        chain: &Chain,
        evaluator: &E,
    ) -> Result<RuntimeResult, RuntimeError>
    where
        E: Evaluator + ?Sized,
    {
        check_inputs(self.registry.len(), chain)?;

        let started = Instant::now();
        let limit = self.config.max_concurrent_models.max(1);

        tracing::debug!(models = self.registry.len(), limit, "Starting fusion run");

        let outcomes: Vec<(ChainRun, ModelUsage)> = stream::iter(self.registry.iter())
            .map(|(name, client)| async move {
                self.execute_chain(context, name, client.as_ref(), chain)
                    .await
                    .map_err(|source| RuntimeError::ModelRun {
                        model: name.to_string(),
                        source: Box::new(source),
                    })
            })
            .buffered(limit)
            .try_collect()
            .await?;

        let names = self.registry.names();
        let (runs, usages): (Vec<_>, Vec<_>) = outcomes.into_iter().unzip();

        let evaluation = evaluate_runs(&runs, evaluator)?;
        let usage = names.iter().cloned().zip(usages).collect();
        let result = FusionChainResult::from_runs(runs, names, evaluation);
        let elapsed = started.elapsed();

        tracing::info!(
            models = result.model_count(),
            elapsed = %humantime::format_duration(elapsed),
            "Fusion run complete"
        );

        Ok(RuntimeResult {
            result,
            usage,
            elapsed,
            completed_at: Utc::now(),
        })
    }

    /// Cumulative usage across every run of this orchestrator.
    pub fn usage(&self) -> BTreeMap<String, ModelUsage> {
        self.usage.snapshot()
    }

    pub fn total_usage(&self) -> ModelUsage {
        self.usage.total()
    }

    pub fn reset_usage(&self) {
        self.usage.reset();
    }

    async fn execute_chain(
        &self,
        context: &Context,
        name: &str,
        client: &dyn ModelClient,
        chain: &Chain,
    ) -> Result<(ChainRun, ModelUsage), RuntimeError> {
        let mut run = ChainRun::with_capacity(chain.len());
        let mut usage = ModelUsage::default();

        for (step, template) in chain.steps().iter().enumerate() {
            let prompt = template.render(context, &run.outputs).map_err(|source| {
                tracing::warn!(model = name, step, error = %source, "Failed to resolve chain step");
                RuntimeError::Resolution { step, source }
            })?;

            tracing::debug!(model = name, step, prompt_len = prompt.len(), "Calling model");

            let completion = match self.config.step_timeout {
                Some(timeout) => tokio::time::timeout(timeout, client.complete(&prompt))
                    .await
                    .map_err(|_| {
                        tracing::warn!(model = name, step, timeout = ?timeout, "Model call timed out");
                        RuntimeError::StepTimeout { step, timeout }
                    })?,
                None => client.complete(&prompt).await,
            }
            .map_err(|source| {
                tracing::warn!(model = name, step, error = %source, "Model call failed");
                RuntimeError::Model { step, source }
            })?;

            usage.add(&completion.usage);
            self.usage.record(name, &completion.usage);

            run.push(prompt, parse_output(&completion.content));
        }

        Ok((run, usage))
    }
}

/// Builder for [`FusionOrchestrator`].
pub struct FusionOrchestratorBuilder {
    registry: ModelRegistry,
    config: RuntimeConfig,
}

impl FusionOrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            registry: ModelRegistry::new(),
            config: RuntimeConfig::default(),
        }
    }

    /// Register a model client under a display name.
    pub fn model(mut self, name: impl Into<String>, client: Arc<dyn ModelClient>) -> Self {
        self.registry.register(name, client);
        self
    }

    /// Replace the registry wholesale.
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<FusionOrchestrator, RuntimeError> {
        FusionOrchestrator::new(self.registry, self.config)
    }
}

impl Default for FusionOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Completion, TokenUsage};
    use async_trait::async_trait;
    use chainfuse_core::{Evaluation, ExternalError, StepOutput};
    use serde_json::json;

    /// Replies `"<name> response: <prompt>"` after a fixed delay.
    struct DelayedModel {
        name: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl ModelClient for DelayedModel {
        async fn complete(&self, prompt: &str) -> Result<Completion, ModelError> {
            tokio::time::sleep(self.delay).await;
            Ok(Completion::text(format!("{} response: {}", self.name, prompt))
                .with_usage(TokenUsage::new(prompt.len() as u32, 5)))
        }
    }

    struct JsonModel;

    #[async_trait]
    impl ModelClient for JsonModel {
        async fn complete(&self, prompt: &str) -> Result<Completion, ModelError> {
            if prompt.starts_with("Output JSON") {
                Ok(Completion::text("```json\n{\"key\": \"value\"}\n```"))
            } else {
                Ok(Completion::text(prompt))
            }
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ModelClient for FailingModel {
        async fn complete(&self, _prompt: &str) -> Result<Completion, ModelError> {
            Err(ModelError::Request("connection reset".to_string()))
        }
    }

    fn delayed(name: &'static str, millis: u64) -> Arc<dyn ModelClient> {
        Arc::new(DelayedModel {
            name,
            delay: Duration::from_millis(millis),
        })
    }

    fn longest_wins(finals: &[StepOutput]) -> Result<Evaluation, ExternalError> {
        let lengths: Vec<f64> = finals.iter().map(|o| o.to_string().len() as f64).collect();
        let max = lengths.iter().cloned().fold(1.0, f64::max);
        let best = lengths
            .iter()
            .enumerate()
            .fold(0, |best, (i, len)| if *len > lengths[best] { i } else { best });

        Ok(Evaluation::new(
            finals[best].clone(),
            lengths.iter().map(|len| len / max).collect(),
        ))
    }

    fn greeting_chain() -> Chain {
        Chain::new(["First prompt: {{var1}}", "Second prompt: {{var2}} and {{output[-1]}}"]).unwrap()
    }

    fn greeting_context() -> Context {
        Context::new().with("var1", "Hello").with("var2", "World")
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("chainfuse_runtime=debug")
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn test_run_chain() {
        let orchestrator = FusionOrchestrator::builder()
            .model("json", Arc::new(JsonModel))
            .build()
            .unwrap();

        let chain = Chain::new(["Output JSON: {{test}}", "Reference JSON: {{output[-1].key}}"]).unwrap();
        let run = orchestrator
            .run_chain(&Context::new().with("test", "JSON"), "json", &chain)
            .await
            .unwrap();

        assert_eq!(run.outputs[0], StepOutput::structured(json!({"key": "value"})));
        assert_eq!(run.outputs[1], StepOutput::text("Reference JSON: value"));
        assert_eq!(run.filled_prompts[1], "Reference JSON: value");
    }

    #[tokio::test]
    async fn test_run_chain_unknown_model() {
        let orchestrator = FusionOrchestrator::builder().build().unwrap();
        let result = orchestrator
            .run_chain(&Context::new(), "missing", &greeting_chain())
            .await;

        assert!(matches!(
            result,
            Err(RuntimeError::Registry(ModelError::NotConfigured(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_registration_order() {
        init_tracing();

        // Later models finish first.
        let orchestrator = FusionOrchestrator::builder()
            .model("slow", delayed("slow", 300))
            .model("medium", delayed("medium", 200))
            .model("fast", delayed("fast", 10))
            .build()
            .unwrap();

        let outcome = orchestrator
            .run(&greeting_context(), &greeting_chain(), &longest_wins)
            .await
            .unwrap();

        let result = &outcome.result;
        assert_eq!(result.model_names(), &["slow", "medium", "fast"]);
        assert_eq!(
            result.all_prompt_responses()[0][0],
            StepOutput::text("slow response: First prompt: Hello")
        );
        assert_eq!(
            result.all_context_filled_prompts()[2][1],
            "Second prompt: World and fast response: First prompt: Hello"
        );
        assert_eq!(result.performance_scores().len(), 3);
        assert_eq!(
            result.top_response(),
            &result.all_prompt_responses()[1][1]
        );

        assert_eq!(outcome.usage.len(), 3);
        assert_eq!(outcome.usage["fast"].calls, 2);
        assert_eq!(orchestrator.total_usage().calls, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_bounds_wall_clock() {
        let registry = {
            let mut registry = ModelRegistry::new();
            for name in ["a", "b", "c", "d"] {
                registry.register(name, delayed("m", 100));
            }
            registry
        };
        let chain = Chain::new(["only step"]).unwrap();

        let parallel = FusionOrchestrator::new(registry.clone(), RuntimeConfig::default()).unwrap();
        let outcome = parallel.run(&Context::new(), &chain, &longest_wins).await.unwrap();
        assert!(outcome.elapsed < Duration::from_millis(200));

        let serial = FusionOrchestrator::new(
            registry,
            RuntimeConfig::new().with_max_concurrent_models(1),
        )
        .unwrap();
        let outcome = serial.run(&Context::new(), &chain, &longest_wins).await.unwrap();
        assert!(outcome.elapsed >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_fails_the_fusion() {
        init_tracing();

        let orchestrator = FusionOrchestrator::builder()
            .model("quick", delayed("quick", 10))
            .model("stuck", delayed("stuck", 5_000))
            .config(RuntimeConfig::new().with_step_timeout(Duration::from_millis(500)))
            .build()
            .unwrap();

        let err = orchestrator
            .run(&greeting_context(), &greeting_chain(), &longest_wins)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        match err {
            RuntimeError::ModelRun { model, source } => {
                assert_eq!(model, "stuck");
                assert!(matches!(*source, RuntimeError::StepTimeout { step: 0, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_model_failure_names_the_model() {
        let orchestrator = FusionOrchestrator::builder()
            .model("ok", Arc::new(JsonModel))
            .model("broken", Arc::new(FailingModel))
            .build()
            .unwrap();

        let err = orchestrator
            .run(&greeting_context(), &greeting_chain(), &longest_wins)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("broken"));
        assert!(matches!(
            err.root(),
            RuntimeError::Model {
                step: 0,
                source: ModelError::Request(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_registry_is_rejected() {
        let orchestrator = FusionOrchestrator::builder().build().unwrap();
        let result = orchestrator
            .run(&Context::new(), &greeting_chain(), &longest_wins)
            .await;

        assert!(matches!(result, Err(RuntimeError::Fusion(FusionError::NoModels))));
    }

    #[tokio::test]
    async fn test_evaluator_called_once() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let evaluator = |finals: &[StepOutput]| -> Result<Evaluation, ExternalError> {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Evaluation::new(finals[0].clone(), vec![0.5; finals.len()]))
        };

        let orchestrator = FusionOrchestrator::builder()
            .model("a", delayed("a", 0))
            .model("b", delayed("b", 0))
            .build()
            .unwrap();

        orchestrator
            .run(&greeting_context(), &greeting_chain(), &evaluator)
            .await
            .unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = FusionOrchestrator::builder()
            .config(RuntimeConfig::new().with_max_concurrent_models(0))
            .build();

        assert!(matches!(result, Err(RuntimeError::Config(ConfigError::Invalid(_)))));
    }
}
