use crate::{
    metrics,
    providers::{GenerationOptions, TextGenerator, TokenUsage, UpstreamFailure},
};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a successful fallback run
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub model_used: String,
    pub usage: TokenUsage,
    /// Wall-clock time of the successful call only
    pub elapsed_ms: u64,
    /// Failures that preceded the success, in attempt order
    pub failed_attempts: Vec<UpstreamFailure>,
}

/// Every candidate failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("All {} candidate model(s) failed: {}", .failures.len(), describe_failures(.failures))]
pub struct AllModelsFailed {
    /// One entry per attempted model, in attempt order
    pub failures: Vec<UpstreamFailure>,
    /// Wall-clock time across all attempts
    pub elapsed_ms: u64,
}

impl AllModelsFailed {
    /// `model: cause` lines, suitable for a log column
    pub fn summary(&self) -> String {
        describe_failures(&self.failures)
    }
}

fn describe_failures(failures: &[UpstreamFailure]) -> String {
    if failures.is_empty() {
        return "no candidate models configured".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{}: {}", f.model, f.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Sequential, short-circuiting fallback across candidate models
#[derive(Clone)]
pub struct FallbackGenerator {
    generator: Arc<dyn TextGenerator>,
    candidates: Arc<[String]>,
}

impl FallbackGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, candidates: Vec<String>) -> Self {
        Self {
            generator,
            candidates: candidates.into(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Try the configured candidates in order
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResult, AllModelsFailed> {
        generate_with_fallback(self.generator.as_ref(), prompt, options, &self.candidates).await
    }
}

/// Try each candidate in order until one succeeds.
///
/// Attempts run one after another with no delay between them; the first
/// success wins and later candidates are never called.
pub async fn generate_with_fallback(
    generator: &dyn TextGenerator,
    prompt: &str,
    options: &GenerationOptions,
    candidates: &[String],
) -> Result<GenerationResult, AllModelsFailed> {
    let run_start = Instant::now();
    let mut failures = Vec::new();

    for model in candidates {
        let attempt_start = Instant::now();

        match generator.generate(model, prompt, options).await {
            Ok(generation) => {
                let elapsed_ms = attempt_start.elapsed().as_millis() as u64;
                metrics::record_attempt(generator.provider_name(), model, "success");

                if !failures.is_empty() {
                    tracing::info!(
                        model = %model,
                        failed_attempts = failures.len(),
                        "Fallback model succeeded"
                    );
                }

                return Ok(GenerationResult {
                    text: generation.text,
                    model_used: model.clone(),
                    usage: generation.usage,
                    elapsed_ms,
                    failed_attempts: failures,
                });
            }
            Err(failure) => {
                metrics::record_attempt(generator.provider_name(), model, failure.cause.kind());
                tracing::warn!(
                    model = %model,
                    error = %failure.cause,
                    duration_ms = attempt_start.elapsed().as_millis() as u64,
                    "Model attempt failed, trying next candidate"
                );
                failures.push(failure);
            }
        }
    }

    Err(AllModelsFailed {
        failures,
        elapsed_ms: run_start.elapsed().as_millis() as u64,
    })
}
