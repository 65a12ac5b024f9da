//! Upstream generative-AI adapters
//!
//! Every adapter returns the same canonical [`Generation`] or a typed
//! [`UpstreamFailure`]; provider payloads never leave this module.

pub mod gemini;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

pub use gemini::GeminiClient;

/// Caller-supplied `generation_config`, carried exactly as received.
///
/// No field is type-checked here; whatever the provider rejects comes back as
/// an [`UpstreamFailure`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    raw: Option<Value>,
}

impl GenerationOptions {
    /// `null` means no options
    pub fn new(raw: Value) -> Self {
        Self {
            raw: (!raw.is_null()).then_some(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.raw {
            None => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }

    /// Provider form: top-level snake_case keys become camelCase
    /// (`max_output_tokens` -> `maxOutputTokens`), values and nested objects
    /// are left untouched. Non-object configs are forwarded as-is.
    pub fn to_camel_case(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        match &self.raw {
            Some(Value::Object(map)) => Some(Value::Object(
                map.iter()
                    .map(|(key, value)| (snake_to_camel(key), value.clone()))
                    .collect::<Map<String, Value>>(),
            )),
            other => other.clone(),
        }
    }
}

impl From<Value> for GenerationOptions {
    fn from(raw: Value) -> Self {
        Self::new(raw)
    }
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Token counts for one generation call.
///
/// Only constructed through [`TokenUsage::new`]. Provider counts are 32-bit,
/// so `total_tokens = prompt_tokens + completion_tokens` always fits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: u64::from(prompt_tokens) + u64::from(completion_tokens),
        }
    }

    pub fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> u32 {
        self.completion_tokens
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }
}

/// Canonical successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// Why a single model attempt failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureCause {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FailureCause {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Transport(_) => "transport",
            Self::Provider { .. } => "provider",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// A failed attempt against one model
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("model {model} failed: {cause}")]
pub struct UpstreamFailure {
    pub model: String,
    pub cause: FailureCause,
}

impl UpstreamFailure {
    pub fn new(model: impl Into<String>, cause: FailureCause) -> Self {
        Self {
            model: model.into(),
            cause,
        }
    }
}

/// Single-call text generation against one named model.
///
/// Implementations perform at most one network call and never retry;
/// fallback policy lives in [`crate::fallback`].
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    /// Provider name used in logs and metrics
    fn provider_name(&self) -> &str;

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, UpstreamFailure>;
}

/// Reject empty model names and prompts before any network traffic
pub fn check_inputs(model: &str, prompt: &str) -> Result<(), UpstreamFailure> {
    if model.trim().is_empty() {
        return Err(UpstreamFailure::new(
            model,
            FailureCause::InvalidInput("model name is empty".to_string()),
        ));
    }
    if prompt.trim().is_empty() {
        return Err(UpstreamFailure::new(
            model,
            FailureCause::InvalidInput("prompt text is empty".to_string()),
        ));
    }
    Ok(())
}
