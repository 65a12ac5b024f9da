use crate::{
    config::GeminiConfig,
    models::gemini::{ErrorResponse, GenerateContentRequest, GenerateContentResponse},
    providers::{
        check_inputs, FailureCause, Generation, GenerationOptions, TextGenerator, TokenUsage,
        UpstreamFailure,
    },
};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Gemini `generateContent` adapter
#[derive(Clone)]
pub struct GeminiClient {
    http_client: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiClient {
    pub fn new(http_client: Client, config: Arc<GeminiConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Call Gemini Generate Content API
    /// Note: Model name is part of the URL path
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, FailureCause> {
        // Gemini API format: /v1beta/models/{model}:generateContent
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .query(&[("key", &self.config.api_key)])
            .json(request)
            .send()
            .await
            .map_err(|e| FailureCause::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FailureCause::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(FailureCause::Provider {
                status: status.as_u16(),
                message: provider_error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| FailureCause::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, UpstreamFailure> {
        check_inputs(model, prompt)?;

        let request = GenerateContentRequest::from_prompt(prompt, options.to_camel_case());

        let response = self
            .generate_content(model, &request)
            .await
            .map_err(|cause| UpstreamFailure::new(model, cause))?;

        tracing::debug!(
            model = %model,
            model_version = ?response.model_version,
            candidates_count = response.candidates.len(),
            "Received Gemini response"
        );

        normalize_response(&response).map_err(|cause| UpstreamFailure::new(model, cause))
    }
}

/// Reduce a provider payload to the canonical [`Generation`].
///
/// Text is every text part of the first candidate, concatenated. Missing
/// usage metadata counts as zero tokens.
pub fn normalize_response(response: &GenerateContentResponse) -> Result<Generation, FailureCause> {
    let Some(candidate) = response.candidates.first() else {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
            .map(|r| format!("prompt blocked ({})", r))
            .unwrap_or_else(|| "no candidates in response".to_string());
        return Err(FailureCause::MalformedResponse(reason));
    };

    let text: String = candidate
        .content
        .iter()
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .collect();

    if text.is_empty() {
        let reason = match candidate.finish_reason.as_deref() {
            Some(reason) => format!("candidate has no text (finish reason {})", reason),
            None => "candidate has no text".to_string(),
        };
        return Err(FailureCause::MalformedResponse(reason));
    }

    let usage = response
        .usage_metadata
        .as_ref()
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default();

    Ok(Generation { text, usage })
}

/// `STATUS: message` from a Gemini error body, falling back to the raw text
fn provider_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) if !err.error.message.is_empty() => match err.error.status {
            Some(status) => format!("{}: {}", status, err.error.message),
            None => err.error.message,
        },
        _ if body.trim().is_empty() => "Unknown error".to_string(),
        _ => body.trim().to_string(),
    }
}
