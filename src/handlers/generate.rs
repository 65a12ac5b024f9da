use crate::{
    error::AppError,
    fallback::{FallbackGenerator, GenerationResult},
    metrics,
    observability::{LogStore, NewRequestLog, NewResponseLog},
    providers::GenerationOptions,
};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::Instrument;

pub const GENERATE_ENDPOINT: &str = "/gemini/generate";

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub generator: FallbackGenerator,
    pub store: Arc<dyn LogStore>,
}

/// Body of `POST /gemini/generate`
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: PromptInput,
    /// Any JSON; forwarded to the provider without validation
    #[serde(default)]
    pub generation_config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct PromptInput {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    pub model: String,
    pub metrics: TokenMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl From<&GenerationResult> for GenerateResponse {
    fn from(result: &GenerationResult) -> Self {
        Self {
            text: result.text.clone(),
            model: result.model_used.clone(),
            metrics: TokenMetrics {
                prompt_tokens: result.usage.prompt_tokens().into(),
                completion_tokens: result.usage.completion_tokens().into(),
                total_tokens: result.usage.total_tokens(),
            },
        }
    }
}

/// Validated input: the prompt, its options, and the body exactly as received
#[derive(Debug)]
struct ValidatedRequest {
    raw_body: String,
    prompt: String,
    options: GenerationOptions,
}

fn parse_request(body: &[u8]) -> Result<ValidatedRequest, AppError> {
    let raw_body = std::str::from_utf8(body)
        .map_err(|_| AppError::ValidationError("request body is not valid UTF-8".to_string()))?
        .to_string();

    let request: GenerateRequest = serde_json::from_str(&raw_body)?;

    let prompt = request
        .prompt
        .text
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError("prompt.text is required".to_string()))?;

    Ok(ValidatedRequest {
        raw_body,
        prompt,
        options: request
            .generation_config
            .map(GenerationOptions::from)
            .unwrap_or_default(),
    })
}

/// First `X-Forwarded-For` hop, else the socket peer
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Handle POST /gemini/generate
///
/// Writes the request row before the first upstream attempt and the
/// response row after the fallback chain finishes. Log writes that fail are
/// reported but never replace the generation result.
pub async fn handle_generate(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GenerateResponse>, AppError> {
    let request = parse_request(&body).inspect_err(|e| {
        metrics::record_error("validation");
        tracing::debug!(error = %e, "Rejected generate request");
    })?;

    let client_ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let span = tracing::info_span!(
        "request",
        trace_id = %uuid::Uuid::new_v4(),
        endpoint = GENERATE_ENDPOINT,
        client_ip = %client_ip,
        request_log_id = tracing::field::Empty,
    );

    generate(state, request, client_ip).instrument(span).await
}

async fn generate(
    state: AppState,
    request: ValidatedRequest,
    client_ip: String,
) -> Result<Json<GenerateResponse>, AppError> {
    metrics::record_request(GENERATE_ENDPOINT);

    let request_log = state
        .store
        .create_request_log(NewRequestLog {
            endpoint: GENERATE_ENDPOINT.to_string(),
            client_ip,
            request_body: request.raw_body,
        })
        .await;

    let request_log_id = match request_log {
        Ok(log) => {
            tracing::Span::current().record("request_log_id", log.id);
            Some(log.id)
        }
        Err(e) => {
            // Serve the request anyway; its response row is skipped so no row lacks a request
            metrics::record_error("persistence");
            tracing::error!(error = %e, "Failed to write request log");
            None
        }
    };

    tracing::info!(
        candidates = state.generator.candidates().len(),
        prompt_chars = request.prompt.chars().count(),
        "Handling generate request"
    );

    match state.generator.generate(&request.prompt, &request.options).await {
        Ok(result) => {
            metrics::record_tokens(&result.model_used, "prompt", result.usage.prompt_tokens().into());
            metrics::record_tokens(
                &result.model_used,
                "completion",
                result.usage.completion_tokens().into(),
            );
            metrics::record_duration(&result.model_used, Duration::from_millis(result.elapsed_ms));

            tracing::info!(
                model = %result.model_used,
                duration_ms = result.elapsed_ms,
                failed_attempts = result.failed_attempts.len(),
                prompt_tokens = result.usage.prompt_tokens(),
                completion_tokens = result.usage.completion_tokens(),
                "Completed generate request"
            );

            if let Some(request_id) = request_log_id {
                write_response_log(
                    state.store.as_ref(),
                    NewResponseLog::success(
                        request_id,
                        &result.model_used,
                        &result.text,
                        &result.usage,
                        result.elapsed_ms,
                    ),
                )
                .await;
            }

            Ok(Json(GenerateResponse::from(&result)))
        }
        Err(err) => {
            metrics::record_error("all_models_failed");
            tracing::error!(
                attempts = err.failures.len(),
                duration_ms = err.elapsed_ms,
                error = %err,
                "No candidate model succeeded"
            );

            if let Some(request_id) = request_log_id {
                write_response_log(
                    state.store.as_ref(),
                    NewResponseLog::failed(request_id, err.summary(), err.elapsed_ms),
                )
                .await;
            }

            Err(AppError::from(err))
        }
    }
}

async fn write_response_log(store: &dyn LogStore, log: NewResponseLog) {
    let request_id = log.request_id;
    if let Err(e) = store.create_response_log(log).await {
        metrics::record_error("persistence");
        tracing::error!(request_log_id = request_id, error = %e, "Failed to write response log");
    }
}
