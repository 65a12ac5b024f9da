//! Request/response log rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Outcome stored on a response row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Inbound call, written before the upstream call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: i64,
    pub endpoint: String,
    pub client_ip: String,
    /// Body exactly as received
    pub request_body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRequestLog {
    pub endpoint: String,
    pub client_ip: String,
    pub request_body: String,
}

/// Token columns of a response row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// Outcome of a call; `model_used` and `tokens` are `None` on failed rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseLog {
    pub id: i64,
    pub request_id: Option<i64>,
    pub status: ResponseStatus,
    pub model_used: Option<String>,
    pub response: Option<String>,
    pub tokens: Option<TokenCounts>,
    pub response_time_ms: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResponseLog {
    pub request_id: i64,
    pub status: ResponseStatus,
    pub model_used: Option<String>,
    pub response: Option<String>,
    pub tokens: Option<TokenCounts>,
    pub response_time_ms: i64,
    pub error_message: Option<String>,
}

impl NewResponseLog {
    pub fn success(
        request_id: i64,
        model_used: &str,
        response: &str,
        usage: &TokenUsage,
        response_time_ms: u64,
    ) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Success,
            model_used: Some(model_used.to_string()),
            response: Some(response.to_string()),
            tokens: Some(TokenCounts::from(usage)),
            response_time_ms: millis_column(response_time_ms),
            error_message: None,
        }
    }

    /// Row for a call where no model succeeded: no model, no text, no metrics
    pub fn failed(request_id: i64, error_message: String, response_time_ms: u64) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Failed,
            model_used: None,
            response: None,
            tokens: None,
            response_time_ms: millis_column(response_time_ms),
            error_message: Some(error_message),
        }
    }
}

impl From<&TokenUsage> for TokenCounts {
    fn from(usage: &TokenUsage) -> Self {
        let prompt_tokens = i64::from(usage.prompt_tokens());
        let completion_tokens = i64::from(usage.completion_tokens());
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// SQLite integers are signed; durations past `i64::MAX` ms saturate
fn millis_column(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

/// Row counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    pub request_count: u64,
    pub response_count: u64,
    pub failed_response_count: u64,
}

/// Rows removed by a retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub requests_deleted: u64,
    pub responses_deleted: u64,
}
