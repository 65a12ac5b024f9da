/// End-to-end tests for POST /gemini/generate: router, fallback chain and
/// SQLite log store wired together, with a scripted upstream.
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use gemini_proxy::{
    config::DatabaseConfig,
    fallback::FallbackGenerator,
    handlers::{AppState, GenerateResponse},
    observability::{
        LogDb, LogStore, NewRequestLog, NewResponseLog, RequestLog, ResponseLog, ResponseStatus,
    },
    providers::{FailureCause, Generation, GenerationOptions, TextGenerator, TokenUsage, UpstreamFailure},
    server::create_router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tempfile::TempDir;
use tower::ServiceExt;

/// Upstream fake: models listed in `failing` return a provider error, every
/// other model echoes the prompt back.
struct ScriptedUpstream {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    fn new(failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: failing.iter().map(|m| m.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedUpstream {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, UpstreamFailure> {
        self.calls.lock().unwrap().push(model.to_string());

        // Same check Gemini applies: temperature must be a number
        let config = options.to_camel_case().unwrap_or_default();
        if config.get("temperature").is_some_and(|t| !t.is_number()) {
            return Err(UpstreamFailure::new(
                model,
                FailureCause::Provider {
                    status: 400,
                    message: "Invalid value at 'generation_config.temperature'".to_string(),
                },
            ));
        }

        if self.failing.contains(model) {
            return Err(UpstreamFailure::new(
                model,
                FailureCause::Provider {
                    status: 503,
                    message: format!("{} is overloaded", model),
                },
            ));
        }

        let text = if prompt == "ping" {
            "pong".to_string()
        } else {
            format!("echo:{}", prompt)
        };
        let prompt_tokens = prompt.split_whitespace().count() as u32;

        Ok(Generation {
            text,
            usage: TokenUsage::new(prompt_tokens, 1),
        })
    }
}

/// Log store whose every write fails
struct BrokenStore;

#[async_trait]
impl LogStore for BrokenStore {
    async fn create_request_log(&self, _log: NewRequestLog) -> anyhow::Result<RequestLog> {
        anyhow::bail!("disk I/O error")
    }

    async fn create_response_log(&self, _log: NewResponseLog) -> anyhow::Result<ResponseLog> {
        anyhow::bail!("disk I/O error")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("disk I/O error")
    }
}

/// Request rows land, response rows fail
struct ResponseWriteFailsStore {
    inner: LogDb,
}

#[async_trait]
impl LogStore for ResponseWriteFailsStore {
    async fn create_request_log(&self, log: NewRequestLog) -> anyhow::Result<RequestLog> {
        self.inner.create_request_log(log).await
    }

    async fn create_response_log(&self, _log: NewResponseLog) -> anyhow::Result<ResponseLog> {
        anyhow::bail!("database is locked")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.inner.ping().await
    }
}

async fn temp_db() -> (TempDir, LogDb) {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite:{}", dir.path().join("logs.db").display()),
        max_connections: 5,
        retention_days: None,
    };
    let db = LogDb::connect(&config).await.unwrap();
    (dir, db)
}

fn app(upstream: Arc<ScriptedUpstream>, candidates: &[&str], store: Arc<dyn LogStore>) -> Router {
    let generator = FallbackGenerator::new(
        upstream,
        candidates.iter().map(|m| m.to_string()).collect(),
    );
    let metrics_handle = Arc::new(PrometheusBuilder::new().build_recorder().handle());

    create_router(AppState { generator, store }, metrics_handle)
}

fn generate_request(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/gemini/generate")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::from(body.into()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_ping_round_trip_logs_both_rows() {
    let (_dir, db) = temp_db().await;
    let upstream = ScriptedUpstream::new(&[]);
    let router = app(upstream, &["gemini-1.5-flash"], Arc::new(db.clone()));

    let body = r#"{"prompt":{"text":"ping"}}"#;
    let response = router.oneshot(generate_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(
        json,
        json!({
            "text": "pong",
            "model": "gemini-1.5-flash",
            "metrics": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })
    );

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.request_count, 1);
    assert_eq!(stats.response_count, 1);
    assert_eq!(stats.failed_response_count, 0);

    let request = db.recent_request_logs(1).await.unwrap().remove(0);
    assert_eq!(request.endpoint, "/gemini/generate");
    assert_eq!(request.client_ip, "203.0.113.9");
    assert_eq!(request.request_body, body);

    let response_log = db.get_response_for_request(request.id).await.unwrap().unwrap();
    assert_eq!(response_log.status, ResponseStatus::Success);
    assert_eq!(response_log.model_used.as_deref(), Some("gemini-1.5-flash"));
    assert_eq!(response_log.response.as_deref(), Some("pong"));
    let tokens = response_log.tokens.unwrap();
    assert_eq!(tokens.prompt_tokens, 1);
    assert_eq!(tokens.completion_tokens, 1);
    assert_eq!(tokens.total_tokens, 2);
    assert!(response_log.response_time_ms >= 0);
}

#[tokio::test]
async fn test_request_body_is_stored_verbatim() {
    let (_dir, db) = temp_db().await;
    let router = app(ScriptedUpstream::new(&[]), &["gemini-1.5-flash"], Arc::new(db.clone()));

    // Odd spacing, key order and unknown fields must survive untouched
    let body = "{ \"extra\": [1, 2],\n  \"prompt\" : {\"text\":\"héllo wörld\"},\"generation_config\":{\"temperature\":0.3} }";
    let response = router.oneshot(generate_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = db.recent_request_logs(1).await.unwrap().remove(0);
    assert_eq!(request.request_body, body);
}

#[tokio::test]
async fn test_falls_back_to_first_healthy_model() {
    let (_dir, db) = temp_db().await;
    let upstream = ScriptedUpstream::new(&["model-a", "model-b"]);
    let router = app(
        upstream.clone(),
        &["model-a", "model-b", "model-c", "model-d"],
        Arc::new(db.clone()),
    );

    let response = router
        .oneshot(generate_request(r#"{"prompt":{"text":"hello there"}}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: GenerateResponse = serde_json::from_value(read_json(response).await).unwrap();
    assert_eq!(json.model, "model-c");
    assert_eq!(json.text, "echo:hello there");
    assert_eq!(json.metrics.total_tokens, 3);

    // model-d is never tried once model-c succeeds
    assert_eq!(upstream.calls(), vec!["model-a", "model-b", "model-c"]);

    let log = db.recent_response_logs(1).await.unwrap().remove(0);
    assert_eq!(log.model_used.as_deref(), Some("model-c"));
    assert_eq!(db.stats().await.unwrap().response_count, 1);
}

#[tokio::test]
async fn test_all_models_failing_returns_502_and_failed_row() {
    let (_dir, db) = temp_db().await;
    let upstream = ScriptedUpstream::new(&["model-a", "model-b"]);
    let router = app(upstream.clone(), &["model-a", "model-b"], Arc::new(db.clone()));

    let response = router
        .oneshot(generate_request(r#"{"prompt":{"text":"ping"}}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = read_json(response).await;
    assert_eq!(json["error"]["type"], "all_models_failed");
    assert_eq!(json["error"]["attempts"].as_array().unwrap().len(), 2);
    assert_eq!(json["error"]["attempts"][0]["model"], "model-a");
    assert!(json.get("metrics").is_none());
    assert_eq!(upstream.calls(), vec!["model-a", "model-b"]);

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.request_count, 1);
    assert_eq!(stats.response_count, 1);
    assert_eq!(stats.failed_response_count, 1);

    let log = db.recent_response_logs(1).await.unwrap().remove(0);
    assert_eq!(log.status, ResponseStatus::Failed);
    assert!(log.model_used.is_none());
    assert!(log.response.is_none());
    assert!(log.tokens.is_none());
    let message = log.error_message.unwrap();
    assert!(message.contains("model-a"));
    assert!(message.contains("model-b"));
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_without_logging() {
    let (_dir, db) = temp_db().await;
    let upstream = ScriptedUpstream::new(&[]);
    let router = app(upstream.clone(), &["gemini-1.5-flash"], Arc::new(db.clone()));

    for body in [
        r#"{"prompt":{}}"#,
        r#"{"prompt":{"text":""}}"#,
        r#"{"foo":"bar"}"#,
        "{not json",
    ] {
        let response = router.clone().oneshot(generate_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);

        let json = read_json(response).await;
        assert_eq!(json["error"]["type"], "validation_error");
    }

    assert!(upstream.calls().is_empty());
    let stats = db.stats().await.unwrap();
    assert_eq!(stats.request_count, 0);
    assert_eq!(stats.response_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_keep_rows_correlated() {
    let (_dir, db) = temp_db().await;
    let router = app(ScriptedUpstream::new(&[]), &["gemini-1.5-flash"], Arc::new(db.clone()));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let router = router.clone();
            tokio::spawn(async move {
                let body = json!({"prompt": {"text": format!("prompt-{}", i)}}).to_string();
                let response = router.oneshot(generate_request(body)).await.unwrap();
                assert_eq!(response.status(), StatusCode::OK);
                let json = read_json(response).await;
                assert_eq!(json["text"], format!("echo:prompt-{}", i));
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        result.unwrap();
    }

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.request_count, 50);
    assert_eq!(stats.response_count, 50);

    for request in db.recent_request_logs(50).await.unwrap() {
        let body: Value = serde_json::from_str(&request.request_body).unwrap();
        let prompt = body["prompt"]["text"].as_str().unwrap();

        let response = db.get_response_for_request(request.id).await.unwrap().unwrap();
        assert_eq!(response.request_id, Some(request.id));
        assert_eq!(response.response.unwrap(), format!("echo:{}", prompt));
    }
}

#[tokio::test]
async fn test_log_store_failure_does_not_fail_request() {
    let router = app(ScriptedUpstream::new(&[]), &["gemini-1.5-flash"], Arc::new(BrokenStore));

    let response = router
        .oneshot(generate_request(r#"{"prompt":{"text":"ping"}}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["text"], "pong");
    assert_eq!(json["metrics"]["total_tokens"], 2);
}

#[tokio::test]
async fn test_response_log_failure_still_returns_generation() {
    let (_dir, db) = temp_db().await;
    let store = ResponseWriteFailsStore { inner: db.clone() };
    let router = app(ScriptedUpstream::new(&[]), &["gemini-1.5-flash"], Arc::new(store));

    let body = r#"{"prompt":{"text":"ping"}}"#;
    let response = router.oneshot(generate_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({
            "text": "pong",
            "model": "gemini-1.5-flash",
            "metrics": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })
    );

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.request_count, 1);
    assert_eq!(stats.response_count, 0);

    let request = db.recent_request_logs(1).await.unwrap().remove(0);
    assert_eq!(request.request_body, body);
    assert!(db.get_response_for_request(request.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_generation_config_is_forwarded_unchecked() {
    let (_dir, db) = temp_db().await;
    let upstream = ScriptedUpstream::new(&[]);
    let router = app(upstream.clone(), &["gemini-1.5-flash"], Arc::new(db.clone()));

    // A value the provider rejects is an upstream failure, not a client error
    let rejected = r#"{"prompt":{"text":"hi"},"generation_config":{"temperature":"0.5"}}"#;
    let response = router.clone().oneshot(generate_request(rejected)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = read_json(response).await;
    assert!(json["error"]["attempts"][0]["error"]
        .as_str()
        .unwrap()
        .contains("generation_config.temperature"));

    // Anything the provider accepts goes through
    let accepted = r#"{"prompt":{"text":"hi"},"generation_config":{"max_output_tokens":-1,"top_k":3}}"#;
    let response = router.oneshot(generate_request(accepted)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(upstream.calls(), vec!["gemini-1.5-flash", "gemini-1.5-flash"]);

    let requests = db.recent_request_logs(10).await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].request_body, rejected);
    assert_eq!(requests[0].request_body, accepted);

    let failed = db.get_response_for_request(requests[1].id).await.unwrap().unwrap();
    assert_eq!(failed.status, ResponseStatus::Failed);
    let ok = db.get_response_for_request(requests[0].id).await.unwrap().unwrap();
    assert_eq!(ok.status, ResponseStatus::Success);
}

#[tokio::test]
async fn test_health_and_readiness() {
    let (_dir, db) = temp_db().await;
    let router = app(ScriptedUpstream::new(&[]), &["model-a", "model-b"], Arc::new(db));

    let health = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(read_json(health).await["status"], "healthy");

    let ready = router
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
    let json = read_json(ready).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["models"], json!(["model-a", "model-b"]));
}

#[tokio::test]
async fn test_readiness_reports_broken_store() {
    let router = app(ScriptedUpstream::new(&[]), &["model-a"], Arc::new(BrokenStore));

    let ready = router
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_is_served() {
    let router = app(ScriptedUpstream::new(&[]), &["model-a"], Arc::new(BrokenStore));

    let response = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
