//! Test utilities for spendlens-core
//!
//! This module provides a mock Gemini server that speaks just enough of the
//! Generative Language REST API for development and integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::ai::gemini::{Candidate, Content, GenerateContentRequest, GenerateContentResponse};
use crate::ai::MOCK_SUGGESTIONS;

/// API key the mock server accepts
pub const MOCK_API_KEY: &str = "test-key";

#[derive(Clone)]
struct ServerState {
    reply: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// A generateContent call as seen by the mock server
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub model: String,
    pub user_text: String,
    pub system_text: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Mock Gemini server for testing and development
pub struct MockGeminiServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGeminiServer {
    /// Start the mock server on an available port, replying with canned suggestions
    pub async fn start() -> Self {
        Self::start_with_reply(MOCK_SUGGESTIONS).await
    }

    /// Start the mock server replying with `reply` as the model text
    pub async fn start_with_reply(reply: &str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            reply: reply.to_string(),
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/v1beta/models/:action", get(handle_model).post(handle_generate))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every generateContent request received so far
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGeminiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

fn authorised(query: &KeyQuery) -> bool {
    query.key.as_deref() == Some(MOCK_API_KEY)
}

/// Model metadata endpoint (health check)
async fn handle_model(
    Path(action): Path<String>,
    Query(query): Query<KeyQuery>,
) -> StatusCode {
    if !authorised(&query) {
        StatusCode::UNAUTHORIZED
    } else if action.contains(':') {
        StatusCode::METHOD_NOT_ALLOWED
    } else {
        StatusCode::OK
    }
}

/// `models/<name>:generateContent`
async fn handle_generate(
    State(state): State<ServerState>,
    Path(action): Path<String>,
    Query(query): Query<KeyQuery>,
    Json(request): Json<GenerateContentRequest>,
) -> Result<Json<GenerateContentResponse>, StatusCode> {
    if !authorised(&query) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let Some(model) = action.strip_suffix(":generateContent") else {
        return Err(StatusCode::NOT_FOUND);
    };

    state.requests.lock().unwrap().push(CapturedRequest {
        model: model.to_string(),
        user_text: first_text(request.contents.first()),
        system_text: request
            .system_instruction
            .as_ref()
            .map(|c| first_text(Some(c))),
        temperature: request.generation_config.temperature,
        max_output_tokens: request.generation_config.max_output_tokens,
    });

    Ok(Json(GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content::text(Some("model"), &state.reply)),
        }],
    }))
}

fn first_text(content: Option<&Content>) -> String {
    content
        .and_then(|c| c.parts.first())
        .and_then(|p| p.text.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{parse_ai_suggestions, AIBackend, GeminiBackend};

    fn backend(server: &MockGeminiServer) -> GeminiBackend {
        GeminiBackend::new(MOCK_API_KEY, "gemini-test").with_host(&server.url())
    }

    #[tokio::test]
    async fn test_mock_server_health_check() {
        let server = MockGeminiServer::start().await;
        assert!(backend(&server).health_check().await);

        let wrong_key = GeminiBackend::new("nope", "gemini-test").with_host(&server.url());
        assert!(!wrong_key.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_server_generate() {
        let server = MockGeminiServer::start().await;
        let text = backend(&server)
            .with_system_instruction("Be kind")
            .generate_text("What should I cut?", Some("ignored"))
            .await
            .unwrap();

        assert_eq!(parse_ai_suggestions(&text).unwrap().len(), 2);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gemini-test");
        assert_eq!(requests[0].user_text, "What should I cut?");
        assert_eq!(requests[0].system_text.as_deref(), Some("Be kind"));
        assert_eq!(requests[0].max_output_tokens, 2048);
    }

    #[tokio::test]
    async fn test_mock_server_rejects_bad_key() {
        let server = MockGeminiServer::start().await;
        let result = GeminiBackend::new("nope", "gemini-test")
            .with_host(&server.url())
            .generate_text("hi", None)
            .await;
        assert!(matches!(result, Err(crate::Error::Http(_))));
    }

    #[tokio::test]
    async fn test_custom_reply_is_trimmed() {
        let server = MockGeminiServer::start_with_reply("  plain text  ").await;
        let text = backend(&server).generate_text("hi", None).await.unwrap();
        assert_eq!(text, "plain text");
    }
}
