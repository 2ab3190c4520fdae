//! Text generator backed by the Gemini `generateContent` endpoint.

use adapter_common::{error_text, join_url, read_failure};
use core_model::{GenerationError, TextGenerator};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-flash-latest";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = join_url(
            &self.base_url,
            &format!("v1beta/models/{}:generateContent", self.model),
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        info!(model = %self.model, prompt_chars = prompt.chars().count(), "requesting generation");
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| GenerationError::Failed {
                status: e.status().map(|s| s.as_u16()),
                detail: error_text(e),
            })?;

        if !response.status().is_success() {
            let (code, body) = read_failure(response);
            return Err(classify_failure(code, &body));
        }

        let payload: GenerateResponse = response.json().map_err(|e| GenerationError::Failed {
            status: None,
            detail: format!("invalid response payload: {}", error_text(e)),
        })?;
        extract_text(payload)
    }
}

fn classify_failure(code: u16, body: &str) -> GenerationError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let api_status = parsed.as_ref().and_then(|e| e.error.status.clone());
    let detail = parsed
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| body.to_string());
    if code == 429 || api_status.as_deref() == Some("RESOURCE_EXHAUSTED") {
        warn!(status = code, "generation quota exhausted");
        return GenerationError::RateLimited { detail };
    }
    GenerationError::Failed {
        status: Some(code),
        detail,
    }
}

fn extract_text(payload: GenerateResponse) -> Result<String, GenerationError> {
    if let Some(reason) = payload.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Failed {
            status: None,
            detail: format!("prompt blocked: {reason}"),
        });
    }
    let Some(candidate) = payload.candidates.into_iter().next() else {
        return Err(GenerationError::Empty);
    };
    debug!(finish_reason = ?candidate.finish_reason, "generation finished");
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GEN_PATH: &str = "/v1beta/models/gemini-flash-latest:generateContent";

    fn generator(base: String) -> GeminiClient {
        let client = adapter_common::http_client(Duration::from_secs(5)).unwrap();
        GeminiClient::new(client, base, DEFAULT_MODEL, "secret")
    }

    fn run(base: String, prompt: &'static str) -> Result<String, GenerationError> {
        generator(base).generate(prompt)
    }

    #[tokio::test]
    async fn generate_success_joins_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .and(query_param("key", "secret"))
            .and(body_json(serde_json::json!({
                "contents": [{ "parts": [{ "text": "describe the nebula" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{ "text": "A wondrous " }, { "text": "pillar of gas...\n" }]
                    },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = server.uri();
        let text = tokio::task::spawn_blocking(move || run(base, "describe the nebula"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "A wondrous pillar of gas...");
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted (e.g. check quota).",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .mount(&server)
            .await;

        let base = server.uri();
        let result = tokio::task::spawn_blocking(move || run(base, "p"))
            .await
            .unwrap();
        match result {
            Err(GenerationError::RateLimited { detail }) => {
                assert!(detail.contains("exhausted"));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_failures_keep_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid.",
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&server)
            .await;

        let base = server.uri();
        let result = tokio::task::spawn_blocking(move || run(base, "p"))
            .await
            .unwrap();
        match result {
            Err(GenerationError::Failed { status, detail }) => {
                assert_eq!(status, Some(400));
                assert_eq!(detail, "API key not valid.");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_candidates_are_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "   " }] } }]
            })))
            .mount(&server)
            .await;

        let base = server.uri();
        let result = tokio::task::spawn_blocking(move || run(base, "p"))
            .await
            .unwrap();
        assert!(matches!(result, Err(GenerationError::Empty)));
    }

    #[test]
    fn send_failure_does_not_expose_api_key() {
        let client = adapter_common::http_client(Duration::from_secs(2)).unwrap();
        let gemini = GeminiClient::new(client, "http://127.0.0.1:9", DEFAULT_MODEL, "SUPERSECRET");
        let err = gemini.generate("hello").unwrap_err();
        assert!(matches!(err, GenerationError::Failed { status: None, .. }));
        let shown = err.to_string();
        assert!(!shown.contains("SUPERSECRET"), "{shown}");
    }

    #[tokio::test]
    async fn malformed_payload_does_not_expose_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let base = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            let client = adapter_common::http_client(Duration::from_secs(5)).unwrap();
            GeminiClient::new(client, base, DEFAULT_MODEL, "SUPERSECRET").generate("hi")
        })
        .await
        .unwrap()
        .unwrap_err();
        let shown = err.to_string();
        assert!(shown.contains("invalid response payload"), "{shown}");
        assert!(!shown.contains("SUPERSECRET"), "{shown}");
    }

    #[test]
    fn blocked_prompt_is_failure() {
        let payload: GenerateResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        match extract_text(payload) {
            Err(GenerationError::Failed { detail, .. }) => assert!(detail.contains("SAFETY")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn classify_plain_text_body() {
        match classify_failure(500, "internal") {
            GenerationError::Failed { status, detail } => {
                assert_eq!(status, Some(500));
                assert_eq!(detail, "internal");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(matches!(
            classify_failure(429, "slow down"),
            GenerationError::RateLimited { .. }
        ));
    }
}
