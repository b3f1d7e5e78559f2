//! Upstream client for the generative-language API.
//!
//! One prompt in, one extracted text payload out. Purely request/response:
//! no retries, no caching, no persistent connection assumptions. The
//! [`Upstream`] trait is the seam the orchestrator and session controller
//! depend on, so tests run against deterministic stubs instead of a live
//! endpoint.
//!
//! Text extraction follows the provider's response shape:
//! `candidates[0].content.parts[0].text` when generation completed normally;
//! otherwise a non-`STOP` finish reason maps to [`UpstreamError::Incomplete`],
//! a prompt-feedback block reason to [`UpstreamError::Blocked`], and anything
//! else to [`UpstreamError::MalformedResponse`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::UpstreamError;

/// A single-call generative upstream.
///
/// `grounding` requests live web augmentation from the service; it shapes
/// the request body and is not a behavioral branch in the client.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn call(&self, prompt: &str, grounding: bool) -> Result<String, UpstreamError>;
}

/// Production implementation over the `generateContent` HTTP endpoint.
pub struct GenerativeClient {
    http: reqwest::Client,
    endpoint_base: String,
    model: String,
    api_key: String,
}

impl GenerativeClient {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint_base: config.endpoint_base.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        let base = self.endpoint_base.trim_end_matches('/');
        format!(
            "{}/{}:generateContent?key={}",
            base, self.model, self.api_key
        )
    }
}

#[async_trait]
impl Upstream for GenerativeClient {
    async fn call(&self, prompt: &str, grounding: bool) -> Result<String, UpstreamError> {
        debug!(
            model = %self.model,
            grounding,
            prompt_len = prompt.len(),
            "upstream call"
        );

        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            tools: grounding.then(|| {
                vec![Tool {
                    google_search: GoogleSearch {},
                }]
            }),
        };

        let response = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                message: error_message(&raw),
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&raw).map_err(|_| UpstreamError::MalformedResponse)?;
        extract_text(parsed)
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "googleSearch")]
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PromptFeedback {
    block_reason: Option<String>,
    block_reason_message: Option<String>,
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Pull the text payload out of a parsed response, or classify why there
/// is none.
fn extract_text(response: GenerateResponse) -> Result<String, UpstreamError> {
    if let Some(candidate) = response.candidates.into_iter().next() {
        let text = candidate
            .content
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text);
        if let Some(text) = text {
            return Ok(text);
        }
        if let Some(reason) = candidate.finish_reason {
            if reason != "STOP" {
                return Err(UpstreamError::Incomplete { reason });
            }
        }
    }

    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            let reason = match feedback.block_reason_message {
                Some(message) => format!("{reason}: {message}"),
                None => reason,
            };
            return Err(UpstreamError::Blocked { reason });
        }
    }

    Err(UpstreamError::MalformedResponse)
}

/// Best-effort extraction of `error.message` from a non-success body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}
