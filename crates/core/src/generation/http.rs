//! HTTP generation service backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::job::OperationHandle;

use super::{
    CredentialProvider, GenerationClient, OperationKind, OperationOutput, OperationPoll,
    OperationRequest, RawFailure, StartedOperation,
};

/// Generation client speaking a JSON long-running-operations API.
pub struct HttpGenerationClient {
    client: Client,
    config: GenerationConfig,
    credentials: Arc<dyn CredentialProvider>,
}

#[derive(Debug, Serialize)]
struct StartOperationBody<'a> {
    kind: &'static str,
    model: &'a str,
    #[serde(flatten)]
    request: &'a OperationRequest,
}

#[derive(Debug, Deserialize)]
struct StartOperationResponse {
    operation: String,
}

#[derive(Debug, Deserialize)]
struct PollResponseBody {
    done: bool,
    #[serde(default)]
    output: Option<PollOutputBody>,
    #[serde(default)]
    error: Option<PollErrorBody>,
    #[serde(default)]
    progress: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PollOutputBody {
    media_url: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PollErrorBody {
    #[serde(default)]
    code: Option<u16>,
    message: String,
}

impl HttpGenerationClient {
    pub fn new(config: GenerationConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            credentials,
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn model_for(&self, kind: OperationKind) -> &str {
        match kind {
            OperationKind::VideoGeneration => &self.config.video_model,
            OperationKind::VoiceSynthesis => &self.config.voice_model,
        }
    }

    fn transport_failure(err: reqwest::Error) -> RawFailure {
        if err.is_timeout() {
            return RawFailure::message("request timed out");
        }
        match err.status() {
            Some(status) => RawFailure::http(status.as_u16(), err.to_string()),
            None => RawFailure::message(err.to_string()),
        }
    }

    async fn failure_from_response(response: reqwest::Response) -> RawFailure {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let summary: String = body.chars().take(200).collect();
        RawFailure::http(status, summary)
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn start_operation(
        &self,
        kind: OperationKind,
        request: &OperationRequest,
    ) -> Result<StartedOperation, RawFailure> {
        // Credential snapshot read at call time, never cached across calls.
        let credentials = self.credentials.snapshot();
        let url = format!("{}/v1/operations", self.base_url());

        let body = StartOperationBody {
            kind: kind.as_str(),
            model: self.model_for(kind),
            request,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_failure)?;

        if !response.status().is_success() {
            return Err(Self::failure_from_response(response).await);
        }

        let parsed: StartOperationResponse = response
            .json()
            .await
            .map_err(|e| RawFailure::message(format!("malformed start response: {}", e)))?;

        debug!("Started {} operation: {}", kind.as_str(), parsed.operation);
        Ok(StartedOperation {
            remote_ref: parsed.operation,
        })
    }

    async fn poll_operation(&self, handle: &OperationHandle) -> Result<OperationPoll, RawFailure> {
        let credentials = self.credentials.snapshot();
        let url = format!("{}/v1/operations/{}", self.base_url(), handle.remote_ref);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&credentials.api_key)
            .send()
            .await
            .map_err(Self::transport_failure)?;

        if !response.status().is_success() {
            return Err(Self::failure_from_response(response).await);
        }

        let parsed: PollResponseBody = response
            .json()
            .await
            .map_err(|e| RawFailure::message(format!("malformed poll response: {}", e)))?;

        if !parsed.done {
            return Ok(OperationPoll::running(parsed.progress));
        }

        if let Some(error) = parsed.error {
            return Ok(OperationPoll::failed(RawFailure {
                code: error.code,
                message: error.message,
            }));
        }

        match parsed.output {
            Some(output) => Ok(OperationPoll::succeeded(OperationOutput {
                media_url: output.media_url,
                mime_type: output.mime_type,
            })),
            // Done with neither output nor error is a service contract bug.
            None => Ok(OperationPoll::failed(RawFailure::message(
                "operation finished without output or error",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_response_parsing() {
        let running: PollResponseBody =
            serde_json::from_str(r#"{"done": false, "progress": "rendering frame 42"}"#).unwrap();
        assert!(!running.done);
        assert_eq!(running.progress.as_deref(), Some("rendering frame 42"));

        let done: PollResponseBody = serde_json::from_str(
            r#"{"done": true, "output": {"media_url": "https://cdn/out.mp4"}}"#,
        )
        .unwrap();
        assert!(done.done);
        assert_eq!(done.output.unwrap().media_url, "https://cdn/out.mp4");

        let failed: PollResponseBody = serde_json::from_str(
            r#"{"done": true, "error": {"code": 429, "message": "quota exceeded"}}"#,
        )
        .unwrap();
        assert_eq!(failed.error.unwrap().code, Some(429));
    }

    #[test]
    fn test_start_body_serialization() {
        let request = OperationRequest::video("a kettle").with_aspect("16:9");
        let body = StartOperationBody {
            kind: "video_generation",
            model: "vidgen-2",
            request: &request,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "video_generation");
        assert_eq!(json["model"], "vidgen-2");
        assert_eq!(json["prompt"], "a kettle");
        assert_eq!(json["aspect"], "16:9");
    }
}
