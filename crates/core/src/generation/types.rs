//! Types for remote generation operations.

use serde::{Deserialize, Serialize};

/// What a remote long-running operation produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Scene or full-spot video generation.
    VideoGeneration,
    /// Voice track synthesis.
    VoiceSynthesis,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::VideoGeneration => "video_generation",
            OperationKind::VoiceSynthesis => "voice_synthesis",
        }
    }
}

/// Parameters for starting one remote operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationRequest {
    /// Generation prompt (scene prompt or voice script).
    pub prompt: String,
    /// Referenced media asset URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_uris: Vec<String>,
    /// Aspect ratio parameter (video only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,
    /// Target duration in seconds (video only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    /// Voice id (voice synthesis only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// ISO 639-1 language code (voice synthesis only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl OperationRequest {
    /// Request for a video generation operation.
    pub fn video(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            media_uris: vec![],
            aspect: None,
            duration_secs: None,
            voice_id: None,
            language: None,
        }
    }

    /// Request for a voice synthesis operation.
    pub fn voice(
        script: impl Into<String>,
        voice_id: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            prompt: script.into(),
            media_uris: vec![],
            aspect: None,
            duration_secs: None,
            voice_id: Some(voice_id.into()),
            language: Some(language.into()),
        }
    }

    pub fn with_media(mut self, uris: Vec<String>) -> Self {
        self.media_uris = uris;
        self
    }

    pub fn with_aspect(mut self, aspect: impl Into<String>) -> Self {
        self.aspect = Some(aspect.into());
        self
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// Successful start of a remote operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartedOperation {
    /// Opaque token identifying the operation at the service.
    pub remote_ref: String,
}

/// Output of a successfully completed operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutput {
    /// Where the generated media landed.
    pub media_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One poll observation of a remote operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationPoll {
    /// True once the operation reached a terminal state at the service.
    pub done: bool,
    /// Present iff done and the operation succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OperationOutput>,
    /// Present iff done and the operation failed remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RawFailure>,
    /// Service-reported progress note, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_note: Option<String>,
}

impl OperationPoll {
    pub fn running(note: Option<String>) -> Self {
        Self {
            done: false,
            output: None,
            failure: None,
            progress_note: note,
        }
    }

    pub fn succeeded(output: OperationOutput) -> Self {
        Self {
            done: true,
            output: Some(output),
            failure: None,
            progress_note: None,
        }
    }

    pub fn failed(failure: RawFailure) -> Self {
        Self {
            done: true,
            output: None,
            failure: Some(failure),
            progress_note: None,
        }
    }
}

/// A raw failure from a remote call attempt, as the classifier sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawFailure {
    /// HTTP-ish status code when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub message: String,
}

impl RawFailure {
    pub fn http(code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RawFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (status {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RawFailure {}

/// Credential snapshot passed to every remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    #[doc(hidden)]
    pub project_id: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}
