use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Generation service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Base URL of the generation service (e.g. "https://genapi.example.com")
    pub base_url: String,
    /// API key; overridable at call time via the credential provider
    /// (SPOTNIK_API_KEY environment variable).
    #[serde(default)]
    pub api_key: String,
    /// Model used for video generation operations
    #[serde(default = "default_video_model")]
    pub video_model: String,
    /// Model used for voice synthesis operations
    #[serde(default = "default_voice_model")]
    pub voice_model: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u32,
}

fn default_video_model() -> String {
    "vidgen-2".to_string()
}

fn default_voice_model() -> String {
    "voxgen-1".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub generation: SanitizedGenerationConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Sanitized generation config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGenerationConfig {
    pub base_url: String,
    pub api_key_configured: bool,
    pub video_model: String,
    pub voice_model: String,
    pub request_timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            generation: SanitizedGenerationConfig {
                base_url: config.generation.base_url.clone(),
                api_key_configured: !config.generation.api_key.is_empty(),
                video_model: config.generation.video_model.clone(),
                voice_model: config.generation.voice_model.clone(),
                request_timeout_secs: config.generation.request_timeout_secs,
            },
            orchestrator: config.orchestrator.clone(),
        }
    }
}
