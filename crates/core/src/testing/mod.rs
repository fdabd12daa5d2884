//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of the external service
//! traits, allowing full orchestrator lifecycle testing without real
//! infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use spotnik_core::testing::{fixtures, MockGenerationClient, RecordingCredentialRefresh};
//!
//! let client = MockGenerationClient::new();
//! let refresh = RecordingCredentialRefresh::new();
//!
//! // Configure mock responses
//! client.script_next(kind, vec![/* scripted polls */]).await;
//!
//! // Use in ProductionOrchestrator...
//! ```

mod mock_credentials;
mod mock_generation;

pub use mock_credentials::{RecordingCredentialRefresh, StaticCredentialProvider};
pub use mock_generation::{MockGenerationClient, RecordedStart, ScriptedPoll};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::job::{
        AspectRatio, JobSpec, MediaAsset, MediaKind, OutputFormat, ProductFacts, VoiceSelection,
    };

    /// Create a single-scene job spec with reasonable defaults.
    pub fn job_spec(product_name: &str) -> JobSpec {
        JobSpec {
            product: ProductFacts {
                name: product_name.to_string(),
                tagline: Some(format!("{} changes everything", product_name)),
                description: format!("The {} in action.", product_name),
                selling_points: vec![],
            },
            media: vec![MediaAsset {
                id: "hero-shot".to_string(),
                uri: format!("s3://assets/{}.jpg", product_name.to_lowercase()),
                kind: MediaKind::Image,
            }],
            format: OutputFormat {
                aspect: AspectRatio::Landscape,
                duration_secs: 30,
            },
            voice: None,
        }
    }

    /// Job spec with a voice track selected.
    pub fn job_spec_with_voice(product_name: &str) -> JobSpec {
        let mut spec = job_spec(product_name);
        spec.voice = Some(VoiceSelection {
            voice_id: "narrator-2".to_string(),
            language: "en".to_string(),
        });
        spec
    }

    /// Multi-scene job spec with one selling point per scene.
    pub fn multi_scene_spec(product_name: &str, scenes: usize) -> JobSpec {
        let mut spec = job_spec(product_name);
        spec.product.selling_points = (0..scenes)
            .map(|i| format!("{} benefit {}", product_name, i + 1))
            .collect();
        spec
    }
}
