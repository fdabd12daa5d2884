//! Creative brief derivation.
//!
//! Runs synchronously while a job is Initiating, before any remote
//! operation starts. Failures here fail the job directly; there is no poll
//! loop to clean up yet.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{JobSpec, MediaKind};

/// Errors from brief derivation.
#[derive(Debug, Error)]
pub enum BriefError {
    /// The product facts carry nothing to build scenes from.
    #[error("product facts are empty: a name is required")]
    EmptyProduct,

    /// The requested duration cannot hold the planned scenes.
    #[error("duration of {duration_secs}s is too short for {scenes} scenes")]
    DurationTooShort { duration_secs: u32, scenes: usize },
}

/// Plan for one scene of the artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneBrief {
    /// Scene index, 0-based; also the sub-task key.
    pub index: u32,
    /// Generation prompt for this scene.
    pub prompt: String,
    /// Target scene duration in seconds.
    pub duration_secs: u32,
    /// Media asset ids referenced by this scene.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_ids: Vec<String>,
}

/// Derived production plan: ready before any scene starts rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreativeBrief {
    pub scenes: Vec<SceneBrief>,
    /// Narration script, present iff the job spec selected a voice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_script: Option<String>,
}

impl CreativeBrief {
    pub fn is_multi_scene(&self) -> bool {
        self.scenes.len() > 1
    }
}

/// Derive a creative brief from a frozen job spec.
///
/// One scene per selling point (capped at `max_scenes`); a spec without
/// selling points gets a single scene built from the description. Media
/// assets are distributed round-robin across scenes, logos go everywhere.
pub fn derive_brief(spec: &JobSpec, max_scenes: usize) -> Result<CreativeBrief, BriefError> {
    let product = &spec.product;
    if product.name.trim().is_empty() {
        return Err(BriefError::EmptyProduct);
    }

    let points: Vec<&str> = product
        .selling_points
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .take(max_scenes.max(1))
        .collect();

    let scene_count = points.len().max(1);
    if spec.format.duration_secs < scene_count as u32 {
        return Err(BriefError::DurationTooShort {
            duration_secs: spec.format.duration_secs,
            scenes: scene_count,
        });
    }
    let per_scene_secs = (spec.format.duration_secs / scene_count as u32).max(1);

    let logos: Vec<String> = spec
        .media
        .iter()
        .filter(|m| m.kind == MediaKind::Logo)
        .map(|m| m.id.clone())
        .collect();
    let footage: Vec<&crate::job::MediaAsset> = spec
        .media
        .iter()
        .filter(|m| m.kind != MediaKind::Logo)
        .collect();

    let mut scenes = Vec::with_capacity(scene_count);
    for index in 0..scene_count {
        let focus = points
            .get(index)
            .copied()
            .unwrap_or(product.description.trim());

        let mut prompt = format!("{}: {}", product.name, focus);
        if let Some(tagline) = product.tagline.as_deref().filter(|t| !t.trim().is_empty()) {
            prompt.push_str(&format!(" Tagline: {}.", tagline.trim()));
        }
        prompt.push_str(&format!(
            " Commercial footage, {} aspect.",
            spec.format.aspect.as_str()
        ));

        let mut media_ids = logos.clone();
        if !footage.is_empty() {
            media_ids.push(footage[index % footage.len()].id.clone());
        }

        scenes.push(SceneBrief {
            index: index as u32,
            prompt,
            duration_secs: per_scene_secs,
            media_ids,
        });
    }

    let voice_script = spec.voice.as_ref().map(|_| build_voice_script(spec, &points));

    Ok(CreativeBrief {
        scenes,
        voice_script,
    })
}

/// Narration script covering the product pitch across the planned scenes.
fn build_voice_script(spec: &JobSpec, points: &[&str]) -> String {
    let product = &spec.product;
    let mut script = String::new();

    match product.tagline.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(tagline) => script.push_str(&format!("{}. {}.", product.name, tagline.trim())),
        None => script.push_str(&format!("Introducing {}.", product.name)),
    }

    if points.is_empty() {
        let description = product.description.trim();
        if !description.is_empty() {
            script.push(' ');
            script.push_str(description);
        }
    } else {
        for point in points {
            script.push(' ');
            script.push_str(point);
            if !point.ends_with('.') {
                script.push('.');
            }
        }
    }

    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AspectRatio, JobSpec, MediaAsset, OutputFormat, ProductFacts, VoiceSelection};

    fn base_spec() -> JobSpec {
        JobSpec {
            product: ProductFacts {
                name: "Solar Kettle".to_string(),
                tagline: Some("Boil anywhere".to_string()),
                description: "A portable solar-powered kettle.".to_string(),
                selling_points: vec![],
            },
            media: vec![],
            format: OutputFormat {
                aspect: AspectRatio::Landscape,
                duration_secs: 30,
            },
            voice: None,
        }
    }

    #[test]
    fn test_single_scene_from_description() {
        let brief = derive_brief(&base_spec(), 6).unwrap();
        assert_eq!(brief.scenes.len(), 1);
        assert!(!brief.is_multi_scene());
        assert!(brief.scenes[0].prompt.contains("Solar Kettle"));
        assert!(brief.scenes[0].prompt.contains("16:9"));
        assert_eq!(brief.scenes[0].duration_secs, 30);
        assert!(brief.voice_script.is_none());
    }

    #[test]
    fn test_one_scene_per_selling_point() {
        let mut spec = base_spec();
        spec.product.selling_points = vec![
            "Boils in 4 minutes".to_string(),
            "No fuel needed".to_string(),
            "Folds flat".to_string(),
        ];
        let brief = derive_brief(&spec, 6).unwrap();
        assert_eq!(brief.scenes.len(), 3);
        assert!(brief.scenes[1].prompt.contains("No fuel needed"));
        assert_eq!(brief.scenes[0].duration_secs, 10);
    }

    #[test]
    fn test_scene_cap_applies() {
        let mut spec = base_spec();
        spec.product.selling_points = (0..10).map(|i| format!("point {}", i)).collect();
        let brief = derive_brief(&spec, 4).unwrap();
        assert_eq!(brief.scenes.len(), 4);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut spec = base_spec();
        spec.product.name = "   ".to_string();
        assert!(matches!(
            derive_brief(&spec, 6),
            Err(BriefError::EmptyProduct)
        ));
    }

    #[test]
    fn test_duration_too_short() {
        let mut spec = base_spec();
        spec.product.selling_points = (0..5).map(|i| format!("point {}", i)).collect();
        spec.format.duration_secs = 3;
        assert!(matches!(
            derive_brief(&spec, 6),
            Err(BriefError::DurationTooShort { .. })
        ));
    }

    #[test]
    fn test_voice_script_present_iff_voice_selected() {
        let mut spec = base_spec();
        spec.voice = Some(VoiceSelection {
            voice_id: "narrator-2".to_string(),
            language: "en".to_string(),
        });
        spec.product.selling_points = vec!["Boils in 4 minutes".to_string()];

        let brief = derive_brief(&spec, 6).unwrap();
        let script = brief.voice_script.unwrap();
        assert!(script.contains("Solar Kettle"));
        assert!(script.contains("Boils in 4 minutes"));
    }

    #[test]
    fn test_logos_attached_to_every_scene() {
        let mut spec = base_spec();
        spec.product.selling_points = vec!["a".to_string(), "b".to_string()];
        spec.media = vec![
            MediaAsset {
                id: "logo-1".to_string(),
                uri: "s3://assets/logo.png".to_string(),
                kind: MediaKind::Logo,
            },
            MediaAsset {
                id: "shot-1".to_string(),
                uri: "s3://assets/shot1.jpg".to_string(),
                kind: MediaKind::Image,
            },
        ];
        let brief = derive_brief(&spec, 6).unwrap();
        for scene in &brief.scenes {
            assert!(scene.media_ids.contains(&"logo-1".to_string()));
        }
        assert!(brief.scenes[0].media_ids.contains(&"shot-1".to_string()));
    }
}
