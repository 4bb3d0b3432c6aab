//! Character registry.
//!
//! Keeps the named characters met during an adventure, with portraits used
//! both in the gallery and as reference input for later scene images.
//! Names are the natural key and are matched case-sensitively.

use crate::config::GameSettings;
use crate::generator::{portrait_prompt, ImageGenerator, ImageKind, ImageRequest};
use crate::image::EncodedImage;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

/// A character introduced by the story generator that may need a portrait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterCandidate {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub visual_description: String,
    #[serde(default)]
    pub is_main_character: bool,
}

impl CharacterCandidate {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            visual_description: String::new(),
            is_main_character: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.visual_description = description.into();
        self
    }

    pub fn main(mut self) -> Self {
        self.is_main_character = true;
        self
    }
}

/// A known character with a generated portrait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterPortrait {
    /// Synthetic identity for stable list rendering.
    pub id: String,
    pub name: String,
    pub role: String,
    pub visual_description: String,
    #[serde(rename = "portraitBase64")]
    pub portrait_image: EncodedImage,
    pub is_main_character: bool,
}

impl CharacterPortrait {
    pub fn from_candidate(candidate: CharacterCandidate, portrait_image: EncodedImage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: candidate.name,
            role: candidate.role,
            visual_description: candidate.visual_description,
            portrait_image,
            is_main_character: candidate.is_main_character,
        }
    }
}

/// Drop candidates whose name is already known, or repeated earlier in the
/// same batch.
pub fn resolve_new_characters(
    candidates: &[CharacterCandidate],
    known: &[&str],
) -> Vec<CharacterCandidate> {
    let mut fresh: Vec<CharacterCandidate> = Vec::new();
    for candidate in candidates {
        let name = candidate.name.as_str();
        if name.trim().is_empty() || known.contains(&name) {
            continue;
        }
        if fresh.iter().any(|c| c.name == name) {
            continue;
        }
        fresh.push(candidate.clone());
    }
    fresh
}

/// Request one portrait per candidate, concurrently.
///
/// A failed request leaves that character out of the result; the others are
/// unaffected and nothing is retried.
pub async fn request_portraits(
    images: &dyn ImageGenerator,
    candidates: Vec<CharacterCandidate>,
    settings: &GameSettings,
) -> Vec<CharacterPortrait> {
    let requests = candidates.into_iter().map(|candidate| async move {
        let request = ImageRequest {
            prompt: portrait_prompt(&candidate, settings.art_style.prompt()),
            kind: ImageKind::Portrait,
            size: settings.image_size,
            reference_images: Vec::new(),
        };
        match images.generate_image(request).await {
            Ok(image) if !image.is_empty() => {
                tracing::debug!(name = %candidate.name, "Portrait ready");
                Some(CharacterPortrait::from_candidate(candidate, image))
            }
            Ok(_) => {
                tracing::warn!(name = %candidate.name, "Portrait came back empty");
                None
            }
            Err(e) => {
                tracing::warn!(name = %candidate.name, error = %e, "Portrait generation failed");
                None
            }
        }
    });

    join_all(requests).await.into_iter().flatten().collect()
}

/// Existing characters in their original order, then the new ones.
pub fn merge(
    existing: Vec<CharacterPortrait>,
    newly_generated: Vec<CharacterPortrait>,
) -> Vec<CharacterPortrait> {
    let mut combined = existing;
    combined.extend(newly_generated);
    combined
}

/// Gallery order: the highlighted character first, then main characters,
/// otherwise the original order.
pub fn order_for_display<'a>(
    characters: &'a [CharacterPortrait],
    highlight: Option<&str>,
) -> Vec<&'a CharacterPortrait> {
    let mut ordered: Vec<&CharacterPortrait> = characters.iter().collect();
    ordered.sort_by_key(|c| (Some(c.name.as_str()) != highlight, !c.is_main_character));
    ordered
}

/// Portraits of the named characters, in the order given. Unknown names and
/// characters without a portrait are skipped.
pub fn reference_portraits(characters: &[CharacterPortrait], names: &[String]) -> Vec<EncodedImage> {
    names
        .iter()
        .filter_map(|name| characters.iter().find(|c| &c.name == name))
        .filter(|c| !c.portrait_image.is_empty())
        .map(|c| c.portrait_image.clone())
        .collect()
}
