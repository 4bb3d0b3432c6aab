//! Shared fixtures for integration tests.

#![allow(dead_code)]

use adventure_core::characters::{CharacterCandidate, CharacterPortrait};
use adventure_core::conversation::{ChatMessage, ConversationLogs, HistoryEntry};
use adventure_core::image::EncodedImage;
use adventure_core::inventory::QuestItem;
use adventure_core::persist::SaveData;
use adventure_core::scene::{Choice, Scene, Segment};

/// A solid red PNG of the given size.
pub fn red_png(width: u32, height: u32) -> Vec<u8> {
    let pixels: Vec<u8> = std::iter::repeat([255u8, 0, 0])
        .take((width * height) as usize)
        .flatten()
        .collect();

    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().expect("png header");
        writer.write_image_data(&pixels).expect("png data");
    }
    bytes
}

pub fn red_image() -> EncodedImage {
    EncodedImage::png(&red_png(10, 10))
}

/// A save with one scene per entry of `images`, each scene holding one
/// segment per image.
pub fn save_fixture(id: &str, updated_at: i64, scenes: &[&[EncodedImage]]) -> SaveData {
    let scene_history: Vec<Scene> = scenes
        .iter()
        .enumerate()
        .map(|(sci, images)| {
            let segments = images
                .iter()
                .enumerate()
                .map(|(segi, image)| Segment {
                    text: format!("{id} scene {sci} segment {segi}"),
                    image: image.clone(),
                })
                .collect();
            Scene::new(segments, vec![Choice::new("Onward"), Choice::new("Back")])
        })
        .collect();

    let mut logs = ConversationLogs::new();
    logs.record("Eliot", vec![ChatMessage::player("Hello"), ChatMessage::character("Well met.")]);

    SaveData {
        id: id.to_string(),
        name: format!("Adventure {id}"),
        created_at: 1_700_000_000_000,
        updated_at,
        current_scene_index: scene_history.len().saturating_sub(1),
        thumbnail: scene_history
            .last()
            .map(Scene::first_image)
            .unwrap_or_default(),
        scene_history,
        inventory: vec!["lantern".to_string(), "rope".to_string()],
        quests: vec![QuestItem::done("Find the ferry"), QuestItem::open("Cross the river")],
        story_history: vec![HistoryEntry::user("Begin"), HistoryEntry::model("{}")],
        turn_count: scenes.len() as u32,
        is_game_over: false,
        game_over_message: String::new(),
        character_visual_identity: "young woman, green cloak".to_string(),
        location_visual_identity: "river bank".to_string(),
        known_characters: vec![CharacterPortrait::from_candidate(
            CharacterCandidate::new("Eliot", "Ferryman").with_description("old, bearded"),
            EncodedImage::png(&red_png(4, 4)),
        )],
        conversation_logs: logs,
    }
}
