//! Play a short scripted adventure without any API and back it up.
//!
//! Run with: `cargo run -p adventure-core --example offline_session`

use adventure_core::backup::{backup_file_name, backup_store, decode_backup};
use adventure_core::characters::CharacterCandidate;
use adventure_core::config::EngineConfig;
use adventure_core::engine::{TurnEngine, TurnEvent};
use adventure_core::persist::{JsonDirSaveStore, SaveStore};
use adventure_core::scene::DialogueConfig;
use adventure_core::testing::{ScriptedImageGenerator, ScriptedStoryGenerator, UpdateBuilder};
use adventure_core::ChatMessage;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Offline adventure ===\n");

    let story = ScriptedStoryGenerator::new()
        .then(
            UpdateBuilder::new()
                .segment("Fog sits on the river like wet wool.", "fog over a river at dawn")
                .segment("A ferry bell rings somewhere ahead.", "an old brass bell on a post")
                .choice("Follow the bell")
                .choice("Wait on the bank")
                .add_item("lantern")
                .quest("Cross the river", false)
                .identity("young woman, green cloak", "misty river bank")
                .new_character(CharacterCandidate::new("Eliot", "Ferryman").with_description("old, bearded"))
                .talkable(DialogueConfig::new("Eliot", "Ferryman"))
                .visible("Eliot")
                .build(),
        )
        .then(
            UpdateBuilder::new()
                .segment("Eliot pushes off. The far bank appears.", "ferry crossing a misty river")
                .segment("You step ashore, dry and whole.", "a traveler stepping onto a dock")
                .quest("Cross the river", true)
                .remove_item("lantern")
                .game_over("You made the crossing.")
                .build(),
        );

    let dir = std::env::temp_dir().join("adventure-offline-demo");
    let store = Arc::new(JsonDirSaveStore::new(&dir));
    let engine = TurnEngine::new(
        Arc::new(story),
        Arc::new(ScriptedImageGenerator::new()),
        store.clone(),
        Default::default(),
    );

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TurnEvent::StoryReady { handle, .. } => println!("   [turn {}] story ready", handle.turn),
                TurnEvent::ImageReady { segment_index, .. } => println!("   image {segment_index} ready"),
                TurnEvent::AllImagesReady { .. } => println!("   all images ready"),
                TurnEvent::Saved { save_id } => println!("   saved {save_id}"),
                TurnEvent::SaveFailed { message } | TurnEvent::Failed { message } => {
                    println!("   error: {message}")
                }
            }
        }
    });

    println!("1. Opening scene...");
    let opening = engine.start_game(EngineConfig::new("The Ferry")).await?;
    println!("{}\n", opening.narrative());

    println!("2. Talking to Eliot...");
    engine.record_conversation(
        "Eliot",
        vec![
            ChatMessage::player("Is the crossing safe?"),
            ChatMessage::character("Safe as the river allows."),
        ],
    )?;

    println!("3. Following the bell...");
    let ending = engine.submit_action("Follow the bell").await?;
    println!("{}\n", ending.narrative());
    println!("   Game over: {}", ending.is_game_over());

    println!("\n4. Backing up {}...", dir.display());
    let archive = backup_store(&*store, |p| println!("   {:>5.1}% {}", p.percent, p.message)).await?;
    let (manifest, saves) = decode_backup(&archive)?;
    let name = backup_file_name(chrono::Local::now().naive_local());
    println!("   {name}: {} bytes, {} save(s)", archive.len(), manifest.save_count);
    println!("   Known characters: {}", saves[0].known_characters.len());

    for save in store.list().await? {
        store.delete(&save.id).await?;
    }
    drop(engine);
    let _ = printer.await;

    println!("\n=== Done ===");
    Ok(())
}
