//! Generate example transcripts for the README.
//!
//! Run with: `cargo run -p adventure-core --example generate_transcripts`

use adventure_core::config::{ArtStyle, GameSettings};
use adventure_core::engine::TurnError;
use adventure_core::genre;
use adventure_core::headless::HeadlessGame;
use std::fs;
use std::path::Path;

/// A scenario to play out and record.
struct Scenario {
    title: &'static str,
    filename: &'static str,
    description: &'static str,
    art_style: ArtStyle,
    /// Genre preset id; `None` opens on the default premise.
    genre: Option<&'static str>,
    /// Free-form actions; `None` picks the first offered choice.
    actions: Vec<Option<&'static str>>,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            title: "The Drowned Lantern",
            filename: "drowned_lantern.md",
            description: "A ferry crossing goes wrong on a foggy river.",
            art_style: ArtStyle::Watercolor,
            genre: None,
            actions: vec![
                None,
                Some("I hold the lantern over the water and look for the ferryman."),
                None,
                Some("I ask the ferryman why the river has gone silent."),
            ],
        },
        Scenario {
            title: "Night Train",
            filename: "night_train.md",
            description: "A sleeper carriage, a missing passenger and a locked compartment.",
            art_style: ArtStyle::DarkFantasy,
            genre: Some("mystery"),
            actions: vec![
                Some("I check the passenger list in the dining car."),
                None,
                None,
                Some("I knock on compartment 7 and wait."),
            ],
        },
        Scenario {
            title: "Clockwork Orchard",
            filename: "clockwork_orchard.md",
            description: "Someone has stolen the key that winds the orchard's trees.",
            art_style: ArtStyle::Ghibli,
            genre: Some("steampunk"),
            actions: vec![None, None, None, None],
        },
    ]
}

async fn run_scenario(
    scenario: &Scenario,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{}", "=".repeat(60));
    println!("Running: {}", scenario.title);
    println!("{}\n", "=".repeat(60));

    let settings = GameSettings {
        art_style: scenario.art_style,
        ..GameSettings::default()
    };
    let mut game = HeadlessGame::from_env()?.with_settings(settings);

    let mut transcript = String::new();
    transcript.push_str(&format!("# {}\n\n", scenario.title));
    transcript.push_str(&format!("*{}*\n\n", scenario.description));
    transcript.push_str("---\n\n");

    let opening = match scenario.genre.and_then(genre::find) {
        Some(genre) => game.start_genre(genre).await?,
        None => game.start(scenario.title).await?,
    };
    transcript.push_str(&format!("### Opening\n\n{}\n\n---\n\n", opening.narrative()));

    for (i, action) in scenario.actions.iter().enumerate() {
        if game.is_game_over() {
            break;
        }
        let result = match action {
            Some(text) => game.send(text).await,
            None => game.choose(0).await,
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(TurnError::DialogueRequired) => {
                transcript.push_str("*[The story waits on a conversation.]*\n\n");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let player = game
            .transcript()
            .last()
            .map(|entry| entry.action.clone())
            .unwrap_or_default();
        println!("Turn {}: {}", i + 1, player);

        transcript.push_str(&format!("### Turn {}\n\n", i + 1));
        transcript.push_str(&format!("**Player:** {player}\n\n"));
        transcript.push_str(&format!("{}\n\n", outcome.narrative()));
        if !outcome.scene.choices.is_empty() {
            let choices: Vec<&str> = outcome.scene.choices.iter().map(|c| c.text.as_str()).collect();
            transcript.push_str(&format!("*Choices: {}*\n\n", choices.join(" / ")));
        }
        transcript.push_str("---\n\n");
    }

    let inventory = game.inventory();
    if !inventory.is_empty() {
        transcript.push_str(&format!("**Inventory:** {}\n\n", inventory.join(", ")));
    }
    if let Some(message) = game.game_over_message() {
        transcript.push_str(&format!("**The End.** {message}\n\n"));
    }

    let output_path = output_dir.join(scenario.filename);
    fs::write(&output_path, transcript)?;
    println!("Wrote transcript to: {}", output_path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        eprintln!("Error: ANTHROPIC_API_KEY environment variable not set");
        eprintln!("Set it in your environment or create a .env file");
        std::process::exit(1);
    }

    let output_dir = Path::new("docs/transcripts");
    fs::create_dir_all(output_dir)?;

    let scenarios = scenarios();
    println!("Generating {} transcripts...\n", scenarios.len());

    for scenario in &scenarios {
        if let Err(e) = run_scenario(scenario, output_dir).await {
            eprintln!("Error running '{}': {}", scenario.title, e);
        }
    }

    println!("\nDone! Check docs/transcripts/ for the generated files.");
    Ok(())
}
