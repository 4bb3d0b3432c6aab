//! Turn orchestration with scripted collaborators.

use adventure_core::characters::CharacterCandidate;
use adventure_core::config::{EngineConfig, GameSettings};
use adventure_core::conversation::ChatMessage;
use adventure_core::engine::{TurnError, TurnEvent, TurnPhase};
use adventure_core::generator::{GeneratorError, ImageKind};
use adventure_core::inventory::QuestItem;
use adventure_core::persist::SaveStore;
use adventure_core::scene::DialogueConfig;
use adventure_core::testing::{
    assert_fully_illustrated, assert_inventory, assert_terminal, assert_turn_count, simple_update,
    ScriptedImageGenerator, ScriptedStoryGenerator, TestHarness, UpdateBuilder,
};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(events: &mut UnboundedReceiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

async fn wait_for_phase(harness: &TestHarness, phase: TurnPhase) {
    while harness.engine.phase() != phase {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_images_land_by_index_whatever_the_arrival_order() {
    let images = ScriptedImageGenerator::new()
        .delay_when_prompt_contains("seg-zero", Duration::from_millis(30))
        .delay_when_prompt_contains("seg-one", Duration::from_millis(20))
        .delay_when_prompt_contains("seg-two", Duration::from_millis(10));
    let harness = TestHarness::with_images(images);
    harness.expect(
        UpdateBuilder::new()
            .segment("The lighthouse is dark.", "seg-zero")
            .segment("A rowboat bumps the pier.", "seg-one")
            .segment("Someone lights a lamp.", "seg-two")
            .choice("Climb the stairs")
            .build(),
    );
    let mut events = harness.engine.subscribe();

    let outcome = harness.start().await.unwrap();

    let events = drain(&mut events);
    assert!(matches!(&events[0], TurnEvent::StoryReady { scene, .. } if scene.missing_images() == 3));
    let arrivals: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::ImageReady { segment_index, .. } => Some(*segment_index),
            _ => None,
        })
        .collect();
    assert_eq!(arrivals, vec![2, 1, 0]);
    assert!(matches!(events[4], TurnEvent::AllImagesReady { .. }));
    assert!(matches!(events[5], TurnEvent::Saved { .. }));

    assert_fully_illustrated(&outcome.scene);
    for (segment, tag) in outcome.scene.segments.iter().zip(["seg-zero", "seg-one", "seg-two"]) {
        let prompt = String::from_utf8(segment.image.decode().unwrap()).unwrap();
        assert!(prompt.contains(tag), "{tag} landed in the wrong slot: {prompt}");
    }
    assert_eq!(harness.latest_scene().unwrap(), outcome.scene);
}

#[tokio::test]
async fn test_failed_turn_leaves_state_untouched() {
    let harness = TestHarness::new();
    harness.expect(
        UpdateBuilder::new()
            .segment("You wake.", "bed")
            .choice("Get up")
            .add_item("candle")
            .quest("Find the key", false)
            .build(),
    );
    harness.start().await.unwrap();
    let before = harness.session().unwrap();

    harness.expect_failure(GeneratorError::Malformed("not JSON".into()));
    let mut events = harness.engine.subscribe();
    let result = harness.act("Get up").await;

    assert!(matches!(result, Err(TurnError::Generator(GeneratorError::Malformed(_)))));
    assert_eq!(harness.session().unwrap(), before);
    assert_eq!(harness.engine.phase(), TurnPhase::Idle);
    assert!(matches!(drain(&mut events).as_slice(), [TurnEvent::Failed { .. }]));

    harness.expect(simple_update(&["You stand."], &["Leave"]));
    harness.act("Get up").await.unwrap();
    assert_turn_count(&harness, 2);
    assert_eq!(harness.story.last_action().as_deref(), Some("Get up"));
}

#[tokio::test]
async fn test_inventory_and_quests_follow_each_turn() {
    let harness = TestHarness::new();
    harness
        .expect(
            UpdateBuilder::new()
                .segment("A torch on the wall.", "torch")
                .choice("Take it")
                .add_item("torch")
                .quest("Explore the cellar", false)
                .build(),
        )
        .expect(
            UpdateBuilder::new()
                .segment("A key glints, then slips away.", "key")
                .choice("Descend")
                .add_item("key")
                .remove_item("key")
                .quest("Explore the cellar", true)
                .build(),
        )
        .expect(
            UpdateBuilder::new()
                .segment("The stairs go on.", "stairs")
                .choice("Keep going")
                .quest("Reach the bottom", false)
                .build(),
        );

    harness.start().await.unwrap();
    harness.act("Take it").await.unwrap();
    assert_inventory(&harness, &["torch"]);

    let outcome = harness.act("Descend").await.unwrap();
    assert_eq!(outcome.dropped_completed_quests, vec![QuestItem::done("Explore the cellar")]);
    let session = harness.session().unwrap();
    assert_eq!(session.quests(), [QuestItem::open("Reach the bottom")]);
}

#[tokio::test]
async fn test_game_over_is_terminal_until_a_new_game() {
    let harness = TestHarness::new();
    harness
        .expect(simple_update(&["The bridge creaks."], &["Cross"]))
        .expect(
            UpdateBuilder::new()
                .segment("The bridge gives way.", "falling")
                .choice("Grab the rope")
                .game_over("You fell into the gorge.")
                .build(),
        );

    harness.start().await.unwrap();
    let outcome = harness.act("Cross").await.unwrap();

    assert!(outcome.is_game_over());
    assert_terminal(&outcome.scene);
    assert!(matches!(harness.act("Grab the rope").await, Err(TurnError::GameOver)));
    assert_turn_count(&harness, 2);

    harness.engine.new_session();
    harness.expect(simple_update(&["A new dawn."], &["Begin again"]));
    harness.start().await.unwrap();
    assert_turn_count(&harness, 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_submission_is_rejected_while_a_turn_runs() {
    let harness = TestHarness::with_parts(
        ScriptedStoryGenerator::new()
            .then(simple_update(&["Rain."], &["Wait"]))
            .then(simple_update(&["The rain stops."], &["Go"]))
            .with_delay(Duration::from_millis(50)),
        ScriptedImageGenerator::new(),
        GameSettings::default(),
    );
    harness.start().await.unwrap();

    let engine = harness.engine.clone();
    let running = tokio::spawn(async move { engine.submit_action("Wait").await });
    wait_for_phase(&harness, TurnPhase::AwaitingStory).await;

    assert!(matches!(harness.act("Wait").await, Err(TurnError::TurnInFlight)));
    assert!(matches!(
        harness.engine.start_game(EngineConfig::new("Other")).await,
        Err(TurnError::TurnInFlight)
    ));
    assert!(matches!(
        harness.engine.record_conversation("Eliot", vec![ChatMessage::player("hi")]),
        Err(TurnError::TurnInFlight)
    ));

    running.await.unwrap().unwrap();
    assert_turn_count(&harness, 2);
    assert_eq!(harness.story.requests().len(), 2);
    assert_eq!(harness.engine.phase(), TurnPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_replacing_the_session_discards_the_running_turn() {
    let harness = TestHarness::with_parts(
        ScriptedStoryGenerator::new()
            .then(simple_update(&["Fog."], &["Listen"]))
            .then(simple_update(&["A horn sounds."], &["Follow"]))
            .with_delay(Duration::from_millis(50)),
        ScriptedImageGenerator::new(),
        GameSettings::default(),
    );
    harness.start().await.unwrap();
    let mut events = harness.engine.subscribe();

    let engine = harness.engine.clone();
    let running = tokio::spawn(async move { engine.submit_action("Listen").await });
    wait_for_phase(&harness, TurnPhase::AwaitingStory).await;
    harness.engine.new_session();

    assert!(matches!(running.await.unwrap(), Err(TurnError::SessionReplaced)));
    assert!(!harness.engine.has_session());
    assert_eq!(harness.engine.phase(), TurnPhase::Idle);

    let seen = drain(&mut events);
    assert_eq!(seen.len(), 1, "unexpected events: {seen:?}");
    assert!(matches!(&seen[0], TurnEvent::Failed { message } if message.contains("replaced")));
}

#[tokio::test]
async fn test_history_must_be_left_before_choosing() {
    let harness = TestHarness::new();
    harness
        .expect(simple_update(&["One."], &["Next"]))
        .expect(simple_update(&["Two."], &["Next"]))
        .expect(simple_update(&["Three."], &["Next"]));
    harness.start().await.unwrap();
    harness.act("Next").await.unwrap();
    let before = harness.session().unwrap();

    assert_eq!(harness.engine.navigate(0).unwrap(), 0);
    assert!(matches!(harness.act("Next").await, Err(TurnError::NotViewingLatest)));
    assert_eq!(harness.engine.navigate(99).unwrap(), 1);
    assert_eq!(harness.session().unwrap(), before);

    let outcome = harness.act("Next").await.unwrap();
    assert_eq!(outcome.handle.scene_index, 2);
}

#[tokio::test]
async fn test_mandatory_dialogue_gates_the_story() {
    let harness = TestHarness::new();
    harness
        .expect(
            UpdateBuilder::new()
                .segment("A hooded figure bars the door.", "figure")
                .choice("Push past")
                .talkable(DialogueConfig::new("Mira", "Smith"))
                .dialogue(
                    DialogueConfig::new("Warden", "Door keeper").with_initial_dialogue("Who goes there?"),
                )
                .build(),
        )
        .expect(simple_update(&["The door opens."], &["Enter"]));

    let opening = harness.start().await.unwrap();
    assert!(opening.scene.requires_dialogue());
    assert!(opening.scene.choices.is_empty());
    assert!(opening.scene.optional_talk_characters.is_empty());

    assert!(matches!(harness.act("Push past").await, Err(TurnError::DialogueRequired)));

    harness
        .engine
        .submit_dialogue(vec![
            ChatMessage::character("Who goes there?"),
            ChatMessage::player("A friend of the ferryman."),
        ])
        .await
        .unwrap();

    let sent = harness.story.last_action().unwrap();
    assert!(sent.starts_with("[The player spoke directly with Warden (Door keeper)]"));
    assert!(sent.contains("Warden opened the conversation: \"Who goes there?\""));
    assert!(sent.contains("Player: A friend of the ferryman."));
    assert!(!sent.contains("Warden: Who goes there?"));
    assert_turn_count(&harness, 2);
}

#[tokio::test]
async fn test_side_conversations_fold_into_the_next_action_once() {
    let harness = TestHarness::new();
    harness
        .expect(
            UpdateBuilder::new()
                .segment("The market is busy.", "market")
                .choice("Buy bread")
                .talkable(DialogueConfig::new("Mira", "Smith"))
                .build(),
        )
        .expect(simple_update(&["Warm bread."], &["Eat"]))
        .expect(simple_update(&["Crumbs."], &["Leave"]));
    harness.start().await.unwrap();

    harness
        .engine
        .record_conversation("Mira", vec![ChatMessage::player("Any swords?"), ChatMessage::character("Tomorrow.")])
        .unwrap();
    harness.act("Buy bread").await.unwrap();

    let sent = harness.story.last_action().unwrap();
    assert!(sent.contains("--- Mira (Smith) ---"));
    assert!(sent.contains("Mira: Tomorrow."));
    assert!(sent.ends_with("[Player's chosen action] Buy bread"));
    assert!(harness.session().unwrap().conversation_logs().is_empty());

    harness.act("Eat").await.unwrap();
    assert_eq!(harness.story.last_action().as_deref(), Some("Eat"));
}

#[tokio::test]
async fn test_failed_images_degrade_without_failing_the_turn() {
    let images = ScriptedImageGenerator::new()
        .fail_when_prompt_contains("broken")
        .empty_when_prompt_contains("blank");
    let harness = TestHarness::with_images(images);
    harness.expect(
        UpdateBuilder::new()
            .segment("First.", "fine")
            .segment("Second.", "broken")
            .segment("Third.", "blank")
            .choice("Go")
            .build(),
    );
    let mut events = harness.engine.subscribe();

    let outcome = harness.start().await.unwrap();

    assert_eq!(outcome.scene.missing_images(), 2);
    assert!(!outcome.scene.segments[0].image.is_empty());
    let ready = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, TurnEvent::ImageReady { .. }))
        .count();
    assert_eq!(ready, 1);
    assert!(outcome.saved);
}

#[tokio::test]
async fn test_portraits_join_the_registry_and_feed_later_scenes() {
    let images = ScriptedImageGenerator::new().fail_when_prompt_contains("portrait of Ghost");
    let harness = TestHarness::with_images(images);
    harness
        .expect(
            UpdateBuilder::new()
                .segment("A ferryman and a ghost.", "pier")
                .choice("Board")
                .new_character(CharacterCandidate::new("Hero", "Wanderer").main())
                .new_character(CharacterCandidate::new("Eliot", "Ferryman"))
                .new_character(CharacterCandidate::new("Ghost", "Spirit"))
                .build(),
        )
        .expect(
            UpdateBuilder::new()
                .segment("Eliot rows.", "rowing")
                .choice("Watch")
                .new_character(CharacterCandidate::new("Eliot", "Ferryman, again"))
                .visible("Eliot")
                .highlight("Eliot")
                .build(),
        );

    let opening = harness.start().await.unwrap();
    assert_eq!(opening.new_characters, vec!["Hero".to_string(), "Eliot".to_string()]);

    let session = harness.session().unwrap();
    let eliot = session.known_characters()[1].clone();
    assert_eq!(eliot.name, "Eliot");

    let outcome = harness.act("Board").await.unwrap();
    assert!(outcome.new_characters.is_empty());
    assert_eq!(
        harness.story.requests()[1].known_characters,
        vec!["Hero".to_string(), "Eliot".to_string()]
    );

    let scene_requests: Vec<_> = harness
        .images
        .requests()
        .into_iter()
        .filter(|r| r.kind == ImageKind::Scene && r.prompt.contains("rowing"))
        .collect();
    assert_eq!(scene_requests.len(), 1);
    assert_eq!(scene_requests[0].reference_images, vec![eliot.portrait_image]);

    let session = harness.session().unwrap();
    let gallery: Vec<&str> = session.gallery().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(gallery, vec!["Eliot", "Hero"]);
}

#[tokio::test]
async fn test_visual_identity_carries_into_prompts() {
    let harness = TestHarness::new();
    harness
        .expect(
            UpdateBuilder::new()
                .segment("Snow.", "snowfall")
                .visual_context("night, blizzard")
                .identity("young woman, green cloak", "mountain pass")
                .choice("Press on")
                .build(),
        )
        .expect(simple_update(&["A cabin."], &["Knock"]));

    harness.start().await.unwrap();
    let first_prompt = harness.images.requests()[0].prompt.clone();
    assert!(first_prompt.starts_with("Scene: night, blizzard. Main character: young woman, green cloak"));
    assert!(first_prompt.contains("Location: mountain pass. Action: snowfall"));

    harness.act("Press on").await.unwrap();
    let identity = harness.story.requests()[1].visual_identity.clone().unwrap();
    assert_eq!(identity.location, "mountain pass");
    assert_eq!(harness.story.requests()[0].visual_identity, None);
}

#[tokio::test]
async fn test_auto_save_can_be_turned_off() {
    let settings = GameSettings {
        auto_save: false,
        ..GameSettings::default()
    };
    let harness = TestHarness::with_parts(
        ScriptedStoryGenerator::new().then(simple_update(&["Quiet."], &["Rest"])),
        ScriptedImageGenerator::new(),
        settings,
    );

    let outcome = harness.start().await.unwrap();

    assert!(!outcome.saved);
    assert!(harness.store.list().await.unwrap().is_empty());

    let id = harness.engine.save_now().await.unwrap();
    assert_eq!(harness.store.load(&id).await.unwrap().turn_count, 1);
}
