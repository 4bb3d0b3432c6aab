//! Inventory and quest reconciliation.
//!
//! The inventory is a set of item names updated by add/remove deltas. The
//! quest list is replaced wholesale each turn with whatever the story
//! generator returns; nothing is merged.

use serde::{Deserialize, Serialize};

/// A quest entry as tracked by the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl QuestItem {
    pub fn open(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }

    pub fn done(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: true,
        }
    }
}

/// Apply an inventory delta: `(current ∪ add) \ remove`.
///
/// Union happens before subtraction, so an item both added and removed in
/// the same delta ends up absent. Items keep their first-seen order and are
/// deduplicated by exact string equality.
pub fn apply_inventory_delta(current: &[String], add: &[String], remove: &[String]) -> Vec<String> {
    let mut next: Vec<String> = Vec::with_capacity(current.len() + add.len());
    for item in current.iter().chain(add) {
        if !next.contains(item) {
            next.push(item.clone());
        }
    }
    next.retain(|item| !remove.contains(item));
    next
}

/// Replace the quest list, returning completed quests that vanished.
///
/// The replacement always happens. A completed quest missing from the new
/// list cannot be repaired here, but it is reported so the caller can surface
/// it.
pub fn replace_quests(quests: &mut Vec<QuestItem>, next: Vec<QuestItem>) -> Vec<QuestItem> {
    let dropped: Vec<QuestItem> = quests
        .iter()
        .filter(|q| q.completed && !next.iter().any(|n| n.text == q.text))
        .cloned()
        .collect();

    for quest in &dropped {
        tracing::warn!(quest = %quest.text, "Completed quest missing from new quest list");
    }

    *quests = next;
    dropped
}
