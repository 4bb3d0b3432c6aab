//! Conversation logs and story history.
//!
//! Side conversations held during a scene are collected per character and
//! folded into the next action text, so they steer the story without an
//! extra generator call. A finished mandatory dialogue is summarized the
//! same way and becomes the action itself.

use crate::scene::DialogueConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who said a line in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    #[serde(rename = "user")]
    Player,
    Character,
}

/// One line of a conversation with an NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    pub fn player(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Player,
            text: text.into(),
        }
    }

    pub fn character(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Character,
            text: text.into(),
        }
    }
}

fn transcript_lines(character_name: &str, messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| match m.sender {
            Sender::Player => format!("Player: {}", m.text.trim()),
            Sender::Character => format!("{character_name}: {}", m.text.trim()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Optional side-conversation transcripts for the current scene, keyed by
/// character name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationLogs(BTreeMap<String, Vec<ChatMessage>>);

impl ConversationLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a conversation to whatever is already held for the
    /// character. Talking to the same character twice in one scene keeps
    /// both exchanges, in order.
    pub fn record(&mut self, character_name: impl Into<String>, messages: Vec<ChatMessage>) {
        if messages.is_empty() {
            return;
        }
        self.0.entry(character_name.into()).or_default().extend(messages);
    }

    pub fn get(&self, character_name: &str) -> Option<&[ChatMessage]> {
        self.0.get(character_name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<ChatMessage>)> {
        self.0.iter()
    }

    /// Prefix `action` with a summary of every logged conversation.
    ///
    /// Roles come from the scene's talk partners when known. Without any
    /// logs the action is returned unchanged.
    pub fn fold_into_action(&self, action: &str, partners: &[DialogueConfig]) -> String {
        if self.is_empty() {
            return action.to_string();
        }

        let mut out = String::from("[Before choosing, the player talked with characters in this scene]\n");
        for (name, messages) in self.0.iter().filter(|(_, m)| !m.is_empty()) {
            let role = partners
                .iter()
                .find(|p| &p.character_name == name)
                .map(|p| p.character_role.as_str())
                .filter(|r| !r.is_empty());
            match role {
                Some(role) => out.push_str(&format!("\n--- {name} ({role}) ---\n")),
                None => out.push_str(&format!("\n--- {name} ---\n")),
            }
            out.push_str(&transcript_lines(name, messages));
            out.push('\n');
        }
        out.push_str(&format!("\n[Player's chosen action] {action}"));
        out
    }
}

/// Summarize a finished mandatory dialogue as the next action text.
///
/// When the first transcript line repeats the opening line it is dropped,
/// since the opening line is quoted separately.
pub fn summarize_dialogue(config: &DialogueConfig, messages: &[ChatMessage]) -> String {
    let name = config.character_name.as_str();
    let skip = usize::from(messages.first().is_some_and(|m| {
        m.sender == Sender::Character && m.text.trim() == config.initial_dialogue.trim()
    }));

    let mut out = if config.character_role.is_empty() {
        format!("[The player spoke directly with {name}]\n")
    } else {
        format!("[The player spoke directly with {name} ({})]\n", config.character_role)
    };
    if !config.initial_dialogue.is_empty() {
        out.push_str(&format!(
            "{name} opened the conversation: \"{}\"\n",
            config.initial_dialogue
        ));
    }
    out.push_str(&format!(
        "\nConversation:\n{}\n\n",
        transcript_lines(name, &messages[skip..])
    ));
    out.push_str("[Conversation finished; continue the story from what was decided above]");
    out
}

/// Who authored a story history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPart {
    pub text: String,
}

/// One entry of the transcript exchanged with the story generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub parts: Vec<HistoryPart>,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            parts: vec![HistoryPart { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Model,
            parts: vec![HistoryPart { text: text.into() }],
        }
    }

    /// All parts joined.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eliot() -> DialogueConfig {
        DialogueConfig::new("Eliot", "Ferryman").with_initial_dialogue("Where to, traveler?")
    }

    #[test]
    fn test_empty_logs_leave_action_alone() {
        let logs = ConversationLogs::new();
        assert_eq!(logs.fold_into_action("Open the door", &[]), "Open the door");
    }

    #[test]
    fn test_fold_includes_each_transcript_and_action() {
        let mut logs = ConversationLogs::new();
        logs.record(
            "Eliot",
            vec![ChatMessage::player("Is the river safe?"), ChatMessage::character("Not at night.")],
        );
        logs.record("Mira", vec![ChatMessage::player("Hello")]);

        let folded = logs.fold_into_action("Wait for dawn", &[eliot()]);

        assert!(folded.contains("--- Eliot (Ferryman) ---"));
        assert!(folded.contains("Player: Is the river safe?\nEliot: Not at night."));
        assert!(folded.contains("--- Mira ---"));
        assert!(folded.ends_with("[Player's chosen action] Wait for dawn"));
    }

    #[test]
    fn test_second_conversation_appends() {
        let mut logs = ConversationLogs::new();
        logs.record("Eliot", vec![ChatMessage::player("Is the river safe?"), ChatMessage::character("Not at night.")]);
        logs.record("Eliot", Vec::new());
        logs.record("Eliot", vec![ChatMessage::player("And at dawn?"), ChatMessage::character("Safer.")]);

        assert_eq!(logs.len(), 1);
        assert_eq!(logs.get("Eliot").unwrap().len(), 4);

        let folded = logs.fold_into_action("Wait", &[eliot()]);
        assert_eq!(folded.matches("--- Eliot (Ferryman) ---").count(), 1);
        assert!(folded.contains(
            "Player: Is the river safe?\nEliot: Not at night.\nPlayer: And at dawn?\nEliot: Safer."
        ));
    }

    #[test]
    fn test_summary_skips_repeated_opening_line() {
        let messages = vec![
            ChatMessage::character("Where to, traveler?"),
            ChatMessage::player("The far shore."),
            ChatMessage::character("That will cost you."),
        ];

        let summary = summarize_dialogue(&eliot(), &messages);

        assert!(summary.starts_with("[The player spoke directly with Eliot (Ferryman)]\n"));
        assert!(summary.contains("Eliot opened the conversation: \"Where to, traveler?\""));
        assert!(summary.contains("Conversation:\nPlayer: The far shore.\nEliot: That will cost you.\n"));
        assert_eq!(summary.matches("Where to, traveler?").count(), 1);
    }

    #[test]
    fn test_summary_keeps_first_line_when_not_the_opening() {
        let messages = vec![ChatMessage::player("Wait!")];
        let summary = summarize_dialogue(&eliot(), &messages);
        assert!(summary.contains("Conversation:\nPlayer: Wait!\n"));
    }

    #[test]
    fn test_sender_wire_names() {
        let json = serde_json::to_string(&ChatMessage::player("hi")).unwrap();
        assert_eq!(json, r#"{"sender":"user","text":"hi"}"#);
        let back: ChatMessage = serde_json::from_str(r#"{"sender":"character","text":"yo"}"#).unwrap();
        assert_eq!(back.sender, Sender::Character);
    }

    #[test]
    fn test_history_entry_shape() {
        let entry = HistoryEntry::model("{}");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "model");
        assert_eq!(json["parts"][0]["text"], "{}");
        assert_eq!(entry.text(), "{}");
    }
}
