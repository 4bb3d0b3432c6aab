//! Story generator backed by Claude.

use super::{parse_story_response, GameStateUpdate, GeneratorError, StoryGenerator, StoryRequest};
use crate::config::Gender;
use crate::conversation::{HistoryEntry, HistoryRole};
use async_trait::async_trait;
use claude::{Claude, Message, Request};

/// Configuration for the Claude story generator.
#[derive(Debug, Clone)]
pub struct StoryGeneratorConfig {
    /// The model to use (defaults to the client's model).
    pub model: Option<String>,

    /// Maximum tokens for responses.
    pub max_tokens: usize,

    /// Temperature for generation.
    pub temperature: Option<f32>,

    /// Extra instructions appended to the system prompt.
    pub custom_system_prompt: Option<String>,
}

impl Default for StoryGeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 8192,
            temperature: Some(0.9),
            custom_system_prompt: None,
        }
    }
}

/// Asks Claude for the next scene and validates the JSON it returns.
pub struct ClaudeStoryGenerator {
    client: Claude,
    config: StoryGeneratorConfig,
}

impl ClaudeStoryGenerator {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: StoryGeneratorConfig::default(),
        }
    }

    /// Build from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, GeneratorError> {
        Ok(Self::new(Claude::from_env()?))
    }

    /// Build from an already resolved key.
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self, GeneratorError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GeneratorError::NoApiKey);
        }
        Ok(Self::new(Claude::new(api_key)))
    }

    pub fn with_config(mut self, config: StoryGeneratorConfig) -> Self {
        self.config = config;
        self
    }

    fn build_system_prompt(&self, request: &StoryRequest<'_>) -> String {
        let mut prompt = String::new();

        prompt.push_str(include_str!("prompts/story_base.txt"));
        prompt.push_str("\n\n");
        prompt.push_str(include_str!("prompts/visual_consistency.txt"));
        prompt.push_str("\n\n");
        prompt.push_str(include_str!("prompts/dialogue.txt"));
        prompt.push_str("\n\n");
        prompt.push_str(include_str!("prompts/response_format.txt"));

        if let Some(ref custom) = self.config.custom_system_prompt {
            prompt.push_str("\n\n## Additional Instructions\n");
            prompt.push_str(custom);
        }

        let settings = request.settings;
        prompt.push_str("\n\n## This Adventure\n");
        prompt.push_str(&format!(
            "**Segments per turn:** exactly {}\n",
            settings.segments_per_turn
        ));
        let protagonist = match settings.gender {
            Gender::Male => "male (he/him); masculine features and build",
            Gender::Female => "female (she/her); feminine features and build",
        };
        prompt.push_str(&format!("**Protagonist:** {protagonist}\n"));

        if let Some(identity) = request.visual_identity.filter(|v| !v.is_empty()) {
            prompt.push_str("\n## Previous Visual Context\n");
            prompt.push_str("Use as reference and update only when something changes.\n");
            prompt.push_str(&format!("- Protagonist appearance: {}\n", identity.character));
            prompt.push_str(&format!("- Last location: {}\n", identity.location));
        }

        if !request.known_characters.is_empty() {
            prompt.push_str("\n## Known Characters\n");
            prompt.push_str("These already have portraits. Do not list them in newCharacters again.\n");
            for c in request.known_characters {
                let main = if c.is_main_character { " (protagonist)" } else { "" };
                prompt.push_str(&format!("- {}{main}: {}\n", c.name, c.role));
            }
        }

        prompt
    }

    fn build_messages(history: &[HistoryEntry], action: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = history
            .iter()
            .map(|entry| match entry.role {
                HistoryRole::User => Message::user(entry.text()),
                HistoryRole::Model => Message::assistant(entry.text()),
            })
            .collect();
        messages.push(Message::user(action));
        messages
    }
}

#[async_trait]
impl StoryGenerator for ClaudeStoryGenerator {
    async fn next_scene(&self, request: StoryRequest<'_>) -> Result<GameStateUpdate, GeneratorError> {
        let system_prompt = self.build_system_prompt(&request);
        let messages = Self::build_messages(request.history, request.action);

        let mut api_request = Request::new(messages)
            .with_system(system_prompt)
            .with_max_tokens(self.config.max_tokens);

        if let Some(ref model) = self.config.model {
            api_request = api_request.with_model(model);
        }

        if let Some(temp) = self.config.temperature {
            api_request = api_request.with_temperature(temp);
        }

        tracing::debug!(history = request.history.len(), "Requesting next scene");
        let response = self.client.complete(api_request).await?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(GeneratorError::Malformed("model returned no text".to_string()));
        }
        parse_story_response(&text)
    }
}
