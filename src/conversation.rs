//! Conversation history: the transcript replayed to the provider and the
//! display log shown to the user.

use std::str::FromStr;

use crate::config::{ConfigError, DEFAULT_SYSTEM_PROMPT};
use crate::events::{Message, Role};

/// Owns both message logs and keeps them in lock-step.
///
/// The transcript always starts with exactly one system message. The display
/// log holds the same user/assistant messages without that directive, so
/// `transcript().len() == display_log().len() + 1` at all times.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    system_prompt: String,
    transcript: Vec<Message>,
    display_log: Vec<Message>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl ConversationStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            transcript: vec![Message::system(system_prompt.clone())],
            display_log: Vec::new(),
            system_prompt,
        }
    }

    /// Add a user or assistant message to both logs.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<(), ConfigError> {
        if role == Role::System {
            return Err(ConfigError::SystemMessageAppend);
        }

        self.push(Message::new(role, content));
        Ok(())
    }

    /// Record the user's side of a turn.
    pub(crate) fn append_prompt(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    /// Record the assistant's side of a turn.
    pub(crate) fn append_reply(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    fn push(&mut self, message: Message) {
        self.transcript.push(message.clone());
        self.display_log.push(message);
    }

    /// Like [`append`](Self::append) for loosely typed callers: the role is
    /// parsed from text and absent content is rejected.
    pub fn append_raw(&mut self, role: &str, content: Option<String>) -> Result<(), ConfigError> {
        let parsed =
            Role::from_str(role.trim()).map_err(|_| ConfigError::InvalidRole(role.to_string()))?;
        let content = content.ok_or(ConfigError::MissingContent)?;
        self.append(parsed, content)
    }

    /// Truncate the transcript to the system message and empty the display log.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.transcript.push(Message::system(self.system_prompt.clone()));
        self.display_log.clear();
    }

    /// Owned copy of the transcript, in the order sent to the provider.
    pub fn as_provider_payload(&self) -> Vec<Message> {
        self.transcript.clone()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn display_log(&self) -> &[Message] {
        &self.display_log
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Number of user messages recorded since the last reset.
    pub fn turn_count(&self) -> usize {
        self.display_log
            .iter()
            .filter(|message| message.role == Role::User)
            .count()
    }
}
