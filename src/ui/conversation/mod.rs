//! Conversation UI components for the chat screen

pub mod commands;
pub mod composer;
pub mod history;
pub mod manager;
pub mod sidebar;
pub mod streaming;

pub use commands::{ParsedCommand, SlashCommand, get_help_text, parse_slash_command};
pub use composer::{Composer, ComposerResult};
pub use history::HistoryView;
pub use manager::{ConversationAction, ConversationManager};
pub use sidebar::SettingsPanel;
pub use streaming::{LiveReply, wrap_text};
