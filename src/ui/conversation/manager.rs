use std::collections::HashMap;

use crate::conversation::ConversationStore;
use crate::session::{Settings, TurnOutcome, TurnState};
use crate::ui::conversation::{
    Composer, ComposerResult, HistoryView, LiveReply, ParsedCommand, SettingsPanel, SlashCommand,
    get_help_text,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

const SIDEBAR_WIDTH: u16 = 34;
const SCROLL_STEP: usize = 5;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationAction {
    None,
    Submit(String),
    Clear,
    /// Select the named model, or cycle when no name was given
    SetModel(Option<String>),
    CycleModel,
    SetTemperature(f32),
    NudgeTemperature(i32),
    Quit,
}

/// Owns the UI state around the conversation: the composer, scrolling, the
/// reply being streamed and which replies faulted.
///
/// The conversation itself lives in the session; it is passed in to render.
pub struct ConversationManager {
    composer: Composer,
    scroll: usize,
    pending_prompt: Option<String>,
    live: Option<LiveReply>,
    faults: HashMap<usize, String>,
    turn_state: TurnState,
    status: Option<String>,
    notice: Option<String>,
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationManager {
    pub fn new() -> Self {
        Self {
            composer: Composer::new("Ask anything, or type / for commands..."),
            scroll: 0,
            pending_prompt: None,
            live: None,
            faults: HashMap::new(),
            turn_state: TurnState::Idle,
            status: None,
            notice: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return ConversationAction::Quit,
            KeyCode::Char('l') if ctrl => return ConversationAction::Clear,
            KeyCode::Up if ctrl => return ConversationAction::NudgeTemperature(1),
            KeyCode::Down if ctrl => return ConversationAction::NudgeTemperature(-1),
            KeyCode::PageUp => {
                self.scroll = self.scroll.saturating_add(SCROLL_STEP);
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.scroll = self.scroll.saturating_sub(SCROLL_STEP);
                return ConversationAction::None;
            }
            KeyCode::Esc if !self.composer.palette_open() => {
                if self.notice.take().is_some() {
                    return ConversationAction::None;
                }
                return ConversationAction::Quit;
            }
            KeyCode::Tab if !self.composer.palette_open() => return ConversationAction::CycleModel,
            _ => {}
        }

        self.notice = None;
        match self.composer.handle_key(key) {
            ComposerResult::Submitted(input) => ConversationAction::Submit(input),
            ComposerResult::Command(command) => self.handle_slash_command(command),
            ComposerResult::None => ConversationAction::None,
        }
    }

    pub fn paste(&mut self, text: &str) {
        self.composer.paste(text);
    }

    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        match command.command {
            SlashCommand::Clear => ConversationAction::Clear,
            SlashCommand::Model => ConversationAction::SetModel(command.argument),
            SlashCommand::Temperature => match command.temperature_target() {
                Some(temperature) => ConversationAction::SetTemperature(temperature),
                None => {
                    self.set_status("Usage: /temperature <0.0 to 1.0>");
                    ConversationAction::None
                }
            },
            SlashCommand::Help => {
                self.notice = Some(get_help_text());
                ConversationAction::None
            }
            SlashCommand::Bye => ConversationAction::Quit,
        }
    }

    /// A reply has been requested; show the prompt and the pending
    /// placeholder until the session records it.
    pub fn begin_turn(&mut self, prompt: &str) {
        self.pending_prompt = Some(prompt.to_string());
        self.live = Some(LiveReply::pending());
        self.turn_state = TurnState::Streaming;
        self.scroll = 0;
        self.status = None;
        self.composer.set_focus(false);
    }

    /// The session has recorded the prompt in its logs.
    pub fn prompt_recorded(&mut self) {
        self.pending_prompt = None;
    }

    /// The submission was rejected before anything was recorded.
    pub fn cancel_turn(&mut self) {
        self.pending_prompt = None;
        self.live = None;
        self.turn_state = TurnState::Idle;
        self.composer.set_focus(true);
    }

    /// Replace the streamed reply with a newer snapshot.
    pub fn update_live(&mut self, snapshot: &str) {
        if let Some(live) = self.live.as_mut() {
            live.set_snapshot(snapshot);
        }
    }

    /// The reply has been recorded at `display_index` in the display log.
    pub fn end_turn(&mut self, outcome: &TurnOutcome, display_index: usize) {
        self.pending_prompt = None;
        self.live = None;
        self.composer.set_focus(true);
        match outcome {
            TurnOutcome::Completed(_) => self.turn_state = TurnState::Completed,
            TurnOutcome::Faulted { partial, .. } => {
                self.faults.insert(display_index, partial.clone());
                self.turn_state = TurnState::Faulted;
            }
        }
    }

    pub fn clear(&mut self) {
        self.faults.clear();
        self.pending_prompt = None;
        self.live = None;
        self.scroll = 0;
        self.turn_state = TurnState::Idle;
        self.notice = None;
        self.composer.clear();
        self.set_status("Conversation cleared");
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn_state
    }

    pub fn live(&self) -> Option<&LiveReply> {
        self.live.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Render the whole chat screen.
    pub fn render(
        &self,
        area: Rect,
        buf: &mut Buffer,
        conversation: &ConversationStore,
        settings: &Settings,
    ) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20), Constraint::Length(SIDEBAR_WIDTH)])
            .split(area);

        let input_lines = self.composer.content().split('\n').count().clamp(1, 6) as u16;
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(input_lines + 2),
                Constraint::Length(1),
            ])
            .split(columns[0]);

        HistoryView::new(conversation.display_log(), &self.faults)
            .prompt(self.pending_prompt.as_deref())
            .live(self.live.as_ref())
            .scroll(self.scroll)
            .render(rows[0], buf);

        if let Some(notice) = self.notice.as_deref() {
            render_notice(notice, rows[0], buf);
        }

        self.composer.render(rows[1], buf);

        let status_line = match self.status.as_deref() {
            Some(status) => Line::from(Span::styled(status, Style::default().fg(Color::Yellow))),
            None => Line::from(Span::styled(
                format!("{} | temperature {:.2}", settings.model(), settings.temperature()),
                Style::default().fg(Color::DarkGray),
            )),
        };
        buf.set_line(rows[2].x, rows[2].y, &status_line, rows[2].width);

        SettingsPanel::new(settings, self.turn_state, conversation.turn_count())
            .render(columns[1], buf);
    }
}

fn render_notice(text: &str, area: Rect, buf: &mut Buffer) {
    let height = (text.lines().count() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + 2,
        y: area.y + 1,
        width: area.width.saturating_sub(4),
        height: height.min(area.height.saturating_sub(1)),
    };
    Clear.render(popup, buf);
    Paragraph::new(text.to_string())
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title("Help (Esc to close)"))
        .render(popup, buf);
}
