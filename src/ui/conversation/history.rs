//! Conversation history display component

use std::collections::HashMap;

use crate::events::{Message, Role};
use crate::ui::conversation::streaming::{LiveReply, wrap_text};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Scrollbar, ScrollbarOrientation, ScrollbarState, StatefulWidget, Widget,
    },
};

/// Renders the display log, newest at the bottom, plus the reply being
/// streamed.
pub struct HistoryView<'a> {
    messages: &'a [Message],
    /// Display-log indices of replies that are error text, mapped to the
    /// partial output that streamed in before the fault.
    faults: &'a HashMap<usize, String>,
    /// Prompt submitted but not yet recorded in the log
    prompt: Option<&'a str>,
    live: Option<&'a LiveReply>,
    /// Lines scrolled up from the bottom.
    scroll: usize,
}

impl<'a> HistoryView<'a> {
    pub fn new(messages: &'a [Message], faults: &'a HashMap<usize, String>) -> Self {
        Self {
            messages,
            faults,
            prompt: None,
            live: None,
            scroll: 0,
        }
    }

    pub fn prompt(mut self, prompt: Option<&'a str>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn live(mut self, live: Option<&'a LiveReply>) -> Self {
        self.live = live;
        self
    }

    pub fn scroll(mut self, scroll: usize) -> Self {
        self.scroll = scroll;
        self
    }

    /// All lines of the history at the given content width.
    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let width = width.saturating_sub(2) as usize;
        let mut all_lines = Vec::new();

        for (index, message) in self.messages.iter().enumerate() {
            all_lines.push(header(message.role));
            match self.faults.get(&index) {
                Some(partial) => {
                    if !partial.is_empty() {
                        all_lines.extend(body(partial, width, Style::default().fg(Color::Green)));
                    }
                    all_lines.extend(body(
                        &message.content,
                        width,
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    ));
                }
                None => {
                    let style = content_style(message.role);
                    all_lines.extend(body(&message.content, width, style));
                }
            }
            all_lines.push(Line::default());
        }

        if let Some(prompt) = self.prompt {
            all_lines.push(header(Role::User));
            all_lines.extend(body(prompt, width, content_style(Role::User)));
            all_lines.push(Line::default());
        }

        if let Some(live) = self.live {
            all_lines.push(header(Role::Assistant));
            all_lines.extend(live.lines(width));
        }

        all_lines
    }
}

impl Widget for HistoryView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::ALL).title("Conversation");
        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.messages.is_empty() && self.live.is_none() {
            let welcome_lines = [
                Line::styled("Groq-Bot: AI Chat Assistant", Style::default().fg(Color::Green)),
                Line::default(),
                Line::styled("Ask your question below.", Style::default().fg(Color::Gray)),
                Line::styled("Type / for commands.", Style::default().fg(Color::DarkGray)),
            ];
            for (i, line) in welcome_lines.iter().enumerate() {
                if i < inner_area.height as usize {
                    buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
                }
            }
            return;
        }

        let all_lines = self.lines(inner_area.width);
        let height = inner_area.height as usize;
        let total = all_lines.len();
        let max_scroll = total.saturating_sub(height);
        let scroll = self.scroll.min(max_scroll);
        let start = max_scroll - scroll;

        for (i, line) in all_lines.iter().skip(start).take(height).enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }

        if max_scroll > 0 {
            let mut state = ScrollbarState::new(max_scroll).position(start);
            Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .render(area, buf, &mut state);
        }
    }
}

fn header(role: Role) -> Line<'static> {
    let (label, color) = match role {
        Role::User => ("You", Color::Blue),
        Role::Assistant => ("Assistant", Color::Green),
        Role::System => ("System", Color::Yellow),
    };
    Line::from(vec![Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )])
}

fn body(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    wrap_text(text, width)
        .into_iter()
        .map(|line| Line::from(vec![Span::raw("  "), Span::styled(line, style)]))
        .collect()
}

/// Get content style based on role
fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Assistant => Style::default().fg(Color::Green),
        Role::System => Style::default().fg(Color::Yellow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.to_string()).collect())
            .collect()
    }

    #[test]
    fn renders_messages_with_headers() {
        let messages = vec![Message::user("hi"), Message::assistant("hello there")];
        let faults = HashMap::new();
        let lines = text_of(&HistoryView::new(&messages, &faults).lines(40));
        assert_eq!(lines, vec!["You", "  hi", "", "Assistant", "  hello there", ""]);
    }

    #[test]
    fn faulted_reply_shows_partial_then_error() {
        let messages = vec![Message::user("q"), Message::assistant("An error occurred: boom")];
        let faults = HashMap::from([(1, "Par".to_string())]);
        let lines = text_of(&HistoryView::new(&messages, &faults).lines(40));
        assert_eq!(&lines[3..6], &["Assistant", "  Par", "  An error occurred: boom"]);
    }

    #[test]
    fn live_reply_is_appended_last() {
        let messages = vec![Message::user("q")];
        let faults = HashMap::new();
        let live = LiveReply::with_snapshot("Hi");
        let lines = text_of(&HistoryView::new(&messages, &faults).live(Some(&live)).lines(40));
        assert_eq!(lines.last().map(String::as_str), Some("  Hi▋"));
    }

    #[test]
    fn unrecorded_prompt_precedes_pending_reply() {
        let faults = HashMap::new();
        let live = LiveReply::pending();
        let lines = text_of(
            &HistoryView::new(&[], &faults)
                .prompt(Some("why?"))
                .live(Some(&live))
                .lines(40),
        );
        assert_eq!(&lines[..4], &["You", "  why?", "", "Assistant"]);
    }
}
