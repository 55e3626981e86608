use crate::session::{Settings, TurnState};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Widget, Wrap},
};

/// Settings panel: model selector, temperature, key help and turn status.
pub struct SettingsPanel<'a> {
    settings: &'a Settings,
    state: TurnState,
    turns: usize,
}

impl<'a> SettingsPanel<'a> {
    pub fn new(settings: &'a Settings, state: TurnState, turns: usize) -> Self {
        Self {
            settings,
            state,
            turns,
        }
    }
}

impl Widget for SettingsPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let model_rows = self.settings.models().len() as u16 + 2;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(model_rows),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
            ])
            .split(area);

        let selected = self.settings.model_index();
        let items: Vec<ListItem> = self
            .settings
            .models()
            .iter()
            .enumerate()
            .map(|(index, name)| {
                if index == selected {
                    ListItem::new(Line::from(vec![
                        Span::styled("> ", Style::default().fg(Color::Cyan)),
                        Span::styled(
                            name.as_str(),
                            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                        ),
                    ]))
                } else {
                    ListItem::new(Line::from(vec![Span::raw("  "), Span::raw(name.as_str())]))
                }
            })
            .collect();
        List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Model (Tab)"))
            .render(chunks[0], buf);

        let temperature = self.settings.temperature();
        Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Creativity (Ctrl+Up/Down)"))
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio(f64::from(temperature).clamp(0.0, 1.0))
            .label(format!("{temperature:.2}"))
            .render(chunks[1], buf);

        let (status, color) = match self.state {
            TurnState::Idle => ("Ready", Color::Gray),
            TurnState::Streaming => ("Streaming...", Color::Yellow),
            TurnState::Completed => ("Done", Color::Green),
            TurnState::Faulted => ("Error", Color::Red),
        };
        Paragraph::new(Line::from(vec![
            Span::styled(status, Style::default().fg(color)),
            Span::styled(format!("  turns: {}", self.turns), Style::default().fg(Color::DarkGray)),
        ]))
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .render(chunks[2], buf);

        let help = vec![
            Line::from("Enter     send"),
            Line::from("Ctrl+L    clear"),
            Line::from("PgUp/PgDn scroll"),
            Line::from("/help     commands"),
            Line::from("Esc       quit"),
        ];
        Paragraph::new(help)
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Keys"))
            .render(chunks[3], buf);
    }
}
