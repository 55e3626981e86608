use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

/// Shown in place of the reply until the first snapshot arrives.
pub const PENDING_TEXT: &str = "...generating response...";

/// The assistant reply currently being streamed.
///
/// Each snapshot replaces the previous one wholesale; nothing is appended
/// here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveReply {
    text: Option<String>,
}

impl LiveReply {
    /// A reply that has been requested but has no text yet.
    pub fn pending() -> Self {
        Self { text: None }
    }

    pub fn with_snapshot(snapshot: impl Into<String>) -> Self {
        Self {
            text: Some(snapshot.into()),
        }
    }

    pub fn set_snapshot(&mut self, snapshot: &str) {
        let text = self.text.get_or_insert_with(String::new);
        text.clear();
        text.push_str(snapshot);
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Render the reply body with a trailing cursor.
    pub fn lines(&self, width: usize) -> Vec<Line<'static>> {
        let Some(text) = self.text.as_deref() else {
            return vec![Line::from(vec![
                Span::raw("  "),
                Span::styled(
                    PENDING_TEXT,
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                ),
            ])];
        };

        let mut wrapped = wrap_text(text, width);
        let last = wrapped.pop().unwrap_or_default();
        let mut lines: Vec<Line<'static>> = wrapped
            .into_iter()
            .map(|line| {
                Line::from(vec![
                    Span::raw("  "),
                    Span::styled(line, Style::default().fg(Color::Green)),
                ])
            })
            .collect();
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(last, Style::default().fg(Color::Green)),
            Span::styled("▋", Style::default().fg(Color::Yellow)),
        ]));
        lines
    }
}

/// Wrap text to `width` columns, keeping explicit line breaks and splitting
/// words that are longer than a whole line.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            let needed = if current.is_empty() { word_len } else { word_len + 1 };

            if current_len + needed <= width {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                current_len += needed;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }

            let mut chars = word.chars().peekable();
            while chars.peek().is_some() {
                let chunk: String = chars.by_ref().take(width).collect();
                let chunk_len = chunk.chars().count();
                if chunk_len == width && chars.peek().is_some() {
                    lines.push(chunk);
                } else {
                    current = chunk;
                    current_len = chunk_len;
                }
            }
        }

        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(
            wrap_text("the quick brown fox", 10),
            vec!["the quick", "brown fox"]
        );
    }

    #[test]
    fn keeps_explicit_newlines_and_blank_lines() {
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
    }

    #[test]
    fn splits_long_words() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn pending_reply_shows_placeholder() {
        let lines = LiveReply::pending().lines(40);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].spans.iter().any(|s| s.content == PENDING_TEXT));
    }

    #[test]
    fn snapshots_replace_previous_text() {
        let mut reply = LiveReply::pending();
        reply.set_snapshot("Hel");
        reply.set_snapshot("Hello");
        assert_eq!(reply.text(), Some("Hello"));
    }
}
