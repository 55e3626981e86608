//! Full-screen chat loop.

use std::io::{self, Stdout};

use anyhow::Result;
use crossterm::{
    event::{
        DisableBracketedPaste, EnableBracketedPaste, EventStream, KeyCode, KeyEvent,
        KeyModifiers, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
        supports_keyboard_enhancement,
    },
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::conversation::ConversationStore;
use crate::events::TuiEvent;
use crate::llm::CompletionProvider;
use crate::session::{ChatSession, Settings};
use crate::ui::conversation::{ConversationAction, ConversationManager};

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Run the chat screen until the user quits.
pub async fn run<P: CompletionProvider>(session: &mut ChatSession<P>) -> Result<()> {
    install_panic_hook();
    let (mut terminal, enhanced_keys) = setup_terminal()?;
    let result = event_loop(&mut terminal, session).await;
    restore_terminal(&mut terminal, enhanced_keys)?;
    result
}

async fn event_loop<P: CompletionProvider>(
    terminal: &mut Tui,
    session: &mut ChatSession<P>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut manager = ConversationManager::new();

    loop {
        draw(terminal, &manager, session.conversation(), session.settings())?;

        let Some(event) = events.next().await else {
            break;
        };
        let Some(event) = TuiEvent::from_crossterm(event?) else {
            continue;
        };

        let action = match event {
            TuiEvent::Key(key) => manager.handle_key(key),
            TuiEvent::Paste(text) => {
                manager.paste(&text);
                ConversationAction::None
            }
            TuiEvent::Resize(..) => ConversationAction::None,
        };

        match action {
            ConversationAction::None => {}
            ConversationAction::Quit => break,
            ConversationAction::Clear => {
                session.clear();
                manager.clear();
            }
            ConversationAction::CycleModel | ConversationAction::SetModel(None) => {
                let model = session.settings_mut().cycle_model().to_string();
                tracing::info!(%model, "model selected");
                manager.set_status(format!("Model: {model}"));
            }
            ConversationAction::SetModel(Some(name)) => {
                match session.settings_mut().set_model(&name) {
                    Ok(()) => {
                        tracing::info!(model = %name, "model selected");
                        manager.set_status(format!("Model: {}", session.settings().model()));
                    }
                    Err(err) => manager.set_status(err.to_string()),
                }
            }
            ConversationAction::SetTemperature(temperature) => {
                match session.settings_mut().set_temperature(temperature) {
                    Ok(()) => manager.set_status(format!("Temperature: {temperature:.2}")),
                    Err(err) => manager.set_status(err.to_string()),
                }
            }
            ConversationAction::NudgeTemperature(steps) => {
                let temperature = session.settings_mut().nudge_temperature(steps);
                manager.set_status(format!("Temperature: {temperature:.2}"));
            }
            ConversationAction::Submit(input) => {
                if stream_turn(terminal, &mut events, session, &mut manager, &input).await? {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Stream one reply, repainting on every snapshot. Returns `true` when the
/// user asked to quit mid-stream.
async fn stream_turn<P: CompletionProvider>(
    terminal: &mut Tui,
    events: &mut EventStream,
    session: &mut ChatSession<P>,
    manager: &mut ConversationManager,
    input: &str,
) -> Result<bool> {
    manager.begin_turn(input);
    draw(terminal, manager, session.conversation(), session.settings())?;

    let Some(mut turn) = session.submit(input).await else {
        manager.cancel_turn();
        return Ok(false);
    };
    manager.prompt_recorded();
    draw(terminal, manager, turn.conversation(), turn.settings())?;

    loop {
        tokio::select! {
            snapshot = turn.next_snapshot() => match snapshot {
                Some(snapshot) => {
                    manager.update_live(&snapshot);
                    draw(terminal, manager, turn.conversation(), turn.settings())?;
                }
                None => break,
            },
            event = events.next() => match event {
                None => return Ok(true),
                Some(event) => match TuiEvent::from_crossterm(event?) {
                    Some(TuiEvent::Key(key)) if is_interrupt(&key) => {
                        tracing::info!("interrupted while streaming");
                        return Ok(true);
                    }
                    Some(TuiEvent::Resize(..)) => {
                        draw(terminal, manager, turn.conversation(), turn.settings())?;
                    }
                    _ => {}
                },
            },
        }
    }

    let outcome = turn.finish().await;
    let index = session.conversation().display_log().len().saturating_sub(1);
    manager.end_turn(&outcome, index);
    Ok(false)
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

fn draw(
    terminal: &mut Tui,
    manager: &ConversationManager,
    conversation: &ConversationStore,
    settings: &Settings,
) -> Result<()> {
    terminal.draw(|frame| {
        let area = frame.size();
        manager.render(area, frame.buffer_mut(), conversation, settings);
    })?;
    Ok(())
}

fn setup_terminal() -> Result<(Tui, bool)> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;

    // Shift+Enter is only distinguishable with the kitty keyboard protocol.
    let enhanced_keys = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced_keys {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )?;
    }

    let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    Ok((terminal, enhanced_keys))
}

fn restore_terminal(terminal: &mut Tui, enhanced_keys: bool) -> Result<()> {
    if enhanced_keys {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableBracketedPaste)?;
    terminal.show_cursor()?;
    Ok(())
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableBracketedPaste);
        previous(info);
    }));
}
