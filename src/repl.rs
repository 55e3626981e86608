//! Line-oriented chat for terminals without a full-screen UI.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::llm::CompletionProvider;
use crate::session::{ChatSession, TurnOutcome};
use crate::ui::conversation::{ParsedCommand, SlashCommand, get_help_text, parse_slash_command};

/// Read prompts from `input` until EOF or `/bye`, streaming each reply to
/// `out` as it arrives.
pub async fn run<P, R, W>(session: &mut ChatSession<P>, input: R, mut out: W) -> Result<()>
where
    P: CompletionProvider,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(
        out,
        "Groq-Bot ({} @ {:.2}). Type /help for commands, /bye to exit.",
        session.settings().model(),
        session.settings().temperature()
    )?;

    let mut lines = input.lines();
    loop {
        write!(out, "You: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };

        if let Some(command) = parse_slash_command(&line) {
            if handle_command(session, command, &mut out)? {
                break;
            }
            continue;
        }

        let Some(mut turn) = session.submit(&line).await else {
            continue;
        };

        write!(out, "Assistant: ")?;
        let mut printed = 0;
        while let Some(snapshot) = turn.next_snapshot().await {
            // Snapshots are cumulative; only the new tail is printed.
            write!(out, "{}", snapshot.get(printed..).unwrap_or_default())?;
            out.flush()?;
            printed = snapshot.len();
        }

        match turn.finish().await {
            TurnOutcome::Completed(_) => writeln!(out)?,
            TurnOutcome::Faulted { error, .. } => {
                writeln!(out)?;
                writeln!(out, "{error}")?;
            }
        }
    }

    Ok(())
}

/// Apply a slash command. Returns `true` when the user asked to leave.
fn handle_command<P, W>(
    session: &mut ChatSession<P>,
    command: ParsedCommand,
    out: &mut W,
) -> Result<bool>
where
    P: CompletionProvider,
    W: Write,
{
    match command.command {
        SlashCommand::Bye => return Ok(true),
        SlashCommand::Clear => {
            session.clear();
            writeln!(out, "Conversation cleared.")?;
        }
        SlashCommand::Help => writeln!(out, "{}", get_help_text())?,
        SlashCommand::Model => {
            let settings = session.settings_mut();
            match command.argument() {
                Some(name) => match settings.set_model(name) {
                    Ok(()) => writeln!(out, "Model: {}", settings.model())?,
                    Err(err) => {
                        writeln!(out, "{err}. Available: {}", settings.models().join(", "))?
                    }
                },
                None => writeln!(out, "Model: {}", settings.cycle_model())?,
            }
        }
        SlashCommand::Temperature => {
            let settings = session.settings_mut();
            match command.temperature_target() {
                Some(temperature) => match settings.set_temperature(temperature) {
                    Ok(()) => writeln!(out, "Temperature: {:.2}", settings.temperature())?,
                    Err(err) => writeln!(out, "{err}")?,
                },
                None => writeln!(
                    out,
                    "Temperature: {:.2}. Usage: /temperature <0.0 to 1.0>",
                    settings.temperature()
                )?,
            }
        }
    }
    Ok(false)
}
