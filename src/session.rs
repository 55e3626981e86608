use futures::StreamExt;

use crate::accumulator::Accumulator;
use crate::config::{Config, ConfigError};
use crate::conversation::ConversationStore;
use crate::llm::{CompletionProvider, CompletionRequest, FragmentStream, StreamError};

/// Step used by the temperature control.
pub const TEMPERATURE_STEP: f32 = 0.05;

/// User-adjustable request settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    models: Vec<String>,
    model: usize,
    temperature: f32,
}

impl Settings {
    pub fn new(
        models: Vec<String>,
        default_model: &str,
        temperature: f32,
    ) -> Result<Self, ConfigError> {
        if models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        let model = models
            .iter()
            .position(|m| m == default_model)
            .ok_or_else(|| ConfigError::UnknownModel(default_model.to_string()))?;

        let mut settings = Self {
            models,
            model,
            temperature: 0.0,
        };
        settings.set_temperature(temperature)?;
        Ok(settings)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            config.models.clone(),
            &config.default_model,
            config.temperature,
        )
    }

    pub fn model(&self) -> &str {
        &self.models[self.model]
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn model_index(&self) -> usize {
        self.model
    }

    pub fn set_model(&mut self, name: &str) -> Result<(), ConfigError> {
        let name = name.trim();
        self.model = self
            .models
            .iter()
            .position(|m| m.eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))?;
        Ok(())
    }

    /// Select the next model, wrapping around.
    pub fn cycle_model(&mut self) -> &str {
        self.model = (self.model + 1) % self.models.len();
        self.model()
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ConfigError::TemperatureOutOfRange(temperature));
        }
        self.temperature = round_hundredths(temperature);
        Ok(())
    }

    /// Move the temperature by `steps` increments of [`TEMPERATURE_STEP`],
    /// clamped to `[0.0, 1.0]`.
    pub fn nudge_temperature(&mut self, steps: i32) -> f32 {
        let next = self.temperature + steps as f32 * TEMPERATURE_STEP;
        self.temperature = round_hundredths(next.clamp(0.0, 1.0));
        self.temperature
    }
}

fn round_hundredths(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Streaming,
    Completed,
    Faulted,
}

/// How a turn ended. Both variants have already been recorded in the logs.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed(String),
    Faulted {
        /// Text that had streamed in before the fault
        partial: String,
        /// Message recorded as the assistant's reply
        error: String,
    },
}

impl TurnOutcome {
    /// Content recorded as the assistant's message.
    pub fn recorded(&self) -> &str {
        match self {
            TurnOutcome::Completed(text) => text,
            TurnOutcome::Faulted { error, .. } => error,
        }
    }
}

/// Text shown to the user, and recorded in both logs, when a stream faults.
pub fn fault_message(fault: &StreamError) -> String {
    format!("An error occurred: {fault}")
}

/// One user submission being answered.
///
/// Pull snapshots with [`next_snapshot`](Turn::next_snapshot) and repaint
/// with each one, then call [`finish`](Turn::finish) to record the reply.
pub struct Turn<'a> {
    store: &'a mut ConversationStore,
    settings: &'a Settings,
    accumulator: Option<Accumulator<FragmentStream, StreamError>>,
    state: TurnState,
    latest: String,
    fault: Option<StreamError>,
}

impl<'a> Turn<'a> {
    fn streaming(
        store: &'a mut ConversationStore,
        settings: &'a Settings,
        fragments: FragmentStream,
    ) -> Self {
        Self {
            store,
            settings,
            accumulator: Some(Accumulator::new(fragments)),
            state: TurnState::Streaming,
            latest: String::new(),
            fault: None,
        }
    }

    fn faulted(
        store: &'a mut ConversationStore,
        settings: &'a Settings,
        fault: StreamError,
    ) -> Self {
        Self {
            store,
            settings,
            accumulator: None,
            state: TurnState::Faulted,
            latest: String::new(),
            fault: Some(fault),
        }
    }

    /// Next cumulative snapshot of the reply, or `None` once the stream has
    /// completed or faulted.
    pub async fn next_snapshot(&mut self) -> Option<String> {
        let accumulator = self.accumulator.as_mut()?;

        match accumulator.next().await {
            Some(Ok(snapshot)) => {
                self.latest.clone_from(&snapshot);
                Some(snapshot)
            }
            Some(Err(fault)) => {
                tracing::warn!(
                    error = %fault,
                    partial_chars = self.latest.chars().count(),
                    "completion stream faulted"
                );
                self.fault = Some(fault);
                self.state = TurnState::Faulted;
                self.accumulator = None;
                None
            }
            None => {
                tracing::debug!(
                    fragments = accumulator.fragments_seen(),
                    skipped = accumulator.fragments_skipped(),
                    "completion stream ended"
                );
                self.state = TurnState::Completed;
                self.accumulator = None;
                None
            }
        }
    }

    /// Drain whatever is left of the stream and record the reply in both logs.
    pub async fn finish(mut self) -> TurnOutcome {
        while self.next_snapshot().await.is_some() {}

        let outcome = match self.fault.take() {
            Some(fault) => TurnOutcome::Faulted {
                partial: std::mem::take(&mut self.latest),
                error: fault_message(&fault),
            },
            None => TurnOutcome::Completed(std::mem::take(&mut self.latest)),
        };

        self.store.append_reply(outcome.recorded());
        tracing::info!(
            faulted = matches!(outcome, TurnOutcome::Faulted { .. }),
            chars = outcome.recorded().chars().count(),
            transcript_len = self.store.transcript().len(),
            "turn finished"
        );
        outcome
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Latest snapshot, empty before the first text-bearing fragment.
    pub fn latest(&self) -> &str {
        &self.latest
    }

    /// The fault that ended the stream, once one has been seen.
    pub fn fault(&self) -> Option<&StreamError> {
        self.fault.as_ref()
    }

    pub fn conversation(&self) -> &ConversationStore {
        self.store
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }
}

/// A chat session: the conversation, the settings and the provider that
/// answers.
pub struct ChatSession<P> {
    provider: P,
    store: ConversationStore,
    settings: Settings,
}

impl<P: CompletionProvider> ChatSession<P> {
    pub fn new(provider: P, settings: Settings, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            store: ConversationStore::new(system_prompt),
            settings,
        }
    }

    /// Start a turn for `input`.
    ///
    /// Returns `None` and records nothing when the input is blank. Otherwise
    /// the user message is appended to both logs and the provider stream is
    /// opened; a failure to open it yields a turn that is already faulted.
    pub async fn submit(&mut self, input: &str) -> Option<Turn<'_>> {
        if input.trim().is_empty() {
            return None;
        }

        self.store.append_prompt(input);
        let request =
            CompletionRequest::new(self.settings.model(), self.store.as_provider_payload())
                .with_temperature(self.settings.temperature());

        tracing::info!(
            model = %request.model,
            turn = self.store.turn_count(),
            "starting turn"
        );

        match self.provider.stream_completion(request).await {
            Ok(fragments) => Some(Turn::streaming(&mut self.store, &self.settings, fragments)),
            Err(fault) => {
                tracing::warn!(error = %fault, "failed to open completion stream");
                Some(Turn::faulted(&mut self.store, &self.settings, fault))
            }
        }
    }

    /// Run a whole turn, calling `on_snapshot` once per snapshot.
    pub async fn run_turn<F>(&mut self, input: &str, mut on_snapshot: F) -> Option<TurnOutcome>
    where
        F: FnMut(&str),
    {
        let mut turn = self.submit(input).await?;
        while let Some(snapshot) = turn.next_snapshot().await {
            on_snapshot(&snapshot);
        }
        Some(turn.finish().await)
    }

    /// Forget the conversation and start over from the system message.
    pub fn clear(&mut self) {
        self.store.reset();
        tracing::info!("conversation cleared");
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
