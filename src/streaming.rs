//! Server-Sent Events decoding for the chat completions stream.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::fragment::Fragment;
use crate::llm::StreamError;

/// Payload that marks the end of an OpenAI-style stream.
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Contents of one `data:` line
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Network chunks can split lines, and multi-byte characters, anywhere, so raw
/// bytes are buffered until a full line is available. Consecutive `data:`
/// lines belong to one event and are joined with `\n`; the event is
/// dispatched at the blank line that ends it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was never terminated, and dispatch an event
    /// still waiting for its blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        if !line.is_empty() {
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);

        if line.is_empty() {
            return self.dispatch();
        }

        // Comments and `event:`/`id:`/`retry:` fields carry nothing for a
        // chat stream.
        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);
        match self.data.as_mut() {
            Some(pending) => {
                pending.push('\n');
                pending.push_str(data);
            }
            None => self.data = Some(data.to_string()),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let data = self.data.take()?;
        if data.trim() == DONE_MARKER {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(data))
        }
    }
}

/// Turn one `data:` payload into a fragment, or a fault when the provider
/// reports an error in-band.
pub fn decode_data(data: &str) -> Result<Fragment, StreamError> {
    let fragment = Fragment::parse(data);
    if let Fragment::Json(value) = &fragment {
        if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(StreamError::Provider(message));
        }
    }
    Ok(fragment)
}

struct SseState<S> {
    bytes: S,
    decoder: SseDecoder,
    queue: VecDeque<SseEvent>,
    done: bool,
}

/// Adapt a response body into a stream of fragments.
///
/// The stream ends at `[DONE]` or at the end of the body. A transport error is
/// yielded once as [`StreamError::Transport`] and ends the stream.
pub fn fragment_stream<S, B, E>(bytes: S) -> BoxStream<'static, Result<Fragment, StreamError>>
where
    S: Stream<Item = Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        bytes,
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                match event {
                    SseEvent::Done => return None,
                    SseEvent::Data(data) if data.trim().is_empty() => continue,
                    SseEvent::Data(data) => return Some((decode_data(&data), state)),
                }
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.queue.extend(events);
                }
                Some(Err(err)) => {
                    state.done = true;
                    state.queue.clear();
                    return Some((Err(StreamError::Transport(err.to_string())), state));
                }
                None => {
                    state.done = true;
                    state.queue.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
