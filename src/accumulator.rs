//! Folding of streamed fragments into the growing reply text.
//!
//! [`Accumulator`] wraps a fragment stream and is itself a stream of
//! cumulative snapshots, pulled one at a time by the turn driver.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::ready;
use futures::stream::{FusedStream, Stream, StreamExt};

use crate::fragment::{self, Fragment};

/// Folds a fragment stream into cumulative text snapshots.
///
/// Each fragment that carries text (an empty string included) yields the full
/// text accumulated so far. Fragments with no recognised shape, and fragments
/// that fail extraction, yield nothing and leave the text unchanged.
///
/// When the underlying stream faults, the accumulator yields the current text
/// one more time, then the fault, then ends. Callers that overwrite their
/// display with every snapshot therefore never lose partial output.
pub struct Accumulator<S, E> {
    fragments: S,
    text: String,
    pending_fault: Option<E>,
    finished: bool,
    seen: usize,
    skipped: usize,
}

impl<S, E> Accumulator<S, E>
where
    S: Stream<Item = Result<Fragment, E>> + Unpin,
{
    pub fn new(fragments: S) -> Self {
        Self {
            fragments,
            text: String::new(),
            pending_fault: None,
            finished: false,
            seen: 0,
            skipped: 0,
        }
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fragments pulled from the underlying stream.
    pub fn fragments_seen(&self) -> usize {
        self.seen
    }

    /// Fragments that contributed no text.
    pub fn fragments_skipped(&self) -> usize {
        self.skipped
    }
}

impl<S, E> Stream for Accumulator<S, E>
where
    S: Stream<Item = Result<Fragment, E>> + Unpin,
    E: Unpin,
{
    type Item = Result<String, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(fault) = this.pending_fault.take() {
            this.finished = true;
            return Poll::Ready(Some(Err(fault)));
        }
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match ready!(this.fragments.poll_next_unpin(cx)) {
                None => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Some(Err(fault)) => {
                    this.pending_fault = Some(fault);
                    return Poll::Ready(Some(Ok(this.text.clone())));
                }
                Some(Ok(fragment)) => {
                    this.seen += 1;
                    match fragment::extract(&fragment) {
                        Ok(Some(found)) => {
                            this.text.push_str(found.as_str());
                            return Poll::Ready(Some(Ok(this.text.clone())));
                        }
                        Ok(None) => {
                            this.skipped += 1;
                        }
                        Err(err) => {
                            this.skipped += 1;
                            tracing::debug!(
                                error = %err,
                                index = this.seen - 1,
                                "skipping unreadable fragment"
                            );
                        }
                    }
                }
            }
        }
    }
}

impl<S, E> FusedStream for Accumulator<S, E>
where
    S: Stream<Item = Result<Fragment, E>> + Unpin,
    E: Unpin,
{
    fn is_terminated(&self) -> bool {
        self.finished && self.pending_fault.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::{Value, json};

    #[derive(Debug, PartialEq)]
    struct Boom;

    fn ok(value: Value) -> Result<Fragment, Boom> {
        Ok(Fragment::Json(value))
    }

    async fn collect(items: Vec<Result<Fragment, Boom>>) -> Vec<Result<String, Boom>> {
        Accumulator::new(stream::iter(items)).collect().await
    }

    #[tokio::test]
    async fn direct_text_concatenates() {
        let out = collect(vec![ok(json!({"text": "Hel"})), ok(json!({"text": "lo"}))]).await;
        assert_eq!(out, vec![Ok("Hel".to_string()), Ok("Hello".to_string())]);
    }

    #[tokio::test]
    async fn final_snapshot_is_concatenation() {
        let parts = ["The", " quick", " brown", "", " fox"];
        let items = parts.iter().map(|p| ok(json!({ "text": p }))).collect();
        let out = collect(items).await;

        assert_eq!(out.len(), parts.len());
        assert_eq!(out.last(), Some(&Ok(parts.concat())));
    }

    #[tokio::test]
    async fn shapeless_fragments_emit_nothing() {
        let out = collect(vec![
            ok(json!({"delta": {"content": "Hi"}})),
            ok(json!({"bogus": "x"})),
            ok(json!({"delta": {"content": "!"}})),
        ])
        .await;
        assert_eq!(out, vec![Ok("Hi".to_string()), Ok("Hi!".to_string())]);
    }

    #[tokio::test]
    async fn only_shapeless_fragments_yield_empty_stream() {
        let mut acc = Accumulator::new(stream::iter(vec![
            ok(json!({"id": 1})),
            ok(json!({"choices": [{"delta": {}}]})),
        ]));
        assert_eq!(acc.next().await, None);
        assert_eq!(acc.text(), "");
        assert_eq!(acc.fragments_seen(), 2);
        assert_eq!(acc.fragments_skipped(), 2);
    }

    #[tokio::test]
    async fn empty_string_is_emitted() {
        let out = collect(vec![ok(json!({"delta": {"content": ""}}))]).await;
        assert_eq!(out, vec![Ok(String::new())]);
    }

    #[tokio::test]
    async fn extraction_faults_do_not_stop_the_stream() {
        let out = collect(vec![
            ok(json!({"text": "a"})),
            Ok(Fragment::Malformed("{oops".into())),
            ok(json!({"delta": {"content": ["not", "text"]}})),
            ok(json!({"text": "b"})),
        ])
        .await;
        assert_eq!(out, vec![Ok("a".to_string()), Ok("ab".to_string())]);
    }

    #[tokio::test]
    async fn fault_surfaces_partial_then_error_then_ends() {
        let mut acc = Accumulator::new(stream::iter(vec![
            ok(json!({"delta": {"content": "Par"}})),
            Err(Boom),
            ok(json!({"delta": {"content": "never"}})),
        ]));

        assert_eq!(acc.next().await, Some(Ok("Par".to_string())));
        assert_eq!(acc.next().await, Some(Ok("Par".to_string())));
        assert_eq!(acc.next().await, Some(Err(Boom)));
        assert!(acc.is_terminated());
        assert_eq!(acc.next().await, None);
        assert_eq!(acc.text(), "Par");
    }

    #[tokio::test]
    async fn immediate_fault_surfaces_empty_partial() {
        let out = collect(vec![Err(Boom)]).await;
        assert_eq!(out, vec![Ok(String::new()), Err(Boom)]);
    }
}
