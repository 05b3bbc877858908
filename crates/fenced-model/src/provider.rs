// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The LLM provider abstraction spec.md §1/§4.5 deliberately keeps outside
//! the core: "a stream of text chunks with a history/rollback contract."
//! Two turn-entry-points per spec.md §4.5 — `start_turn` for the user's
//! first message, `continue_turn` for every subsequent transcript-driven
//! turn — and the provider itself owns history, appending on success and
//! leaving history untouched (the "rollback") on any stream error.

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;

use crate::types::Message;

pub type TextChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display and config selection.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Replace the system prompt assembled by the core's skill prelude
    /// (spec.md §4.5 "Skills & prompt seeding"). Takes effect on the next
    /// turn; does not affect history already accumulated.
    fn set_system_prompt(&self, prompt: String);

    /// Turn 0: the user's first message for this interaction.
    async fn start_turn(&self, user_text: &str) -> anyhow::Result<TextChunkStream>;

    /// Turns 1..N: the prior turn's captured transcript fed back as input.
    async fn continue_turn(&self, transcript: &str) -> anyhow::Result<TextChunkStream>;

    /// The accumulated history, for inspection by tests.
    fn history(&self) -> Vec<Message>;
}

/// Wraps a provider's raw chunk stream so the shared `history` is mutated
/// exactly once, after the stream ends with no error — an error leaves
/// `input_message` undropped into history, which is the entire rollback:
/// nothing was ever committed, so there is nothing to undo.
pub(crate) struct CommittingStream<S> {
    inner: S,
    history: std::sync::Arc<Mutex<Vec<Message>>>,
    input_message: Option<Message>,
    buffer: String,
    errored: bool,
}

impl<S> CommittingStream<S> {
    pub(crate) fn new(
        inner: S,
        history: std::sync::Arc<Mutex<Vec<Message>>>,
        input_message: Message,
    ) -> Self {
        Self {
            inner,
            history,
            input_message: Some(input_message),
            buffer: String::new(),
            errored: false,
        }
    }
}

impl<S> Stream for CommittingStream<S>
where
    S: Stream<Item = anyhow::Result<String>> + Unpin,
{
    type Item = anyhow::Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.buffer.push_str(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.errored = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if !this.errored {
                    let mut history = this.history.lock().unwrap();
                    if let Some(input) = this.input_message.take() {
                        history.push(input);
                    }
                    history.push(Message::assistant(std::mem::take(&mut this.buffer)));
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
