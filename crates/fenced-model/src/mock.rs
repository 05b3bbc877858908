// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::provider::{CommittingStream, TextChunkStream};
use crate::types::Message;
use crate::ModelProvider;

/// Deterministic mock provider for tests. Echoes the turn's input text back
/// as a single text chunk, prefixed so assertions can tell it apart from a
/// real model's output.
pub struct MockProvider {
    history: Arc<Mutex<Vec<Message>>>,
    system_prompt: Mutex<String>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            history: Arc::new(Mutex::new(Vec::new())),
            system_prompt: Mutex::new(String::new()),
        }
    }
}

impl MockProvider {
    fn respond(&self, input: Message, reply: String) -> TextChunkStream {
        let inner = stream::iter(vec![Ok(reply)]);
        Box::pin(CommittingStream::new(
            inner,
            self.history.clone(),
            input,
        ))
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn set_system_prompt(&self, prompt: String) {
        *self.system_prompt.lock().unwrap() = prompt;
    }

    async fn start_turn(&self, user_text: &str) -> anyhow::Result<TextChunkStream> {
        let reply = format!("MOCK: {user_text}");
        Ok(self.respond(Message::user(user_text), reply))
    }

    async fn continue_turn(&self, transcript: &str) -> anyhow::Result<TextChunkStream> {
        let reply = format!("MOCK-CONT: {transcript}");
        Ok(self.respond(Message::user(transcript), reply))
    }

    fn history(&self) -> Vec<Message> {
        self.history.lock().unwrap().clone()
    }
}

/// A pre-scripted mock provider: each call to `start_turn`/`continue_turn`
/// pops the next scripted reply (or chunk sequence) off the front of the
/// queue, so scenario tests can script an exact multi-turn conversation
/// without network access.
pub struct ScriptedMockProvider {
    scripts: Mutex<Vec<Vec<String>>>,
    history: Arc<Mutex<Vec<Message>>>,
    system_prompt: Mutex<String>,
    name: String,
}

impl ScriptedMockProvider {
    /// `scripts[i]` is the sequence of text chunks emitted by the i-th call
    /// to either turn-entry-point, in call order.
    pub fn new(scripts: Vec<Vec<String>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            history: Arc::new(Mutex::new(Vec::new())),
            system_prompt: Mutex::new(String::new()),
            name: "scripted-mock".to_string(),
        }
    }

    /// Convenience: a provider whose every call returns exactly one chunk.
    pub fn always(replies: Vec<impl Into<String>>) -> Self {
        Self::new(replies.into_iter().map(|r| vec![r.into()]).collect())
    }

    fn next_reply(&self) -> Vec<String> {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            vec!["[no more scripts]".to_string()]
        } else {
            scripts.remove(0)
        }
    }

    fn respond(&self, input: Message) -> TextChunkStream {
        let chunks: Vec<anyhow::Result<String>> =
            self.next_reply().into_iter().map(Ok).collect();
        let inner = stream::iter(chunks);
        Box::pin(CommittingStream::new(
            inner,
            self.history.clone(),
            input,
        ))
    }
}

#[async_trait]
impl ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    fn set_system_prompt(&self, prompt: String) {
        *self.system_prompt.lock().unwrap() = prompt;
    }

    async fn start_turn(&self, user_text: &str) -> anyhow::Result<TextChunkStream> {
        Ok(self.respond(Message::user(user_text)))
    }

    async fn continue_turn(&self, transcript: &str) -> anyhow::Result<TextChunkStream> {
        Ok(self.respond(Message::user(transcript)))
    }

    fn history(&self) -> Vec<Message> {
        self.history.lock().unwrap().clone()
    }
}
