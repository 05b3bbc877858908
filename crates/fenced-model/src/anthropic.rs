// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The production HTTP-backed provider (SPEC_FULL.md §4.3 decision):
//! Anthropic's Messages API, stripped of tool-calling, prompt-caching, and
//! vision — this runtime only ever needs a stream of assistant text.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context as _};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::provider::{CommittingStream, TextChunkStream};
use crate::types::{Message, Role};
use crate::ModelProvider;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    client: reqwest::Client,
    history: Arc<Mutex<Vec<Message>>>,
    system_prompt: Mutex<String>,
}

impl AnthropicProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.into(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature,
            client: reqwest::Client::new(),
            history: Arc::new(Mutex::new(Vec::new())),
            system_prompt: Mutex::new(String::new()),
        }
    }

    fn wire_role(role: &Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    async fn run_turn(&self, input: Message) -> anyhow::Result<TextChunkStream> {
        let key = self
            .api_key
            .clone()
            .context("ANTHROPIC_API_KEY is not set")?;

        let mut wire_messages: Vec<Value> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .map(|m| json!({"role": Self::wire_role(&m.role), "content": m.content}))
            .collect();
        wire_messages.push(json!({"role": Self::wire_role(&input.role), "content": input.content}));

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": wire_messages,
            "stream": true,
        });
        let system_prompt = self.system_prompt.lock().unwrap().clone();
        if !system_prompt.is_empty() {
            body["system"] = json!(system_prompt);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("Anthropic request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Anthropic error {status}: {text}");
        }

        // SSE lines can be split across TCP chunks, so a remainder buffer
        // carries partial lines forward between polls — the same idiom the
        // corpus's other streaming providers use for server-sent events.
        let event_stream = resp
            .bytes_stream()
            .scan(String::new(), |buf, chunk| {
                let text = match chunk {
                    Ok(b) => String::from_utf8_lossy(&b).to_string(),
                    Err(e) => return futures::future::ready(Some(vec![Err(anyhow::anyhow!(e))])),
                };
                buf.push_str(&text);
                let mut deltas = Vec::new();
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim_end_matches('\r').to_string();
                    buf.drain(..=pos);
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Ok(v) = serde_json::from_str::<Value>(data.trim()) {
                            if let Some(text) = extract_text_delta(&v) {
                                deltas.push(Ok(text));
                            }
                        }
                    }
                }
                futures::future::ready(Some(deltas))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(CommittingStream::new(
            event_stream,
            self.history.clone(),
            input,
        )))
    }
}

fn extract_text_delta(v: &Value) -> Option<String> {
    if v["type"].as_str()? != "content_block_delta" {
        return None;
    }
    let delta = &v["delta"];
    if delta["type"].as_str()? != "text_delta" {
        return None;
    }
    Some(delta["text"].as_str().unwrap_or("").to_string())
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn set_system_prompt(&self, prompt: String) {
        *self.system_prompt.lock().unwrap() = prompt;
    }

    async fn start_turn(&self, user_text: &str) -> anyhow::Result<TextChunkStream> {
        self.run_turn(Message::user(user_text)).await
    }

    async fn continue_turn(&self, transcript: &str) -> anyhow::Result<TextChunkStream> {
        self.run_turn(Message::user(transcript)).await
    }

    fn history(&self) -> Vec<Message> {
        self.history.lock().unwrap().clone()
    }
}
