// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The interaction loop (C5, spec.md §4.5): `IDLE → TURN(0) → PARSE →
//! DISPATCH → {PROSE, CODE, DATA} → COLLECT → TURN(k+1) | IDLE`, bounded by
//! a turn cap and the per-run timeout already enforced inside
//! `fenced_interp::Interpreter::run`.
//!
//! Dispatch is a single sequential loop over `fenced_parser::parse`'s
//! segment stream — there is no concurrent segment handling to coordinate,
//! so the ordering guarantees spec.md §4.5/§5 asks for ("code executions
//! occur in segment order and never overlap", "outbound messages are
//! emitted in segment order") fall out of the control flow for free rather
//! than needing an explicit join/barrier.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::task::{Context, Poll};

use fenced_interp::{Interpreter, RunOutcome, StatementEvent};
use fenced_model::{ModelProvider, TextChunkStream};
use fenced_mount::StreamedTargetRegistry;
use fenced_parser::Segment;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::error::LoopError;
use crate::events::{LogLevel, LoopEvent};
use crate::transcript::Transcript;

fn log(events: &UnboundedSender<LoopEvent>, level: LogLevel, msg: impl Into<String>) {
    let _ = events.send(LoopEvent::Log {
        level,
        msg: Some(msg.into()),
        data: None,
        code: None,
        run_id: None,
        block_index: None,
    });
}

/// Adapts a model's `Stream<Item = anyhow::Result<String>>` into the plain
/// `Stream<Item = String>` `fenced_parser::parse` expects, stashing the
/// first error (if any) into `error` and ending the stream there rather
/// than propagating it through the `Item` type — grounded on
/// `fenced_model::provider::CommittingStream`'s identical
/// poll-and-branch-on-`Ready`/`Err` shape.
struct ChunkAdapter {
    inner: TextChunkStream,
    error: Arc<StdMutex<Option<String>>>,
}

impl Stream for ChunkAdapter {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(chunk)),
            Poll::Ready(Some(Err(err))) => {
                *this.error.lock().unwrap() = Some(err.to_string());
                Poll::Ready(None)
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

enum TurnOutcome {
    Transcript(Transcript),
    ProviderFailed(String),
}

/// Run one interaction to completion: turn 0 from `first_message`, then
/// transcript-driven turns until the transcript goes empty, the turn cap is
/// hit, or `stopped` is observed. Always emits exactly one
/// `LoopEvent::InteractionEnded` before returning, even on error.
pub async fn run(
    interaction_id: String,
    first_message: String,
    interp: &Interpreter,
    model: &dyn ModelProvider,
    streamed: &StreamedTargetRegistry,
    events: &UnboundedSender<LoopEvent>,
    stopped: &AtomicBool,
    turn_cap: u32,
) -> Result<(), LoopError> {
    let result = run_turns(
        &interaction_id,
        first_message,
        interp,
        model,
        streamed,
        events,
        stopped,
        turn_cap,
    )
    .await;
    let _ = events.send(LoopEvent::InteractionEnded {
        interaction_id: interaction_id.clone(),
    });
    result
}

async fn run_turns(
    interaction_id: &str,
    first_message: String,
    interp: &Interpreter,
    model: &dyn ModelProvider,
    streamed: &StreamedTargetRegistry,
    events: &UnboundedSender<LoopEvent>,
    stopped: &AtomicBool,
    turn_cap: u32,
) -> Result<(), LoopError> {
    let mut turn_input = first_message;
    let mut turn_index: u32 = 0;

    loop {
        if stopped.load(Ordering::SeqCst) {
            return Ok(());
        }

        let chunk_stream = if turn_index == 0 {
            model.start_turn(&turn_input).await
        } else {
            model.continue_turn(&turn_input).await
        }
        .map_err(LoopError::ModelUnavailable)?;

        let outcome = drive_turn(interaction_id, chunk_stream, interp, streamed, events, stopped).await;
        turn_index += 1;

        match outcome {
            TurnOutcome::ProviderFailed(err) => {
                log(events, LogLevel::Error, format!("model provider failed mid-turn: {err}"));
                return Ok(());
            }
            TurnOutcome::Transcript(transcript) => {
                if !transcript.is_non_empty() || turn_index >= turn_cap || stopped.load(Ordering::SeqCst) {
                    return Ok(());
                }
                turn_input = transcript.as_model_input();
            }
        }
    }
}

async fn drive_turn(
    interaction_id: &str,
    chunk_stream: TextChunkStream,
    interp: &Interpreter,
    streamed: &StreamedTargetRegistry,
    events: &UnboundedSender<LoopEvent>,
    stopped: &AtomicBool,
) -> TurnOutcome {
    let error_slot = Arc::new(StdMutex::new(None));
    let adapter = ChunkAdapter {
        inner: chunk_stream,
        error: error_slot.clone(),
    };
    let mut segments = fenced_parser::parse(adapter);
    let mut transcript = Transcript::default();

    while let Some(segment) = segments.next().await {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        match segment {
            Segment::Prose(body) => dispatch_prose(interaction_id, body, events).await,
            Segment::Data { target_id, body, .. } => dispatch_data(&target_id, body, streamed, events).await,
            Segment::Code { block_index, body } => {
                // spec.md §7: an earlier code segment's error stops "remaining
                // blocks in this turn" — drain the body without executing it
                // so later Prose/Data segments in the same turn still dispatch.
                if transcript.error.is_some() {
                    drain(body).await;
                    continue;
                }
                let outcome = dispatch_code(block_index, body, interp, events).await;
                transcript.merge(&outcome.logs, outcome.error.as_deref());
            }
        }
    }

    if let Some(err) = error_slot.lock().unwrap().take() {
        return TurnOutcome::ProviderFailed(err);
    }

    TurnOutcome::Transcript(transcript.normalize())
}

/// Fully consume a segment's sub-stream without acting on it — required by
/// `fenced_parser`'s contract (a segment's body must be fully consumed before
/// the next outer segment advances past it) when a code segment is skipped
/// because an earlier one in the same turn already failed.
async fn drain(mut body: ReceiverStream<String>) {
    while body.next().await.is_some() {}
}

async fn dispatch_prose(interaction_id: &str, mut body: ReceiverStream<String>, events: &UnboundedSender<LoopEvent>) {
    let message_id = Uuid::new_v4().to_string();
    let mut markdown = String::new();
    while let Some(chunk) = body.next().await {
        markdown.push_str(&chunk);
        let _ = events.send(LoopEvent::MarkdownChunk {
            interaction_id: interaction_id.to_string(),
            message_id: message_id.clone(),
            text: chunk,
        });
    }
    let _ = events.send(LoopEvent::AssistantMessage {
        interaction_id: interaction_id.to_string(),
        message_id,
        markdown,
    });
}

async fn dispatch_data(
    target_id: &str,
    mut body: ReceiverStream<String>,
    streamed: &StreamedTargetRegistry,
    events: &UnboundedSender<LoopEvent>,
) {
    if !streamed.mark_streaming(target_id) {
        while body.next().await.is_some() {}
        let _ = events.send(LoopEvent::Log {
            level: LogLevel::Error,
            msg: Some(format!("no streamed target registered for id {target_id}")),
            data: None,
            code: Some(fenced_protocol::ErrorCode::UnknownTarget),
            run_id: None,
            block_index: None,
        });
        return;
    }

    let _ = events.send(LoopEvent::StreamedDataReset {
        streamed_data_id: target_id.to_string(),
    });
    let mut concatenation = String::new();
    while let Some(chunk) = body.next().await {
        concatenation.push_str(&chunk);
        let _ = events.send(LoopEvent::StreamedDataChunk {
            streamed_data_id: target_id.to_string(),
            chunk,
        });
    }

    match serde_json::from_str::<Value>(&concatenation) {
        Ok(value) => {
            streamed.replace(target_id, value);
        }
        Err(err) => {
            let _ = events.send(LoopEvent::Log {
                level: LogLevel::Error,
                msg: Some(err.to_string()),
                data: None,
                code: Some(fenced_protocol::ErrorCode::JsonError),
                run_id: None,
                block_index: None,
            });
        }
    }
}

async fn dispatch_code(
    block_index: u64,
    body: ReceiverStream<String>,
    interp: &Interpreter,
    events: &UnboundedSender<LoopEvent>,
) -> RunOutcome {
    let on_event = |event: StatementEvent| {
        if !event.log_delta.is_empty() {
            let _ = events.send(LoopEvent::Log {
                level: LogLevel::Debug,
                msg: None,
                data: Some(json!({ "source": event.source, "logDelta": event.log_delta })),
                code: None,
                run_id: None,
                block_index: Some(block_index),
            });
        }
        if let Some(err) = &event.error {
            let _ = events.send(LoopEvent::Log {
                level: LogLevel::Error,
                msg: Some(err.clone()),
                data: None,
                code: Some(fenced_protocol::ErrorCode::BlockFailed),
                run_id: None,
                block_index: Some(block_index),
            });
        }
    };

    match interp.run(body, on_event).await {
        Ok(outcome) => outcome,
        Err(err) => RunOutcome {
            logs: String::new(),
            error: Some(err.to_string()),
        },
    }
}
