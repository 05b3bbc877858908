// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Bridges one Axum WebSocket connection to one freshly spawned
//! [`fenced_core::SessionHandle`]: decode inbound frames into
//! [`fenced_protocol::Inbound`] and forward them, translate every
//! [`fenced_core::LoopEvent`] the session emits into an outbound
//! [`fenced_protocol::Outbound`] frame. One select loop arm reads the
//! socket, the other drains the session's event channel.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use fenced_config::Config;
use fenced_core::{LoopEvent, SessionHandle, SkillContext};
use fenced_protocol::{decode_inbound, ErrorCode, FrameError, Outbound};
use tracing::{debug, warn};

pub async fn handle_socket(mut socket: WebSocket, config: Arc<Config>, skills: SkillContext) {
    let model = match fenced_model::from_config(&config.model) {
        Ok(model) => model,
        Err(err) => {
            warn!("session rejected: {err}");
            let _ = socket
                .send(Message::Text(
                    serde_json::to_string(&Outbound::LogLine {
                        t: Some(chrono::Utc::now().to_rfc3339()),
                        lvl: fenced_protocol::LogLevel::Error,
                        msg: Some(format!("model provider unavailable: {err}")),
                        data: None,
                        code: None,
                        run_id: None,
                        block_index: None,
                        src: None,
                    })
                    .unwrap_or_default(),
                ))
                .await;
            return;
        }
    };

    let (session, mut events) = SessionHandle::spawn(model, config.runtime.turn_cap, skills);

    let hello = Outbound::Session {
        id: session.id.clone(),
        created_at: session.created_at.to_rfc3339(),
        schema_version: Some("1".to_string()),
        capabilities: None,
    };
    if send(&mut socket, &hello).await.is_err() {
        session.stop();
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_frame(&mut socket, &session, text.as_bytes()).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        dispatch_frame(&mut socket, &session, &bytes).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Err(err)) => {
                        debug!("websocket recv error: {err}");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(event) => {
                        for frame in translate(event) {
                            if send(&mut socket, &frame).await.is_err() {
                                session.stop();
                                return;
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    session.stop();
    debug!("websocket connection closed");
}

async fn dispatch_frame(socket: &mut WebSocket, session: &SessionHandle, bytes: &[u8]) {
    match decode_inbound(bytes) {
        Ok(frame) => session.send(frame),
        Err(err) => {
            let log = log_line_for_frame_error(err);
            let _ = send(socket, &log).await;
        }
    }
}

fn log_line_for_frame_error(err: FrameError) -> Outbound {
    Outbound::LogLine {
        t: Some(chrono::Utc::now().to_rfc3339()),
        lvl: fenced_protocol::LogLevel::Warn,
        msg: Some(format!("rejected inbound frame: {}", err.code())),
        data: None,
        code: Some(match err {
            FrameError::InvalidUtf8 | FrameError::InvalidJson => ErrorCode::InvalidEnvelope,
            FrameError::MissingType => ErrorCode::InvalidEnvelope,
            FrameError::MissingPayload => ErrorCode::InvalidEnvelope,
            FrameError::UnsupportedEnvelope => ErrorCode::InvalidEnvelope,
        }),
        run_id: None,
        block_index: None,
        src: None,
    }
}

async fn send(socket: &mut WebSocket, frame: &Outbound) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap_or_default();
    socket.send(Message::Text(json)).await
}

/// `LoopEvent` carries strictly more variants than fit a single `Outbound`
/// one-for-one (`InteractionEnded` has no wire representation, spec.md §6's
/// envelope table has nothing for "interaction over" — the client infers it
/// from the absence of further frames per spec.md §4.5's state diagram).
fn translate(event: LoopEvent) -> Vec<Outbound> {
    match event {
        LoopEvent::MarkdownChunk { interaction_id, message_id, text } => vec![Outbound::MarkdownChunk {
            interaction_id,
            message_id,
            text,
        }],
        LoopEvent::AssistantMessage { interaction_id, message_id, markdown } => {
            vec![Outbound::AssistantMessage {
                interaction_id,
                message_id,
                markdown,
                blocks: serde_json::Value::Array(vec![]),
            }]
        }
        LoopEvent::Mount {
            mount_id,
            ui_source,
            initial_data,
            streamed_data_id,
            output_schema,
            callback_names,
        } => vec![Outbound::Mount {
            mount_id,
            ui_source,
            initial_data,
            streamed_data_id,
            output_schema,
            callback_names,
        }],
        LoopEvent::DataPatch { mount_id, patches } => vec![Outbound::DataPatch { mount_id, patches }],
        LoopEvent::StreamedDataReset { streamed_data_id } => {
            vec![Outbound::StreamedDataReset { streamed_data_id }]
        }
        LoopEvent::StreamedDataChunk { streamed_data_id, chunk } => {
            vec![Outbound::StreamedDataChunk { streamed_data_id, chunk }]
        }
        LoopEvent::Log {
            level,
            msg,
            data,
            code,
            run_id,
            block_index,
        } => vec![Outbound::LogLine {
            t: Some(chrono::Utc::now().to_rfc3339()),
            lvl: level.into(),
            msg,
            data,
            code,
            run_id,
            block_index,
            src: None,
        }],
        // No wire representation (spec.md §6's envelope table has nothing
        // for "interaction over"); the client infers completion from the
        // absence of further frames for this interaction id.
        LoopEvent::InteractionEnded { .. } => vec![],
    }
}
