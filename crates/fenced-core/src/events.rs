// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `LoopEvent` (SPEC_FULL.md §4.5 [EVENTS]): every transition the
//! interaction loop makes, emitted on an unbounded channel so the gateway
//! can translate it into an outbound `fenced_protocol::Outbound` frame (or a
//! `tracing` call) without the loop itself knowing anything about transport:
//! one variant per externally-observable state change, carrying only the
//! data the consumer needs to react.

use fenced_protocol::Patch;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// A fresh prose token for the current interaction's current message.
    MarkdownChunk {
        interaction_id: String,
        message_id: String,
        text: String,
    },
    /// A prose message is complete (its underlying sub-stream closed).
    AssistantMessage {
        interaction_id: String,
        message_id: String,
        markdown: String,
    },
    /// `mount(options)` registered a new UI panel.
    Mount {
        mount_id: String,
        ui_source: String,
        initial_data: Option<Value>,
        streamed_data_id: Option<String>,
        output_schema: Value,
        callback_names: Option<Vec<String>>,
    },
    /// A reactive record behind a mount produced a patch.
    DataPatch { mount_id: String, patches: Vec<Patch> },
    /// A data fence started streaming into a registered target.
    StreamedDataReset { streamed_data_id: String },
    /// A data fence's raw JSON tokens, tee'd to the client as they arrive.
    StreamedDataChunk {
        streamed_data_id: String,
        chunk: String,
    },
    /// An operator-facing log line (spec.md §6/§7's vocabulary).
    Log {
        level: LogLevel,
        msg: Option<String>,
        data: Option<Value>,
        code: Option<fenced_protocol::ErrorCode>,
        run_id: Option<String>,
        block_index: Option<u64>,
    },
    /// The interaction ended (turn cap reached, empty transcript, or an
    /// unrecoverable model error) — the gateway uses this to know no more
    /// events for this interaction id are coming.
    InteractionEnded { interaction_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for fenced_protocol::LogLevel {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => fenced_protocol::LogLevel::Debug,
            LogLevel::Info => fenced_protocol::LogLevel::Info,
            LogLevel::Warn => fenced_protocol::LogLevel::Warn,
            LogLevel::Error => fenced_protocol::LogLevel::Error,
        }
    }
}
