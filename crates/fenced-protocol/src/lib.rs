// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wire envelope types for the fenced-markdown protocol: one long-lived
//! full-duplex channel per session carrying UTF-8 JSON envelopes of shape
//! `{type, payload}`. Using serde's adjacently-tagged representation
//! (`tag = "type", content = "payload"`) produces exactly that shape without
//! any manual (de)serialization code.

mod patch;

pub use patch::{Patch, PathSegment};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A server-to-client frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Outbound {
    Session {
        id: String,
        #[serde(rename = "createdAt")]
        created_at: String,
        #[serde(rename = "schemaVersion", skip_serializing_if = "Option::is_none")]
        schema_version: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        capabilities: Option<Value>,
    },
    AssistantMessage {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        markdown: String,
        blocks: Value,
    },
    MarkdownChunk {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        text: String,
    },
    Mount {
        #[serde(rename = "mountId")]
        mount_id: String,
        #[serde(rename = "uiSource")]
        ui_source: String,
        #[serde(rename = "initialData", skip_serializing_if = "Option::is_none")]
        initial_data: Option<Value>,
        #[serde(rename = "streamedDataId", skip_serializing_if = "Option::is_none")]
        streamed_data_id: Option<String>,
        #[serde(rename = "outputSchema")]
        output_schema: Value,
        #[serde(rename = "callbackNames", skip_serializing_if = "Option::is_none")]
        callback_names: Option<Vec<String>>,
    },
    DataPatch {
        #[serde(rename = "mountId")]
        mount_id: String,
        patches: Vec<Patch>,
    },
    StreamedDataReset {
        #[serde(rename = "streamedDataId")]
        streamed_data_id: String,
    },
    StreamedDataChunk {
        #[serde(rename = "streamedDataId")]
        streamed_data_id: String,
        chunk: String,
    },
    Trace {
        #[serde(rename = "interactionId")]
        interaction_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        text: String,
        category: String,
    },
    LogLine {
        #[serde(skip_serializing_if = "Option::is_none")]
        t: Option<String>,
        lvl: LogLevel,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        #[serde(rename = "runId", skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        #[serde(rename = "blockIndex", skip_serializing_if = "Option::is_none")]
        block_index: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        src: Option<String>,
    },
}

/// A client-to-server frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Inbound {
    UserMessage {
        text: String,
        #[serde(rename = "interactionId", skip_serializing_if = "Option::is_none")]
        interaction_id: Option<String>,
    },
    UiSubmit {
        #[serde(rename = "mountId")]
        mount_id: String,
        value: Value,
    },
    CallbackInvoke {
        #[serde(rename = "mountId")]
        mount_id: String,
        name: String,
        args: Value,
    },
    ClientLog {
        lvl: LogLevel,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Error codes referenced in `log_line` frames (spec.md §6/§7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnknownTarget,
    RunTimeout,
    BlockFailed,
    SessionClosed,
    JsonError,
    InvalidEnvelope,
    UnknownUiSubmit,
}

/// Errors raised while decoding a frame off the transport, before it is
/// known to be a well-formed [`Inbound`] envelope. Logged at `warn` per
/// spec.md §6 and the frame dropped; never closes the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    InvalidUtf8,
    InvalidJson,
    MissingType,
    MissingPayload,
    UnsupportedEnvelope,
}

impl FrameError {
    pub fn code(self) -> &'static str {
        match self {
            FrameError::InvalidUtf8 | FrameError::InvalidJson => "invalid_json",
            FrameError::MissingType => "missing_type",
            FrameError::MissingPayload => "missing_payload",
            FrameError::UnsupportedEnvelope => "unsupported_envelope",
        }
    }
}

/// Decode raw bytes into an [`Inbound`] envelope, classifying failures per
/// the error codes spec.md §6 names.
pub fn decode_inbound(bytes: &[u8]) -> Result<Inbound, FrameError> {
    let text = std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
    let value: Value = serde_json::from_str(text).map_err(|_| FrameError::InvalidJson)?;
    let obj = value.as_object().ok_or(FrameError::InvalidJson)?;
    if !obj.contains_key("type") {
        return Err(FrameError::MissingType);
    }
    if !obj.contains_key("payload") {
        return Err(FrameError::MissingPayload);
    }
    serde_json::from_value(value).map_err(|_| FrameError::UnsupportedEnvelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_session_serializes_to_type_payload_shape() {
        let frame = Outbound::Session {
            id: "s1".into(),
            created_at: "2026-07-27T00:00:00Z".into(),
            schema_version: None,
            capabilities: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "session");
        assert_eq!(json["payload"]["id"], "s1");
        assert_eq!(json["payload"]["createdAt"], "2026-07-27T00:00:00Z");
    }

    #[test]
    fn outbound_data_patch_round_trips() {
        let frame = Outbound::DataPatch {
            mount_id: "m1".into(),
            patches: vec![(
                "set".to_string(),
                vec![PathSegment::Key("n".into())],
                serde_json::json!(7),
                serde_json::json!(0),
            )],
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: Outbound = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn inbound_user_message_decodes() {
        let bytes = br#"{"type":"user_message","payload":{"text":"hi"}}"#;
        let msg = decode_inbound(bytes).unwrap();
        match msg {
            Inbound::UserMessage { text, interaction_id } => {
                assert_eq!(text, "hi");
                assert_eq!(interaction_id, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn inbound_missing_type_is_rejected() {
        let bytes = br#"{"payload":{}}"#;
        assert_eq!(decode_inbound(bytes), Err(FrameError::MissingType));
    }

    #[test]
    fn inbound_missing_payload_is_rejected() {
        let bytes = br#"{"type":"user_message"}"#;
        assert_eq!(decode_inbound(bytes), Err(FrameError::MissingPayload));
    }

    #[test]
    fn inbound_invalid_json_is_rejected() {
        let bytes = b"not json";
        assert_eq!(decode_inbound(bytes), Err(FrameError::InvalidJson));
    }

    #[test]
    fn inbound_unknown_type_is_unsupported() {
        let bytes = br#"{"type":"does_not_exist","payload":{}}"#;
        assert_eq!(decode_inbound(bytes), Err(FrameError::UnsupportedEnvelope));
    }

    #[test]
    fn log_line_error_code_matches_spec_wording() {
        let frame = Outbound::LogLine {
            t: None,
            lvl: LogLevel::Error,
            msg: Some("no such target".into()),
            data: None,
            code: Some(ErrorCode::UnknownTarget),
            run_id: None,
            block_index: None,
            src: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["payload"]["code"], "unknown_target");
    }
}
