// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Errors surfaced by the interaction loop (C5). Per spec.md §7, everything
/// a single turn can go wrong in is captured into the transcript instead —
/// these variants are the loop-level errors a caller (the gateway) actually
/// needs to react to.
#[derive(Debug, Error)]
pub enum LoopError {
    /// spec.md §3: "the system rejects concurrent starts" — a session
    /// already has an interaction in flight.
    #[error("an interaction is already running on this session")]
    InteractionAlreadyRunning,
    /// spec.md §4.5/§7 "LLM provider failure": the model stream itself
    /// failed to start (not a mid-stream chunk error, which is surfaced as
    /// a transcript error instead).
    #[error("model provider failed to start turn: {0}")]
    ModelUnavailable(#[source] anyhow::Error),
    #[error("interpreter construction failed: {0}")]
    InterpreterInit(#[from] fenced_interp::RunError),
}
