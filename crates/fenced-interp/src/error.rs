// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Errors surfaced by a single statement or run. Per spec.md §7, execution
/// errors are captured into the run's transcript rather than propagated —
/// this type is what gets reduced to that transcript's error string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("{0}")]
    Script(String),
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("Execution stopped")]
    Stopped,
    #[error("Incomplete statement")]
    IncompleteStatement,
    #[error("a run is already in progress on this interpreter")]
    AlreadyRunning,
}
