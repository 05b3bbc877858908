// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// A message in a provider's internal history. The wire protocol (spec.md
/// §6) never carries these directly — they exist only on the model side of
/// the "stream of text chunks with a history/rollback contract" abstraction
/// spec.md §1 calls for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Coarse token estimate used for the session's bounded-history budget —
    /// four characters per token, floor-divided, no per-message minimum.
    pub fn approx_tokens(&self) -> usize {
        self.content.chars().count() / 4
    }
}
