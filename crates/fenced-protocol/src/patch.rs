// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One segment of a reactive-record path: either an object key or an array
/// index. Serializes as a bare JSON string or number, matching `["n"]` /
/// `[0, "n"]` style paths in the wire `data_patch` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A single mutation patch: `[op, path, value, prev]`. Rust tuples
/// serialize as JSON arrays, which gives the exact wire shape spec.md §6
/// requires without any custom (de)serialization.
pub type Patch = (String, Vec<PathSegment>, Value, Value);
