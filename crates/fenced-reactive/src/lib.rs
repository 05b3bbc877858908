// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Reactive state registry (C2): `wrap`/`identityOf`/`snapshot`/`subscribe`
//! over an owned `serde_json::Value` document, the explicit-API realization
//! spec.md §9 calls for in languages without transparent proxies.

mod record;

pub use fenced_protocol::{Patch, PathSegment};
pub use record::{identity_of, snapshot, wrap, Handle, Identity, Subscription};
