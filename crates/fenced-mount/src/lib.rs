// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Mount manager (C4): register declarative UI mounts, snapshot and forward
//! reactive-record patches, and resolve exactly one inbound submission per
//! mount. Also owns the streamed-target registry that data fences address
//! (spec.md §4.4, §9 design note).

mod mount;
mod streamed;

pub use mount::{Mount, MountError, MountHandle, MountOptions, MountRegistry};
pub use streamed::{StreamedTarget, StreamedTargetRegistry};
