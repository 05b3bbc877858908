// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The interaction loop (C5, spec.md §4.5) and the `Session` (spec.md §3)
//! that owns one client's interpreter, registries, and model provider.
//! Everything a transport (`fenced-gateway`) needs is re-exported here:
//! spawn a [`SessionHandle`], feed it [`fenced_protocol::Inbound`] frames,
//! drain [`LoopEvent`]s and translate them to outbound wire frames.

mod error;
mod events;
mod handles;
mod interaction;
mod interpreter_setup;
mod prompts;
mod session;
mod skills;
mod transcript;

pub use error::LoopError;
pub use events::{LogLevel, LoopEvent};
pub use session::SessionHandle;
pub use skills::{Skill, SkillContext};
pub use transcript::Transcript;
