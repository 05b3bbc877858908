// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Incremental parser for the fenced-markdown wire format.
//!
//! Recognizes two sentinel fence kinds inline in an otherwise ordinary
//! Markdown document — `` ```tsx agent.run `` (an executable code block) and
//! `` ```json agent.data => "<id>" `` (a streamed data block) — and splits
//! the surrounding text into an ordered sequence of [`Segment`]s. Any other
//! fence is left untouched as literal prose. The parser never buffers to the
//! end of input: segments, and the bodies within them, are produced as their
//! bytes arrive.

mod machine;
mod segment;
mod stream;

pub use segment::Segment;
pub use stream::parse;
