// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use tokio_stream::wrappers::ReceiverStream;

/// A parsed top-level segment of a fenced-markdown document.
///
/// Each variant carries a lazy body sub-stream: the consumer must drain (or
/// explicitly drop) it before the parser advances to the next segment, since
/// the body channel is bounded at capacity 1 and the producing task blocks
/// on `send` until the consumer reads.
pub enum Segment {
    Prose(ReceiverStream<String>),
    Code {
        block_index: u64,
        body: ReceiverStream<String>,
    },
    Data {
        block_index: u64,
        target_id: String,
        body: ReceiverStream<String>,
    },
}

impl Segment {
    pub fn kind(&self) -> &'static str {
        match self {
            Segment::Prose(_) => "prose",
            Segment::Code { .. } => "code",
            Segment::Data { .. } => "data",
        }
    }
}
