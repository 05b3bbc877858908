// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Async adapter driving [`FenceMachine`] from a chunk stream into a
//! [`Segment`] stream, grounded on the corpus's `tokio::sync::mpsc` +
//! `tokio_stream::wrappers::ReceiverStream` idiom for exposing a producer
//! task as a `Stream`.

use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

use crate::machine::{FenceMachine, MachineEvent};
use crate::segment::Segment;

const OUTER_CAPACITY: usize = 8;
/// Body channels are capacity 1: the producer blocks on `send` until the
/// consumer reads, which is what realizes "must be fully consumed (or
/// abandoned) before the next outer segment advances".
const BODY_CAPACITY: usize = 1;

/// Spawn a task that parses `input` into top-level [`Segment`]s.
///
/// The returned stream yields segments in order. A segment's own body stream
/// must be drained (or dropped) before the next segment's `Begin` event can
/// be produced, since the parser task is blocked on the bounded body channel.
pub fn parse(
    input: impl Stream<Item = String> + Unpin + Send + 'static,
) -> ReceiverStream<Segment> {
    let (outer_tx, outer_rx) = mpsc::channel(OUTER_CAPACITY);
    tokio::spawn(drive(input, outer_tx));
    ReceiverStream::new(outer_rx)
}

async fn drive(mut input: impl Stream<Item = String> + Unpin, outer_tx: mpsc::Sender<Segment>) {
    let mut machine = FenceMachine::new();
    let mut current = CurrentBody::None;

    while let Some(chunk) = input.next().await {
        let events = machine.feed(&chunk);
        if !apply_events(events, &outer_tx, &mut current).await {
            return;
        }
    }
    let events = machine.flush();
    let _ = apply_events(events, &outer_tx, &mut current).await;
}

enum CurrentBody {
    None,
    Body(mpsc::Sender<String>),
}

impl CurrentBody {
    async fn send(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let CurrentBody::Body(tx) = self {
            if tx.send(text).await.is_err() {
                trace!("segment body consumer dropped; abandoning remaining chunks");
                *self = CurrentBody::None;
            }
        }
    }

    fn close(&mut self) {
        *self = CurrentBody::None;
    }
}

/// Apply a batch of machine events, forwarding body text over bounded
/// channels and emitting `Segment` begin events on the outer channel.
/// Returns `false` if the outer consumer has gone away and the driver
/// should stop.
async fn apply_events(
    events: Vec<MachineEvent>,
    outer_tx: &mpsc::Sender<Segment>,
    current: &mut CurrentBody,
) -> bool {
    for event in events {
        match event {
            MachineEvent::ProseBegin => {
                let (tx, rx) = mpsc::channel(BODY_CAPACITY);
                if outer_tx.send(Segment::Prose(ReceiverStream::new(rx))).await.is_err() {
                    return false;
                }
                *current = CurrentBody::Body(tx);
            }
            MachineEvent::ProseChunk(text) => current.send(text).await,
            MachineEvent::ProseEnd => current.close(),
            MachineEvent::CodeBegin(block_index) => {
                let (tx, rx) = mpsc::channel(BODY_CAPACITY);
                let segment = Segment::Code {
                    block_index,
                    body: ReceiverStream::new(rx),
                };
                if outer_tx.send(segment).await.is_err() {
                    return false;
                }
                *current = CurrentBody::Body(tx);
            }
            MachineEvent::CodeChunk(text) => current.send(text).await,
            MachineEvent::CodeEnd => current.close(),
            MachineEvent::DataBegin(block_index, target_id) => {
                let (tx, rx) = mpsc::channel(BODY_CAPACITY);
                let segment = Segment::Data {
                    block_index,
                    target_id,
                    body: ReceiverStream::new(rx),
                };
                if outer_tx.send(segment).await.is_err() {
                    return false;
                }
                *current = CurrentBody::Body(tx);
            }
            MachineEvent::DataChunk(text) => current.send(text).await,
            MachineEvent::DataEnd => current.close(),
        }
    }
    true
}
