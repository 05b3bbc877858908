// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end scenarios driving a whole [`fenced_core::SessionHandle`] —
//! parser, interpreter, and interaction loop together — through nothing but
//! the public [`fenced_protocol::Inbound`]/[`LoopEvent`] surface a
//! transport would use. Named after the concrete scenarios spec.md §8
//! walks through (S1 echo termination, S2 single code fence feeding its
//! transcript back, S4 an unknown data-fence target).

use std::time::Duration;

use fenced_core::{LoopEvent, SessionHandle, SkillContext};
use fenced_model::ScriptedMockProvider;
use fenced_protocol::Inbound;
use tokio::sync::mpsc::UnboundedReceiver;

/// Drains events until `InteractionEnded` for this interaction id, then
/// keeps draining for a short grace period — a mount's patch-forwarding
/// task (spawned independently in `interpreter_setup::install`) can still
/// be in flight on the session's own executor when the turn that spawned
/// it completes.
async fn drain_interaction(events: &mut UnboundedReceiver<LoopEvent>, interaction_id: &str) -> Vec<LoopEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        let ended = matches!(&event, LoopEvent::InteractionEnded { interaction_id: id } if id == interaction_id);
        collected.push(event);
        if ended {
            break;
        }
    }
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn echo_loop_terminates_after_one_turn() {
    // S1: a model stream with no fences at all is pure prose; the turn's
    // transcript is empty, so the interaction ends after turn 0.
    let model = ScriptedMockProvider::always(vec!["Hi"]);
    let (session, mut events) = SessionHandle::spawn(Box::new(model), 15, SkillContext::new());

    session.send(Inbound::UserMessage {
        text: "hello".to_string(),
        interaction_id: Some("s1".to_string()),
    });

    let collected = drain_interaction(&mut events, "s1").await;

    let markdown = collected.iter().find_map(|e| match e {
        LoopEvent::AssistantMessage { markdown, .. } => Some(markdown.clone()),
        _ => None,
    });
    assert_eq!(markdown.as_deref(), Some("Hi"));
    assert!(collected.iter().all(|e| !matches!(e, LoopEvent::Mount { .. })));
    assert!(matches!(collected.last(), Some(LoopEvent::InteractionEnded { .. })));
}

#[tokio::test]
async fn single_code_fence_feeds_transcript_back_then_terminates() {
    // S2: turn 0's only content is a code fence; its captured stdout
    // becomes turn 1's input. Turn 1 replies with plain prose so the
    // interaction terminates after exactly two turns.
    let model = ScriptedMockProvider::always(vec![
        "```tsx agent.run\nconsole.log(1+1);\n```\n",
        "Done.",
    ]);
    let (session, mut events) = SessionHandle::spawn(Box::new(model), 15, SkillContext::new());

    session.send(Inbound::UserMessage {
        text: "run it".to_string(),
        interaction_id: Some("s2".to_string()),
    });

    let collected = drain_interaction(&mut events, "s2").await;

    let log_deltas: Vec<String> = collected
        .iter()
        .filter_map(|e| match e {
            LoopEvent::Log { data: Some(d), .. } => d.get("logDelta").and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        })
        .collect();
    assert_eq!(log_deltas, vec!["2\n"]);

    let markdown: Vec<String> = collected
        .iter()
        .filter_map(|e| match e {
            LoopEvent::AssistantMessage { markdown, .. } => Some(markdown.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(markdown, vec!["Done.".to_string()]);
    assert!(matches!(collected.last(), Some(LoopEvent::InteractionEnded { .. })));
}

#[tokio::test]
async fn unknown_data_target_is_logged_and_isolated() {
    // S4: a data fence addressing an identifier nobody registered. No
    // crash, exactly one `unknown_target` log, and no streamed_data frames.
    let model = ScriptedMockProvider::always(vec!["```json agent.data => \"ghost\"\n{\"a\":1}\n```\n"]);
    let (session, mut events) = SessionHandle::spawn(Box::new(model), 15, SkillContext::new());

    session.send(Inbound::UserMessage {
        text: "stream".to_string(),
        interaction_id: Some("s4".to_string()),
    });

    let collected = drain_interaction(&mut events, "s4").await;

    let unknown_target_logs = collected
        .iter()
        .filter(|e| matches!(e, LoopEvent::Log { code: Some(fenced_protocol::ErrorCode::UnknownTarget), .. }))
        .count();
    assert_eq!(unknown_target_logs, 1);
    assert!(collected
        .iter()
        .all(|e| !matches!(e, LoopEvent::StreamedDataReset { .. } | LoopEvent::StreamedDataChunk { .. })));
}

#[tokio::test]
async fn persistent_bindings_carry_across_turns() {
    // S3: a binding made by one code fence is readable by a later code
    // fence, even across a full turn boundary through the captured
    // transcript feeding the next model call (the interpreter itself
    // persists bindings independent of what the model said).
    let model = ScriptedMockProvider::always(vec![
        "```tsx agent.run\nconst x = 41;\nconsole.log('bound');\n```\n",
        "```tsx agent.run\nconsole.log(x + 1);\n```\n",
        "All done.",
    ]);
    let (session, mut events) = SessionHandle::spawn(Box::new(model), 15, SkillContext::new());

    session.send(Inbound::UserMessage {
        text: "go".to_string(),
        interaction_id: Some("s3".to_string()),
    });

    let collected = drain_interaction(&mut events, "s3").await;

    let log_deltas: Vec<String> = collected
        .iter()
        .filter_map(|e| match e {
            LoopEvent::Log { data: Some(d), .. } => d.get("logDelta").and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        })
        .collect();
    assert_eq!(log_deltas, vec!["bound\n".to_string(), "42\n".to_string()]);
}

#[tokio::test]
async fn second_code_fence_in_same_turn_is_skipped_after_first_errors() {
    // spec.md §7: a code execution error stops "remaining statements in this
    // segment *and* remaining blocks in this turn" — the second fence must
    // never run, so its `console.log` never appears in the turn's logs.
    let model = ScriptedMockProvider::always(vec![
        "```tsx agent.run\nthrow new Error('boom');\n```\n\
         ```tsx agent.run\nconsole.log('never');\n```\n",
        "Done.",
    ]);
    let (session, mut events) = SessionHandle::spawn(Box::new(model), 15, SkillContext::new());

    session.send(Inbound::UserMessage {
        text: "go".to_string(),
        interaction_id: Some("s7".to_string()),
    });

    let collected = drain_interaction(&mut events, "s7").await;

    let log_deltas: Vec<String> = collected
        .iter()
        .filter_map(|e| match e {
            LoopEvent::Log { data: Some(d), .. } => d.get("logDelta").and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        })
        .collect();
    assert!(log_deltas.is_empty(), "the second fence must not have executed: {log_deltas:?}");

    let block_failed_logs = collected
        .iter()
        .filter(|e| matches!(e, LoopEvent::Log { code: Some(fenced_protocol::ErrorCode::BlockFailed), .. }))
        .count();
    assert_eq!(block_failed_logs, 1);

    // the turn's transcript still carries the error back to the model, so
    // the interaction proceeds to a second turn rather than stopping dead.
    let markdown: Vec<String> = collected
        .iter()
        .filter_map(|e| match e {
            LoopEvent::AssistantMessage { markdown, .. } => Some(markdown.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(markdown, vec!["Done.".to_string()]);
}

#[tokio::test]
async fn reactive_mount_emits_initial_snapshot_and_patch() {
    // S5: creating a reactive record, mounting it, then mutating it
    // produces one `mount` event carrying the pre-mutation snapshot and one
    // `data_patch` event carrying the mutation.
    let model = ScriptedMockProvider::always(vec![
        "```tsx agent.run\n\
         const rec = Data({ n: 0 });\n\
         mount({ data: rec, outputSchema: {} });\n\
         rec.set([\"n\"], 7);\n\
         ```\n",
        "Done.",
    ]);
    let (session, mut events) = SessionHandle::spawn(Box::new(model), 15, SkillContext::new());

    session.send(Inbound::UserMessage {
        text: "mount it".to_string(),
        interaction_id: Some("s5".to_string()),
    });

    let collected = drain_interaction(&mut events, "s5").await;

    let mount_event = collected.iter().find_map(|e| match e {
        LoopEvent::Mount { mount_id, initial_data, .. } => Some((mount_id.clone(), initial_data.clone())),
        _ => None,
    });
    let (mount_id, initial_data) = mount_event.expect("a mount event must have been emitted");
    assert_eq!(initial_data, Some(serde_json::json!({ "n": 0 })));

    let patch_event = collected.iter().find_map(|e| match e {
        LoopEvent::DataPatch { mount_id: id, patches } if *id == mount_id => Some(patches.clone()),
        _ => None,
    });
    let patches = patch_event.expect("a data_patch event must have been emitted for this mount");
    assert_eq!(patches.len(), 1);
    let (op, path, value, prev) = &patches[0];
    assert_eq!(op.as_str(), "set");
    assert_eq!(path, &vec![fenced_protocol::PathSegment::Key("n".to_string())]);
    assert_eq!(value, &serde_json::json!(7));
    assert_eq!(prev, &serde_json::json!(0));
}

#[tokio::test]
async fn turn_cap_bounds_an_ever_looping_model() {
    // spec.md §8 property 14: a model that always emits a non-empty
    // transcript-producing code fence must still terminate within the
    // configured turn cap rather than looping forever.
    let scripts: Vec<Vec<String>> = (0..10)
        .map(|_| vec!["```tsx agent.run\nconsole.log('again');\n```\n".to_string()])
        .collect();
    let model = ScriptedMockProvider::new(scripts);
    let (session, mut events) = SessionHandle::spawn(Box::new(model), 3, SkillContext::new());

    session.send(Inbound::UserMessage {
        text: "loop".to_string(),
        interaction_id: Some("cap".to_string()),
    });

    let collected = drain_interaction(&mut events, "cap").await;
    assert!(matches!(collected.last(), Some(LoopEvent::InteractionEnded { .. })));
}
