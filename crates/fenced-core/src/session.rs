// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `Session` (spec.md §3): one client connection's interpreter, registries,
//! and model provider. `rquickjs::Context` is `!Send`, so a session's
//! interpreter is never moved between threads — it lives on one dedicated
//! OS thread running a `current_thread` Tokio runtime plus a
//! `tokio::task::LocalSet`. Callers talk to it only through the
//! channel-backed [`SessionHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use fenced_interp::{Interpreter, RunError};
use fenced_model::ModelProvider;
use fenced_mount::{MountRegistry, StreamedTargetRegistry};
use fenced_protocol::Inbound;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{LogLevel, LoopEvent};
use crate::handles::{DataRegistry, PendingMounts};
use crate::interaction;
use crate::interpreter_setup;
use crate::prompts::system_prompt;
use crate::skills::SkillContext;

fn log(events: &mpsc::UnboundedSender<LoopEvent>, level: LogLevel, msg: impl Into<String>) {
    let _ = events.send(LoopEvent::Log {
        level,
        msg: Some(msg.into()),
        data: None,
        code: None,
        run_id: None,
        block_index: None,
    });
}

/// A live session, addressable from the gateway by sending [`Inbound`]
/// frames and draining the paired [`LoopEvent`] receiver.
pub struct SessionHandle {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    stopped: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawn a session's dedicated thread. Returns immediately; the
    /// interpreter and prelude install happen on the new thread, with any
    /// failure surfaced as a `LoopEvent::Log` on the returned receiver.
    pub fn spawn(
        model: Box<dyn ModelProvider>,
        turn_cap: u32,
        skills: SkillContext,
    ) -> (Self, mpsc::UnboundedReceiver<LoopEvent>) {
        let id = Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let thread_id = id.clone();
        let thread_events = events_tx.clone();
        let thread_stopped = stopped.clone();
        let thread = std::thread::Builder::new()
            .name(format!("fenced-session-{id}"))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("building session runtime");
                let local = LocalSet::new();
                local.block_on(
                    &runtime,
                    session_main(
                        thread_id,
                        model,
                        turn_cap,
                        skills,
                        inbound_rx,
                        thread_events,
                        thread_stopped,
                    ),
                );
            })
            .expect("spawning session thread");

        (
            Self {
                id,
                created_at,
                inbound_tx,
                stopped,
                _thread: thread,
            },
            events_rx,
        )
    }

    /// Enqueue an inbound frame for processing on the session's thread.
    /// Silently dropped if the session has already torn down.
    pub fn send(&self, frame: Inbound) {
        let _ = self.inbound_tx.send(frame);
    }

    /// spec.md §4.3/§5 `stop()`: the in-flight interaction (if any) is
    /// cancelled at its next checkpoint, pending mount results are cleared
    /// rather than resolved, and no further turns start.
    pub fn stop(&self) {
        debug!(session_id = %self.id, "session stop requested");
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct Session {
    interp: Interpreter,
    model: Box<dyn ModelProvider>,
    mounts: Arc<MountRegistry>,
    streamed: Arc<StreamedTargetRegistry>,
    events: mpsc::UnboundedSender<LoopEvent>,
    stopped: Arc<AtomicBool>,
    running: AtomicBool,
    turn_cap: u32,
}

async fn session_main(
    id: String,
    model: Box<dyn ModelProvider>,
    turn_cap: u32,
    skills: SkillContext,
    mut inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    events: mpsc::UnboundedSender<LoopEvent>,
    stopped: Arc<AtomicBool>,
) {
    info!(session_id = %id, "session started");
    let interp = match Interpreter::new() {
        Ok(interp) => interp,
        Err(err) => {
            warn!(session_id = %id, %err, "interpreter construction failed");
            log(&events, LogLevel::Error, format!("interpreter construction failed: {err}"));
            return;
        }
    };

    model.set_system_prompt(system_prompt(&skills));

    let data = Arc::new(DataRegistry::new());
    let mounts = Arc::new(MountRegistry::new());
    let pending_mounts = Arc::new(PendingMounts::new());
    let streamed = Arc::new(StreamedTargetRegistry::new());

    if let Err(err) = interpreter_setup::install(
        &interp,
        &skills,
        data,
        mounts.clone(),
        pending_mounts,
        streamed.clone(),
        events.clone(),
    )
    .await
    {
        log(&events, LogLevel::Error, format!("prelude install failed: {err}"));
        return;
    }

    let session = Session {
        interp,
        model,
        mounts,
        streamed,
        events,
        stopped,
        running: AtomicBool::new(false),
        turn_cap,
    };

    while let Some(frame) = inbound_rx.recv().await {
        if session.stopped.load(Ordering::SeqCst) {
            break;
        }
        session.handle_inbound(frame).await;
    }
    // spec.md §5 stop(): reject rather than resolve any mount result a
    // script is still awaiting.
    session.mounts.clear_pending();
    info!(session_id = %id, "session stopped");
}

impl Session {
    async fn handle_inbound(&self, frame: Inbound) {
        match frame {
            Inbound::UserMessage { text, interaction_id } => self.start_interaction(text, interaction_id).await,
            Inbound::UiSubmit { mount_id, value } => {
                if let Err(err) = self.mounts.submit(&mount_id, value) {
                    let _ = self.events.send(LoopEvent::Log {
                        level: LogLevel::Warn,
                        msg: Some(err.to_string()),
                        data: None,
                        code: Some(fenced_protocol::ErrorCode::UnknownUiSubmit),
                        run_id: None,
                        block_index: None,
                    });
                }
            }
            Inbound::CallbackInvoke { mount_id, name, args } => self.dispatch_callback(mount_id, name, args).await,
            Inbound::ClientLog { lvl, msg, data } => {
                let _ = self.events.send(LoopEvent::Log {
                    level: protocol_log_level(lvl),
                    msg,
                    data,
                    code: None,
                    run_id: None,
                    block_index: None,
                });
            }
        }
    }

    async fn start_interaction(&self, text: String, interaction_id: Option<String>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log(&self.events, LogLevel::Warn, "an interaction is already running on this session");
            return;
        }
        let interaction_id = interaction_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let outcome = interaction::run(
            interaction_id,
            text,
            &self.interp,
            self.model.as_ref(),
            &self.streamed,
            &self.events,
            &self.stopped,
            self.turn_cap,
        )
        .await;
        self.running.store(false, Ordering::SeqCst);
        if let Err(err) = outcome {
            log(&self.events, LogLevel::Error, err.to_string());
        }
    }

    async fn dispatch_callback(&self, mount_id: String, name: String, args: serde_json::Value) {
        let statement = format!(
            "__dispatchCallback({}, {}, {});",
            serde_json::Value::String(mount_id),
            serde_json::Value::String(name),
            args,
        );
        let stream = tokio_stream::iter(vec![statement]);
        match self.interp.run(stream, |_event| {}).await {
            Ok(_) => {}
            Err(RunError::AlreadyRunning) => {
                log(&self.events, LogLevel::Warn, "dropped callback invoke: an interaction is in flight");
            }
            Err(err) => log(&self.events, LogLevel::Error, err.to_string()),
        }
    }
}

fn protocol_log_level(level: fenced_protocol::LogLevel) -> LogLevel {
    match level {
        fenced_protocol::LogLevel::Debug => LogLevel::Debug,
        fenced_protocol::LogLevel::Info => LogLevel::Info,
        fenced_protocol::LogLevel::Warn => LogLevel::Warn,
        fenced_protocol::LogLevel::Error => LogLevel::Error,
    }
}
