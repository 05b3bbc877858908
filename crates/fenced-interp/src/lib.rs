// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Streaming statement-at-a-time interpreter (C3).
//!
//! One [`Interpreter`] backs one session for its whole lifetime: globals
//! bound by one statement are visible to every later statement, in the same
//! run or a later one (spec.md §4.3 persistence). A single [`Interpreter`]
//! accepts at most one [`Interpreter::run`] at a time — a second call while
//! one is in flight fails with [`RunError::AlreadyRunning`].
//!
//! The engine (`rquickjs::Context`) is `!Send`; callers own the obligation to
//! drive an `Interpreter` from a single-threaded task (a `tokio::task::LocalSet`),
//! per spec.md §5's single-cooperative-task-per-session model.

mod destructure;
mod engine;
mod envelope;
mod error;
mod scanner;

pub use engine::Engine;
pub use envelope::{extract_bound_names, Binding};
pub use error::RunError;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::Stream;
use futures::StreamExt;
use scanner::BoundaryScanner;

/// The per-run ceiling of spec.md §4.3: "an overall per-run ceiling of 60
/// seconds" bounding any single streamed run (i.e. one code fence).
pub const RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// One statement's execution result, emitted as it happens so a caller can
/// log per-statement progress (spec.md §4.3 output capture: "each
/// statement's execution exposes an event carrying the buffer-delta ...
/// plus its error if any").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementEvent {
    pub source: String,
    pub log_delta: String,
    pub error: Option<String>,
}

/// The accumulated result of one run across all its statements: the
/// concatenation of every statement's captured output, and the final error
/// string (if any statement failed) — spec.md §3's `Transcript` shape,
/// scoped to a single code segment's run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub logs: String,
    pub error: Option<String>,
}

/// A persistent, session-scoped interpreter.
pub struct Interpreter {
    engine: Engine,
    running: AtomicBool,
}

impl Interpreter {
    pub fn new() -> Result<Self, RunError> {
        Ok(Self {
            engine: Engine::new()?,
            running: AtomicBool::new(false),
        })
    }

    /// Install (or overwrite) a global binding, visible to every subsequent
    /// statement — the mechanism by which `Data`, `StreamedData`, `mount`,
    /// and skill globals are injected at session construction (spec.md
    /// §4.3's "shared context prelude").
    pub fn set_global_json(&self, name: &str, value: &serde_json::Value) -> Result<(), RunError> {
        self.engine.set_global_json(name, value)
    }

    pub fn get_global_json(&self, name: &str) -> Result<serde_json::Value, RunError> {
        self.engine.get_global_json(name)
    }

    /// Register a native host function reachable from script.
    pub fn register_function<F>(&self, name: &str, f: F) -> Result<(), RunError>
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, String> + 'static,
    {
        self.engine.register_function(name, f)
    }

    /// Request cancellation of the in-flight run (spec.md §4.3 `stop()`). A
    /// no-op if no run is in progress.
    pub fn stop(&self) {
        self.engine.stop();
    }

    /// Drive one streaming run of statements sourced from `body`, calling
    /// `on_event` after each statement executes. Returns once `body` closes
    /// and the final statement (if any) has resolved, or once the per-run
    /// timeout of [`RUN_TIMEOUT`] elapses.
    ///
    /// Errors at the *caller* level (not captured in the returned
    /// [`RunOutcome`]) only ever occur before any statement has been
    /// attempted: [`RunError::AlreadyRunning`] if another run is already in
    /// flight on this interpreter.
    pub async fn run(
        &self,
        body: impl Stream<Item = String> + Unpin,
        mut on_event: impl FnMut(StatementEvent),
    ) -> Result<RunOutcome, RunError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunError::AlreadyRunning);
        }
        self.engine.reset_stop();
        let guard = RunningGuard(&self.running);

        let outcome = match tokio::time::timeout(RUN_TIMEOUT, self.run_inner(body, &mut on_event))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                self.engine.stop();
                RunOutcome {
                    logs: String::new(),
                    error: Some(format!("timed out after {}ms", RUN_TIMEOUT.as_millis())),
                }
            }
        };
        drop(guard);
        Ok(outcome)
    }

    async fn run_inner(
        &self,
        mut body: impl Stream<Item = String> + Unpin,
        on_event: &mut impl FnMut(StatementEvent),
    ) -> RunOutcome {
        let mut scanner = BoundaryScanner::new();
        let mut buffer = String::new();
        let mut logs = String::new();
        let mut error: Option<String> = None;

        'outer: while let Some(chunk) = body.next().await {
            let local_candidates = scanner.candidates_in(&chunk);
            let chunk_start = buffer.len();
            buffer.push_str(&chunk);

            // Every `local_idx` is relative to `chunk` as it stood when
            // `chunk_start` was captured. A successful split below shrinks
            // `buffer` by draining its front, shifting all later candidates
            // left by the same amount — `consumed` tracks that shift so each
            // `boundary` is computed against the *current* buffer, not the
            // stale pre-shrink coordinates.
            let mut consumed = 0usize;
            for local_idx in local_candidates {
                let boundary = chunk_start + local_idx - consumed;
                let candidate = &buffer[..=boundary];
                if !self.engine.probe_compiles(candidate) {
                    continue; // accumulate further — inside a string/comment/etc.
                }
                let stmt = candidate.to_string();
                let rest = buffer[boundary + 1..].to_string();
                consumed += boundary + 1;
                buffer = rest;

                let (delta, stmt_error) = self.execute_one(&stmt);
                logs.push_str(&delta);
                on_event(StatementEvent {
                    source: stmt,
                    log_delta: delta,
                    error: stmt_error.clone(),
                });
                if let Some(e) = stmt_error {
                    error = Some(e);
                    break 'outer; // first-error stop (property 10): discard remaining text.
                }
            }
        }

        if error.is_none() {
            let tail = buffer.trim();
            if !tail.is_empty() {
                if self.engine.probe_compiles(tail) {
                    let (delta, stmt_error) = self.execute_one(tail);
                    logs.push_str(&delta);
                    on_event(StatementEvent {
                        source: tail.to_string(),
                        log_delta: delta,
                        error: stmt_error.clone(),
                    });
                    error = stmt_error;
                } else {
                    error = Some(RunError::IncompleteStatement.to_string());
                }
            }
        }

        RunOutcome { logs, error }
    }

    /// Execute one complete statement, returning the console-output delta it
    /// produced and its error (formatted per spec.md §4.3: `error.message`
    /// when available, else `String(error)` — both already reduced to a
    /// plain string by [`RunError`]'s `Display`).
    fn execute_one(&self, stmt: &str) -> (String, Option<String>) {
        let wrapped = envelope::wrap(stmt);
        let result = self.engine.eval_statement(&wrapped.source);
        let before = self.engine.take_console_output();
        let delta = if before.is_empty() {
            String::new()
        } else {
            let mut s = before.join("\n");
            s.push('\n');
            s
        };
        match result {
            Ok(()) => (delta, None),
            Err(e) => (delta, Some(e.to_string())),
        }
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt as _;

    fn chunks(parts: &[&str]) -> impl Stream<Item = String> + Unpin {
        tokio_stream::iter(parts.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn persistence_across_statements_in_one_run() {
        let interp = Interpreter::new().unwrap();
        let outcome = interp
            .run(
                chunks(&["const a=1; const b=2; console.log(a+b);"]),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(outcome.logs, "3\n");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn persistence_across_separate_runs() {
        let interp = Interpreter::new().unwrap();
        interp.run(chunks(&["const x = 41;"]), |_| {}).await.unwrap();
        let outcome = interp
            .run(chunks(&["console.log(x+1);"]), |_| {})
            .await
            .unwrap();
        assert_eq!(outcome.logs, "42\n");
    }

    #[tokio::test]
    async fn three_statements_emit_three_events() {
        let interp = Interpreter::new().unwrap();
        let mut events = Vec::new();
        let outcome = interp
            .run(
                chunks(&["const a=1; const b=2; console.log(a+b);"]),
                |ev| events.push(ev),
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events.last().unwrap().log_delta, "3\n");
        assert_eq!(outcome.logs, "3\n");
    }

    #[tokio::test]
    async fn four_statements_in_one_chunk_all_execute_in_order() {
        // Regression test: every candidate boundary after the first within a
        // single chunk must be recomputed against the post-split buffer, not
        // the stale pre-shrink offsets, or later statements are corrupted or
        // panic on a truncated buffer.
        let interp = Interpreter::new().unwrap();
        let outcome = interp
            .run(
                chunks(&["const a=1; const b=2; const c=3; console.log(a+b+c);"]),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(outcome.logs, "6\n");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn semicolons_in_strings_and_comments_do_not_split_statements() {
        let interp = Interpreter::new().unwrap();
        let mut events = Vec::new();
        let outcome = interp
            .run(
                chunks(&["const x = \"a;b\"; // c;d\n console.log(x);"]),
                |ev| events.push(ev),
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(outcome.logs, "\"a;b\"\n");
    }

    #[tokio::test]
    async fn destructuring_patterns_bind_all_names() {
        let interp = Interpreter::new().unwrap();
        let outcome = interp
            .run(
                chunks(&[
                    "const {a, b: c} = {a: 1, b: 2};",
                    "const [d, [e, f]] = [3, [4, 5]];",
                    "console.log(a+c+d+e+f);",
                ]),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(outcome.logs, "15\n");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn first_error_stops_remaining_statements() {
        let interp = Interpreter::new().unwrap();
        let mut events = Vec::new();
        let outcome = interp
            .run(
                chunks(&["throw new Error('boom'); console.log('never');"]),
                |ev| events.push(ev),
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
        assert!(!outcome.logs.contains("never"));
    }

    #[tokio::test]
    async fn incomplete_trailing_statement_reports_error() {
        let interp = Interpreter::new().unwrap();
        let outcome = interp.run(chunks(&["const a = ("]), |_| {}).await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some("Incomplete statement"));
    }

    #[tokio::test]
    async fn empty_trailing_whitespace_is_not_an_error() {
        let interp = Interpreter::new().unwrap();
        let outcome = interp
            .run(chunks(&["console.log(1);  \n  "]), |_| {})
            .await
            .unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.logs, "1\n");
    }

    #[tokio::test]
    async fn second_concurrent_run_is_rejected() {
        // Both futures are polled cooperatively on this single task — no
        // spawn needed, which matters because the engine is `!Send`.
        let interp = Interpreter::new().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let gate = async_stream_from_gate(rx);

        let first = interp.run(gate, |_| {});
        let second = async {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            let r = interp.run(chunks(&["1;"]), |_| {}).await;
            assert!(matches!(r, Err(RunError::AlreadyRunning)));
            let _ = tx.send(());
        };
        let (first_res, _) = tokio::join!(first, second);
        first_res.unwrap();
    }

    fn async_stream_from_gate(
        rx: tokio::sync::oneshot::Receiver<()>,
    ) -> impl Stream<Item = String> + Unpin {
        Box::pin(futures::stream::once(async move {
            let _ = rx.await;
            "1;".to_string()
        }))
    }

    #[tokio::test]
    async fn run_is_rejected_after_prior_run_completes_is_allowed_again() {
        let interp = Interpreter::new().unwrap();
        interp.run(chunks(&["1;"]), |_| {}).await.unwrap();
        // A finished run releases the guard; a new run is allowed.
        let outcome = interp.run(chunks(&["console.log(2);"]), |_| {}).await.unwrap();
        assert_eq!(outcome.logs, "2\n");
    }

    #[tokio::test]
    async fn globals_are_injected_and_visible_to_statements() {
        let interp = Interpreter::new().unwrap();
        interp
            .set_global_json("Seed", &serde_json::json!(7))
            .unwrap();
        let outcome = interp
            .run(chunks(&["console.log(Seed * 6);"]), |_| {})
            .await
            .unwrap();
        assert_eq!(outcome.logs, "42\n");
    }
}
