// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Thin wrapper around a persistent `rquickjs` runtime and context.
//!
//! One [`Engine`] backs one interpreter for its whole lifetime: globals set
//! by one statement are visible to the next (spec.md §4.3 persistence), and
//! `console` output is captured into a buffer the caller drains per
//! statement rather than printed.
//!
//! Values cross the Rust/JS boundary as JSON text via `JSON.parse`/
//! `JSON.stringify` rather than through `FromJs`/`IntoJs` conversions — this
//! keeps the boundary to a single `String` shape and matches how the shared
//! context's globals (`Data`, `StreamedData`, mount/skill bindings) will be
//! installed by callers that only ever hold `serde_json::Value`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};

use crate::error::RunError;

/// Safety bound on promise-job draining iterations per statement, so a
/// runaway microtask queue cannot spin this loop forever; the statement's
/// own timeout (enforced by the caller via `tokio::time::timeout`) is the
/// real backstop.
const MAX_DRAIN_ITERATIONS: usize = 1_000_000;

pub struct Engine {
    runtime: Runtime,
    context: Context,
    console: Rc<RefCell<Vec<String>>>,
    /// Flipped by [`Engine::stop`]; checked between promise-job drain
    /// iterations so a `stop()` aborts an in-flight statement at the next
    /// microtask checkpoint (spec.md §4.3 cancellation).
    stopped: Arc<AtomicBool>,
}

impl Engine {
    pub fn new() -> Result<Self, RunError> {
        let runtime = Runtime::new().map_err(|e| RunError::Script(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| RunError::Script(e.to_string()))?;
        let console = Rc::new(RefCell::new(Vec::new()));
        let engine = Engine {
            runtime,
            context,
            console: console.clone(),
            stopped: Arc::new(AtomicBool::new(false)),
        };
        engine.install_console(console)?;
        Ok(engine)
    }

    /// Request that the current (or next) statement abort at the next
    /// microtask checkpoint with [`RunError::Stopped`].
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Clear a previous stop request. Called at the start of each new run so
    /// a stale `stop()` from a finished run doesn't poison the next one.
    pub fn reset_stop(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn install_console(&self, console: Rc<RefCell<Vec<String>>>) -> Result<(), RunError> {
        self.context.with(|ctx| -> rquickjs::Result<()> {
            let console_obj = Object::new(ctx.clone())?;
            for level in ["log", "info", "warn", "error", "debug"] {
                let sink = console.clone();
                let level_owned = level.to_string();
                let func = Function::new(ctx.clone(), move |args_json: String| {
                    sink.borrow_mut().push(format!("[{level_owned}] {args_json}"));
                })?;
                console_obj.set(level, func)?;
            }
            ctx.globals().set("console", console_obj)?;
            // `console.log(...)` forwards its arguments through JSON so the
            // native sink above only ever sees text.
            ctx.eval::<(), _>(
                r#"
                (() => {
                    const orig = {};
                    for (const level of ["log", "info", "warn", "error", "debug"]) {
                        orig[level] = console[level];
                    }
                    for (const level of ["log", "info", "warn", "error", "debug"]) {
                        const native = orig[level];
                        console[level] = (...args) => {
                            let text;
                            try {
                                text = JSON.stringify(args.length === 1 ? args[0] : args);
                            } catch (e) {
                                text = String(args);
                            }
                            native(text === undefined ? "undefined" : text);
                        };
                    }
                })();
                "#,
            )?;
            Ok(())
        })
        .map_err(|e| RunError::Script(e.to_string()))
    }

    /// Drain the buffered `console.*` output produced since the last call.
    pub fn take_console_output(&self) -> Vec<String> {
        std::mem::take(&mut self.console.borrow_mut())
    }

    /// Install or overwrite a global binding visible to subsequent
    /// statements, from an owned JSON value.
    pub fn set_global_json(&self, name: &str, value: &serde_json::Value) -> Result<(), RunError> {
        let value_json = serde_json::to_string(value).map_err(|e| RunError::Script(e.to_string()))?;
        let name_json = serde_json::to_string(name).map_err(|e| RunError::Script(e.to_string()))?;
        // `value_literal` is the JSON text re-encoded as a JS string literal,
        // so it can be spliced into the eval source and handed to
        // `JSON.parse` at runtime.
        let value_literal =
            serde_json::to_string(&value_json).map_err(|e| RunError::Script(e.to_string()))?;
        self.context
            .with(|ctx| -> rquickjs::Result<()> {
                ctx.eval::<(), _>(format!(
                    "globalThis[{name_json}] = JSON.parse({value_literal});"
                ))
            })
            .map_err(|e| RunError::Script(e.to_string()))
    }

    /// Read a global binding back out as a JSON value (used for inspection
    /// and by tests; the statement-execution path never needs this, since
    /// hoisting happens inside the evaluated source itself).
    pub fn get_global_json(&self, name: &str) -> Result<serde_json::Value, RunError> {
        let name_json = serde_json::to_string(name).map_err(|e| RunError::Script(e.to_string()))?;
        let text: String = self
            .context
            .with(|ctx| ctx.eval(format!("JSON.stringify(globalThis[{name_json}])")))
            .map_err(|e| RunError::Script(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| RunError::Script(e.to_string()))
    }

    /// Register a native function reachable from script as `globalThis[name](...)`.
    /// Arguments and the return value round-trip through JSON; `f` is expected
    /// not to panic — a panic would poison the QuickJS heap for the rest of
    /// the interpreter's lifetime.
    pub fn register_function<F>(&self, name: &str, f: F) -> Result<(), RunError>
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, String> + 'static,
    {
        let native_name = format!("__native_{name}");
        self.context
            .with(|ctx| -> rquickjs::Result<()> {
                let func = Function::new(ctx.clone(), move |args_json: String| -> String {
                    let args: serde_json::Value =
                        serde_json::from_str(&args_json).unwrap_or(serde_json::Value::Null);
                    match f(args) {
                        Ok(v) => serde_json::to_string(&v).unwrap_or_else(|_| "null".to_string()),
                        Err(msg) => {
                            let escaped = serde_json::to_string(&msg).unwrap_or_default();
                            format!("{{\"__fenced_error__\": {escaped}}}")
                        }
                    }
                })?;
                ctx.globals().set(native_name.as_str(), func)?;
                ctx.eval::<(), _>(format!(
                    r#"
                    globalThis[{name_json}] = (...args) => {{
                        const raw = globalThis[{native_name_json}](JSON.stringify(args));
                        const parsed = JSON.parse(raw);
                        if (parsed && typeof parsed === "object" && "__fenced_error__" in parsed) {{
                            throw new Error(parsed.__fenced_error__);
                        }}
                        return parsed;
                    }};
                    "#,
                    name_json = serde_json::to_string(name).unwrap(),
                    native_name_json = serde_json::to_string(&native_name).unwrap(),
                ))
            })
            .map_err(|e| RunError::Script(e.to_string()))
    }

    /// Compile-only check: does `candidate` parse as a complete statement?
    /// Wraps it in a disposable function body so nothing executes — a
    /// `SyntaxError` is the only observable effect of an incomplete
    /// candidate, which is exactly the signal the transpilation probe needs.
    pub fn probe_compiles(&self, candidate: &str) -> bool {
        let wrapped = format!("(function() {{\n{candidate}\n}})");
        self.context
            .with(|ctx| ctx.eval::<Value, _>(wrapped.as_str()).is_ok())
    }

    /// Evaluate one already-wrapped statement (the IIFE source produced by
    /// [`crate::envelope::wrap`]), driving the promise returned by the
    /// `async` wrapper to completion.
    pub fn eval_statement(&self, source: &str) -> Result<(), RunError> {
        self.context
            .with(|ctx| eval_and_drain(&self.runtime, ctx, source, &self.stopped))
    }
}

fn eval_and_drain(
    runtime: &Runtime,
    ctx: Ctx<'_>,
    source: &str,
    stopped: &AtomicBool,
) -> Result<(), RunError> {
    use rquickjs::{Promise, PromiseState};

    let promise: Promise = ctx
        .eval(source)
        .map_err(|e| RunError::Script(describe_exception(&ctx, e)))?;

    let mut iterations = 0usize;
    loop {
        if stopped.load(Ordering::SeqCst) {
            return Err(RunError::Stopped);
        }
        match promise.state() {
            PromiseState::Pending => {
                if iterations >= MAX_DRAIN_ITERATIONS {
                    return Err(RunError::Timeout(0));
                }
                iterations += 1;
                if !runtime.execute_pending_job() {
                    // no job made progress, but the promise is still
                    // pending: nothing left that will ever resolve it.
                    return Err(RunError::Script(
                        "statement produced a promise that never settled".to_string(),
                    ));
                }
            }
            PromiseState::Fulfilled => {
                let _: Value = promise
                    .result()
                    .map_err(|e| RunError::Script(describe_exception(&ctx, e)))?;
                return Ok(());
            }
            PromiseState::Rejected => {
                let err: Value = promise
                    .result()
                    .map_err(|e| RunError::Script(describe_exception(&ctx, e)))?;
                return Err(RunError::Script(format_thrown(&ctx, err)));
            }
        }
    }
}

fn describe_exception(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if err.is_exception() {
        if let Ok(exc) = ctx.catch().try_into_exception() {
            return format!("{exc}");
        }
    }
    err.to_string()
}

fn format_thrown(ctx: &Ctx<'_>, value: Value) -> String {
    if let Some(obj) = value.as_object() {
        if let Ok(message) = obj.get::<_, String>("message") {
            return message;
        }
    }
    if let Some(s) = value.as_string() {
        if let Ok(text) = s.to_string() {
            return text;
        }
    }
    let stringify: rquickjs::Result<Function> = ctx.globals().get("String");
    if let Ok(stringify) = stringify {
        if let Ok(text) = stringify.call::<_, String>((value,)) {
            return text;
        }
    }
    "unknown script error".to_string()
}
