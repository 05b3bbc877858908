// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wires the native functions backing `Data`, `StreamedData`, and `mount`
//! onto a freshly constructed [`fenced_interp::Interpreter`], injects any
//! skill globals, and runs the JS prelude (`prompts::JS_PRELUDE`) once so
//! the globals exist before the first user turn starts.
//!
//! Every native function registered here is the JSON-in/JSON-out shape
//! `fenced_interp::Engine::register_function` expects (see
//! `fenced-interp/src/engine.rs`): the JS-side call arguments arrive as a
//! single `serde_json::Value::Array`, and the function returns
//! `Result<Value, String>` where `Err` is rethrown as a JS `Error`.
//! `fenced-reactive`'s `Handle::set`/`Handle::delete` are `async fn`s;
//! bridging them into this synchronous boundary uses
//! `futures::executor::block_on`, since the session's interpreter already
//! runs on its own dedicated thread (see `session.rs`) and never overlaps
//! with other async work that a nested blocking call could deadlock.

use std::sync::Arc;

use fenced_interp::Interpreter;
use fenced_mount::{MountOptions, MountRegistry};
use fenced_reactive::snapshot;
use serde_json::{json, Value};

use crate::error::LoopError;
use crate::events::LoopEvent;
use crate::handles::{DataRegistry, PendingMounts};
use crate::prompts::JS_PRELUDE;
use crate::skills::SkillContext;

fn arg(args: &Value, index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

fn path_segments(value: &Value) -> Vec<fenced_protocol::PathSegment> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    if let Some(s) = item.as_str() {
                        Some(fenced_protocol::PathSegment::Key(s.to_string()))
                    } else {
                        item.as_u64().map(|i| fenced_protocol::PathSegment::Index(i as usize))
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Registers every native function the prelude depends on, then runs the
/// prelude to completion. `events` is the sink every mount/patch/log
/// produced from here on is forwarded to; `mounts`/`streamed`/`data`/
/// `pending_mounts` are the session's shared registries (owned by
/// `session.rs`, cloned in here by `Arc`).
pub async fn install(
    interp: &Interpreter,
    skills: &SkillContext,
    data: Arc<DataRegistry>,
    mounts: Arc<MountRegistry>,
    pending_mounts: Arc<PendingMounts>,
    streamed: Arc<fenced_mount::StreamedTargetRegistry>,
    events: tokio::sync::mpsc::UnboundedSender<LoopEvent>,
) -> Result<(), LoopError> {
    for (name, value) in skills.globals() {
        interp.set_global_json(&name, &value)?;
    }

    {
        let data = data.clone();
        interp.register_function("data_wrap", move |args: Value| {
            Ok(json!(data.wrap(arg(&args, 0))))
        })?;
    }
    {
        let data = data.clone();
        interp.register_function("data_get", move |args: Value| {
            let id = arg(&args, 0).as_str().unwrap_or_default().to_string();
            let handle = data.get(&id).ok_or_else(|| format!("unknown data handle: {id}"))?;
            let path = path_segments(&arg(&args, 1));
            Ok(handle.get(&path))
        })?;
    }
    {
        let data = data.clone();
        interp.register_function("data_set", move |args: Value| {
            let id = arg(&args, 0).as_str().unwrap_or_default().to_string();
            let handle = data.get(&id).ok_or_else(|| format!("unknown data handle: {id}"))?;
            let path = path_segments(&arg(&args, 1));
            let value = arg(&args, 2);
            futures::executor::block_on(handle.set(path, value));
            Ok(Value::Null)
        })?;
    }
    {
        let data = data.clone();
        interp.register_function("data_delete", move |args: Value| {
            let id = arg(&args, 0).as_str().unwrap_or_default().to_string();
            let handle = data.get(&id).ok_or_else(|| format!("unknown data handle: {id}"))?;
            let path = path_segments(&arg(&args, 1));
            futures::executor::block_on(handle.delete(path));
            Ok(Value::Null)
        })?;
    }

    {
        let streamed = streamed.clone();
        interp.register_function("streamed_register", move |args: Value| {
            let id = arg(&args, 0).as_str().unwrap_or_default().to_string();
            streamed.register(id);
            Ok(Value::Null)
        })?;
    }
    {
        let streamed = streamed.clone();
        interp.register_function("streamed_get", move |args: Value| {
            let id = arg(&args, 0).as_str().unwrap_or_default().to_string();
            let value = match streamed.get(&id) {
                Some(fenced_mount::StreamedTarget::Set(v)) => v,
                _ => Value::Null,
            };
            Ok(value)
        })?;
    }

    {
        let mounts = mounts.clone();
        let pending_mounts = pending_mounts.clone();
        let data = data.clone();
        let events = events.clone();
        interp.register_function("mount_register", move |args: Value| {
            let opts = arg(&args, 0);
            let ui_source = opts
                .get("uiSource")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let data_id = opts.get("dataId").and_then(Value::as_str).map(str::to_string);
            let streamed_data_id = opts
                .get("streamedDataId")
                .and_then(Value::as_str)
                .map(str::to_string);
            let output_schema = opts.get("outputSchema").cloned().unwrap_or(json!({}));
            let callback_names: Vec<String> = opts
                .get("callbackNames")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();

            let data_handle = data_id.as_deref().and_then(|id| data.get(id));
            let initial_data = data_handle.as_ref().map(snapshot);

            let registered = mounts.register(MountOptions {
                ui_source: ui_source.clone(),
                data: data_handle,
                streamed_data_id: streamed_data_id.clone(),
                output_schema: output_schema.clone(),
                callback_names: callback_names.clone(),
            });
            let mount_id = registered.handle.id.clone();

            let _ = events.send(LoopEvent::Mount {
                mount_id: mount_id.clone(),
                ui_source,
                initial_data,
                streamed_data_id,
                output_schema,
                callback_names: if callback_names.is_empty() {
                    None
                } else {
                    Some(callback_names)
                },
            });

            if let Some(mut patches) = registered.patches {
                let events = events.clone();
                let mount_id = mount_id.clone();
                tokio::spawn(async move {
                    while let Some(patch) = patches.recv().await {
                        let _ = events.send(LoopEvent::DataPatch {
                            mount_id: mount_id.clone(),
                            patches: vec![patch],
                        });
                    }
                });
            }

            pending_mounts.insert(mount_id.clone(), registered.handle);
            Ok(json!(mount_id))
        })?;
    }
    {
        let pending_mounts = pending_mounts.clone();
        interp.register_function("mount_result", move |args: Value| {
            let mount_id = arg(&args, 0).as_str().unwrap_or_default().to_string();
            Ok(pending_mounts.try_result(&mount_id).unwrap_or(Value::Null))
        })?;
    }

    let prelude = tokio_stream::iter(vec![JS_PRELUDE.to_string()]);
    interp
        .run(prelude, |_event| {})
        .await
        .map_err(LoopError::InterpreterInit)?;

    Ok(())
}
