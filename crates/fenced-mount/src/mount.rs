// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `mount(options)` (spec.md §4.4): a server-side record-of-record with a
//! transpiled UI factory source, an optional reactive-record reference, an
//! optional streamed-target identifier, an output schema, named callbacks,
//! and a pending result slot fulfilled by exactly one matching inbound
//! submission.

use std::collections::HashMap;
use std::sync::Mutex;

use fenced_protocol::{Outbound, Patch};
use fenced_reactive::{snapshot, Handle, Subscription};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MountError {
    /// Submission arrived for a mount identifier that either never existed
    /// or whose pending result already resolved — spec.md §6/§7
    /// `unknown_ui_submit`.
    #[error("unknown ui submit")]
    UnknownSubmit,
}

impl MountError {
    pub fn code(&self) -> &'static str {
        match self {
            MountError::UnknownSubmit => "unknown_ui_submit",
        }
    }
}

/// Arguments to `mount(options)`.
pub struct MountOptions {
    /// The transpiled UI factory source shipped to the client verbatim.
    pub ui_source: String,
    /// A reactive record (C2) to snapshot as `initialData` and subscribe
    /// for patch forwarding.
    pub data: Option<Handle>,
    /// A streamed target's identifier, forwarded so the client knows which
    /// `streamed_data_*` frames belong to this mount.
    pub streamed_data_id: Option<String>,
    /// Schema describing the output the UI will eventually submit.
    pub output_schema: Value,
    /// Named callbacks. Only the names cross into Rust — the functions
    /// themselves stay on the script side (spec.md §9 design note on
    /// languages without transparent proxies); dispatch happens by name via
    /// [`MountRegistry::callback_names`].
    pub callback_names: Vec<String>,
}

/// A registered mount. Held inside the registry for the mount's whole
/// lifetime; the reactive-record subscription (if any) lives exactly as
/// long as this does.
pub struct Mount {
    pub id: String,
    pub streamed_data_id: Option<String>,
    pub callback_names: Vec<String>,
    result_tx: Mutex<Option<oneshot::Sender<Value>>>,
    _data_subscription: Option<Subscription>,
}

/// Returned to the caller of `mount(options)`: the mount identifier and the
/// still-pending submission result.
pub struct MountHandle {
    pub id: String,
    result: oneshot::Receiver<Value>,
}

impl MountHandle {
    /// Await the single inbound submission matching this mount. Per
    /// spec.md §5 cancellation, a session `stop()` leaves this pending
    /// forever rather than resolving it with an error.
    pub async fn result(self) -> Option<Value> {
        self.result.await.ok()
    }

    /// Non-blocking peek: `Some(value)` once a submission has landed, `None`
    /// if still pending. Used by `fenced-core`'s host-function bridge, where
    /// script code calls `mount(...).result()` as a synchronous peek rather
    /// than a suspending await — see DESIGN.md's mount-await decision.
    pub fn try_result(&mut self) -> Option<Value> {
        self.result.try_recv().ok()
    }
}

/// The outcome of registering a mount: the handle the script holds, the
/// outbound `mount` frame to send the client, and (if `data` was supplied)
/// the patch sub-stream to forward as `data_patch` frames.
pub struct Registered {
    pub handle: MountHandle,
    pub frame: Outbound,
    pub patches: Option<mpsc::Receiver<Patch>>,
}

#[derive(Default)]
pub struct MountRegistry {
    mounts: Mutex<HashMap<String, Mount>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `mount(options)` — spec.md §4.4. Generates a fresh mount identifier,
    /// subscribes to the reactive record (if any), and returns everything
    /// the caller needs to both answer the script and talk to the client.
    pub fn register(&self, options: MountOptions) -> Registered {
        let id = Uuid::new_v4().to_string();
        let (initial_data, data_subscription, patches) = match options.data {
            Some(handle) => {
                let initial = snapshot(&handle);
                let (sub, rx) = handle.subscribe();
                (Some(initial), Some(sub), Some(rx))
            }
            None => (None, None, None),
        };
        let (result_tx, result_rx) = oneshot::channel();
        let mount = Mount {
            id: id.clone(),
            streamed_data_id: options.streamed_data_id.clone(),
            callback_names: options.callback_names.clone(),
            result_tx: Mutex::new(Some(result_tx)),
            _data_subscription: data_subscription,
        };
        let frame = Outbound::Mount {
            mount_id: id.clone(),
            ui_source: options.ui_source,
            initial_data,
            streamed_data_id: options.streamed_data_id,
            output_schema: options.output_schema,
            callback_names: if options.callback_names.is_empty() {
                None
            } else {
                Some(options.callback_names)
            },
        };
        self.mounts.lock().unwrap().insert(id.clone(), mount);
        Registered {
            handle: MountHandle {
                id,
                result: result_rx,
            },
            frame,
            patches,
        }
    }

    /// `ui_submit` dispatch: resolve the pending result for `mount_id`
    /// exactly once. A second submission for the same identifier, or one
    /// for an identifier that was never registered, reports
    /// [`MountError::UnknownSubmit`] without affecting any other mount.
    pub fn submit(&self, mount_id: &str, value: Value) -> Result<(), MountError> {
        let tx = {
            let mounts = self.mounts.lock().unwrap();
            let mount = mounts.get(mount_id).ok_or(MountError::UnknownSubmit)?;
            mount.result_tx.lock().unwrap().take()
        };
        match tx {
            Some(tx) => {
                let _ = tx.send(value);
                Ok(())
            }
            None => Err(MountError::UnknownSubmit),
        }
    }

    /// The stored callback names for a mount, or `None` if the identifier
    /// is unknown — used by `callback_invoke` dispatch to validate `name`
    /// before invoking the script-side function.
    pub fn callback_names(&self, mount_id: &str) -> Option<Vec<String>> {
        self.mounts
            .lock()
            .unwrap()
            .get(mount_id)
            .map(|m| m.callback_names.clone())
    }

    /// Session `stop()` (spec.md §5): drop every pending result sender so
    /// late submissions are rejected, without ever sending a value — any
    /// script still awaiting a mount's result is left pending until its
    /// own run is aborted by the interpreter's cancellation.
    pub fn clear_pending(&self) {
        for mount in self.mounts.lock().unwrap().values() {
            mount.result_tx.lock().unwrap().take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(ui_source: &str) -> MountOptions {
        MountOptions {
            ui_source: ui_source.to_string(),
            data: None,
            streamed_data_id: None,
            output_schema: json!({}),
            callback_names: vec![],
        }
    }

    #[test]
    fn try_result_peeks_without_consuming_registry_state() {
        let registry = MountRegistry::new();
        let mut registered = registry.register(options("() => {}"));
        let id = registered.handle.id.clone();

        assert_eq!(registered.handle.try_result(), None);
        registry.submit(&id, json!(42)).unwrap();
        assert_eq!(registered.handle.try_result(), Some(json!(42)));
    }

    #[tokio::test]
    async fn pending_result_resolves_exactly_once() {
        let registry = MountRegistry::new();
        let registered = registry.register(options("() => {}"));
        let id = registered.handle.id.clone();

        registry.submit(&id, json!({"ok": true})).unwrap();
        let value = registered.handle.result().await;
        assert_eq!(value, Some(json!({"ok": true})));

        let err = registry.submit(&id, json!({"ok": false})).unwrap_err();
        assert_eq!(err, MountError::UnknownSubmit);
        assert_eq!(err.code(), "unknown_ui_submit");
    }

    #[test]
    fn submit_to_unknown_mount_is_rejected() {
        let registry = MountRegistry::new();
        let err = registry.submit("nonexistent", json!(null)).unwrap_err();
        assert_eq!(err, MountError::UnknownSubmit);
    }

    #[test]
    fn mount_with_data_snapshots_initial_data_and_yields_patches() {
        let registry = MountRegistry::new();
        let handle = fenced_reactive::wrap(json!({"n": 0}));
        let registered = registry.register(MountOptions {
            data: Some(handle.clone()),
            ..options("() => {}")
        });
        match registered.frame {
            Outbound::Mount { initial_data, .. } => {
                assert_eq!(initial_data, Some(json!({"n": 0})));
            }
            _ => panic!("expected Outbound::Mount"),
        }
        assert!(registered.patches.is_some());
    }

    #[test]
    fn callback_names_are_retrievable_by_mount_id() {
        let registry = MountRegistry::new();
        let registered = registry.register(MountOptions {
            callback_names: vec!["onClick".to_string()],
            ..options("() => {}")
        });
        assert_eq!(
            registry.callback_names(&registered.handle.id),
            Some(vec!["onClick".to_string()])
        );
        assert_eq!(registry.callback_names("missing"), None);
    }

    #[tokio::test]
    async fn clear_pending_leaves_result_unresolved() {
        let registry = MountRegistry::new();
        let registered = registry.register(options("() => {}"));
        let id = registered.handle.id.clone();
        registry.clear_pending();
        // a late submission after stop() is rejected, not delivered.
        let err = registry.submit(&id, json!(1)).unwrap_err();
        assert_eq!(err, MountError::UnknownSubmit);
    }
}
