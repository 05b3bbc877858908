// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session-scoped handle tables bridging the interpreter's JSON-only native
//! functions (`fenced_interp::Engine::register_function`) to the owned Rust
//! objects they need to reach: reactive records (C2) created by the script
//! via `Data(initial)`, and mount result slots (C4) peeked by
//! `mount(...).result()`.
//!
//! `mount(...).result()` is realized as a non-blocking peek rather than a
//! suspending await (see DESIGN.md's Open Question decisions); once a
//! pending [`fenced_mount::MountHandle`] resolves, its value is cached here
//! so every later peek of the same mount id keeps returning that value, the
//! same way a settled JS promise keeps resolving to the same value on every
//! subsequent `await`.

use std::collections::HashMap;
use std::sync::Mutex;

use fenced_mount::MountHandle;
use fenced_reactive::Handle;
use serde_json::Value;
use uuid::Uuid;

/// Reactive records created inside a session's interpreter via `Data(...)`,
/// keyed by a server-minted id threaded through to script as `__dataId`.
#[derive(Default)]
pub struct DataRegistry {
    handles: Mutex<HashMap<String, Handle>>,
}

impl DataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrap(&self, initial: Value) -> String {
        let id = Uuid::new_v4().to_string();
        self.handles.lock().unwrap().insert(id.clone(), fenced_reactive::wrap(initial));
        id
    }

    pub fn get(&self, id: &str) -> Option<Handle> {
        self.handles.lock().unwrap().get(id).cloned()
    }
}

enum PendingMountState {
    Pending(MountHandle),
    Resolved(Value),
}

/// Pending `mount(...).result()` slots, keyed by mount id.
#[derive(Default)]
pub struct PendingMounts {
    handles: Mutex<HashMap<String, PendingMountState>>,
}

impl PendingMounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, mount_id: String, handle: MountHandle) {
        self.handles
            .lock()
            .unwrap()
            .insert(mount_id, PendingMountState::Pending(handle));
    }

    /// Non-blocking peek: `Some(value)` once resolved (cached from then on),
    /// `None` while still pending or for an unknown mount id.
    pub fn try_result(&self, mount_id: &str) -> Option<Value> {
        let mut handles = self.handles.lock().unwrap();
        match handles.get_mut(mount_id) {
            Some(PendingMountState::Resolved(value)) => Some(value.clone()),
            Some(PendingMountState::Pending(handle)) => {
                let value = handle.try_result()?;
                handles.insert(mount_id.to_string(), PendingMountState::Resolved(value.clone()));
                Some(value)
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_registry_round_trips_handles_by_id() {
        let registry = DataRegistry::new();
        let id = registry.wrap(json!({"n": 0}));
        assert!(registry.get(&id).is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[tokio::test]
    async fn pending_mounts_caches_resolved_value_for_repeat_peeks() {
        let mount_registry = fenced_mount::MountRegistry::new();
        let registered = mount_registry.register(fenced_mount::MountOptions {
            ui_source: "() => {}".to_string(),
            data: None,
            streamed_data_id: None,
            output_schema: json!({}),
            callback_names: vec![],
        });
        let mount_id = registered.handle.id.clone();
        let pending = PendingMounts::new();
        pending.insert(mount_id.clone(), registered.handle);

        assert_eq!(pending.try_result(&mount_id), None);
        mount_registry.submit(&mount_id, json!(7)).unwrap();
        assert_eq!(pending.try_result(&mount_id), Some(json!(7)));
        // Second peek after resolution still returns the cached value.
        assert_eq!(pending.try_result(&mount_id), Some(json!(7)));
    }
}
