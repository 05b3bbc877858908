// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Streamed-target registry (spec.md §4.5 data dispatch, §9 design note): a
//! lazily populated record registered under a caller-chosen identifier,
//! unique per session. Property reads before any data fence arrives yield
//! `Unset`; a later fence addressing the same identifier wholly replaces
//! its contents — merge semantics are an explicit non-goal (spec.md §1).

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// The lifecycle of one streamed target, mirrored from spec.md §9's design
/// note on lazily populated records.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamedTarget {
    /// Registered, no data fence has addressed it yet.
    Unset,
    /// A data fence addressing this identifier is currently streaming; its
    /// chunks are tee'd straight to the outbound channel by the interaction
    /// loop rather than accumulated here.
    Streaming,
    /// The most recently closed data fence's parsed contents.
    Set(Value),
}

#[derive(Default)]
pub struct StreamedTargetRegistry {
    targets: Mutex<HashMap<String, StreamedTarget>>,
}

impl StreamedTargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`, making it a valid data-fence target. Re-registering
    /// an existing identifier is a no-op — its current state is preserved.
    pub fn register(&self, id: impl Into<String>) {
        self.targets
            .lock()
            .unwrap()
            .entry(id.into())
            .or_insert(StreamedTarget::Unset);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.targets.lock().unwrap().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<StreamedTarget> {
        self.targets.lock().unwrap().get(id).cloned()
    }

    /// A data fence addressing `id` started streaming. Returns `false`
    /// (and leaves the registry untouched) if `id` was never registered —
    /// the caller should log `unknown_target` and drop the segment.
    pub fn mark_streaming(&self, id: &str) -> bool {
        let mut targets = self.targets.lock().unwrap();
        match targets.get_mut(id) {
            Some(target) => {
                *target = StreamedTarget::Streaming;
                true
            }
            None => false,
        }
    }

    /// The data fence's sub-stream closed and its concatenation parsed as
    /// JSON successfully — wholly replace `id`'s contents. Returns `false`
    /// if `id` is unknown.
    pub fn replace(&self, id: &str, value: Value) -> bool {
        let mut targets = self.targets.lock().unwrap();
        match targets.get_mut(id) {
            Some(target) => {
                *target = StreamedTarget::Set(value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unregistered_target_is_not_contained() {
        let registry = StreamedTargetRegistry::new();
        assert!(!registry.contains("ghost"));
        assert!(!registry.mark_streaming("ghost"));
        assert!(!registry.replace("ghost", json!({"a": 1})));
    }

    #[test]
    fn registered_target_starts_unset() {
        let registry = StreamedTargetRegistry::new();
        registry.register("t1");
        assert_eq!(registry.get("t1"), Some(StreamedTarget::Unset));
    }

    #[test]
    fn streaming_then_set_wholly_replaces_contents() {
        let registry = StreamedTargetRegistry::new();
        registry.register("t1");
        assert!(registry.mark_streaming("t1"));
        assert_eq!(registry.get("t1"), Some(StreamedTarget::Streaming));

        assert!(registry.replace("t1", json!({"a": 1})));
        assert_eq!(registry.get("t1"), Some(StreamedTarget::Set(json!({"a": 1}))));

        // a second fence wholly replaces, it does not merge.
        assert!(registry.mark_streaming("t1"));
        assert!(registry.replace("t1", json!({"b": 2})));
        assert_eq!(registry.get("t1"), Some(StreamedTarget::Set(json!({"b": 2}))));
    }

    #[test]
    fn re_registering_preserves_existing_state() {
        let registry = StreamedTargetRegistry::new();
        registry.register("t1");
        registry.replace("t1", json!(1));
        registry.register("t1");
        assert_eq!(registry.get("t1"), Some(StreamedTarget::Set(json!(1))));
    }
}
