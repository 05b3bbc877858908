// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fenced_protocol::{Patch, PathSegment};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// The hidden identifier of a wrapped record. Never enumerable, never part
/// of a snapshot — here that invariant is structural: the identity lives
/// outside the `serde_json::Value` document entirely, so there is nothing to
/// strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(u64);

struct Inner {
    value: Value,
    listeners: HashMap<u64, mpsc::Sender<Patch>>,
    next_listener_id: u64,
}

/// A wrapped reactive record. Cloning a `Handle` shares the same underlying
/// record (same identity, same listener set) — it is the Rust analogue of
/// holding a reference to the same proxied object.
#[derive(Clone)]
pub struct Handle {
    identity: Identity,
    inner: Arc<Mutex<Inner>>,
}

/// A live subscription. Dropping it detaches the observer; when the last
/// subscription for a record is dropped the shared listener map empties and
/// the record stops doing any delivery work until re-subscribed.
pub struct Subscription {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.listeners.remove(&self.id);
        if inner.listeners.is_empty() {
            trace!("last observer detached; record subscription released");
        }
    }
}

/// `wrap(initial)` — returns a handle that behaves as `initial` for reads,
/// and whose mutations (via [`Handle::set`]/[`Handle::delete`]) produce
/// patches delivered to subscribers.
pub fn wrap(initial: Value) -> Handle {
    let identity = Identity(NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed));
    Handle {
        identity,
        inner: Arc::new(Mutex::new(Inner {
            value: initial,
            listeners: HashMap::new(),
            next_listener_id: 0,
        })),
    }
}

/// `identityOf(obj)` — the hidden, stable identifier of a wrapped record.
pub fn identity_of(handle: &Handle) -> Identity {
    handle.identity
}

/// `snapshot(obj)` — a deep copy of the current value with no identifier
/// attached.
pub fn snapshot(handle: &Handle) -> Value {
    handle.inner.lock().unwrap().value.clone()
}

const SUBSCRIPTION_CAPACITY: usize = 32;

impl Handle {
    /// `subscribe(obj, listener)` — attach an observer. All observers of the
    /// same record share one delivery path: every patch produced after this
    /// call reaches every currently-attached observer, in order.
    pub fn subscribe(&self) -> (Subscription, mpsc::Receiver<Patch>) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.insert(id, tx);
        (
            Subscription {
                id,
                inner: Arc::clone(&self.inner),
            },
            rx,
        )
    }

    /// Read the current value at `path`, or `Value::Null` if it does not
    /// exist.
    pub fn get(&self, path: &[PathSegment]) -> Value {
        let inner = self.inner.lock().unwrap();
        navigate(&inner.value, path).cloned().unwrap_or(Value::Null)
    }

    /// `set(path, value)` — write a nested location, producing one patch
    /// carrying the new and prior value at that path.
    pub async fn set(&self, path: Vec<PathSegment>, value: Value) {
        let (prev, listeners) = {
            let mut inner = self.inner.lock().unwrap();
            let prev = navigate(&inner.value, &path).cloned().unwrap_or(Value::Null);
            write_at(&mut inner.value, &path, value.clone());
            (prev, current_listeners(&inner))
        };
        let patch: Patch = ("set".to_string(), path, value, prev);
        deliver(listeners, patch).await;
    }

    /// `delete(path)` — remove a nested location, producing one patch
    /// carrying `Value::Null` as the new value and the removed value as
    /// `prev`.
    pub async fn delete(&self, path: Vec<PathSegment>) {
        let (prev, listeners) = {
            let mut inner = self.inner.lock().unwrap();
            let prev = remove_at(&mut inner.value, &path);
            (prev, current_listeners(&inner))
        };
        let patch: Patch = ("delete".to_string(), path, Value::Null, prev);
        deliver(listeners, patch).await;
    }
}

fn current_listeners(inner: &Inner) -> Vec<mpsc::Sender<Patch>> {
    inner.listeners.values().cloned().collect()
}

async fn deliver(listeners: Vec<mpsc::Sender<Patch>>, patch: Patch) {
    for tx in listeners {
        if tx.send(patch.clone()).await.is_err() {
            trace!("reactive record observer dropped its receiver");
        }
    }
}

fn navigate<'a>(value: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    let mut cur = value;
    for seg in path {
        cur = match (seg, cur) {
            (PathSegment::Key(k), Value::Object(map)) => map.get(k)?,
            (PathSegment::Index(i), Value::Array(arr)) => arr.get(*i)?,
            _ => return None,
        };
    }
    Some(cur)
}

fn write_at(root: &mut Value, path: &[PathSegment], value: Value) {
    let Some((last, ancestors)) = path.split_last() else {
        *root = value;
        return;
    };
    let mut cur = root;
    for seg in ancestors {
        cur = match seg {
            PathSegment::Key(k) => {
                if !matches!(cur, Value::Object(_)) {
                    *cur = Value::Object(serde_json::Map::new());
                }
                let Value::Object(map) = cur else { unreachable!() };
                map.entry(k.clone()).or_insert(Value::Null)
            }
            PathSegment::Index(i) => {
                if !matches!(cur, Value::Array(_)) {
                    *cur = Value::Array(Vec::new());
                }
                let Value::Array(arr) = cur else { unreachable!() };
                while arr.len() <= *i {
                    arr.push(Value::Null);
                }
                &mut arr[*i]
            }
        };
    }
    match last {
        PathSegment::Key(k) => {
            if !matches!(cur, Value::Object(_)) {
                *cur = Value::Object(serde_json::Map::new());
            }
            let Value::Object(map) = cur else { unreachable!() };
            map.insert(k.clone(), value);
        }
        PathSegment::Index(i) => {
            if !matches!(cur, Value::Array(_)) {
                *cur = Value::Array(Vec::new());
            }
            let Value::Array(arr) = cur else { unreachable!() };
            while arr.len() <= *i {
                arr.push(Value::Null);
            }
            arr[*i] = value;
        }
    }
}

fn remove_at(root: &mut Value, path: &[PathSegment]) -> Value {
    let Some((last, ancestors)) = path.split_last() else {
        return std::mem::replace(root, Value::Null);
    };
    let mut cur = root;
    for seg in ancestors {
        let next = match (seg, &mut *cur) {
            (PathSegment::Key(k), Value::Object(map)) => map.get_mut(k),
            (PathSegment::Index(i), Value::Array(arr)) => arr.get_mut(*i),
            _ => None,
        };
        match next {
            Some(v) => cur = v,
            None => return Value::Null,
        }
    }
    match (last, cur) {
        (PathSegment::Key(k), Value::Object(map)) => map.remove(k).unwrap_or(Value::Null),
        (PathSegment::Index(i), Value::Array(arr)) => {
            if *i < arr.len() {
                arr.remove(*i)
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(s: &str) -> PathSegment {
        PathSegment::Key(s.to_string())
    }

    #[test]
    fn identity_is_stable_and_not_in_snapshot() {
        let h = wrap(json!({"n": 0}));
        let id1 = identity_of(&h);
        let id2 = identity_of(&h);
        assert_eq!(id1, id2);
        let snap = snapshot(&h);
        assert_eq!(snap, json!({"n": 0}));
    }

    #[tokio::test]
    async fn set_produces_patch_with_prev_value() {
        let h = wrap(json!({"n": 0}));
        let (_sub, mut rx) = h.subscribe();
        h.set(vec![key("n")], json!(7)).await;
        let (op, path, value, prev) = rx.recv().await.unwrap();
        assert_eq!(op, "set");
        assert_eq!(path, vec![key("n")]);
        assert_eq!(value, json!(7));
        assert_eq!(prev, json!(0));
        assert_eq!(snapshot(&h), json!({"n": 7}));
    }

    #[tokio::test]
    async fn nested_set_autovivifies_intermediate_objects() {
        let h = wrap(json!({}));
        h.set(vec![key("a"), key("b")], json!(1)).await;
        assert_eq!(snapshot(&h), json!({"a": {"b": 1}}));
    }

    #[tokio::test]
    async fn delete_removes_value_and_reports_prev() {
        let h = wrap(json!({"a": {"b": 1}}));
        let (_sub, mut rx) = h.subscribe();
        h.delete(vec![key("a"), key("b")]).await;
        let (op, _path, value, prev) = rx.recv().await.unwrap();
        assert_eq!(op, "delete");
        assert_eq!(value, Value::Null);
        assert_eq!(prev, json!(1));
        assert_eq!(snapshot(&h), json!({"a": {}}));
    }

    #[tokio::test]
    async fn multiple_observers_each_receive_every_patch_in_order() {
        let h = wrap(json!({"n": 0}));
        let (_s1, mut rx1) = h.subscribe();
        let (_s2, mut rx2) = h.subscribe();

        h.set(vec![key("n")], json!(1)).await;
        h.set(vec![key("n")], json!(2)).await;

        let p1a = rx1.recv().await.unwrap();
        let p1b = rx1.recv().await.unwrap();
        let p2a = rx2.recv().await.unwrap();
        let p2b = rx2.recv().await.unwrap();

        assert_eq!(p1a.2, json!(1));
        assert_eq!(p1b.2, json!(2));
        assert_eq!(p2a.2, json!(1));
        assert_eq!(p2b.2, json!(2));
    }

    #[tokio::test]
    async fn detach_is_per_observer_and_last_detach_releases() {
        let h = wrap(json!({"n": 0}));
        let (sub1, mut rx1) = h.subscribe();
        let (sub2, _rx2) = h.subscribe();

        drop(sub1);
        h.set(vec![key("n")], json!(1)).await;
        // rx1 was detached before the mutation; the channel should be closed
        // with no further items.
        assert!(rx1.recv().await.is_none());

        drop(sub2);
        assert_eq!(h.inner.lock().unwrap().listeners.len(), 0);
    }
}
