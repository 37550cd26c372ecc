//! Idempotency Service (C2).
//!
//! Side-effecting command-bus methods must be called with an idempotency
//! key; replaying the same `(key, actor_id)` with identical parameters
//! returns the previously stored response instead of re-executing.

use crate::error::IdempotencyError;
use crate::store::IdempotencyStore;
use crate::types::IdempotencyStatus;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Default time-to-live for a reserved idempotency key.
pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

/// Outcome of [`IdempotencyService::reserve_or_get`].
pub enum Reservation {
    /// No prior record; caller should proceed and eventually call
    /// [`IdempotencyService::complete`] or [`IdempotencyService::fail`].
    Proceed,
    /// A completed call with matching parameters exists; replay its response.
    Replay(Value),
}

pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
}

impl IdempotencyService {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self { store }
    }

    pub async fn reserve_or_get(
        &self,
        key: &str,
        actor_id: Uuid,
        method: &str,
        params: &Value,
    ) -> Result<Reservation, IdempotencyError> {
        let request_hash = canonical_hash(params);
        match self.store.get(key, actor_id).await {
            None => {
                let inserted = self
                    .store
                    .insert_in_progress(key, actor_id, method, &request_hash, DEFAULT_TTL_SECS)
                    .await;
                if inserted {
                    Ok(Reservation::Proceed)
                } else {
                    // Lost the race to a concurrent reservation; re-check.
                    match self.store.get(key, actor_id).await {
                        Some(entry) => self.classify(entry, &request_hash),
                        None => Err(IdempotencyError::InProgress),
                    }
                }
            }
            Some(entry) => self.classify(entry, &request_hash),
        }
    }

    fn classify(
        &self,
        entry: crate::types::IdempotencyKey,
        request_hash: &str,
    ) -> Result<Reservation, IdempotencyError> {
        if entry.request_hash != request_hash {
            return Err(IdempotencyError::Conflict);
        }
        match entry.status {
            IdempotencyStatus::Completed => {
                Ok(Reservation::Replay(entry.response.unwrap_or(Value::Null)))
            }
            IdempotencyStatus::InProgress => Err(IdempotencyError::InProgress),
            IdempotencyStatus::Failed => Ok(Reservation::Proceed),
        }
    }

    pub async fn complete(&self, key: &str, actor_id: Uuid, response: Value) {
        self.store.complete(key, actor_id, response).await;
    }

    pub async fn fail(&self, key: &str, actor_id: Uuid) {
        self.store.fail(key, actor_id).await;
    }
}

/// SHA-256 over the request's JSON value after recursively sorting object
/// keys, so that `{"a":1,"b":2}` and `{"b":2,"a":1}` hash identically.
pub fn canonical_hash(value: &Value) -> String {
    let canonical = canonicalize(value);
    let serialized = serde_json::to_vec(&canonical).expect("canonical value always serializes");
    let mut hasher = Sha256::new();
    hasher.update(&serialized);
    hex::encode(hasher.finalize())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn canonical_hash_is_order_independent() {
        let a = serde_json::json!({"a": 1, "b": 2});
        let b = serde_json::json!({"b": 2, "a": 1});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn canonical_hash_differs_on_value_change() {
        let a = serde_json::json!({"a": 1});
        let b = serde_json::json!({"a": 2});
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[tokio::test]
    async fn first_call_proceeds_then_replay_on_completed() {
        let store = Arc::new(InMemoryStore::new());
        let svc = IdempotencyService::new(store);
        let actor = Uuid::new_v4();
        let params = serde_json::json!({"x": 1});

        match svc
            .reserve_or_get("k1", actor, "nodes.execute", &params)
            .await
            .unwrap()
        {
            Reservation::Proceed => {}
            _ => panic!("expected Proceed"),
        }
        svc.complete("k1", actor, serde_json::json!({"ok": true})).await;

        match svc
            .reserve_or_get("k1", actor, "nodes.execute", &params)
            .await
            .unwrap()
        {
            Reservation::Replay(resp) => assert_eq!(resp, serde_json::json!({"ok": true})),
            _ => panic!("expected Replay"),
        }
    }

    #[tokio::test]
    async fn in_progress_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let svc = IdempotencyService::new(store);
        let actor = Uuid::new_v4();
        let params = serde_json::json!({"x": 1});
        svc.reserve_or_get("k2", actor, "m", &params).await.unwrap();
        let err = svc.reserve_or_get("k2", actor, "m", &params).await.unwrap_err();
        assert!(matches!(err, IdempotencyError::InProgress));
    }

    #[tokio::test]
    async fn mismatched_params_is_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let svc = IdempotencyService::new(store);
        let actor = Uuid::new_v4();
        svc.reserve_or_get("k3", actor, "m", &serde_json::json!({"x": 1}))
            .await
            .unwrap();
        let err = svc
            .reserve_or_get("k3", actor, "m", &serde_json::json!({"x": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, IdempotencyError::Conflict));
    }

    #[tokio::test]
    async fn failed_call_can_be_retried() {
        let store = Arc::new(InMemoryStore::new());
        let svc = IdempotencyService::new(store);
        let actor = Uuid::new_v4();
        let params = serde_json::json!({"x": 1});
        svc.reserve_or_get("k4", actor, "m", &params).await.unwrap();
        svc.fail("k4", actor).await;
        match svc.reserve_or_get("k4", actor, "m", &params).await.unwrap() {
            Reservation::Proceed => {}
            _ => panic!("expected Proceed after failure"),
        }
    }
}
