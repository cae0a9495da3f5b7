// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deduplication — two maps keyed by correlation id and by content hash
//! (spec section 4.2), giving the RPC layer idempotency against retries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::rpc::ResponseEnvelope;

/// A request is considered a duplicate of one seen in the last 10 minutes.
const CORRELATION_WINDOW: Duration = Duration::from_secs(10 * 60);
/// Entries older than this are swept regardless of which map they live in.
const ENTRY_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
enum Slot {
    /// The first request with this key is still being handled.
    InFlight,
    /// The handler finished; this is the response to replay.
    Completed(ResponseEnvelope),
}

struct Entry {
    slot: Slot,
    recorded_at: Instant,
}

/// Content-hash over `(method, endpoint, canonicalized(data))` — canonical
/// in the sense that JSON object keys are sorted before hashing so two
/// structurally-identical payloads with different field order collide.
pub fn content_hash(method: &str, endpoint: &str, data: &serde_json::Value) -> String {
    let canonical = canonicalize(data);
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\0");
    hasher.update(endpoint.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut sorted = serde_json::Map::new();
                for (k, v) in entries {
                    sorted.insert(k.clone(), sort(v));
                }
                serde_json::Value::Object(sorted)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

/// Outcome of checking a request against the dedup maps before dispatch.
pub enum DedupOutcome {
    /// Neither key has been seen; proceed with the handler, then call
    /// [`Deduplicator::complete`].
    Fresh,
    /// The correlation id was seen and its response is cached — replay it
    /// verbatim (idempotency).
    ReplayCached(ResponseEnvelope),
    /// A matching correlation id or content hash is in flight; wait is not
    /// implemented here (callers short-circuit to a `ServiceUnavailable`-
    /// free no-op) — surfaced distinctly so the RPC server can choose to
    /// drop silently per spec section 4.2.
    InFlightElsewhere,
}

/// Tracks in-flight and recently-completed requests by correlation id and
/// by content hash, so replays and concurrent duplicates share one response.
pub struct Deduplicator {
    by_correlation: Mutex<HashMap<String, Entry>>,
    by_content: Mutex<HashMap<String, Entry>>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    pub fn new() -> Self {
        Self { by_correlation: Mutex::new(HashMap::new()), by_content: Mutex::new(HashMap::new()) }
    }

    /// Check both maps and, if neither shows a prior or in-flight request,
    /// reserve both keys as in-flight.
    pub async fn check_and_reserve(
        &self,
        correlation_id: &str,
        content_key: &str,
    ) -> DedupOutcome {
        let mut by_corr = self.by_correlation.lock().await;
        if let Some(entry) = by_corr.get(correlation_id) {
            if entry.recorded_at.elapsed() < CORRELATION_WINDOW {
                return match &entry.slot {
                    Slot::Completed(resp) => DedupOutcome::ReplayCached(resp.clone()),
                    Slot::InFlight => DedupOutcome::InFlightElsewhere,
                };
            }
        }

        let mut by_content = self.by_content.lock().await;
        if let Some(entry) = by_content.get(content_key) {
            if entry.recorded_at.elapsed() < ENTRY_TTL {
                return match &entry.slot {
                    Slot::Completed(resp) => DedupOutcome::ReplayCached(resp.clone()),
                    Slot::InFlight => DedupOutcome::InFlightElsewhere,
                };
            }
        }

        by_corr.insert(correlation_id.to_owned(), Entry { slot: Slot::InFlight, recorded_at: Instant::now() });
        by_content.insert(content_key.to_owned(), Entry { slot: Slot::InFlight, recorded_at: Instant::now() });
        DedupOutcome::Fresh
    }

    /// Record the final response for both keys so replays and in-flight
    /// content-hash matches can be served without re-invoking the handler.
    pub async fn complete(&self, correlation_id: &str, content_key: &str, response: ResponseEnvelope) {
        let now = Instant::now();
        self.by_correlation
            .lock()
            .await
            .insert(correlation_id.to_owned(), Entry { slot: Slot::Completed(response.clone()), recorded_at: now });
        self.by_content
            .lock()
            .await
            .insert(content_key.to_owned(), Entry { slot: Slot::Completed(response), recorded_at: now });
    }

    /// Drop entries older than the 1h TTL. Run every 30 min by the
    /// scheduler (spec section 4.2).
    pub async fn sweep(&self) {
        let mut by_corr = self.by_correlation.lock().await;
        by_corr.retain(|_, e| e.recorded_at.elapsed() < ENTRY_TTL);
        drop(by_corr);
        let mut by_content = self.by_content.lock().await;
        by_content.retain(|_, e| e.recorded_at.elapsed() < ENTRY_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_ignores_key_order() {
        let a = serde_json::json!({"name": "trip", "priority": "high"});
        let b = serde_json::json!({"priority": "high", "name": "trip"});
        assert_eq!(content_hash("POST", "trips/create", &a), content_hash("POST", "trips/create", &b));
    }

    #[test]
    fn content_hash_distinguishes_payloads() {
        let a = serde_json::json!({"name": "trip-a"});
        let b = serde_json::json!({"name": "trip-b"});
        assert_ne!(content_hash("POST", "trips/create", &a), content_hash("POST", "trips/create", &b));
    }

    #[tokio::test]
    async fn replay_after_completion_is_byte_identical() {
        let dedup = Deduplicator::new();
        let key = content_hash("POST", "trips/create", &serde_json::json!({"name": "t"}));
        assert!(matches!(dedup.check_and_reserve("c-1", &key).await, DedupOutcome::Fresh));

        let response = ResponseEnvelope::success("c-1", serde_json::json!({"id": "t-1"}));
        dedup.complete("c-1", &key, response.clone()).await;

        match dedup.check_and_reserve("c-1", &key).await {
            DedupOutcome::ReplayCached(replayed) => {
                assert_eq!(
                    serde_json::to_string(&replayed).unwrap(),
                    serde_json::to_string(&response).unwrap()
                );
            }
            _ => panic!("expected cached replay"),
        }
    }

    #[tokio::test]
    async fn concurrent_content_match_short_circuits() {
        let dedup = Deduplicator::new();
        let key = content_hash("POST", "trips/create", &serde_json::json!({"name": "t"}));
        assert!(matches!(dedup.check_and_reserve("c-1", &key).await, DedupOutcome::Fresh));
        // Different correlation id, same content hash, still in flight.
        assert!(matches!(
            dedup.check_and_reserve("c-2", &key).await,
            DedupOutcome::InFlightElsewhere
        ));
    }

    #[tokio::test]
    async fn sweep_drops_stale_entries() {
        let dedup = Deduplicator::new();
        let key = content_hash("POST", "trips/create", &serde_json::json!({"name": "t"}));
        dedup.check_and_reserve("c-1", &key).await;
        dedup.complete("c-1", &key, ResponseEnvelope::success("c-1", serde_json::json!({}))).await;
        {
            let mut by_corr = dedup.by_correlation.lock().await;
            for entry in by_corr.values_mut() {
                entry.recorded_at = Instant::now() - ENTRY_TTL - Duration::from_secs(1);
            }
        }
        dedup.sweep().await;
        assert!(dedup.by_correlation.lock().await.is_empty());
    }

    proptest::proptest! {
        /// Shuffling a flat object's keys never changes its content hash —
        /// the canonicalization step this invariant relies on is what gives
        /// retried requests with re-serialized (but equivalent) bodies the
        /// same dedup key.
        #[test]
        fn content_hash_is_invariant_under_key_permutation(
            mut pairs in proptest::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,8}"), 1..8)
        ) {
            pairs.sort();
            pairs.dedup_by(|a, b| a.0 == b.0);
            let forward: serde_json::Map<String, serde_json::Value> =
                pairs.iter().map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone()))).collect();
            let mut reversed_pairs = pairs.clone();
            reversed_pairs.reverse();
            let backward: serde_json::Map<String, serde_json::Value> =
                reversed_pairs.iter().map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone()))).collect();

            let a = content_hash("POST", "trips/create", &serde_json::Value::Object(forward));
            let b = content_hash("POST", "trips/create", &serde_json::Value::Object(backward));
            proptest::prop_assert_eq!(a, b);
        }
    }
}
