// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C5] Token Cache & Auth Gate — TTL-cached principal verification and
//! scope-ordered permission checks.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::ScfError;

/// The total order spec section 7 defines over permission scopes:
/// `user < vehicle < fleet < organization < system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Vehicle,
    Fleet,
    Organization,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub action: String,
    pub resource: String,
    pub scope: Scope,
}

impl Permission {
    /// True if this held permission satisfies `action`/`resource` at or
    /// above `required_scope` — `*` matches any action/resource.
    fn satisfies(&self, action: &str, resource: &str, required_scope: Scope) -> bool {
        (self.action == "*" || self.action == action)
            && (self.resource == "*" || self.resource == resource)
            && self.scope >= required_scope
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: String,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn has_permission(&self, action: &str, resource: &str, required_scope: Scope) -> bool {
        self.is_admin() || self.permissions.iter().any(|p| p.satisfies(action, resource, required_scope))
    }

    pub fn require_permission(&self, action: &str, resource: &str, required_scope: Scope) -> Result<(), ScfError> {
        if self.has_permission(action, resource, required_scope) {
            Ok(())
        } else {
            Err(ScfError::authorization(format!(
                "principal '{}' lacks '{action}' on '{resource}' at scope '{required_scope:?}'",
                self.user_id
            )))
        }
    }
}

struct CacheEntry {
    principal: Principal,
    cached_at: Instant,
}

/// Calls out to the security service (behind a circuit breaker) to verify
/// bearer tokens, lazily expiring cached principals on read.
pub struct TokenCache {
    http: reqwest::Client,
    security_service_url: String,
    breaker: CircuitBreaker,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl TokenCache {
    pub fn new(security_service_url: impl Into<String>, ttl: Duration, breaker: CircuitBreaker) -> Self {
        Self {
            http: reqwest::Client::new(),
            security_service_url: security_service_url.into(),
            breaker,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Verify `token`, serving a cached principal when present and fresh.
    /// On miss, calls the security service's verify-token endpoint through
    /// the circuit breaker: 200 parses a principal, 401/403 map to
    /// `Authentication`/`Authorization`, and a network or breaker failure
    /// maps to `ServiceUnavailable`.
    pub async fn verify(&self, token: &str) -> Result<Principal, ScfError> {
        let key = hash_token(token);
        if let Some(principal) = self.cached(&key) {
            return Ok(principal);
        }

        let principal = self.verify_upstream(token).await?;
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).insert(
            key,
            CacheEntry { principal: principal.clone(), cached_at: Instant::now() },
        );
        Ok(principal)
    }

    fn cached(&self, key: &str) -> Option<Principal> {
        let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        let entry = cache.get(key)?;
        if entry.cached_at.elapsed() < self.ttl {
            Some(entry.principal.clone())
        } else {
            None
        }
    }

    async fn verify_upstream(&self, token: &str) -> Result<Principal, ScfError> {
        let url = format!("{}/verify-token", self.security_service_url);
        let http = self.http.clone();
        let token = token.to_owned();
        self.breaker
            .call(|| async move {
                let response = http
                    .post(&url)
                    .bearer_auth(&token)
                    .send()
                    .await
                    .map_err(|e| ScfError::service_unavailable(format!("security service unreachable: {e}")))?;

                match response.status().as_u16() {
                    200 => response
                        .json::<Principal>()
                        .await
                        .map_err(|e| ScfError::service_unavailable(format!("malformed verify-token response: {e}"))),
                    401 => Err(ScfError::authentication("token rejected by security service")),
                    403 => Err(ScfError::authorization("token lacks required claim")),
                    other => Err(ScfError::service_unavailable(format!("security service returned status {other}"))),
                }
            })
            .await
    }

    /// Drop cache entries older than the TTL. Run every 5 min by the
    /// scheduler (spec section 7).
    pub fn sweep(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Principal {
        Principal { user_id: "u-admin".into(), role: "admin".into(), permissions: vec![] }
    }

    fn dispatcher() -> Principal {
        Principal {
            user_id: "u-dispatch".into(),
            role: "dispatcher".into(),
            permissions: vec![Permission { action: "trips.create".into(), resource: "trip".into(), scope: Scope::Fleet }],
        }
    }

    #[test]
    fn admin_bypasses_permission_checks() {
        assert!(admin().has_permission("anything", "anything", Scope::System));
    }

    #[test]
    fn scope_hierarchy_is_monotonic() {
        assert!(Scope::System > Scope::Organization);
        assert!(Scope::Organization > Scope::Fleet);
        assert!(Scope::Fleet > Scope::Vehicle);
        assert!(Scope::Vehicle > Scope::User);
    }

    #[test]
    fn held_permission_satisfies_lower_or_equal_scope() {
        let p = dispatcher();
        assert!(p.has_permission("trips.create", "trip", Scope::Fleet));
        assert!(p.has_permission("trips.create", "trip", Scope::Vehicle));
        assert!(!p.has_permission("trips.create", "trip", Scope::Organization));
    }

    #[test]
    fn mismatched_action_or_resource_denies() {
        let p = dispatcher();
        assert!(!p.has_permission("trips.delete", "trip", Scope::Fleet));
        assert!(!p.has_permission("trips.create", "vehicle", Scope::Fleet));
    }

    #[test]
    fn require_permission_raises_authorization_on_denial() {
        let p = dispatcher();
        let err = p.require_permission("trips.delete", "trip", Scope::Fleet).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Authorization);
    }

    #[test]
    fn wildcard_action_and_resource_match_anything() {
        let p = Principal {
            user_id: "u".into(),
            role: "ops".into(),
            permissions: vec![Permission { action: "*".into(), resource: "*".into(), scope: Scope::Organization }],
        };
        assert!(p.has_permission("trips.delete", "trip", Scope::Fleet));
        assert!(!p.has_permission("trips.delete", "trip", Scope::System));
    }
}
