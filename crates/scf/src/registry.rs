// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C6] Service Registry — in-memory endpoint directory with periodic
//! HTTP health checks.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ScfError;

const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);
const STALE_HEARTBEAT_THRESHOLD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub base_url: String,
    pub health_url: Option<String>,
}

struct Entry {
    endpoint: ServiceEndpoint,
    healthy: bool,
    last_heartbeat: Instant,
}

/// In-memory `name -> ServiceEndpoint` directory, kept fresh by a periodic
/// health check loop run from the background scheduler.
pub struct ServiceRegistry {
    http: reqwest::Client,
    entries: RwLock<HashMap<String, Entry>>,
    check_interval: Duration,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            entries: RwLock::new(HashMap::new()),
            check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn register(&self, endpoint: ServiceEndpoint) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            endpoint.name.clone(),
            Entry { endpoint, healthy: true, last_heartbeat: Instant::now() },
        );
    }

    pub fn deregister(&self, name: &str) {
        self.entries.write().unwrap_or_else(|p| p.into_inner()).remove(name);
    }

    /// Returns the endpoint only if it is currently considered healthy.
    pub fn discover(&self, name: &str) -> Result<ServiceEndpoint, ScfError> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        let entry = entries
            .get(name)
            .ok_or_else(|| ScfError::not_found("service", name))?;
        if entry.healthy {
            Ok(entry.endpoint.clone())
        } else {
            Err(ScfError::service_discovery(format!("service '{name}' is currently unhealthy")))
        }
    }

    /// Run one health-check pass over every registered endpoint: GET
    /// `health_url` when present (200 → healthy, refresh heartbeat;
    /// otherwise unhealthy); services with no `health_url` are marked
    /// unhealthy only once their heartbeat is stale beyond 30s.
    pub async fn check_all(&self) {
        let snapshot: Vec<(String, Option<String>)> = {
            let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
            entries.values().map(|e| (e.endpoint.name.clone(), e.endpoint.health_url.clone())).collect()
        };

        for (name, health_url) in snapshot {
            let healthy = match &health_url {
                Some(url) => self.probe(url).await,
                None => {
                    let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
                    entries
                        .get(&name)
                        .map(|e| e.last_heartbeat.elapsed() < STALE_HEARTBEAT_THRESHOLD)
                        .unwrap_or(false)
                }
            };

            let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
            if let Some(entry) = entries.get_mut(&name) {
                if healthy {
                    entry.last_heartbeat = Instant::now();
                } else {
                    warn!(service = %name, "health check failed, marking unhealthy");
                }
                entry.healthy = healthy;
            }
        }
    }

    async fn probe(&self, health_url: &str) -> bool {
        match self.http.get(health_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(health_url, error = %e, "health probe request failed");
                false
            }
        }
    }

    /// Refresh the heartbeat for a service that reports in directly
    /// (rather than being polled), without altering its health flag.
    pub fn heartbeat(&self, name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = entries.get_mut(name) {
            entry.last_heartbeat = Instant::now();
        }
    }
}
