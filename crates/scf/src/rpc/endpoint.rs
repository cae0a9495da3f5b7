// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Endpoint routing — a precomputed longest-prefix match tree built at
//! startup, per spec section 9's design note ("avoid runtime string surgery
//! per-call by precomputing the match tree at startup").

use std::collections::HashMap;

use crate::rpc::server::HandlerFn;

/// A matched endpoint: the handler to invoke, plus whatever path remained
/// after the matched prefix so the handler can select sub-actions.
#[derive(Clone)]
pub struct Endpoint {
    pub prefix: String,
    pub residual: String,
}

/// A registry of `prefix -> handler`, matched longest-prefix-first.
///
/// Built once at startup; lookups are a linear scan over prefixes sorted by
/// descending length, which is fast enough for the handful of endpoints any
/// one service owns and keeps the match order explicit and auditable.
pub struct EndpointTable {
    handlers: HashMap<String, HandlerFn>,
    prefixes_by_length: Vec<String>,
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointTable {
    pub fn new() -> Self {
        Self { handlers: HashMap::new(), prefixes_by_length: Vec::new() }
    }

    pub fn register(&mut self, prefix: &str, handler: HandlerFn) {
        let prefix = prefix.trim_matches('/').to_owned();
        self.prefixes_by_length.push(prefix.clone());
        self.prefixes_by_length.sort_by_key(|p| std::cmp::Reverse(p.len()));
        self.handlers.insert(prefix, handler);
    }

    /// Resolve `endpoint` to its handler and residual sub-path, matching
    /// the longest registered prefix whose segments are a prefix of
    /// `endpoint`'s segments.
    pub fn resolve(&self, endpoint: &str) -> Option<(&HandlerFn, Endpoint)> {
        let endpoint = endpoint.trim_matches('/');
        let segments: Vec<&str> = endpoint.split('/').filter(|s| !s.is_empty()).collect();

        for prefix in &self.prefixes_by_length {
            let prefix_segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
            if prefix_segments.len() > segments.len() {
                continue;
            }
            if segments[..prefix_segments.len()] == prefix_segments[..] {
                let residual = segments[prefix_segments.len()..].join("/");
                let handler = self.handlers.get(prefix)?;
                return Some((handler, Endpoint { prefix: prefix.clone(), residual }));
            }
        }
        None
    }
}
