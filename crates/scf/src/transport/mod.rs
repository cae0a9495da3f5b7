// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker-agnostic transport seam underneath [`crate::broker::BrokerClient`].
//!
//! Every AMQP-shaped operation in spec section 4.1 — declare exchange,
//! declare queue, bind, publish with confirms, consume — is expressed here
//! as a trait so the reconnect/backoff/confirm-mode machinery in
//! `broker::BrokerClient` never depends on a specific wire protocol. Two
//! implementations exist: [`nats::NatsTransport`], which maps exchange +
//! routing key onto NATS subjects (the teacher's own broker dependency), and
//! [`local::LocalTransport`], an in-process transport used by tests that
//! don't want a live broker.

pub mod local;
pub mod nats;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ScfError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    Topic,
    Direct,
}

#[derive(Debug, Clone, Default)]
pub struct QueueArgs {
    pub durable: bool,
    pub ttl: Option<std::time::Duration>,
    pub max_len: Option<u32>,
    pub dlx: Option<String>,
}

impl QueueArgs {
    pub fn durable() -> Self {
        Self { durable: true, ..Default::default() }
    }

    /// True if `other`'s arguments describe the same effective queue
    /// configuration — used by the idempotent-declare check in
    /// [`crate::broker::BrokerClient::declare_queue`].
    pub fn compatible_with(&self, other: &QueueArgs) -> bool {
        self.durable == other.durable && self.ttl == other.ttl && self.max_len == other.max_len
    }
}

/// A message delivered to a consumer, carrying the headers spec section 6
/// names (`x-retry-count` etc.) alongside the raw payload.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: std::collections::HashMap<String, String>,
}

impl Delivery {
    pub fn retry_count(&self) -> u32 {
        self.headers.get("x-retry-count").and_then(|v| v.parse().ok()).unwrap_or(0)
    }
}

/// A declared, bound queue a consumer can pull deliveries from.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn next(&mut self) -> Option<Delivery>;
}

/// The broker-agnostic operations [`crate::broker::BrokerClient`] composes
/// into the contract in spec section 4.1.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), ScfError>;

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), ScfError>;

    /// Declare a queue. Implementations MUST attempt a passive declare
    /// first and only fall back to an active declare when the queue does
    /// not yet exist (spec section 9's resolved Open Question), returning
    /// `ScfError { kind: Conflict, .. }` when a live queue's arguments
    /// differ from `args`.
    async fn declare_queue(&self, name: &str, args: &QueueArgs) -> Result<(), ScfError>;

    async fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), ScfError>;

    /// Publish with confirms. Returns `ServiceUnavailable` if the broker
    /// nacks or confirms aren't available.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        headers: &std::collections::HashMap<String, String>,
        persistent: bool,
    ) -> Result<(), ScfError>;

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Box<dyn Consumer>, ScfError>;

    /// Whether the underlying connection believes itself connected.
    async fn is_connected(&self) -> bool;
}

pub(crate) fn unavailable(message: impl Into<String>) -> ScfError {
    ScfError::new(ErrorKind::ServiceUnavailable, message)
}

pub(crate) fn broker_error(message: impl Into<String>) -> ScfError {
    ScfError::new(ErrorKind::Broker, message)
}
