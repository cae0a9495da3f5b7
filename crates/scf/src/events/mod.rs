// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C3] Event Bus — topic exchange per producer, durable per-consumer
//! queue, retry with exponential backoff, dead-letter fallback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::broker::BrokerClient;
use crate::error::ScfError;
use crate::transport::{ExchangeKind, QueueArgs};

const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// A single event-bus subscription: the queue it owns, the patterns it's
/// bound to, and the handler invoked per delivery.
pub struct Subscription {
    pub queue: String,
    pub exchange: String,
    pub patterns: Vec<String>,
}

/// Config for one producer's topic exchange and its consumers' DLX.
#[derive(Clone)]
pub struct EventBusConfig {
    pub message_ttl: Duration,
    pub max_len: Option<u32>,
    pub retry_delay: Duration,
    pub max_retry_attempts: u32,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            message_ttl: DEFAULT_MESSAGE_TTL,
            max_len: None,
            retry_delay: Duration::from_secs(2),
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
        }
    }
}

/// Publishes domain events onto a producer's topic exchange and consumes
/// them with retry/DLQ semantics on the subscriber side.
pub struct EventBus {
    broker: Arc<BrokerClient>,
    config: EventBusConfig,
}

impl EventBus {
    pub fn new(broker: Arc<BrokerClient>, config: EventBusConfig) -> Self {
        Self { broker, config }
    }

    pub fn dlx_name(exchange: &str) -> String {
        format!("{exchange}.dlx")
    }

    pub fn dlq_name(queue: &str) -> String {
        format!("{queue}.dlq")
    }

    /// Declare this service's topic exchange, ready for publishes.
    pub async fn declare_producer(&self, exchange: &str) -> Result<(), ScfError> {
        self.broker.declare_exchange(exchange, ExchangeKind::Topic, true).await
    }

    /// Publish a serializable event under `routing_key` on `exchange`.
    pub async fn publish<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        event: &T,
    ) -> Result<(), ScfError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| ScfError::internal(format!("failed to encode event: {e}")))?;
        self.broker.publish(exchange, routing_key, &payload, true).await
    }

    /// Declare a durable queue bound to `patterns` on `exchange`, plus its
    /// DLX/DLQ pair, and return the subscription handle.
    pub async fn declare_consumer(
        &self,
        queue: &str,
        exchange: &str,
        patterns: &[&str],
    ) -> Result<Subscription, ScfError> {
        let dlx = Self::dlx_name(exchange);
        let dlq = Self::dlq_name(queue);
        self.broker.declare_exchange(&dlx, ExchangeKind::Direct, true).await?;
        self.broker
            .declare_queue(
                &dlq,
                &QueueArgs { durable: true, ttl: None, max_len: self.config.max_len, dlx: None },
            )
            .await?;
        self.broker.bind(&dlq, &dlx, &dlq).await?;

        self.broker
            .declare_queue(
                queue,
                &QueueArgs {
                    durable: true,
                    ttl: Some(self.config.message_ttl),
                    max_len: self.config.max_len,
                    dlx: Some(dlx.clone()),
                },
            )
            .await?;
        for pattern in patterns {
            self.broker.bind(queue, exchange, pattern).await?;
        }

        Ok(Subscription { queue: queue.to_owned(), exchange: exchange.to_owned(), patterns: patterns.iter().map(|s| s.to_string()).collect() })
    }

    /// Consume `subscription.queue`, invoking `handler` per delivery.
    /// Handler failures are retried with exponential backoff up to
    /// `max_retry_attempts`, then republished to the DLX with failure
    /// metadata headers. A DLQ publish failure is logged and the original
    /// message is still considered handled — the bus never blocks on it.
    pub async fn consume<F, Fut>(&self, subscription: &Subscription, handler: F) -> Result<(), ScfError>
    where
        F: Fn(crate::transport::Delivery) -> Fut,
        Fut: std::future::Future<Output = Result<(), ScfError>>,
    {
        let mut consumer = self.broker.consume(&subscription.queue, 10).await?;
        loop {
            let Some(delivery) = consumer.next().await else {
                warn!(queue = %subscription.queue, "event consumer stream ended");
                return Ok(());
            };

            if let Err(e) = handler(delivery.clone()).await {
                self.handle_failure(subscription, delivery, &e).await;
            }
        }
    }

    async fn handle_failure(&self, subscription: &Subscription, delivery: crate::transport::Delivery, error: &ScfError) {
        let retry_count = delivery.retry_count();
        if retry_count < self.config.max_retry_attempts {
            let delay = self.config.retry_delay * 2u32.pow(retry_count);
            warn!(
                queue = %subscription.queue,
                retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "event handler failed, scheduling retry"
            );
            tokio::time::sleep(delay).await;
            let mut headers = delivery.headers.clone();
            headers.insert("x-retry-count".to_owned(), (retry_count + 1).to_string());
            if let Err(e) = self
                .broker
                .publish_with_headers(&subscription.exchange, &delivery.routing_key, &delivery.payload, &headers, true)
                .await
            {
                error!(queue = %subscription.queue, error = %e, "failed to republish retry, dropping");
            }
            return;
        }

        self.send_to_dlq(subscription, delivery, error).await;
    }

    async fn send_to_dlq(&self, subscription: &Subscription, delivery: crate::transport::Delivery, error: &ScfError) {
        let dlx = Self::dlx_name(&subscription.exchange);
        let dlq = Self::dlq_name(&subscription.queue);
        let mut headers: HashMap<String, String> = delivery.headers.clone();
        headers.insert("x-failure-reason".to_owned(), error.message.clone());
        headers.insert("x-failed-timestamp".to_owned(), chrono::Utc::now().to_rfc3339());
        headers.insert("x-original-routing-key".to_owned(), delivery.routing_key.clone());

        match self.broker.publish_with_headers(&dlx, &dlq, &delivery.payload, &headers, true).await {
            Ok(()) => {
                info!(queue = %subscription.queue, "message exhausted retries, moved to dlq");
            }
            Err(e) => {
                // The bus must never block on DLQ failure; the original
                // delivery is still considered handled.
                error!(queue = %subscription.queue, error = %e, "failed to publish to dlq, message dropped");
            }
        }
    }
}
