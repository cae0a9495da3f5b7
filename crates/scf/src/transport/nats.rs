// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS-backed [`Transport`] — maps the AMQP-shaped exchange + routing-key
//! model of spec section 4.1 onto NATS subjects (`<exchange>.<routing_key>`)
//! and queue-group subscriptions, following the broker-connection pattern
//! the rest of the fleet already uses (connect with auth options, publish
//! JSON, subscribe per subject).
//!
//! NATS core has no broker-side confirms or durable queue declarations; this
//! transport approximates the contract spec section 4.1 requires: a publish
//! is only considered confirmed once the client's outbound buffer has been
//! flushed to the server, and "queue declare" is tracked client-side so
//! configuration drift can still be detected and surfaced as
//! `QueueConfigConflict`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};

use super::{broker_error, unavailable, Consumer, Delivery, ExchangeKind, QueueArgs, Transport};
use crate::error::{ErrorKind, ScfError};

/// Base backoff delay for the connect retry loop (spec section 4.1).
const CONNECT_BACKOFF_BASE: Duration = Duration::from_secs(2);
const CONNECT_BACKOFF_FACTOR: u32 = 2;

/// Authentication options for connecting to the broker.
#[derive(Debug, Default, Clone)]
pub struct NatsAuth {
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

struct QueueRecord {
    args: QueueArgs,
    exchange_patterns: Vec<(String, String)>,
}

struct Inner {
    client: Option<async_nats::Client>,
    exchanges: HashMap<String, ExchangeKind>,
    queues: HashMap<String, QueueRecord>,
}

/// NATS-backed transport. Connect/reconnect is handled transparently by
/// `async-nats`'s own client; this wrapper adds the bounded retry loop spec
/// section 4.1 requires before first connect, and the exchange/queue/bind
/// bookkeeping NATS doesn't provide natively.
pub struct NatsTransport {
    url: String,
    auth: NatsAuth,
    max_retries: u32,
    publish_timeout: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>, auth: NatsAuth, max_retries: u32) -> Self {
        Self {
            url: url.into(),
            auth,
            max_retries,
            publish_timeout: Duration::from_secs(10),
            inner: Arc::new(Mutex::new(Inner {
                client: None,
                exchanges: HashMap::new(),
                queues: HashMap::new(),
            })),
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let base = CONNECT_BACKOFF_BASE.as_millis() as u64;
        let exp = base.saturating_mul(CONNECT_BACKOFF_FACTOR.pow(attempt.saturating_sub(1)) as u64);
        let jitter = rand::rng().random_range(0..=exp / 4 + 1);
        Duration::from_millis(exp + jitter)
    }

    async fn connect_options(&self) -> async_nats::ConnectOptions {
        let auth = &self.auth;
        if let Some(token) = auth.token.clone() {
            return async_nats::ConnectOptions::with_token(token);
        }
        if let Some(user) = auth.user.clone() {
            let pass = auth.password.clone().unwrap_or_default();
            return async_nats::ConnectOptions::with_user_and_password(user, pass);
        }
        async_nats::ConnectOptions::new()
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn connect(&self) -> Result<(), ScfError> {
        let mut last_err = None;
        for attempt in 1..=self.max_retries {
            let opts = self.connect_options().await;
            match opts.connect(&self.url).await {
                Ok(client) => {
                    self.inner.lock().await.client = Some(client);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, broker = %self.url, "broker connect failed: {e}");
                    last_err = Some(e.to_string());
                    if attempt < self.max_retries {
                        tokio::time::sleep(Self::backoff_delay(attempt)).await;
                    }
                }
            }
        }
        Err(unavailable(format!(
            "failed to connect to broker after {} attempts: {}",
            self.max_retries,
            last_err.unwrap_or_default()
        )))
    }

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        _durable: bool,
    ) -> Result<(), ScfError> {
        self.inner.lock().await.exchanges.insert(name.to_owned(), kind);
        Ok(())
    }

    async fn declare_queue(&self, name: &str, args: &QueueArgs) -> Result<(), ScfError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.queues.get(name) {
            if existing.args.compatible_with(args) {
                return Ok(());
            }
            return Err(ScfError::new(
                ErrorKind::Conflict,
                format!("queue '{name}' already declared with incompatible arguments"),
            ));
        }
        inner.queues.insert(
            name.to_owned(),
            QueueRecord { args: args.clone(), exchange_patterns: vec![] },
        );
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), ScfError> {
        let mut inner = self.inner.lock().await;
        if !inner.exchanges.contains_key(exchange) {
            return Err(broker_error(format!("cannot bind to unknown exchange '{exchange}'")));
        }
        let record = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| broker_error(format!("cannot bind unknown queue '{queue}'")))?;
        record.exchange_patterns.push((exchange.to_owned(), pattern.to_owned()));
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        headers: &HashMap<String, String>,
        _persistent: bool,
    ) -> Result<(), ScfError> {
        let client = {
            let inner = self.inner.lock().await;
            inner.client.clone().ok_or_else(|| unavailable("transport not connected"))?
        };
        let subject = format!("{exchange}.{routing_key}");
        let mut header_map = async_nats::HeaderMap::new();
        for (k, v) in headers {
            header_map.insert(k.as_str(), v.as_str());
        }

        let publish = client.publish_with_headers(subject.clone(), header_map, payload.to_vec().into());
        tokio::time::timeout(self.publish_timeout, publish)
            .await
            .map_err(|_| unavailable(format!("publish to '{subject}' timed out")))?
            .map_err(|e| unavailable(format!("publish to '{subject}' failed: {e}")))?;

        // A publish is only confirmed once flushed to the server connection.
        tokio::time::timeout(self.publish_timeout, client.flush())
            .await
            .map_err(|_| unavailable(format!("publish confirm to '{subject}' timed out")))?
            .map_err(|e| unavailable(format!("publish confirm to '{subject}' failed: {e}")))?;

        Ok(())
    }

    async fn consume(&self, queue: &str, _prefetch: u16) -> Result<Box<dyn Consumer>, ScfError> {
        let (client, patterns) = {
            let inner = self.inner.lock().await;
            let client = inner.client.clone().ok_or_else(|| unavailable("transport not connected"))?;
            let record = inner
                .queues
                .get(queue)
                .ok_or_else(|| broker_error(format!("consume on unknown queue '{queue}'")))?;
            (client, record.exchange_patterns.clone())
        };

        if patterns.is_empty() {
            return Err(broker_error(format!("queue '{queue}' has no bindings to consume")));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for (exchange, pattern) in patterns {
            let subject = format!("{exchange}.{pattern}");
            let mut sub = client
                .queue_subscribe(subject.clone(), queue.to_owned())
                .await
                .map_err(|e| broker_error(format!("subscribe to '{subject}' failed: {e}")))?;
            let tx = tx.clone();
            tokio::spawn(async move {
                use futures_util::StreamExt;
                while let Some(msg) = sub.next().await {
                    let mut headers = HashMap::new();
                    if let Some(h) = &msg.headers {
                        for (name, value) in h.iter() {
                            if let Some(v) = value.iter().next() {
                                headers.insert(name.to_string(), v.to_string());
                            }
                        }
                    }
                    let delivery = Delivery {
                        routing_key: msg.subject.to_string(),
                        payload: msg.payload.to_vec(),
                        headers,
                    };
                    if tx.send(delivery).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(Box::new(NatsConsumer { receiver: rx }))
    }

    async fn is_connected(&self) -> bool {
        self.inner.lock().await.client.is_some()
    }
}

struct NatsConsumer {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

#[async_trait]
impl Consumer for NatsConsumer {
    async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}
