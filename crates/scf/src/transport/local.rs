// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process transport — simulates exchanges, queues, and bindings with
//! `tokio::sync::mpsc` channels so broker-level unit tests don't need a
//! live NATS server.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::{broker_error, unavailable, Consumer, Delivery, ExchangeKind, QueueArgs, Transport};
use crate::error::ScfError;

#[derive(Clone)]
struct Binding {
    queue: String,
    pattern: Vec<String>,
}

struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<Binding>,
}

struct LocalQueue {
    args: QueueArgs,
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
}

#[derive(Default)]
struct Inner {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, LocalQueue>,
    connected: bool,
}

/// Deterministic, non-networked transport for tests and local development.
pub struct LocalTransport {
    inner: Arc<Mutex<Inner>>,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())) }
    }
}

fn segment_matches(pattern: &[String], routing_key: &str) -> bool {
    let segments: Vec<&str> = routing_key.split('.').collect();
    if segments.len() != pattern.len() {
        return false;
    }
    pattern.iter().zip(segments.iter()).all(|(p, s)| p == "*" || p == s)
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self) -> Result<(), ScfError> {
        self.inner.lock().await.connected = true;
        Ok(())
    }

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        _durable: bool,
    ) -> Result<(), ScfError> {
        let mut inner = self.inner.lock().await;
        inner.exchanges.entry(name.to_owned()).or_insert_with(|| Exchange { kind, bindings: vec![] });
        Ok(())
    }

    async fn declare_queue(&self, name: &str, args: &QueueArgs) -> Result<(), ScfError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.queues.get(name) {
            if existing.args.compatible_with(args) {
                return Ok(());
            }
            return Err(ScfError::new(
                crate::error::ErrorKind::Conflict,
                format!("queue '{name}' already declared with incompatible arguments"),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.queues.insert(name.to_owned(), LocalQueue { args: args.clone(), sender: tx, receiver: Some(rx) });
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), ScfError> {
        let mut inner = self.inner.lock().await;
        if !inner.queues.contains_key(queue) {
            return Err(broker_error(format!("cannot bind unknown queue '{queue}'")));
        }
        let ex = inner
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| broker_error(format!("cannot bind to unknown exchange '{exchange}'")))?;
        ex.bindings.push(Binding {
            queue: queue.to_owned(),
            pattern: pattern.split('.').map(str::to_owned).collect(),
        });
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
        let inner = self.inner.lock().await;
        if !inner.connected {
            return Err(unavailable("transport not connected"));
        }
        let ex = inner
            .exchanges
            .get(exchange)
            .ok_or_else(|| broker_error(format!("publish to unknown exchange '{exchange}'")))?;

        let mut delivered = false;
        for binding in &ex.bindings {
            let matches = match ex.kind {
                ExchangeKind::Direct => binding.pattern.join(".") == routing_key,
                ExchangeKind::Topic => segment_matches(&binding.pattern, routing_key),
            };
            if !matches {
                continue;
            }
            if let Some(queue) = inner.queues.get(&binding.queue) {
                let delivery = Delivery {
                    routing_key: routing_key.to_owned(),
                    payload: payload.to_vec(),
                    headers: headers.clone(),
                };
                // An unbounded channel send only fails if the queue's
                // receiver has already been dropped; drop the delivery.
                let _ = queue.sender.send(delivery);
                delivered = true;
            }
        }
        if !delivered {
            tracing::debug!(exchange, routing_key, "publish matched no bound queue");
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, _prefetch: u16) -> Result<Box<dyn Consumer>, ScfError> {
        let mut inner = self.inner.lock().await;
        let q = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| broker_error(format!("consume on unknown queue '{queue}'")))?;
        let receiver = q
            .receiver
            .take()
            .ok_or_else(|| broker_error(format!("queue '{queue}' already has a consumer")))?;
        Ok(Box::new(LocalConsumer { receiver }))
    }

    async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }
}

struct LocalConsumer {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

#[async_trait]
impl Consumer for LocalConsumer {
    async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}
