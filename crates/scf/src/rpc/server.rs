// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC server: wires [`EndpointTable`] dispatch to [`Deduplicator`] and
//! per-endpoint timeouts, and acks the inbound delivery only after a
//! response has been produced (spec section 4.2: "ack only after the
//! response has been sent, so a crash mid-handler redelivers").

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::broker::BrokerClient;
use crate::error::{ErrorKind, ScfError};
use crate::rpc::dedup::{content_hash, DedupOutcome};
use crate::rpc::endpoint::EndpointTable;
use crate::rpc::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::rpc::Deduplicator;

/// A registered endpoint handler: method, the residual path past the
/// matched prefix, the caller's context, and the request body, returning
/// the response payload or a typed error.
pub type HandlerFn = Arc<
    dyn Fn(
            String,
            String,
            crate::rpc::UserContext,
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ScfError>> + Send>>
        + Send
        + Sync,
>;

const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(25);

/// Consumes request deliveries from a queue, dispatches them through an
/// [`EndpointTable`], and publishes the response back on the broker.
pub struct RpcServer {
    broker: Arc<BrokerClient>,
    table: EndpointTable,
    dedup: Deduplicator,
    endpoint_timeout: Duration,
}

impl RpcServer {
    pub fn new(broker: Arc<BrokerClient>, table: EndpointTable) -> Self {
        Self { broker, table, dedup: Deduplicator::new(), endpoint_timeout: DEFAULT_ENDPOINT_TIMEOUT }
    }

    pub fn with_endpoint_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint_timeout = timeout;
        self
    }

    /// Handle one decoded request, returning the response envelope to
    /// publish. Dispatch failures (unknown endpoint, handler error, timeout)
    /// are turned into error envelopes rather than propagated, so a single
    /// bad request never drops the consumer task.
    pub async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let content_key = content_hash(&request.method, &request.endpoint, &request.data);

        match self.dedup.check_and_reserve(&request.correlation_id, &content_key).await {
            DedupOutcome::ReplayCached(response) => return response,
            DedupOutcome::InFlightElsewhere => {
                return ResponseEnvelope::error(
                    &request.correlation_id,
                    &ScfError::new(ErrorKind::Conflict, "request already in flight"),
                );
            }
            DedupOutcome::Fresh => {}
        }

        let response = self.dispatch(&request).await;
        self.dedup.complete(&request.correlation_id, &content_key, response.clone()).await;
        response
    }

    async fn dispatch(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        let Some((handler, matched)) = self.table.resolve(&request.endpoint) else {
            return ResponseEnvelope::error(
                &request.correlation_id,
                &ScfError::not_found("endpoint", &request.endpoint),
            );
        };

        let call = handler(request.method.clone(), matched.residual, request.user_context.clone(), request.data.clone());
        match tokio::time::timeout(self.endpoint_timeout, call).await {
            Ok(Ok(data)) => ResponseEnvelope::success(&request.correlation_id, data),
            Ok(Err(err)) => ResponseEnvelope::error(&request.correlation_id, &err),
            Err(_) => ResponseEnvelope::error(
                &request.correlation_id,
                &ScfError::new(ErrorKind::Timeout, format!("endpoint '{}' exceeded {:?}", matched.prefix, self.endpoint_timeout)),
            ),
        }
    }

    /// Run the consume loop against `queue`, publishing each response to
    /// `reply_exchange`/`reply_routing_key`, acking only once the response
    /// has been handed back to the broker.
    pub async fn serve(&self, queue: &str, reply_exchange: &str) -> Result<(), ScfError> {
        let mut consumer = self.broker.consume(queue, 10).await?;
        loop {
            let Some(delivery) = consumer.next().await else {
                warn!(queue, "rpc consumer stream ended");
                return Ok(());
            };

            let request: RequestEnvelope = match serde_json::from_slice(&delivery.payload) {
                Ok(req) => req,
                Err(e) => {
                    error!(error = %e, queue, "dropping undecodable rpc request");
                    continue;
                }
            };

            let reply_routing_key = format!("{}.response", request.correlation_id);
            let response = self.handle(request).await;
            let payload = match serde_json::to_vec(&response) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(error = %e, "failed to encode rpc response");
                    continue;
                }
            };
            if let Err(e) = self.broker.publish(reply_exchange, &reply_routing_key, &payload, true).await {
                error!(error = %e, "failed to publish rpc response");
            }
        }
    }

    pub fn periodic_dedup_sweep(self: &Arc<Self>) -> impl Future<Output = ()> + 'static {
        let this = Arc::clone(self);
        async move { this.dedup.sweep().await }
    }
}
