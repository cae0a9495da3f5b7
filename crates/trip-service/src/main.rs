// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `trip-service` — the Smart Trip & Traffic-Reroute Engine binary: an RPC
//! server plus a handful of scheduled background passes, all riding on the
//! Service Communication Fabric.

use std::sync::Arc;

use clap::Parser;
use samfms_scf::broker::BrokerClient;
use samfms_scf::rpc::{EndpointTable, RpcServer};
use samfms_scf::scheduler::Scheduler;
use samfms_scf::transport::nats::{NatsAuth, NatsTransport};
use samfms_scf::transport::ExchangeKind;
use tracing::info;

use trip_service_core::config::TripServiceConfig;
use trip_service_core::domain::NotificationRequest;
use trip_service_core::handlers::TripServiceHandlers;
use trip_service_core::notifications::{NotificationFanout, RoleDirectory};
use trip_service_core::ping_monitor::PingMonitor;
use trip_service_core::planner::SmartTripPlanner;
use trip_service_core::providers::{FreeFlowTraffic, StraightLineRouter, UnknownSpeedLimits};
use trip_service_core::reroute::RerouteEngine;
use trip_service_core::store::TripStore;

/// No identity service wired up yet; role membership resolves to nobody
/// until that integration lands.
struct NoRoleDirectory;
#[async_trait::async_trait]
impl RoleDirectory for NoRoleDirectory {
    async fn users_with_role(&self, _role: &str) -> anyhow::Result<Vec<String>> {
        Ok(vec![])
    }
}

/// No fleet directory wired up yet; the planner sees an empty pool until
/// that integration lands, which surfaces as a clean `BusinessRule` error
/// rather than a silent wrong answer.
struct EmptyVehicleDirectory;
#[async_trait::async_trait]
impl trip_service_core::providers::VehicleDirectory for EmptyVehicleDirectory {
    async fn available_vehicles(&self, _s: chrono::DateTime<chrono::Utc>, _e: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<trip_service_core::domain::Vehicle>> {
        Ok(vec![])
    }
    async fn current_location(&self, _vehicle_id: &str) -> anyhow::Result<Option<trip_service_core::domain::GeoPoint>> {
        Ok(None)
    }
}

struct EmptyDriverDirectory;
#[async_trait::async_trait]
impl trip_service_core::providers::DriverDirectory for EmptyDriverDirectory {
    async fn available_drivers(&self, _s: chrono::DateTime<chrono::Utc>, _e: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<trip_service_core::domain::Driver>> {
        Ok(vec![])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TripServiceConfig::parse();
    config.scf.init_tracing();

    let transport = Arc::new(NatsTransport::new(&config.scf.broker_url, NatsAuth::default(), config.scf.broker_max_retries));
    let broker = Arc::new(BrokerClient::new(transport));
    broker.connect().await?;
    broker.declare_queue(&config.scf.requests_queue(), &Default::default()).await?;
    broker.declare_exchange("trip_service_events", ExchangeKind::Topic, true).await?;
    info!(service = %config.scf.service_name, "connected to broker");

    let store = Arc::new(TripStore::new());
    let routing = Arc::new(StraightLineRouter);
    let traffic = Arc::new(FreeFlowTraffic);
    let speed_limits = Arc::new(UnknownSpeedLimits);
    let vehicles = Arc::new(EmptyVehicleDirectory);
    let drivers = Arc::new(EmptyDriverDirectory);

    let planner = Arc::new(SmartTripPlanner::new(
        routing.clone(),
        traffic.clone(),
        vehicles.clone(),
        drivers,
        Arc::clone(&store),
    ));
    let pings = Arc::new(PingMonitor::new(Arc::clone(&store), speed_limits, config.ping_interval(), config.ping_grace()));
    let notifications = Arc::new(NotificationFanout::new(Arc::clone(&store), Arc::new(NoRoleDirectory)));
    let reroute = Arc::new(RerouteEngine::with_thresholds(
        Arc::clone(&store),
        routing,
        traffic,
        vehicles,
        Arc::clone(&notifications),
        config.minimum_time_savings(),
        config.minimum_time_savings_severe,
        config.minimum_time_savings_heavy,
    ));

    let handlers = Arc::new(TripServiceHandlers {
        store: Arc::clone(&store),
        planner,
        pings: Arc::clone(&pings),
        reroute: Arc::clone(&reroute),
        notifications: Arc::clone(&notifications),
    });

    let mut table = EndpointTable::new();
    handlers.register(&mut table);
    let rpc_server = Arc::new(RpcServer::new(Arc::clone(&broker), table).with_endpoint_timeout(config.scf.request_timeout()));

    let mut scheduler = Scheduler::new();

    let sweep_server = Arc::clone(&rpc_server);
    scheduler.register(
        "rpc-dedup-sweep",
        std::time::Duration::from_secs(30 * 60),
        None,
        Arc::new(move || {
            let server = Arc::clone(&sweep_server);
            Box::pin(async move { server.periodic_dedup_sweep().await })
        }),
    );

    let watchdog_pings = Arc::clone(&pings);
    let watchdog_notifications = Arc::clone(&notifications);
    scheduler.register(
        "ping-watchdog",
        config.ping_watchdog_interval(),
        Some(std::time::Duration::from_secs(2)),
        Arc::new(move || {
            let pings = Arc::clone(&watchdog_pings);
            let notifications = Arc::clone(&watchdog_notifications);
            Box::pin(async move {
                let missed = pings.watchdog_pass();
                if !missed.is_empty() {
                    tracing::warn!(trips = ?missed, "ping watchdog flagged missed check-ins");
                    for trip_id in missed {
                        notifications
                            .send(NotificationRequest {
                                recipient_user_ids: vec![],
                                recipient_roles: vec!["dispatcher".to_owned()],
                                kind: "missed_ping".to_owned(),
                                title: "Driver missed a check-in".to_owned(),
                                message: format!("trip '{trip_id}' missed its expected ping"),
                                data: serde_json::json!({"trip_id": trip_id}),
                            })
                            .await;
                    }
                }
            })
        }),
    );

    let reroute_engine = Arc::clone(&reroute);
    scheduler.register(
        "traffic-reroute",
        config.traffic_check_interval(),
        None,
        Arc::new(move || {
            let reroute = Arc::clone(&reroute_engine);
            Box::pin(async move {
                let filed = reroute.run_cycle().await;
                if filed > 0 {
                    tracing::info!(filed, "traffic re-evaluation filed recommendations");
                }
            })
        }),
    );

    let purge_store = Arc::clone(&store);
    let retention = config.location_history_retention();
    scheduler.register(
        "location-history-purge",
        std::time::Duration::from_secs(24 * 60 * 60),
        None,
        Arc::new(move || {
            let store = Arc::clone(&purge_store);
            Box::pin(async move {
                let purged = store.purge_location_history(chrono::Utc::now() - retention);
                if purged > 0 {
                    tracing::info!(purged, "purged stale location history");
                }
            })
        }),
    );

    let tracking_store = Arc::clone(&store);
    scheduler.register(
        "stale-tracking-session-closer",
        std::time::Duration::from_secs(24 * 60 * 60),
        None,
        Arc::new(move || {
            let store = Arc::clone(&tracking_store);
            Box::pin(async move {
                let closed = store.close_stale_tracking_sessions(chrono::Utc::now() - chrono::Duration::hours(24));
                if closed > 0 {
                    tracing::info!(closed, "closed stale tracking sessions");
                }
            })
        }),
    );

    let handles = scheduler.spawn_all();

    let reply_exchange = format!("{}_replies", config.scf.service_name);
    broker.declare_exchange(&reply_exchange, ExchangeKind::Topic, true).await?;
    let serve_result = rpc_server.serve(&config.scf.requests_queue(), &reply_exchange).await;

    scheduler.shutdown(handles).await;
    serve_result.map_err(Into::into)
}
