// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the end-to-end trip-service scenario tests: a full
//! in-process stack (store, planner, ping monitor, reroute engine,
//! notification fanout) wired together the way `main.rs` wires the real
//! binary, but against deterministic test doubles instead of a live
//! broker/routing backend.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use trip_service_core::domain::{Driver, GeoPoint, Vehicle};
use trip_service_core::notifications::{NotificationFanout, RoleDirectory};
use trip_service_core::ping_monitor::PingMonitor;
use trip_service_core::planner::SmartTripPlanner;
use trip_service_core::providers::{DriverDirectory, RoutingProvider, SpeedLimitProvider, TrafficProvider, VehicleDirectory};
use trip_service_core::reroute::RerouteEngine;
use trip_service_core::store::TripStore;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. `reqwest` (pulled
/// in by `samfms_scf::auth`) builds against `rustls-no-provider`, so
/// anything that might construct a client needs this done first. Safe to
/// call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub struct Stack {
    pub store: Arc<TripStore>,
    pub planner: Arc<SmartTripPlanner>,
    pub pings: Arc<PingMonitor>,
    pub reroute: Arc<RerouteEngine>,
    pub notifications: Arc<NotificationFanout>,
}

/// A fleet of fixed vehicles at fixed home locations, always available.
pub struct FixedFleet(pub Vec<Vehicle>);

#[async_trait]
impl VehicleDirectory for FixedFleet {
    async fn available_vehicles(&self, _s: DateTime<Utc>, _e: DateTime<Utc>) -> anyhow::Result<Vec<Vehicle>> {
        Ok(self.0.clone())
    }
    async fn current_location(&self, vehicle_id: &str) -> anyhow::Result<Option<GeoPoint>> {
        Ok(self.0.iter().find(|v| v.id == vehicle_id).map(|v| v.home_location))
    }
}

pub struct FixedCrew(pub Vec<Driver>);

#[async_trait]
impl DriverDirectory for FixedCrew {
    async fn available_drivers(&self, _s: DateTime<Utc>, _e: DateTime<Utc>) -> anyhow::Result<Vec<Driver>> {
        Ok(self.0.clone())
    }
}

/// Routes as the straight-line distance through any waypoints given.
pub struct StraightRoutes;

#[async_trait]
impl RoutingProvider for StraightRoutes {
    async fn route(&self, origin: GeoPoint, destination: GeoPoint, waypoints: &[GeoPoint]) -> anyhow::Result<trip_service_core::domain::RouteInfo> {
        let mut coordinates = vec![(origin.lat, origin.lng)];
        coordinates.extend(waypoints.iter().map(|w| (w.lat, w.lng)));
        coordinates.push((destination.lat, destination.lng));
        let distance_km: f64 = coordinates
            .windows(2)
            .map(|w| trip_service_core::providers::haversine_km(GeoPoint { lat: w[0].0, lng: w[0].1 }, GeoPoint { lat: w[1].0, lng: w[1].1 }))
            .sum();
        Ok(trip_service_core::domain::RouteInfo { distance_m: distance_km * 1000.0, duration_s: distance_km / 50.0 * 3600.0, coordinates, bounds: None })
    }

    async fn alternatives(&self, origin: GeoPoint, destination: GeoPoint) -> anyhow::Result<Vec<trip_service_core::domain::RouteInfo>> {
        // A detour through a point offset from the midpoint, geometrically
        // distinct from the direct line.
        let midpoint = GeoPoint { lat: (origin.lat + destination.lat) / 2.0 + 0.08, lng: (origin.lng + destination.lng) / 2.0 + 0.08 };
        Ok(vec![self.route(origin, destination, &[midpoint]).await?])
    }
}

/// Multiplies free-flow duration by a configurable factor — the knob the
/// scenario tests use to simulate "heavy traffic on the current route,
/// clear on the alternative" or "this departure hour is congested".
pub struct ScriptedTraffic {
    pub multiplier: Arc<dyn Fn(&trip_service_core::domain::RouteInfo, i64) -> f64 + Send + Sync>,
}

#[async_trait]
impl TrafficProvider for ScriptedTraffic {
    async fn adjusted_duration_s(&self, route: &trip_service_core::domain::RouteInfo, departure_offset_s: i64) -> anyhow::Result<f64> {
        Ok(route.duration_s * (self.multiplier)(route, departure_offset_s))
    }
}

pub struct FixedSpeedLimit(pub f64);

#[async_trait]
impl SpeedLimitProvider for FixedSpeedLimit {
    async fn speed_limit_kmh(&self, _location: GeoPoint) -> anyhow::Result<Option<f64>> {
        Ok(Some(self.0))
    }
}

pub struct DispatcherRole;

#[async_trait]
impl RoleDirectory for DispatcherRole {
    async fn users_with_role(&self, role: &str) -> anyhow::Result<Vec<String>> {
        match role {
            "dispatcher" => Ok(vec!["dispatch-1".into()]),
            _ => Ok(vec![]),
        }
    }
}

pub fn build_stack(
    vehicles: Vec<Vehicle>,
    drivers: Vec<Driver>,
    traffic_multiplier: Arc<dyn Fn(&trip_service_core::domain::RouteInfo, i64) -> f64 + Send + Sync>,
) -> Stack {
    ensure_crypto();
    let store = Arc::new(TripStore::new());
    let routing: Arc<dyn RoutingProvider> = Arc::new(StraightRoutes);
    let traffic: Arc<dyn TrafficProvider> = Arc::new(ScriptedTraffic { multiplier: traffic_multiplier });
    let vehicle_directory: Arc<dyn VehicleDirectory> = Arc::new(FixedFleet(vehicles));
    let driver_directory: Arc<dyn DriverDirectory> = Arc::new(FixedCrew(drivers));

    let planner = Arc::new(SmartTripPlanner::new(
        Arc::clone(&routing),
        Arc::clone(&traffic),
        Arc::clone(&vehicle_directory),
        driver_directory,
        Arc::clone(&store),
    ));
    let pings = Arc::new(PingMonitor::new(Arc::clone(&store), Arc::new(FixedSpeedLimit(60.0)), ChronoDuration::seconds(30), ChronoDuration::seconds(30)));
    let notifications = Arc::new(NotificationFanout::new(Arc::clone(&store), Arc::new(DispatcherRole)));
    let reroute = Arc::new(RerouteEngine::new(Arc::clone(&store), routing, traffic, vehicle_directory, Arc::clone(&notifications)));

    Stack { store, planner, pings, reroute, notifications }
}
