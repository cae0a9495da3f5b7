// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Abstract collaborators the planner and reroute engine depend on: route
//! geometry, live traffic, speed limits, and the vehicle/driver directory
//! (spec section 9's design note on resolving cyclic references via ids
//! plus on-demand lookups into neighboring services — here modeled as
//! trait-abstracted collaborators since their CRUD surface is out of scope).

use async_trait::async_trait;

use crate::domain::{Driver, GeoPoint, RouteInfo, Vehicle};

/// Mean Earth radius in kilometers (spec section 12's fixed constant).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn route(&self, origin: GeoPoint, destination: GeoPoint, waypoints: &[GeoPoint]) -> anyhow::Result<RouteInfo>;

    /// Up to 3 native alternative routes, distinct from the primary route.
    async fn alternatives(&self, origin: GeoPoint, destination: GeoPoint) -> anyhow::Result<Vec<RouteInfo>>;
}

#[async_trait]
pub trait TrafficProvider: Send + Sync {
    /// Traffic-adjusted duration, in seconds, for traveling `route` departing
    /// at `departure_offset_s` seconds from now.
    async fn adjusted_duration_s(&self, route: &RouteInfo, departure_offset_s: i64) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait SpeedLimitProvider: Send + Sync {
    /// Speed limit in km/h for the segment nearest `location`. Implementors
    /// return `None` when the segment is unknown; callers default to 50.
    async fn speed_limit_kmh(&self, location: GeoPoint) -> anyhow::Result<Option<f64>>;
}

#[async_trait]
pub trait VehicleDirectory: Send + Sync {
    async fn available_vehicles(&self, window_start: chrono::DateTime<chrono::Utc>, window_end: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<Vehicle>>;
    async fn current_location(&self, vehicle_id: &str) -> anyhow::Result<Option<GeoPoint>>;
}

#[async_trait]
pub trait DriverDirectory: Send + Sync {
    async fn available_drivers(&self, window_start: chrono::DateTime<chrono::Utc>, window_end: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<Driver>>;
}

/// Straight-line route construction with no real-world geometry — a
/// deterministic stand-in satisfying the [`RoutingProvider`] contract for
/// environments with no live routing backend wired up yet.
pub struct StraightLineRouter;

#[async_trait]
impl RoutingProvider for StraightLineRouter {
    async fn route(&self, origin: GeoPoint, destination: GeoPoint, waypoints: &[GeoPoint]) -> anyhow::Result<RouteInfo> {
        let mut coordinates = vec![(origin.lat, origin.lng)];
        coordinates.extend(waypoints.iter().map(|w| (w.lat, w.lng)));
        coordinates.push((destination.lat, destination.lng));

        let mut distance_km = 0.0;
        for pair in coordinates.windows(2) {
            distance_km += haversine_km(
                GeoPoint { lat: pair[0].0, lng: pair[0].1 },
                GeoPoint { lat: pair[1].0, lng: pair[1].1 },
            );
        }
        let distance_m = distance_km * 1000.0;
        // Assume an average 50 km/h free-flow speed absent better data.
        let duration_s = distance_km / 50.0 * 3600.0;
        Ok(RouteInfo { distance_m, duration_s, coordinates, bounds: None })
    }

    async fn alternatives(&self, origin: GeoPoint, destination: GeoPoint) -> anyhow::Result<Vec<RouteInfo>> {
        Ok(vec![self.route(origin, destination, &[]).await?])
    }
}

/// Traffic provider with no live feed: durations pass through unchanged.
pub struct FreeFlowTraffic;

#[async_trait]
impl TrafficProvider for FreeFlowTraffic {
    async fn adjusted_duration_s(&self, route: &RouteInfo, _departure_offset_s: i64) -> anyhow::Result<f64> {
        Ok(route.duration_s)
    }
}

/// Speed-limit provider with no live feed: always unknown, callers apply
/// the 50 km/h default.
pub struct UnknownSpeedLimits;

#[async_trait]
impl SpeedLimitProvider for UnknownSpeedLimits {
    async fn speed_limit_kmh(&self, _location: GeoPoint) -> anyhow::Result<Option<f64>> {
        Ok(None)
    }
}
