// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C12] Traffic Reroute Engine — periodic traffic re-evaluation of
//! in-progress trips, alternative-route generation, and similarity
//! filtering (spec section 14).

use std::sync::Arc;

use chrono::Utc;
use samfms_scf::error::ScfError;
use tracing::{info, warn};

use crate::domain::{GeoPoint, NotificationRequest, RouteInfo, RouteRecommendation, TrafficSeverity, Trip, TripStatus};
use crate::domain::new_id;
use crate::notifications::NotificationFanout;
use crate::providers::{haversine_km, RoutingProvider, TrafficProvider, VehicleDirectory};
use crate::store::TripStore;

/// Minimum great-circle distance for a landmark detour to be worth trying.
const LANDMARK_DETOUR_MIN_KM: f64 = 100.0;
const LANDMARK_DETOUR_RATIO_RANGE: (f64, f64) = (1.10, 1.80);
/// 20 evenly spaced samples along each candidate for the similarity filter.
const SIMILARITY_SAMPLES: usize = 20;
const STANDARD_SIMILARITY_THRESHOLD: f64 = 0.70;
const WAYPOINT_SIMILARITY_THRESHOLD: f64 = 0.85;
const MAX_ALTERNATIVES: usize = 5;

/// Default base time savings (spec section 14's `MINIMUM_TIME_SAVINGS`), in
/// seconds, before the per-severity fraction is applied.
const DEFAULT_MINIMUM_TIME_SAVINGS_S: f64 = 600.0;

pub struct RerouteEngine {
    store: Arc<TripStore>,
    routing: Arc<dyn RoutingProvider>,
    traffic: Arc<dyn TrafficProvider>,
    vehicles: Arc<dyn VehicleDirectory>,
    notifications: Arc<NotificationFanout>,
    minimum_time_savings_s: f64,
    minimum_savings_severe: f64,
    minimum_savings_heavy: f64,
}

impl RerouteEngine {
    pub fn new(
        store: Arc<TripStore>,
        routing: Arc<dyn RoutingProvider>,
        traffic: Arc<dyn TrafficProvider>,
        vehicles: Arc<dyn VehicleDirectory>,
        notifications: Arc<NotificationFanout>,
    ) -> Self {
        Self::with_thresholds(store, routing, traffic, vehicles, notifications, DEFAULT_MINIMUM_TIME_SAVINGS_S, 0.30, 0.50)
    }

    /// Like [`RerouteEngine::new`] but with the base savings and relaxed
    /// per-severity fractions taken from configuration instead of the
    /// spec's defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn with_thresholds(
        store: Arc<TripStore>,
        routing: Arc<dyn RoutingProvider>,
        traffic: Arc<dyn TrafficProvider>,
        vehicles: Arc<dyn VehicleDirectory>,
        notifications: Arc<NotificationFanout>,
        minimum_time_savings_s: f64,
        minimum_savings_severe: f64,
        minimum_savings_heavy: f64,
    ) -> Self {
        Self { store, routing, traffic, vehicles, notifications, minimum_time_savings_s, minimum_savings_severe, minimum_savings_heavy }
    }

    /// One scheduler tick (default every 300s): evaluate every in-progress
    /// trip, generate and file a [`RouteRecommendation`] when warranted.
    /// A single trip's provider failure is logged and skipped — the cycle
    /// always runs to completion.
    pub async fn run_cycle(&self) -> usize {
        let mut filed = 0;
        for trip in self.store.trips_by_status(TripStatus::InProgress) {
            match self.evaluate_trip(&trip).await {
                Ok(Some(_)) => filed += 1,
                Ok(None) => {}
                Err(e) => warn!(trip_id = %trip.id, error = %e, "traffic re-evaluation failed for trip"),
            }
        }
        filed
    }

    async fn evaluate_trip(&self, trip: &Trip) -> Result<Option<RouteRecommendation>, ScfError> {
        let Some(vehicle_id) = trip.vehicle_id.clone() else { return Ok(None) };
        let Some(current_route) = trip.route_info.clone() else { return Ok(None) };

        let position = self
            .vehicles
            .current_location(&vehicle_id)
            .await
            .map_err(|e| ScfError::upstream(format!("vehicle directory failed: {e}")))?
            .unwrap_or(trip.origin.location);

        let baseline_duration = self
            .traffic
            .adjusted_duration_s(&current_route, 0)
            .await
            .map_err(|e| ScfError::upstream(format!("traffic provider failed: {e}")))?;
        let free_flow_duration = current_route.duration_s.max(1.0);
        let ratio = baseline_duration / free_flow_duration;
        let severity = TrafficSeverity::from_ratio(ratio);

        if !severity.warrants_reroute() {
            return Ok(None);
        }

        let candidates = self.generate_alternatives(position, trip.destination.location, &current_route).await;
        let mut best: Option<(RouteInfo, f64, f64)> = None;

        for candidate in candidates {
            if !self.is_sufficiently_different(&current_route, &candidate) {
                continue;
            }
            let candidate_duration = match self.traffic.adjusted_duration_s(&candidate, 0).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(trip_id = %trip.id, error = %e, "skipping candidate with failed traffic probe");
                    continue;
                }
            };
            let savings = baseline_duration - candidate_duration;
            let minimum_savings = self.minimum_time_savings(severity);
            if savings < minimum_savings {
                continue;
            }
            if best.as_ref().map(|(_, s, _)| savings > *s).unwrap_or(true) {
                best = Some((candidate, savings, candidate_duration));
            }
        }

        let Some((recommended_route, savings, _)) = best else { return Ok(None) };
        let confidence = (0.60 + savings / 1800.0).min(0.95);

        let recommendation = RouteRecommendation {
            id: new_id(),
            trip_id: trip.id.clone(),
            vehicle_id,
            current_route,
            recommended_route,
            time_savings_s: savings,
            traffic_severity: severity,
            confidence,
            reason: format!("{severity:?} traffic detected; alternative saves {:.0}s", savings),
            created_at: Utc::now(),
        };
        self.store.store_recommendation(recommendation.clone());
        info!(trip_id = %trip.id, savings_s = savings, "filed route recommendation");

        let mut recipient_user_ids = Vec::new();
        if let Some(driver_id) = &trip.driver_id {
            recipient_user_ids.push(driver_id.clone());
        }
        self.notifications
            .send(NotificationRequest {
                recipient_user_ids,
                recipient_roles: vec!["manager".to_owned()],
                kind: "route_recommendation".to_owned(),
                title: "New route recommendation".to_owned(),
                message: format!("{severity:?} traffic on trip '{}'; alternative saves {:.0}s", trip.id, savings),
                data: serde_json::json!({"trip_id": trip.id, "recommendation_id": recommendation.id}),
            })
            .await;

        Ok(Some(recommendation))
    }

    /// Up to [`MAX_ALTERNATIVES`] candidates: native alternatives first (up
    /// to 3), then waypoint-perturbed detours, then major-landmark detours
    /// when the trip is long-haul enough to make one worthwhile.
    async fn generate_alternatives(&self, origin: GeoPoint, destination: GeoPoint, current: &RouteInfo) -> Vec<RouteInfo> {
        let mut candidates = Vec::new();

        if let Ok(native) = self.routing.alternatives(origin, destination).await {
            candidates.extend(native.into_iter().take(3));
        }

        if candidates.len() < MAX_ALTERNATIVES {
            if let Some(perturbed) = self.waypoint_perturbed(origin, destination).await {
                candidates.push(perturbed);
            }
        }

        let great_circle = haversine_km(origin, destination);
        if candidates.len() < MAX_ALTERNATIVES && great_circle > LANDMARK_DETOUR_MIN_KM {
            if let Some(landmark) = self.landmark_detour(origin, destination, current).await {
                candidates.push(landmark);
            }
        }

        candidates.truncate(MAX_ALTERNATIVES);
        candidates
    }

    async fn waypoint_perturbed(&self, origin: GeoPoint, destination: GeoPoint) -> Option<RouteInfo> {
        let midpoint = GeoPoint { lat: (origin.lat + destination.lat) / 2.0, lng: (origin.lng + destination.lng) / 2.0 };
        // Nudge the midpoint off the direct line to force a geometrically
        // distinct path through the same routing provider.
        let detour_point = GeoPoint { lat: midpoint.lat + 0.05, lng: midpoint.lng + 0.05 };
        self.routing.route(origin, destination, std::slice::from_ref(&detour_point)).await.ok()
    }

    async fn landmark_detour(&self, origin: GeoPoint, destination: GeoPoint, current: &RouteInfo) -> Option<RouteInfo> {
        let midpoint = GeoPoint { lat: (origin.lat + destination.lat) / 2.0, lng: (origin.lng + destination.lng) / 2.0 };
        let landmark = GeoPoint { lat: midpoint.lat + 0.5, lng: midpoint.lng + 0.5 };
        let candidate = self.routing.route(origin, destination, std::slice::from_ref(&landmark)).await.ok()?;
        let ratio = candidate.distance_m / current.distance_m.max(1.0);
        if ratio < LANDMARK_DETOUR_RATIO_RANGE.0 || ratio > LANDMARK_DETOUR_RATIO_RANGE.1 {
            return None;
        }
        Some(candidate)
    }

    /// Sample both routes at [`SIMILARITY_SAMPLES`] evenly spaced fractional
    /// positions and compare via average point-to-point Haversine distance
    /// relative to the current route's length — a cheap Fréchet-distance
    /// stand-in. Rejects candidates over the threshold for their kind.
    fn is_sufficiently_different(&self, current: &RouteInfo, candidate: &RouteInfo) -> bool {
        let similarity = route_similarity(current, candidate);
        let threshold = if candidate.coordinates.len() > current.coordinates.len() + 1 {
            WAYPOINT_SIMILARITY_THRESHOLD
        } else {
            STANDARD_SIMILARITY_THRESHOLD
        };
        similarity <= threshold
    }

    pub fn accept(&self, recommendation_id: &str) -> Result<Trip, ScfError> {
        self.store.accept_recommendation(recommendation_id)
    }

    pub fn reject(&self, recommendation_id: &str) -> Result<(), ScfError> {
        self.store.reject_recommendation(recommendation_id)
    }

    /// Relaxed savings threshold: a configurable fraction of the base
    /// `MINIMUM_TIME_SAVINGS` for severe traffic, a larger fraction for
    /// heavy — not a fraction of the baseline duration itself.
    fn minimum_time_savings(&self, severity: TrafficSeverity) -> f64 {
        match severity {
            TrafficSeverity::Severe => self.minimum_time_savings_s * self.minimum_savings_severe,
            _ => self.minimum_time_savings_s * self.minimum_savings_heavy,
        }
    }
}

fn sample_point(route: &RouteInfo, fraction: f64) -> GeoPoint {
    let n = route.coordinates.len();
    if n == 0 {
        return GeoPoint { lat: 0.0, lng: 0.0 };
    }
    let idx = ((n - 1) as f64 * fraction).round() as usize;
    let (lat, lng) = route.coordinates[idx.min(n - 1)];
    GeoPoint { lat, lng }
}

fn route_similarity(a: &RouteInfo, b: &RouteInfo) -> f64 {
    let reference_length_km = (a.distance_m / 1000.0).max(0.01);
    let mut total_deviation = 0.0;
    for i in 0..SIMILARITY_SAMPLES {
        let fraction = i as f64 / (SIMILARITY_SAMPLES - 1) as f64;
        let pa = sample_point(a, fraction);
        let pb = sample_point(b, fraction);
        total_deviation += haversine_km(pa, pb);
    }
    let average_deviation = total_deviation / SIMILARITY_SAMPLES as f64;
    // Similarity is 1.0 when the sampled paths coincide, falling toward 0
    // as the average deviation approaches the reference route's own length.
    (1.0 - (average_deviation / reference_length_km)).clamp(0.0, 1.0)
}
