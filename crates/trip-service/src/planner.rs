// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C10] Smart Trip Planner — time-window sampling, routing + traffic
//! probe, vehicle/driver selection (spec section 12, algorithm restated
//! verbatim from spec.md section 4.10).

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::seq::IndexedRandom;
use samfms_scf::error::ScfError;

use crate::domain::{new_id, Driver, GeoPoint, Place, Priority, ScheduledTrip, SmartTrip, Vehicle};
use crate::providers::{haversine_km, DriverDirectory, RoutingProvider, TrafficProvider, VehicleDirectory};
use crate::store::TripStore;

pub struct SmartTripPlanner {
    routing: Arc<dyn RoutingProvider>,
    traffic: Arc<dyn TrafficProvider>,
    vehicles: Arc<dyn VehicleDirectory>,
    drivers: Arc<dyn DriverDirectory>,
    store: Arc<TripStore>,
}

struct CandidateResult {
    departure: DateTime<Utc>,
    route: crate::domain::RouteInfo,
    traffic_duration_s: f64,
}

impl SmartTripPlanner {
    pub fn new(
        routing: Arc<dyn RoutingProvider>,
        traffic: Arc<dyn TrafficProvider>,
        vehicles: Arc<dyn VehicleDirectory>,
        drivers: Arc<dyn DriverDirectory>,
        store: Arc<TripStore>,
    ) -> Self {
        Self { routing, traffic, vehicles, drivers, store }
    }

    /// Run the full algorithm (steps 1-6 of spec section 12) and persist
    /// the resulting [`SmartTrip`].
    pub async fn plan(&self, scheduled: &ScheduledTrip) -> Result<SmartTrip, ScfError> {
        let candidate = self.best_departure_candidate(scheduled).await?;
        let vehicle = self.select_vehicle(scheduled).await?;
        let (driver, driver_reasoning) = self.select_driver(scheduled).await?;

        let mut reasoning = vec![format!(
            "departure {} minimizes travel time ({:.1} min with traffic)",
            candidate.departure.format("%H:%M"),
            candidate.traffic_duration_s / 60.0
        )];
        reasoning.push(driver_reasoning);
        reasoning.push(format!(
            "vehicle '{}' is the closest available to the origin",
            vehicle.id
        ));

        let optimized_end = candidate.departure + ChronoDuration::seconds(candidate.traffic_duration_s.round() as i64);
        let smart_trip = SmartTrip {
            smart_id: new_id(),
            scheduled_trip_id: scheduled.id.clone(),
            optimized_start: candidate.departure,
            optimized_end,
            vehicle_id: vehicle.id,
            driver_id: driver.id,
            route_info: candidate.route,
            reasoning,
        };
        self.store.insert_smart_trip(smart_trip.clone());
        Ok(smart_trip)
    }

    /// Step 1-2: sample `k = min(5, floor(window/1h))` evenly spaced
    /// departure candidates and pick the one minimizing traffic-adjusted
    /// total duration, tie-broken by earliest candidate.
    async fn best_departure_candidate(&self, scheduled: &ScheduledTrip) -> Result<CandidateResult, ScfError> {
        let window = scheduled.end_window - scheduled.start_window;
        let hours = (window.num_seconds() as f64 / 3600.0).floor() as i64;
        // Spec allows k=0 for sub-hour windows; sample at least the window start.
        let k = hours.clamp(1, 5) as usize;

        let step = if k > 1 { window / (k as i32 - 1).max(1) } else { ChronoDuration::zero() };
        let waypoints: Vec<GeoPoint> = scheduled.waypoints.iter().map(|p| p.location).collect();

        let mut best: Option<CandidateResult> = None;
        for i in 0..k {
            let departure = scheduled.start_window + step * i as i32;
            let route = self
                .routing
                .route(scheduled.origin.location, scheduled.destination.location, &waypoints)
                .await
                .map_err(|e| ScfError::upstream(format!("routing provider failed: {e}")))?;
            let offset_s = (departure - Utc::now()).num_seconds();
            let traffic_duration_s = self
                .traffic
                .adjusted_duration_s(&route, offset_s)
                .await
                .map_err(|e| ScfError::upstream(format!("traffic provider failed: {e}")))?;

            let is_better = match &best {
                None => true,
                Some(current) => traffic_duration_s < current.traffic_duration_s,
            };
            if is_better {
                best = Some(CandidateResult { departure, route, traffic_duration_s });
            }
        }

        best.ok_or_else(|| ScfError::business_rule("no departure candidates could be sampled"))
    }

    /// Step 3: vehicles available throughout the window, minimizing
    /// Haversine distance to the origin, ties broken lexicographically.
    async fn select_vehicle(&self, scheduled: &ScheduledTrip) -> Result<Vehicle, ScfError> {
        let available = self
            .vehicles
            .available_vehicles(scheduled.start_window, scheduled.end_window)
            .await
            .map_err(|e| ScfError::upstream(format!("vehicle directory failed: {e}")))?;

        if available.is_empty() {
            return Err(ScfError::business_rule("no vehicle available for the requested window"));
        }

        let mut scored = Vec::with_capacity(available.len());
        for vehicle in available {
            let location = self
                .vehicles
                .current_location(&vehicle.id)
                .await
                .map_err(|e| ScfError::upstream(format!("vehicle directory failed: {e}")))?
                .unwrap_or(vehicle.home_location);
            let distance = haversine_km(location, scheduled.origin.location);
            scored.push((distance, vehicle));
        }
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.1.id.cmp(&b.1.id)));
        scored
            .into_iter()
            .next()
            .map(|(_, vehicle)| vehicle)
            .ok_or_else(|| ScfError::business_rule("no vehicle available for the requested window"))
    }

    /// Step 4: priority-aware driver selection. High/urgent priority ranks
    /// by yearly completion rate and picks uniformly among the top 5;
    /// otherwise picks uniformly among all available drivers.
    async fn select_driver(&self, scheduled: &ScheduledTrip) -> Result<(Driver, String), ScfError> {
        let mut available = self
            .drivers
            .available_drivers(scheduled.start_window, scheduled.end_window)
            .await
            .map_err(|e| ScfError::upstream(format!("driver directory failed: {e}")))?;

        if available.is_empty() {
            return Err(ScfError::business_rule("NoDriverAvailable"));
        }

        let pool: Vec<Driver> = if matches!(scheduled.priority, Priority::High | Priority::Urgent) {
            available.sort_by(|a, b| b.completion_rate().partial_cmp(&a.completion_rate()).unwrap_or(std::cmp::Ordering::Equal));
            available.into_iter().take(5).collect()
        } else {
            available
        };

        let mut rng = rand::rng();
        let chosen = pool
            .choose(&mut rng)
            .cloned()
            .ok_or_else(|| ScfError::business_rule("NoDriverAvailable"))?;
        let reasoning = if matches!(scheduled.priority, Priority::High | Priority::Urgent) {
            format!("driver '{}' ranks highly by completion rate ({:.0}%)", chosen.id, chosen.completion_rate() * 100.0)
        } else {
            format!("driver '{}' selected from available pool", chosen.id)
        };
        Ok((chosen, reasoning))
    }
}
