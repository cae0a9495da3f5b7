// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C11] Driver-Ping & Speed Monitor — phone ping ingestion, speed
//! violation detection, and the missed-ping watchdog.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use samfms_scf::error::ScfError;
use serde::Serialize;

use crate::domain::{GeoPoint, PingSession, TripStatus, Violation, ViolationType};
use crate::providers::{haversine_km, SpeedLimitProvider};
use crate::store::TripStore;

const DEFAULT_SPEED_LIMIT_KMH: f64 = 50.0;

#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    pub ping_received_at: DateTime<Utc>,
    pub next_ping_expected_at: DateTime<Utc>,
    pub session_active: bool,
    pub violations_count: u32,
    pub speed_limit: f64,
    pub current_speed: f64,
    pub is_speeding: bool,
    pub speed_over_limit: f64,
}

pub struct PingMonitor {
    store: Arc<TripStore>,
    speed_limits: Arc<dyn SpeedLimitProvider>,
    ping_interval: ChronoDuration,
    grace: ChronoDuration,
}

impl PingMonitor {
    pub fn new(store: Arc<TripStore>, speed_limits: Arc<dyn SpeedLimitProvider>, ping_interval: ChronoDuration, grace: ChronoDuration) -> Self {
        Self { store, speed_limits, ping_interval, grace }
    }

    /// Create the [`PingSession`] when a trip transitions to `in_progress`.
    pub fn start_session(&self, trip_id: &str) {
        let now = Utc::now();
        self.store.start_ping_session(PingSession {
            trip_id: trip_id.to_owned(),
            started_at: now,
            last_ping_at: now,
            next_ping_expected_at: now + self.ping_interval,
            is_active: true,
            violations_count: 0,
            last_location: None,
        });
    }

    pub fn end_session(&self, trip_id: &str) {
        self.store.end_ping_session(trip_id);
    }

    /// Handle an inbound `ping(trip_id, location, timestamp)` (spec
    /// section 13). Validates the trip is `in_progress`, updates the
    /// session's expectations, and appends a speeding violation when the
    /// computed speed exceeds the segment's limit.
    pub async fn ping(&self, trip_id: &str, location: GeoPoint, timestamp: DateTime<Utc>, provided_speed_kmh: Option<f64>) -> Result<PingResponse, ScfError> {
        let trip = self.store.get_trip(trip_id).ok_or_else(|| ScfError::not_found("trip", trip_id))?;
        if trip.status != TripStatus::InProgress {
            return Err(ScfError::business_rule(format!("trip '{trip_id}' is not in_progress")));
        }

        let session = self.store.get_ping_session(trip_id).ok_or_else(|| ScfError::not_found("ping session", trip_id))?;

        let current_speed = match provided_speed_kmh {
            Some(speed) => speed,
            None => match session.last_location {
                Some(previous) => {
                    let dt_hours = (timestamp - session.last_ping_at).num_milliseconds() as f64 / 3_600_000.0;
                    if dt_hours <= 0.0 {
                        0.0
                    } else {
                        haversine_km(previous, location) / dt_hours
                    }
                }
                None => 0.0,
            },
        };

        let speed_limit = self
            .speed_limits
            .speed_limit_kmh(location)
            .await
            .map_err(|e| ScfError::upstream(format!("speed limit provider failed: {e}")))?
            .unwrap_or(DEFAULT_SPEED_LIMIT_KMH);

        let is_speeding = current_speed > speed_limit;
        let speed_over_limit = if is_speeding { current_speed - speed_limit } else { 0.0 };

        let next_expected = timestamp + self.ping_interval;
        self.store.update_ping_session(trip_id, |s| {
            s.last_ping_at = timestamp;
            s.next_ping_expected_at = next_expected;
            s.last_location = Some(location);
            if is_speeding {
                s.violations_count += 1;
            }
        })?;

        if is_speeding {
            self.store.record_violation(Violation {
                trip_id: trip_id.to_owned(),
                kind: ViolationType::Speeding,
                details: format!("{current_speed:.1} km/h over {speed_limit:.1} km/h limit"),
                at: timestamp,
            });
        }

        let violations_count = self.store.get_ping_session(trip_id).map(|s| s.violations_count).unwrap_or(0);

        Ok(PingResponse {
            ping_received_at: timestamp,
            next_ping_expected_at: next_expected,
            session_active: true,
            violations_count,
            speed_limit,
            current_speed,
            is_speeding,
            speed_over_limit,
        })
    }

    /// Watchdog pass (run every 30s by the scheduler): for every active
    /// session past `next_ping_expected_at + grace`, append a missed-ping
    /// violation. Returns the trip ids that missed a ping this pass, so
    /// the caller can fan out a dispatcher notification.
    pub fn watchdog_pass(&self) -> Vec<String> {
        let now = Utc::now();
        let mut missed = Vec::new();
        for session in self.store.active_ping_sessions() {
            if now > session.next_ping_expected_at + self.grace {
                self.store.record_violation(Violation {
                    trip_id: session.trip_id.clone(),
                    kind: ViolationType::MissedPing,
                    details: format!("no ping received by {now}"),
                    at: now,
                });
                // Push the expectation forward by one more interval so a
                // continuously silent driver accrues exactly one
                // violation per miss window, not once per watchdog tick.
                let _ = self.store.update_ping_session(&session.trip_id, |s| {
                    s.next_ping_expected_at = now + self.ping_interval;
                    s.violations_count += 1;
                });
                missed.push(session.trip_id);
            }
        }
        missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Place, Priority, Trip};
    use async_trait::async_trait;

    struct FixedLimit(f64);
    #[async_trait]
    impl SpeedLimitProvider for FixedLimit {
        async fn speed_limit_kmh(&self, _location: GeoPoint) -> anyhow::Result<Option<f64>> {
            Ok(Some(self.0))
        }
    }

    fn in_progress_trip(id: &str) -> Trip {
        let now = Utc::now();
        Trip {
            id: id.into(),
            name: "t".into(),
            description: None,
            origin: Place { name: "o".into(), location: GeoPoint { lat: 0.0, lng: 0.0 }, address: None },
            destination: Place { name: "d".into(), location: GeoPoint { lat: 0.0, lng: 0.0 }, address: None },
            waypoints: vec![],
            vehicle_id: Some("v1".into()),
            driver_id: Some("d1".into()),
            status: TripStatus::InProgress,
            priority: Priority::Normal,
            scheduled_start: now,
            scheduled_end: now,
            actual_start: Some(now),
            actual_end: None,
            route_info: None,
            created_by: "u".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn monitor(store: Arc<TripStore>, limit: f64) -> PingMonitor {
        PingMonitor::new(store, Arc::new(FixedLimit(limit)), ChronoDuration::seconds(30), ChronoDuration::seconds(30))
    }

    #[tokio::test]
    async fn ping_on_unknown_trip_is_not_found() {
        let store = Arc::new(TripStore::new());
        let mon = monitor(Arc::clone(&store), 50.0);
        let err = mon.ping("ghost", GeoPoint { lat: 0.0, lng: 0.0 }, Utc::now(), None).await.unwrap_err();
        assert_eq!(err.kind, samfms_scf::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn ping_above_speed_limit_records_violation() {
        let store = Arc::new(TripStore::new());
        store.insert_trip(in_progress_trip("t1"));
        let mon = monitor(Arc::clone(&store), 50.0);
        mon.start_session("t1");

        let response = mon.ping("t1", GeoPoint { lat: 0.0, lng: 0.0 }, Utc::now(), Some(80.0)).await.unwrap();
        assert!(response.is_speeding);
        assert_eq!(response.speed_over_limit, 30.0);
        assert_eq!(store.violations_for_trip("t1").len(), 1);
    }

    #[tokio::test]
    async fn ping_on_paused_trip_is_rejected() {
        let store = Arc::new(TripStore::new());
        let mut trip = in_progress_trip("t1");
        trip.status = TripStatus::Paused;
        store.insert_trip(trip);
        let mon = monitor(Arc::clone(&store), 50.0);
        let err = mon.ping("t1", GeoPoint { lat: 0.0, lng: 0.0 }, Utc::now(), Some(40.0)).await.unwrap_err();
        assert_eq!(err.kind, samfms_scf::error::ErrorKind::BusinessRule);
    }

    #[tokio::test]
    async fn watchdog_flags_exactly_one_violation_per_miss_window() {
        let store = Arc::new(TripStore::new());
        store.insert_trip(in_progress_trip("t1"));
        let mon = monitor(Arc::clone(&store), 50.0);
        mon.start_session("t1");
        // Force the session's expectation into the past.
        store
            .update_ping_session("t1", |s| {
                s.next_ping_expected_at = Utc::now() - ChronoDuration::seconds(61);
            })
            .unwrap();

        let missed = mon.watchdog_pass();
        assert_eq!(missed, vec!["t1".to_string()]);
        assert_eq!(store.violations_for_trip("t1").len(), 1);

        // Immediately re-running the watchdog must not double-count: the
        // expectation was already pushed forward.
        let missed_again = mon.watchdog_pass();
        assert!(missed_again.is_empty());
        assert_eq!(store.violations_for_trip("t1").len(), 1);
    }
}
