// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C9] Trip Domain Store — in-memory, index-like collections standing in
//! for a document database (persistence engine choice is a Non-goal; the
//! store satisfies the same collection/index contract one would).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use samfms_scf::error::ScfError;

use crate::domain::{
    LocationHistoryPoint, Notification, PingSession, RouteRecommendation, ScheduledTrip, SmartTrip, Trip,
    TrackingSession, TripStatus, VehicleAssignment, VehicleLocation, Violation,
};

#[derive(Default)]
struct Inner {
    trips: HashMap<String, Trip>,
    trip_history: HashMap<String, Trip>,
    scheduled_trips: HashMap<String, ScheduledTrip>,
    smart_trips: HashMap<String, SmartTrip>,
    vehicle_assignments: Vec<VehicleAssignment>,
    vehicle_locations: HashMap<String, VehicleLocation>,
    location_history: Vec<LocationHistoryPoint>,
    tracking_sessions: HashMap<String, TrackingSession>,
    ping_sessions: HashMap<String, PingSession>,
    violations: Vec<Violation>,
    notifications: Vec<Notification>,
    recommendations: HashMap<String, RouteRecommendation>,
}

/// The in-process equivalent of the collections named in spec section 11,
/// behind one lock so cross-collection invariants (terminal move, assignment
/// exclusivity) are enforced in a single critical section.
pub struct TripStore {
    inner: RwLock<Inner>,
}

impl Default for TripStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TripStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    // -- trips --

    pub fn insert_trip(&self, trip: Trip) {
        self.write().trips.insert(trip.id.clone(), trip);
    }

    pub fn get_trip(&self, id: &str) -> Option<Trip> {
        self.read().trips.get(id).cloned()
    }

    /// Index `trips(vehicle_id)`.
    pub fn trips_by_vehicle(&self, vehicle_id: &str) -> Vec<Trip> {
        self.read().trips.values().filter(|t| t.vehicle_id.as_deref() == Some(vehicle_id)).cloned().collect()
    }

    /// Index `trips(driver_id)`.
    pub fn trips_by_driver(&self, driver_id: &str) -> Vec<Trip> {
        self.read().trips.values().filter(|t| t.driver_id.as_deref() == Some(driver_id)).cloned().collect()
    }

    /// Index `trips(status, scheduled_start)`, in ascending scheduled-start order.
    pub fn trips_by_status(&self, status: TripStatus) -> Vec<Trip> {
        let mut trips: Vec<Trip> = self.read().trips.values().filter(|t| t.status == status).cloned().collect();
        trips.sort_by_key(|t| t.scheduled_start);
        trips
    }

    pub fn update_trip_status(&self, id: &str, status: TripStatus) -> Result<Trip, ScfError> {
        let mut inner = self.write();
        let trip = inner.trips.get_mut(id).ok_or_else(|| ScfError::not_found("trip", id))?;
        trip.status = status;
        trip.updated_at = Utc::now();
        let snapshot = trip.clone();

        if matches!(status, TripStatus::Completed | TripStatus::Cancelled) {
            // Single critical section: move into history and remove from
            // the live collection together, so a reader never observes
            // both or neither (spec section 11).
            inner.trip_history.insert(snapshot.id.clone(), snapshot.clone());
            inner.trips.remove(id);
        }
        Ok(snapshot)
    }

    /// True iff `id` appears in exactly one of `trips`/`trip_history`.
    pub fn trip_appears_exactly_once(&self, id: &str) -> bool {
        let inner = self.read();
        inner.trips.contains_key(id) ^ inner.trip_history.contains_key(id)
    }

    pub fn get_history(&self, id: &str) -> Option<Trip> {
        self.read().trip_history.get(id).cloned()
    }

    // -- scheduled trips / smart trips --

    pub fn insert_scheduled_trip(&self, trip: ScheduledTrip) {
        self.write().scheduled_trips.insert(trip.id.clone(), trip);
    }

    pub fn get_scheduled_trip(&self, id: &str) -> Option<ScheduledTrip> {
        self.read().scheduled_trips.get(id).cloned()
    }

    pub fn insert_smart_trip(&self, smart_trip: SmartTrip) {
        self.write().smart_trips.insert(smart_trip.smart_id.clone(), smart_trip);
    }

    pub fn get_smart_trip(&self, smart_id: &str) -> Option<SmartTrip> {
        self.read().smart_trips.get(smart_id).cloned()
    }

    /// Activation consumes the proposal: turns it into a concrete Trip,
    /// deletes the SmartTrip, and removes its source ScheduledTrip.
    pub fn activate_smart_trip(&self, smart_id: &str, trip: Trip) -> Result<(), ScfError> {
        let mut inner = self.write();
        let smart_trip = inner.smart_trips.remove(smart_id).ok_or_else(|| ScfError::not_found("smart trip", smart_id))?;
        inner.scheduled_trips.remove(&smart_trip.scheduled_trip_id);
        inner.trips.insert(trip.id.clone(), trip);
        Ok(())
    }

    // -- vehicle assignments --

    /// Index `vehicle_assignments(vehicle_id, end=null)`. Rejects creation
    /// if the vehicle or driver already holds an active assignment (spec
    /// section 5: "at most one active assignment per vehicle or driver").
    pub fn assign_vehicle(&self, assignment: VehicleAssignment) -> Result<(), ScfError> {
        let mut inner = self.write();
        let conflict = inner.vehicle_assignments.iter().any(|a| {
            a.end.is_none() && (a.vehicle_id == assignment.vehicle_id || a.driver_id == assignment.driver_id)
        });
        if conflict {
            return Err(ScfError::new(
                samfms_scf::error::ErrorKind::Conflict,
                format!("vehicle '{}' or driver '{}' already has an active assignment", assignment.vehicle_id, assignment.driver_id),
            ));
        }
        inner.vehicle_assignments.push(assignment);
        Ok(())
    }

    pub fn end_assignment(&self, trip_id: &str, at: DateTime<Utc>) {
        let mut inner = self.write();
        if let Some(a) = inner.vehicle_assignments.iter_mut().find(|a| a.trip_id == trip_id && a.end.is_none()) {
            a.end = Some(at);
        }
    }

    pub fn active_assignments(&self) -> Vec<VehicleAssignment> {
        self.read().vehicle_assignments.iter().filter(|a| a.end.is_none()).cloned().collect()
    }

    // -- vehicle locations --

    pub fn upsert_vehicle_location(&self, location: VehicleLocation) {
        let mut inner = self.write();
        inner.location_history.push(LocationHistoryPoint {
            vehicle_id: location.vehicle_id.clone(),
            location: location.location,
            timestamp: location.recorded_at,
        });
        inner.vehicle_locations.insert(location.vehicle_id.clone(), location);
    }

    pub fn current_location(&self, vehicle_id: &str) -> Option<VehicleLocation> {
        self.read().vehicle_locations.get(vehicle_id).cloned()
    }

    /// Drop `location_history` entries older than `keep_duration` (the
    /// scheduler's 1-day-interval/90-day-retention purge task).
    pub fn purge_location_history(&self, older_than: DateTime<Utc>) -> usize {
        let mut inner = self.write();
        let before = inner.location_history.len();
        inner.location_history.retain(|p| p.timestamp >= older_than);
        before - inner.location_history.len()
    }

    // -- tracking sessions --

    /// Start a live tracking session for `vehicle_id`, ending whichever one
    /// was already active for it (spec section 11/section 4.9).
    pub fn start_tracking_session(&self, vehicle_id: &str, user_id: &str) -> TrackingSession {
        let mut inner = self.write();
        for session in inner.tracking_sessions.values_mut() {
            if session.vehicle_id == vehicle_id && session.is_active {
                session.is_active = false;
                session.ended_at = Some(Utc::now());
            }
        }
        let session = TrackingSession {
            id: crate::domain::new_id(),
            vehicle_id: vehicle_id.to_owned(),
            user_id: user_id.to_owned(),
            started_at: Utc::now(),
            ended_at: None,
            is_active: true,
        };
        inner.tracking_sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub fn end_tracking_session(&self, id: &str) -> Result<(), ScfError> {
        let mut inner = self.write();
        let session = inner.tracking_sessions.get_mut(id).ok_or_else(|| ScfError::not_found("tracking session", id))?;
        session.is_active = false;
        session.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Active sessions, optionally narrowed to one dispatcher's own.
    pub fn active_tracking_sessions(&self, user_id: Option<&str>) -> Vec<TrackingSession> {
        self.read()
            .tracking_sessions
            .values()
            .filter(|s| s.is_active && user_id.map(|u| s.user_id == u).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Close sessions that have been active since before `cutoff` (the
    /// scheduler's 24h stale-tracking-session closer). Returns the count closed.
    pub fn close_stale_tracking_sessions(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.write();
        let now = Utc::now();
        let mut closed = 0;
        for session in inner.tracking_sessions.values_mut() {
            if session.is_active && session.started_at < cutoff {
                session.is_active = false;
                session.ended_at = Some(now);
                closed += 1;
            }
        }
        closed
    }

    // -- ping sessions / violations --

    /// Index `ping_sessions(trip_id) unique where is_active=true`.
    pub fn start_ping_session(&self, session: PingSession) {
        self.write().ping_sessions.insert(session.trip_id.clone(), session);
    }

    pub fn get_ping_session(&self, trip_id: &str) -> Option<PingSession> {
        self.read().ping_sessions.get(trip_id).cloned()
    }

    pub fn update_ping_session<F: FnOnce(&mut PingSession)>(&self, trip_id: &str, f: F) -> Result<(), ScfError> {
        let mut inner = self.write();
        let session = inner.ping_sessions.get_mut(trip_id).ok_or_else(|| ScfError::not_found("ping session", trip_id))?;
        f(session);
        Ok(())
    }

    pub fn active_ping_sessions(&self) -> Vec<PingSession> {
        self.read().ping_sessions.values().filter(|s| s.is_active).cloned().collect()
    }

    pub fn end_ping_session(&self, trip_id: &str) {
        let mut inner = self.write();
        if let Some(s) = inner.ping_sessions.get_mut(trip_id) {
            s.is_active = false;
        }
    }

    pub fn record_violation(&self, violation: Violation) {
        self.write().violations.push(violation);
    }

    pub fn violations_for_trip(&self, trip_id: &str) -> Vec<Violation> {
        self.read().violations.iter().filter(|v| v.trip_id == trip_id).cloned().collect()
    }

    // -- notifications --

    pub fn insert_notification(&self, notification: Notification) {
        self.write().notifications.push(notification);
    }

    pub fn unread_for_user(&self, user_id: &str) -> Vec<Notification> {
        self.read()
            .notifications
            .iter()
            .filter(|n| n.recipient_user_id == user_id && n.read_at.is_none())
            .cloned()
            .collect()
    }

    pub fn mark_read(&self, notification_id: &str) {
        let mut inner = self.write();
        if let Some(n) = inner.notifications.iter_mut().find(|n| n.id == notification_id) {
            n.read_at = Some(Utc::now());
        }
    }

    // -- route recommendations --

    pub fn store_recommendation(&self, recommendation: RouteRecommendation) {
        self.write().recommendations.insert(recommendation.id.clone(), recommendation);
    }

    pub fn get_recommendation(&self, id: &str) -> Option<RouteRecommendation> {
        self.read().recommendations.get(id).cloned()
    }

    /// Index `recommendations(trip_id)` — the dispatcher UI's lookup path
    /// from a trip to its pending recommendation, if any.
    pub fn recommendation_for_trip(&self, trip_id: &str) -> Option<RouteRecommendation> {
        self.read().recommendations.values().find(|r| r.trip_id == trip_id).cloned()
    }

    /// `accept`: replace the trip's `route_info` with the recommended
    /// route and delete the recommendation.
    pub fn accept_recommendation(&self, id: &str) -> Result<Trip, ScfError> {
        let mut inner = self.write();
        let recommendation = inner.recommendations.remove(id).ok_or_else(|| ScfError::not_found("recommendation", id))?;
        let trip = inner
            .trips
            .get_mut(&recommendation.trip_id)
            .ok_or_else(|| ScfError::not_found("trip", &recommendation.trip_id))?;
        trip.route_info = Some(recommendation.recommended_route);
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    /// `reject`: delete the recommendation, leaving the trip unchanged.
    pub fn reject_recommendation(&self, id: &str) -> Result<(), ScfError> {
        self.write().recommendations.remove(id).ok_or_else(|| ScfError::not_found("recommendation", id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GeoPoint, Place, Priority};

    fn place(lat: f64, lng: f64) -> Place {
        Place { name: "p".into(), location: GeoPoint { lat, lng }, address: None }
    }

    fn trip(id: &str, status: TripStatus) -> Trip {
        let now = Utc::now();
        Trip {
            id: id.into(),
            name: "t".into(),
            description: None,
            origin: place(-25.0, 28.0),
            destination: place(-26.0, 28.0),
            waypoints: vec![],
            vehicle_id: None,
            driver_id: None,
            status,
            priority: Priority::Normal,
            scheduled_start: now,
            scheduled_end: now,
            actual_start: None,
            actual_end: None,
            route_info: None,
            created_by: "u1".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn terminal_transition_moves_to_history_exactly_once() {
        let store = TripStore::new();
        store.insert_trip(trip("t1", TripStatus::InProgress));
        assert!(store.trip_appears_exactly_once("t1"));

        store.update_trip_status("t1", TripStatus::Completed).unwrap();
        assert!(store.trip_appears_exactly_once("t1"));
        assert!(store.get_trip("t1").is_none());
        assert!(store.get_history("t1").is_some());
    }

    #[test]
    fn non_terminal_transition_stays_live() {
        let store = TripStore::new();
        store.insert_trip(trip("t1", TripStatus::Scheduled));
        store.update_trip_status("t1", TripStatus::InProgress).unwrap();
        assert!(store.get_trip("t1").is_some());
        assert!(store.get_history("t1").is_none());
    }

    #[test]
    fn assignment_exclusivity_rejects_double_booking() {
        let store = TripStore::new();
        let now = Utc::now();
        store
            .assign_vehicle(VehicleAssignment { trip_id: "t1".into(), vehicle_id: "v1".into(), driver_id: "d1".into(), start: now, end: None })
            .unwrap();
        let err = store
            .assign_vehicle(VehicleAssignment { trip_id: "t2".into(), vehicle_id: "v1".into(), driver_id: "d2".into(), start: now, end: None })
            .unwrap_err();
        assert_eq!(err.kind, samfms_scf::error::ErrorKind::Conflict);
    }

    #[test]
    fn ending_an_assignment_frees_the_vehicle() {
        let store = TripStore::new();
        let now = Utc::now();
        store
            .assign_vehicle(VehicleAssignment { trip_id: "t1".into(), vehicle_id: "v1".into(), driver_id: "d1".into(), start: now, end: None })
            .unwrap();
        store.end_assignment("t1", now);
        store
            .assign_vehicle(VehicleAssignment { trip_id: "t2".into(), vehicle_id: "v1".into(), driver_id: "d2".into(), start: now, end: None })
            .unwrap();
        assert_eq!(store.active_assignments().len(), 1);
    }

    #[test]
    fn starting_a_tracking_session_ends_the_vehicles_prior_one() {
        let store = TripStore::new();
        store.start_tracking_session("v1", "u1");
        let second = store.start_tracking_session("v1", "u2");
        assert_eq!(store.active_tracking_sessions(None).len(), 1);
        assert_eq!(store.active_tracking_sessions(None)[0].id, second.id);
    }

    #[test]
    fn active_tracking_sessions_filters_by_user() {
        let store = TripStore::new();
        store.start_tracking_session("v1", "u1");
        store.start_tracking_session("v2", "u2");
        assert_eq!(store.active_tracking_sessions(Some("u1")).len(), 1);
        assert_eq!(store.active_tracking_sessions(Some("u1"))[0].vehicle_id, "v1");
    }

    #[test]
    fn stale_tracking_sessions_are_closed_past_the_threshold() {
        let store = TripStore::new();
        let session = store.start_tracking_session("v1", "u1");
        store.close_stale_tracking_sessions(Utc::now() + chrono::Duration::hours(1));
        assert!(store.active_tracking_sessions(None).is_empty());
        let err = store.end_tracking_session(&session.id);
        assert!(err.is_ok());
    }
}
