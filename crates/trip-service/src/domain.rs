// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The trip domain's entities (spec section 3 / SPEC_FULL section 11).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInfo {
    pub distance_m: f64,
    pub duration_s: f64,
    pub coordinates: Vec<(f64, f64)>,
    #[serde(default)]
    pub bounds: Option<(GeoPoint, GeoPoint)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Scheduled,
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub origin: Place,
    pub destination: Place,
    #[serde(default)]
    pub waypoints: Vec<Place>,
    pub vehicle_id: Option<String>,
    pub driver_id: Option<String>,
    pub status: TripStatus,
    pub priority: Priority,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub route_info: Option<RouteInfo>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A Trip with a time window but no committed start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTrip {
    pub id: String,
    pub name: String,
    pub origin: Place,
    pub destination: Place,
    #[serde(default)]
    pub waypoints: Vec<Place>,
    pub priority: Priority,
    pub start_window: DateTime<Utc>,
    pub end_window: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartTrip {
    pub smart_id: String,
    pub scheduled_trip_id: String,
    pub optimized_start: DateTime<Utc>,
    pub optimized_end: DateTime<Utc>,
    pub vehicle_id: String,
    pub driver_id: String,
    pub route_info: RouteInfo,
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficSeverity {
    Light,
    Moderate,
    Heavy,
    Severe,
}

impl TrafficSeverity {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 1.3 {
            Self::Light
        } else if ratio < 1.5 {
            Self::Moderate
        } else if ratio < 2.0 {
            Self::Heavy
        } else {
            Self::Severe
        }
    }

    pub fn warrants_reroute(&self) -> bool {
        matches!(self, Self::Heavy | Self::Severe)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRecommendation {
    pub id: String,
    pub trip_id: String,
    pub vehicle_id: String,
    pub current_route: RouteInfo,
    pub recommended_route: RouteInfo,
    pub time_savings_s: f64,
    pub traffic_severity: TrafficSeverity,
    pub confidence: f64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleAssignment {
    pub trip_id: String,
    pub vehicle_id: String,
    pub driver_id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleLocation {
    pub vehicle_id: String,
    pub location: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationHistoryPoint {
    pub vehicle_id: String,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

/// A dispatcher-initiated live GPS watch on a vehicle, independent of any
/// trip's ping session. Starting a new one for a vehicle ends whichever one
/// was already active for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSession {
    pub id: String,
    pub vehicle_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingSession {
    pub trip_id: String,
    pub started_at: DateTime<Utc>,
    pub last_ping_at: DateTime<Utc>,
    pub next_ping_expected_at: DateTime<Utc>,
    pub is_active: bool,
    pub violations_count: u32,
    pub last_location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    MissedPing,
    Speeding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub trip_id: String,
    #[serde(rename = "type")]
    pub kind: ViolationType,
    pub details: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// `{recipients, type, title, message, data}` fanout input; `recipients`
/// may name concrete users or roles (spec section 15).
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    pub recipient_user_ids: Vec<String>,
    pub recipient_roles: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Metadata about a fleet vehicle used by the planner. `mass_kg` is parsed
/// when present and never read by any selection computation — reserved for
/// future energy-consumption modeling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub home_location: GeoPoint,
    #[serde(default)]
    pub mass_kg: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub completed_trips_this_year: u32,
    pub cancelled_trips_this_year: u32,
}

impl Driver {
    pub fn completion_rate(&self) -> f64 {
        let total = self.completed_trips_this_year + self.cancelled_trips_this_year;
        if total == 0 {
            0.0
        } else {
            self.completed_trips_this_year as f64 / total as f64
        }
    }
}
