// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the domain operations onto [`EndpointTable`] prefixes so the
//! [`RpcServer`](samfms_scf::rpc::RpcServer) can dispatch to them.

use std::sync::Arc;

use samfms_scf::error::ScfError;
use samfms_scf::rpc::{EndpointTable, UserContext};
use serde_json::{json, Value};

use crate::domain::{new_id, NotificationRequest, Priority, ScheduledTrip};
use crate::notifications::NotificationFanout;
use crate::ping_monitor::PingMonitor;
use crate::planner::SmartTripPlanner;
use crate::reroute::RerouteEngine;
use crate::store::TripStore;

pub struct TripServiceHandlers {
    pub store: Arc<TripStore>,
    pub planner: Arc<SmartTripPlanner>,
    pub pings: Arc<PingMonitor>,
    pub reroute: Arc<RerouteEngine>,
    pub notifications: Arc<NotificationFanout>,
}

impl TripServiceHandlers {
    /// Register every endpoint this service owns onto `table`.
    pub fn register(self: &Arc<Self>, table: &mut EndpointTable) {
        let this = Arc::clone(self);
        table.register("trips/smart-plan", Arc::new(move |_method: String, _residual: String, _ctx: UserContext, data: Value| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.smart_plan(data).await })
        }));

        let this = Arc::clone(self);
        table.register("trips", Arc::new(move |method: String, residual: String, _ctx: UserContext, data: Value| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.trips(method, residual, data).await })
        }));

        let this = Arc::clone(self);
        table.register("trips/ping", Arc::new(move |_method: String, _residual: String, _ctx: UserContext, data: Value| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.ping(data).await })
        }));

        let this = Arc::clone(self);
        table.register("recommendations", Arc::new(move |method: String, residual: String, _ctx: UserContext, _data: Value| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.recommendations(method, residual).await })
        }));

        let this = Arc::clone(self);
        table.register("notifications/send", Arc::new(move |_method: String, _residual: String, _ctx: UserContext, data: Value| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.send_notification(data).await })
        }));

        let this = Arc::clone(self);
        table.register("notifications", Arc::new(move |method: String, residual: String, ctx: UserContext, _data: Value| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.notifications(method, residual, ctx).await })
        }));
    }

    async fn smart_plan(&self, data: Value) -> Result<Value, ScfError> {
        let scheduled: ScheduledTripRequest = serde_json::from_value(data).map_err(|e| ScfError::validation(format!("invalid scheduled trip payload: {e}")))?;
        let scheduled_trip = ScheduledTrip {
            id: new_id(),
            name: scheduled.name,
            origin: scheduled.origin,
            destination: scheduled.destination,
            waypoints: scheduled.waypoints,
            priority: scheduled.priority,
            start_window: scheduled.start_window,
            end_window: scheduled.end_window,
            created_by: scheduled.created_by,
        };
        self.store.insert_scheduled_trip(scheduled_trip.clone());
        let smart_trip = self.planner.plan(&scheduled_trip).await?;
        Ok(json!(smart_trip))
    }

    async fn trips(&self, method: String, residual: String, data: Value) -> Result<Value, ScfError> {
        match (method.as_str(), residual.as_str()) {
            ("GET", "") => {
                let id: TripIdPayload = serde_json::from_value(data).map_err(|e| ScfError::validation(e.to_string()))?;
                let trip = self.store.get_trip(&id.trip_id).ok_or_else(|| ScfError::not_found("trip", &id.trip_id))?;
                Ok(json!(trip))
            }
            ("POST", "status") => {
                let payload: StatusUpdatePayload = serde_json::from_value(data).map_err(|e| ScfError::validation(e.to_string()))?;
                let trip = self.store.update_trip_status(&payload.trip_id, payload.status)?;
                if trip.status == crate::domain::TripStatus::InProgress {
                    self.pings.start_session(&trip.id);
                } else if matches!(trip.status, crate::domain::TripStatus::Completed | crate::domain::TripStatus::Cancelled) {
                    self.pings.end_session(&trip.id);
                    self.store.end_assignment(&trip.id, chrono::Utc::now());
                }
                Ok(json!(trip))
            }
            _ => Err(ScfError::not_found("trips action", &residual)),
        }
    }

    async fn ping(&self, data: Value) -> Result<Value, ScfError> {
        let payload: PingPayload = serde_json::from_value(data).map_err(|e| ScfError::validation(e.to_string()))?;
        let response = self
            .pings
            .ping(&payload.trip_id, payload.location, payload.timestamp, payload.speed_kmh)
            .await?;
        Ok(json!(response))
    }

    /// `recommendations/<id>/accept` and `recommendations/<id>/reject` —
    /// the id precedes the verb in the residual path since both actions
    /// need one, unlike `trips`' simpler sub-actions.
    async fn recommendations(&self, method: String, residual: String) -> Result<Value, ScfError> {
        let mut parts = residual.splitn(2, '/');
        let id = parts.next().unwrap_or("");
        let action = parts.next().unwrap_or("");
        match (method.as_str(), action) {
            ("POST", "accept") => {
                let trip = self.reroute.accept(id)?;
                Ok(json!(trip))
            }
            ("POST", "reject") => {
                self.reroute.reject(id)?;
                Ok(json!({ "rejected": true }))
            }
            _ => Err(ScfError::not_found("recommendations action", &residual)),
        }
    }

    async fn send_notification(&self, data: Value) -> Result<Value, ScfError> {
        let request: NotificationRequest = serde_json::from_value(data).map_err(|e| ScfError::validation(e.to_string()))?;
        let sent = self.notifications.send(request).await;
        Ok(json!({ "sent": sent }))
    }

    async fn notifications(&self, method: String, residual: String, ctx: UserContext) -> Result<Value, ScfError> {
        match method.as_str() {
            "GET" => Ok(json!(self.notifications.unread_for(&ctx.user_id))),
            "POST" => {
                self.notifications.mark_read(&residual);
                Ok(json!({ "acknowledged": true }))
            }
            _ => Err(ScfError::validation(format!("unsupported method '{method}' for notifications"))),
        }
    }
}

#[derive(serde::Deserialize)]
struct ScheduledTripRequest {
    name: String,
    origin: crate::domain::Place,
    destination: crate::domain::Place,
    #[serde(default)]
    waypoints: Vec<crate::domain::Place>,
    #[serde(default = "default_priority")]
    priority: Priority,
    start_window: chrono::DateTime<chrono::Utc>,
    end_window: chrono::DateTime<chrono::Utc>,
    created_by: String,
}

fn default_priority() -> Priority {
    Priority::Normal
}

#[derive(serde::Deserialize)]
struct TripIdPayload {
    trip_id: String,
}

#[derive(serde::Deserialize)]
struct StatusUpdatePayload {
    trip_id: String,
    status: crate::domain::TripStatus,
}

#[derive(serde::Deserialize)]
struct PingPayload {
    trip_id: String,
    location: crate::domain::GeoPoint,
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    speed_kmh: Option<f64>,
}
