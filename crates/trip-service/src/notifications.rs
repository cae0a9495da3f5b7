// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C13] Notification Fanout — expands a [`NotificationRequest`] naming
//! concrete users and/or roles into one stored [`Notification`] per
//! recipient, delivered pull-based (spec section 15).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{new_id, Notification, NotificationRequest};
use crate::store::TripStore;

/// Resolves a role name (e.g. "dispatcher", "fleet_manager") to the
/// concrete user ids currently holding it. Kept abstract since role
/// membership lives in the identity service, outside this domain's store.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn users_with_role(&self, role: &str) -> anyhow::Result<Vec<String>>;
}

pub struct NotificationFanout {
    store: Arc<TripStore>,
    roles: Arc<dyn RoleDirectory>,
}

impl NotificationFanout {
    pub fn new(store: Arc<TripStore>, roles: Arc<dyn RoleDirectory>) -> Self {
        Self { store, roles }
    }

    /// Expand `request` into concrete recipients and persist one
    /// [`Notification`] per recipient. Returns the number of notifications
    /// written. A role with no members contributes nothing and is not an
    /// error — fanout delivers to whoever is reachable right now.
    pub async fn send(&self, request: NotificationRequest) -> usize {
        let mut recipients = request.recipient_user_ids.clone();
        for role in &request.recipient_roles {
            match self.roles.users_with_role(role).await {
                Ok(users) => recipients.extend(users),
                Err(e) => tracing::warn!(role, error = %e, "role directory lookup failed; skipping role for this fanout"),
            }
        }
        recipients.sort();
        recipients.dedup();

        let now = Utc::now();
        for user_id in &recipients {
            self.store.insert_notification(Notification {
                id: new_id(),
                recipient_user_id: user_id.clone(),
                kind: request.kind.clone(),
                title: request.title.clone(),
                message: request.message.clone(),
                data: request.data.clone(),
                created_at: now,
                read_at: None,
            });
        }
        recipients.len()
    }

    /// Pull-based retrieval: the caller's unread inbox.
    pub fn unread_for(&self, user_id: &str) -> Vec<Notification> {
        self.store.unread_for_user(user_id)
    }

    pub fn mark_read(&self, notification_id: &str) {
        self.store.mark_read(notification_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRoles;
    #[async_trait]
    impl RoleDirectory for FixedRoles {
        async fn users_with_role(&self, role: &str) -> anyhow::Result<Vec<String>> {
            match role {
                "dispatcher" => Ok(vec!["u1".into(), "u2".into()]),
                _ => Ok(vec![]),
            }
        }
    }

    fn request(user_ids: Vec<&str>, roles: Vec<&str>) -> NotificationRequest {
        NotificationRequest {
            recipient_user_ids: user_ids.into_iter().map(String::from).collect(),
            recipient_roles: roles.into_iter().map(String::from).collect(),
            kind: "missed_ping".into(),
            title: "Driver missed a ping".into(),
            message: "trip t1 missed its expected check-in".into(),
            data: serde_json::json!({"trip_id": "t1"}),
        }
    }

    #[tokio::test]
    async fn concrete_and_role_recipients_are_deduplicated() {
        let store = Arc::new(TripStore::new());
        let fanout = NotificationFanout::new(Arc::clone(&store), Arc::new(FixedRoles));

        let count = fanout.send(request(vec!["u2"], vec!["dispatcher"])).await;
        assert_eq!(count, 2);
        assert_eq!(fanout.unread_for("u1").len(), 1);
        assert_eq!(fanout.unread_for("u2").len(), 1);
    }

    #[tokio::test]
    async fn unknown_role_contributes_no_recipients() {
        let store = Arc::new(TripStore::new());
        let fanout = NotificationFanout::new(Arc::clone(&store), Arc::new(FixedRoles));
        let count = fanout.send(request(vec![], vec!["ghost_role"])).await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn marking_read_removes_it_from_the_unread_set() {
        let store = Arc::new(TripStore::new());
        let fanout = NotificationFanout::new(Arc::clone(&store), Arc::new(FixedRoles));
        fanout.send(request(vec!["u1"], vec![])).await;
        let notification = fanout.unread_for("u1").remove(0);
        fanout.mark_read(&notification.id);
        assert!(fanout.unread_for("u1").is_empty());
    }
}
