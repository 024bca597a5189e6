//! Subscription route table.
//!
//! A route exists from just before the subscribe request goes out until the
//! subscription is cancelled or fails. Notifications are forwarded only when
//! both the subscriber id and the notification method match.

use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::Notification;
use crate::domain::error::{ClientError, ClientResult};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Items delivered to a subscription: notification params, or one terminal
/// error.
pub type NotificationReceiver = mpsc::UnboundedReceiver<ClientResult<Value>>;

struct Route {
    notification_method: String,
    sender: mpsc::UnboundedSender<ClientResult<Value>>,
}

/// Live subscriptions keyed by subscriber id.
#[derive(Default)]
pub struct SubscriptionRegistry {
    routes: DashMap<CorrelationId, Route>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a route for `subscriber_id`.
    pub fn register(
        &self,
        subscriber_id: CorrelationId,
        notification_method: &str,
    ) -> NotificationReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(
            subscriber_id,
            Route {
                notification_method: notification_method.to_string(),
                sender: tx,
            },
        );
        debug!(
            subscriber_id = %subscriber_id,
            method = notification_method,
            "Created subscription route"
        );
        rx
    }

    /// Forward a notification. Returns false when nobody is listening for it.
    pub fn dispatch(&self, notification: Notification) -> bool {
        let id = notification.subscriber_id;
        let delivered = match self.routes.get(&id) {
            Some(route) if route.notification_method == notification.method => {
                route.sender.send(Ok(notification.params)).is_ok()
            }
            Some(route) => {
                trace!(
                    subscriber_id = %id,
                    expected = %route.notification_method,
                    got = %notification.method,
                    "Notification method does not match route"
                );
                return false;
            }
            None => {
                trace!(subscriber_id = %id, "Notification for unknown subscriber");
                return false;
            }
        };
        if !delivered {
            // receiver dropped without cancelling
            self.routes.remove(&id);
        }
        delivered
    }

    /// Close one route with a terminal error.
    pub fn fail(&self, subscriber_id: &CorrelationId, error: ClientError) -> bool {
        match self.routes.remove(subscriber_id) {
            Some((_, route)) => {
                let _ = route.sender.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Close one route silently. Idempotent.
    pub fn remove(&self, subscriber_id: &CorrelationId) -> bool {
        let removed = self.routes.remove(subscriber_id).is_some();
        if removed {
            debug!(subscriber_id = %subscriber_id, "Removed subscription route");
        }
        removed
    }

    /// Fail every route with `error`. Returns how many were failed.
    pub fn fail_all(&self, error: &ClientError) -> usize {
        let ids: Vec<CorrelationId> = self.routes.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.fail(id, error.clone()))
            .count()
    }

    pub fn active_count(&self) -> usize {
        self.routes.len()
    }

    pub fn is_active(&self, subscriber_id: &CorrelationId) -> bool {
        self.routes.contains_key(subscriber_id)
    }
}
