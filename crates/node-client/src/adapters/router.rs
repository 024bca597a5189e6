//! Routes inbound frames to the correlation tables.
//!
//! Each frame goes to at most one destination: a response to the pending call
//! with its `id`, a notification to the subscription with its
//! `subscriberId`. Frames nobody can claim are logged and dropped; they never
//! affect other work on the connection.

use crate::adapters::pending::PendingCallStore;
use crate::adapters::subscriptions::SubscriptionRegistry;
use crate::domain::envelope::Inbound;
use crate::domain::error::ClientError;
use crate::ports::inbound::InboundSink;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct MessageRouter {
    pending: Arc<PendingCallStore>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl MessageRouter {
    pub fn new(pending: Arc<PendingCallStore>, subscriptions: Arc<SubscriptionRegistry>) -> Self {
        Self {
            pending,
            subscriptions,
        }
    }
}

impl InboundSink for MessageRouter {
    fn on_message(&self, bytes: &[u8]) {
        match Inbound::parse(bytes) {
            Ok(Inbound::Response { id, outcome }) => {
                self.pending.complete(id, outcome);
            }
            Ok(Inbound::Notification(notification)) => {
                let method = notification.method.clone();
                if !self.subscriptions.dispatch(notification) {
                    debug!(method = %method, "Dropped unclaimed notification");
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    len = bytes.len(),
                    "Dropped inbound message that could not be attributed"
                );
            }
        }
    }

    fn on_connection_lost(&self, error: &ClientError) {
        let calls = self.pending.fail_all(error);
        let subscriptions = self.subscriptions.fail_all(error);
        debug!(calls, subscriptions, error = %error, "Failed live work after connection loss");
    }
}
