//! Pending call table.
//!
//! Maps request ids to the callers waiting on them. An entry is removed the
//! moment it resolves, when the caller gives up, or when the connection fails
//! underneath it.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{ClientError, ClientResult};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A call waiting for its response
struct PendingCall {
    /// Channel to send the outcome
    sender: oneshot::Sender<ClientResult<Value>>,
    /// When the call was registered
    created_at: Instant,
    /// Method name (for logging)
    method: String,
}

/// Statistics for the pending call table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total calls registered
    pub total_registered: AtomicU64,
    /// Total calls resolved by a response
    pub total_completed: AtomicU64,
    /// Total calls failed by connection loss
    pub total_failed: AtomicU64,
    /// Total calls abandoned by their caller
    pub total_cancelled: AtomicU64,
}

/// Correlation table for in-flight calls.
///
/// Flow:
/// 1. The channel calls `register()` and gets an id plus a receiver
/// 2. The channel sends `{id, method, params}`
/// 3. The router sees a response with that id and calls `complete()`
/// 4. The caller's receiver resolves
#[derive(Default)]
pub struct PendingCallStore {
    pending: DashMap<CorrelationId, PendingCall>,
    stats: PendingStats,
}

impl PendingCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call under a fresh id.
    pub fn register(&self, method: &str) -> (CorrelationId, oneshot::Receiver<ClientResult<Value>>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            correlation_id,
            PendingCall {
                sender: tx,
                created_at: Instant::now(),
                method: method.to_string(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id,
            method = method,
            "Registered pending call"
        );

        (correlation_id, rx)
    }

    /// Resolve a call. Returns false if no call is waiting under that id.
    pub fn complete(&self, correlation_id: CorrelationId, outcome: ClientResult<Value>) -> bool {
        let Some((_, pending)) = self.pending.remove(&correlation_id) else {
            debug!(
                correlation_id = %correlation_id,
                "Response for unknown or abandoned call"
            );
            return false;
        };

        let elapsed = pending.created_at.elapsed();
        match pending.sender.send(outcome) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    method = pending.method,
                    response_time_ms = elapsed.as_millis() as u64,
                    "Completed pending call"
                );
                true
            }
            Err(_) => {
                // receiver dropped
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    method = pending.method,
                    "Pending call receiver dropped"
                );
                false
            }
        }
    }

    /// Forget a call whose caller stopped waiting.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Fail every pending call with `error`. Returns how many were failed.
    pub fn fail_all(&self, error: &ClientError) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.sender.send(Err(error.clone()));
                failed += 1;
            }
        }
        if failed > 0 {
            self.stats
                .total_failed
                .fetch_add(failed as u64, Ordering::Relaxed);
            warn!(failed, error = %error, "Failed pending calls after connection loss");
        }
        failed
    }

    /// Get number of currently pending calls
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}
