//! # Driven Ports (Outbound SPI)
//!
//! Collaborators the client depends on but does not own: the wall clock and
//! the two halves of peer discovery.

use crate::domain::error::ClientError;
use crate::domain::peer::Peer;
use async_trait::async_trait;

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            // Clock before Unix epoch
            .unwrap_or(0)
    }
}

/// Fetches the seed peer location from a node finder.
///
/// An empty body must be reported as an error by the implementation.
#[async_trait]
pub trait PeerBootstrap: Send + Sync {
    async fn fetch_seed(&self) -> Result<String, ClientError>;
}

/// Lists the live peers that a known peer reports.
#[async_trait]
pub trait PeerLister: Send + Sync {
    async fn live_peers(&self, seed: &Peer) -> Result<Vec<Peer>, ClientError>;
}
