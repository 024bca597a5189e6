//! Peer discovery: node-finder seed, then the seed's live peers.

use crate::domain::config::DiscoveryConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::peer::Peer;
use crate::domain::retry::IncreasingRetryTimer;
use crate::ports::outbound::{PeerBootstrap, PeerLister};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Finds reachable peers, retrying with backoff until an attempt succeeds.
pub struct PeerDiscovery<B: PeerBootstrap, L: PeerLister> {
    bootstrap: B,
    lister: L,
    config: DiscoveryConfig,
}

impl<B: PeerBootstrap, L: PeerLister> PeerDiscovery<B, L> {
    pub fn new(bootstrap: B, lister: L, config: DiscoveryConfig) -> Self {
        Self {
            bootstrap,
            lister,
            config,
        }
    }

    /// Seed first, then its live peers without duplicates. Never gives up.
    pub async fn find_peers(&self) -> Vec<Peer> {
        let mut retry = IncreasingRetryTimer::new(self.config.retry.clone());
        loop {
            match self.attempt().await {
                Ok(peers) => {
                    info!(peers = peers.len(), attempts = retry.attempts() + 1, "Peer discovery complete");
                    return peers;
                }
                Err(e) => {
                    let delay = retry.next_delay();
                    warn!(
                        error = %e,
                        attempt = retry.attempts(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Peer discovery attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One bounded attempt.
    pub async fn attempt(&self) -> ClientResult<Vec<Peer>> {
        let timeout = self.config.attempt_timeout;
        match tokio::time::timeout(timeout, self.discover()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(format!(
                "peer discovery attempt exceeded {:?}",
                timeout
            ))),
        }
    }

    async fn discover(&self) -> ClientResult<Vec<Peer>> {
        let location = self.bootstrap.fetch_seed().await?;
        let seed = Peer::from_location(&location, self.config.use_ssl, self.config.port)?;
        debug!(seed = %seed, "Querying seed for live peers");

        let live = self.lister.live_peers(&seed).await?;

        let mut seen = HashSet::new();
        seen.insert(seed.location.clone());
        let mut peers = vec![seed];
        for peer in live {
            if seen.insert(peer.location.clone()) {
                peers.push(peer);
            }
        }
        Ok(peers)
    }
}
