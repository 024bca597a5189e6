//! Root object owning the shared dispatcher, HTTP client and channels.

use crate::adapters::dispatcher::CallDispatcher;
use crate::adapters::http::{build_http_client, HttpNodeFinder};
use crate::domain::config::ClientConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::peer::{Endpoint, Peer};
use crate::ports::outbound::PeerLister;
use crate::service::channel::RpcChannel;
use crate::service::discovery::PeerDiscovery;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct ClientInner {
    config: ClientConfig,
    dispatcher: CallDispatcher,
    http_client: reqwest::Client,
    channels: DashMap<Endpoint, RpcChannel>,
}

/// Entry point of the library. One channel per endpoint, created lazily.
///
/// ```no_run
/// # async fn demo() -> node_client::ClientResult<()> {
/// use node_client::{ClientConfig, NodeClient};
///
/// let client = NodeClient::new(ClientConfig::default())?;
/// let channel = client.channel_for("wss://node.example:443/rpc")?;
/// let info = channel.get_self().await?;
/// println!("connected to {}", info.ip);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NodeClient {
    inner: Arc<ClientInner>,
}

impl NodeClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let dispatcher = CallDispatcher::new(&config.dispatcher);
        let http_client = build_http_client(&config.discovery)?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                dispatcher,
                http_client,
                channels: DashMap::new(),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &CallDispatcher {
        &self.inner.dispatcher
    }

    /// The channel for `endpoint`, shared by every caller.
    pub fn channel(&self, endpoint: &Endpoint) -> RpcChannel {
        self.inner
            .channels
            .entry(endpoint.clone())
            .or_insert_with(|| {
                debug!(endpoint = %endpoint, "Creating channel");
                RpcChannel::new(
                    endpoint.clone(),
                    &self.inner.config,
                    self.inner.dispatcher.clone(),
                )
            })
            .clone()
    }

    pub fn channel_for(&self, url: &str) -> ClientResult<RpcChannel> {
        Ok(self.channel(&Endpoint::parse(url)?))
    }

    pub fn channel_for_peer(&self, peer: &Peer) -> ClientResult<RpcChannel> {
        Ok(self.channel(&peer.endpoint()?))
    }

    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    /// Close and forget every channel with no live work.
    pub fn close_idle(&self) -> usize {
        let before = self.inner.channels.len();
        self.inner.channels.retain(|_, channel| !channel.try_close());
        before - self.inner.channels.len()
    }

    /// Discovery through the configured node finder.
    pub fn discovery(&self) -> ClientResult<PeerDiscovery<HttpNodeFinder, RpcPeerLister>> {
        let discovery = &self.inner.config.discovery;
        let url = discovery
            .node_finder_url
            .as_deref()
            .ok_or_else(|| ClientError::Config("discovery.node_finder_url is not set".into()))?;
        let finder = HttpNodeFinder::with_client(url, self.inner.http_client.clone());
        Ok(PeerDiscovery::new(
            finder,
            RpcPeerLister::new(self.clone()),
            discovery.clone(),
        ))
    }

    pub async fn find_peers(&self) -> ClientResult<Vec<Peer>> {
        Ok(self.discovery()?.find_peers().await)
    }
}

/// Lists live peers by asking the seed over its RPC channel.
pub struct RpcPeerLister {
    client: NodeClient,
}

impl RpcPeerLister {
    pub fn new(client: NodeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PeerLister for RpcPeerLister {
    async fn live_peers(&self, seed: &Peer) -> Result<Vec<Peer>, ClientError> {
        let channel = self.client.channel_for_peer(seed)?;
        let nodes = channel.get_live_peers().await?;
        let discovery = &self.client.config().discovery;

        let mut peers = Vec::with_capacity(nodes.len());
        for node in nodes {
            match Peer::from_location(&node.ip, discovery.use_ssl, discovery.port) {
                Ok(peer) => peers.push(peer),
                Err(e) => warn!(ip = %node.ip, error = %e, "Skipping unusable live peer"),
            }
        }
        Ok(peers)
    }
}
