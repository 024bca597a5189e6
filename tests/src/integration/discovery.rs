//! # Peer Discovery
//!
//! Node finder over HTTP, then the seed's live peers over its RPC channel.

#[cfg(test)]
mod tests {
    use crate::harness::{MockNode, MockNodeFinder, Reply};
    use node_client::{ClientConfig, ClientError, NodeClient};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn config(finder: &MockNodeFinder, node: &MockNode) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.discovery.node_finder_url = Some(finder.url());
        config.discovery.port = node.port();
        config.discovery.use_ssl = false;
        config.discovery.retry.initial_delay = Duration::from_millis(50);
        config
    }

    async fn seed_node() -> MockNode {
        MockNode::start(Arc::new(|req: &Value| match req["method"].as_str() {
            Some("Network.getLivePeers") => vec![Reply::Result(json!([
                {"ip": "127.0.0.1", "version": 2},
                {"ip": "10.0.0.7"},
                {"ip": "10.0.0.7"},
            ]))],
            _ => vec![Reply::error(-32601, "unsupported")],
        }))
        .await
    }

    #[tokio::test]
    async fn test_seed_then_live_peers() {
        let node = seed_node().await;
        let finder = MockNodeFinder::start(vec!["127.0.0.1\n"]).await;
        let client = NodeClient::new(config(&finder, &node)).unwrap();

        let peers = client.find_peers().await.unwrap();
        let locations: Vec<_> = peers.iter().map(|p| p.location.as_str()).collect();

        assert_eq!(locations, vec!["127.0.0.1", "10.0.0.7"]);
        assert!(peers.iter().all(|p| p.port == node.port() && !p.use_ssl));
        assert_eq!(
            peers[0].endpoint().unwrap().as_str(),
            format!("ws://127.0.0.1:{}/rpc", node.port())
        );
        assert_eq!(node.requests_for("Network.getLivePeers").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_finder_reply_is_retried() {
        let node = seed_node().await;
        let finder = MockNodeFinder::start(vec!["", "127.0.0.1"]).await;
        let client = NodeClient::new(config(&finder, &node)).unwrap();

        let peers = client.find_peers().await.unwrap();

        assert_eq!(peers.len(), 2);
        assert_eq!(finder.hits(), 2);
    }

    #[tokio::test]
    async fn test_discovery_requires_node_finder() {
        let client = NodeClient::new(ClientConfig::default()).unwrap();
        assert!(matches!(
            client.find_peers().await,
            Err(ClientError::Config(_))
        ));
    }
}
