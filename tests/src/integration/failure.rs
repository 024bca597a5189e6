//! # Failure and Recovery
//!
//! Connection-level failures fail all live work at once, then hold the
//! channel in its cool-down before it may reconnect.

#[cfg(test)]
mod tests {
    use crate::harness::{eventually, MockNode, Reply};
    use futures::StreamExt;
    use node_client::{ClientConfig, ClientError, ConnectionState, NodeClient};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn client(cooldown: Duration) -> NodeClient {
        let mut config = ClientConfig::default();
        config.connection.cooldown = cooldown;
        NodeClient::new(config).unwrap()
    }

    /// Never answers `Slow.*`, closes on `Crash.now`, answers the rest.
    async fn crashing_node() -> MockNode {
        MockNode::start(Arc::new(|req: &Value| match req["method"].as_str() {
            Some("Crash.now") => vec![Reply::Close],
            Some(m) if m.starts_with("Slow.") => vec![],
            _ => vec![Reply::Result(json!("ok"))],
        }))
        .await
    }

    #[tokio::test]
    async fn test_remote_close_fails_all_live_work() {
        let node = crashing_node().await;
        let client = client(Duration::from_secs(60));
        let channel = client.channel(&node.endpoint());

        let mut subscription = channel.subscribe("Slow.subscribe", json!({}), "Slow.update");
        let pending = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.call("Slow.call", json!({})).await })
        };
        eventually(|| node.requests().len() == 2).await;

        let crash = channel.call("Crash.now", json!({})).await;
        assert!(matches!(crash, Err(ClientError::Transport(_))));

        assert!(matches!(pending.await.unwrap(), Err(ClientError::Transport(_))));
        assert!(matches!(subscription.next().await, Some(Err(ClientError::Transport(_)))));
        assert!(subscription.next().await.is_none());
        assert_eq!(channel.state(), ConnectionState::Failure);
        assert_eq!(channel.pending_calls(), 0);
        assert_eq!(channel.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_cooldown_then_reconnect() {
        let node = crashing_node().await;
        let client = client(Duration::from_millis(300));
        let channel = client.channel(&node.endpoint());
        let mut transitions = channel.supervisor().transitions();

        channel.call("Ping.me", json!({})).await.unwrap();
        let _ = channel.call("Crash.now", json!({})).await;

        match channel.call("Ping.me", json!({})).await {
            Err(ClientError::CoolingDown { remaining_ms }) => assert!(remaining_ms <= 300),
            other => panic!("expected cool-down, got {:?}", other),
        }
        assert_eq!(node.connections(), 1);

        let mut status = channel.status();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| *s == ConnectionState::Closed),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(channel.call("Ping.me", json!({})).await.unwrap(), json!("ok"));
        assert_eq!(node.connections(), 2);

        let mut seen = Vec::new();
        while let Ok(state) = transitions.try_recv() {
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Open,
                ConnectionState::Failure,
                ConnectionState::Closed,
                ConnectionState::Connecting,
                ConnectionState::Open,
            ]
        );
    }

    #[tokio::test]
    async fn test_local_close_skips_cooldown() {
        let node = crashing_node().await;
        let client = client(Duration::from_secs(60));
        let channel = client.channel(&node.endpoint());

        channel.call("Ping.me", json!({})).await.unwrap();
        assert!(channel.try_close());
        assert_eq!(channel.state(), ConnectionState::Closed);

        channel.call("Ping.me", json!({})).await.unwrap();
        assert_eq!(node.connections(), 2);
    }

    #[tokio::test]
    async fn test_try_close_refuses_while_busy() {
        let node = crashing_node().await;
        let client = client(Duration::from_secs(60));
        let channel = client.channel(&node.endpoint());

        let pending = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.call("Slow.call", json!({})).await })
        };
        eventually(|| node.requests().len() == 1).await;

        assert!(!channel.try_close());
        assert_eq!(channel.state(), ConnectionState::Open);
        pending.abort();
    }

    #[tokio::test]
    async fn test_refused_connection_enters_cooldown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(Duration::from_secs(60));
        let channel = client.channel_for(&format!("ws://{}/rpc", addr)).unwrap();

        assert!(matches!(
            channel.call("Ping.me", json!({})).await,
            Err(ClientError::Transport(_))
        ));
        assert_eq!(channel.state(), ConnectionState::Failure);
        assert!(matches!(
            channel.call("Ping.me", json!({})).await,
            Err(ClientError::CoolingDown { .. })
        ));
    }
}
