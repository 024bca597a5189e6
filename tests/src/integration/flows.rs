//! # Multiplexing Flows
//!
//! Many calls and subscriptions on one socket, each answer reaching exactly
//! its own caller.

#[cfg(test)]
mod tests {
    use crate::harness::{eventually, MockNode, Reply};
    use futures::StreamExt;
    use node_client::{
        Atom, AtomQuery, AtomSubmissionState, ClientConfig, ClientError, ConnectionState,
        NodeClient,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn client() -> NodeClient {
        NodeClient::new(ClientConfig::default()).unwrap()
    }

    // =========================================================================
    // CALL CORRELATION
    // =========================================================================

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let node = MockNode::start(Arc::new(|req: &Value| {
            let n = req["params"]["n"].as_u64().unwrap_or(0);
            vec![
                Reply::Delay(Duration::from_millis((10 - n) * 15)),
                Reply::Result(json!(n * 100)),
            ]
        }))
        .await;
        let client = client();
        let channel = client.channel(&node.endpoint());

        let calls = (0..10u64).map(|n| {
            let channel = channel.clone();
            async move { (n, channel.call("Test.delayed", json!({ "n": n })).await) }
        });
        for (n, result) in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap(), json!(n * 100));
        }

        assert_eq!(node.connections(), 1);
        assert_eq!(node.requests().len(), 10);
    }

    #[tokio::test]
    async fn test_calls_and_subscriptions_share_one_socket() {
        let node = MockNode::start(Arc::new(|req: &Value| match req["method"].as_str() {
            Some("Atoms.subscribe") => vec![
                Reply::Result(json!(true)),
                Reply::notify("Atoms.subscribeUpdate", json!({"atoms": [{"hid": "x"}]})),
            ],
            _ => vec![Reply::Result(json!({"ip": "127.0.0.1"}))],
        }))
        .await;
        let client = client();
        let channel = client.channel_for(&node.url()).unwrap();

        let mut first = channel.get_atoms(AtomQuery::new(json!({"address": "a"})));
        let mut second = channel.get_atoms(AtomQuery::new(json!({"address": "b"})));
        let info = channel.get_self().await.unwrap();

        assert_eq!(info.ip, "127.0.0.1");
        assert_eq!(first.next().await.unwrap().unwrap().hid(), Some("x"));
        assert_eq!(second.next().await.unwrap().unwrap().hid(), Some("x"));
        assert_eq!(channel.active_subscriptions(), 2);
        assert_eq!(node.connections(), 1);
    }

    #[tokio::test]
    async fn test_rpc_error_leaves_connection_open() {
        let node = MockNode::start(Arc::new(|req: &Value| {
            if req["method"] == "Ledger.getAtoms" {
                vec![Reply::error(-32602, "invalid hid")]
            } else {
                vec![Reply::Result(json!([]))]
            }
        }))
        .await;
        let client = client();
        let channel = client.channel(&node.endpoint());

        match channel.get_atom("nope").await {
            Err(ClientError::Rpc(err)) => {
                assert_eq!(err.code, Some(-32602));
                assert_eq!(err.message, "invalid hid");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(channel.get_live_peers().await.unwrap().is_empty());
        assert_eq!(channel.state(), ConnectionState::Open);
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    #[tokio::test]
    async fn test_dropped_subscription_sends_cancel_and_goes_quiet() {
        let node = MockNode::start(Arc::new(|req: &Value| match req["method"].as_str() {
            Some("Atoms.subscribe") => vec![
                Reply::Result(json!(true)),
                Reply::notify("Atoms.subscribeUpdate", json!({"atoms": [{"hid": "1"}]})),
                Reply::Delay(Duration::from_millis(100)),
                Reply::notify("Atoms.subscribeUpdate", json!({"atoms": [{"hid": "2"}]})),
            ],
            _ => vec![Reply::Result(json!(true))],
        }))
        .await;
        let client = client();
        let channel = client.channel(&node.endpoint());

        let mut atoms = channel.get_atoms(AtomQuery::new(json!({})));
        let subscriber_id = atoms.subscriber_id().to_string();
        assert_eq!(atoms.next().await.unwrap().unwrap().hid(), Some("1"));
        drop(atoms);

        eventually(|| !node.requests_for("Subscription.cancel").is_empty()).await;
        let cancel = &node.requests_for("Subscription.cancel")[0];
        assert_eq!(cancel["params"]["subscriberId"], json!(subscriber_id));

        // the late update is dropped by the router
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(channel.active_subscriptions(), 0);
        assert_eq!(channel.state(), ConnectionState::Open);
        assert!(channel.try_close());
    }

    // =========================================================================
    // ATOM SUBMISSION
    // =========================================================================

    #[tokio::test]
    async fn test_submission_reaches_stored() {
        let node = MockNode::start(Arc::new(|_: &Value| {
            vec![
                Reply::Result(json!(true)),
                Reply::notify("AtomSubmissionState.onNext", json!({"value": "SUBMITTED"})),
                Reply::Delay(Duration::from_millis(20)),
                Reply::notify("AtomSubmissionState.onNext", json!({"value": "STORED"})),
            ]
        }))
        .await;
        let client = client();
        let channel = client.channel(&node.endpoint());

        let atom = Atom::from_payload(json!({"hid": "h1", "particles": []})).unwrap();
        let stored = channel.submit_atom(atom).wait_stored().await.unwrap();

        assert_eq!(stored.state, AtomSubmissionState::Stored);
        assert_eq!(stored.atom_id.0, "h1");
        let submit = &node.requests_for("Universe.submitAtomAndSubscribe")[0];
        assert_eq!(submit["params"]["atom"]["hid"], "h1");
    }

    #[tokio::test]
    async fn test_submission_failure_is_terminal() {
        let node = MockNode::start(Arc::new(|_: &Value| {
            vec![
                Reply::Result(json!(true)),
                Reply::notify(
                    "AtomSubmissionState.onNext",
                    json!({"value": "FAILED", "message": "conflict"}),
                ),
                Reply::notify("AtomSubmissionState.onNext", json!({"value": "STORED"})),
            ]
        }))
        .await;
        let client = client();
        let channel = client.channel(&node.endpoint());

        let updates: Vec<_> = channel
            .submit_atom(Atom::new("a1", json!({})))
            .collect()
            .await;
        let last = updates.last().unwrap();

        assert_eq!(last.state, AtomSubmissionState::Failed);
        assert_eq!(last.message.as_deref(), Some("conflict"));
        assert_eq!(updates.iter().filter(|u| u.is_complete()).count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_submission_state_fails_submission() {
        let node = MockNode::start(Arc::new(|_: &Value| {
            vec![
                Reply::Result(json!(true)),
                Reply::notify("AtomSubmissionState.onNext", json!({"value": "LOST"})),
            ]
        }))
        .await;
        let client = client();
        let channel = client.channel(&node.endpoint());

        match channel.submit_atom(Atom::new("a1", json!({}))).wait_stored().await {
            Err(ClientError::Protocol(message)) => assert!(message.contains("LOST")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
