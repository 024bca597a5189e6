//! Test doubles that speak the node's wire protocol.

pub mod mock_node;
pub mod node_finder;

pub use mock_node::{MockNode, Reply, Script};
pub use node_finder::MockNodeFinder;

use std::time::Duration;

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
