//! Ledger-link node client: one multiplexed JSON-RPC-over-WebSocket
//! connection per ledger node.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           NodeClient                             │
//! │   CallDispatcher (shared) · HTTP client · channel per endpoint   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────┐  ┌────────────┐  │
//! │  │                 RpcChannel                 │  │    Peer    │  │
//! │  │  call · subscribe · get_atoms · submit     │  │ Discovery  │  │
//! │  └──────┬───────────────────────────▲─────────┘  └─────┬──────┘  │
//! │         │ Request                   │ Inbound          │         │
//! │  ┌──────┴──────────────┐   ┌────────┴────────────┐     │ HTTP    │
//! │  │ ConnectionSupervisor│──▶│    MessageRouter    │     ▼         │
//! │  │ CLOSED/CONNECTING/  │   │ pending  │  routes  │  node finder │
//! │  │ OPEN/FAILURE        │   │ (id)     │ (subId)  │               │
//! │  └──────┬──────────────┘   └─────────────────────┘               │
//! │         │                                                        │
//! │  ┌──────┴──────────────┐                                         │
//! │  │  TransportSocket    │  TCP → TLS → upgrade → frames           │
//! │  └─────────────────────┘                                         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use node_client::{AtomQuery, ClientConfig, NodeClient};
//! use futures::StreamExt;
//! use serde_json::json;
//!
//! let client = NodeClient::new(ClientConfig::default())?;
//! let channel = client.channel_for("wss://node.example/rpc")?;
//! let mut atoms = channel.get_atoms(AtomQuery::new(json!({"address": "..."})));
//! while let Some(atom) = atoms.next().await {
//!     println!("{:?}", atom?.hid());
//! }
//! ```
//!
//! # Failure Model
//!
//! - A remote close or transport error fails every pending call and
//!   subscription of the connection, then holds the supervisor in FAILURE
//!   for the cool-down (default 60 s) before it may reconnect.
//! - Local errors (bad params, unknown submission state) fail only their own
//!   call or stream.
//! - No call timeouts are imposed; wrap calls in `tokio::time::timeout`.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports for public API
pub use adapters::{CallDispatcher, ConnectionSupervisor, HttpNodeFinder, TransportEvent};
pub use domain::atom::{Atom, AtomId, AtomQuery, NodeInfo, ReceivedAtom};
pub use domain::config::{
    ClientConfig, ConfigError, ConnectionConfig, DiscoveryConfig, DispatcherConfig,
    ProtocolConfig, RetryConfig, TransportConfig,
};
pub use domain::correlation::CorrelationId;
pub use domain::error::{ClientError, ClientResult, RpcError};
pub use domain::peer::{Endpoint, Peer};
pub use domain::state::ConnectionState;
pub use domain::submission::{AtomSubmissionState, AtomSubmissionUpdate};
pub use ports::{InboundSink, PeerBootstrap, PeerLister, TimeSource};
pub use service::{
    AtomStream, NodeClient, PeerDiscovery, RpcChannel, RpcPeerLister, SubmissionStream,
    Subscription,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
