//! Service layer: the RPC channel, peer discovery and the owning client.

pub mod channel;
pub mod client;
pub mod discovery;

pub use channel::{AtomStream, RpcChannel, SubmissionStream, Subscription};
pub use client::{NodeClient, RpcPeerLister};
pub use discovery::PeerDiscovery;
