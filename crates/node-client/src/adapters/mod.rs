//! Adapters layer: sockets, handshake, scheduling and correlation tables.

pub mod connection;
pub mod dispatcher;
pub mod handshake;
pub mod http;
pub mod pending;
pub mod router;
pub mod subscriptions;
pub mod transport;

pub use connection::ConnectionSupervisor;
pub use dispatcher::{CallDispatcher, Canceller, DispatchHandle};
pub use http::HttpNodeFinder;
pub use pending::{PendingCallStore, PendingStats};
pub use router::MessageRouter;
pub use subscriptions::SubscriptionRegistry;
pub use transport::{TransportEvent, TransportSocket};
