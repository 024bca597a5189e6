//! Domain layer: wire envelopes, value types, configuration and errors.
//!
//! Nothing in here performs I/O.

pub mod atom;
pub mod config;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod peer;
pub mod retry;
pub mod state;
pub mod submission;

pub use atom::{Atom, AtomId, AtomQuery, NodeInfo, ReceivedAtom};
pub use config::{
    ClientConfig, ConfigError, ConnectionConfig, DiscoveryConfig, DispatcherConfig,
    ProtocolConfig, RetryConfig, TransportConfig,
};
pub use correlation::CorrelationId;
pub use envelope::{Inbound, Notification, Request};
pub use error::{ClientError, ClientResult, RpcError};
pub use peer::{Endpoint, Peer};
pub use retry::IncreasingRetryTimer;
pub use state::ConnectionState;
pub use submission::{AtomSubmissionState, AtomSubmissionUpdate};
