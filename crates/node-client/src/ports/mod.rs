//! Ports layer - hexagonal architecture interfaces.

pub mod inbound;
pub mod outbound;

pub use inbound::InboundSink;
pub use outbound::{PeerBootstrap, PeerLister, SystemTimeSource, TimeSource};
