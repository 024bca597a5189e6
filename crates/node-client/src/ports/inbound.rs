//! # Driving Ports (Inbound API)
//!
//! The supervisor's per-session pump pushes everything the socket delivers
//! into an [`InboundSink`]. The RPC router is the production implementation.

use crate::domain::error::ClientError;

/// Receiver for the inbound side of one supervised connection.
///
/// Both methods are called from the session pump task and must not block.
pub trait InboundSink: Send + Sync {
    /// One complete message, in arrival order.
    fn on_message(&self, bytes: &[u8]);

    /// The session ended; every piece of live work must be failed with `error`.
    fn on_connection_lost(&self, error: &ClientError);
}
