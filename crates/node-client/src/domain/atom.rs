//! Opaque ledger payloads.
//!
//! The client never interprets atom contents; it only forwards them and reads
//! the few fields it needs for bookkeeping (`hid`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier an application assigned to an atom it submits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomId(pub String);

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AtomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AtomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An atom ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub id: AtomId,
    pub payload: Value,
}

impl Atom {
    pub fn new(id: impl Into<AtomId>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Use the payload's own `hid` field as the id, when it has one.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let hid = payload.get("hid")?.as_str()?.to_string();
        Some(Self::new(hid, payload))
    }
}

/// An atom pushed by the node, stamped with its local receipt time.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedAtom {
    pub payload: Value,
    /// Milliseconds since the Unix epoch
    pub received_at_ms: u64,
}

impl ReceivedAtom {
    /// The payload's `hid` field, if present
    pub fn hid(&self) -> Option<&str> {
        self.payload.get("hid").and_then(Value::as_str)
    }
}

/// Query forwarded verbatim as `params.query` of an atom subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomQuery(pub Value);

impl AtomQuery {
    pub fn new(query: Value) -> Self {
        Self(query)
    }
}

/// Node self-description returned by `Network.getSelf` and
/// `Network.getLivePeers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Address the node is reachable at
    pub ip: String,
    /// Everything else the node reports
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
