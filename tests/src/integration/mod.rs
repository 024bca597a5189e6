//! End-to-end flows through `NodeClient` against the in-process node.

pub mod discovery;
pub mod failure;
pub mod flows;
