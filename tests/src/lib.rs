//! # Ledger-Link Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness/          # In-process node and node finder
//! │   ├── mock_node.rs
//! │   └── node_finder.rs
//! │
//! └── integration/      # End-to-end client flows
//!     ├── flows.rs
//!     ├── failure.rs
//!     └── discovery.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p link-tests
//!
//! # By category
//! cargo test -p link-tests integration::failure::
//!
//! # Benchmarks
//! cargo bench -p link-tests
//! ```

#![allow(dead_code)]

pub mod harness;
pub mod integration;
