// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for complete cluster lifecycles.
//!
//! These tests drive the `ClusterManager` through creation, updates,
//! deletion and TTL expiry on the local workflow engine. Cloud provisioning,
//! deployments, Kubernetes calls and DNS are replaced by recording fakes, so
//! no cloud account or cluster is needed.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run with log output
//! RUST_LOG=cluster_lifecycle=debug cargo test --test functional -- --nocapture
//! ```

mod create_tests;
mod delete_tests;
mod harness;
mod ttl_tests;
mod update_tests;

pub use harness::*;
