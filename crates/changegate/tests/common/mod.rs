//! Shared test utilities for changegate integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a memory store, a dispatcher and a labeling reconciler
//! - Builders for deployment-like snapshots

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ReplicaLabeler, TestHarness, REPLICA_LABEL};
