//! Shared test utilities for mailbot integration tests.
//!
//! This module provides:
//! - `MessageBuilder` and `ConfigBuilder` for test data
//! - `MemoryMailSession`, an in-memory mailbox
//! - `CannedServer`, a local HTTP server with fixed responses

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
