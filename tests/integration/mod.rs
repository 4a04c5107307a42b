//! Integration test suite for selfup
//!
//! End-to-end tests of the update pipeline: the orchestrator driven by an
//! in-memory source, [`HttpSource`](selfup::upgrade::HttpSource) against a local
//! HTTP server, and the `selfup` binary itself.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **orchestrator**: Stage ordering, short-circuiting and outcomes of `SelfUpdater`
//! - **http_source**: Manifest, download and changelog requests over HTTP
//! - **cli**: The `selfup` command

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod orchestrator;
