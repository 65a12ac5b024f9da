//! Command implementations for the CLI
//!
//! This module contains the implementation of all CLI commands:
//! - start: Start the proxy server
//! - test: Test configuration validity
//! - config: Configuration display
//! - logs: Inspect the request/response log database

pub mod config;
pub mod logs;
pub mod start;
