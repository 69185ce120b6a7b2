//! Shared utilities for research-rs
//!
//! Tracing setup and application metadata used by the binary and the tests.

pub mod config;
pub mod logging;

pub use config::{Config, LogFormat};
pub use logging::{init_tracing, init_tracing_json, init_tracing_with};
