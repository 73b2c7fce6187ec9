//! Policy advisor service
//!
//! HTTP surface and configuration for the advisor. The binary in `main.rs`
//! is the composition root; integration tests build the same router.

pub mod api;
pub mod config;
