//! Goalpool Backend Library
//!
//! Exposes core modules for use by binaries and tests.

pub mod api;
pub mod engine;
pub mod middleware;
pub mod models;
pub mod scoring;
pub mod store;
