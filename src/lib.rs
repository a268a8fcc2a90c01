//! Mediamill - media conversion server
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod conversion;
pub mod quality;
pub mod server;
pub mod state;
