//! Geographic primitives, viewport math and application configuration.

pub mod config;
pub mod constants;
pub mod geo;
pub mod viewport;
