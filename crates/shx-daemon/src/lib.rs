//! shx-daemon library target.
//!
//! Exposes the scheduler, state and router for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod bootstrap;
pub mod cli;
pub mod routes;
pub mod scheduler;
pub mod state;
