pub mod alerts;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod query;
pub mod server;
pub mod types;

// Layered boundaries: event loop and ports in `app`, adapters in `infra`
pub mod app;
pub mod infra;

// Snapshot rendering for the terminal and the HTTP API
pub mod presentation;
