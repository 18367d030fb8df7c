// Observability: metrics for the poll and stream channels

pub mod metrics;

pub use metrics::{init, render};
