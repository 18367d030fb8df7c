pub mod dashboard;
pub mod poll_channel;
pub mod ports;
pub mod reconciler;
pub mod stream_channel;

pub use dashboard::{Dashboard, DashboardHandle};
pub use reconciler::{MergeMode, Reconciler};
