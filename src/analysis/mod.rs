//! Statistics over collected responses.

pub mod aggregator;
pub mod dashboard;

pub use aggregator::{compute_stats, AggregateStat};
pub use dashboard::Dashboard;
