pub mod tracker;
pub mod types;

pub use tracker::UsageTracker;
pub use types::{CallCost, CostRates};
