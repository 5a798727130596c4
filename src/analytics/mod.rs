//! Reporting pipeline: load the three collections into one snapshot, narrow
//! it with [`FilterCriteria`], then aggregate into statistics and chart data.

pub mod charts;
pub mod filter;
pub mod load;
pub mod stats;

pub use filter::FilterCriteria;
pub use load::{load_snapshot, Snapshot};
pub use stats::Summary;

/// Round to `places` decimals (half away from zero).
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
