//! Change detection.
//!
//! - [`version`]: deep comparison of a fresh canonical record against the persisted one
//! - [`threshold`]: first-crossing scan of a forecast series against ordered thresholds

pub mod threshold;
pub mod version;

pub use threshold::{crossings, CrossingReport};
pub use version::has_changed;
