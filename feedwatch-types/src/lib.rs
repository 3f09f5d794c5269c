//! # feedwatch-types
//!
//! Core types shared by the feedwatch crates. Everything that flows through
//! the change-detection pipeline is defined here: the sources being watched,
//! the canonical record extracted from a version manifest, forecast series
//! and the thresholds they are checked against, and the state persisted
//! between runs.
//!
//! ## Features
//!
//! - `serde`: serialization of records and persisted state via serde
//!
//! ## Example
//!
//! ```rust
//! use feedwatch_types::{CanonicalRecord, Scalar, ThresholdSet, Threshold};
//!
//! let record = CanonicalRecord::new().with_field("Version", Scalar::text("2.1.0"));
//! assert_eq!(record.version(), Some("2.1.0"));
//!
//! let thresholds = ThresholdSet::new(vec![
//!     Threshold::new("HQ2", 75.0),
//!     Threshold::new("HQ1", 36.0),
//! ]);
//! assert_eq!(thresholds.lowest().map(|t| t.name.as_str()), Some("HQ1"));
//! ```

mod forecast;
mod record;
mod source;

pub use forecast::*;
pub use record::*;
pub use source::*;

/// Field carrying the release version in a version manifest.
pub const VERSION_FIELD: &str = "Version";
