//! # feedwatch-adapters
//!
//! Everything feedwatch needs to talk to the outside world: fetching feeds
//! with retries, turning their payloads into typed records, and delivering
//! notifications.
//!
//! ## Modules
//!
//! - [`transport`] - HTTP GET with jittered exponential backoff and tolerant decoding
//! - [`manifest`] - Canonical record extraction from vendor version manifests
//! - [`forecast`] - `Datum;Mittel` flow forecast parsing
//! - **github** (`github` feature) - Open-issue listing and issue creation
//! - **smtp** (`smtp` feature) - Plain-text alert email with TLS/STARTTLS
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feedwatch_adapters::manifest::parse_manifest;
//! use feedwatch_adapters::transport::{HttpFetcher, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = HttpFetcher::builder().build()?;
//!     let text = fetcher
//!         .fetch_text("https://proton.me/download/drive/macos/version.json", &RetryPolicy::manifest_feed())
//!         .await?;
//!
//!     if let Some(record) = parse_manifest(&text, &["Version"])? {
//!         println!("Latest: {:?}", record.version());
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod forecast;
pub mod manifest;
pub mod transport;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "smtp")]
pub mod smtp;

#[cfg(test)]
mod mock_server;

pub use error::{AdapterError, ErrorKind};

// Re-export types for convenience
pub use feedwatch_types::{CanonicalRecord, ForecastSample, ForecastSeries, MonitoredSource};
