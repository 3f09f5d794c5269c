//! # feedwatch
//!
//! Polls public feeds, detects changes against the state of the previous run
//! and raises one alert per change.
//!
//! Two kinds of feeds are watched:
//!
//! - **Version manifests**: JSON documents listing application releases. A
//!   new canonical record (by default just the `Version` field) opens a
//!   tracking issue, or sends an email.
//! - **Flow forecasts**: `Datum;Mittel` series of river discharge. A forecast
//!   reaching the lowest configured threshold sends a flood warning.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐    ┌───────────┐    ┌──────────┐    ┌──────────┐
//! │ transport  │───▶│  parsers  │───▶│  detect  │───▶│  notify  │
//! │ (retrying) │    │ manifest/ │    │ version/ │    │ issue/   │
//! │            │    │ forecast  │    │ threshold│    │ email    │
//! └────────────┘    └───────────┘    └────┬─────┘    └────┬─────┘
//!                                         │               │
//!                                         ▼               ▼
//!                                    ┌─────────────────────────┐
//!                                    │   state (one slot per   │
//!                                    │   source, saved after   │
//!                                    │   successful delivery)  │
//!                                    └─────────────────────────┘
//! ```
//!
//! - **[`orchestrator`]**: Runs every source once with per-source failure isolation
//! - **[`detect`]**: Version equality and threshold crossing
//! - **[`notify`]**: Notification texts and the issue/email sinks
//! - **[`state`]**: Durable per-source state slots
//! - **[`settings`]**: Configuration file and environment credentials
//!
//! Transport, parsers and the raw GitHub/SMTP clients live in
//! `feedwatch-adapters`; shared types in `feedwatch-types`.
//!
//! ## Usage
//!
//! ```bash
//! # Check everything in feedwatch.toml, notifying on change
//! feedwatch --config feedwatch.toml
//!
//! # Report what would be sent without notifying or saving state
//! feedwatch --config feedwatch.toml --dry-run
//! ```

pub mod detect;
pub mod duration;
pub mod notify;
pub mod orchestrator;
pub mod settings;
pub mod state;

// Re-export main types for convenience
pub use notify::{Delivery, Notification, Notifier};
pub use orchestrator::{CheckError, Orchestrator, Outcome, RunReport, Sinks, SourceReport};
pub use settings::{AppConfig, Credentials};
pub use state::{FileStateStore, StateStore};
