//! Static configuration and credentials.
//!
//! The configuration file (TOML or YAML) lists the sources to watch; it is
//! layered with `FEEDWATCH__*` environment overrides and resolved once into
//! an immutable [`AppConfig`]. Credentials never live in the file: they are
//! read from the environment into [`Credentials`].
//!
//! ```toml
//! state_dir = "state"
//!
//! [issues]
//! repository = "traktuner/actions"
//! assignees = ["traktuner"]
//!
//! [[sources]]
//! name = "Proton Drive macOS"
//! version_url = "https://proton.me/download/drive/macos/version.json"
//! last_version_file = "last_version_drive_macos.txt"
//!
//! [[forecasts]]
//! name = "Atzenbrugg"
//! url = "https://www.noe.gv.at/wasserstand/kidata/stationdata/208009_DurchflussPrognose_12Stunden.csv"
//! thresholds = [
//!     { name = "HQ1", limit = 36.0 },
//!     { name = "HQ2", limit = 75.0 },
//! ]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use feedwatch_adapters::smtp::SmtpSettings;
use feedwatch_adapters::transport::{RetryPolicy, RetryStatuses};
use feedwatch_adapters::AdapterError;
use feedwatch_types::{MonitoredSource, Threshold, ThresholdSet, VERSION_FIELD};

use crate::duration::parse_duration;

/// Where a source's notifications go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Issue,
    Email,
}

/// A version manifest to watch.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionCheck {
    pub source: MonitoredSource,
    /// Manifest fields that make up the canonical record.
    pub fields: Vec<String>,
    pub sink: SinkKind,
    pub retry: RetryPolicy,
}

/// A flow forecast to watch.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastCheck {
    pub name: String,
    pub url: String,
    pub thresholds: ThresholdSet,
    /// Slot remembering the last alerted level. Without one, every run that
    /// crosses the lowest threshold notifies.
    pub state_slot: Option<String>,
    pub sink: SinkKind,
    pub retry: RetryPolicy,
}

/// Tracking-issue sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueConfig {
    #[serde(default)]
    pub api_url: Option<String>,
    pub repository: String,
    #[serde(default)]
    pub assignees: Vec<String>,
}

/// Resolved, immutable configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub state_dir: PathBuf,
    pub http_timeout: Duration,
    pub user_agent: Option<String>,
    pub smtp_timeout: Duration,
    pub issues: Option<IssueConfig>,
    pub sources: Vec<VersionCheck>,
    pub forecasts: Vec<ForecastCheck>,
}

impl AppConfig {
    /// Load a configuration file, applying `FEEDWATCH__*` overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawConfig = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("FEEDWATCH").separator("__"))
            .build()
            .with_context(|| format!("Failed to read {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        raw.resolve()
    }

    /// Parse configuration from a string in the given format.
    pub fn parse(content: &str, format: config::FileFormat) -> Result<Self> {
        let raw: RawConfig = Config::builder()
            .add_source(File::from_str(content, format))
            .build()?
            .try_deserialize()?;

        raw.resolve()
    }

    /// Names of every configured source, in processing order.
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .map(|s| s.source.name.as_str())
            .chain(self.forecasts.iter().map(|f| f.name.as_str()))
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_state_dir")]
    state_dir: PathBuf,
    #[serde(default)]
    http: RawHttp,
    #[serde(default)]
    email: RawEmail,
    #[serde(default)]
    issues: Option<IssueConfig>,
    #[serde(default)]
    sources: Vec<RawVersionSource>,
    #[serde(default)]
    forecasts: Vec<RawForecast>,
}

#[derive(Debug, Deserialize)]
struct RawHttp {
    #[serde(default = "default_http_timeout")]
    timeout: String,
    #[serde(default)]
    user_agent: Option<String>,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            user_agent: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEmail {
    #[serde(default = "default_smtp_timeout")]
    timeout: String,
}

impl Default for RawEmail {
    fn default() -> Self {
        Self {
            timeout: default_smtp_timeout(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay: Option<String>,
    max_delay: Option<String>,
    jitter: Option<String>,
    retry_statuses: Option<Vec<u16>>,
}

impl RawRetry {
    fn apply(&self, mut policy: RetryPolicy) -> Result<RetryPolicy> {
        if let Some(attempts) = self.max_attempts {
            if attempts == 0 {
                bail!("retry.max_attempts must be at least 1");
            }
            policy.max_attempts = attempts;
        }
        if let Some(d) = &self.base_delay {
            policy.base_delay = parse_duration(d)?;
        }
        if let Some(d) = &self.max_delay {
            policy.max_delay = parse_duration(d)?;
        }
        if let Some(d) = &self.jitter {
            policy.jitter = parse_duration(d)?;
        }
        if let Some(statuses) = &self.retry_statuses {
            policy.retry_statuses = RetryStatuses::Only(statuses.clone());
        }
        Ok(policy)
    }
}

#[derive(Debug, Deserialize)]
struct RawVersionSource {
    name: String,
    version_url: String,
    #[serde(default)]
    last_version_file: Option<String>,
    #[serde(default = "default_fields")]
    fields: Vec<String>,
    #[serde(default = "default_version_sink")]
    sink: SinkKind,
    #[serde(default)]
    retry: RawRetry,
}

#[derive(Debug, Deserialize)]
struct RawForecast {
    name: String,
    url: String,
    thresholds: Vec<Threshold>,
    #[serde(default)]
    state_file: Option<String>,
    #[serde(default = "default_forecast_sink")]
    sink: SinkKind,
    #[serde(default)]
    retry: RawRetry,
}

impl RawConfig {
    fn resolve(self) -> Result<AppConfig> {
        let mut names = HashSet::new();

        let sources = self
            .sources
            .into_iter()
            .map(|raw| {
                if !names.insert(raw.name.clone()) {
                    bail!("Duplicate source name '{}'", raw.name);
                }
                if raw.fields.is_empty() {
                    bail!("Source '{}' selects no fields", raw.name);
                }
                let slot = raw
                    .last_version_file
                    .unwrap_or_else(|| MonitoredSource::default_slot(&raw.name));
                let retry = raw
                    .retry
                    .apply(RetryPolicy::manifest_feed())
                    .with_context(|| format!("Invalid retry settings for '{}'", raw.name))?;
                Ok(VersionCheck {
                    source: MonitoredSource::new(raw.name, raw.version_url, slot),
                    fields: raw.fields,
                    sink: raw.sink,
                    retry,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let forecasts = self
            .forecasts
            .into_iter()
            .map(|raw| {
                if !names.insert(raw.name.clone()) {
                    bail!("Duplicate source name '{}'", raw.name);
                }
                if raw.thresholds.is_empty() {
                    bail!("Forecast '{}' defines no thresholds", raw.name);
                }
                if let Some(t) = raw.thresholds.iter().find(|t| !t.limit.is_finite()) {
                    bail!("Threshold '{}' of '{}' is not a number", t.name, raw.name);
                }
                let retry = raw
                    .retry
                    .apply(RetryPolicy::forecast_feed())
                    .with_context(|| format!("Invalid retry settings for '{}'", raw.name))?;
                Ok(ForecastCheck {
                    name: raw.name,
                    url: raw.url,
                    thresholds: ThresholdSet::new(raw.thresholds),
                    state_slot: raw.state_file,
                    sink: raw.sink,
                    retry,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AppConfig {
            state_dir: self.state_dir,
            http_timeout: parse_duration(&self.http.timeout).context("Invalid http.timeout")?,
            user_agent: self.http.user_agent,
            smtp_timeout: parse_duration(&self.email.timeout).context("Invalid email.timeout")?,
            issues: self.issues,
            sources,
            forecasts,
        })
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_http_timeout() -> String {
    "20s".to_string()
}

fn default_smtp_timeout() -> String {
    "30s".to_string()
}

fn default_fields() -> Vec<String> {
    vec![VERSION_FIELD.to_string()]
}

fn default_version_sink() -> SinkKind {
    SinkKind::Issue
}

fn default_forecast_sink() -> SinkKind {
    SinkKind::Email
}

/// Secrets and delivery settings taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub github_token: Option<String>,
    pub smtp_server: String,
    pub smtp_port: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_sender: String,
    /// Comma separated recipients; falls back to the sender when empty.
    pub smtp_notify: String,
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).unwrap_or_default();
        let token = get("GITHUB_TOKEN");

        Self {
            github_token: (!token.is_empty()).then_some(token),
            smtp_server: get("SMTP_SERVER"),
            smtp_port: get("SMTP_PORT"),
            smtp_username: get("SMTP_USERNAME"),
            smtp_password: get("SMTP_PASSWORD"),
            smtp_sender: get("SMTP_SENDER_EMAIL"),
            smtp_notify: get("SMTP_NOTIFY_MAIL"),
        }
    }

    /// Recipients from `SMTP_NOTIFY_MAIL`, or the sender.
    pub fn recipients(&self) -> Vec<String> {
        let raw = if self.smtp_notify.is_empty() {
            &self.smtp_sender
        } else {
            &self.smtp_notify
        };
        raw.split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Mailer settings, or a config error naming what is missing.
    pub fn smtp_settings(&self, timeout: Duration) -> Result<SmtpSettings, AdapterError> {
        let port: u16 = self
            .smtp_port
            .parse()
            .map_err(|_| AdapterError::Config("SMTP_PORT is missing or invalid".to_string()))?;

        let missing: Vec<&str> = [
            ("SMTP_SERVER", &self.smtp_server),
            ("SMTP_USERNAME", &self.smtp_username),
            ("SMTP_PASSWORD", &self.smtp_password),
            ("SMTP_SENDER_EMAIL", &self.smtp_sender),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(AdapterError::Config(format!(
                "missing SMTP environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(SmtpSettings {
            server: self.smtp_server.clone(),
            port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            sender: self.smtp_sender.clone(),
            recipients: self.recipients(),
            timeout,
        })
    }
}
