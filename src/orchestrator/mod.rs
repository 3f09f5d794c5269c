//! Run orchestration.
//!
//! The [`Orchestrator`] walks every configured source once, in order:
//! fetch, parse, compare against the persisted state, notify, persist.
//! A failure in one source is recorded in its [`SourceReport`] and the run
//! moves on to the next one. The only exception is a notifier that lacks
//! configuration: that stops the run, since every later source would fail
//! the same way.

mod report;

pub use report::*;

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use feedwatch_adapters::forecast::parse_series;
use feedwatch_adapters::github::GitHubIssues;
use feedwatch_adapters::manifest::parse_manifest;
use feedwatch_adapters::smtp::SmtpMailer;
use feedwatch_adapters::transport::{Fetch, HttpFetcher};
use feedwatch_adapters::{AdapterError, ErrorKind};
use feedwatch_types::{slugify, PersistedState};

use crate::detect::{crossings, has_changed};
use crate::notify::{
    flood_notification, version_notification, EmailNotifier, IssueNotifier, Notifier,
    UnavailableNotifier,
};
use crate::settings::{AppConfig, Credentials, ForecastCheck, SinkKind, VersionCheck};
use crate::state::{StateError, StateStore};

/// Why a single source check failed.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl CheckError {
    /// Short category used in status lines.
    pub fn label(&self) -> &'static str {
        match self {
            CheckError::Adapter(err) => match err.kind() {
                ErrorKind::Transport => "transport",
                ErrorKind::Format => "format",
                ErrorKind::Config => "config",
                ErrorKind::Notify => "notify",
            },
            CheckError::State(_) => "state",
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, CheckError::Adapter(err) if err.is_config())
    }
}

/// The notification sinks, one per [`SinkKind`].
pub struct Sinks {
    issue: Box<dyn Notifier>,
    email: Box<dyn Notifier>,
}

impl Sinks {
    pub fn new(issue: Box<dyn Notifier>, email: Box<dyn Notifier>) -> Self {
        Self { issue, email }
    }

    /// Build both sinks. A sink whose settings or credentials are missing
    /// becomes an [`UnavailableNotifier`] so that runs without changes still
    /// succeed.
    pub fn from_config(config: &AppConfig, credentials: &Credentials, fetcher: &HttpFetcher) -> Self {
        let issue: Box<dyn Notifier> = match &config.issues {
            None => Box::new(UnavailableNotifier::new("no [issues] section configured")),
            Some(issues) => {
                let mut builder = GitHubIssues::builder()
                    .client(fetcher.client().clone())
                    .repository(issues.repository.clone())
                    .maybe_token(credentials.github_token.clone());
                if let Some(api_url) = &issues.api_url {
                    builder = builder.api_url(api_url.clone());
                }
                match builder.build() {
                    Ok(tracker) => Box::new(
                        IssueNotifier::new(tracker).with_assignees(issues.assignees.clone()),
                    ),
                    Err(err) => Box::new(UnavailableNotifier::new(reason(err))),
                }
            }
        };

        let email: Box<dyn Notifier> = match credentials.smtp_settings(config.smtp_timeout) {
            Ok(settings) => Box::new(EmailNotifier::new(SmtpMailer::new(settings))),
            Err(err) => Box::new(UnavailableNotifier::new(reason(err))),
        };

        Self { issue, email }
    }

    fn get(&self, kind: SinkKind) -> &dyn Notifier {
        match kind {
            SinkKind::Issue => self.issue.as_ref(),
            SinkKind::Email => self.email.as_ref(),
        }
    }
}

fn reason(err: AdapterError) -> String {
    match err {
        AdapterError::Config(msg) => msg,
        other => other.to_string(),
    }
}

enum Check<'a> {
    Version(&'a VersionCheck),
    Forecast(&'a ForecastCheck),
}

impl Check<'_> {
    fn name(&self) -> &str {
        match self {
            Check::Version(check) => &check.source.name,
            Check::Forecast(check) => &check.name,
        }
    }
}

/// Runs every configured check once.
pub struct Orchestrator {
    config: AppConfig,
    fetcher: Box<dyn Fetch>,
    store: Box<dyn StateStore>,
    sinks: Sinks,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        fetcher: Box<dyn Fetch>,
        store: Box<dyn StateStore>,
        sinks: Sinks,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
            sinks,
            dry_run: false,
        }
    }

    /// Detect changes without notifying or touching state.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn run(&self) -> RunReport {
        let checks: Vec<Check<'_>> = self
            .config
            .sources
            .iter()
            .map(Check::Version)
            .chain(self.config.forecasts.iter().map(Check::Forecast))
            .collect();

        let mut report = RunReport::default();
        let mut pending = checks.into_iter();

        while let Some(check) = pending.next() {
            let name = check.name().to_string();
            let span = info_span!("check", source = %name);
            let result = match check {
                Check::Version(c) => self.check_version(c).instrument(span).await,
                Check::Forecast(c) => self.check_forecast(c).instrument(span).await,
            };

            match &result {
                Ok(outcome) => debug!(source = %name, ?outcome, "Check finished"),
                Err(err) => error!(source = %name, error = %err, "Check failed"),
            }

            let abort = result
                .as_ref()
                .err()
                .filter(|err| err.is_config())
                .map(ToString::to_string);

            report.sources.push(SourceReport {
                slug: slugify(&name),
                name,
                result,
            });

            if let Some(reason) = abort {
                report.skipped = pending.by_ref().map(|c| c.name().to_string()).collect();
                warn!(skipped = report.skipped.len(), "Configuration error, stopping run");
                report.aborted = Some(reason);
                break;
            }
        }

        info!(
            checked = report.sources.len(),
            changes = report.changes(),
            failures = report.failures(),
            "Run complete"
        );
        report
    }

    async fn check_version(&self, check: &VersionCheck) -> Result<Outcome, CheckError> {
        let source = &check.source;
        let text = self.fetcher.fetch_text(&source.source_url, &check.retry).await?;

        let fields: Vec<&str> = check.fields.iter().map(String::as_str).collect();
        let Some(mut record) = parse_manifest(&text, &fields)? else {
            warn!(url = %source.source_url, "No release with a version in manifest");
            return Ok(Outcome::NoRelease);
        };

        let persisted = self.store.load(&source.state_slot)?;
        if !has_changed(Some(&record), persisted.as_ref()) {
            return Ok(Outcome::Unchanged {
                version: record.version().map(str::to_string),
            });
        }

        let notification = version_notification(source, &record);
        info!(
            previous = persisted.as_ref().and_then(PersistedState::version),
            current = record.version(),
            "New version detected"
        );

        if self.dry_run {
            return Ok(Outcome::Changed {
                title: notification.title,
                delivery: None,
            });
        }

        let delivery = self.sinks.get(check.sink).notify(&notification).await?;
        record.issue = delivery.issue();
        self.store
            .save(&source.state_slot, &PersistedState::from_record(&record))?;

        Ok(Outcome::Changed {
            title: notification.title,
            delivery: Some(delivery),
        })
    }

    async fn check_forecast(&self, check: &ForecastCheck) -> Result<Outcome, CheckError> {
        let text = self.fetcher.fetch_text(&check.url, &check.retry).await?;
        let series = parse_series(&text)?;
        let report = crossings(&series, &check.thresholds);
        let peak = series.peak();

        for crossing in report.iter() {
            match &crossing.first_sample {
                Some(sample) => debug!(
                    threshold = %crossing.name,
                    at = %sample.timestamp,
                    flow = sample.flow,
                    "Threshold crossed"
                ),
                None => debug!(threshold = %crossing.name, "Threshold not reached"),
            }
        }

        if !report.should_notify() {
            if let (Some(slot), false) = (&check.state_slot, self.dry_run) {
                self.store.clear(slot)?;
            }
            let (threshold, limit) = report
                .lowest()
                .map(|c| (c.name.clone(), c.limit))
                .unwrap_or_default();
            return Ok(Outcome::BelowThreshold {
                threshold,
                limit,
                peak: peak.flow,
            });
        }

        let (level, limit) = report
            .highest_crossed()
            .map(|c| (c.name.clone(), c.limit))
            .unwrap_or_default();

        // The slot keeps the most severe level alerted so far; only an
        // escalation past it notifies again.
        if let Some(slot) = &check.state_slot {
            let previous = self.store.load(slot)?;
            let alerted = previous
                .as_ref()
                .and_then(PersistedState::version)
                .and_then(|name| check.thresholds.get(name));
            if let Some(alerted) = alerted {
                if limit <= alerted.limit {
                    debug!(alerted = %alerted.name, current = %level, "Level already alerted");
                    return Ok(Outcome::AlreadyAlerted { level });
                }
            }
        }

        let notification = flood_notification(&check.name, &check.url, &series, &report);
        info!(level = %level, peak = peak.flow, at = %peak.timestamp, "Flood threshold reached");

        if self.dry_run {
            return Ok(Outcome::Changed {
                title: notification.title,
                delivery: None,
            });
        }

        let delivery = self.sinks.get(check.sink).notify(&notification).await?;
        if let Some(slot) = &check.state_slot {
            self.store.save(slot, &PersistedState::raw(level))?;
        }

        Ok(Outcome::Changed {
            title: notification.title,
            delivery: Some(delivery),
        })
    }
}
