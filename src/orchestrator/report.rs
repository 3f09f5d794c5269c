//! Per-source outcomes and the run summary.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use super::CheckError;
use crate::notify::Delivery;

/// Exit code when a notifier lacks required configuration.
pub const EXIT_CONFIG_ERROR: u8 = 2;
/// Exit code in strict mode when any source failed.
pub const EXIT_SOURCE_FAILED: u8 = 1;

/// What happened to one source.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Fetched state equals the persisted one.
    Unchanged { version: Option<String> },
    /// The manifest lists no release with a version.
    NoRelease,
    /// The lowest threshold is not reached.
    BelowThreshold { threshold: String, limit: f64, peak: f64 },
    /// The forecast level was already alerted in an earlier run.
    AlreadyAlerted { level: String },
    /// A change was detected. `delivery` is `None` in dry-run mode.
    Changed {
        title: String,
        delivery: Option<Delivery>,
    },
}

impl Outcome {
    pub fn is_change(&self) -> bool {
        matches!(self, Outcome::Changed { .. })
    }
}

/// Result for one source.
#[derive(Debug)]
pub struct SourceReport {
    pub name: String,
    pub slug: String,
    pub result: Result<Outcome, CheckError>,
}

impl SourceReport {
    /// One-line, human-readable status.
    pub fn status_line(&self) -> String {
        let detail = match &self.result {
            Ok(Outcome::Unchanged { version: Some(v) }) => format!("no change ({})", v),
            Ok(Outcome::Unchanged { version: None }) => "no change".to_string(),
            Ok(Outcome::NoRelease) => "no versioned release in manifest, skipped".to_string(),
            Ok(Outcome::BelowThreshold {
                threshold,
                limit,
                peak,
            }) => format!(
                "{} ({:.0}) not reached, forecast peak {:.2}",
                threshold, limit, peak
            ),
            Ok(Outcome::AlreadyAlerted { level }) => {
                format!("{} still forecast, already alerted", level)
            }
            Ok(Outcome::Changed {
                title,
                delivery: Some(delivery),
            }) => format!("change detected, {}: {}", delivery.describe(), title),
            Ok(Outcome::Changed {
                title,
                delivery: None,
            }) => format!("change detected (dry run): {}", title),
            Err(err) => format!("error [{}]: {}", err.label(), err),
        };
        format!("{}: {}", self.name, detail)
    }
}

/// Summary of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    /// Set when a configuration error stopped the run early.
    pub aborted: Option<String>,
    /// Sources never processed because the run was aborted.
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.sources.iter().map(SourceReport::status_line).collect();
        for name in &self.skipped {
            lines.push(format!("{}: not checked, run aborted", name));
        }
        lines
    }

    pub fn failures(&self) -> usize {
        self.sources.iter().filter(|s| s.result.is_err()).count()
    }

    pub fn changes(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(&s.result, Ok(o) if o.is_change()))
            .count()
    }

    /// 2 on a configuration error; in strict mode 1 when any source failed;
    /// 0 otherwise, including runs without changes.
    pub fn exit_code(&self, strict: bool) -> u8 {
        if self.aborted.is_some() {
            EXIT_CONFIG_ERROR
        } else if strict && self.failures() > 0 {
            EXIT_SOURCE_FAILED
        } else {
            0
        }
    }

    /// Append `changed_<slug>=true|false` lines for CI step outputs.
    pub fn write_step_outputs(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for source in &self.sources {
            let changed = matches!(&source.result, Ok(o) if o.is_change());
            writeln!(file, "changed_{}={}", source.slug, changed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedwatch_adapters::AdapterError;
    use tempfile::NamedTempFile;

    fn report(name: &str, result: Result<Outcome, CheckError>) -> SourceReport {
        SourceReport {
            name: name.to_string(),
            slug: name.to_lowercase(),
            result,
        }
    }

    #[test]
    fn test_status_lines() {
        let unchanged = report(
            "Mail",
            Ok(Outcome::Unchanged {
                version: Some("5.0".into()),
            }),
        );
        assert_eq!(unchanged.status_line(), "Mail: no change (5.0)");

        let created = report(
            "Drive",
            Ok(Outcome::Changed {
                title: "New version detected for Drive: 2.1.0".into(),
                delivery: Some(Delivery::Created { issue: 7 }),
            }),
        );
        assert_eq!(
            created.status_line(),
            "Drive: change detected, issue #7 created: New version detected for Drive: 2.1.0"
        );

        let below = report(
            "Atzenbrugg",
            Ok(Outcome::BelowThreshold {
                threshold: "HQ1".into(),
                limit: 36.0,
                peak: 10.0,
            }),
        );
        assert_eq!(
            below.status_line(),
            "Atzenbrugg: HQ1 (36) not reached, forecast peak 10.00"
        );

        let failed = report("Pass", Err(AdapterError::Timeout.into()));
        assert_eq!(failed.status_line(), "Pass: error [transport]: Request timed out");
    }

    #[test]
    fn test_exit_codes() {
        let mut run = RunReport::default();
        run.sources.push(report("Mail", Ok(Outcome::NoRelease)));
        assert_eq!(run.exit_code(false), 0);

        run.sources
            .push(report("Pass", Err(AdapterError::Format("x".into()).into())));
        assert_eq!(run.exit_code(false), 0);
        assert_eq!(run.exit_code(true), EXIT_SOURCE_FAILED);

        run.aborted = Some("missing SMTP_SERVER".into());
        assert_eq!(run.exit_code(false), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_write_step_outputs() {
        let mut run = RunReport::default();
        run.sources.push(report(
            "drive",
            Ok(Outcome::Changed {
                title: "t".into(),
                delivery: Some(Delivery::Sent),
            }),
        ));
        run.sources.push(report("mail", Ok(Outcome::Unchanged { version: None })));

        let file = NamedTempFile::new().unwrap();
        run.write_step_outputs(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "changed_drive=true\nchanged_mail=false\n");
        assert_eq!(run.changes(), 1);
    }
}
