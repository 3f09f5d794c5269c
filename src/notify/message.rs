//! Notification texts.
//!
//! Titles are built only from the source name and the detected value, so a
//! rerun against an unresolved alert yields the same title and is caught by
//! issue deduplication.

use feedwatch_types::{CanonicalRecord, ForecastSeries, MonitoredSource};

use super::Notification;
use crate::detect::CrossingReport;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Text describing the record's version, falling back to all fields.
fn version_label(record: &CanonicalRecord) -> String {
    match record.version() {
        Some(version) => version.to_string(),
        None => record
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Notification for a new version of a monitored application.
pub fn version_notification(source: &MonitoredSource, record: &CanonicalRecord) -> Notification {
    let version = version_label(record);
    let download = record.download_url.as_deref().unwrap_or("not published");

    Notification {
        title: format!("New version detected for {}: {}", source.name, version),
        body: format!(
            "New version of {} detected: **{}**\n\nDownload URL: {}\n\nManifest: {}",
            source.name, version, download, source.source_url
        ),
    }
}

/// Notification for a forecast that reaches at least the lowest threshold.
pub fn flood_notification(
    name: &str,
    url: &str,
    series: &ForecastSeries,
    report: &CrossingReport,
) -> Notification {
    let level = report
        .highest_crossed()
        .map(|c| c.name.as_str())
        .unwrap_or("no threshold");

    let (start, end) = series.span();
    let peak = series.peak();

    let mut lines = vec![
        format!("Automatic flood warning - flow forecast for {}", name),
        String::new(),
        format!(
            "Forecast period: {} to {} (local time)",
            start.format(TIME_FORMAT),
            end.format(TIME_FORMAT)
        ),
        format!(
            "Forecast peak: {:.2} m³/s at {}",
            peak.flow,
            peak.timestamp.format(TIME_FORMAT)
        ),
        String::new(),
        "Threshold crossings (m³/s):".to_string(),
    ];
    for crossing in report.iter() {
        match crossing.first_sample {
            Some(sample) => lines.push(format!(
                "- {} ({:.0}): {} ≈ {:.2}",
                crossing.name,
                crossing.limit,
                sample.timestamp.format(TIME_FORMAT),
                sample.flow
            )),
            None => lines.push(format!(
                "- {} ({:.0}): not forecast",
                crossing.name, crossing.limit
            )),
        }
    }
    lines.push(String::new());
    lines.push(format!("Source: {}", url));

    Notification {
        title: format!("Flood warning for {}: {} reached in forecast", name, level),
        body: lines.join("\n"),
    }
}
