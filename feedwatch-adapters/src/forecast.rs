//! Delimited flow-forecast parsing.
//!
//! The forecast feed is a semicolon separated text file. A preamble of
//! station metadata precedes a `Datum;Mittel` header, after which each row is
//! `YYYY-MM-DD HH:MM:SS;<flow>` with either a comma or a dot as decimal
//! separator. Further blocks may follow the data rows.

use chrono::NaiveDateTime;
use feedwatch_types::{ForecastSample, ForecastSeries};

use crate::AdapterError;

/// Header line marker, compared case-insensitively as a line prefix.
pub const HEADER_MARKER: &str = "datum;mittel";

pub const DELIMITER: char = ';';

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse forecast text into a series.
///
/// Rows after the header that do not decode are skipped. Fails when there is
/// no header or no decodable row.
pub fn parse_series(text: &str) -> Result<ForecastSeries, AdapterError> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    lines
        .by_ref()
        .find(|line| line.to_lowercase().starts_with(HEADER_MARKER))
        .ok_or_else(|| {
            AdapterError::Format(format!("header '{}' not found", HEADER_MARKER))
        })?;

    let samples: Vec<ForecastSample> = lines.filter_map(parse_row).collect();

    ForecastSeries::new(samples)
        .ok_or_else(|| AdapterError::Format("no forecast rows after header".to_string()))
}

fn parse_row(line: &str) -> Option<ForecastSample> {
    let mut fields = line.split(DELIMITER).map(str::trim);
    let timestamp = fields.next()?;
    let flow = fields.next()?;

    let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    let flow: f64 = flow.replace(',', ".").parse().ok()?;
    flow.is_finite().then_some(ForecastSample::new(timestamp, flow))
}

/// Render a series back into the feed format.
pub fn render_series(series: &ForecastSeries) -> String {
    let mut out = String::from("Datum;Mittel\n");
    for sample in series.iter() {
        out.push_str(&format!(
            "{}{}{}\n",
            sample.timestamp.format(TIMESTAMP_FORMAT),
            DELIMITER,
            sample.flow
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    const FEED: &str = "\
Station;Atzenbrugg
Gewässer;Perschling

DATUM;MITTEL;Min;Max
2024-09-15 06:00:00;12,4;10,1;14,0
2024-09-15 07:00:00;38.75;30;41
2024-09-15 08:00:00;81,0

Messwerte
Datum;Wert
letzte Aktualisierung;2024-09-15 05:45
";

    #[test]
    fn test_parse_feed() {
        let series = parse_series(FEED).unwrap();
        let flows: Vec<f64> = series.iter().map(|s| s.flow).collect();

        assert_eq!(flows, vec![12.4, 38.75, 81.0]);
        assert_eq!(series.span(), (at(15, 6), at(15, 8)));
    }

    #[test]
    fn test_missing_header() {
        let err = parse_series("2024-09-15 06:00:00;12,4\n").unwrap_err();
        assert!(matches!(err, AdapterError::Format(_)));
    }

    #[test]
    fn test_header_without_rows() {
        let err = parse_series("Datum;Mittel\nkeine Daten\n").unwrap_err();
        assert!(err.to_string().contains("no forecast rows"));
    }

    #[test]
    fn test_skips_malformed_rows() {
        let text = "Datum;Mittel\n2024-09-15 06:00:00\n15.09.2024 07:00;3\n2024-09-15 08:00:00;n/a\n2024-09-15 09:00:00;7\n";
        let series = parse_series(text).unwrap();
        assert_eq!(series.samples(), &[ForecastSample::new(at(15, 9), 7.0)]);
    }

    #[test]
    fn test_reparse_rendered_series() {
        let series = parse_series(FEED).unwrap();
        let rendered = render_series(&series);
        assert_eq!(parse_series(&rendered).unwrap(), series);
        assert_eq!(render_series(&parse_series(&rendered).unwrap()), rendered);
    }
}
