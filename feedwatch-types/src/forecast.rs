//! Forecast series and the thresholds they are checked against.

use chrono::NaiveDateTime;

/// One forecast point: a local timestamp and the predicted flow (m³/s).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ForecastSample {
    pub timestamp: NaiveDateTime,
    pub flow: f64,
}

impl ForecastSample {
    pub fn new(timestamp: NaiveDateTime, flow: f64) -> Self {
        Self { timestamp, flow }
    }
}

/// A non-empty sequence of forecast samples in feed order.
///
/// Feeds publish samples ascending by timestamp. The series keeps them in
/// the order they were read, which is the order crossings are scanned in.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    samples: Vec<ForecastSample>,
}

impl ForecastSeries {
    /// Build a series. Returns `None` for an empty sample list.
    pub fn new(samples: Vec<ForecastSample>) -> Option<Self> {
        if samples.is_empty() {
            None
        } else {
            Some(Self { samples })
        }
    }

    pub fn samples(&self) -> &[ForecastSample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForecastSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamps of the first and last sample.
    pub fn span(&self) -> (NaiveDateTime, NaiveDateTime) {
        let first = self.samples[0].timestamp;
        let last = self.samples[self.samples.len() - 1].timestamp;
        (first, last)
    }

    /// Highest forecast flow.
    pub fn peak(&self) -> ForecastSample {
        self.samples
            .iter()
            .copied()
            .fold(self.samples[0], |best, s| if s.flow > best.flow { s } else { best })
    }
}

/// A named flow limit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Threshold {
    pub name: String,
    pub limit: f64,
}

impl Threshold {
    pub fn new(name: impl Into<String>, limit: f64) -> Self {
        Self {
            name: name.into(),
            limit,
        }
    }
}

/// Thresholds ordered ascending by limit.
///
/// Ties keep their configured order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    pub fn new(mut thresholds: Vec<Threshold>) -> Self {
        thresholds.sort_by(|a, b| a.limit.total_cmp(&b.limit));
        Self { thresholds }
    }

    /// The threshold with the smallest limit.
    pub fn lowest(&self) -> Option<&Threshold> {
        self.thresholds.first()
    }

    pub fn get(&self, name: &str) -> Option<&Threshold> {
        self.thresholds.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

/// The first sample, if any, that meets or exceeds a threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdCrossing {
    pub name: String,
    pub limit: f64,
    pub first_sample: Option<ForecastSample>,
}

impl ThresholdCrossing {
    pub fn is_crossed(&self) -> bool {
        self.first_sample.is_some()
    }
}
