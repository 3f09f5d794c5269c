use feedwatch_types::{ForecastSeries, ThresholdCrossing, ThresholdSet};

/// Crossing results for every threshold, ascending by limit.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingReport {
    crossings: Vec<ThresholdCrossing>,
}

impl CrossingReport {
    pub fn iter(&self) -> impl Iterator<Item = &ThresholdCrossing> {
        self.crossings.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ThresholdCrossing> {
        self.crossings.iter().find(|c| c.name == name)
    }

    /// The lowest threshold's result.
    pub fn lowest(&self) -> Option<&ThresholdCrossing> {
        self.crossings.first()
    }

    /// The highest-limit threshold that was crossed.
    pub fn highest_crossed(&self) -> Option<&ThresholdCrossing> {
        self.crossings.iter().rev().find(|c| c.is_crossed())
    }

    /// Alerting is gated on the lowest threshold alone; higher crossings
    /// without it do not notify.
    pub fn should_notify(&self) -> bool {
        self.lowest().is_some_and(ThresholdCrossing::is_crossed)
    }
}

/// Scan `series` once per threshold for the first sample at or above it.
pub fn crossings(series: &ForecastSeries, thresholds: &ThresholdSet) -> CrossingReport {
    let crossings = thresholds
        .iter()
        .map(|threshold| ThresholdCrossing {
            name: threshold.name.clone(),
            limit: threshold.limit,
            first_sample: series.iter().find(|s| s.flow >= threshold.limit).copied(),
        })
        .collect();

    CrossingReport { crossings }
}
