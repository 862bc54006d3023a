//! Time-series values returned by backends
//!
//! Every backend normalizes its response into a [`TimeSeriesResult`], an
//! arrival-ordered list of [`DataPoint`]s. Points are not assumed to be sorted;
//! consumers that need time order call [`TimeSeriesResult::sorted`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single sample: an instant and its value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Points returned by one query, in the order the backend produced them.
/// An empty result is a valid "no data" answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesResult {
    pub points: Vec<DataPoint>,
}

impl TimeSeriesResult {
    pub fn new(points: Vec<DataPoint>) -> Self {
        Self { points }
    }

    /// Wrap one point into a one-element series
    pub fn single(point: DataPoint) -> Self {
        Self {
            points: vec![point],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Copy of the points sorted ascending by timestamp
    pub fn sorted(&self) -> Vec<DataPoint> {
        let mut points = self.points.clone();
        points.sort_by_key(|p| p.timestamp);
        points
    }

    /// Earliest and latest timestamp, regardless of arrival order
    pub fn time_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.points.first()?.timestamp;
        let bounds = self
            .points
            .iter()
            .fold((first, first), |(lo, hi), p| (lo.min(p.timestamp), hi.max(p.timestamp)));
        Some(bounds)
    }
}

impl From<Vec<DataPoint>> for TimeSeriesResult {
    fn from(points: Vec<DataPoint>) -> Self {
        Self::new(points)
    }
}

/// A named query from the configuration file.
///
/// `name` is the panel title and need not be unique; `expr` is passed to the
/// backend verbatim (backends may expand it into a fuller query).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub expr: String,
}

impl Query {
    pub fn new(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_sorted_does_not_touch_source_order() {
        let series = TimeSeriesResult::new(vec![
            DataPoint::new(at(300), 3.0),
            DataPoint::new(at(100), 1.0),
            DataPoint::new(at(200), 2.0),
        ]);

        let sorted = series.sorted();
        let values: Vec<f64> = sorted.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(series.points[0].value, 3.0);
    }

    #[test]
    fn test_time_bounds() {
        let series = TimeSeriesResult::new(vec![
            DataPoint::new(at(200), 0.0),
            DataPoint::new(at(50), 0.0),
            DataPoint::new(at(400), 0.0),
        ]);
        assert_eq!(series.time_bounds(), Some((at(50), at(400))));
        assert_eq!(TimeSeriesResult::default().time_bounds(), None);
    }

    #[test]
    fn test_single() {
        let series = TimeSeriesResult::single(DataPoint::new(at(1), 42.5));
        assert_eq!(series.len(), 1);
        assert_eq!(series.points[0].value, 42.5);
    }
}
