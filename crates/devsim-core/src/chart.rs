//! Future-masked view over a playback position.
//!
//! Every sample keeps its timestamp so the time axis spans the whole loaded
//! range, but values after the current index read as absent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;

use crate::types::{MetricValue, ParamId, Severity, TelemetrySample};

/// One position on the chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartPoint<'a> {
    /// At or before the current index; everything is visible.
    Revealed(&'a TelemetrySample),
    /// After the current index; only the timestamp is carried.
    Masked(DateTime<Utc>),
}

impl<'a> ChartPoint<'a> {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChartPoint::Revealed(s) => s.timestamp,
            ChartPoint::Masked(ts) => *ts,
        }
    }

    pub fn is_revealed(&self) -> bool {
        matches!(self, ChartPoint::Revealed(_))
    }

    /// Value of `param`, absent for masked points.
    pub fn value(&self, param: &str) -> Option<&'a MetricValue> {
        match self {
            ChartPoint::Revealed(s) => s.metric(param),
            ChartPoint::Masked(_) => None,
        }
    }

    pub fn log_message(&self) -> Option<&'a str> {
        match self {
            ChartPoint::Revealed(s) => Some(s.log_message.as_str()),
            ChartPoint::Masked(_) => None,
        }
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            ChartPoint::Revealed(s) => Some(s.severity),
            ChartPoint::Masked(_) => None,
        }
    }
}

/// Samples plus the index up to which they are revealed.
#[derive(Debug, Clone)]
pub struct ChartWindow {
    samples: Arc<[TelemetrySample]>,
    current_index: Option<usize>,
}

impl ChartWindow {
    /// `current_index` of `None` masks every sample.
    pub fn new(samples: Arc<[TelemetrySample]>, current_index: Option<usize>) -> Self {
        ChartWindow {
            samples,
            current_index,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    fn is_revealed(&self, index: usize) -> bool {
        matches!(self.current_index, Some(current) if index <= current)
    }

    pub fn get(&self, index: usize) -> Option<ChartPoint<'_>> {
        let sample = self.samples.get(index)?;
        Some(if self.is_revealed(index) {
            ChartPoint::Revealed(sample)
        } else {
            ChartPoint::Masked(sample.timestamp)
        })
    }

    /// One point per loaded sample, in timestamp order.
    pub fn points(&self) -> impl Iterator<Item = ChartPoint<'_>> + '_ {
        (0..self.samples.len()).filter_map(move |i| self.get(i))
    }

    /// Samples at or before the current index.
    pub fn revealed(&self) -> &[TelemetrySample] {
        match self.current_index {
            Some(i) => &self.samples[..(i + 1).min(self.samples.len())],
            None => &[],
        }
    }

    /// Numeric series for one parameter over the full time axis.
    pub fn series(&self, param: &str) -> Vec<(DateTime<Utc>, Option<f64>)> {
        self.points()
            .map(|p| (p.timestamp(), p.value(param).and_then(MetricValue::as_f64)))
            .collect()
    }

    /// Every parameter present in the loaded samples, in first-seen order.
    pub fn param_ids(&self) -> Vec<ParamId> {
        let mut seen = IndexSet::new();
        for sample in self.samples.iter() {
            seen.extend(sample.metrics.keys().cloned());
        }
        seen.into_iter().collect()
    }

    /// Log lines of revealed samples that carry one.
    pub fn logs(&self) -> impl Iterator<Item = (DateTime<Utc>, Severity, &str)> + '_ {
        self.revealed()
            .iter()
            .filter(|s| !s.log_message.is_empty())
            .map(|s| (s.timestamp, s.severity, s.log_message.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_at;

    fn window(current: Option<usize>) -> ChartWindow {
        let samples: Vec<TelemetrySample> = (0..4)
            .map(|i| {
                sample_at(i)
                    .with_metric("temp", 20.0 + i as f64)
                    .with_log(format!("line {i}"), Severity::Warning)
            })
            .collect();
        ChartWindow::new(Arc::from(samples), current)
    }

    #[test]
    fn test_points_mask_future_values_but_keep_timestamps() {
        let chart = window(Some(1));
        let points: Vec<_> = chart.points().collect();
        assert_eq!(points.len(), 4);
        assert!(points[0].is_revealed() && points[1].is_revealed());
        assert!(!points[2].is_revealed() && !points[3].is_revealed());
        assert_eq!(points[3].timestamp().timestamp(), 3);
        assert_eq!(points[1].value("temp"), Some(&MetricValue::Number(21.0)));
        assert_eq!(points[2].value("temp"), None);
        assert_eq!(points[2].log_message(), None);
        assert_eq!(points[2].severity(), None);
        assert_eq!(points[3], ChartPoint::Masked(chart.samples[3].timestamp));
    }

    #[test]
    fn test_series_and_revealed() {
        let chart = window(Some(2));
        let series = chart.series("temp");
        assert_eq!(
            series.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec![Some(20.0), Some(21.0), Some(22.0), None]
        );
        assert_eq!(chart.revealed().len(), 3);
        assert_eq!(chart.logs().count(), 3);
        assert_eq!(chart.series("missing").iter().filter(|(_, v)| v.is_some()).count(), 0);
    }

    #[test]
    fn test_no_position_masks_everything() {
        let chart = window(None);
        assert!(chart.points().all(|p| !p.is_revealed()));
        assert!(chart.revealed().is_empty());
        assert!(chart.get(7).is_none());
    }

    #[test]
    fn test_param_ids_first_seen_order() {
        let samples = vec![
            sample_at(0).with_metric("b", 1.0),
            sample_at(1).with_metric("a", true).with_metric("b", 2.0),
        ];
        let chart = ChartWindow::new(Arc::from(samples), Some(0));
        assert_eq!(chart.param_ids(), vec!["value", "b", "a"]);
    }
}
