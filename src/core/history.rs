use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Two minutes of data at the 1 Hz base cadence.
const DEFAULT_WINDOW: Duration = Duration::from_secs(120);
const DEFAULT_MAX_ENTRIES: usize = 120;

/// Rolling window of (timestamp, value) pairs per metric, for trend views.
///
/// Entries are appended in arrival order and evicted when they fall out of
/// the time window or past the max-count bound, whichever binds first. Gaps
/// are fine: a metric that was absent on some ticks (a GPU plugged in late)
/// simply has no entry for those timestamps.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    window: Duration,
    max_entries: usize,
    series: BTreeMap<String, VecDeque<(i64, f64)>>,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self::with_bounds(DEFAULT_WINDOW, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_bounds(window: Duration, max_entries: usize) -> Self {
        Self {
            window,
            max_entries,
            series: BTreeMap::new(),
        }
    }

    /// Append one observation, then evict everything older than
    /// `timestamp - window` or beyond the count bound.
    pub fn push(&mut self, metric: &str, timestamp: i64, value: f64) {
        let queue = self.series.entry(metric.to_string()).or_default();
        queue.push_back((timestamp, value));

        let horizon = timestamp - self.window.as_secs() as i64;
        while let Some(&(ts, _)) = queue.front() {
            if ts < horizon || queue.len() > self.max_entries {
                queue.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current window contents for one metric, oldest first.
    pub fn series(&self, metric: &str) -> Vec<(i64, f64)> {
        self.series
            .get(metric)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent value for one metric, if any.
    pub fn latest(&self, metric: &str) -> Option<f64> {
        self.series.get(metric).and_then(|q| q.back()).map(|&(_, v)| v)
    }

    /// All metric names currently tracked.
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|k| k.as_str())
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_entries_older_than_window() {
        let mut history = HistoryWindow::with_bounds(Duration::from_secs(120), 1000);
        for ts in 0..=200 {
            history.push("cpu.utilization_pct", ts, ts as f64);
        }

        let series = history.series("cpu.utilization_pct");
        assert!(series.iter().all(|&(ts, _)| ts >= 200 - 120));
        assert_eq!(series.first(), Some(&(80, 80.0)));
        assert_eq!(series.last(), Some(&(200, 200.0)));
    }

    #[test]
    fn count_bound_binds_when_tighter_than_window() {
        let mut history = HistoryWindow::with_bounds(Duration::from_secs(120), 10);
        for ts in 0..50 {
            history.push("memory.utilization_pct", ts, 1.0);
        }

        assert_eq!(history.series("memory.utilization_pct").len(), 10);
    }

    #[test]
    fn series_is_chronological_across_gaps() {
        let mut history = HistoryWindow::new();
        // GPU appears late and misses some ticks.
        for ts in [10, 11, 15, 16, 40] {
            history.push("gpu.utilization_pct", ts, ts as f64);
        }

        let series = history.series("gpu.utilization_pct");
        assert!(series.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(series.len(), 5);
    }

    #[test]
    fn unknown_metric_yields_empty_series() {
        let history = HistoryWindow::new();
        assert!(history.series("disk.utilization_pct").is_empty());
        assert_eq!(history.latest("disk.utilization_pct"), None);
    }

    #[test]
    fn latest_tracks_newest_value() {
        let mut history = HistoryWindow::new();
        history.push("cpu.utilization_pct", 1, 10.0);
        history.push("cpu.utilization_pct", 2, 20.0);
        assert_eq!(history.latest("cpu.utilization_pct"), Some(20.0));
    }
}
