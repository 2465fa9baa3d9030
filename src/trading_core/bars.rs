//! Bar types and the feed abstraction the core reads prices from

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Bar interval at or above which a chart counts as daily
pub const DAILY_INTERVAL_MINUTES: u32 = 1440;

/// Shortest span still read as a daily bar (a 23 hour day at DST spring forward)
const MIN_DAILY_SPAN_MINUTES: u32 = DAILY_INTERVAL_MINUTES - 60;

/// Bars sampled when inferring a file's interval
const INTERVAL_SAMPLE_BARS: usize = 20;

/// OHLC bar as supplied by the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Daily charts index sessions by bar; intraday charts resolve sessions through the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartMode {
    Intraday,
    Daily,
}

impl ChartMode {
    pub fn from_interval_minutes(minutes: u32) -> Self {
        if minutes >= DAILY_INTERVAL_MINUTES {
            Self::Daily
        } else {
            Self::Intraday
        }
    }
}

impl std::fmt::Display for ChartMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intraday => write!(f, "INTRADAY"),
            Self::Daily => write!(f, "DAILY"),
        }
    }
}

/// Read side of the host's bar feed.
///
/// Bars are indexed `0..bar_count()` in arrival order. The host guarantees a single
/// thread drives a given series.
pub trait BarSeries {
    fn bar_count(&self) -> usize;

    fn bar(&self, index: usize) -> Option<&Bar>;

    fn is_complete(&self, index: usize) -> bool;

    /// Exact match on bar start time
    fn find_index_by_timestamp(&self, instant: DateTime<Utc>) -> Option<usize>;

    /// Native bar interval; 0 means the bars are not time based
    fn native_bar_interval_minutes(&self) -> u32;

    fn close(&self, index: usize) -> Option<f64> {
        self.bar(index).map(|b| b.close)
    }

    fn first_start_time(&self) -> Option<DateTime<Utc>> {
        self.bar(0).map(|b| b.start_time)
    }
}

/// In-memory bar series, sorted by start time
#[derive(Debug, Clone)]
pub struct VecSeries {
    bars: Vec<Bar>,
    interval_minutes: u32,
    last_forming: bool,
}

impl VecSeries {
    pub fn new(interval_minutes: u32) -> Self {
        Self {
            bars: Vec::new(),
            interval_minutes,
            last_forming: false,
        }
    }

    pub fn from_bars(bars: Vec<Bar>, interval_minutes: u32) -> Self {
        Self {
            bars,
            interval_minutes,
            last_forming: false,
        }
    }

    /// Append a completed bar
    pub fn push(&mut self, bar: Bar) {
        self.bars.push(bar);
        self.last_forming = false;
    }

    /// Mark the newest bar as still forming (not eligible for signals)
    pub fn set_last_forming(&mut self, forming: bool) {
        self.last_forming = forming;
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl BarSeries for VecSeries {
    fn bar_count(&self) -> usize {
        self.bars.len()
    }

    fn bar(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    fn is_complete(&self, index: usize) -> bool {
        if index >= self.bars.len() {
            return false;
        }
        !(self.last_forming && index == self.bars.len() - 1)
    }

    fn find_index_by_timestamp(&self, instant: DateTime<Utc>) -> Option<usize> {
        self.bars
            .binary_search_by_key(&instant, |b| b.start_time)
            .ok()
    }

    fn native_bar_interval_minutes(&self) -> u32 {
        self.interval_minutes
    }
}

/// Infer the bar interval from the most common span among the leading bars.
/// Spans of 23 hours or more round to whole days.
pub fn infer_interval_minutes(bars: &[Bar]) -> u32 {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for bar in bars.iter().take(INTERVAL_SAMPLE_BARS) {
        let span = (bar.end_time - bar.start_time).num_minutes().max(0) as u32;
        *counts.entry(span).or_insert(0) += 1;
    }
    let span = counts
        .into_iter()
        .max_by_key(|&(span, count)| (count, span))
        .map_or(0, |(span, _)| span);

    if span >= MIN_DAILY_SPAN_MINUTES {
        let days = (span + DAILY_INTERVAL_MINUTES / 2) / DAILY_INTERVAL_MINUTES;
        days.max(1) * DAILY_INTERVAL_MINUTES
    } else {
        span
    }
}

/// Load bars from a CSV file with `start_time,end_time,open,high,low,close` columns (RFC 3339 times)
pub fn load_bars_csv(path: &Path) -> Result<Vec<Bar>> {
    let file = File::open(path).with_context(|| format!("Failed to open bar file: {:?}", path))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let mut bars: Vec<Bar> = Vec::new();
    for (line, result) in reader.deserialize().enumerate() {
        let bar: Bar = result.with_context(|| format!("Failed to parse bar row {}", line + 1))?;
        if let Some(prev) = bars.last() {
            if bar.start_time <= prev.start_time {
                bail!(
                    "Bars are not sorted by start time (row {}: {} after {})",
                    line + 1,
                    bar.start_time,
                    prev.start_time
                );
            }
        }
        bars.push(bar);
    }

    tracing::debug!("Loaded {} bars from {:?}", bars.len(), path);
    Ok(bars)
}

/// Write bars in the format read by [`load_bars_csv`]
pub fn write_bars_csv(path: &Path, bars: &[Bar]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create bar file: {:?}", path))?;
    for bar in bars {
        writer.serialize(bar)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hourly(n: usize) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let start = t0 + Duration::hours(i as i64);
                Bar {
                    start_time: start,
                    end_time: start + Duration::hours(1),
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close: 1.0 + i as f64,
                }
            })
            .collect()
    }

    #[test]
    fn test_find_index_exact_match_only() {
        let series = VecSeries::from_bars(hourly(5), 60);
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 3, 0, 0).unwrap();
        assert_eq!(series.find_index_by_timestamp(t), Some(3));
        assert_eq!(series.find_index_by_timestamp(t + Duration::minutes(1)), None);
    }

    #[test]
    fn test_forming_bar_is_not_complete() {
        let mut series = VecSeries::from_bars(hourly(3), 60);
        assert!(series.is_complete(2));
        series.set_last_forming(true);
        assert!(!series.is_complete(2));
        assert!(series.is_complete(1));
        assert!(!series.is_complete(7));
    }

    #[test]
    fn test_chart_mode() {
        assert_eq!(ChartMode::from_interval_minutes(60), ChartMode::Intraday);
        assert_eq!(ChartMode::from_interval_minutes(1440), ChartMode::Daily);
        assert_eq!(infer_interval_minutes(&hourly(2)), 60);
    }

    #[test]
    fn test_interval_ignores_odd_first_bar() {
        let mut bars = hourly(6);
        bars[0].start_time = bars[0].end_time - Duration::minutes(35);
        assert_eq!(infer_interval_minutes(&bars), 60);
        assert_eq!(infer_interval_minutes(&[]), 0);
    }

    #[test]
    fn test_daily_interval_across_dst() {
        // Daily bars at New York midnight around the 2024 spring-forward and fall-back days
        let day = |start: (u32, u32, u32), end: (u32, u32, u32)| Bar {
            start_time: Utc.with_ymd_and_hms(2024, start.0, start.1, start.2, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, end.0, end.1, end.2, 0, 0).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
        };
        let spring = day((3, 10, 5), (3, 11, 4));
        let fall = day((11, 3, 4), (11, 4, 5));
        assert_eq!(infer_interval_minutes(&[spring.clone()]), 1440);
        assert_eq!(infer_interval_minutes(&[fall]), 1440);
        assert_eq!(
            ChartMode::from_interval_minutes(infer_interval_minutes(&[spring])),
            ChartMode::Daily
        );
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        let bars = hourly(4);
        write_bars_csv(&path, &bars).unwrap();
        let loaded = load_bars_csv(&path).unwrap();
        assert_eq!(loaded, bars);
    }
}
