//! Extrema Window
//!
//! Reduces the closing prices of the N most recent prior sessions to a
//! lowest and highest close. Daily charts take the N prior bars directly;
//! intraday charts resolve each session close through the [`SessionClock`]
//! and look the bar up by exact timestamp.

use serde::{Deserialize, Serialize};

use super::bars::{BarSeries, ChartMode};
use super::error::SignalError;
use super::session::SessionClock;

/// Daily charts look back one session less than configured: the bar being
/// evaluated is the still-forming current session and already occupies a slot.
pub const DAILY_FORMING_SESSION_OFFSET: usize = 1;

/// How intraday session closes are located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremaMode {
    /// Resolve each prior close instant via the session clock and look it up exactly
    #[default]
    SessionClock,
    /// Walk back bar by bar counting bars that end at the session close time of day
    BarScan,
}

/// Lowest and highest session close over the lookback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtremaResult {
    pub low: f64,
    pub high: f64,
    /// Number of session closes that contributed
    pub sessions: usize,
}

/// Number of prior sessions to reduce for a configured lookback
pub fn sessions_back_for(mode: ChartMode, lookback_sessions: usize) -> usize {
    match mode {
        ChartMode::Daily => lookback_sessions.saturating_sub(DAILY_FORMING_SESSION_OFFSET),
        ChartMode::Intraday => lookback_sessions,
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    low: Option<f64>,
    high: Option<f64>,
    sessions: usize,
}

impl Accumulator {
    fn push(&mut self, close: f64) {
        self.low = Some(match self.low {
            Some(low) if low <= close => low,
            _ => close,
        });
        self.high = Some(match self.high {
            Some(high) if high >= close => high,
            _ => close,
        });
        self.sessions += 1;
    }

    fn finish(self) -> Result<ExtremaResult, SignalError> {
        match (self.low, self.high) {
            (Some(low), Some(high)) => Ok(ExtremaResult {
                low,
                high,
                sessions: self.sessions,
            }),
            _ => Err(SignalError::CalculationError(
                "no session close could be established".to_string(),
            )),
        }
    }
}

/// Daily series: the session `i` back is simply bar `bar_index - i`
pub fn daily_extrema<S: BarSeries + ?Sized>(
    series: &S,
    bar_index: usize,
    sessions_back: usize,
) -> Result<ExtremaResult, SignalError> {
    if bar_index < sessions_back {
        return Err(SignalError::InsufficientData(format!(
            "need {} prior daily bars, have {}",
            sessions_back, bar_index
        )));
    }

    let mut acc = Accumulator::default();
    for i in 1..=sessions_back {
        let close = series.close(bar_index - i).ok_or_else(|| {
            SignalError::InsufficientData(format!("daily bar {} missing", bar_index - i))
        })?;
        acc.push(close);
    }
    acc.finish()
}

/// Intraday series: resolve each prior session close instant and require an exact bar
pub fn intraday_extrema<S: BarSeries + ?Sized>(
    series: &S,
    bar_index: usize,
    sessions_back: usize,
    clock: &SessionClock,
) -> Result<ExtremaResult, SignalError> {
    let bar = series
        .bar(bar_index)
        .ok_or_else(|| SignalError::InsufficientData(format!("bar {} not in series", bar_index)))?;
    let anchor = clock.local_date(bar.start_time);

    let mut acc = Accumulator::default();
    for i in 1..=sessions_back {
        let instant = clock.resolve_in(series, anchor, i)?;
        let index = series.find_index_by_timestamp(instant).ok_or_else(|| {
            SignalError::InsufficientData(format!("no bar starting at session close {}", instant))
        })?;
        let close = series.close(index).ok_or_else(|| {
            SignalError::InsufficientData(format!("bar {} not in series", index))
        })?;
        acc.push(close);
    }
    acc.finish()
}

/// Walk backwards from the bar before `bar_index`, reducing the closes of bars
/// whose end time of day equals the session close.
pub fn bar_scan_extrema<S: BarSeries + ?Sized>(
    series: &S,
    bar_index: usize,
    sessions_back: usize,
    clock: &SessionClock,
) -> Result<ExtremaResult, SignalError> {
    let close_minutes = clock.close_total_minutes();
    let mut acc = Accumulator::default();

    let mut index = bar_index;
    while acc.sessions < sessions_back {
        if index == 0 {
            return Err(SignalError::InsufficientData(format!(
                "found {} of {} session close bars",
                acc.sessions, sessions_back
            )));
        }
        index -= 1;
        if let Some(bar) = series.bar(index) {
            if clock.local_total_minutes(bar.end_time) == close_minutes {
                acc.push(bar.close);
            }
        }
    }
    acc.finish()
}

/// Session-close extrema over one feed
#[derive(Debug, Clone, Copy)]
pub struct ExtremaWindow {
    clock: SessionClock,
    mode: ExtremaMode,
}

impl ExtremaWindow {
    pub fn new(clock: SessionClock, mode: ExtremaMode) -> Self {
        Self { clock, mode }
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn compute_extrema<S: BarSeries + ?Sized>(
        &self,
        series: &S,
        bar_index: usize,
        sessions_back: usize,
    ) -> Result<ExtremaResult, SignalError> {
        match ChartMode::from_interval_minutes(series.native_bar_interval_minutes()) {
            ChartMode::Daily => daily_extrema(series, bar_index, sessions_back),
            ChartMode::Intraday => match self.mode {
                ExtremaMode::SessionClock => {
                    intraday_extrema(series, bar_index, sessions_back, &self.clock)
                }
                ExtremaMode::BarScan => {
                    bar_scan_extrema(series, bar_index, sessions_back, &self.clock)
                }
            },
        }
    }
}
