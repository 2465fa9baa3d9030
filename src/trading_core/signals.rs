//! Session-close signal detection
//!
//! Per completed bar:
//! 1. Check the near-session-close window (always open on daily charts)
//! 2. Compute prior-session extrema
//! 3. Classify the close as a new LOW / new HIGH
//! 4. Suppress repeats of the last signal when configured
//!
//! Emissions also produce annotation events (marker + price label) for the
//! host to render; a marker placed within the look-ahead window of the
//! previous one supersedes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::bars::{Bar, BarSeries, ChartMode};
use super::error::SignalError;
use super::extrema::{sessions_back_for, ExtremaResult, ExtremaWindow};

/// Classified session-close signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Signal {
    #[default]
    None,
    /// Close below the lowest prior session close
    Low,
    /// Close above the highest prior session close
    High,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::None => write!(f, "NONE"),
            Signal::Low => write!(f, "LOW"),
            Signal::High => write!(f, "HIGH"),
        }
    }
}

/// Classify a close against the prior-session extrema
pub fn classify(close: f64, extrema: &ExtremaResult) -> Signal {
    if close < extrema.low {
        Signal::Low
    } else if close > extrema.high {
        Signal::High
    } else {
        Signal::None
    }
}

/// Deduplication state, persisted across bars of one chart
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalState {
    pub last_signal: Signal,
    pub last_signal_time: Option<DateTime<Utc>>,
}

/// Chart position of an annotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub time: DateTime<Utc>,
    pub price: f64,
}

/// Rendering events for the host's annotation layer
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Marker { at: Coordinate, kind: Signal },
    Label { at: Coordinate, text: String },
    RemoveLastMarkerAndLabel,
    SessionBoundary { time: DateTime<Utc> },
}

/// A signal that passed deduplication
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub signal: Signal,
    pub bar_index: usize,
    pub close: f64,
    pub bar_end_time: DateTime<Utc>,
    pub extrema: ExtremaResult,
}

/// What happened to a bar
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Bar still forming
    Incomplete,
    /// Not near the session close
    OutsideWindow,
    /// Extrema could not be computed (warm-up); retried on the next bar
    Skipped(SignalError),
    /// Close within the prior range
    NoBreak(ExtremaResult),
    /// Repeat of the last signal, dropped
    Suppressed(Signal),
    Emitted(SignalEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarOutcome {
    pub detection: Detection,
    pub annotations: Vec<Annotation>,
}

impl BarOutcome {
    fn bare(detection: Detection) -> Self {
        Self {
            detection,
            annotations: Vec::new(),
        }
    }

    pub fn event(&self) -> Option<&SignalEvent> {
        match &self.detection {
            Detection::Emitted(event) => Some(event),
            _ => None,
        }
    }
}

/// Detector options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub lookback_sessions: usize,
    pub look_ahead_minutes: u32,
    pub omit_consecutive: bool,
    pub show_session_boundary: bool,
}

pub struct SignalDetector {
    config: DetectorConfig,
    window: ExtremaWindow,
    state: SignalState,
    last_annotation_time: Option<DateTime<Utc>>,
    first_effective_day_seen: bool,
}

impl SignalDetector {
    pub fn new(config: DetectorConfig, window: ExtremaWindow) -> Self {
        Self {
            config,
            window,
            state: SignalState::default(),
            last_annotation_time: None,
            first_effective_day_seen: false,
        }
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    /// Forget signal history (new instrument or data series)
    pub fn reset(&mut self) {
        self.state = SignalState::default();
        self.last_annotation_time = None;
        self.first_effective_day_seen = false;
    }

    /// Evaluate one bar of the series
    pub fn on_bar<S: BarSeries + ?Sized>(&mut self, series: &S, index: usize) -> BarOutcome {
        if !series.is_complete(index) {
            return BarOutcome::bare(Detection::Incomplete);
        }
        let Some(bar) = series.bar(index) else {
            return BarOutcome::bare(Detection::Incomplete);
        };

        let clock = *self.window.clock();
        let mode = ChartMode::from_interval_minutes(series.native_bar_interval_minutes());
        let mut annotations = Vec::new();

        if self.config.show_session_boundary
            && mode == ChartMode::Intraday
            && clock.is_session_close_bar(bar.end_time)
        {
            annotations.push(Annotation::SessionBoundary {
                time: bar.start_time,
            });
        }

        let in_window = mode == ChartMode::Daily
            || clock.is_near_close(bar.end_time, self.config.look_ahead_minutes);
        if !in_window {
            return BarOutcome {
                detection: Detection::OutsideWindow,
                annotations,
            };
        }

        let sessions_back = sessions_back_for(mode, self.config.lookback_sessions);
        let extrema = match self.window.compute_extrema(series, index, sessions_back) {
            Ok(extrema) => extrema,
            Err(e) => {
                debug!("Bar {} skipped: {}", index, e);
                return BarOutcome {
                    detection: Detection::Skipped(e),
                    annotations,
                };
            }
        };

        if !self.first_effective_day_seen {
            self.first_effective_day_seen = true;
            info!(
                "First effective trading day is: {}",
                clock.local_date(bar.end_time).format("%m/%d/%Y")
            );
        }

        let candidate = classify(bar.close, &extrema);
        if candidate == Signal::None {
            return BarOutcome {
                detection: Detection::NoBreak(extrema),
                annotations,
            };
        }

        if self.config.omit_consecutive && candidate == self.state.last_signal {
            debug!(
                "{}: consecutive {} at {:.5} suppressed",
                bar.end_time, candidate, bar.close
            );
            return BarOutcome {
                detection: Detection::Suppressed(candidate),
                annotations,
            };
        }

        self.state.last_signal = candidate;
        self.state.last_signal_time = Some(bar.end_time);
        annotations.extend(self.annotate(candidate, bar));

        BarOutcome {
            detection: Detection::Emitted(SignalEvent {
                signal: candidate,
                bar_index: index,
                close: bar.close,
                bar_end_time: bar.end_time,
                extrema,
            }),
            annotations,
        }
    }

    fn annotate(&mut self, signal: Signal, bar: &Bar) -> Vec<Annotation> {
        let mut out = Vec::with_capacity(3);

        if let Some(last) = self.last_annotation_time {
            let elapsed = (bar.end_time - last).num_minutes();
            if elapsed <= i64::from(self.config.look_ahead_minutes) {
                out.push(Annotation::RemoveLastMarkerAndLabel);
            }
        }

        let (price, text) = match signal {
            Signal::Low => (bar.low, format!("Low: {:.5}", bar.close)),
            _ => (bar.high, format!("High: {:.5}", bar.close)),
        };
        let at = Coordinate {
            time: bar.start_time,
            price,
        };
        out.push(Annotation::Marker { at, kind: signal });
        out.push(Annotation::Label { at, text });

        self.last_annotation_time = Some(bar.end_time);
        out
    }
}
