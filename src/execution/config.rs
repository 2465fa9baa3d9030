//! Run configuration for the session reversal strategy

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::trading_core::error::SignalError;
use crate::trading_core::extrema::ExtremaMode;
use crate::trading_core::signals::DetectorConfig;

/// Maximum look-ahead before session close, in minutes
pub const MAX_LOOK_AHEAD_MINUTES: u32 = 120;

/// Configuration for one instrument/chart run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Number of prior sessions whose closes form the extrema
    pub lookback_sessions: usize,

    /// Session close hour in `timezone` (24h)
    pub session_close_hour: u32,

    /// Session close minute
    pub session_close_minute: u32,

    /// IANA name of the reference timezone
    pub timezone: String,

    /// Minutes before session close during which intraday bars are evaluated
    pub look_ahead_minutes: u32,

    /// Units per order
    pub position_size: u32,

    /// Stop distance in price units; `None` disables the stop-loss
    pub stop_loss_points: Option<f64>,

    /// Emit a boundary annotation on session close bars
    pub show_session_boundary: bool,

    /// Drop a signal equal to the previous one
    pub omit_consecutive_signals: bool,

    /// Journal carries the DRAW DOWN column
    pub journal_drawdown: bool,

    /// Directory for trade journals
    pub journal_dir: PathBuf,

    /// How intraday session closes are located
    pub extrema_mode: ExtremaMode,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            lookback_sessions: 10,
            session_close_hour: 17,
            session_close_minute: 0,
            timezone: "America/New_York".to_string(),
            look_ahead_minutes: 60,
            position_size: 10_000,
            stop_loss_points: Some(50.0),
            show_session_boundary: true,
            omit_consecutive_signals: true,
            journal_drawdown: true,
            journal_dir: PathBuf::from("."),
            extrema_mode: ExtremaMode::SessionClock,
        }
    }
}

impl StrategyConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn tz(&self) -> Result<Tz, SignalError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| SignalError::Configuration(format!("unknown timezone {}: {}", self.timezone, e)))
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.lookback_sessions < 1 {
            return Err(SignalError::Configuration(
                "lookback_sessions must be at least 1".to_string(),
            ));
        }
        if self.session_close_hour > 23 || self.session_close_minute > 59 {
            return Err(SignalError::Configuration(format!(
                "invalid session close {:02}:{:02}",
                self.session_close_hour, self.session_close_minute
            )));
        }
        if self.look_ahead_minutes > MAX_LOOK_AHEAD_MINUTES {
            return Err(SignalError::Configuration(format!(
                "look_ahead_minutes must be 0..={}, got {}",
                MAX_LOOK_AHEAD_MINUTES, self.look_ahead_minutes
            )));
        }
        if self.position_size < 1 {
            return Err(SignalError::Configuration(
                "position_size must be at least 1".to_string(),
            ));
        }
        if let Some(stop) = self.stop_loss_points {
            if !stop.is_finite() || stop < 0.0 {
                return Err(SignalError::Configuration(format!(
                    "stop_loss_points must be a non-negative price distance, got {}",
                    stop
                )));
            }
        }
        self.tz()?;
        Ok(())
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            lookback_sessions: self.lookback_sessions,
            look_ahead_minutes: self.look_ahead_minutes,
            omit_consecutive: self.omit_consecutive_signals,
            show_session_boundary: self.show_session_boundary,
        }
    }
}
