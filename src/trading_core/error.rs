//! Error kinds for signal computation and trade journaling

use thiserror::Error;

/// Failures while resolving sessions, computing extrema or activating a run.
///
/// None of these are fatal: the worst outcome is that a bar produces no signal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    /// Not enough history to resolve a session close or fill the lookback window.
    /// Normal during warm-up; the bar is skipped and the next bar retries.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Every session resolved but no price was accumulated.
    #[error("calculation error: {0}")]
    CalculationError(String),

    /// Invalid run configuration (e.g. a feed without a time-based bar interval).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SignalError {
    /// Warm-up errors that clear up once more history arrives
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientData(_))
    }
}

/// Failure to append to the trade journal. Logged, never propagated into trading.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal CSV error: {0}")]
    Csv(#[from] csv::Error),
}
