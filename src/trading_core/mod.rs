//! Trading Core - session-close reversal logic
//!
//! This module contains the core strategy components:
//! - Bar feed abstraction and in-memory series
//! - Session clock (timezone-aware session-close resolution)
//! - Extrema window over prior session closes
//! - Signal detection and deduplication
//! - Position state machine
//! - Trade journal
//! - Host-facing strategy orchestration
//! - Synthetic bar generation for replays

pub mod bars;
pub mod error;
pub mod session;
pub mod extrema;
pub mod signals;
pub mod state_machine;
pub mod journal;
pub mod trader;
pub mod synthetic;

// Re-export commonly used types
pub use bars::{Bar, BarSeries, ChartMode, VecSeries};
pub use error::{JournalError, SignalError};
pub use session::SessionClock;
pub use extrema::{ExtremaMode, ExtremaResult, ExtremaWindow};
pub use signals::{Annotation, Coordinate, Detection, Signal, SignalDetector, SignalEvent, SignalState};
pub use state_machine::{Activation, Direction, Position, PositionAction, PositionStateMachine};
pub use journal::{TradeJournal, TradeRecord};
pub use trader::{BarHandler, RunSummary, SessionReversalStrategy};
pub use synthetic::SyntheticBarGenerator;
