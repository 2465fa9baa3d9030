// Library crate - session-close reversal strategy core and execution seams

pub mod trading_core;
pub mod execution;

// Re-export commonly used types
pub use trading_core::{BarHandler, RunSummary, SessionReversalStrategy, Signal, SignalError};
pub use execution::{AnnotationSink, OrderExecutor, PaperBroker, StrategyConfig};
