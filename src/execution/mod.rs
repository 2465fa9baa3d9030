//! Execution side of the session reversal strategy
//!
//! Order execution and chart annotations are host collaborators reached
//! through [`OrderExecutor`] and [`AnnotationSink`]. [`PaperBroker`] and
//! [`MarkerLayer`] are in-process implementations used for replays.

mod config;
mod executor;
mod order;
mod position;

pub use config::{StrategyConfig, MAX_LOOK_AHEAD_MINUTES};
pub use executor::{AnnotationSink, MarkerLayer, OrderExecutor};
pub use order::{Order, OrderSide, OrderState};
pub use position::PaperBroker;
