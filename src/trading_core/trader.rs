//! Session Reversal Strategy
//!
//! Host-facing orchestration. The host feed drives [`BarHandler`] callbacks;
//! each completed bar flows through the detector and the position state
//! machine, and the resulting transitions are dispatched to the
//! [`OrderExecutor`] and journaled.
//!
//! Per bar:
//! 1. Follow the executor's position sign, then widen the open leg's adverse excursion
//! 2. Detect a session-close extremum and forward annotations
//! 3. Open / reverse on an emitted signal
//! 4. Re-sync with the executor and check the stop-loss against live bid/ask

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use super::bars::{Bar, BarSeries, ChartMode, VecSeries};
use super::error::SignalError;
use super::extrema::{sessions_back_for, ExtremaWindow};
use super::journal::{TradeJournal, TradeRecord};
use super::session::SessionClock;
use super::signals::{Detection, SignalDetector};
use super::state_machine::{ClosedLeg, Direction, PositionAction, PositionStateMachine, Transition};
use crate::execution::{AnnotationSink, OrderExecutor, PaperBroker, StrategyConfig};

/// Intraday intervals the session-close window is tuned for
pub const SUPPORTED_INTRADAY_INTERVALS: [u32; 8] = [1, 2, 5, 10, 15, 20, 30, 60];

/// Capability the host feed invokes
pub trait BarHandler {
    /// Start a run on a feed with the given native bar interval
    fn on_activate(&mut self, bar_interval_minutes: u32) -> Result<(), SignalError>;

    /// Evaluate bar `index`; returns the position actions taken
    fn on_bar(&mut self, series: &dyn BarSeries, index: usize) -> Vec<PositionAction>;

    fn on_deactivate(&mut self);
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub bars_evaluated: u64,
    pub signals_emitted: u32,
    pub signals_suppressed: u32,
    /// Bars skipped during warm-up
    pub bars_skipped: u32,
    pub opens: u32,
    pub reversals: u32,
    pub stop_losses: u32,
    pub journal_rows: u32,
    pub journal_failures: u32,
    /// Times the strategy adopted the executor's position sign
    pub position_syncs: u32,
    pub realized_pnl: f64,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bars: {} | Signals: {} ({} suppressed) | Opens: {} | Reversals: {} | Stops: {} | Journal rows: {} | P&L: {:.2}",
            self.bars_evaluated,
            self.signals_emitted,
            self.signals_suppressed,
            self.opens,
            self.reversals,
            self.stop_losses,
            self.journal_rows,
            self.realized_pnl
        )
    }
}

pub struct SessionReversalStrategy<E: OrderExecutor, A: AnnotationSink> {
    symbol: String,
    config: StrategyConfig,
    detector: Option<SignalDetector>,
    machine: PositionStateMachine,
    journal: Option<TradeJournal>,
    executor: E,
    sink: A,
    summary: RunSummary,
}

impl<E: OrderExecutor, A: AnnotationSink> SessionReversalStrategy<E, A> {
    pub fn new(symbol: &str, config: StrategyConfig, executor: E, sink: A) -> Result<Self, SignalError> {
        config.validate()?;
        let machine = PositionStateMachine::new(config.position_size, config.stop_loss_points);
        Ok(Self {
            symbol: symbol.to_string(),
            config,
            detector: None,
            machine,
            journal: None,
            executor,
            sink,
            summary: RunSummary::default(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn machine(&self) -> &PositionStateMachine {
        &self.machine
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Mutable executor access, e.g. to push quotes into a paper broker
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal.as_ref().map(|j| j.path())
    }

    /// Activate with an explicit activation time (names the journal file)
    pub fn activate_at(&mut self, bar_interval_minutes: u32, now: DateTime<Utc>) -> Result<(), SignalError> {
        if let Err(e) = self.machine.activate(bar_interval_minutes) {
            warn!("{}: activation failed: {}", self.symbol, e);
            self.detector = None;
            return Err(e);
        }

        let mode = ChartMode::from_interval_minutes(bar_interval_minutes);
        if sessions_back_for(mode, self.config.lookback_sessions) < 1 {
            warn!(
                "{}: lookback of {} sessions leaves no prior session on {} bars",
                self.symbol, self.config.lookback_sessions, mode
            );
            self.machine.deactivate();
            self.detector = None;
            return Err(SignalError::Configuration(format!(
                "lookback_sessions {} too short for {} bars",
                self.config.lookback_sessions, mode
            )));
        }
        if mode == ChartMode::Intraday && !SUPPORTED_INTRADAY_INTERVALS.contains(&bar_interval_minutes) {
            warn!(
                "{}: {} minute bars are not a supported chart interval ({:?})",
                self.symbol, bar_interval_minutes, SUPPORTED_INTRADAY_INTERVALS
            );
        }

        let clock = SessionClock::new(
            self.config.session_close_hour,
            self.config.session_close_minute,
            self.config.tz()?,
            bar_interval_minutes,
        )?;
        let window = ExtremaWindow::new(clock, self.config.extrema_mode);
        self.detector = Some(SignalDetector::new(self.config.detector_config(), window));

        let journal = TradeJournal::for_activation(
            &self.config.journal_dir,
            now,
            &self.symbol,
            self.config.journal_drawdown,
        );
        info!(
            "{}: activated on {} minute {} bars, lookback {} sessions, close {:02}:{:02} {}, journal {:?}",
            self.symbol,
            bar_interval_minutes,
            mode,
            self.config.lookback_sessions,
            self.config.session_close_hour,
            self.config.session_close_minute,
            self.config.timezone,
            journal.path()
        );
        self.journal = Some(journal);
        Ok(())
    }

    fn dispatch(&mut self, transition: Transition) -> Option<PositionAction> {
        if transition.action == PositionAction::NoAction {
            return None;
        }

        if let Some(leg) = transition.closed {
            let pnl = self.executor.close_at_market();
            self.summary.realized_pnl += pnl;
            self.record_leg(&leg, pnl);
        }

        match transition.opened {
            Some(Direction::Long) => self.executor.open_long(self.config.position_size),
            Some(Direction::Short) => self.executor.open_short(self.config.position_size),
            None => {}
        }

        match transition.action {
            PositionAction::OpenLong | PositionAction::OpenShort => self.summary.opens += 1,
            PositionAction::ReverseToLong | PositionAction::ReverseToShort => self.summary.reversals += 1,
            PositionAction::StopLossClose => self.summary.stop_losses += 1,
            PositionAction::NoAction => {}
        }

        let position = self.machine.position();
        info!(
            "{}: {} | position {} @ {:.5} | realized {:.2}",
            self.symbol,
            transition.action,
            position.direction.map_or("FLAT".to_string(), |d| d.to_string()),
            position.entry_price,
            self.summary.realized_pnl
        );

        if self.executor.current_position_sign() != position.sign() {
            warn!(
                "{}: executor position sign {} disagrees with strategy sign {}",
                self.symbol,
                self.executor.current_position_sign(),
                position.sign()
            );
        }
        Some(transition.action)
    }

    /// Align the machine with the executor before deciding on a transition
    fn sync_with_executor(&mut self, bar: &Bar) {
        let sign = self.executor.current_position_sign();
        let before = self.machine.position().sign();
        if self.machine.sync_position(sign, bar.close, bar.end_time) {
            self.summary.position_syncs += 1;
            warn!(
                "{}: executor holds sign {} while strategy held {}, following executor",
                self.symbol, sign, before
            );
        }
    }

    fn record_leg(&mut self, leg: &ClosedLeg, realized_pnl: f64) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        let record = TradeRecord {
            close_time: leg.exit_time,
            symbol: self.symbol.clone(),
            direction: leg.direction,
            size: leg.size,
            entry_price: leg.entry_price,
            exit_price: leg.exit_price,
            realized_pnl,
            drawdown: leg.drawdown,
        };
        match journal.record(&record) {
            Ok(()) => self.summary.journal_rows += 1,
            Err(e) => {
                self.summary.journal_failures += 1;
                warn!("{}: failed to journal {} leg: {}", self.symbol, leg.direction, e);
            }
        }
    }
}

impl<E: OrderExecutor, A: AnnotationSink> BarHandler for SessionReversalStrategy<E, A> {
    fn on_activate(&mut self, bar_interval_minutes: u32) -> Result<(), SignalError> {
        self.activate_at(bar_interval_minutes, Utc::now())
    }

    fn on_bar(&mut self, series: &dyn BarSeries, index: usize) -> Vec<PositionAction> {
        let mut actions = Vec::new();
        if !self.machine.is_active() || self.detector.is_none() || !series.is_complete(index) {
            return actions;
        }
        let Some(bar) = series.bar(index) else {
            return actions;
        };

        self.summary.bars_evaluated += 1;
        self.sync_with_executor(bar);
        self.machine.track_excursion(bar);

        let outcome = match self.detector.as_mut() {
            Some(detector) => detector.on_bar(series, index),
            None => return actions,
        };
        for annotation in &outcome.annotations {
            self.sink.apply(annotation);
        }

        match &outcome.detection {
            Detection::Emitted(event) => {
                self.summary.signals_emitted += 1;
                info!(
                    "{}: {} signal at {} close {:.5} (prior low {:.5} high {:.5})",
                    self.symbol,
                    event.signal,
                    event.bar_end_time,
                    event.close,
                    event.extrema.low,
                    event.extrema.high
                );
                let transition = self.machine.on_signal(event.signal, event.close, event.bar_end_time);
                actions.extend(self.dispatch(transition));
            }
            Detection::Suppressed(_) => self.summary.signals_suppressed += 1,
            Detection::Skipped(e) => {
                self.summary.bars_skipped += 1;
                if !e.is_recoverable() {
                    warn!("{}: bar {} produced no extrema: {}", self.symbol, index, e);
                }
            }
            Detection::Incomplete | Detection::OutsideWindow | Detection::NoBreak(_) => {}
        }

        self.sync_with_executor(bar);
        let bid = self.executor.current_bid_price();
        let ask = self.executor.current_ask_price();
        let transition = self.machine.check_stop_loss(bid, ask, bar.close, bar.end_time);
        if transition.action == PositionAction::StopLossClose {
            debug!("{}: stop breached, bid {:.5} ask {:.5}", self.symbol, bid, ask);
        }
        actions.extend(self.dispatch(transition));

        actions
    }

    fn on_deactivate(&mut self) {
        self.machine.deactivate();
        self.detector = None;
        info!("{}: deactivated | {}", self.symbol, self.summary);
    }
}

/// Feed bars one at a time through a paper-traded strategy, growing the series
/// the way a live feed does. Returns every position action taken.
pub fn replay_bars<A: AnnotationSink>(
    strategy: &mut SessionReversalStrategy<PaperBroker, A>,
    bars: &[Bar],
    interval_minutes: u32,
) -> Vec<PositionAction> {
    let mut series = VecSeries::new(interval_minutes);
    let mut actions = Vec::new();
    for bar in bars {
        strategy.executor_mut().update_quote(bar.close, bar.end_time);
        series.push(bar.clone());
        let index = series.bar_count() - 1;
        actions.extend(strategy.on_bar(&series, index));
    }
    actions
}
