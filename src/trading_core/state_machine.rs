//! Position State Machine
//!
//! FLAT / LONG / SHORT driven by session-close extremum signals:
//! - FLAT + LOW  -> open long,  FLAT + HIGH -> open short
//! - LONG + HIGH -> reverse to short, SHORT + LOW -> reverse to long
//! - aligned signals are no-ops
//!
//! A stop-loss check runs on every bar against live bid/ask and closes to
//! FLAT without re-opening. Order dispatch and journaling are done by the
//! caller from the returned [`Transition`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bars::Bar;
use super::error::SignalError;
use super::signals::Signal;

/// Side of an open leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(&self) -> i8 {
        match self {
            Self::Long => 1,
            Self::Short => -1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Current position; `direction == None` is FLAT
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub direction: Option<Direction>,
    pub size: u32,
    pub entry_price: f64,
    pub entry_time: Option<DateTime<Utc>>,
    /// Maximum adverse excursion in price units while the leg is open
    pub drawdown: f64,
}

impl Position {
    /// -1 short, 0 flat, +1 long
    pub fn sign(&self) -> i8 {
        self.direction.map(|d| d.sign()).unwrap_or(0)
    }

    pub fn is_flat(&self) -> bool {
        self.direction.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionAction {
    OpenLong,
    OpenShort,
    ReverseToLong,
    ReverseToShort,
    StopLossClose,
    NoAction,
}

impl std::fmt::Display for PositionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenLong => write!(f, "OPEN_LONG"),
            Self::OpenShort => write!(f, "OPEN_SHORT"),
            Self::ReverseToLong => write!(f, "REVERSE_TO_LONG"),
            Self::ReverseToShort => write!(f, "REVERSE_TO_SHORT"),
            Self::StopLossClose => write!(f, "STOP_LOSS_CLOSE"),
            Self::NoAction => write!(f, "NO_ACTION"),
        }
    }
}

/// A leg that was closed by a reversal or stop-loss
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedLeg {
    pub direction: Direction,
    pub size: u32,
    pub entry_price: f64,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub drawdown: f64,
}

/// Result of feeding an event to the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub action: PositionAction,
    /// Leg to close before any new leg is opened
    pub closed: Option<ClosedLeg>,
    /// Leg opened by this transition
    pub opened: Option<Direction>,
}

impl Transition {
    fn none() -> Self {
        Self {
            action: PositionAction::NoAction,
            closed: None,
            opened: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Inactive,
    Active,
}

pub struct PositionStateMachine {
    position: Position,
    size: u32,
    stop_loss_points: Option<f64>,
    activation: Activation,
}

impl PositionStateMachine {
    pub fn new(size: u32, stop_loss_points: Option<f64>) -> Self {
        Self {
            position: Position::default(),
            size,
            stop_loss_points,
            activation: Activation::Inactive,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn is_active(&self) -> bool {
        self.activation == Activation::Active
    }

    /// Activate for a feed; bars without a time-based interval are rejected
    pub fn activate(&mut self, bar_interval_minutes: u32) -> Result<(), SignalError> {
        if bar_interval_minutes == 0 {
            self.activation = Activation::Inactive;
            return Err(SignalError::Configuration(
                "wrong bar type - must run on minute or hour bars".to_string(),
            ));
        }
        self.activation = Activation::Active;
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.activation = Activation::Inactive;
    }

    /// React to a classified session-close extremum at `price`
    pub fn on_signal(&mut self, signal: Signal, price: f64, time: DateTime<Utc>) -> Transition {
        if !self.is_active() {
            return Transition::none();
        }

        let target = match signal {
            Signal::Low => Direction::Long,
            Signal::High => Direction::Short,
            Signal::None => return Transition::none(),
        };

        match self.position.direction {
            None => {
                self.open(target, price, time);
                Transition {
                    action: match target {
                        Direction::Long => PositionAction::OpenLong,
                        Direction::Short => PositionAction::OpenShort,
                    },
                    closed: None,
                    opened: Some(target),
                }
            }
            Some(current) if current == target => Transition::none(),
            Some(_) => {
                let closed = self.close(price, time);
                self.open(target, price, time);
                Transition {
                    action: match target {
                        Direction::Long => PositionAction::ReverseToLong,
                        Direction::Short => PositionAction::ReverseToShort,
                    },
                    closed,
                    opened: Some(target),
                }
            }
        }
    }

    /// Close the open leg when live prices breach the stop distance.
    ///
    /// Long legs compare the bid, short legs the ask. The leg is recorded at
    /// `exit_price`.
    pub fn check_stop_loss(
        &mut self,
        bid: f64,
        ask: f64,
        exit_price: f64,
        time: DateTime<Utc>,
    ) -> Transition {
        if !self.is_active() {
            return Transition::none();
        }
        let Some(stop) = self.stop_loss_points else {
            return Transition::none();
        };

        let breached = match self.position.direction {
            Some(Direction::Long) => bid < self.position.entry_price - stop,
            Some(Direction::Short) => ask > self.position.entry_price + stop,
            None => false,
        };
        if !breached {
            return Transition::none();
        }

        Transition {
            action: PositionAction::StopLossClose,
            closed: self.close(exit_price, time),
            opened: None,
        }
    }

    /// Adopt the executor's position sign when it disagrees with ours.
    ///
    /// A flat executor drops the leg without closing it (nothing to journal);
    /// a held position we do not know about is taken on at `price`. Returns
    /// true when the position changed.
    pub fn sync_position(&mut self, executor_sign: i8, price: f64, time: DateTime<Utc>) -> bool {
        if executor_sign.signum() == self.position.sign() {
            return false;
        }
        match executor_sign.signum() {
            0 => self.position = Position::default(),
            1 => self.open(Direction::Long, price, time),
            _ => self.open(Direction::Short, price, time),
        }
        true
    }

    /// Widen the adverse excursion of the open leg with a bar's range.
    /// The bar that opened the leg is not counted.
    pub fn track_excursion(&mut self, bar: &Bar) {
        let Some(direction) = self.position.direction else {
            return;
        };
        if self
            .position
            .entry_time
            .map_or(false, |entry| bar.end_time <= entry)
        {
            return;
        }

        let adverse = match direction {
            Direction::Long => self.position.entry_price - bar.low,
            Direction::Short => bar.high - self.position.entry_price,
        };
        if adverse > self.position.drawdown {
            self.position.drawdown = adverse;
        }
    }

    fn open(&mut self, direction: Direction, price: f64, time: DateTime<Utc>) {
        self.position = Position {
            direction: Some(direction),
            size: self.size,
            entry_price: price,
            entry_time: Some(time),
            drawdown: 0.0,
        };
    }

    fn close(&mut self, price: f64, time: DateTime<Utc>) -> Option<ClosedLeg> {
        let direction = self.position.direction?;
        let leg = ClosedLeg {
            direction,
            size: self.position.size,
            entry_price: self.position.entry_price,
            entry_time: self.position.entry_time,
            exit_price: price,
            exit_time: time,
            drawdown: self.position.drawdown,
        };
        self.position = Position::default();
        Some(leg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn active(stop: Option<f64>) -> PositionStateMachine {
        let mut sm = PositionStateMachine::new(10_000, stop);
        sm.activate(60).unwrap();
        sm
    }

    #[test]
    fn test_activation_requires_time_bars() {
        let mut sm = PositionStateMachine::new(1, None);
        assert!(matches!(sm.activate(0), Err(SignalError::Configuration(_))));
        assert_eq!(sm.activation(), Activation::Inactive);
        assert_eq!(sm.on_signal(Signal::Low, 1.0, t(0)).action, PositionAction::NoAction);
        assert!(sm.position().is_flat());

        sm.activate(5).unwrap();
        assert!(sm.is_active());
        sm.deactivate();
        assert!(!sm.is_active());
    }

    #[test]
    fn test_flat_low_opens_long() {
        let mut sm = active(None);
        let tr = sm.on_signal(Signal::Low, 8.5, t(1));
        assert_eq!(tr.action, PositionAction::OpenLong);
        assert!(tr.closed.is_none());
        assert_eq!(sm.position().sign(), 1);
        assert_eq!(sm.position().entry_price, 8.5);
        assert_eq!(sm.position().entry_time, Some(t(1)));
        assert_eq!(sm.position().size, 10_000);
    }

    #[test]
    fn test_flat_high_opens_short() {
        let mut sm = active(None);
        assert_eq!(
            sm.on_signal(Signal::High, 12.0, t(1)).action,
            PositionAction::OpenShort
        );
        assert_eq!(sm.position().sign(), -1);
    }

    #[test]
    fn test_aligned_signals_are_noops() {
        let mut sm = active(None);
        sm.on_signal(Signal::High, 12.0, t(1));
        let before = *sm.position();
        let tr = sm.on_signal(Signal::High, 13.0, t(2));
        assert_eq!(tr.action, PositionAction::NoAction);
        assert_eq!(*sm.position(), before);

        let mut sm = active(None);
        sm.on_signal(Signal::Low, 8.0, t(1));
        assert_eq!(
            sm.on_signal(Signal::Low, 7.0, t(2)).action,
            PositionAction::NoAction
        );
        assert_eq!(sm.position().entry_price, 8.0);
    }

    #[test]
    fn test_reversal_closes_then_opens() {
        let mut sm = active(None);
        sm.on_signal(Signal::Low, 8.0, t(1));
        let tr = sm.on_signal(Signal::High, 12.0, t(2));
        assert_eq!(tr.action, PositionAction::ReverseToShort);
        assert_eq!(tr.opened, Some(Direction::Short));
        let closed = tr.closed.unwrap();
        assert_eq!(closed.direction, Direction::Long);
        assert_eq!(closed.entry_price, 8.0);
        assert_eq!(closed.exit_price, 12.0);
        assert_eq!(closed.entry_time, Some(t(1)));
        assert_eq!(sm.position().entry_price, 12.0);
        assert_eq!(sm.position().drawdown, 0.0);

        let tr = sm.on_signal(Signal::Low, 9.0, t(3));
        assert_eq!(tr.action, PositionAction::ReverseToLong);
        assert_eq!(tr.closed.unwrap().direction, Direction::Short);
    }

    #[test]
    fn test_long_stop_loss_closes_once() {
        let mut sm = active(Some(50.0));
        sm.on_signal(Signal::Low, 1000.0, t(1));

        // Exactly at the stop distance does not trigger
        let tr = sm.check_stop_loss(950.0, 951.0, 950.5, t(2));
        assert_eq!(tr.action, PositionAction::NoAction);

        let tr = sm.check_stop_loss(949.99, 951.0, 949.5, t(3));
        assert_eq!(tr.action, PositionAction::StopLossClose);
        assert!(tr.opened.is_none());
        let leg = tr.closed.unwrap();
        assert_eq!(leg.direction, Direction::Long);
        assert_eq!(leg.exit_price, 949.5);
        assert!(sm.position().is_flat());

        // Flat afterwards: a second breach does nothing
        let tr = sm.check_stop_loss(900.0, 901.0, 900.0, t(4));
        assert_eq!(tr.action, PositionAction::NoAction);
    }

    #[test]
    fn test_short_stop_loss_uses_ask() {
        let mut sm = active(Some(5.0));
        sm.on_signal(Signal::High, 100.0, t(1));
        assert_eq!(
            sm.check_stop_loss(104.0, 105.0, 104.5, t(2)).action,
            PositionAction::NoAction
        );
        assert_eq!(
            sm.check_stop_loss(104.9, 105.1, 105.0, t(3)).action,
            PositionAction::StopLossClose
        );
    }

    #[test]
    fn test_stop_loss_disabled() {
        let mut sm = active(None);
        sm.on_signal(Signal::Low, 1000.0, t(1));
        assert_eq!(
            sm.check_stop_loss(1.0, 1.0, 1.0, t(2)).action,
            PositionAction::NoAction
        );
    }

    #[test]
    fn test_excursion_tracking() {
        let mut sm = active(None);
        sm.on_signal(Signal::Low, 100.0, t(1));

        let bar = |h: i64, low: f64, high: f64| Bar {
            start_time: t(h - 1),
            end_time: t(h),
            open: 100.0,
            high,
            low,
            close: 100.0,
        };

        // Entry bar itself is ignored
        sm.track_excursion(&bar(1, 90.0, 101.0));
        assert_eq!(sm.position().drawdown, 0.0);

        sm.track_excursion(&bar(2, 97.0, 103.0));
        sm.track_excursion(&bar(3, 98.5, 104.0));
        assert_eq!(sm.position().drawdown, 3.0);

        // Reversal resets the tracker
        let tr = sm.on_signal(Signal::High, 104.0, t(3));
        assert_eq!(tr.closed.unwrap().drawdown, 3.0);
        sm.track_excursion(&bar(4, 100.0, 106.0));
        assert_eq!(sm.position().drawdown, 2.0);
    }

    #[test]
    fn test_sync_follows_executor_sign() {
        let mut sm = active(None);
        assert!(!sm.sync_position(0, 10.0, t(1)));

        sm.on_signal(Signal::Low, 8.5, t(1));
        assert!(!sm.sync_position(1, 9.0, t(2)));
        assert_eq!(sm.position().entry_price, 8.5);

        // Host flattened the leg: no closed leg, next HIGH opens instead of reversing
        assert!(sm.sync_position(0, 9.0, t(2)));
        assert!(sm.position().is_flat());
        assert_eq!(
            sm.on_signal(Signal::High, 13.0, t(3)).action,
            PositionAction::OpenShort
        );

        // Host is long while we think short
        assert!(sm.sync_position(1, 12.0, t(4)));
        assert_eq!(sm.position().sign(), 1);
        assert_eq!(sm.position().entry_price, 12.0);
        assert_eq!(sm.position().entry_time, Some(t(4)));
    }
}
