//! Paper broker: netting position, market fills at bid/ask and P&L tracking

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::executor::OrderExecutor;
use super::order::{Order, OrderSide};
use crate::trading_core::state_machine::Direction;

/// Simulated executor quoting a fixed spread around the last traded price
#[derive(Debug)]
pub struct PaperBroker {
    /// Symbol being traded
    symbol: String,

    /// Full bid/ask spread in price units
    spread: f64,

    last_price: f64,

    last_time: DateTime<Utc>,

    /// Current net position (positive = long, negative = short)
    net_position: i64,

    /// Average entry price of current position
    avg_entry_price: Option<f64>,

    /// Realized P&L across all closes
    realized_pnl: f64,

    /// Every order sent, filled or rejected
    orders: Vec<Order>,
}

impl PaperBroker {
    pub fn new(symbol: &str, spread: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            spread: spread.max(0.0),
            last_price: 0.0,
            last_time: DateTime::<Utc>::UNIX_EPOCH,
            net_position: 0,
            avg_entry_price: None,
            realized_pnl: 0.0,
            orders: Vec::new(),
        }
    }

    /// Move the quote to a new last price
    pub fn update_quote(&mut self, last_price: f64, time: DateTime<Utc>) {
        self.last_price = last_price;
        self.last_time = time;
    }

    pub fn net_position(&self) -> i64 {
        self.net_position
    }

    pub fn is_flat(&self) -> bool {
        self.net_position == 0
    }

    pub fn avg_entry_price(&self) -> Option<f64> {
        self.avg_entry_price
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Mark-to-market P&L of the open position at the closing side of the quote
    pub fn unrealized_pnl(&self) -> f64 {
        match self.avg_entry_price {
            Some(entry) if self.net_position > 0 => {
                (self.current_bid_price() - entry) * self.net_position as f64
            }
            Some(entry) if self.net_position < 0 => {
                (self.current_ask_price() - entry) * self.net_position as f64
            }
            _ => 0.0,
        }
    }

    /// Fill a market order against the current quote and return the realized P&L.
    /// Zero-quantity orders are rejected and leave the position unchanged.
    fn fill(&mut self, side: OrderSide, quantity: u32) -> f64 {
        let mut order = Order::market(&self.symbol, side, quantity, self.last_time);
        if quantity == 0 {
            order.reject();
            warn!("{}: rejected {} order with zero quantity", self.symbol, side);
            self.orders.push(order);
            return 0.0;
        }

        let price = match side {
            OrderSide::Buy => self.current_ask_price(),
            OrderSide::Sell => self.current_bid_price(),
        };
        order.record_fill(price, self.last_time);
        let signed_qty = order.signed_quantity();

        let mut realized = 0.0;
        if self.net_position == 0 || self.net_position.signum() == signed_qty.signum() {
            // Adding to position - weighted average
            let held = self.net_position.abs() as f64;
            let old_value = self.avg_entry_price.unwrap_or(price) * held;
            let new_value = price * f64::from(quantity);
            self.avg_entry_price = Some((old_value + new_value) / (held + f64::from(quantity)));
        } else {
            let closing = self.net_position.abs().min(signed_qty.abs()) as f64;
            let entry = self.avg_entry_price.unwrap_or(price);
            realized = (price - entry) * closing * self.net_position.signum() as f64;

            let remaining = self.net_position + signed_qty;
            self.avg_entry_price = if remaining == 0 {
                None
            } else if remaining.signum() != self.net_position.signum() {
                Some(price)
            } else {
                self.avg_entry_price
            };
        }

        self.net_position += signed_qty;
        self.realized_pnl += realized;
        debug!(
            "{} {} {} @ {:.5} (net {}, realized {:.2})",
            order.side, order.quantity, self.symbol, price, self.net_position, realized
        );
        self.orders.push(order);
        realized
    }
}

impl OrderExecutor for PaperBroker {
    fn open_long(&mut self, size: u32) {
        self.fill(OrderSide::opening(Direction::Long), size);
    }

    fn open_short(&mut self, size: u32) {
        self.fill(OrderSide::opening(Direction::Short), size);
    }

    fn close_at_market(&mut self) -> f64 {
        if self.net_position == 0 {
            return 0.0;
        }
        let held = if self.net_position > 0 {
            Direction::Long
        } else {
            Direction::Short
        };
        let side = OrderSide::opening(held).opposite();
        let quantity = u32::try_from(self.net_position.unsigned_abs()).unwrap_or(u32::MAX);
        self.fill(side, quantity)
    }

    fn current_position_sign(&self) -> i8 {
        self.net_position.signum() as i8
    }

    fn current_bid_price(&self) -> f64 {
        self.last_price - self.spread / 2.0
    }

    fn current_ask_price(&self) -> f64 {
        self.last_price + self.spread / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::OrderState;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn test_quotes_straddle_last() {
        let mut broker = PaperBroker::new("EUR/USD", 0.0002);
        broker.update_quote(1.1, t(1));
        assert!((broker.current_bid_price() - 1.0999).abs() < 1e-12);
        assert!((broker.current_ask_price() - 1.1001).abs() < 1e-12);
        assert_eq!(broker.current_position_sign(), 0);
        assert_eq!(broker.close_at_market(), 0.0);
        assert!(broker.orders().is_empty());
    }

    #[test]
    fn test_long_round_trip_pnl() {
        let mut broker = PaperBroker::new("NQ", 1.0);
        broker.update_quote(100.0, t(1));
        broker.open_long(10);
        assert_eq!(broker.current_position_sign(), 1);
        assert_eq!(broker.avg_entry_price(), Some(100.5));

        broker.update_quote(110.0, t(2));
        assert_eq!(broker.unrealized_pnl(), (109.5 - 100.5) * 10.0);

        let pnl = broker.close_at_market();
        assert_eq!(pnl, 90.0);
        assert!(broker.is_flat());
        assert_eq!(broker.avg_entry_price(), None);
        assert_eq!(broker.realized_pnl(), 90.0);
        assert_eq!(broker.orders().len(), 2);
        assert_eq!(broker.orders()[1].side, OrderSide::Sell);
        assert_eq!(broker.orders()[1].filled_at, Some(t(2)));
    }

    #[test]
    fn test_short_round_trip_pnl() {
        let mut broker = PaperBroker::new("NQ", 0.0);
        broker.update_quote(100.0, t(1));
        broker.open_short(2);
        assert_eq!(broker.current_position_sign(), -1);

        broker.update_quote(104.0, t(2));
        assert_eq!(broker.close_at_market(), -8.0);
        assert_eq!(broker.current_position_sign(), 0);
    }

    #[test]
    fn test_adding_averages_entry() {
        let mut broker = PaperBroker::new("NQ", 0.0);
        broker.update_quote(100.0, t(1));
        broker.open_long(1);
        broker.update_quote(110.0, t(2));
        broker.open_long(1);
        assert_eq!(broker.avg_entry_price(), Some(105.0));
        assert_eq!(broker.net_position(), 2);
    }

    #[test]
    fn test_zero_quantity_order_rejected() {
        let mut broker = PaperBroker::new("NQ", 0.0);
        broker.update_quote(100.0, t(1));
        broker.open_short(0);

        assert!(broker.is_flat());
        assert_eq!(broker.avg_entry_price(), None);
        assert_eq!(broker.orders().len(), 1);
        assert_eq!(broker.orders()[0].state, OrderState::Rejected);
        assert!(broker.orders()[0].is_terminal());
        assert_eq!(broker.orders()[0].avg_fill_price, None);
    }
}
