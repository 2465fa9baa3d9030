//! Market orders sent to the executor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trading_core::state_machine::Direction;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Side that opens a leg in `direction`
    pub fn opening(direction: Direction) -> Self {
        match direction {
            Direction::Long => Self::Buy,
            Direction::Short => Self::Sell,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Created, not yet filled
    Pending,
    Filled,
    /// Rejected by the executor
    Rejected,
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Filled => write!(f, "FILLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Individual market order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID (client-side)
    pub id: Uuid,

    pub symbol: String,

    pub side: OrderSide,

    /// Quantity in units
    pub quantity: u32,

    pub state: OrderState,

    /// Fill price once filled
    pub avg_fill_price: Option<f64>,

    /// Bar time the order was created at
    pub created_at: DateTime<Utc>,

    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a new market order
    pub fn market(symbol: &str, side: OrderSide, quantity: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            quantity,
            state: OrderState::Pending,
            avg_fill_price: None,
            created_at,
            filled_at: None,
        }
    }

    pub fn record_fill(&mut self, price: f64, at: DateTime<Utc>) {
        self.avg_fill_price = Some(price);
        self.filled_at = Some(at);
        self.state = OrderState::Filled;
    }

    pub fn reject(&mut self) {
        self.state = OrderState::Rejected;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, OrderState::Filled | OrderState::Rejected)
    }

    /// +quantity for buys, -quantity for sells
    pub fn signed_quantity(&self) -> i64 {
        match self.side {
            OrderSide::Buy => i64::from(self.quantity),
            OrderSide::Sell => -i64::from(self.quantity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_market_order_fill() {
        let t = Utc.with_ymd_and_hms(2024, 1, 10, 22, 0, 0).unwrap();
        let mut order = Order::market("EUR/USD", OrderSide::Sell, 10_000, t);
        assert_eq!(order.state, OrderState::Pending);
        assert!(!order.is_terminal());
        assert_eq!(order.signed_quantity(), -10_000);

        order.record_fill(1.0951, t);
        assert!(order.is_terminal());
        assert_eq!(order.avg_fill_price, Some(1.0951));
        assert_eq!(order.filled_at, Some(t));
    }

    #[test]
    fn test_opening_side() {
        assert_eq!(OrderSide::opening(Direction::Long), OrderSide::Buy);
        assert_eq!(OrderSide::opening(Direction::Short).opposite(), OrderSide::Buy);
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
    }
}
