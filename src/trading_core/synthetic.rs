//! Reproducible random-walk bars for replays and tests

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::bars::{Bar, DAILY_INTERVAL_MINUTES};
use super::error::SignalError;
use super::session::is_trading_day;

/// Generates bars on trading days, aligned to local midnight in `timezone`
pub struct SyntheticBarGenerator {
    rng: StdRng,
    price: f64,
    /// Per-bar return standard deviation for a one minute bar
    volatility: f64,
    timezone: Tz,
}

impl SyntheticBarGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64, start_price: f64, timezone: Tz) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            price: start_price,
            volatility: 0.0004,
            timezone,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    /// Bars for `days` calendar days starting at `start`; weekends produce none
    pub fn generate(
        &mut self,
        start: NaiveDate,
        days: u32,
        interval_minutes: u32,
    ) -> Result<Vec<Bar>, SignalError> {
        if interval_minutes == 0 {
            return Err(SignalError::Configuration(
                "interval_minutes must be positive".to_string(),
            ));
        }
        let scaled = self.volatility * f64::from(interval_minutes).sqrt();
        let returns = Normal::new(0.0, scaled)
            .map_err(|e| SignalError::Configuration(format!("invalid volatility: {}", e)))?;
        let step = Duration::minutes(i64::from(interval_minutes));

        let mut bars = Vec::new();
        for offset in 0..days {
            let date = start + Duration::days(i64::from(offset));
            if !is_trading_day(date) {
                continue;
            }
            let day_start = self.local_midnight(date)?;
            let day_end = if interval_minutes >= DAILY_INTERVAL_MINUTES {
                day_start + step
            } else {
                self.local_midnight(date + Duration::days(1))?
            };

            let mut bar_start = day_start;
            while bar_start + step <= day_end {
                bars.push(self.next_bar(bar_start, bar_start + step, &returns));
                bar_start += step;
            }
        }
        Ok(bars)
    }

    fn local_midnight(&self, date: NaiveDate) -> Result<DateTime<Utc>, SignalError> {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| SignalError::CalculationError(format!("no midnight on {}", date)))?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| SignalError::CalculationError(format!("no local midnight on {}", date)))
    }

    fn next_bar(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, returns: &Normal<f64>) -> Bar {
        let open = self.price;
        let close = open * (1.0 + returns.sample(&mut self.rng));
        let wick_high = returns.sample(&mut self.rng).abs() * open;
        let wick_low = returns.sample(&mut self.rng).abs() * open;
        self.price = close;

        Bar {
            start_time: start,
            end_time: end,
            open,
            high: open.max(close) + wick_high,
            low: open.min(close) - wick_low,
            close,
        }
    }
}
