//! Session Clock
//!
//! Maps bar timestamps onto exchange session-close instants in a reference
//! timezone (America/New_York by default), walking backwards over trading days
//! and skipping weekends. The resulting instant is expressed on the feed's
//! time basis: UTC start time of the bar that holds the closing price.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use super::bars::BarSeries;
use super::error::SignalError;

/// Saturday and Sunday carry no session close
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Step back one calendar day, then keep stepping over weekend days
pub fn previous_trading_day(date: NaiveDate) -> NaiveDate {
    let mut date = date - Duration::days(1);
    while !is_trading_day(date) {
        date = date - Duration::days(1);
    }
    date
}

/// Resolve the close instant `sessions_back` trading sessions before `anchor_date`.
///
/// The local close is converted to UTC with the offset in force on that date
/// (DST aware) and shifted back one bar interval, so the result is the start
/// time of the bar whose end coincides with the session close.
pub fn resolve_session_close_instant(
    anchor_date: NaiveDate,
    close_hour: u32,
    close_minute: u32,
    timezone: Tz,
    sessions_back: usize,
    bar_interval_minutes: u32,
) -> Result<DateTime<Utc>, SignalError> {
    let mut date = anchor_date;
    for _ in 0..sessions_back {
        date = previous_trading_day(date);
    }

    let local_close = local_close_on(date, close_hour, close_minute, timezone)?;
    Ok(local_close.with_timezone(&Utc) - Duration::minutes(i64::from(bar_interval_minutes)))
}

/// Session close on `date` in `timezone`.
///
/// Ambiguous local times (DST fall back) take the earlier instant; a close that
/// falls in a DST gap is moved forward by the gap.
fn local_close_on(
    date: NaiveDate,
    close_hour: u32,
    close_minute: u32,
    timezone: Tz,
) -> Result<DateTime<Tz>, SignalError> {
    let time = NaiveTime::from_hms_opt(close_hour, close_minute, 0).ok_or_else(|| {
        SignalError::Configuration(format!(
            "invalid session close time {:02}:{:02}",
            close_hour, close_minute
        ))
    })?;
    let naive = date.and_time(time);

    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(t) => Ok(t),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => timezone
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .ok_or_else(|| {
                SignalError::CalculationError(format!("no local session close on {}", date))
            }),
    }
}

/// Session close configuration bound to one feed's bar interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionClock {
    close_hour: u32,
    close_minute: u32,
    timezone: Tz,
    bar_interval_minutes: u32,
}

impl SessionClock {
    pub fn new(
        close_hour: u32,
        close_minute: u32,
        timezone: Tz,
        bar_interval_minutes: u32,
    ) -> Result<Self, SignalError> {
        if close_hour > 23 || close_minute > 59 {
            return Err(SignalError::Configuration(format!(
                "invalid session close time {:02}:{:02}",
                close_hour, close_minute
            )));
        }
        Ok(Self {
            close_hour,
            close_minute,
            timezone,
            bar_interval_minutes,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn bar_interval_minutes(&self) -> u32 {
        self.bar_interval_minutes
    }

    /// Session close as minutes since local midnight
    pub fn close_total_minutes(&self) -> u32 {
        self.close_hour * 60 + self.close_minute
    }

    /// Calendar date of a feed timestamp in the reference timezone
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// Minutes since local midnight of a feed timestamp in the reference timezone
    pub fn local_total_minutes(&self, instant: DateTime<Utc>) -> u32 {
        let local = instant.with_timezone(&self.timezone);
        local.hour() * 60 + local.minute()
    }

    pub fn session_close_instant(
        &self,
        anchor_date: NaiveDate,
        sessions_back: usize,
    ) -> Result<DateTime<Utc>, SignalError> {
        resolve_session_close_instant(
            anchor_date,
            self.close_hour,
            self.close_minute,
            self.timezone,
            sessions_back,
            self.bar_interval_minutes,
        )
    }

    /// Like [`Self::session_close_instant`], but fails with `InsufficientData`
    /// when the series does not reach back to the resolved instant.
    pub fn resolve_in<S: BarSeries + ?Sized>(
        &self,
        series: &S,
        anchor_date: NaiveDate,
        sessions_back: usize,
    ) -> Result<DateTime<Utc>, SignalError> {
        let instant = self.session_close_instant(anchor_date, sessions_back)?;
        match series.first_start_time() {
            Some(first) if first <= instant => Ok(instant),
            Some(first) => Err(SignalError::InsufficientData(format!(
                "series starts at {} after session close bar {}",
                first, instant
            ))),
            None => Err(SignalError::InsufficientData("empty series".to_string())),
        }
    }

    /// Bar end falls inside `[close - look_ahead, close]` on a trading day
    pub fn is_near_close(&self, bar_end: DateTime<Utc>, look_ahead_minutes: u32) -> bool {
        let minutes = self.local_total_minutes(bar_end);
        let close = self.close_total_minutes();
        is_trading_day(self.local_date(bar_end))
            && minutes <= close
            && minutes >= close.saturating_sub(look_ahead_minutes)
    }

    /// Bar end coincides with the session close on a trading day
    pub fn is_session_close_bar(&self, bar_end: DateTime<Utc>) -> bool {
        is_trading_day(self.local_date(bar_end))
            && self.local_total_minutes(bar_end) == self.close_total_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monday_steps_back_to_friday() {
        // 2024-03-04 is a Monday
        assert_eq!(previous_trading_day(date(2024, 3, 4)), date(2024, 3, 1));
        // Sunday and Saturday anchors also land on Friday
        assert_eq!(previous_trading_day(date(2024, 3, 3)), date(2024, 3, 1));
        assert_eq!(previous_trading_day(date(2024, 3, 2)), date(2024, 3, 1));
        assert_eq!(previous_trading_day(date(2024, 3, 6)), date(2024, 3, 5));
    }

    #[test]
    fn test_monday_close_resolves_to_friday_for_any_close_time() {
        for (hour, minute) in [(0, 0), (9, 30), (16, 0), (17, 0), (23, 59)] {
            let instant =
                resolve_session_close_instant(date(2024, 3, 4), hour, minute, New_York, 1, 0)
                    .unwrap();
            let local = instant.with_timezone(&New_York);
            assert_eq!(local.weekday(), Weekday::Fri);
            assert_eq!((local.hour(), local.minute()), (hour, minute));
        }
    }

    #[test]
    fn test_offset_and_bar_interval_applied() {
        // Winter: 17:00 EST = 22:00 UTC, minus one hour bar = 21:00 UTC
        let winter =
            resolve_session_close_instant(date(2024, 1, 10), 17, 0, New_York, 1, 60).unwrap();
        assert_eq!(winter, Utc.with_ymd_and_hms(2024, 1, 9, 21, 0, 0).unwrap());

        // Summer: 17:00 EDT = 21:00 UTC, minus 15 minutes
        let summer =
            resolve_session_close_instant(date(2024, 7, 10), 17, 0, New_York, 1, 15).unwrap();
        assert_eq!(summer, Utc.with_ymd_and_hms(2024, 7, 9, 20, 45, 0).unwrap());
    }

    #[test]
    fn test_walk_across_dst_change() {
        // Tuesday 2024-03-12 back 3 sessions: Mon 11 (EDT), Fri 8 (EST), Thu 7 (EST)
        let instant =
            resolve_session_close_instant(date(2024, 3, 12), 17, 0, New_York, 3, 0).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 3, 7, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_close_in_spring_forward_gap_moves_later() {
        // 02:30 does not exist in New York on 2024-03-10; 03:30 EDT = 07:30 UTC
        let gap = local_close_on(date(2024, 3, 10), 2, 30, New_York).unwrap();
        assert_eq!(gap.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap());

        let instant =
            resolve_session_close_instant(date(2024, 3, 10), 2, 30, New_York, 0, 60).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 3, 10, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_ambiguous_close_takes_earliest() {
        // 01:30 occurs twice on 2024-11-03; the EDT reading is 05:30 UTC
        let close = local_close_on(date(2024, 11, 3), 1, 30, New_York).unwrap();
        assert_eq!(close.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_near_close_window() {
        let clock = SessionClock::new(17, 0, New_York, 60).unwrap();
        // Wednesday 2024-01-10 16:30 EST = 21:30 UTC
        let inside = Utc.with_ymd_and_hms(2024, 1, 10, 21, 30, 0).unwrap();
        assert!(clock.is_near_close(inside, 60));
        assert!(!clock.is_near_close(inside, 15));

        let after = Utc.with_ymd_and_hms(2024, 1, 10, 22, 15, 0).unwrap();
        assert!(!clock.is_near_close(after, 60));
    }

    #[test]
    fn test_weekend_never_near_close() {
        let clock = SessionClock::new(17, 0, New_York, 60).unwrap();
        // Saturday 2024-01-13 17:00 EST
        let saturday = Utc.with_ymd_and_hms(2024, 1, 13, 22, 0, 0).unwrap();
        assert!(!clock.is_near_close(saturday, 60));
        assert!(!clock.is_session_close_bar(saturday));
        // Sunday 2024-01-14 17:00 EST
        let sunday = Utc.with_ymd_and_hms(2024, 1, 14, 22, 0, 0).unwrap();
        assert!(!clock.is_near_close(sunday, 60));
    }

    #[test]
    fn test_invalid_close_time_rejected() {
        assert!(matches!(
            SessionClock::new(24, 0, New_York, 60),
            Err(SignalError::Configuration(_))
        ));
    }
}
