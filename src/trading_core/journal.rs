//! Trade Journal
//!
//! Append-only CSV of closed legs. The file and its header are created on the
//! first write; every call appends exactly one row. Write failures surface as
//! [`JournalError`] and are logged by the caller, never blocking trading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use super::error::JournalError;
use super::state_machine::Direction;

const HEADER: [&str; 7] = [
    "DATE",
    "SYMBOL",
    "TRADE DIRECTION",
    "POSITION SIZE",
    "ENTRY PRICE",
    "EXIT PRICE",
    "P/L $",
];
const DRAWDOWN_HEADER: &str = "DRAW DOWN";

/// One closed leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub close_time: DateTime<Utc>,
    pub symbol: String,
    /// Side that was closed
    pub direction: Direction,
    pub size: u32,
    pub entry_price: f64,
    pub exit_price: f64,
    pub realized_pnl: f64,
    pub drawdown: f64,
}

impl TradeRecord {
    fn to_row(&self, with_drawdown: bool) -> Vec<String> {
        let mut row = vec![
            self.close_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.symbol.clone(),
            self.direction.to_string(),
            self.size.to_string(),
            format!("{:.5}", self.entry_price),
            format!("{:.5}", self.exit_price),
            format!("{:.2}", self.realized_pnl),
        ];
        if with_drawdown {
            row.push(format!("{:.5}", self.drawdown));
        }
        row
    }
}

/// `{yyyyMMddHHmmss}_{symbol without '/'}.csv`
pub fn journal_file_name(now: DateTime<Utc>, symbol: &str) -> String {
    format!("{}_{}.csv", now.format("%Y%m%d%H%M%S"), symbol.replace('/', ""))
}

#[derive(Debug, Clone)]
pub struct TradeJournal {
    path: PathBuf,
    with_drawdown: bool,
    rows_written: usize,
}

impl TradeJournal {
    pub fn new(path: PathBuf, with_drawdown: bool) -> Self {
        Self {
            path,
            with_drawdown,
            rows_written: 0,
        }
    }

    /// Journal under `dir`, named from the activation time and symbol
    pub fn for_activation(dir: &Path, now: DateTime<Utc>, symbol: &str, with_drawdown: bool) -> Self {
        Self::new(dir.join(journal_file_name(now, symbol)), with_drawdown)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended by this journal instance
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Append one row, writing the header first if the file is new or empty
    pub fn record(&mut self, record: &TradeRecord) -> Result<(), JournalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            let mut header: Vec<&str> = HEADER.to_vec();
            if self.with_drawdown {
                header.push(DRAWDOWN_HEADER);
            }
            writer.write_record(&header)?;
        }
        writer.write_record(record.to_row(self.with_drawdown))?;
        writer.flush()?;

        self.rows_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(pnl: f64) -> TradeRecord {
        TradeRecord {
            close_time: Utc.with_ymd_and_hms(2024, 1, 10, 22, 0, 0).unwrap(),
            symbol: "EUR/USD".to_string(),
            direction: Direction::Long,
            size: 10_000,
            entry_price: 1.0912345,
            exit_price: 1.1,
            realized_pnl: pnl,
            drawdown: 0.0021,
        }
    }

    #[test]
    fn test_file_name_strips_slash() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 9, 5, 7).unwrap();
        assert_eq!(journal_file_name(now, "EUR/USD"), "20240110090507_EURUSD.csv");
    }

    #[test]
    fn test_header_once_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TradeJournal::new(dir.path().join("trades.csv"), true);

        journal.record(&record(87.65)).unwrap();
        journal.record(&record(-12.345)).unwrap();
        assert_eq!(journal.rows_written(), 2);

        let text = std::fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "DATE,SYMBOL,TRADE DIRECTION,POSITION SIZE,ENTRY PRICE,EXIT PRICE,P/L $,DRAW DOWN"
        );
        assert_eq!(
            lines[1],
            "2024-01-10 22:00:00,EUR/USD,LONG,10000,1.09123,1.10000,87.65,0.00210"
        );
        assert!(lines[2].ends_with(",-12.35,0.00210") || lines[2].ends_with(",-12.34,0.00210"));
    }

    #[test]
    fn test_existing_file_keeps_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        TradeJournal::new(path.clone(), false).record(&record(1.0)).unwrap();
        TradeJournal::new(path.clone(), false).record(&record(2.0)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("DATE")).count(), 1);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).unwrap().ends_with(",2.00"));
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        std::fs::File::create(&path).unwrap();

        TradeJournal::new(path.clone(), false).record(&record(1.0)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("DATE,SYMBOL"));
        assert!(lines[1].ends_with(",1.00"));
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TradeJournal::new(dir.path().join("missing").join("trades.csv"), true);
        assert!(matches!(journal.record(&record(1.0)), Err(JournalError::Io(_))));
        assert_eq!(journal.rows_written(), 0);
    }
}
