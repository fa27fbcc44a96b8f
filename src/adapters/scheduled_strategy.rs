//! Strategy that replays a fixed schedule of intents.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::error::TradecheckError;
use crate::domain::ohlcv::Bar;
use crate::domain::order::{Direction, Offset};
use crate::ports::strategy_port::{Intent, StrategyPort};

/// Emits the intent scheduled for each daily bar's date, at most one per day.
#[derive(Debug, Clone, Default)]
pub struct ScheduledStrategy {
    schedule: BTreeMap<NaiveDate, Intent>,
}

impl ScheduledStrategy {
    pub fn new(schedule: BTreeMap<NaiveDate, Intent>) -> Self {
        Self { schedule }
    }

    /// Reads `date,direction,offset,volume` rows.
    pub fn from_csv(path: &Path) -> Result<Self, TradecheckError> {
        let content = fs::read_to_string(path).map_err(|e| TradecheckError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_reader(content.as_bytes()).map_err(|reason| TradecheckError::Data {
            reason: format!("{}: {}", path.display(), reason),
        })
    }

    fn from_reader(input: &[u8]) -> Result<Self, String> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
        let mut schedule = BTreeMap::new();

        for (i, result) in rdr.records().enumerate() {
            let row = i + 1;
            let record = result.map_err(|e| format!("row {row}: {e}"))?;
            let field = |index: usize, name: &str| {
                record
                    .get(index)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| format!("row {row}: missing {name}"))
            };

            let date = NaiveDate::parse_from_str(field(0, "date")?, "%Y-%m-%d")
                .map_err(|e| format!("row {row}: invalid date: {e}"))?;
            let direction: Direction = field(1, "direction")?
                .parse()
                .map_err(|e| format!("row {row}: {e}"))?;
            let offset: Offset = field(2, "offset")?
                .parse()
                .map_err(|e| format!("row {row}: {e}"))?;
            let volume: i64 = field(3, "volume")?
                .parse()
                .map_err(|e| format!("row {row}: invalid volume: {e}"))?;
            if volume <= 0 {
                return Err(format!("row {row}: volume must be positive"));
            }

            let intent = Intent {
                direction,
                offset,
                volume,
            };
            if schedule.insert(date, intent).is_some() {
                return Err(format!("row {row}: more than one intent for {date}"));
            }
        }
        Ok(Self { schedule })
    }

    pub fn len(&self) -> usize {
        self.schedule.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty()
    }
}

impl StrategyPort for ScheduledStrategy {
    fn on_daily_bar(&mut self, bar: &Bar, _history: &[Bar]) -> Option<Intent> {
        let day = bar.trading_day();
        let intent = self.schedule.get(&day).copied();
        if let Some(intent) = &intent {
            debug!(%day, direction = %intent.direction, "scheduled intent due");
        }
        intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    // 2023-01-02 00:00:00 UTC
    const DAY0: i64 = 1_672_617_600_000_000_000;

    fn daily_bar(datetime: i64) -> Bar {
        Bar {
            datetime,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
        }
    }

    #[test]
    fn emits_intent_for_scheduled_day_only() {
        let mut strategy = ScheduledStrategy::from_reader(
            b"date,direction,offset,volume\n2023-01-02,BUY,OPEN,30\n2023-01-04,sell,close,30\n",
        )
        .unwrap();
        assert_eq!(strategy.len(), 2);

        let first = strategy.on_daily_bar(&daily_bar(DAY0), &[]);
        assert_eq!(
            first,
            Some(Intent {
                direction: Direction::Buy,
                offset: Offset::Open,
                volume: 30,
            })
        );
        let next_day = DAY0 + 86_400 * 1_000_000_000;
        assert_eq!(strategy.on_daily_bar(&daily_bar(next_day), &[]), None);
    }

    #[test]
    fn rejects_unknown_direction() {
        let err = ScheduledStrategy::from_reader(b"date,direction,offset,volume\n2023-01-02,HOLD,OPEN,1\n")
            .unwrap_err();
        assert!(err.contains("row 1"));
        assert!(err.contains("HOLD"));
    }

    #[test]
    fn rejects_duplicate_day() {
        let err = ScheduledStrategy::from_reader(
            b"date,direction,offset,volume\n2023-01-02,BUY,OPEN,1\n2023-01-02,SELL,OPEN,1\n",
        )
        .unwrap_err();
        assert!(err.contains("more than one intent"));
    }

    #[test]
    fn rejects_non_positive_volume() {
        let err =
            ScheduledStrategy::from_reader(b"date,direction,offset,volume\n2023-01-02,BUY,OPEN,0\n")
                .unwrap_err();
        assert!(err.contains("volume must be positive"));
    }

    #[test]
    fn from_csv_wraps_errors_with_path() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "date,direction,offset,volume\nnot-a-date,BUY,OPEN,1\n").unwrap();

        let err = ScheduledStrategy::from_csv(file.path()).unwrap_err();
        assert!(matches!(err, TradecheckError::Data { .. }));
    }
}
