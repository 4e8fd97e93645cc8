use std::collections::HashMap;

use chrono::NaiveDate;

use crate::types::HistoricalMove;

/// Point-in-time source of historical earnings moves.
///
/// Implementations must never return a move dated on or after `before`;
/// the backtest relies on this to avoid look-ahead.
pub trait MoveHistory: Send + Sync {
    /// Returns up to `limit` moves for `ticker` strictly before `before`,
    /// most recent first.
    fn moves_before(&self, ticker: &str, before: NaiveDate, limit: usize) -> Vec<HistoricalMove>;
}

/// `MoveHistory` over an in-memory map, keyed by ticker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMoveHistory {
    by_ticker: HashMap<String, Vec<HistoricalMove>>,
}

impl InMemoryMoveHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from an unordered list of moves.
    #[must_use]
    pub fn from_moves(moves: impl IntoIterator<Item = HistoricalMove>) -> Self {
        let mut history = Self::new();
        for m in moves {
            history.insert(m);
        }
        history
    }

    pub fn insert(&mut self, m: HistoricalMove) {
        let entries = self.by_ticker.entry(m.ticker.clone()).or_default();
        entries.push(m);
        entries.sort_by(|a, b| b.earnings_date.cmp(&a.earnings_date));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ticker.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MoveHistory for InMemoryMoveHistory {
    fn moves_before(&self, ticker: &str, before: NaiveDate, limit: usize) -> Vec<HistoricalMove> {
        self.by_ticker
            .get(ticker)
            .map(|moves| {
                moves
                    .iter()
                    .filter(|m| m.earnings_date < before)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn mv(ticker: &str, y: i32, m: u32, d: u32) -> HistoricalMove {
        HistoricalMove::from_prices(
            ticker,
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            dec!(100),
            dec!(103),
            dec!(104),
        )
        .unwrap()
    }

    #[test]
    fn excludes_event_date_and_later() {
        let history = InMemoryMoveHistory::from_moves(vec![
            mv("AAPL", 2024, 1, 25),
            mv("AAPL", 2024, 4, 25),
            mv("AAPL", 2024, 7, 25),
        ]);
        let cutoff = NaiveDate::from_ymd_opt(2024, 4, 25).unwrap();
        let moves = history.moves_before("AAPL", cutoff, 12);
        assert_eq!(moves.len(), 1);
        assert!(moves.iter().all(|m| m.earnings_date < cutoff));
    }

    #[test]
    fn most_recent_first_and_limited() {
        let history = InMemoryMoveHistory::from_moves(vec![
            mv("AAPL", 2023, 1, 25),
            mv("AAPL", 2024, 1, 25),
            mv("AAPL", 2023, 7, 25),
        ]);
        let moves = history.moves_before("AAPL", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 2);
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].earnings_date, NaiveDate::from_ymd_opt(2024, 1, 25).unwrap());
        assert_eq!(moves[1].earnings_date, NaiveDate::from_ymd_opt(2023, 7, 25).unwrap());
    }

    #[test]
    fn unknown_ticker_is_empty() {
        let history = InMemoryMoveHistory::new();
        assert!(history
            .moves_before("MSFT", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 4)
            .is_empty());
        assert!(history.is_empty());
    }
}
