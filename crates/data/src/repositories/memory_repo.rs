use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use ivcrush_core::error::AnalysisError;
use ivcrush_core::traits::MoveHistory;
use ivcrush_core::types::{validate_history, HistoricalMove};
use parking_lot::RwLock;

use crate::error::ProviderError;
use crate::provider::HistoricalMovesRepository;

/// Moves held in memory, most recent first per ticker.
#[derive(Debug, Default)]
pub struct InMemoryMoveRepository {
    by_ticker: RwLock<HashMap<String, Vec<HistoricalMove>>>,
}

impl InMemoryMoveRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `AnalysisError::DuplicateHistory` if a (ticker, date) appears twice.
    pub fn from_moves(moves: Vec<HistoricalMove>) -> Result<Self, AnalysisError> {
        validate_history(&moves)?;
        let repo = Self::new();
        {
            let mut by_ticker = repo.by_ticker.write();
            for m in moves {
                by_ticker.entry(m.ticker.clone()).or_default().push(m);
            }
            for entries in by_ticker.values_mut() {
                entries.sort_by(|a, b| b.earnings_date.cmp(&a.earnings_date));
            }
        }
        Ok(repo)
    }

    /// # Errors
    /// `AnalysisError::DuplicateHistory` if the move's date is already recorded.
    pub fn insert(&self, m: HistoricalMove) -> Result<(), AnalysisError> {
        let mut by_ticker = self.by_ticker.write();
        let entries = by_ticker.entry(m.ticker.clone()).or_default();
        if entries.iter().any(|e| e.earnings_date == m.earnings_date) {
            return Err(AnalysisError::DuplicateHistory {
                ticker: m.ticker,
                earnings_date: m.earnings_date,
            });
        }
        let at = entries.partition_point(|e| e.earnings_date > m.earnings_date);
        entries.insert(at, m);
        Ok(())
    }

    /// Moves for `ticker`, most recent first.
    #[must_use]
    pub fn get(&self, ticker: &str) -> Vec<HistoricalMove> {
        self.by_ticker.read().get(ticker).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.by_ticker.read().keys().cloned().collect();
        tickers.sort();
        tickers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ticker.read().values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoricalMovesRepository for InMemoryMoveRepository {
    fn name(&self) -> &str {
        "memory_moves"
    }

    async fn moves(&self, ticker: &str) -> Result<Vec<HistoricalMove>, ProviderError> {
        Ok(self.get(ticker))
    }
}

impl MoveHistory for InMemoryMoveRepository {
    fn moves_before(&self, ticker: &str, before: NaiveDate, limit: usize) -> Vec<HistoricalMove> {
        self.by_ticker
            .read()
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

    fn on(ticker: &str, y: i32, m: u32, d: u32) -> HistoricalMove {
        let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        HistoricalMove::from_prices(ticker, date, dec!(100), dec!(104), dec!(103)).unwrap()
    }

    #[test]
    fn keeps_most_recent_first() {
        let repo = InMemoryMoveRepository::from_moves(vec![
            on("AAPL", 2023, 8, 3),
            on("AAPL", 2024, 2, 1),
            on("AAPL", 2023, 11, 2),
        ])
        .unwrap();
        repo.insert(on("AAPL", 2024, 5, 2)).unwrap();

        let dates: Vec<NaiveDate> = repo.get("AAPL").iter().map(|m| m.earnings_date).collect();
        let mut sorted = dates.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(dates, sorted);
        assert_eq!(repo.len(), 4);
    }

    #[test]
    fn rejects_duplicates() {
        let err = InMemoryMoveRepository::from_moves(vec![
            on("AAPL", 2024, 2, 1),
            on("AAPL", 2024, 2, 1),
        ])
        .unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateHistory { .. }));

        let repo = InMemoryMoveRepository::new();
        repo.insert(on("MSFT", 2024, 1, 30)).unwrap();
        assert!(repo.insert(on("MSFT", 2024, 1, 30)).is_err());
    }

    #[test]
    fn moves_before_is_strict_and_limited() {
        let repo = InMemoryMoveRepository::from_moves(vec![
            on("NVDA", 2023, 5, 24),
            on("NVDA", 2023, 8, 23),
            on("NVDA", 2023, 11, 21),
            on("NVDA", 2024, 2, 21),
        ])
        .unwrap();
        let cutoff = NaiveDate::from_ymd_opt(2024, 2, 21).unwrap();

        let prior = repo.moves_before("NVDA", cutoff, 2);
        assert_eq!(prior.len(), 2);
        assert!(prior.iter().all(|m| m.earnings_date < cutoff));
        assert_eq!(prior[0].earnings_date, NaiveDate::from_ymd_opt(2023, 11, 21).unwrap());
        assert!(repo.moves_before("AMD", cutoff, 4).is_empty());
    }

    #[tokio::test]
    async fn unknown_ticker_is_empty_not_error() {
        let repo = InMemoryMoveRepository::new();
        assert!(repo.moves("ZZZZ").await.unwrap().is_empty());
    }
}
