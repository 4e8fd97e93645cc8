use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use ivcrush_core::traits::MoveHistory;
use ivcrush_core::types::HistoricalMove;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::InMemoryMoveRepository;
use crate::error::ProviderError;
use crate::provider::HistoricalMovesRepository;

/// Row format: `ticker,earnings_date,previous_close,open_price,close_price`,
/// the last two being the first session after the announcement.
#[derive(Debug, Deserialize)]
struct MoveRow {
    ticker: String,
    earnings_date: NaiveDate,
    previous_close: Decimal,
    open_price: Decimal,
    close_price: Decimal,
}

/// Historical moves loaded once from CSV.
#[derive(Debug)]
pub struct CsvMoveRepository {
    inner: InMemoryMoveRepository,
}

impl CsvMoveRepository {
    /// # Errors
    /// Malformed rows, non-positive prices, or a (ticker, date) seen twice.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut moves = Vec::new();
        for (line, row) in rdr.deserialize::<MoveRow>().enumerate() {
            let row = row.with_context(|| format!("Malformed move row {}", line + 1))?;
            let m = HistoricalMove::from_prices(
                row.ticker.trim().to_uppercase(),
                row.earnings_date,
                row.previous_close,
                row.open_price,
                row.close_price,
            )
            .with_context(|| format!("Invalid move row {}", line + 1))?;
            moves.push(m);
        }

        let inner = InMemoryMoveRepository::from_moves(moves)?;
        Ok(Self { inner })
    }

    /// # Errors
    /// Unreadable file or any error from [`Self::from_reader`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open moves file: {}", path.display()))?;
        let repo = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            moves = repo.inner.len(),
            tickers = repo.inner.tickers().len(),
            "Loaded historical moves"
        );
        Ok(repo)
    }

    #[must_use]
    pub fn moves_for(&self, ticker: &str) -> Vec<HistoricalMove> {
        self.inner.get(ticker)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl HistoricalMovesRepository for CsvMoveRepository {
    fn name(&self) -> &str {
        "csv_moves"
    }

    async fn moves(&self, ticker: &str) -> Result<Vec<HistoricalMove>, ProviderError> {
        Ok(self.inner.get(ticker))
    }
}

impl MoveHistory for CsvMoveRepository {
    fn moves_before(&self, ticker: &str, before: NaiveDate, limit: usize) -> Vec<HistoricalMove> {
        self.inner.moves_before(ticker, before, limit)
    }
}
