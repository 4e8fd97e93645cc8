//! Market data model consumed by the analysis pipeline.
//!
//! Option chain snapshots and historical earnings moves are immutable facts
//! supplied by the data boundary. Everything derived from them lives in the
//! analysis crate as short-lived value objects.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// One quoted contract in an option chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: Decimal,
    pub option_type: OptionType,
    pub expiration: NaiveDate,
    pub bid: Decimal,
    pub ask: Decimal,
    /// Implied volatility as a decimal fraction (0.45 = 45%).
    pub implied_volatility: f64,
    /// Signed delta as reported by the provider (puts negative).
    pub delta: f64,
}

impl OptionQuote {
    /// Returns true when the quote can be traded against: non-negative sides,
    /// a positive ask, and not crossed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.bid >= Decimal::ZERO && self.ask > Decimal::ZERO && self.ask >= self.bid
    }

    /// Mid price, or `None` for zero/stale/crossed quotes.
    #[must_use]
    pub fn mid(&self) -> Option<Decimal> {
        if !self.is_valid() {
            return None;
        }
        Some((self.bid + self.ask) / Decimal::TWO)
    }

    /// Bid-ask spread as a fraction of mid.
    #[must_use]
    pub fn spread_pct(&self) -> Option<f64> {
        let mid = self.mid()?;
        if mid.is_zero() {
            return None;
        }
        ((self.ask - self.bid) / mid).to_f64()
    }

    /// Unsigned delta, the convention used for strike selection.
    #[must_use]
    pub fn abs_delta(&self) -> f64 {
        self.delta.abs()
    }
}

/// Point-in-time option chain for one symbol, possibly spanning several expirations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChainSnapshot {
    pub symbol: String,
    pub observed_at: DateTime<Utc>,
    /// Underlying price at observation time.
    pub spot: Decimal,
    pub quotes: Vec<OptionQuote>,
}

impl OptionChainSnapshot {
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        observed_at: DateTime<Utc>,
        spot: Decimal,
        quotes: Vec<OptionQuote>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            observed_at,
            spot,
            quotes,
        }
    }

    /// Distinct expirations in ascending order.
    #[must_use]
    pub fn expirations(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .quotes
            .iter()
            .map(|q| q.expiration)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        dates.sort_unstable();
        dates
    }

    /// First expiration on or after `date` (the event expiration for an earnings date).
    #[must_use]
    pub fn nearest_expiration_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.expirations().into_iter().find(|d| *d >= date)
    }

    /// Quotes for a single expiration.
    pub fn for_expiration(&self, expiration: NaiveDate) -> impl Iterator<Item = &OptionQuote> {
        self.quotes.iter().filter(move |q| q.expiration == expiration)
    }

    /// Median bid-ask spread (fraction of mid) across valid quotes of one expiration.
    #[must_use]
    pub fn median_spread_pct(&self, expiration: NaiveDate) -> Option<f64> {
        let mut spreads: Vec<f64> = self
            .for_expiration(expiration)
            .filter_map(OptionQuote::spread_pct)
            .collect();
        if spreads.is_empty() {
            return None;
        }
        spreads.sort_by(f64::total_cmp);
        Some(spreads[spreads.len() / 2])
    }

    /// Spot as f64 for statistical code.
    #[must_use]
    pub fn spot_f64(&self) -> f64 {
        self.spot.to_f64().unwrap_or(0.0)
    }
}

/// Direction of a realised earnings move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MoveDirection {
    Up,
    Down,
}

impl MoveDirection {
    /// Derived from the sign of the close-to-close move; a flat close counts as up.
    #[must_use]
    pub fn from_move(close_move_pct: f64) -> Self {
        if close_move_pct < 0.0 {
            Self::Down
        } else {
            Self::Up
        }
    }
}

/// Realised price reaction to one earnings announcement.
///
/// Percentages are expressed in percent points (3.5 = 3.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMove {
    pub ticker: String,
    pub earnings_date: NaiveDate,
    /// Close of the last session before the announcement.
    pub previous_close: Decimal,
    /// Close of the first session after the announcement.
    pub post_close: Decimal,
    /// Previous close to next open.
    pub gap_move_pct: f64,
    /// Next open to next close.
    pub intraday_move_pct: f64,
    /// Previous close to next close.
    pub close_move_pct: f64,
    pub direction: MoveDirection,
}

impl HistoricalMove {
    /// Builds a move from the three reference prices around the announcement.
    ///
    /// # Errors
    /// Returns `AnalysisError::InvalidInput` if any price is not positive.
    pub fn from_prices(
        ticker: impl Into<String>,
        earnings_date: NaiveDate,
        previous_close: Decimal,
        open_price: Decimal,
        close_price: Decimal,
    ) -> Result<Self, AnalysisError> {
        let ticker = ticker.into();
        if previous_close <= Decimal::ZERO || open_price <= Decimal::ZERO || close_price <= Decimal::ZERO
        {
            return Err(AnalysisError::InvalidInput(format!(
                "{ticker} {earnings_date}: prices must be positive"
            )));
        }

        let pct = |from: Decimal, to: Decimal| -> f64 {
            ((to - from) / from * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        };

        let close_move_pct = pct(previous_close, close_price);
        Ok(Self {
            gap_move_pct: pct(previous_close, open_price),
            intraday_move_pct: pct(open_price, close_price),
            close_move_pct,
            direction: MoveDirection::from_move(close_move_pct),
            ticker,
            earnings_date,
            previous_close,
            post_close: close_price,
        })
    }

    /// Magnitude of the close-to-close move, the quantity consumed by the analyzers.
    #[must_use]
    pub fn abs_close_move_pct(&self) -> f64 {
        self.close_move_pct.abs()
    }
}

/// Rejects a history containing the same (ticker, earnings_date) twice.
///
/// # Errors
/// Returns `AnalysisError::DuplicateHistory` on the first duplicate found.
pub fn validate_history(moves: &[HistoricalMove]) -> Result<(), AnalysisError> {
    let mut seen = HashSet::with_capacity(moves.len());
    for m in moves {
        if !seen.insert((m.ticker.as_str(), m.earnings_date)) {
            return Err(AnalysisError::DuplicateHistory {
                ticker: m.ticker.clone(),
                earnings_date: m.earnings_date,
            });
        }
    }
    Ok(())
}

/// Discrete VRP recommendation tier. Ordered so that a richer premium compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VrpTier {
    Skip,
    Marginal,
    Good,
    Excellent,
}

impl VrpTier {
    /// Whether the tier warrants building a trade.
    #[must_use]
    pub const fn is_tradeable(self) -> bool {
        !matches!(self, Self::Skip)
    }
}

impl fmt::Display for VrpTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "SKIP"),
            Self::Marginal => write!(f, "MARGINAL"),
            Self::Good => write!(f, "GOOD"),
            Self::Excellent => write!(f, "EXCELLENT"),
        }
    }
}
