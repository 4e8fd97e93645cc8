//! CSV import of replay events and export of simulated trades.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{Reader, Writer};
use ivcrush_core::types::{validate_history, HistoricalMove};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::trade::{BacktestEvent, MarketSnapshot, SimulatedTrade, TradeOutcome};

/// One row of an events file. Prices of the first session after the
/// announcement give the realised move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub ticker: String,
    pub earnings_date: NaiveDate,
    pub spot: Decimal,
    pub implied_move_pct: f64,
    pub spread_pct: Option<f64>,
    pub previous_close: Decimal,
    pub open_price: Decimal,
    pub close_price: Decimal,
}

impl EventRecord {
    /// # Errors
    /// Non-positive prices.
    pub fn into_event(self) -> Result<BacktestEvent> {
        let outcome = HistoricalMove::from_prices(
            self.ticker,
            self.earnings_date,
            self.previous_close,
            self.open_price,
            self.close_price,
        )?;
        Ok(BacktestEvent::new(
            self.spot,
            MarketSnapshot::ImpliedMove {
                implied_move_pct: self.implied_move_pct,
                spread_pct: self.spread_pct,
            },
            outcome,
        ))
    }
}

/// Reads events from CSV with an `EventRecord` header.
///
/// # Errors
/// Malformed rows, invalid prices, or the same (ticker, date) twice.
pub fn read_events<R: Read>(reader: R) -> Result<Vec<BacktestEvent>> {
    let mut rdr = Reader::from_reader(reader);
    let mut events = Vec::new();
    for (line, row) in rdr.deserialize::<EventRecord>().enumerate() {
        let record = row.with_context(|| format!("Malformed event row {}", line + 1))?;
        events.push(
            record
                .into_event()
                .with_context(|| format!("Invalid event row {}", line + 1))?,
        );
    }

    let outcomes: Vec<HistoricalMove> = events.iter().map(|e| e.outcome.clone()).collect();
    validate_history(&outcomes)?;
    Ok(events)
}

/// # Errors
/// Unreadable file or any error from [`read_events`].
pub fn load_events(path: impl AsRef<Path>) -> Result<Vec<BacktestEvent>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open events file: {}", path.display()))?;
    let events = read_events(file)?;
    tracing::info!(path = %path.display(), events = events.len(), "Loaded backtest events");
    Ok(events)
}

/// Flat CSV shape of a trade.
#[derive(Debug, Serialize)]
struct TradeRecord<'a> {
    ticker: &'a str,
    earnings_date: NaiveDate,
    config: &'a str,
    tier: String,
    vrp_ratio: f64,
    implied_move_pct: f64,
    actual_move_pct: f64,
    entry_slippage_pct: f64,
    residual_extrinsic_pct: f64,
    exit_slippage_pct: f64,
    commission_pct: f64,
    naive_pnl_pct: f64,
    pnl_pct: f64,
    position_size_pct: f64,
    outcome: TradeOutcome,
}

impl<'a> From<&'a SimulatedTrade> for TradeRecord<'a> {
    fn from(t: &'a SimulatedTrade) -> Self {
        Self {
            ticker: &t.ticker,
            earnings_date: t.earnings_date,
            config: &t.config_name,
            tier: t.tier.to_string(),
            vrp_ratio: t.vrp_ratio,
            implied_move_pct: t.implied_move_pct,
            actual_move_pct: t.actual_move_pct,
            entry_slippage_pct: t.costs.entry_slippage_pct,
            residual_extrinsic_pct: t.costs.residual_extrinsic_pct,
            exit_slippage_pct: t.costs.exit_slippage_pct,
            commission_pct: t.costs.commission_pct,
            naive_pnl_pct: t.naive_pnl_pct,
            pnl_pct: t.pnl_pct,
            position_size_pct: t.position_size_pct,
            outcome: t.outcome,
        }
    }
}

/// # Errors
/// Any write failure.
pub fn write_trades<W: Write>(writer: W, trades: &[SimulatedTrade]) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    for trade in trades {
        wtr.serialize(TradeRecord::from(trade))
            .context("Failed to write trade row")?;
    }
    wtr.flush().context("Failed to flush trades")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::TradeCosts;
    use ivcrush_core::types::VrpTier;
    use rust_decimal_macros::dec;

    const HEADER: &str =
        "ticker,earnings_date,spot,implied_move_pct,spread_pct,previous_close,open_price,close_price\n";

    #[test]
    fn reads_rows_with_optional_spread() {
        let csv = format!(
            "{HEADER}AAPL,2024-02-01,185.50,4.2,0.06,186.00,190.00,188.79\n\
             MSFT,2024-01-30,405.00,5.1,,405.00,400.00,397.00\n"
        );
        let events = read_events(csv.as_bytes()).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].spot, dec!(185.50));
        assert_eq!(
            events[0].market,
            MarketSnapshot::ImpliedMove {
                implied_move_pct: 4.2,
                spread_pct: Some(0.06)
            }
        );
        assert!((events[0].outcome.close_move_pct - 1.5).abs() < 1e-9);
        assert!(matches!(
            events[1].market,
            MarketSnapshot::ImpliedMove { spread_pct: None, .. }
        ));
    }

    #[test]
    fn duplicate_events_are_rejected() {
        let csv = format!(
            "{HEADER}AAPL,2024-02-01,100,4,,100,101,102\nAAPL,2024-02-01,100,4,,100,99,98\n"
        );
        assert!(read_events(csv.as_bytes()).is_err());
    }

    #[test]
    fn non_positive_price_names_the_row() {
        let csv = format!("{HEADER}AAPL,2024-02-01,100,4,,0,101,102\n");
        let err = read_events(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn trades_export_flat_rows() {
        let trade = SimulatedTrade {
            ticker: "AAPL".to_string(),
            earnings_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            config_name: "canonical".to_string(),
            tier: VrpTier::Good,
            vrp_ratio: 4.2,
            implied_move_pct: 8.0,
            actual_move_pct: -3.0,
            costs: TradeCosts::default(),
            naive_pnl_pct: 5.0,
            pnl_pct: 5.0,
            position_size_pct: 0.02,
            outcome: TradeOutcome::Win,
        };
        let mut out = Vec::new();
        write_trades(&mut out, &[trade]).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("ticker,earnings_date,config,tier"));
        assert!(lines.next().unwrap().starts_with("AAPL,2024-02-01,canonical,"));
    }
}
