//! Market-implied earnings move from the at-the-money straddle.
//!
//! The straddle is priced at spot by linear interpolation between the two
//! strikes that bracket it; call and put mids are interpolated separately.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ivcrush_core::error::{AnalysisError, Result};
use ivcrush_core::types::{OptionChainSnapshot, OptionType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Implied move derived from one expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpliedMove {
    /// Straddle cost as a percentage of spot.
    pub implied_move_pct: f64,
    /// Interpolated call mid plus put mid at spot.
    pub straddle_cost: Decimal,
    pub call_mid: Decimal,
    pub put_mid: Decimal,
    /// Bid-ask width of the interpolated straddle as a fraction of its mid.
    pub spread_pct: Option<f64>,
    /// Bracketing strikes; equal when spot sits exactly on a strike.
    pub lower_strike: Decimal,
    pub upper_strike: Decimal,
    pub spot: Decimal,
    pub expiration: NaiveDate,
}

/// Mid prices of both sides at one strike, plus the summed bid-ask width.
#[derive(Debug, Clone, Copy)]
struct StraddleQuote {
    call: Decimal,
    put: Decimal,
    width: Decimal,
}

impl StraddleQuote {
    fn lerp(lo: Self, hi: Self, w: Decimal) -> Self {
        Self {
            call: lo.call + w * (hi.call - lo.call),
            put: lo.put + w * (hi.put - lo.put),
            width: lo.width + w * (hi.width - lo.width),
        }
    }
}

/// Computes the implied move for `expiration` at `spot`.
///
/// # Errors
/// - `InvalidInput` if spot is not positive.
/// - `InsufficientChainData` if no strike carries valid quotes on both sides,
///   or the valid strikes do not bracket spot.
pub fn calculate(
    chain: &OptionChainSnapshot,
    expiration: NaiveDate,
    spot: Decimal,
) -> Result<ImpliedMove> {
    if spot <= Decimal::ZERO {
        return Err(AnalysisError::InvalidInput(format!(
            "{}: spot must be positive, got {spot}",
            chain.symbol
        )));
    }

    let straddles = straddles_by_strike(chain, expiration);
    if straddles.is_empty() {
        return Err(AnalysisError::insufficient_chain(
            &chain.symbol,
            format!("no strike with valid call and put quotes for {expiration}"),
        ));
    }

    let lower = straddles.range(..=spot).next_back();
    let upper = straddles.range(spot..).next();
    let (Some((&lower_strike, &lo)), Some((&upper_strike, &hi))) = (lower, upper) else {
        return Err(AnalysisError::insufficient_chain(
            &chain.symbol,
            format!("strikes do not bracket spot {spot} for {expiration}"),
        ));
    };

    let at_spot = if upper_strike == lower_strike {
        lo
    } else {
        let w = (spot - lower_strike) / (upper_strike - lower_strike);
        StraddleQuote::lerp(lo, hi, w)
    };

    let straddle_cost = at_spot.call + at_spot.put;
    let implied_move_pct = (straddle_cost / spot * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0);
    let spread_pct = (straddle_cost > Decimal::ZERO)
        .then(|| (at_spot.width / straddle_cost).to_f64())
        .flatten();

    tracing::debug!(
        symbol = %chain.symbol,
        %expiration,
        %lower_strike,
        %upper_strike,
        implied_move_pct,
        ?spread_pct,
        "Implied move computed"
    );

    Ok(ImpliedMove {
        implied_move_pct,
        straddle_cost,
        call_mid: at_spot.call,
        put_mid: at_spot.put,
        spread_pct,
        lower_strike,
        upper_strike,
        spot,
        expiration,
    })
}

/// Implied move for the event expiration: the first expiration on or after
/// `earnings_date`, priced at the snapshot's spot.
///
/// # Errors
/// `InsufficientChainData` if no expiration follows the event, otherwise as
/// [`calculate`].
pub fn calculate_for_event(
    chain: &OptionChainSnapshot,
    earnings_date: NaiveDate,
) -> Result<ImpliedMove> {
    let expiration = chain.nearest_expiration_after(earnings_date).ok_or_else(|| {
        AnalysisError::insufficient_chain(
            &chain.symbol,
            format!("no expiration on or after {earnings_date}"),
        )
    })?;
    calculate(chain, expiration, chain.spot)
}

fn straddles_by_strike(
    chain: &OptionChainSnapshot,
    expiration: NaiveDate,
) -> BTreeMap<Decimal, StraddleQuote> {
    // (mid, ask - bid) per side
    type Side = Option<(Decimal, Decimal)>;
    let mut sides: BTreeMap<Decimal, (Side, Side)> = BTreeMap::new();
    for quote in chain.for_expiration(expiration) {
        let Some(mid) = quote.mid() else { continue };
        let side = Some((mid, quote.ask - quote.bid));
        let entry = sides.entry(quote.strike).or_default();
        match quote.option_type {
            OptionType::Call => entry.0 = side,
            OptionType::Put => entry.1 = side,
        }
    }
    sides
        .into_iter()
        .filter_map(|(strike, pair)| match pair {
            (Some((call, call_width)), Some((put, put_width))) => Some((
                strike,
                StraddleQuote {
                    call,
                    put,
                    width: call_width + put_width,
                },
            )),
            _ => None,
        })
        .collect()
}
