//! Typed failures for the analysis pipeline.
//!
//! Every component returns either a value or one of these. Upstream transport
//! failures never reach this layer; they are absorbed by the data crate's
//! retry and circuit breaker.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::OptionType;

/// Broad class of an analysis failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Not enough data to score; supply more data or skip the ticker.
    InputInsufficiency,
    /// The data itself is corrupt upstream; surface it.
    DataDefect,
    /// The caller passed something malformed.
    InvalidInput,
}

/// Errors produced by the analysis components.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    /// Option chain cannot produce the requested quantity.
    #[error("insufficient chain data for {symbol}: {reason}")]
    InsufficientChainData {
        /// Underlying symbol.
        symbol: String,
        /// What was missing.
        reason: String,
    },

    /// Not enough earnings quarters to compute statistics.
    #[error("insufficient history for {ticker}: need {required} quarters, have {available}")]
    InsufficientHistory {
        ticker: String,
        required: usize,
        available: usize,
    },

    /// No strike in the chain is close enough to a target delta.
    #[error("no valid {option_type} strike for {symbol} near delta {target_delta}")]
    NoValidStrikes {
        symbol: String,
        option_type: OptionType,
        target_delta: String,
    },

    /// Weighted historical mean is zero or negative, so no ratio can be formed.
    #[error("non-positive historical mean move for {ticker}: {mean_pct}")]
    NonPositiveHistoricalMean { ticker: String, mean_pct: f64 },

    /// The same earnings event appears twice in the history.
    #[error("duplicate historical move for {ticker} on {earnings_date}")]
    DuplicateHistory {
        ticker: String,
        earnings_date: NaiveDate,
    },

    /// Malformed caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AnalysisError {
    /// Creates an insufficient chain data error.
    pub fn insufficient_chain(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InsufficientChainData {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Creates an insufficient history error.
    pub fn insufficient_history(ticker: impl Into<String>, required: usize, available: usize) -> Self {
        Self::InsufficientHistory {
            ticker: ticker.into(),
            required,
            available,
        }
    }

    /// Creates a no valid strikes error.
    pub fn no_valid_strikes(
        symbol: impl Into<String>,
        option_type: OptionType,
        target_delta: impl ToString,
    ) -> Self {
        Self::NoValidStrikes {
            symbol: symbol.into(),
            option_type,
            target_delta: target_delta.to_string(),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InsufficientChainData { .. }
            | Self::InsufficientHistory { .. }
            | Self::NoValidStrikes { .. } => ErrorCategory::InputInsufficiency,
            Self::NonPositiveHistoricalMean { .. } | Self::DuplicateHistory { .. } => {
                ErrorCategory::DataDefect
            }
            Self::InvalidInput(_) => ErrorCategory::InvalidInput,
        }
    }

    /// Returns true if more or better input would let the analysis succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::InputInsufficiency
    }

    /// Returns true if the failure points at corrupt upstream data.
    #[must_use]
    pub fn is_data_defect(&self) -> bool {
        self.category() == ErrorCategory::DataDefect
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
