//! Concurrent analysis of many tickers with partial-failure semantics.
//!
//! Each request runs [`analyze`] on Tokio's blocking pool; a semaphore bounds
//! how many run at once. A failed ticker is recorded and the batch goes on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use ivcrush_core::config::ScoringConfig;
use ivcrush_core::error::AnalysisError;
use ivcrush_core::types::{HistoricalMove, OptionChainSnapshot};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::pipeline::{analyze, AnalysisResult};

/// Inputs for one event, owned so they can move onto a worker.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub ticker: String,
    pub earnings_date: NaiveDate,
    pub chain: OptionChainSnapshot,
    pub history: Vec<HistoricalMove>,
}

/// Why one request in a batch produced no result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BatchError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// The worker panicked or was cancelled.
    #[error("analysis task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub ticker: String,
    pub earnings_date: NaiveDate,
    pub error: BatchError,
}

/// Outcome of a batch. Both lists are sorted by (ticker, earnings date).
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub successes: Vec<AnalysisResult>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.successes.len() as f64 / self.total() as f64
    }

    /// Failures that more or better input would fix.
    pub fn recoverable_failures(&self) -> impl Iterator<Item = &BatchFailure> {
        self.failures.iter().filter(|f| match &f.error {
            BatchError::Analysis(e) => e.is_recoverable(),
            BatchError::TaskFailed(_) => false,
        })
    }
}

/// Analyzes every request with at most `max_concurrency` in flight.
pub async fn analyze_batch(
    requests: Vec<AnalysisRequest>,
    config: Arc<ScoringConfig>,
    max_concurrency: usize,
) -> BatchReport {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut keys = HashMap::with_capacity(requests.len());
    let submitted = requests.len();

    for request in requests {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let config = Arc::clone(&config);
        let key = (request.ticker.clone(), request.earnings_date);
        let handle = tasks.spawn_blocking(move || {
            let _permit = permit;
            analyze(
                &request.ticker,
                request.earnings_date,
                &request.chain,
                &request.history,
                &config,
            )
        });
        keys.insert(handle.id(), key);
    }

    let mut report = BatchReport::default();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, Ok(result))) => report.successes.push(result),
            Ok((id, Err(error))) => {
                if let Some((ticker, earnings_date)) = keys.remove(&id) {
                    tracing::warn!(ticker = %ticker, %earnings_date, %error, "Ticker analysis failed");
                    report.failures.push(BatchFailure {
                        ticker,
                        earnings_date,
                        error: error.into(),
                    });
                }
            }
            Err(join_error) => {
                if let Some((ticker, earnings_date)) = keys.remove(&join_error.id()) {
                    tracing::error!(ticker = %ticker, %earnings_date, error = %join_error, "Analysis task failed");
                    report.failures.push(BatchFailure {
                        ticker,
                        earnings_date,
                        error: BatchError::TaskFailed(join_error.to_string()),
                    });
                }
            }
        }
    }

    report
        .successes
        .sort_by(|a, b| (&a.ticker, a.earnings_date).cmp(&(&b.ticker, b.earnings_date)));
    report
        .failures
        .sort_by(|a, b| (&a.ticker, a.earnings_date).cmp(&(&b.ticker, b.earnings_date)));

    tracing::info!(
        submitted,
        succeeded = report.successes.len(),
        failed = report.failures.len(),
        "Batch analysis complete"
    );
    report
}
