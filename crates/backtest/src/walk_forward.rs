//! Walk-forward validation across candidate scoring configs.
//!
//! Each window runs TRAIN → SELECT → TEST → ROLL:
//!
//! 1. every candidate config is replayed over the training window, in parallel;
//! 2. the config with the best position-weighted training Sharpe is selected;
//! 3. that config, unmodified, is replayed over the following test window;
//! 4. the window start advances by `step_days`.
//!
//! Only test-window trades enter the out-of-sample summary. Training results
//! are kept per window for diagnostics and for the degradation reading.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use ivcrush_core::config::{ConfigError, ScoringConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::engine::BacktestEngine;
use crate::metrics::{BacktestMetrics, BacktestResult};
use crate::trade::{BacktestEvent, SimulatedTrade};

/// Window lengths in calendar days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardParams {
    pub train_window_days: i64,
    pub test_window_days: i64,
    pub step_days: i64,
}

impl Default for WalkForwardParams {
    fn default() -> Self {
        Self {
            train_window_days: 180,
            test_window_days: 90,
            step_days: 90,
        }
    }
}

impl WalkForwardParams {
    #[must_use]
    pub fn new(train_window_days: i64, test_window_days: i64, step_days: i64) -> Self {
        Self {
            train_window_days,
            test_window_days,
            step_days,
        }
    }

    /// # Errors
    /// `WalkForwardError::InvalidParams` if any length is not positive.
    pub fn validate(&self) -> Result<(), WalkForwardError> {
        if self.train_window_days <= 0 || self.test_window_days <= 0 || self.step_days <= 0 {
            return Err(WalkForwardError::InvalidParams(format!(
                "window lengths must be positive (train {}, test {}, step {})",
                self.train_window_days, self.test_window_days, self.step_days
            )));
        }
        Ok(())
    }
}

/// Half-open calendar range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// # Errors
    /// `WalkForwardError::InvalidRange` unless `start < end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WalkForwardError> {
        if start >= end {
            return Err(WalkForwardError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub train_start: NaiveDate,
    /// Exclusive; equals `test_start`.
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

impl WalkForwardWindow {
    /// Train strictly precedes test.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.train_start < self.train_end
            && self.train_end <= self.test_start
            && self.test_start < self.test_end
    }

    #[must_use]
    pub fn in_test(&self, date: NaiveDate) -> bool {
        date >= self.test_start && date < self.test_end
    }
}

/// Rolling windows over `range`; stops before a test window would pass `range.end`.
#[must_use]
pub fn generate_windows(range: &DateRange, params: &WalkForwardParams) -> Vec<WalkForwardWindow> {
    if params.validate().is_err() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut train_start = range.start;
    loop {
        let train_end = train_start + Duration::days(params.train_window_days);
        let test_end = train_end + Duration::days(params.test_window_days);
        if test_end > range.end {
            break;
        }
        windows.push(WalkForwardWindow {
            index: windows.len(),
            train_start,
            train_end,
            test_start: train_end,
            test_end,
        });
        train_start += Duration::days(params.step_days);
    }
    windows
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WalkForwardError {
    #[error("no candidate configs supplied")]
    NoConfigs,

    #[error("duplicate config name: {0}")]
    DuplicateConfig(String),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("invalid walk-forward params: {0}")]
    InvalidParams(String),

    #[error("invalid date range: {start} is not before {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("range {start}..{end} fits no {train}+{test} day window")]
    NoWindows {
        start: NaiveDate,
        end: NaiveDate,
        train: i64,
        test: i64,
    },

    #[error("backtest task failed: {0}")]
    TaskFailed(String),
}

/// One config's training score within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRanking {
    pub config_name: String,
    pub equity_sharpe: f64,
    pub equity_pnl: f64,
    pub sharpe_ratio: f64,
    pub total_pnl: f64,
    pub total_trades: usize,
    pub win_rate: f64,
}

impl From<&BacktestResult> for ConfigRanking {
    fn from(result: &BacktestResult) -> Self {
        Self {
            config_name: result.config_name.clone(),
            equity_sharpe: result.metrics.equity_sharpe,
            equity_pnl: result.metrics.equity_pnl,
            sharpe_ratio: result.metrics.sharpe_ratio,
            total_pnl: result.metrics.total_pnl,
            total_trades: result.metrics.total_trades,
            win_rate: result.metrics.win_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowResult {
    pub window: WalkForwardWindow,
    /// Training scores, best first. Diagnostic only.
    pub train_rankings: Vec<ConfigRanking>,
    pub selected_config: String,
    /// The selected config's training trades.
    pub selected_train: BacktestResult,
    /// The selected config over the test window.
    pub test: BacktestResult,
}

/// Risk level for overfitting based on performance degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverfittingRisk {
    /// Degradation at most 5%.
    Low,
    /// Up to 10%.
    Medium,
    /// Up to 20%.
    High,
    Severe,
}

impl OverfittingRisk {
    /// Classifies the relative drop in win rate from in-sample to out-of-sample.
    #[must_use]
    pub fn from_degradation(degradation_ratio: f64) -> Self {
        if degradation_ratio <= 0.05 {
            Self::Low
        } else if degradation_ratio <= 0.10 {
            Self::Medium
        } else if degradation_ratio <= 0.20 {
            Self::High
        } else {
            Self::Severe
        }
    }
}

/// In-sample vs out-of-sample comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDegradation {
    /// OOS win rate over IS win rate (1.0 = no degradation).
    pub win_rate_ratio: f64,
    /// IS minus OOS win rate.
    pub win_rate_diff: f64,
    /// IS minus OOS Sharpe.
    pub sharpe_diff: f64,
    pub overfitting_risk: OverfittingRisk,
}

impl PerformanceDegradation {
    #[must_use]
    pub fn from_metrics(in_sample: &BacktestMetrics, out_of_sample: &BacktestMetrics) -> Self {
        let (win_rate_ratio, degradation_ratio) = if in_sample.win_rate > 0.0 {
            (
                out_of_sample.win_rate / in_sample.win_rate,
                (in_sample.win_rate - out_of_sample.win_rate) / in_sample.win_rate,
            )
        } else {
            (1.0, 0.0)
        };

        Self {
            win_rate_ratio,
            win_rate_diff: in_sample.win_rate - out_of_sample.win_rate,
            sharpe_diff: in_sample.sharpe_ratio - out_of_sample.sharpe_ratio,
            overfitting_risk: OverfittingRisk::from_degradation(degradation_ratio),
        }
    }
}

/// Result of a full walk-forward run.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardSummary {
    pub params: WalkForwardParams,
    pub range: DateRange,
    pub windows: Vec<WindowResult>,
    /// Aggregate of test-window trades only.
    pub out_of_sample: BacktestMetrics,
    /// Aggregate of the selected configs' training trades, for degradation only.
    pub in_sample: BacktestMetrics,
    pub degradation: PerformanceDegradation,
    /// How many windows selected each config.
    pub selection_counts: BTreeMap<String, usize>,
}

impl WalkForwardSummary {
    #[must_use]
    pub fn num_windows(&self) -> usize {
        self.windows.len()
    }

    /// Every out-of-sample trade, window by window.
    pub fn out_of_sample_trades(&self) -> impl Iterator<Item = &SimulatedTrade> {
        self.windows.iter().flat_map(|w| w.test.trades.iter())
    }

    /// Test-window events skipped for insufficient or defective inputs.
    #[must_use]
    pub fn excluded_count(&self) -> usize {
        self.windows.iter().map(|w| w.test.excluded_count()).sum()
    }

    /// Out-of-sample edge is credible and the drop from training is modest.
    #[must_use]
    pub fn passed_validation(&self) -> bool {
        self.out_of_sample.has_edge()
            && matches!(
                self.degradation.overfitting_risk,
                OverfittingRisk::Low | OverfittingRisk::Medium
            )
    }
}

/// Drives walk-forward runs over a fixed event set.
#[derive(Clone)]
pub struct WalkForwardRunner {
    engine: BacktestEngine,
    events: Arc<Vec<BacktestEvent>>,
}

impl WalkForwardRunner {
    #[must_use]
    pub fn new(engine: BacktestEngine, events: Vec<BacktestEvent>) -> Self {
        Self {
            engine,
            events: Arc::new(events),
        }
    }

    /// Runs walk-forward validation of `configs` over `range`.
    ///
    /// # Errors
    /// Invalid configs or params, an empty config list, a range too short for
    /// one window, or a panicked replay task.
    pub async fn backtest(
        &self,
        configs: &[ScoringConfig],
        range: DateRange,
        params: &WalkForwardParams,
    ) -> Result<WalkForwardSummary, WalkForwardError> {
        if configs.is_empty() {
            return Err(WalkForwardError::NoConfigs);
        }
        let mut names = HashSet::with_capacity(configs.len());
        for config in configs {
            config.validate()?;
            if !names.insert(config.name.as_str()) {
                return Err(WalkForwardError::DuplicateConfig(config.name.clone()));
            }
        }
        params.validate()?;

        let windows = generate_windows(&range, params);
        if windows.is_empty() {
            return Err(WalkForwardError::NoWindows {
                start: range.start,
                end: range.end,
                train: params.train_window_days,
                test: params.test_window_days,
            });
        }

        let configs: Vec<Arc<ScoringConfig>> = configs.iter().cloned().map(Arc::new).collect();
        let mut results = Vec::with_capacity(windows.len());
        for window in windows {
            results.push(self.run_window(&configs, window).await?);
        }

        Ok(summarize(params.clone(), range, results))
    }

    async fn run_window(
        &self,
        configs: &[Arc<ScoringConfig>],
        window: WalkForwardWindow,
    ) -> Result<WindowResult, WalkForwardError> {
        tracing::debug!(
            window = window.index,
            train_start = %window.train_start,
            train_end = %window.train_end,
            candidates = configs.len(),
            "Walk-forward train phase"
        );
        let mut trained = self.train(configs, &window).await?;
        rank(&mut trained);
        let train_rankings: Vec<ConfigRanking> = trained.iter().map(ConfigRanking::from).collect();

        let Some(selected_train) = trained.into_iter().next() else {
            return Err(WalkForwardError::NoConfigs);
        };
        let Some(selected) = configs
            .iter()
            .find(|c| c.name == selected_train.config_name)
            .cloned()
        else {
            return Err(WalkForwardError::NoConfigs);
        };
        tracing::info!(
            window = window.index,
            config = %selected.name,
            train_sharpe = selected_train.metrics.equity_sharpe,
            train_equity_pnl = selected_train.metrics.equity_pnl,
            train_trades = selected_train.metrics.total_trades,
            "Walk-forward config selected"
        );

        let engine = self.engine.clone();
        let events = Arc::clone(&self.events);
        let (start, end) = (window.test_start, window.test_end);
        let test = tokio::task::spawn_blocking(move || {
            engine.run(&selected, events.iter().filter(|e| e.within(start, end)))
        })
        .await
        .map_err(|e| WalkForwardError::TaskFailed(e.to_string()))?;

        tracing::info!(
            window = window.index,
            config = %test.config_name,
            test_start = %window.test_start,
            test_end = %window.test_end,
            trades = test.metrics.total_trades,
            pnl = test.metrics.total_pnl,
            equity_pnl = test.metrics.equity_pnl,
            sharpe = test.metrics.equity_sharpe,
            "Walk-forward test phase complete"
        );

        Ok(WindowResult {
            window,
            train_rankings,
            selected_config: selected_train.config_name.clone(),
            selected_train,
            test,
        })
    }

    async fn train(
        &self,
        configs: &[Arc<ScoringConfig>],
        window: &WalkForwardWindow,
    ) -> Result<Vec<BacktestResult>, WalkForwardError> {
        let mut tasks = JoinSet::new();
        for config in configs {
            let engine = self.engine.clone();
            let events = Arc::clone(&self.events);
            let config = Arc::clone(config);
            let (start, end) = (window.train_start, window.train_end);
            tasks.spawn_blocking(move || {
                engine.run(&config, events.iter().filter(|e| e.within(start, end)))
            });
        }

        let mut results = Vec::with_capacity(configs.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.map_err(|e| WalkForwardError::TaskFailed(e.to_string()))?);
        }
        Ok(results)
    }
}

/// Best first: position-weighted Sharpe, then position-weighted P&L, then
/// name for determinism.
///
/// Sharpe is compared at nine decimals: it is invariant to a uniform position
/// size, so configs that differ only in sizing tie on it up to rounding and
/// are separated by P&L.
fn rank(results: &mut [BacktestResult]) {
    let sharpe_key = |r: &BacktestResult| (r.metrics.equity_sharpe * 1e9).round();
    results.sort_by(|a, b| {
        sharpe_key(b)
            .total_cmp(&sharpe_key(a))
            .then_with(|| b.metrics.equity_pnl.total_cmp(&a.metrics.equity_pnl))
            .then_with(|| a.config_name.cmp(&b.config_name))
    });
}

fn summarize(
    params: WalkForwardParams,
    range: DateRange,
    windows: Vec<WindowResult>,
) -> WalkForwardSummary {
    let oos_trades: Vec<SimulatedTrade> = windows
        .iter()
        .flat_map(|w| w.test.trades.iter().cloned())
        .collect();
    let is_trades: Vec<SimulatedTrade> = windows
        .iter()
        .flat_map(|w| w.selected_train.trades.iter().cloned())
        .collect();

    let out_of_sample = BacktestMetrics::from_trades(&oos_trades);
    let in_sample = BacktestMetrics::from_trades(&is_trades);
    let degradation = PerformanceDegradation::from_metrics(&in_sample, &out_of_sample);

    let mut selection_counts = BTreeMap::new();
    for w in &windows {
        *selection_counts.entry(w.selected_config.clone()).or_insert(0) += 1;
    }

    tracing::info!(
        windows = windows.len(),
        oos_trades = out_of_sample.total_trades,
        oos_win_rate = out_of_sample.win_rate,
        oos_sharpe = out_of_sample.sharpe_ratio,
        risk = ?degradation.overfitting_risk,
        "Walk-forward complete"
    );

    WalkForwardSummary {
        params,
        range,
        windows,
        out_of_sample,
        in_sample,
        degradation,
        selection_counts,
    }
}
