//! Circuit breaker for upstream data sources.
//!
//! CLOSED → OPEN after `failure_threshold` consecutive failures; OPEN →
//! HALF_OPEN once `cooldown` has elapsed; HALF_OPEN → CLOSED on one success,
//! back to OPEN on one failure.
//!
//! ```
//! use ivcrush_data::circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
//!
//! let breaker = CircuitBreaker::new("tradier", BreakerConfig::default().with_failure_threshold(2));
//! breaker.record_failure();
//! breaker.record_failure();
//! assert_eq!(breaker.state(), BreakerState::Open);
//! assert!(breaker.check().is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ResilienceError;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before letting a trial call through.
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

impl BreakerConfig {
    #[must_use]
    pub fn with_failure_threshold(mut self, failures: u32) -> Self {
        self.failure_threshold = failures;
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Start of the single call admitted while HALF_OPEN.
    trial_started: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
}

/// Rejection returned while the breaker is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerOpen {
    pub retry_in: Duration,
}

// =============================================================================
// Circuit Breaker
// =============================================================================

/// Per-source breaker; thread-safe behind `parking_lot::RwLock`.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: RwLock<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_started: None,
                total_failures: 0,
                total_successes: 0,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, reporting HALF_OPEN once an open breaker has cooled down.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.read();
        match (inner.state, inner.opened_at) {
            (BreakerState::Open, Some(at)) if at.elapsed() >= self.config.cooldown() => {
                BreakerState::HalfOpen
            }
            (state, _) => state,
        }
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.read().consecutive_failures
    }

    /// Lifetime (successes, failures) counts.
    #[must_use]
    pub fn totals(&self) -> (u64, u64) {
        let inner = self.inner.read();
        (inner.total_successes, inner.total_failures)
    }

    /// Whether a call may proceed now. Moves OPEN to HALF_OPEN after the cooldown.
    ///
    /// HALF_OPEN admits one trial call; other callers are rejected until it
    /// is recorded, or until a trial left unrecorded for a full cooldown is
    /// replaced.
    ///
    /// # Errors
    /// `BreakerOpen` with the remaining cooldown.
    pub fn check(&self) -> Result<(), BreakerOpen> {
        let mut inner = self.inner.write();
        let cooldown = self.config.cooldown();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => {
                let elapsed = inner.trial_started.map_or(cooldown, |at| at.elapsed());
                if elapsed < cooldown {
                    return Err(BreakerOpen {
                        retry_in: cooldown - elapsed,
                    });
                }
                inner.trial_started = Some(Instant::now());
                tracing::debug!(source = %self.name, "Circuit breaker trial call re-issued");
                Ok(())
            }
            BreakerState::Open => {
                let elapsed = inner.opened_at.map_or(cooldown, |at| at.elapsed());
                if elapsed < cooldown {
                    return Err(BreakerOpen {
                        retry_in: cooldown - elapsed,
                    });
                }
                inner.state = BreakerState::HalfOpen;
                inner.trial_started = Some(Instant::now());
                tracing::info!(source = %self.name, "Circuit breaker half-open, admitting a trial call");
                Ok(())
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        inner.trial_started = None;
        if inner.state != BreakerState::Closed {
            tracing::info!(source = %self.name, from = %inner.state, "Circuit breaker closed");
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.trial_started = None;

        let trip = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            BreakerState::Open => false,
        };
        if trip {
            tracing::warn!(
                source = %self.name,
                from = %inner.state,
                failures = inner.consecutive_failures,
                cooldown_ms = self.config.cooldown_ms,
                "Circuit breaker opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Manual reset to CLOSED.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_started = None;
    }

    /// Runs `op` if the breaker allows it and records the outcome.
    ///
    /// Every error from `op` counts as a failure.
    ///
    /// # Errors
    /// `ResilienceError::CircuitOpen` without calling `op`, or whatever `op` returned.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        if let Err(open) = self.check() {
            return Err(ResilienceError::CircuitOpen {
                source_name: self.name.clone(),
                retry_in_ms: u64::try_from(open.retry_in.as_millis()).unwrap_or(u64::MAX),
            });
        }
        let result = op().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Snapshot of one breaker for introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
}

/// One breaker per upstream source, created on first use.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The breaker for `source`, shared by every caller.
    pub fn get(&self, source: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(source) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(
            breakers
                .entry(source.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(source, self.config.clone()))),
        )
    }

    /// Status of every breaker, sorted by name.
    #[must_use]
    pub fn statuses(&self) -> Vec<BreakerStatus> {
        let mut statuses: Vec<BreakerStatus> = self
            .breakers
            .read()
            .values()
            .map(|b| BreakerStatus {
                name: b.name().to_string(),
                state: b.state(),
                consecutive_failures: b.consecutive_failures(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}
