//! Directional bias read from the volatility skew.
//!
//! Seven closed levels, grouped into bullish, bearish and neutral families.
//! Family and strength are derived by `match`, never by comparing strings, so
//! a misspelled level is a compile error (or a parse error at the boundary)
//! instead of a silent fallback to neutral.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Seven-level directional bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectionalBias {
    StrongBearish,
    ModerateBearish,
    WeakBearish,
    Neutral,
    WeakBullish,
    ModerateBullish,
    StrongBullish,
}

/// Which way the bias leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiasFamily {
    Bearish,
    Neutral,
    Bullish,
}

/// How hard the bias leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BiasStrength {
    None,
    Weak,
    Moderate,
    Strong,
}

impl DirectionalBias {
    /// All levels from most bearish to most bullish.
    pub const ALL: [Self; 7] = [
        Self::StrongBearish,
        Self::ModerateBearish,
        Self::WeakBearish,
        Self::Neutral,
        Self::WeakBullish,
        Self::ModerateBullish,
        Self::StrongBullish,
    ];

    /// Combines a family and a strength. Either side being neutral yields `Neutral`.
    #[must_use]
    pub const fn from_parts(family: BiasFamily, strength: BiasStrength) -> Self {
        match (family, strength) {
            (BiasFamily::Neutral, _) | (_, BiasStrength::None) => Self::Neutral,
            (BiasFamily::Bullish, BiasStrength::Weak) => Self::WeakBullish,
            (BiasFamily::Bullish, BiasStrength::Moderate) => Self::ModerateBullish,
            (BiasFamily::Bullish, BiasStrength::Strong) => Self::StrongBullish,
            (BiasFamily::Bearish, BiasStrength::Weak) => Self::WeakBearish,
            (BiasFamily::Bearish, BiasStrength::Moderate) => Self::ModerateBearish,
            (BiasFamily::Bearish, BiasStrength::Strong) => Self::StrongBearish,
        }
    }

    #[must_use]
    pub const fn family(self) -> BiasFamily {
        match self {
            Self::StrongBearish | Self::ModerateBearish | Self::WeakBearish => BiasFamily::Bearish,
            Self::Neutral => BiasFamily::Neutral,
            Self::WeakBullish | Self::ModerateBullish | Self::StrongBullish => BiasFamily::Bullish,
        }
    }

    #[must_use]
    pub const fn strength(self) -> BiasStrength {
        match self {
            Self::StrongBearish | Self::StrongBullish => BiasStrength::Strong,
            Self::ModerateBearish | Self::ModerateBullish => BiasStrength::Moderate,
            Self::WeakBearish | Self::WeakBullish => BiasStrength::Weak,
            Self::Neutral => BiasStrength::None,
        }
    }

    #[must_use]
    pub const fn is_bullish(self) -> bool {
        matches!(self.family(), BiasFamily::Bullish)
    }

    #[must_use]
    pub const fn is_bearish(self) -> bool {
        matches!(self.family(), BiasFamily::Bearish)
    }

    #[must_use]
    pub const fn is_neutral(self) -> bool {
        matches!(self, Self::Neutral)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrongBearish => "STRONG_BEARISH",
            Self::ModerateBearish => "MODERATE_BEARISH",
            Self::WeakBearish => "WEAK_BEARISH",
            Self::Neutral => "NEUTRAL",
            Self::WeakBullish => "WEAK_BULLISH",
            Self::ModerateBullish => "MODERATE_BULLISH",
            Self::StrongBullish => "STRONG_BULLISH",
        }
    }
}

impl fmt::Display for DirectionalBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised bias label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown directional bias: {0}")]
pub struct ParseBiasError(pub String);

impl FromStr for DirectionalBias {
    type Err = ParseBiasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseBiasError(s.to_string()))
    }
}
