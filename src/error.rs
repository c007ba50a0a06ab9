//! # Errors
//!
//! $$
//! \text{call} \mapsto \text{Ok}(x) \mid \text{Err}(e),\qquad \text{degenerate} \mapsto (x_{\text{sentinel}}, w)
//! $$
//!
//! Hard failures are [`RiskError`]. Degenerate numeric cases resolve to a sentinel
//! value and carry a [`Warning`] so they stay distinguishable from real results.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RiskError>;

/// Failures that abort the requested computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
  /// Fewer observations than a statistic needs.
  #[error("insufficient data for {context}: need at least {required} observations, got {available}")]
  InsufficientData {
    context: String,
    required: usize,
    available: usize,
  },

  /// Symbol/weight mismatch, negative or all-zero weights.
  #[error("invalid weighting: {message}")]
  InvalidWeighting { message: String },

  /// Out-of-range or unknown configuration value.
  #[error("invalid configuration: {message}")]
  InvalidConfiguration { message: String },

  /// A price series that violates its construction invariants.
  #[error("invalid price series {symbol}: {message}")]
  InvalidSeries { symbol: String, message: String },
}

impl RiskError {
  pub fn insufficient_data(context: impl Into<String>, required: usize, available: usize) -> Self {
    Self::InsufficientData {
      context: context.into(),
      required,
      available,
    }
  }

  pub fn invalid_weighting(message: impl Into<String>) -> Self {
    Self::InvalidWeighting {
      message: message.into(),
    }
  }

  pub fn invalid_configuration(message: impl Into<String>) -> Self {
    Self::InvalidConfiguration {
      message: message.into(),
    }
  }

  pub fn invalid_series(symbol: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidSeries {
      symbol: symbol.into(),
      message: message.into(),
    }
  }
}

/// Degenerate conditions resolved locally with a sentinel value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
  /// Two series share no usable dates; their correlation defaults to 0.
  NoOverlap { left: String, right: String },
  /// A series has (numerically) zero dispersion; ratios fell back to sentinels.
  ZeroVolatility { label: String },
  /// Pairwise correlation above the configured threshold.
  HighCorrelation {
    left: String,
    right: String,
    correlation: f64,
  },
  /// Simulated returns at or below -100% were clamped to -100%.
  ReturnClamped { count: usize },
  /// Correlation matrix had no Cholesky factor; assets were sampled independently.
  IndependentFallback,
  /// Alignment discarded dates that could not be filled densely.
  DatesDropped { count: usize },
  /// Holding has fewer assets than a diversified portfolio would.
  FewAssets { count: usize },
  /// A single asset carries more than half of the weight.
  Concentration { symbol: String, weight: f64 },
  /// Annualized volatility above the configured ceiling.
  HighVolatility { volatility: f64 },
  /// Risk-adjusted return is negative.
  NegativeSharpe { sharpe: f64 },
  /// Risk-adjusted return is positive but below 1.
  LowSharpe { sharpe: f64 },
}

impl std::fmt::Display for Warning {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Warning::NoOverlap { left, right } => {
        write!(f, "no overlapping observations between {left} and {right}")
      }
      Warning::ZeroVolatility { label } => write!(f, "zero volatility for {label}"),
      Warning::HighCorrelation {
        left,
        right,
        correlation,
      } => write!(f, "high correlation {correlation:.3} between {left} and {right}"),
      Warning::ReturnClamped { count } => {
        write!(f, "{count} simulated returns clamped at -100%")
      }
      Warning::IndependentFallback => {
        write!(f, "correlation matrix not positive definite, assets sampled independently")
      }
      Warning::DatesDropped { count } => write!(f, "{count} dates dropped during alignment"),
      Warning::FewAssets { count } => write!(f, "holding has only {count} assets"),
      Warning::Concentration { symbol, weight } => {
        write!(f, "concentration of {weight:.3} in {symbol}")
      }
      Warning::HighVolatility { volatility } => {
        write!(f, "high annualized volatility {volatility:.3}")
      }
      Warning::NegativeSharpe { sharpe } => write!(f, "negative Sharpe ratio {sharpe:.3}"),
      Warning::LowSharpe { sharpe } => write!(f, "Sharpe ratio {sharpe:.3} below 1"),
    }
  }
}
