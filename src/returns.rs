//! # Returns
//!
//! $$
//! r_t^{\text{simple}}=\frac{P_t}{P_{t-1}}-1,\qquad r_t^{\log}=\ln\frac{P_t}{P_{t-1}},\qquad
//! \mu_{\text{ann}}=P\,\mu,\ \sigma_{\text{ann}}=\sqrt{P}\,\sigma
//! $$
//!

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::RiskError;

/// Trading periods per year used for annualization unless configured otherwise.
pub const TRADING_DAYS: f64 = 252.0;

/// Denominators below this are treated as zero.
pub const ZERO_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
  #[default]
  Simple,
  Log,
}

impl FromStr for ReturnKind {
  type Err = RiskError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "simple" | "pct" => Ok(Self::Simple),
      "log" | "logarithmic" => Ok(Self::Log),
      other => Err(RiskError::invalid_configuration(format!(
        "unknown return kind '{other}'"
      ))),
    }
  }
}

impl Display for ReturnKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ReturnKind::Simple => write!(f, "simple"),
      ReturnKind::Log => write!(f, "log"),
    }
  }
}

/// Period returns of a dense price column; one entry shorter than `prices`.
pub fn returns(prices: &[f64], kind: ReturnKind) -> Vec<f64> {
  prices
    .windows(2)
    .map(|w| match kind {
      ReturnKind::Simple => w[1] / w[0] - 1.0,
      ReturnKind::Log => (w[1] / w[0]).ln(),
    })
    .collect()
}

/// Rebuild a price path from `initial` and its returns by cumulative product.
pub fn reconstruct_prices(initial: f64, returns: &[f64], kind: ReturnKind) -> Vec<f64> {
  let mut out = Vec::with_capacity(returns.len() + 1);
  out.push(initial);
  let mut level = initial;
  for &r in returns {
    level *= match kind {
      ReturnKind::Simple => 1.0 + r,
      ReturnKind::Log => r.exp(),
    };
    out.push(level);
  }
  out
}

/// Cumulative growth of one unit invested, starting at 1.0.
pub fn cumulative_growth(returns: &[f64], kind: ReturnKind) -> Vec<f64> {
  reconstruct_prices(1.0, returns, kind)
}

/// Annualization factors for a given sampling frequency.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annualization {
  pub periods_per_year: f64,
}

impl Default for Annualization {
  fn default() -> Self {
    Self {
      periods_per_year: TRADING_DAYS,
    }
  }
}

impl Annualization {
  pub fn new(periods_per_year: f64) -> Self {
    Self { periods_per_year }
  }

  pub fn mean(&self, period_mean: f64) -> f64 {
    period_mean * self.periods_per_year
  }

  pub fn volatility(&self, period_std: f64) -> f64 {
    period_std * self.periods_per_year.sqrt()
  }

  /// Inverse of [`Annualization::mean`].
  pub fn period_mean(&self, annual_mean: f64) -> f64 {
    annual_mean / self.periods_per_year
  }

  /// Inverse of [`Annualization::volatility`].
  pub fn period_volatility(&self, annual_std: f64) -> f64 {
    annual_std / self.periods_per_year.sqrt()
  }
}

/// `numerator / denominator`, or `None` when the denominator is numerically zero.
pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
  if denominator.abs() < ZERO_TOLERANCE || !denominator.is_finite() {
    None
  } else {
    Some(numerator / denominator)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn simple_and_log_returns() {
    let prices = [100.0, 110.0, 99.0];
    let simple = returns(&prices, ReturnKind::Simple);
    let log = returns(&prices, ReturnKind::Log);

    assert_eq!(simple.len(), 2);
    assert_relative_eq!(simple[0], 0.1, epsilon = 1e-12);
    assert_relative_eq!(simple[1], -0.1, epsilon = 1e-12);
    assert_relative_eq!(log[0], 1.1f64.ln(), epsilon = 1e-12);
  }

  #[test]
  fn too_short_input_yields_no_returns() {
    assert!(returns(&[], ReturnKind::Simple).is_empty());
    assert!(returns(&[42.0], ReturnKind::Log).is_empty());
  }

  #[test]
  fn log_returns_round_trip_to_prices() {
    let prices = [100.0, 101.5, 99.2, 103.7, 103.7, 98.1, 110.4];
    let r = returns(&prices, ReturnKind::Log);
    let rebuilt = reconstruct_prices(prices[0], &r, ReturnKind::Log);

    assert_eq!(rebuilt.len(), prices.len());
    for (a, b) in rebuilt.iter().zip(prices.iter()) {
      assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
  }

  #[test]
  fn simple_returns_round_trip_to_prices() {
    let prices = [50.0, 52.0, 51.0, 53.0];
    let r = returns(&prices, ReturnKind::Simple);
    let rebuilt = reconstruct_prices(50.0, &r, ReturnKind::Simple);
    for (a, b) in rebuilt.iter().zip(prices.iter()) {
      assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
  }

  #[test]
  fn annualization_scales_mean_and_sqrt_std() {
    let ann = Annualization::default();
    assert_relative_eq!(ann.mean(0.001), 0.252, epsilon = 1e-12);
    assert_relative_eq!(ann.volatility(0.01), 0.01 * 252f64.sqrt(), epsilon = 1e-12);
    assert_relative_eq!(ann.period_mean(ann.mean(0.0007)), 0.0007, epsilon = 1e-15);
    assert_relative_eq!(ann.period_volatility(ann.volatility(0.02)), 0.02, epsilon = 1e-15);
  }

  #[test]
  fn safe_ratio_rejects_zero_denominator() {
    assert_eq!(safe_ratio(1.0, 0.0), None);
    assert_eq!(safe_ratio(1.0, 1e-15), None);
    assert_eq!(safe_ratio(1.0, 2.0), Some(0.5));
  }

  #[test]
  fn return_kind_parses() {
    assert_eq!("log".parse::<ReturnKind>().unwrap(), ReturnKind::Log);
    assert_eq!("Simple".parse::<ReturnKind>().unwrap(), ReturnKind::Simple);
    assert!("geometric".parse::<ReturnKind>().is_err());
  }
}
