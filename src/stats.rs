//! # Stats
//!
//! $$
//! S=\frac{P\,\bar r-r_f}{\sqrt{P}\,s_r}
//! $$
//!
//! Per-series risk/return statistics. [`RiskStatistics`] is built by explicit factory
//! functions and never mutated afterwards.

pub mod drawdown;
pub mod moments;
pub mod tail;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use self::drawdown::max_drawdown;
use self::moments::moments;
use self::tail::conditional_value_at_risk;
use self::tail::value_at_risk;
use crate::error::Result;
use crate::error::RiskError;
use crate::error::Warning;
use crate::returns::cumulative_growth;
use crate::returns::returns;
use crate::returns::safe_ratio;
use crate::returns::Annualization;
use crate::returns::ReturnKind;
use crate::returns::TRADING_DAYS;

/// Trailing window used when none is configured.
pub const DEFAULT_TRAILING_WINDOW: usize = 30;

/// Inputs shared by every statistic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
  /// Annual risk-free rate subtracted in the Sharpe numerator.
  pub risk_free_rate: f64,
  pub periods_per_year: f64,
  pub return_kind: ReturnKind,
  /// VaR / CVaR confidence level.
  pub confidence: f64,
}

impl Default for StatsConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.0,
      periods_per_year: TRADING_DAYS,
      return_kind: ReturnKind::Simple,
      confidence: 0.95,
    }
  }
}

impl StatsConfig {
  pub fn annualization(&self) -> Annualization {
    Annualization::new(self.periods_per_year)
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if !(self.periods_per_year > 0.0 && self.periods_per_year.is_finite()) {
      return Err(RiskError::invalid_configuration(format!(
        "periods_per_year must be positive, got {}",
        self.periods_per_year
      )));
    }
    if !(self.confidence > 0.0 && self.confidence < 1.0) {
      return Err(RiskError::invalid_configuration(format!(
        "confidence must be in (0, 1), got {}",
        self.confidence
      )));
    }
    if !self.risk_free_rate.is_finite() {
      return Err(RiskError::invalid_configuration("risk_free_rate must be finite"));
    }
    Ok(())
  }
}

/// Risk/return record for one asset or aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskStatistics {
  pub label: String,
  /// Number of return observations.
  pub observations: usize,
  pub mean_return: f64,
  pub std_return: f64,
  pub annualized_return: f64,
  pub annualized_volatility: f64,
  /// 0.0 when volatility is zero; see `warnings`.
  pub sharpe_ratio: f64,
  pub max_drawdown: f64,
  pub skewness: f64,
  pub excess_kurtosis: f64,
  pub value_at_risk: f64,
  pub conditional_value_at_risk: f64,
  /// Growth over the whole sample, `V_T / V_0 - 1`.
  pub total_return: f64,
  pub warnings: Vec<Warning>,
}

impl RiskStatistics {
  /// Statistics of a dense price (or value) path.
  pub fn from_prices(label: impl Into<String>, prices: &[f64], cfg: &StatsConfig) -> Result<Self> {
    let label = label.into();
    let r = returns(prices, cfg.return_kind);
    Self::build(label, &r, prices, cfg)
  }

  /// Statistics of a return series; the value path for drawdown is rebuilt from the returns.
  pub fn from_returns(label: impl Into<String>, r: &[f64], cfg: &StatsConfig) -> Result<Self> {
    let label = label.into();
    let path = cumulative_growth(r, cfg.return_kind);
    Self::build(label, r, &path, cfg)
  }

  fn build(label: String, r: &[f64], path: &[f64], cfg: &StatsConfig) -> Result<Self> {
    cfg.validate()?;
    if r.len() < 2 {
      return Err(RiskError::insufficient_data(
        format!("risk statistics of {label}"),
        2,
        r.len(),
      ));
    }

    let ann = cfg.annualization();
    let m = moments(r)?;
    let annualized_return = ann.mean(m.mean);
    let annualized_volatility = ann.volatility(m.std_dev);

    let mut warnings = Vec::new();
    let sharpe_ratio = match safe_ratio(annualized_return - cfg.risk_free_rate, annualized_volatility)
    {
      Some(s) => s,
      None => {
        warn!(label = %label, "zero volatility, Sharpe ratio reported as 0");
        warnings.push(Warning::ZeroVolatility {
          label: label.clone(),
        });
        0.0
      }
    };

    let total_return = match (path.first(), path.last()) {
      (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
      _ => 0.0,
    };

    Ok(Self {
      observations: r.len(),
      mean_return: m.mean,
      std_return: m.std_dev,
      annualized_return,
      annualized_volatility,
      sharpe_ratio,
      max_drawdown: max_drawdown(path).max_drawdown,
      skewness: m.skewness,
      excess_kurtosis: m.excess_kurtosis,
      value_at_risk: value_at_risk(r, cfg.confidence),
      conditional_value_at_risk: conditional_value_at_risk(r, cfg.confidence),
      total_return,
      warnings,
      label,
    })
  }

  pub fn has_zero_volatility(&self) -> bool {
    self
      .warnings
      .iter()
      .any(|w| matches!(w, Warning::ZeroVolatility { .. }))
  }
}

fn trailing_returns(prices: &[f64], window: usize, kind: ReturnKind) -> Vec<f64> {
  let r = returns(prices, kind);
  let start = r.len().saturating_sub(window);
  r[start..].to_vec()
}

/// Volatility over the last `window` returns (fewer if the history is shorter).
pub fn trailing_volatility(
  prices: &[f64],
  window: usize,
  annualized: bool,
  cfg: &StatsConfig,
) -> Result<f64> {
  let r = trailing_returns(prices, window, cfg.return_kind);
  let m = moments(&r)?;
  Ok(if annualized {
    cfg.annualization().volatility(m.std_dev)
  } else {
    m.std_dev
  })
}

/// Annualized Sharpe ratio over the last `window` returns. Zero volatility gives 0.
pub fn trailing_sharpe(prices: &[f64], window: usize, cfg: &StatsConfig) -> Result<f64> {
  let r = trailing_returns(prices, window, cfg.return_kind);
  let m = moments(&r)?;
  let ann = cfg.annualization();
  Ok(
    safe_ratio(ann.mean(m.mean) - cfg.risk_free_rate, ann.volatility(m.std_dev)).unwrap_or_else(
      || {
        warn!("zero trailing volatility, Sharpe ratio reported as 0");
        0.0
      },
    ),
  )
}
