//! # Simulation Config
//!
//! $$
//! \mu_{\text{period}}=\frac{\mu_{\text{ann}}}{P},\qquad \sigma_{\text{period}}=\frac{\sigma_{\text{ann}}}{\sqrt P}
//! $$
//!

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::composer::Rebalance;
use crate::error::Result;
use crate::error::RiskError;
use crate::returns::Annualization;
use crate::returns::TRADING_DAYS;

/// Default degrees of freedom for [`Distribution::StudentT`].
pub const DEFAULT_DOF: f64 = 5.0;

/// Marginal distribution of one period return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Distribution {
  #[default]
  Normal,
  /// Standardized Student-t with `dof > 2`, rescaled to the target volatility.
  StudentT { dof: f64 },
  /// Gaussian log-return with drift `μ - σ²/2`; prices stay strictly positive.
  LogNormal,
}

impl FromStr for Distribution {
  type Err = RiskError;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "normal" | "gaussian" => Ok(Self::Normal),
      "student_t" | "student-t" | "studentt" | "t" => Ok(Self::StudentT { dof: DEFAULT_DOF }),
      "lognormal" | "log_normal" | "log-normal" => Ok(Self::LogNormal),
      other => Err(RiskError::invalid_configuration(format!(
        "unknown distribution '{other}', expected normal, student_t or lognormal"
      ))),
    }
  }
}

impl Display for Distribution {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Distribution::Normal => write!(f, "normal"),
      Distribution::StudentT { dof } => write!(f, "student_t(dof={dof})"),
      Distribution::LogNormal => write!(f, "lognormal"),
    }
  }
}

/// What is simulated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
  /// One return stream fitted on the historical aggregate value series. Rebalancing has
  /// no meaning here and is ignored.
  Aggregate,
  /// One return stream per asset, composed into the aggregate value each day.
  #[default]
  PerAsset,
}

/// How per-asset streams relate to each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coupling {
  /// Assets drawn independently of each other.
  #[default]
  Independent,
  /// Gaussian draws correlated through the Cholesky factor of the historical correlation
  /// matrix. Student-t streams share one chi-square draw per day.
  Correlated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
  pub simulations: usize,
  /// Horizon in periods; the result has `days + 1` columns.
  pub days: usize,
  pub distribution: Distribution,
  pub mode: SimulationMode,
  pub coupling: Coupling,
  pub rebalance: Rebalance,
  /// Mean return override applied to every stream.
  pub drift: Option<f64>,
  /// Volatility override applied to every stream. Must be non-negative.
  pub volatility: Option<f64>,
  /// Whether `drift` and `volatility` are annual figures.
  pub annualized: bool,
  /// Fall back to the historical mean when `drift` is unset; otherwise 0.
  pub use_historical_drift: bool,
  /// Fall back to the historical volatility when `volatility` is unset; otherwise 0.
  pub use_historical_volatility: bool,
  /// Starting value; defaults to the last historical aggregate value.
  pub initial_value: Option<f64>,
  /// Master seed. A fresh one is drawn (and logged) when unset.
  pub seed: Option<u64>,
  pub parallel: bool,
  pub periods_per_year: f64,
}

impl Default for SimulationConfig {
  fn default() -> Self {
    Self {
      simulations: 1000,
      days: TRADING_DAYS as usize,
      distribution: Distribution::Normal,
      mode: SimulationMode::PerAsset,
      coupling: Coupling::Independent,
      rebalance: Rebalance::None,
      drift: None,
      volatility: None,
      annualized: true,
      use_historical_drift: true,
      use_historical_volatility: true,
      initial_value: None,
      seed: None,
      parallel: true,
      periods_per_year: TRADING_DAYS,
    }
  }
}

impl SimulationConfig {
  /// Horizon given in years, `days = round(years * periods_per_year)`.
  pub fn with_years(mut self, years: f64) -> Self {
    self.days = (years * self.periods_per_year).round().max(0.0) as usize;
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  pub fn annualization(&self) -> Annualization {
    Annualization::new(self.periods_per_year)
  }

  /// Per-period mean: override, else history, else 0.
  pub fn resolve_mean(&self, historical: f64) -> f64 {
    match self.drift {
      Some(d) if self.annualized => self.annualization().period_mean(d),
      Some(d) => d,
      None if self.use_historical_drift => historical,
      None => 0.0,
    }
  }

  /// Per-period volatility: override, else history, else 0.
  pub fn resolve_volatility(&self, historical: f64) -> f64 {
    match self.volatility {
      Some(v) if self.annualized => self.annualization().period_volatility(v),
      Some(v) => v,
      None if self.use_historical_volatility => historical,
      None => 0.0,
    }
  }

  /// Whether any parameter has to come from the historical sample.
  pub fn needs_history(&self) -> bool {
    (self.drift.is_none() && self.use_historical_drift)
      || (self.volatility.is_none() && self.use_historical_volatility)
  }

  pub fn validate(&self) -> Result<()> {
    if self.simulations == 0 {
      return Err(RiskError::invalid_configuration("simulations must be at least 1"));
    }
    if self.days == 0 {
      return Err(RiskError::invalid_configuration("days must be at least 1"));
    }
    if !(self.periods_per_year > 0.0 && self.periods_per_year.is_finite()) {
      return Err(RiskError::invalid_configuration(format!(
        "periods_per_year must be positive, got {}",
        self.periods_per_year
      )));
    }
    if let Distribution::StudentT { dof } = self.distribution {
      if !(dof > 2.0 && dof.is_finite()) {
        return Err(RiskError::invalid_configuration(format!(
          "student_t needs dof > 2 for a finite variance, got {dof}"
        )));
      }
    }
    if let Some(v) = self.volatility {
      if !(v >= 0.0 && v.is_finite()) {
        return Err(RiskError::invalid_configuration(format!(
          "volatility override must be non-negative, got {v}"
        )));
      }
    }
    if let Some(d) = self.drift {
      if !d.is_finite() {
        return Err(RiskError::invalid_configuration("drift override must be finite"));
      }
    }
    if let Some(v0) = self.initial_value {
      if !(v0 > 0.0 && v0.is_finite()) {
        return Err(RiskError::invalid_configuration(format!(
          "initial value must be positive, got {v0}"
        )));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn parses_distribution_names() {
    assert_eq!("normal".parse::<Distribution>().unwrap(), Distribution::Normal);
    assert_eq!(
      "Student_T".parse::<Distribution>().unwrap(),
      Distribution::StudentT { dof: DEFAULT_DOF }
    );
    assert_eq!("lognormal".parse::<Distribution>().unwrap(), Distribution::LogNormal);

    let err = "cauchy".parse::<Distribution>().unwrap_err();
    assert!(matches!(err, RiskError::InvalidConfiguration { .. }));
  }

  #[test]
  fn annual_overrides_are_scaled_to_periods() {
    let cfg = SimulationConfig {
      drift: Some(0.252),
      volatility: Some(0.2),
      ..SimulationConfig::default()
    };
    assert_relative_eq!(cfg.resolve_mean(0.5), 0.001, epsilon = 1e-15);
    assert_relative_eq!(cfg.resolve_volatility(0.5), 0.2 / 252f64.sqrt(), epsilon = 1e-15);
    assert!(!cfg.needs_history());

    let raw = SimulationConfig {
      annualized: false,
      ..cfg
    };
    assert_eq!(raw.resolve_mean(0.5), 0.252);
  }

  #[test]
  fn history_fallback_can_be_switched_off() {
    let cfg = SimulationConfig {
      use_historical_drift: false,
      use_historical_volatility: false,
      ..SimulationConfig::default()
    };
    assert_eq!(cfg.resolve_mean(0.01), 0.0);
    assert_eq!(cfg.resolve_volatility(0.02), 0.0);
    assert!(!cfg.needs_history());

    let hist = SimulationConfig::default();
    assert_eq!(hist.resolve_mean(0.01), 0.01);
    assert_eq!(hist.resolve_volatility(0.02), 0.02);
  }

  #[test]
  fn rejects_degenerate_configurations() {
    let base = SimulationConfig::default();
    for cfg in [
      SimulationConfig {
        simulations: 0,
        ..base.clone()
      },
      SimulationConfig {
        days: 0,
        ..base.clone()
      },
      SimulationConfig {
        distribution: Distribution::StudentT { dof: 2.0 },
        ..base.clone()
      },
      SimulationConfig {
        volatility: Some(-0.1),
        ..base.clone()
      },
      SimulationConfig {
        initial_value: Some(0.0),
        ..base.clone()
      },
    ] {
      assert!(matches!(
        cfg.validate(),
        Err(RiskError::InvalidConfiguration { .. })
      ));
    }
    assert!(base.validate().is_ok());
  }

  #[test]
  fn horizon_in_years() {
    let cfg = SimulationConfig::default().with_years(2.5);
    assert_eq!(cfg.days, 630);
  }
}
