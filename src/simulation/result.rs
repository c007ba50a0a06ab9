//! # Simulation Result
//!
//! $$
//! \widehat{\operatorname{VaR}}_{95}=V_0-q_{0.05}(V_D),\qquad
//! \widehat{\operatorname{CVaR}}_{95}=V_0-\mathbb E\left[V_D\mid V_D\le q_{0.05}(V_D)\right]
//! $$
//!

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::error::Warning;
use crate::stats::tail::percentile;
use crate::stats::tail::percentile_sorted;

/// Per-period parameters one stream was simulated with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamParameters {
  pub label: String,
  pub mean: f64,
  pub volatility: f64,
}

/// `simulations x (days + 1)` value table; column 0 is the initial value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
  pub(crate) label: String,
  pub(crate) seed: u64,
  pub(crate) initial_value: f64,
  pub(crate) periods_per_year: f64,
  pub(crate) paths: Array2<f64>,
  pub(crate) streams: Vec<StreamParameters>,
  pub(crate) warnings: Vec<Warning>,
}

/// Distribution of final values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
  pub initial_value: f64,
  pub mean: f64,
  pub std: f64,
  pub min: f64,
  pub max: f64,
  pub p5: f64,
  pub p25: f64,
  pub p50: f64,
  pub p75: f64,
  pub p95: f64,
  /// Share of runs ending strictly above the initial value.
  pub probability_positive: f64,
  /// `mean / initial - 1`.
  pub expected_return: f64,
  /// Loss at the 5th percentile, in value units.
  pub value_at_risk_95: f64,
  /// Mean loss over runs at or below the 5th percentile, in value units.
  pub conditional_value_at_risk_95: f64,
}

impl SimulationResult {
  pub fn label(&self) -> &str {
    &self.label
  }

  /// Master seed the run used; pass it back to reproduce the table.
  pub fn seed(&self) -> u64 {
    self.seed
  }

  pub fn initial_value(&self) -> f64 {
    self.initial_value
  }

  pub fn paths(&self) -> &Array2<f64> {
    &self.paths
  }

  pub fn streams(&self) -> &[StreamParameters] {
    &self.streams
  }

  pub fn warnings(&self) -> &[Warning] {
    &self.warnings
  }

  pub fn n_simulations(&self) -> usize {
    self.paths.nrows()
  }

  pub fn n_days(&self) -> usize {
    self.paths.ncols().saturating_sub(1)
  }

  pub fn final_values(&self) -> Array1<f64> {
    self.paths.column(self.n_days()).to_owned()
  }

  pub fn summary(&self) -> SimulationSummary {
    let mut finals = self.final_values().to_vec();
    finals.sort_by(|a, b| a.total_cmp(b));
    let n = finals.len() as f64;
    let v0 = self.initial_value;

    let mean = finals.iter().mean();
    let std = if finals.len() > 1 {
      finals.iter().std_dev()
    } else {
      0.0
    };
    let p5 = percentile_sorted(&finals, 5.0);
    let tail: Vec<f64> = finals.iter().copied().take_while(|&v| v <= p5).collect();
    let tail_mean = if tail.is_empty() {
      p5
    } else {
      tail.iter().sum::<f64>() / tail.len() as f64
    };

    SimulationSummary {
      initial_value: v0,
      mean,
      std,
      min: finals.first().copied().unwrap_or(v0),
      max: finals.last().copied().unwrap_or(v0),
      p5,
      p25: percentile_sorted(&finals, 25.0),
      p50: percentile_sorted(&finals, 50.0),
      p75: percentile_sorted(&finals, 75.0),
      p95: percentile_sorted(&finals, 95.0),
      probability_positive: finals.iter().filter(|&&v| v > v0).count() as f64 / n,
      expected_return: mean / v0 - 1.0,
      value_at_risk_95: v0 - p5,
      conditional_value_at_risk_95: v0 - tail_mean,
    }
  }

  /// Per-day percentile `p` across runs; length `days + 1`.
  pub fn percentile_path(&self, p: f64) -> Array1<f64> {
    self
      .paths
      .axis_iter(Axis(1))
      .map(|col| percentile(&col.to_vec(), p))
      .collect()
  }

  /// Real values: day `t` divided by `(1 + inflation)^(t / periods_per_year)`.
  pub fn deflated(&self, annual_inflation: f64) -> SimulationResult {
    let mut paths = self.paths.clone();
    for (t, mut col) in paths.axis_iter_mut(Axis(1)).enumerate() {
      let factor = (1.0 + annual_inflation).powf(t as f64 / self.periods_per_year);
      col.mapv_inplace(|v| v / factor);
    }
    SimulationResult {
      label: format!("{} (real)", self.label),
      paths,
      ..self.clone()
    }
  }
}
