//! # Holding
//!
//! $$
//! w_i=\frac{\tilde w_i}{\sum_j \tilde w_j},\qquad V_t=\sum_i w_i P_{i,t}
//! $$
//!
//! A weighted set of price series and everything derived from it on demand: the aligned
//! table, the aggregate value path, risk statistics and Monte Carlo projections.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::alignment::align;
use crate::alignment::AlignedPrices;
use crate::alignment::AlignmentPolicy;
use crate::composer::AggregateValueComposer;
use crate::composer::Rebalance;
use crate::correlation::diversification_ratio;
use crate::correlation::CorrelationConfig;
use crate::correlation::CorrelationMatrix;
use crate::error::Result;
use crate::error::RiskError;
use crate::error::Warning;
use crate::series::PriceSeries;
use crate::simulation::MonteCarloSimulator;
use crate::simulation::SimulationConfig;
use crate::simulation::SimulationResult;
use crate::stats::RiskStatistics;
use crate::stats::StatsConfig;

/// Below this many assets a holding is flagged as poorly diversified.
pub const MIN_DIVERSIFIED_ASSETS: usize = 3;
/// Largest single weight before a concentration warning.
pub const MAX_SINGLE_WEIGHT: f64 = 0.5;
/// Annualized volatility above which the aggregate is flagged.
pub const HIGH_VOLATILITY: f64 = 0.30;
/// Sharpe ratio below which the aggregate is flagged as weak.
pub const LOW_SHARPE: f64 = 1.0;

/// Normalized symbol to weight mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weighting {
  symbols: Vec<String>,
  weights: Vec<f64>,
}

impl Weighting {
  /// Pair `symbols` with `weights` by position and normalize to sum 1.
  pub fn new<S: AsRef<str>>(symbols: &[S], weights: &[f64]) -> Result<Self> {
    if symbols.is_empty() {
      return Err(RiskError::invalid_weighting("no symbols"));
    }
    if symbols.len() != weights.len() {
      return Err(RiskError::invalid_weighting(format!(
        "{} symbols but {} weights",
        symbols.len(),
        weights.len()
      )));
    }

    let mut seen = HashSet::new();
    for s in symbols {
      if !seen.insert(s.as_ref()) {
        return Err(RiskError::invalid_weighting(format!(
          "duplicate symbol '{}'",
          s.as_ref()
        )));
      }
    }

    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
      return Err(RiskError::invalid_weighting(format!(
        "weights must be finite and non-negative, got {bad}"
      )));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
      return Err(RiskError::invalid_weighting("weights sum to zero"));
    }

    Ok(Self {
      symbols: symbols.iter().map(|s| s.as_ref().to_string()).collect(),
      weights: weights.iter().map(|w| w / total).collect(),
    })
  }

  pub fn equal<S: AsRef<str>>(symbols: &[S]) -> Result<Self> {
    Self::new(symbols, &vec![1.0; symbols.len()])
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn weights(&self) -> &[f64] {
    &self.weights
  }

  pub fn weight_of(&self, symbol: &str) -> Option<f64> {
    self
      .symbols
      .iter()
      .position(|s| s == symbol)
      .map(|i| self.weights[i])
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self
      .symbols
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }
}

/// Dated aggregate value path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueSeries {
  pub dates: Vec<NaiveDate>,
  pub values: Vec<f64>,
}

/// Everything [`Holding::statistics`] reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HoldingStatistics {
  pub name: String,
  pub aggregate: RiskStatistics,
  pub assets: Vec<RiskStatistics>,
  pub correlation: CorrelationMatrix,
  pub diversification_ratio: f64,
  pub weights: Weighting,
  /// Alignment, diversification and quality diagnostics.
  pub warnings: Vec<Warning>,
}

/// A named, weighted set of price series. Immutable; every figure is recomputed on demand.
#[derive(Clone, Debug)]
pub struct Holding<'a> {
  name: String,
  assets: Vec<&'a PriceSeries>,
  weighting: Weighting,
  policy: AlignmentPolicy,
}

impl<'a> Holding<'a> {
  /// Build a holding; `weights` defaults to equal weights and is paired with `assets` by
  /// position.
  pub fn new(
    name: impl Into<String>,
    assets: Vec<&'a PriceSeries>,
    weights: Option<&[f64]>,
  ) -> Result<Self> {
    let symbols: Vec<&str> = assets.iter().map(|s| s.symbol()).collect();
    let weighting = match weights {
      Some(w) => Weighting::new(&symbols, w)?,
      None => Weighting::equal(&symbols)?,
    };
    let name = name.into();
    debug!(holding = %name, assets = assets.len(), "holding created");

    Ok(Self {
      name,
      assets,
      weighting,
      policy: AlignmentPolicy::default(),
    })
  }

  pub fn with_alignment(mut self, policy: AlignmentPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn assets(&self) -> &[&'a PriceSeries] {
    &self.assets
  }

  pub fn weighting(&self) -> &Weighting {
    &self.weighting
  }

  pub fn alignment(&self) -> AlignmentPolicy {
    self.policy
  }

  pub fn aligned(&self) -> AlignedPrices {
    align(&self.assets, self.policy)
  }

  /// Historical aggregate value, `Σ w_i P_{i,t}` on the aligned dates.
  pub fn value_series(&self, rebalance: Rebalance, periods_per_year: f64) -> ValueSeries {
    let aligned = self.aligned();
    let values = AggregateValueComposer::new(self.weighting.weights(), rebalance)
      .with_periods_per_year(periods_per_year)
      .compose(aligned.closes().view());
    ValueSeries {
      dates: aligned.dates().to_vec(),
      values: values.to_vec(),
    }
  }

  /// Per-asset and aggregate statistics on the aligned history.
  pub fn statistics(&self, stats: &StatsConfig, corr: &CorrelationConfig) -> Result<HoldingStatistics> {
    let aligned = self.aligned();
    let mut warnings = aligned.warnings().to_vec();

    let weights = self.weighting.weights();
    let values = AggregateValueComposer::new(weights, Rebalance::None)
      .with_periods_per_year(stats.periods_per_year)
      .compose(aligned.closes().view())
      .to_vec();
    let aggregate = RiskStatistics::from_prices(self.name.clone(), &values, stats)?;

    let assets = aligned
      .symbols()
      .iter()
      .enumerate()
      .map(|(i, symbol)| RiskStatistics::from_prices(symbol.clone(), &aligned.column(i).to_vec(), stats))
      .collect::<Result<Vec<_>>>()?;

    let correlation = CorrelationMatrix::from_aligned(&aligned, corr);
    warnings.extend_from_slice(correlation.warnings());

    let vols: Vec<f64> = assets.iter().map(|a| a.annualized_volatility).collect();
    let (ratio, ratio_warning) =
      diversification_ratio(weights, &vols, aggregate.annualized_volatility, &self.name);
    warnings.extend(ratio_warning);
    warnings.extend(self.diagnostics(&aggregate));

    for w in &warnings {
      debug!(holding = %self.name, warning = %w, "holding diagnostic");
    }

    Ok(HoldingStatistics {
      name: self.name.clone(),
      aggregate,
      assets,
      correlation,
      diversification_ratio: ratio,
      weights: self.weighting.clone(),
      warnings,
    })
  }

  fn diagnostics(&self, aggregate: &RiskStatistics) -> Vec<Warning> {
    let mut out = Vec::new();

    if self.weighting.len() < MIN_DIVERSIFIED_ASSETS {
      out.push(Warning::FewAssets {
        count: self.weighting.len(),
      });
    }
    if let Some((symbol, weight)) = self
      .weighting
      .iter()
      .max_by(|a, b| a.1.total_cmp(&b.1))
      .filter(|(_, w)| *w > MAX_SINGLE_WEIGHT)
    {
      out.push(Warning::Concentration {
        symbol: symbol.to_string(),
        weight,
      });
    }
    if aggregate.annualized_volatility > HIGH_VOLATILITY {
      out.push(Warning::HighVolatility {
        volatility: aggregate.annualized_volatility,
      });
    }
    if !aggregate.has_zero_volatility() {
      if aggregate.sharpe_ratio < 0.0 {
        warn!(holding = %self.name, sharpe = aggregate.sharpe_ratio, "negative Sharpe ratio");
        out.push(Warning::NegativeSharpe {
          sharpe: aggregate.sharpe_ratio,
        });
      } else if aggregate.sharpe_ratio < LOW_SHARPE {
        out.push(Warning::LowSharpe {
          sharpe: aggregate.sharpe_ratio,
        });
      }
    }

    out
  }

  /// Forward projection of this holding under `config`.
  pub fn monte_carlo(&self, config: &SimulationConfig) -> Result<SimulationResult> {
    let aligned = self.aligned();
    let mut result = MonteCarloSimulator::new(config.clone()).run(&aligned, &self.weighting)?;
    result.label = self.name.clone();
    Ok(result)
  }
}
