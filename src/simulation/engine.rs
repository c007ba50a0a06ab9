//! # Monte Carlo Engine
//!
//! $$
//! V_{t+1}=V_t\,(1+r_{t+1}),\qquad r_{t+1}\sim F(\mu,\sigma),\qquad
//! \mathbf z_{t}=L\boldsymbol\varepsilon_t,\ LL^\top=\rho
//! $$
//!
//! Every path owns a ChaCha stream selected by its index under the master seed, so the
//! table is identical for any thread count.

use nalgebra::DMatrix;
use ndarray::Array2;
use ndarray::ArrayView1;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::Distribution as _;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::info;
use tracing::warn;

use super::config::Coupling;
use super::config::SimulationConfig;
use super::config::SimulationMode;
use super::result::SimulationResult;
use super::result::StreamParameters;
use super::sampler::ReturnSampler;
use crate::alignment::AlignedPrices;
use crate::composer::AggregateValueComposer;
use crate::composer::Rebalance;
use crate::correlation::CorrelationConfig;
use crate::correlation::CorrelationMatrix;
use crate::error::Result;
use crate::error::RiskError;
use crate::error::Warning;
use crate::holding::Weighting;
use crate::returns::returns;
use crate::returns::ReturnKind;
use crate::stats::moments::moments;

/// Forward value paths for a single series or a weighted set of assets.
#[derive(Clone, Debug)]
pub struct MonteCarloSimulator {
  config: SimulationConfig,
}

struct Path {
  values: Vec<f64>,
  clamped: usize,
}

impl MonteCarloSimulator {
  pub fn new(config: SimulationConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &SimulationConfig {
    &self.config
  }

  /// Simulate a weighted set of aligned assets according to the configured mode.
  ///
  /// Weights are looked up by symbol, so `weighting` may list the assets in any order but
  /// must cover exactly the aligned symbols.
  pub fn run(&self, aligned: &AlignedPrices, weighting: &Weighting) -> Result<SimulationResult> {
    self.config.validate()?;
    let weights = column_weights(aligned, weighting)?;

    match self.config.mode {
      SimulationMode::Aggregate => {
        if self.config.rebalance != Rebalance::None {
          return Err(RiskError::invalid_configuration(format!(
            "rebalance '{}' needs per-asset simulation, aggregate mode has no units to reset",
            self.config.rebalance
          )));
        }
        let values = AggregateValueComposer::new(&weights, Rebalance::None)
          .with_periods_per_year(self.config.periods_per_year)
          .compose(aligned.closes().view());
        self.run_series("aggregate", values.as_slice().unwrap_or(&[]))
      }
      SimulationMode::PerAsset => self.run_assets(aligned, &weights),
    }
  }

  /// Single stream fitted on one value or price series.
  pub fn run_series(&self, label: &str, values: &[f64]) -> Result<SimulationResult> {
    self.config.validate()?;
    let initial_value = self.initial_value(values.last().copied())?;

    let (hist_mean, hist_std) = self.historical_parameters(label, values)?;
    let sampler = ReturnSampler::new(
      self.config.distribution,
      self.config.resolve_mean(hist_mean),
      self.config.resolve_volatility(hist_std),
    )?;
    let streams = vec![StreamParameters {
      label: label.to_string(),
      mean: sampler.mean(),
      volatility: sampler.std(),
    }];

    let seed = self.master_seed();
    let days = self.config.days;
    let paths = self.generate(seed, |rng| {
      let mut values = Vec::with_capacity(days + 1);
      let mut clamped = 0;
      let mut v = initial_value;
      values.push(v);
      for _ in 0..days {
        let r = floor_return(sampler.sample(rng), &mut clamped);
        v *= 1.0 + r;
        values.push(v);
      }
      Path { values, clamped }
    });

    self.finish(label, seed, initial_value, paths, streams, Vec::new())
  }

  fn run_assets(&self, aligned: &AlignedPrices, weights: &[f64]) -> Result<SimulationResult> {
    let last_value = aligned
      .last_prices()
      .map(|p| p.iter().zip(weights).map(|(p, w)| p * w).sum::<f64>());
    let initial_value = self.initial_value(last_value)?;

    let mut samplers = Vec::with_capacity(aligned.n_assets());
    let mut streams = Vec::with_capacity(aligned.n_assets());
    for (idx, symbol) in aligned.symbols().iter().enumerate() {
      let column = aligned.column(idx).to_vec();
      let (hist_mean, hist_std) = self.historical_parameters(symbol, &column)?;
      let sampler = ReturnSampler::new(
        self.config.distribution,
        self.config.resolve_mean(hist_mean),
        self.config.resolve_volatility(hist_std),
      )?;
      streams.push(StreamParameters {
        label: symbol.clone(),
        mean: sampler.mean(),
        volatility: sampler.std(),
      });
      samplers.push(sampler);
    }

    let mut warnings = Vec::new();
    let cholesky = match self.config.coupling {
      Coupling::Independent => None,
      Coupling::Correlated => Some(correlation_factor(aligned, &mut warnings)),
    };

    let composer = AggregateValueComposer::new(weights, self.config.rebalance)
      .with_periods_per_year(self.config.periods_per_year);
    let seed = self.master_seed();
    let days = self.config.days;
    let n = samplers.len();

    let paths = self.generate(seed, |rng| {
      // relative price levels, each asset starting at 1
      let mut levels = Array2::<f64>::ones((days + 1, n));
      let mut clamped = 0;
      let mut z = vec![0.0; n];
      let mut eps = vec![0.0; n];

      for t in 1..=days {
        match &cholesky {
          None => {
            for (i, sampler) in samplers.iter().enumerate() {
              let r = floor_return(sampler.sample(rng), &mut clamped);
              levels[[t, i]] = levels[[t - 1, i]] * (1.0 + r);
            }
          }
          Some(l) => {
            for e in eps.iter_mut() {
              *e = rng.sample(StandardNormal);
            }
            for i in 0..n {
              z[i] = (0..=i).map(|k| l[(i, k)] * eps[k]).sum();
            }
            // one mixing draw per day gives a multivariate t across assets
            let scale = samplers.first().map_or(1.0, |s| s.draw_scale(rng));
            for (i, sampler) in samplers.iter().enumerate() {
              let r = floor_return(sampler.transform(z[i], scale), &mut clamped);
              levels[[t, i]] = levels[[t - 1, i]] * (1.0 + r);
            }
          }
        }
      }

      let values = composer.compose_from_value(levels.view(), initial_value).to_vec();
      Path { values, clamped }
    });

    self.finish("aggregate", seed, initial_value, paths, streams, warnings)
  }

  fn initial_value(&self, historical_last: Option<f64>) -> Result<f64> {
    let v0 = match (self.config.initial_value, historical_last) {
      (Some(v), _) => v,
      (None, Some(v)) => v,
      (None, None) => {
        return Err(RiskError::insufficient_data(
          "initial value from an empty history",
          1,
          0,
        ))
      }
    };
    if !(v0 > 0.0 && v0.is_finite()) {
      return Err(RiskError::invalid_configuration(format!(
        "initial value must be positive, got {v0}"
      )));
    }
    Ok(v0)
  }

  /// Historical per-period mean and volatility of simple returns. Only required when the
  /// configuration actually falls back on history.
  fn historical_parameters(&self, label: &str, values: &[f64]) -> Result<(f64, f64)> {
    if !self.config.needs_history() {
      return Ok((0.0, 0.0));
    }
    let r = returns(values, ReturnKind::Simple);
    let m = moments(&r).map_err(|_| {
      RiskError::insufficient_data(format!("historical returns of {label}"), 2, r.len())
    })?;
    if m.is_degenerate() && self.config.volatility.is_none() {
      warn!(label, "zero historical volatility, simulated paths will be flat");
    }
    Ok((m.mean, m.std_dev))
  }

  fn master_seed(&self) -> u64 {
    match self.config.seed {
      Some(seed) => seed,
      None => {
        let seed: u64 = rand::thread_rng().gen();
        info!(seed, "no seed given, drew a fresh master seed");
        seed
      }
    }
  }

  fn generate<F>(&self, seed: u64, path: F) -> Vec<Path>
  where
    F: Fn(&mut ChaCha8Rng) -> Path + Sync,
  {
    let run = |idx: usize| {
      let mut rng = ChaCha8Rng::seed_from_u64(seed);
      rng.set_stream(idx as u64);
      path(&mut rng)
    };

    if self.config.parallel {
      (0..self.config.simulations).into_par_iter().map(run).collect()
    } else {
      (0..self.config.simulations).map(run).collect()
    }
  }

  fn finish(
    &self,
    label: &str,
    seed: u64,
    initial_value: f64,
    paths: Vec<Path>,
    streams: Vec<StreamParameters>,
    mut warnings: Vec<Warning>,
  ) -> Result<SimulationResult> {
    let cols = self.config.days + 1;
    let rows = paths.len();
    let clamped: usize = paths.iter().map(|p| p.clamped).sum();

    let mut table = Array2::<f64>::zeros((rows, cols));
    for (mut row, path) in table.rows_mut().into_iter().zip(&paths) {
      row.assign(&ArrayView1::from(&path.values[..]));
    }

    if clamped > 0 {
      warn!(count = clamped, "returns below -100% clamped to -100%");
      warnings.push(Warning::ReturnClamped { count: clamped });
    }

    info!(
      label,
      seed,
      simulations = rows,
      days = self.config.days,
      distribution = %self.config.distribution,
      "monte carlo simulation finished"
    );

    Ok(SimulationResult {
      label: label.to_string(),
      seed,
      initial_value,
      periods_per_year: self.config.periods_per_year,
      paths: table,
      streams,
      warnings,
    })
  }
}

fn floor_return(r: f64, clamped: &mut usize) -> f64 {
  if r < -1.0 {
    *clamped += 1;
    -1.0
  } else {
    r
  }
}

/// Normalized weights in the column order of `aligned`.
fn column_weights(aligned: &AlignedPrices, weighting: &Weighting) -> Result<Vec<f64>> {
  if weighting.len() != aligned.n_assets() {
    return Err(RiskError::invalid_weighting(format!(
      "{} weights for {} aligned assets",
      weighting.len(),
      aligned.n_assets()
    )));
  }
  aligned
    .symbols()
    .iter()
    .map(|s| {
      weighting
        .weight_of(s)
        .ok_or_else(|| RiskError::invalid_weighting(format!("no weight for '{s}'")))
    })
    .collect()
}

/// Lower Cholesky factor of the historical return correlation, nudged onto the positive
/// definite cone when needed. Falls back to the identity, which decouples the assets.
fn correlation_factor(aligned: &AlignedPrices, warnings: &mut Vec<Warning>) -> DMatrix<f64> {
  let corr = CorrelationMatrix::from_aligned(aligned, &CorrelationConfig::default());
  warnings.extend(
    corr
      .warnings()
      .iter()
      .filter(|w| !matches!(w, Warning::HighCorrelation { .. }))
      .cloned(),
  );

  let n = corr.len();
  let values = corr.values();
  match cholesky_lower_with_jitter(DMatrix::from_fn(n, n, |i, j| values[[i, j]])) {
    Some(l) => l,
    None => {
      warn!("correlation matrix not positive definite, sampling assets independently");
      warnings.push(Warning::IndependentFallback);
      DMatrix::<f64>::identity(n, n)
    }
  }
}

fn cholesky_lower_with_jitter(mut sigma: DMatrix<f64>) -> Option<DMatrix<f64>> {
  let dim = sigma.nrows();
  let mut jitter = 1e-12;
  for _ in 0..8 {
    if let Some(chol) = sigma.clone().cholesky() {
      return Some(chol.l());
    }
    for i in 0..dim {
      sigma[(i, i)] += jitter;
    }
    jitter *= 10.0;
  }
  None
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use chrono::Duration;
  use chrono::NaiveDate;
  use tracing_test::traced_test;

  use super::*;
  use crate::alignment::align;
  use crate::alignment::AlignmentPolicy;
  use crate::series::PriceSeries;
  use crate::simulation::config::Distribution;

  fn series(symbol: &str, closes: &[f64]) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let points: Vec<(NaiveDate, f64)> = closes
      .iter()
      .enumerate()
      .map(|(i, &c)| (start + Duration::days(i as i64), c))
      .collect();
    PriceSeries::from_closes(symbol, "test", &points).unwrap()
  }

  fn wavy(base: f64, amp: f64, n: usize, phase: f64) -> Vec<f64> {
    (0..n)
      .map(|i| base * (1.0 + amp * ((i as f64) * 0.7 + phase).sin() + 0.001 * i as f64))
      .collect()
  }

  fn fixture() -> (Vec<PriceSeries>, Weighting) {
    let assets = vec![
      series("A", &wavy(100.0, 0.02, 60, 0.0)),
      series("B", &wavy(50.0, 0.03, 60, 1.0)),
      series("C", &wavy(20.0, 0.01, 60, 2.0)),
    ];
    let w = Weighting::new(&["A", "B", "C"], &[0.5, 0.3, 0.2]).unwrap();
    (assets, w)
  }

  fn aligned(assets: &[PriceSeries]) -> AlignedPrices {
    let refs: Vec<&PriceSeries> = assets.iter().collect();
    align(&refs, AlignmentPolicy::Intersection)
  }

  fn cfg() -> SimulationConfig {
    SimulationConfig {
      simulations: 64,
      days: 30,
      seed: Some(42),
      ..SimulationConfig::default()
    }
  }

  #[test]
  fn same_seed_reproduces_table() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    let a = MonteCarloSimulator::new(cfg()).run(&table, &w).unwrap();
    let b = MonteCarloSimulator::new(cfg()).run(&table, &w).unwrap();
    assert_eq!(a.paths(), b.paths());
    assert_eq!(a.seed(), 42);

    let other = MonteCarloSimulator::new(cfg().with_seed(43)).run(&table, &w).unwrap();
    assert_ne!(a.paths(), other.paths());
  }

  #[test]
  fn parallel_and_sequential_agree() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    for coupling in [Coupling::Independent, Coupling::Correlated] {
      let par = SimulationConfig {
        coupling,
        distribution: Distribution::StudentT { dof: 5.0 },
        ..cfg()
      };
      let seq = SimulationConfig {
        parallel: false,
        ..par.clone()
      };
      let a = MonteCarloSimulator::new(par).run(&table, &w).unwrap();
      let b = MonteCarloSimulator::new(seq).run(&table, &w).unwrap();
      assert_eq!(a.paths(), b.paths());
    }
  }

  #[test]
  fn day_zero_is_initial_value() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    let last: f64 = table
      .last_prices()
      .unwrap()
      .iter()
      .zip(w.weights())
      .map(|(p, w)| p * w)
      .sum();

    for mode in [SimulationMode::Aggregate, SimulationMode::PerAsset] {
      let res = MonteCarloSimulator::new(SimulationConfig { mode, ..cfg() })
        .run(&table, &w)
        .unwrap();
      assert_eq!(res.paths().dim(), (64, 31));
      for &v in res.paths().column(0) {
        assert_eq!(v, res.initial_value());
      }
      assert_relative_eq!(res.initial_value(), last, epsilon = 1e-9);
    }
  }

  #[test]
  fn zero_overrides_give_flat_paths() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    let res = MonteCarloSimulator::new(SimulationConfig {
      drift: Some(0.0),
      volatility: Some(0.0),
      initial_value: Some(1000.0),
      ..cfg()
    })
    .run(&table, &w)
    .unwrap();

    for &v in res.paths() {
      assert_relative_eq!(v, 1000.0, epsilon = 1e-9);
    }
    assert_relative_eq!(res.summary().std, 0.0, epsilon = 1e-9);
  }

  #[traced_test]
  #[test]
  fn flat_history_simulates_flat_paths() {
    let flat = series("FLAT", &[10.0; 20]);
    let res = MonteCarloSimulator::new(cfg())
      .run_series("FLAT", &flat.closes())
      .unwrap();

    assert!(res.paths().iter().all(|&v| v == 10.0));
    assert_eq!(res.streams()[0].volatility, 0.0);
    assert!(logs_contain("zero historical volatility"));
  }

  #[test]
  fn lognormal_paths_stay_positive() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    let res = MonteCarloSimulator::new(SimulationConfig {
      distribution: Distribution::LogNormal,
      volatility: Some(3.0),
      ..cfg()
    })
    .run(&table, &w)
    .unwrap();

    assert!(res.paths().iter().all(|&v| v > 0.0));
    assert!(res.warnings().is_empty());
  }

  #[test]
  fn extreme_normal_volatility_clamps_and_reports() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    let res = MonteCarloSimulator::new(SimulationConfig {
      mode: SimulationMode::Aggregate,
      volatility: Some(0.8),
      annualized: false,
      ..cfg()
    })
    .run(&table, &w)
    .unwrap();

    assert!(res.paths().iter().all(|&v| v >= 0.0));
    assert!(res
      .warnings()
      .iter()
      .any(|w| matches!(w, Warning::ReturnClamped { count } if *count > 0)));
  }

  #[test]
  fn rebalancing_changes_per_asset_paths() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    let base = SimulationConfig {
      days: 60,
      volatility: Some(0.4),
      ..cfg()
    };
    let hold = MonteCarloSimulator::new(base.clone()).run(&table, &w).unwrap();
    let monthly = MonteCarloSimulator::new(SimulationConfig {
      rebalance: Rebalance::Monthly,
      ..base
    })
    .run(&table, &w)
    .unwrap();

    // identical draws, so paths agree until the first rebalance
    for t in 0..=21 {
      assert_relative_eq!(hold.paths()[[0, t]], monthly.paths()[[0, t]], epsilon = 1e-9);
    }
    assert_ne!(hold.paths(), monthly.paths());
  }

  #[test]
  fn invalid_configuration_is_rejected() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    for bad in [
      SimulationConfig {
        simulations: 0,
        ..cfg()
      },
      SimulationConfig { days: 0, ..cfg() },
      SimulationConfig {
        distribution: Distribution::StudentT { dof: 1.5 },
        ..cfg()
      },
    ] {
      let err = MonteCarloSimulator::new(bad).run(&table, &w).unwrap_err();
      assert!(matches!(err, RiskError::InvalidConfiguration { .. }));
    }

    let short = Weighting::new(&["A"], &[1.0]).unwrap();
    let err = MonteCarloSimulator::new(cfg()).run(&table, &short).unwrap_err();
    assert!(matches!(err, RiskError::InvalidWeighting { .. }));

    let unknown = Weighting::new(&["A", "B", "X"], &[1.0, 1.0, 1.0]).unwrap();
    let err = MonteCarloSimulator::new(cfg()).run(&table, &unknown).unwrap_err();
    assert!(matches!(err, RiskError::InvalidWeighting { .. }));
  }

  #[test]
  fn raw_weights_are_normalized_and_matched_by_symbol() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    // same proportions, different scale and order
    let raw = Weighting::new(&["C", "A", "B"], &[2.0, 5.0, 3.0]).unwrap();

    for mode in [SimulationMode::Aggregate, SimulationMode::PerAsset] {
      let a = MonteCarloSimulator::new(SimulationConfig { mode, ..cfg() })
        .run(&table, &w)
        .unwrap();
      let b = MonteCarloSimulator::new(SimulationConfig { mode, ..cfg() })
        .run(&table, &raw)
        .unwrap();
      assert_relative_eq!(a.initial_value(), b.initial_value(), epsilon = 1e-9);
      for (x, y) in a.paths().iter().zip(b.paths()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-9, max_relative = 1e-9);
      }
    }
  }

  #[test]
  fn aggregate_mode_rejects_rebalancing() {
    let (assets, w) = fixture();
    let table = aligned(&assets);
    let err = MonteCarloSimulator::new(SimulationConfig {
      mode: SimulationMode::Aggregate,
      rebalance: Rebalance::Quarterly,
      ..cfg()
    })
    .run(&table, &w)
    .unwrap_err();
    assert!(matches!(err, RiskError::InvalidConfiguration { .. }));
  }

  #[traced_test]
  #[test]
  fn correlated_run_reports_degenerate_correlation() {
    let assets = vec![
      series("A", &wavy(100.0, 0.02, 60, 0.0)),
      series("FLAT", &[40.0; 60]),
    ];
    let w = Weighting::equal(&["A", "FLAT"]).unwrap();
    let res = MonteCarloSimulator::new(SimulationConfig {
      coupling: Coupling::Correlated,
      ..cfg()
    })
    .run(&aligned(&assets), &w)
    .unwrap();

    assert!(res.warnings().contains(&Warning::ZeroVolatility {
      label: "FLAT".into()
    }));
    assert!(logs_contain("constant returns"));
  }

  #[test]
  fn indefinite_correlation_falls_back_to_identity() {
    let corr = DMatrix::from_row_slice(3, 3, &[1.0, 0.9, 0.9, 0.9, 1.0, -0.9, 0.9, -0.9, 1.0]);
    assert!(cholesky_lower_with_jitter(corr).is_none());
  }

  #[test]
  fn short_history_is_insufficient_unless_fully_overridden() {
    let one = series("X", &[100.0, 101.0]);
    let err = MonteCarloSimulator::new(cfg())
      .run_series("X", &one.closes())
      .unwrap_err();
    assert!(matches!(err, RiskError::InsufficientData { .. }));

    let res = MonteCarloSimulator::new(SimulationConfig {
      drift: Some(0.05),
      volatility: Some(0.2),
      ..cfg()
    })
    .run_series("X", &one.closes())
    .unwrap();
    assert_eq!(res.initial_value(), 101.0);
  }

  #[test]
  fn correlated_factor_of_identity_is_identity() {
    let l = cholesky_lower_with_jitter(DMatrix::identity(3, 3)).unwrap();
    assert_eq!(l, DMatrix::identity(3, 3));
  }
}
