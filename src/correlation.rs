//! # Correlation
//!
//! $$
//! \rho_{ij}=\frac{\operatorname{Cov}(r_i,r_j)}{\sigma_i\sigma_j},\qquad
//! \mathrm{DR}=\frac{\sum_i w_i\sigma_i}{\sigma_p}
//! $$
//!
//! Pearson correlation across aligned return columns, with a coverage matrix that tells
//! "no shared data" apart from "uncorrelated".

use std::collections::BTreeSet;

use ndarray::Array2;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::alignment::align;
use crate::alignment::close_on;
use crate::alignment::AlignedPrices;
use crate::alignment::AlignmentPolicy;
use crate::error::Warning;
use crate::returns::returns;
use crate::returns::ReturnKind;
use crate::returns::ZERO_TOLERANCE;
use crate::series::PriceSeries;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
  /// Pairs strictly above this raise [`Warning::HighCorrelation`].
  pub high_threshold: f64,
  pub return_kind: ReturnKind,
  /// Pairwise mode: below this many common dates, retry with a forward-filled union.
  pub min_common_dates: usize,
  /// Pairwise mode: longest gap bridged by forward fill.
  pub fill_limit: usize,
}

impl Default for CorrelationConfig {
  fn default() -> Self {
    Self {
      high_threshold: 0.8,
      return_kind: ReturnKind::Simple,
      min_common_dates: 10,
      fill_limit: 3,
    }
  }
}

fn pearson(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Option<f64> {
  let n = x.len().min(y.len());
  let mx = x.iter().take(n).sum::<f64>() / n as f64;
  let my = y.iter().take(n).sum::<f64>() / n as f64;

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;
  for i in 0..n {
    let dx = x[i] - mx;
    let dy = y[i] - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
  }

  let denom = (sx * sy).sqrt();
  if denom < ZERO_TOLERANCE {
    None
  } else {
    Some((cov / denom).clamp(-1.0, 1.0))
  }
}

/// Returns of a two-column alignment that end on a date both series actually traded.
fn co_observed_returns(aligned: &AlignedPrices, a: &PriceSeries, b: &PriceSeries) -> usize {
  aligned
    .dates()
    .iter()
    .skip(1)
    .filter(|&&d| close_on(a, d).is_some() && close_on(b, d).is_some())
    .count()
}

fn is_flat(x: ArrayView1<'_, f64>) -> bool {
  let n = x.len() as f64;
  let m = x.sum() / n;
  x.iter().map(|v| (v - m) * (v - m)).sum::<f64>() < ZERO_TOLERANCE * ZERO_TOLERANCE
}

/// Symbol-indexed correlation matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
  symbols: Vec<String>,
  values: Array2<f64>,
  /// `false` where the pair had fewer than two shared observations and the value is the
  /// 0.0 placeholder.
  coverage: Array2<bool>,
  warnings: Vec<Warning>,
}

impl CorrelationMatrix {
  fn empty(symbols: Vec<String>) -> Self {
    let n = symbols.len();
    let mut values = Array2::<f64>::zeros((n, n));
    let mut coverage = Array2::from_elem((n, n), false);
    for i in 0..n {
      values[[i, i]] = 1.0;
      coverage[[i, i]] = true;
    }
    Self {
      symbols,
      values,
      coverage,
      warnings: Vec::new(),
    }
  }

  /// Correlation of the columns of an aligned `T x N` return table.
  pub fn from_returns(symbols: &[String], table: &Array2<f64>, cfg: &CorrelationConfig) -> Self {
    let mut out = Self::empty(symbols.to_vec());
    let n = symbols.len();
    let mut flat_reported = BTreeSet::new();

    for i in 0..n {
      for j in (i + 1)..n {
        if table.nrows() < 2 {
          out.set_uncovered(i, j);
          continue;
        }
        let (x, y) = (table.column(i), table.column(j));
        out.set_pair(i, j, pearson(x, y), cfg);
        out.check_flat([(i, x), (j, y)], &mut flat_reported);
      }
    }

    out
  }

  /// Correlation of the return columns of an aligned price table.
  pub fn from_aligned(aligned: &AlignedPrices, cfg: &CorrelationConfig) -> Self {
    Self::from_returns(aligned.symbols(), &aligned.returns(cfg.return_kind), cfg)
  }

  /// Each pair aligned on its own dates. Exact intersection first; when it is shorter
  /// than `min_common_dates`, a forward-filled union (gaps up to `fill_limit`) is tried.
  ///
  /// A pair is covered only when at least two of its returns end on a date where both
  /// series have a real bar; returns built purely from carried-forward closes do not count.
  pub fn pairwise(series: &[&PriceSeries], cfg: &CorrelationConfig) -> Self {
    let symbols: Vec<String> = series.iter().map(|s| s.symbol().to_string()).collect();
    let mut out = Self::empty(symbols);
    let mut flat_reported = BTreeSet::new();

    for i in 0..series.len() {
      for j in (i + 1)..series.len() {
        let pair = [series[i], series[j]];
        let exact = align(&pair, AlignmentPolicy::Intersection);
        let chosen = if exact.len() >= cfg.min_common_dates {
          exact
        } else {
          let filled = align(
            &pair,
            AlignmentPolicy::ForwardFillUnion {
              limit: Some(cfg.fill_limit),
            },
          );
          debug!(
            left = series[i].symbol(),
            right = series[j].symbol(),
            exact = exact.len(),
            filled = filled.len(),
            "few common dates, trying forward-filled alignment"
          );
          if filled.len() > exact.len() {
            filled
          } else {
            exact
          }
        };

        if co_observed_returns(&chosen, series[i], series[j]) < 2 {
          out.set_uncovered(i, j);
          continue;
        }
        let x = returns(&chosen.column(0).to_vec(), cfg.return_kind);
        let y = returns(&chosen.column(1).to_vec(), cfg.return_kind);
        let (x, y) = (ArrayView1::from(&x[..]), ArrayView1::from(&y[..]));
        out.set_pair(i, j, pearson(x, y), cfg);
        out.check_flat([(i, x), (j, y)], &mut flat_reported);
      }
    }

    out
  }

  /// Flags each constant column of a covered zero-correlation pair once.
  fn check_flat(&mut self, cols: [(usize, ArrayView1<'_, f64>); 2], reported: &mut BTreeSet<usize>) {
    let (i, j) = (cols[0].0, cols[1].0);
    if !self.coverage[[i, j]] || self.values[[i, j]] != 0.0 {
      return;
    }
    for (k, col) in cols {
      if is_flat(col) && reported.insert(k) {
        self.flag_flat(k);
      }
    }
  }

  fn set_pair(&mut self, i: usize, j: usize, rho: Option<f64>, cfg: &CorrelationConfig) {
    let rho = rho.unwrap_or(0.0);
    self.values[[i, j]] = rho;
    self.values[[j, i]] = rho;
    self.coverage[[i, j]] = true;
    self.coverage[[j, i]] = true;

    if rho > cfg.high_threshold {
      debug!(
        left = %self.symbols[i],
        right = %self.symbols[j],
        rho,
        "high correlation"
      );
      self.warnings.push(Warning::HighCorrelation {
        left: self.symbols[i].clone(),
        right: self.symbols[j].clone(),
        correlation: rho,
      });
    }
  }

  fn set_uncovered(&mut self, i: usize, j: usize) {
    warn!(
      left = %self.symbols[i],
      right = %self.symbols[j],
      "no overlapping returns, correlation set to 0"
    );
    self.warnings.push(Warning::NoOverlap {
      left: self.symbols[i].clone(),
      right: self.symbols[j].clone(),
    });
  }

  fn flag_flat(&mut self, k: usize) {
    warn!(symbol = %self.symbols[k], "constant returns, correlations set to 0");
    self.warnings.push(Warning::ZeroVolatility {
      label: self.symbols[k].clone(),
    });
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn coverage(&self) -> &Array2<bool> {
    &self.coverage
  }

  pub fn warnings(&self) -> &[Warning] {
    &self.warnings
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  fn index_of(&self, symbol: &str) -> Option<usize> {
    self.symbols.iter().position(|s| s == symbol)
  }

  /// Correlation between two symbols.
  pub fn get(&self, a: &str, b: &str) -> Option<f64> {
    Some(self.values[[self.index_of(a)?, self.index_of(b)?]])
  }

  /// Whether the value for `(a, b)` was computed from shared observations.
  pub fn is_covered(&self, a: &str, b: &str) -> Option<bool> {
    Some(self.coverage[[self.index_of(a)?, self.index_of(b)?]])
  }

  /// Pairs above `threshold`, upper triangle only.
  pub fn pairs_above(&self, threshold: f64) -> Vec<(String, String, f64)> {
    let mut out = Vec::new();
    for i in 0..self.len() {
      for j in (i + 1)..self.len() {
        if self.values[[i, j]] > threshold {
          out.push((self.symbols[i].clone(), self.symbols[j].clone(), self.values[[i, j]]));
        }
      }
    }
    out
  }

  /// Mean of the covered off-diagonal entries, `None` with fewer than two assets.
  pub fn average_correlation(&self) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in 0..self.len() {
      for j in (i + 1)..self.len() {
        if self.coverage[[i, j]] {
          sum += self.values[[i, j]];
          count += 1;
        }
      }
    }
    (count > 0).then(|| sum / count as f64)
  }
}

/// `Σ_ij = σ_i σ_j ρ_ij`.
pub fn covariance_matrix(sigmas: &[f64], corr: &Array2<f64>) -> Array2<f64> {
  let n = sigmas.len();
  Array2::from_shape_fn((n, n), |(i, j)| {
    let c_ij = corr
      .get((i, j))
      .copied()
      .unwrap_or(if i == j { 1.0 } else { 0.0 });
    sigmas[i] * sigmas[j] * c_ij
  })
}

/// Model volatility `sqrt(wᵀ Σ w)`.
pub fn portfolio_volatility(weights: &[f64], cov: &Array2<f64>) -> f64 {
  let w = ArrayView1::from(weights);
  w.dot(&cov.dot(&w)).max(0.0).sqrt()
}

/// Weighted average of asset volatilities over the aggregate volatility.
///
/// Near 1 means little diversification benefit. With zero aggregate volatility the ratio
/// is reported as 1.0 together with a [`Warning::ZeroVolatility`].
pub fn diversification_ratio(
  weights: &[f64],
  asset_vols: &[f64],
  portfolio_vol: f64,
  label: &str,
) -> (f64, Option<Warning>) {
  let weighted: f64 = weights.iter().zip(asset_vols).map(|(w, s)| w * s).sum();
  if portfolio_vol < ZERO_TOLERANCE {
    warn!(label, "zero aggregate volatility, diversification ratio reported as 1");
    return (
      1.0,
      Some(Warning::ZeroVolatility {
        label: label.to_string(),
      }),
    );
  }
  (weighted / portfolio_vol, None)
}
