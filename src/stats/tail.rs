//! # Tail Risk
//!
//! $$
//! \operatorname{VaR}_\alpha=q_{1-\alpha}(r),\qquad
//! \operatorname{CVaR}_\alpha=\mathbb E\left[r\mid r\le \operatorname{VaR}_\alpha\right]
//! $$
//!
//! Historical (empirical) Value-at-Risk and Conditional VaR on a return sample.

/// Percentile `p` in `[0, 100]` with linear interpolation between order statistics.
/// Returns `NaN` for an empty sample.
pub fn percentile(xs: &[f64], p: f64) -> f64 {
  let mut sorted = xs.to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));
  percentile_sorted(&sorted, p)
}

/// Same as [`percentile`] for an already sorted sample.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
  if sorted.is_empty() {
    return f64::NAN;
  }
  let p = p.clamp(0.0, 100.0) / 100.0;
  let pos = p * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  let frac = pos - lo as f64;
  sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Historical VaR at `confidence` (e.g. 0.95): the `(1 - confidence)` quantile of `returns`.
/// Reported as a return, so losses are negative.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> f64 {
  percentile(returns, (1.0 - confidence) * 100.0)
}

/// Mean of the returns at or below the VaR threshold.
pub fn conditional_value_at_risk(returns: &[f64], confidence: f64) -> f64 {
  let var = value_at_risk(returns, confidence);
  let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var).collect();
  if tail.is_empty() {
    // only reachable through NaN inputs
    return var;
  }
  tail.iter().sum::<f64>() / tail.len() as f64
}
