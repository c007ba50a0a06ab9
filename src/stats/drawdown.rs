//! # Drawdown
//!
//! $$
//! \operatorname{DD}_t=\frac{V_t}{\max_{s\le t}V_s}-1,\qquad \operatorname{MDD}=\min_t \operatorname{DD}_t
//! $$
//!

use serde::Deserialize;
use serde::Serialize;

/// Worst peak-to-trough decline of a value path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
  /// In `[-1, 0]`.
  pub max_drawdown: f64,
  pub peak_index: usize,
  pub trough_index: usize,
}

/// Running drawdown of `values`, same length as the input.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
  let mut peak = f64::NEG_INFINITY;
  values
    .iter()
    .map(|&v| {
      peak = peak.max(v);
      if peak > 0.0 {
        (v / peak - 1.0).clamp(-1.0, 0.0)
      } else {
        0.0
      }
    })
    .collect()
}

/// Maximum drawdown of `values`. An empty or single-point path has no drawdown.
pub fn max_drawdown(values: &[f64]) -> Drawdown {
  let mut out = Drawdown::default();
  let mut peak = f64::NEG_INFINITY;
  let mut peak_index = 0;

  for (i, &v) in values.iter().enumerate() {
    if v > peak {
      peak = v;
      peak_index = i;
    }
    if peak > 0.0 {
      let dd = (v / peak - 1.0).clamp(-1.0, 0.0);
      if dd < out.max_drawdown {
        out = Drawdown {
          max_drawdown: dd,
          peak_index,
          trough_index: i,
        };
      }
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn finds_worst_peak_to_trough() {
    let values = [100.0, 120.0, 90.0, 110.0, 130.0, 104.0];
    let dd = max_drawdown(&values);
    assert_relative_eq!(dd.max_drawdown, -0.25, epsilon = 1e-12);
    assert_eq!(dd.peak_index, 1);
    assert_eq!(dd.trough_index, 2);
  }

  #[test]
  fn monotone_path_has_zero_drawdown() {
    assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]).max_drawdown, 0.0);
    assert_eq!(max_drawdown(&[]).max_drawdown, 0.0);
  }

  #[test]
  fn total_loss_is_bounded_at_minus_one() {
    let dd = max_drawdown(&[10.0, 5.0, 0.0, 0.0]);
    assert_eq!(dd.max_drawdown, -1.0);
    assert!(drawdown_series(&[10.0, 0.0]).iter().all(|d| (-1.0..=0.0).contains(d)));
  }
}
