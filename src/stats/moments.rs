//! # Moments
//!
//! $$
//! \gamma_1=\frac{m_3}{m_2^{3/2}},\qquad \gamma_2=\frac{m_4}{m_2^2}-3,\qquad
//! m_k=\frac1n\sum_{t}(r_t-\bar r)^k
//! $$
//!

use serde::Deserialize;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::error::Result;
use crate::error::RiskError;
use crate::returns::ZERO_TOLERANCE;

/// First four moments of a return sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Moments {
  pub n: usize,
  pub mean: f64,
  /// Sample standard deviation (n - 1 denominator).
  pub std_dev: f64,
  pub skewness: f64,
  /// Fisher (excess) kurtosis, 0 for a normal sample.
  pub excess_kurtosis: f64,
}

impl Moments {
  /// Whether the sample has no dispersion; skewness and kurtosis are then reported as 0.
  pub fn is_degenerate(&self) -> bool {
    self.std_dev < ZERO_TOLERANCE
  }
}

/// Compute [`Moments`]; needs at least two observations.
pub fn moments(xs: &[f64]) -> Result<Moments> {
  if xs.len() < 2 {
    return Err(RiskError::insufficient_data("moments", 2, xs.len()));
  }

  let n = xs.len() as f64;
  let mean = xs.iter().mean();
  let std_dev = xs.iter().std_dev();

  let mut m2 = 0.0;
  let mut m3 = 0.0;
  let mut m4 = 0.0;
  for &x in xs {
    let d = x - mean;
    let d2 = d * d;
    m2 += d2;
    m3 += d2 * d;
    m4 += d2 * d2;
  }
  m2 /= n;
  m3 /= n;
  m4 /= n;

  let (skewness, excess_kurtosis) = if m2 <= ZERO_TOLERANCE * ZERO_TOLERANCE {
    (0.0, 0.0)
  } else {
    (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
  };

  Ok(Moments {
    n: xs.len(),
    mean,
    std_dev,
    skewness,
    excess_kurtosis,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn symmetric_sample_has_zero_skew() {
    let m = moments(&[-2.0, -1.0, 0.0, 1.0, 2.0]).unwrap();
    assert_relative_eq!(m.mean, 0.0);
    assert_relative_eq!(m.std_dev, 2.5f64.sqrt(), epsilon = 1e-12);
    assert_relative_eq!(m.skewness, 0.0, epsilon = 1e-12);
    // m2 = 2, m4 = 6.8 -> 6.8 / 4 - 3
    assert_relative_eq!(m.excess_kurtosis, -1.3, epsilon = 1e-12);
  }

  #[test]
  fn right_tail_gives_positive_skew() {
    let m = moments(&[0.0, 0.0, 0.0, 0.0, 10.0]).unwrap();
    assert!(m.skewness > 1.0);
  }

  #[test]
  fn constant_sample_is_degenerate_not_nan() {
    let m = moments(&[0.01; 10]).unwrap();
    assert!(m.is_degenerate());
    assert_eq!(m.skewness, 0.0);
    assert_eq!(m.excess_kurtosis, 0.0);
  }

  #[test]
  fn single_observation_is_insufficient() {
    let err = moments(&[0.5]).unwrap_err();
    assert!(matches!(
      err,
      RiskError::InsufficientData {
        required: 2,
        available: 1,
        ..
      }
    ));
  }
}
