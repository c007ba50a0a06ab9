//! # Return Sampler
//!
//! $$
//! r=\mu+\sigma Z,\qquad
//! r=\mu+\sigma\sqrt{\tfrac{\nu-2}{\nu}}\,\frac{Z}{\sqrt{\chi^2_\nu/\nu}},\qquad
//! r=e^{\mu-\sigma^2/2+\sigma Z}-1
//! $$
//!

use rand::Rng;
use rand_distr::ChiSquared;
use rand_distr::StandardNormal;

use super::config::Distribution;
use crate::error::Result;
use crate::error::RiskError;
use crate::returns::ZERO_TOLERANCE;

/// Draws period returns with a given per-period mean and volatility.
#[derive(Clone, Debug)]
pub struct ReturnSampler {
  distribution: Distribution,
  mean: f64,
  std: f64,
  chi: Option<ChiSquared<f64>>,
}

impl ReturnSampler {
  pub fn new(distribution: Distribution, mean: f64, std: f64) -> Result<Self> {
    let chi = match distribution {
      Distribution::StudentT { dof } => Some(ChiSquared::new(dof).map_err(|e| {
        RiskError::invalid_configuration(format!("student_t with dof {dof}: {e}"))
      })?),
      _ => None,
    };
    Ok(Self {
      distribution,
      mean,
      std,
      chi,
    })
  }

  pub fn mean(&self) -> f64 {
    self.mean
  }

  pub fn std(&self) -> f64 {
    self.std
  }

  /// Zero volatility: every draw is exactly the mean.
  pub fn is_deterministic(&self) -> bool {
    self.std < ZERO_TOLERANCE
  }

  /// Student-t mixing factor `sqrt(ν / χ²_ν)`, 1 for the Gaussian families.
  pub fn draw_scale<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
    match (self.distribution, &self.chi) {
      (Distribution::StudentT { dof }, Some(chi)) => {
        let c: f64 = rng.sample(chi);
        (dof / c.max(f64::MIN_POSITIVE)).sqrt()
      }
      _ => 1.0,
    }
  }

  /// Map a standard normal `z` (and the mixing factor of [`Self::draw_scale`]) to a return.
  pub fn transform(&self, z: f64, scale: f64) -> f64 {
    if self.is_deterministic() {
      return self.mean;
    }
    match self.distribution {
      Distribution::Normal => self.mean + self.std * z,
      Distribution::StudentT { dof } => {
        let standardize = ((dof - 2.0) / dof).sqrt();
        self.mean + self.std * standardize * z * scale
      }
      Distribution::LogNormal => (self.mean - 0.5 * self.std * self.std + self.std * z).exp() - 1.0,
    }
  }
}

impl rand_distr::Distribution<f64> for ReturnSampler {
  fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
    if self.is_deterministic() {
      return self.mean;
    }
    let z: f64 = rng.sample(StandardNormal);
    let scale = self.draw_scale(rng);
    self.transform(z, scale)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use rand::SeedableRng;
  use rand_chacha::ChaCha8Rng;
  use rand_distr::Distribution as _;

  use super::*;
  use crate::stats::moments::moments;

  fn draws(sampler: &ReturnSampler, n: usize) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    (0..n).map(|_| sampler.sample(&mut rng)).collect()
  }

  fn mean_std(xs: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let m = xs.iter().sum::<f64>() / n;
    let v = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1.0);
    (m, v.sqrt())
  }

  #[test]
  fn normal_matches_target_moments() {
    let s = ReturnSampler::new(Distribution::Normal, 0.001, 0.02).unwrap();
    let (m, sd) = mean_std(&draws(&s, 200_000));
    assert_abs_diff_eq!(m, 0.001, epsilon = 3e-4);
    assert_abs_diff_eq!(sd, 0.02, epsilon = 5e-4);
  }

  #[test]
  fn student_t_is_rescaled_to_target_volatility() {
    let s = ReturnSampler::new(Distribution::StudentT { dof: 5.0 }, 0.0, 0.01).unwrap();
    let xs = draws(&s, 400_000);
    let (m, sd) = mean_std(&xs);
    assert_abs_diff_eq!(m, 0.0, epsilon = 2e-4);
    assert_abs_diff_eq!(sd, 0.01, epsilon = 6e-4);
  }

  #[test]
  fn student_t_has_heavier_tails_than_normal() {
    let normal = ReturnSampler::new(Distribution::Normal, 0.0, 0.01).unwrap();
    let t = ReturnSampler::new(Distribution::StudentT { dof: 5.0 }, 0.0, 0.01).unwrap();

    let kn = moments(&draws(&normal, 400_000)).unwrap().excess_kurtosis;
    let kt = moments(&draws(&t, 400_000)).unwrap().excess_kurtosis;

    // theoretical excess kurtosis: 0 for normal, 6 / (dof - 4) = 6 for dof 5
    assert_abs_diff_eq!(kn, 0.0, epsilon = 0.1);
    assert!(kt > 1.0, "student-t excess kurtosis {kt}");
  }

  #[test]
  fn lognormal_returns_stay_above_minus_one() {
    let s = ReturnSampler::new(Distribution::LogNormal, 0.0, 0.5).unwrap();
    assert!(draws(&s, 50_000).iter().all(|&r| r > -1.0));
  }

  #[test]
  fn zero_volatility_is_deterministic() {
    for d in [
      Distribution::Normal,
      Distribution::StudentT { dof: 4.0 },
      Distribution::LogNormal,
    ] {
      let s = ReturnSampler::new(d, 0.0005, 0.0).unwrap();
      assert!(draws(&s, 100).iter().all(|&r| r == 0.0005));
    }
  }

  #[test]
  fn invalid_dof_is_rejected() {
    assert!(ReturnSampler::new(Distribution::StudentT { dof: -1.0 }, 0.0, 0.1).is_err());
  }
}
