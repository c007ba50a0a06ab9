//! # Composer
//!
//! $$
//! V_t=\sum_i u_{i,t}\,P_{i,t},\qquad
//! u_{i,t}=\begin{cases}\dfrac{w_i V_t}{P_{i,t}} & t\equiv 0 \pmod k\\ u_{i,t-1} & \text{otherwise}\end{cases}
//! $$
//!
//! Folds per-asset price paths into one weighted value path, carrying the held units as an
//! explicit accumulator.

use std::fmt::Display;
use std::str::FromStr;

use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use serde::Deserialize;
use serde::Serialize;

use crate::error::RiskError;
use crate::returns::TRADING_DAYS;

/// Periodic reset of the held units back to the target weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rebalance {
  /// Buy and hold; weights drift with relative performance.
  #[default]
  None,
  Monthly,
  Quarterly,
  Yearly,
}

impl Rebalance {
  /// Periods between rebalances, `None` for buy and hold.
  ///
  /// With 252 periods per year: 21, 63 and 252.
  pub fn interval(&self, periods_per_year: f64) -> Option<usize> {
    let per_year = match self {
      Rebalance::None => return None,
      Rebalance::Monthly => 12.0,
      Rebalance::Quarterly => 4.0,
      Rebalance::Yearly => 1.0,
    };
    Some(((periods_per_year / per_year).round() as usize).max(1))
  }
}

impl FromStr for Rebalance {
  type Err = RiskError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "none" | "never" => Ok(Self::None),
      "monthly" => Ok(Self::Monthly),
      "quarterly" => Ok(Self::Quarterly),
      "yearly" | "annual" | "annually" => Ok(Self::Yearly),
      other => Err(RiskError::invalid_configuration(format!(
        "unknown rebalance frequency '{other}'"
      ))),
    }
  }
}

impl Display for Rebalance {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Rebalance::None => write!(f, "none"),
      Rebalance::Monthly => write!(f, "monthly"),
      Rebalance::Quarterly => write!(f, "quarterly"),
      Rebalance::Yearly => write!(f, "yearly"),
    }
  }
}

/// Combines a `T x N` price table into a length-`T` value path.
#[derive(Clone, Debug)]
pub struct AggregateValueComposer<'a> {
  /// Normalized target weights, one per column.
  weights: &'a [f64],
  rebalance: Rebalance,
  periods_per_year: f64,
}

impl<'a> AggregateValueComposer<'a> {
  pub fn new(weights: &'a [f64], rebalance: Rebalance) -> Self {
    Self {
      weights,
      rebalance,
      periods_per_year: TRADING_DAYS,
    }
  }

  pub fn with_periods_per_year(mut self, periods_per_year: f64) -> Self {
    self.periods_per_year = periods_per_year;
    self
  }

  /// Historical composition: one unit of weight per asset, so `V_0 = Σ w_i P_{i,0}`.
  pub fn compose(&self, prices: ArrayView2<'_, f64>) -> Array1<f64> {
    self.fold(prices, self.weights.to_vec())
  }

  /// Value-weighted composition starting at `initial_value`: `u_i = w_i V_0 / P_{i,0}`.
  pub fn compose_from_value(&self, prices: ArrayView2<'_, f64>, initial_value: f64) -> Array1<f64> {
    if prices.nrows() == 0 {
      return Array1::zeros(0);
    }
    let units = target_units(self.weights, initial_value, prices.row(0));
    let mut values = self.fold(prices, units);
    if units_are_live(prices.row(0)) {
      // exact, not a rounded sum of units times prices
      values[0] = initial_value;
    }
    values
  }

  fn fold(&self, prices: ArrayView2<'_, f64>, units: Vec<f64>) -> Array1<f64> {
    let interval = self.rebalance.interval(self.periods_per_year);

    let values: Vec<f64> = prices
      .rows()
      .into_iter()
      .enumerate()
      .scan(units, |units, (t, row)| {
        let value: f64 = units.iter().zip(row.iter()).map(|(u, p)| u * p).sum();
        if let Some(k) = interval {
          if t > 0 && t % k == 0 {
            *units = target_units(self.weights, value, row);
          }
        }
        Some(value)
      })
      .collect();

    Array1::from(values)
  }
}

fn units_are_live(prices: ArrayView1<'_, f64>) -> bool {
  prices.iter().any(|&p| p > 0.0)
}

/// Units that put `w_i` of `value` into each asset priced above zero. Weight on assets
/// whose price has hit zero is spread over the remaining ones.
fn target_units(weights: &[f64], value: f64, prices: ArrayView1<'_, f64>) -> Vec<f64> {
  let live: f64 = weights
    .iter()
    .zip(prices.iter())
    .filter(|(_, p)| **p > 0.0)
    .map(|(w, _)| w)
    .sum();

  weights
    .iter()
    .zip(prices.iter())
    .map(|(&w, &p)| {
      if p > 0.0 && live > 0.0 {
        w / live * value / p
      } else {
        0.0
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::array;
  use ndarray::Array2;

  use super::*;

  #[test]
  fn historical_day_zero_is_weighted_price_sum() {
    let prices = array![
      [100.0, 50.0, 10.0],
      [105.0, 52.0, 10.0],
      [110.0, 51.0, 10.0],
      [108.0, 53.0, 10.0],
    ];
    let w = [1.0 / 3.0; 3];
    let v = AggregateValueComposer::new(&w, Rebalance::None).compose(prices.view());

    assert_eq!(v.len(), 4);
    assert_relative_eq!(v[0], 160.0 / 3.0, epsilon = 1e-12);
    assert_relative_eq!(v[3], 171.0 / 3.0, epsilon = 1e-12);
  }

  #[test]
  fn value_weighted_starts_at_initial_value() {
    let prices = array![[100.0, 20.0], [110.0, 20.0], [121.0, 18.0]];
    let w = [0.5, 0.5];
    let v = AggregateValueComposer::new(&w, Rebalance::None).compose_from_value(prices.view(), 1000.0);

    assert_eq!(v[0], 1000.0);
    // 5 units of A, 25 units of B
    assert_relative_eq!(v[1], 550.0 + 500.0, epsilon = 1e-9);
    assert_relative_eq!(v[2], 605.0 + 450.0, epsilon = 1e-9);
  }

  #[test]
  fn rebalancing_resets_to_target_weights() {
    // A doubles every period, B is flat; rebalance every period
    let prices = array![[1.0, 1.0], [2.0, 1.0], [4.0, 1.0]];
    let w = [0.5, 0.5];
    let composer = AggregateValueComposer::new(&w, Rebalance::Yearly).with_periods_per_year(1.0);

    let hold = AggregateValueComposer::new(&w, Rebalance::None).compose_from_value(prices.view(), 2.0);
    let rebal = composer.compose_from_value(prices.view(), 2.0);

    assert_relative_eq!(hold[2], 5.0, epsilon = 1e-12);
    // day 1: 3.0, reset to 1.5/1.5; day 2: 0.75 A units * 4 + 1.5
    assert_relative_eq!(rebal[1], 3.0, epsilon = 1e-12);
    assert_relative_eq!(rebal[2], 4.5, epsilon = 1e-12);
  }

  #[test]
  fn dead_asset_weight_moves_to_survivors() {
    let prices = array![[1.0, 1.0], [0.0, 1.0], [0.0, 2.0]];
    let w = [0.5, 0.5];
    let v = AggregateValueComposer::new(&w, Rebalance::Yearly)
      .with_periods_per_year(1.0)
      .compose_from_value(prices.view(), 2.0);

    assert_relative_eq!(v[1], 1.0, epsilon = 1e-12);
    assert_relative_eq!(v[2], 2.0, epsilon = 1e-12);
  }

  #[test]
  fn empty_table_composes_to_empty_path() {
    let prices = Array2::<f64>::zeros((0, 2));
    let w = [0.5, 0.5];
    let composer = AggregateValueComposer::new(&w, Rebalance::Monthly);
    assert!(composer.compose(prices.view()).is_empty());
    assert!(composer.compose_from_value(prices.view(), 10.0).is_empty());
  }

  #[test]
  fn intervals_follow_trading_calendar() {
    assert_eq!(Rebalance::None.interval(252.0), None);
    assert_eq!(Rebalance::Monthly.interval(252.0), Some(21));
    assert_eq!(Rebalance::Quarterly.interval(252.0), Some(63));
    assert_eq!(Rebalance::Yearly.interval(252.0), Some(252));
    assert_eq!("Quarterly".parse::<Rebalance>().unwrap(), Rebalance::Quarterly);
    assert!("weekly".parse::<Rebalance>().is_err());
  }
}
