//! # Alignment
//!
//! $$
//! \mathcal T=\bigcap_{i}\mathcal T_i\quad\text{or}\quad \mathcal T=\bigcup_{i}\mathcal T_i,\;
//! P_{i,t}\leftarrow P_{i,t^-}\ \text{(forward fill)}
//! $$
//!
//! Puts N independent close series on one dense date index.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::error::Warning;
use crate::returns::returns;
use crate::returns::ReturnKind;
use crate::series::PriceSeries;

/// How dates that are missing from some series are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AlignmentPolicy {
  /// Keep only the dates every series has.
  #[default]
  Intersection,
  /// Union of all dates, carrying the last close forward. `limit` caps the number of
  /// consecutive filled days; dates that still miss a value are dropped.
  ForwardFillUnion { limit: Option<usize> },
}

/// Dense close table, one row per date and one column per symbol.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlignedPrices {
  symbols: Vec<String>,
  dates: Vec<NaiveDate>,
  closes: Array2<f64>,
  warnings: Vec<Warning>,
}

impl AlignedPrices {
  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// `dates.len() x symbols.len()` table of closes.
  pub fn closes(&self) -> &Array2<f64> {
    &self.closes
  }

  pub fn warnings(&self) -> &[Warning] {
    &self.warnings
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  pub fn n_assets(&self) -> usize {
    self.symbols.len()
  }

  pub fn column(&self, idx: usize) -> ArrayView1<'_, f64> {
    self.closes.column(idx)
  }

  pub fn column_of(&self, symbol: &str) -> Option<ArrayView1<'_, f64>> {
    self
      .symbols
      .iter()
      .position(|s| s == symbol)
      .map(|idx| self.closes.column(idx))
  }

  /// Closes on the last aligned date.
  pub fn last_prices(&self) -> Option<Vec<f64>> {
    if self.is_empty() {
      None
    } else {
      Some(self.closes.row(self.len() - 1).to_vec())
    }
  }

  /// Per-column returns, `(len - 1) x n_assets`. Empty when fewer than two dates.
  pub fn returns(&self, kind: ReturnKind) -> Array2<f64> {
    let rows = self.len().saturating_sub(1);
    let mut out = Array2::<f64>::zeros((rows, self.n_assets()));
    if rows == 0 {
      return out;
    }
    for (j, col) in self.closes.axis_iter(Axis(1)).enumerate() {
      let prices = col.to_vec();
      let r = returns(&prices, kind);
      out.column_mut(j).assign(&ArrayView1::from(&r[..]));
    }
    out
  }
}

pub(crate) fn close_on(series: &PriceSeries, date: NaiveDate) -> Option<f64> {
  let bars = series.bars();
  bars
    .binary_search_by_key(&date, |b| b.date)
    .ok()
    .map(|idx| bars[idx].close)
}

fn shares_any_date(a: &PriceSeries, b: &PriceSeries) -> bool {
  a.bars().iter().any(|bar| close_on(b, bar.date).is_some())
}

/// Align `series` onto a common date index under `policy`.
///
/// An empty result is not an error: it is returned with [`Warning::NoOverlap`] entries so
/// callers can detect the degenerate case.
pub fn align(series: &[&PriceSeries], policy: AlignmentPolicy) -> AlignedPrices {
  let symbols: Vec<String> = series.iter().map(|s| s.symbol().to_string()).collect();
  let mut warnings = Vec::new();

  let (dates, rows) = match policy {
    AlignmentPolicy::Intersection => intersect(series),
    AlignmentPolicy::ForwardFillUnion { limit } => {
      let (dates, rows, dropped) = forward_fill_union(series, limit);
      if dropped > 0 {
        debug!(dropped, "forward-fill alignment dropped unfillable dates");
        warnings.push(Warning::DatesDropped { count: dropped });
      }
      (dates, rows)
    }
  };

  if dates.is_empty() && series.len() > 1 {
    for i in 0..series.len() {
      for j in (i + 1)..series.len() {
        if !shares_any_date(series[i], series[j]) {
          warn!(
            left = series[i].symbol(),
            right = series[j].symbol(),
            "series share no dates"
          );
          warnings.push(Warning::NoOverlap {
            left: symbols[i].clone(),
            right: symbols[j].clone(),
          });
        }
      }
    }
  }

  let n = series.len();
  let flat: Vec<f64> = rows.into_iter().flatten().collect();
  let closes = Array2::from_shape_vec((dates.len(), n), flat)
    .unwrap_or_else(|_| Array2::zeros((0, n)));

  AlignedPrices {
    symbols,
    dates,
    closes,
    warnings,
  }
}

fn intersect(series: &[&PriceSeries]) -> (Vec<NaiveDate>, Vec<Vec<f64>>) {
  let Some(first) = series.first() else {
    return (Vec::new(), Vec::new());
  };

  let mut dates = Vec::new();
  let mut rows = Vec::new();

  'dates: for bar in first.bars() {
    let mut row = Vec::with_capacity(series.len());
    for s in series {
      match close_on(s, bar.date) {
        Some(close) => row.push(close),
        None => continue 'dates,
      }
    }
    dates.push(bar.date);
    rows.push(row);
  }

  (dates, rows)
}

fn forward_fill_union(
  series: &[&PriceSeries],
  limit: Option<usize>,
) -> (Vec<NaiveDate>, Vec<Vec<f64>>, usize) {
  let all_dates: BTreeSet<NaiveDate> = series
    .iter()
    .flat_map(|s| s.bars().iter().map(|b| b.date))
    .collect();

  let mut filled: Vec<Vec<Option<f64>>> = Vec::with_capacity(series.len());
  for s in series {
    let bars = s.bars();
    let mut cursor = 0;
    let mut last: Option<f64> = None;
    let mut run = 0usize;
    let mut col = Vec::with_capacity(all_dates.len());

    for &date in &all_dates {
      if cursor < bars.len() && bars[cursor].date == date {
        last = Some(bars[cursor].close);
        run = 0;
        cursor += 1;
        col.push(last);
      } else if last.is_some() && limit.map_or(true, |l| run < l) {
        run += 1;
        col.push(last);
      } else {
        col.push(None);
      }
    }
    filled.push(col);
  }

  let mut dates = Vec::new();
  let mut rows = Vec::new();
  let mut dropped = 0;

  for (t, &date) in all_dates.iter().enumerate() {
    let row: Option<Vec<f64>> = filled.iter().map(|col| col[t]).collect();
    match row {
      Some(row) => {
        dates.push(date);
        rows.push(row);
      }
      None => dropped += 1,
    }
  }

  (dates, rows, dropped)
}
