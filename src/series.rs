//! # Price Series
//!
//! $$
//! \bar P=\frac1n\sum_{t=1}^{n}P_t,\qquad s_P=\sqrt{\frac{1}{n-1}\sum_{t=1}^{n}(P_t-\bar P)^2}
//! $$
//!
//! Standardized per-asset OHLCV history with its price-level summary.

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::debug;

use crate::error::Result;
use crate::error::RiskError;
use crate::stats::tail::percentile;

/// One trading period.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
  pub date: NaiveDate,
  pub open: f64,
  pub high: f64,
  pub low: f64,
  pub close: f64,
  pub volume: f64,
}

impl Bar {
  pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
    Self {
      date,
      open,
      high,
      low,
      close,
      volume,
    }
  }

  /// Bar where open/high/low all equal the close and volume is zero.
  pub fn from_close(date: NaiveDate, close: f64) -> Self {
    Self::new(date, close, close, close, close, 0.0)
  }

  fn is_finite(&self) -> bool {
    [self.open, self.high, self.low, self.close, self.volume]
      .iter()
      .all(|v| v.is_finite())
  }
}

/// Price-level summary fixed at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
  pub observations: usize,
  pub mean_close: f64,
  /// Sample standard deviation; `None` with a single observation.
  pub std_close: Option<f64>,
  pub mean_volume: f64,
  pub std_volume: Option<f64>,
  pub min_close: f64,
  pub max_close: f64,
  pub first_close: f64,
  pub last_close: f64,
  /// `last / first - 1`.
  pub total_return: f64,
}

impl PriceSummary {
  fn from_bars(bars: &[Bar]) -> Self {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let sample_std = |xs: &[f64]| {
      if xs.len() < 2 {
        None
      } else {
        Some(xs.iter().std_dev())
      }
    };

    let first_close = closes[0];
    let last_close = closes[closes.len() - 1];

    Self {
      observations: closes.len(),
      mean_close: closes.iter().mean(),
      std_close: sample_std(&closes),
      mean_volume: volumes.iter().mean(),
      std_volume: sample_std(&volumes),
      min_close: Statistics::min(closes.iter()),
      max_close: Statistics::max(closes.iter()),
      first_close,
      last_close,
      total_return: last_close / first_close - 1.0,
    }
  }
}

/// One asset's standardized history.
///
/// Construction validates the invariants the rest of the crate relies on: at least one
/// bar, strictly increasing dates, finite fields and a positive close.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceSeries {
  symbol: String,
  source: String,
  bars: Vec<Bar>,
  summary: PriceSummary,
}

impl PriceSeries {
  pub fn new(symbol: impl Into<String>, source: impl Into<String>, bars: Vec<Bar>) -> Result<Self> {
    let symbol = symbol.into();

    if bars.is_empty() {
      return Err(RiskError::invalid_series(symbol, "no bars"));
    }

    for (i, bar) in bars.iter().enumerate() {
      if !bar.is_finite() {
        return Err(RiskError::invalid_series(
          symbol,
          format!("non-finite value on {}", bar.date),
        ));
      }
      if bar.close <= 0.0 {
        return Err(RiskError::invalid_series(
          symbol,
          format!("non-positive close {} on {}", bar.close, bar.date),
        ));
      }
      if i > 0 && bars[i - 1].date >= bar.date {
        return Err(RiskError::invalid_series(
          symbol,
          format!("dates not strictly increasing at {}", bar.date),
        ));
      }
    }

    let summary = PriceSummary::from_bars(&bars);
    debug!(symbol = %symbol, bars = bars.len(), "price series constructed");

    Ok(Self {
      symbol,
      source: source.into(),
      bars,
      summary,
    })
  }

  /// Series built from `(date, close)` pairs only.
  pub fn from_closes(
    symbol: impl Into<String>,
    source: impl Into<String>,
    closes: &[(NaiveDate, f64)],
  ) -> Result<Self> {
    let bars = closes
      .iter()
      .map(|&(date, close)| Bar::from_close(date, close))
      .collect();
    Self::new(symbol, source, bars)
  }

  pub fn symbol(&self) -> &str {
    &self.symbol
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn bars(&self) -> &[Bar] {
    &self.bars
  }

  pub fn summary(&self) -> &PriceSummary {
    &self.summary
  }

  pub fn len(&self) -> usize {
    self.bars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bars.is_empty()
  }

  pub fn dates(&self) -> Vec<NaiveDate> {
    self.bars.iter().map(|b| b.date).collect()
  }

  pub fn closes(&self) -> Vec<f64> {
    self.bars.iter().map(|b| b.close).collect()
  }

  pub fn first_date(&self) -> NaiveDate {
    self.bars[0].date
  }

  pub fn last_date(&self) -> NaiveDate {
    self.bars[self.bars.len() - 1].date
  }

  /// Inspect the bars for issues the provider adapters should have caught.
  pub fn quality_report(&self) -> QualityReport {
    QualityReport::inspect(&self.bars)
  }
}

/// Data-quality findings for a series. Informational only; nothing here is rejected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
  /// Closes outside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`.
  pub close_outliers: usize,
  /// Bars with a non-positive open, high or low.
  pub non_positive_prices: usize,
  pub high_below_low: Vec<NaiveDate>,
  pub high_below_open_or_close: Vec<NaiveDate>,
  pub low_above_open_or_close: Vec<NaiveDate>,
}

impl QualityReport {
  fn inspect(bars: &[Bar]) -> Self {
    let mut report = QualityReport::default();

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    if closes.len() >= 4 {
      let q1 = percentile(&closes, 25.0);
      let q3 = percentile(&closes, 75.0);
      let iqr = q3 - q1;
      let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
      report.close_outliers = closes.iter().filter(|&&c| c < lo || c > hi).count();
    }

    for bar in bars {
      if bar.open <= 0.0 || bar.high <= 0.0 || bar.low <= 0.0 {
        report.non_positive_prices += 1;
      }
      if bar.high < bar.low {
        report.high_below_low.push(bar.date);
      }
      if bar.high < bar.open || bar.high < bar.close {
        report.high_below_open_or_close.push(bar.date);
      }
      if bar.low > bar.open || bar.low > bar.close {
        report.low_above_open_or_close.push(bar.date);
      }
    }

    report
  }

  pub fn is_clean(&self) -> bool {
    self.close_outliers == 0
      && self.non_positive_prices == 0
      && self.high_below_low.is_empty()
      && self.high_below_open_or_close.is_empty()
      && self.low_above_open_or_close.is_empty()
  }
}
