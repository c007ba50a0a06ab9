//! # Portfolio Risk
//!
//! $$
//! \{P_{i,t}\}\xrightarrow{\text{align}}\{r_{i,t}\}\to(\sigma,\ S,\ \operatorname{MDD},\ \operatorname{VaR},\ \rho)\to V_{0..D}^{(s)}
//! $$
//!
//! Risk statistics, correlation structure and Monte Carlo projections for weighted
//! collections of price series.

pub mod alignment;
pub mod composer;
pub mod correlation;
pub mod error;
pub mod holding;
pub mod returns;
pub mod series;
pub mod simulation;
pub mod stats;

pub use alignment::AlignedPrices;
pub use alignment::AlignmentPolicy;
pub use alignment::align;
pub use composer::AggregateValueComposer;
pub use composer::Rebalance;
pub use correlation::CorrelationConfig;
pub use correlation::CorrelationMatrix;
pub use correlation::diversification_ratio;
pub use error::Result;
pub use error::RiskError;
pub use error::Warning;
pub use holding::Holding;
pub use holding::HoldingStatistics;
pub use holding::ValueSeries;
pub use holding::Weighting;
pub use returns::Annualization;
pub use returns::ReturnKind;
pub use returns::reconstruct_prices;
pub use returns::returns;
pub use series::Bar;
pub use series::PriceSeries;
pub use series::PriceSummary;
pub use series::QualityReport;
pub use simulation::Distribution;
pub use simulation::MonteCarloSimulator;
pub use simulation::SimulationConfig;
pub use simulation::SimulationMode;
pub use simulation::SimulationResult;
pub use simulation::SimulationSummary;
pub use stats::RiskStatistics;
pub use stats::StatsConfig;
