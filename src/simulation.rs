//! # Simulation
//!
//! $$
//! V_D=V_0\prod_{t=1}^{D}(1+r_t)
//! $$
//!
//! Monte Carlo projection of aggregate value paths.

pub mod config;
pub mod engine;
pub mod result;
pub mod sampler;

pub use config::Coupling;
pub use config::Distribution;
pub use config::SimulationConfig;
pub use config::SimulationMode;
pub use config::DEFAULT_DOF;
pub use engine::MonteCarloSimulator;
pub use result::SimulationResult;
pub use result::SimulationSummary;
pub use result::StreamParameters;
pub use sampler::ReturnSampler;
