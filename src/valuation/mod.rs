//! Valuation engine: comp selection → ARV estimate → profit scenarios.
//!
//! Everything here is a pure function of its inputs; provider access and
//! sequencing live in `engine`.

pub mod arv;
pub mod comps;
pub mod profit;
pub mod stats;

pub use arv::ArvEstimator;
pub use comps::CompSelection;
pub use profit::ProfitCalculator;
